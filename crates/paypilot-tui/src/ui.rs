use chrono::Local;
use ratatui::{
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Clear, List, ListItem, Paragraph, Wrap},
    Frame,
};

use crate::app::{App, InputMode, QUICK_ACTIONS};
use paypilot_core::{ChatEntry, ChatRole, EntryKind, PaymentState};

/// Plain-text body of an entry, as the chat pane shows it.
pub fn entry_body(entry: &ChatEntry) -> String {
    match &entry.kind {
        EntryKind::Text => entry.text.clone(),
        EntryKind::Confirmation {
            amount,
            currency,
            merchant,
            category,
            bank_name,
            ..
        } => {
            let mut body = String::new();
            if !entry.text.trim().is_empty() {
                body.push_str(&entry.text);
                body.push('\n');
            }
            body.push_str(&format!("  {amount} {currency} → {merchant} ({category})\n"));
            body.push_str(&format!("  Card: {bank_name}\n"));
            body.push_str("  Press [c] to confirm");
            body
        }
        EntryKind::Receipt {
            amount,
            currency,
            merchant,
        } => format!("✔ Paid {amount} {currency} to {merchant}"),
        EntryKind::Audio { mime_type, byte_len } => {
            format!("🎤 Voice message ({byte_len} bytes, {mime_type})")
        }
    }
}

/// Render `**bold**` spans; everything else is literal.
fn parse_markdown_line(text: &str) -> Line<'static> {
    let mut spans: Vec<Span<'static>> = Vec::new();
    let mut chars = text.chars().peekable();
    let mut current_text = String::new();

    while let Some(c) = chars.next() {
        if c == '*' && chars.peek() == Some(&'*') {
            chars.next();
            if !current_text.is_empty() {
                spans.push(Span::raw(std::mem::take(&mut current_text)));
            }

            let mut bold_text = String::new();
            let mut found_close = false;
            while let Some(c) = chars.next() {
                if c == '*' && chars.peek() == Some(&'*') {
                    chars.next();
                    found_close = true;
                    break;
                }
                bold_text.push(c);
            }

            if found_close && !bold_text.is_empty() {
                spans.push(Span::styled(
                    bold_text,
                    Style::default().add_modifier(Modifier::BOLD),
                ));
            } else {
                current_text.push_str("**");
                current_text.push_str(&bold_text);
            }
        } else {
            current_text.push(c);
        }
    }

    if !current_text.is_empty() {
        spans.push(Span::raw(current_text));
    }

    if spans.is_empty() {
        Line::default()
    } else {
        Line::from(spans)
    }
}

fn centered(area: Rect, width: u16, height: u16) -> Rect {
    let width = width.min(area.width.saturating_sub(4));
    let height = height.min(area.height.saturating_sub(2));
    Rect::new(
        area.x + (area.width.saturating_sub(width)) / 2,
        area.y + (area.height.saturating_sub(height)) / 2,
        width,
        height,
    )
}

pub fn render(app: &mut App, frame: &mut Frame) {
    let area = frame.area();

    let [header_area, body_area, footer_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Min(0),
        Constraint::Length(1),
    ])
    .areas(area);

    render_header(app, frame, header_area);

    let [chat_column, wallet_area] = Layout::horizontal([
        Constraint::Percentage(70),
        Constraint::Percentage(30),
    ])
    .areas(body_area);
    let [chat_area, input_area] = Layout::vertical([
        Constraint::Min(0),
        Constraint::Length(3),
    ])
    .areas(chat_column);

    render_chat(app, frame, chat_area);
    render_input(app, frame, input_area);
    render_wallet(app, frame, wallet_area);
    render_footer(app, frame, footer_area);

    // Popups, in order of priority
    if app.payment.is_some() || app.is_settling() {
        render_code_popup(app, frame, area);
    } else if app.show_quick_actions {
        render_quick_actions(app, frame, area);
    } else if app.show_model_picker {
        render_model_picker(app, frame, area);
    }
}

fn render_header(app: &App, frame: &mut Frame, area: Rect) {
    let title = Line::from(vec![
        Span::styled(" PayPilot ", Style::default().fg(Color::Cyan).bold()),
        Span::styled(
            format!("{} · {} ", app.backend_kind.display_name(), app.selected_model()),
            Style::default().fg(Color::Gray),
        ),
        Span::styled(
            format!("bonus today {} / total {} AZN ", app.bonus_stats.today, app.bonus_stats.total),
            Style::default().fg(Color::Green),
        ),
        Span::styled(
            format!("v{}", env!("CARGO_PKG_VERSION")),
            Style::default().fg(Color::DarkGray),
        ),
    ]);

    let header = Paragraph::new(title).style(Style::default().bg(Color::DarkGray));
    frame.render_widget(header, area);
}

fn render_chat(app: &mut App, frame: &mut Frame, area: Rect) {
    app.chat_height = area.height.saturating_sub(2);
    app.chat_width = area.width.saturating_sub(2);

    let mut lines: Vec<Line> = Vec::new();
    for entry in app.conversation.entries() {
        let (label, color) = match (entry.role, &entry.kind) {
            (ChatRole::User, _) => ("You:", Color::Cyan),
            (ChatRole::Assistant, EntryKind::Confirmation { .. }) => ("Payment:", Color::Magenta),
            (ChatRole::Assistant, EntryKind::Receipt { .. }) => ("Receipt:", Color::Green),
            (ChatRole::Assistant, _) => ("PayPilot:", Color::Yellow),
        };
        let time = entry.created_at.with_timezone(&Local).format("%H:%M");
        lines.push(Line::from(vec![
            Span::styled(label, Style::default().fg(color).add_modifier(Modifier::BOLD)),
            Span::styled(format!(" {time}"), Style::default().fg(Color::DarkGray)),
        ]));
        for line in entry_body(entry).lines() {
            lines.push(parse_markdown_line(line));
        }
        lines.push(Line::default());
    }

    if app.is_thinking() {
        lines.push(Line::from(Span::styled(
            "PayPilot:",
            Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
        )));
        let dots = ".".repeat((app.animation_frame as usize) + 1);
        lines.push(Line::from(Span::styled(
            format!("Thinking{dots}  ({} to cancel)", cancel_key(app.input_mode)),
            Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
        )));
    }

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan))
        .title(" Chat ");
    let chat = Paragraph::new(Text::from(lines))
        .block(block)
        .wrap(Wrap { trim: true })
        .scroll((app.chat_scroll, 0));
    frame.render_widget(chat, area);
}

fn render_input(app: &App, frame: &mut Frame, area: Rect) {
    let editing = app.input_mode == InputMode::Editing;
    let border_color = if editing { Color::Yellow } else { Color::DarkGray };

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .title(" Message (/voice <file> for audio) ");

    let content = if app.input.is_empty() && !editing {
        Span::styled("Press i to type, a for quick actions", Style::default().fg(Color::DarkGray))
    } else {
        Span::raw(app.input.as_str())
    };
    frame.render_widget(Paragraph::new(content).block(block), area);

    if editing && app.payment.is_none() && !app.show_quick_actions && !app.show_model_picker {
        let inner_width = area.width.saturating_sub(2) as usize;
        let cursor_x = app.cursor.min(inner_width) as u16;
        frame.set_cursor_position((area.x + 1 + cursor_x, area.y + 1));
    }
}

fn render_wallet(app: &App, frame: &mut Frame, area: Rect) {
    let items: Vec<ListItem> = app
        .conversation
        .wallet()
        .iter()
        .map(|card| {
            let star = if card.is_favorite { "★ " } else { "  " };
            ListItem::new(vec![
                Line::from(Span::styled(
                    format!("{star}{}", card.bank_name),
                    Style::default().add_modifier(Modifier::BOLD),
                )),
                Line::from(Span::styled(
                    format!("  •••• {}   {} AZN", card.card_number, card.balance),
                    Style::default().fg(Color::Gray),
                )),
            ])
        })
        .collect();

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray))
        .title(" Wallet ");
    frame.render_widget(List::new(items).block(block), area);
}

fn render_footer(app: &App, frame: &mut Frame, area: Rect) {
    let mode_style = match app.input_mode {
        InputMode::Normal => Style::default().bg(Color::Blue).fg(Color::White),
        InputMode::Editing => Style::default().bg(Color::Yellow).fg(Color::Black),
    };
    let mode_text = match app.input_mode {
        InputMode::Normal => " NORMAL ",
        InputMode::Editing => " INPUT ",
    };

    let key_style = Style::default().bg(Color::DarkGray).fg(Color::White);
    let label_style = Style::default().bg(Color::Black).fg(Color::White);

    let hints: &[(&str, &str)] = match app.input_mode {
        InputMode::Normal => &[
            ("i", "type"),
            ("c", "confirm"),
            ("a", "quick"),
            ("m", "model"),
            ("x", "cancel"),
            ("L", "clear"),
            ("q", "quit"),
        ],
        InputMode::Editing if app.is_thinking() => &[("Esc", "cancel")],
        InputMode::Editing => &[("Enter", "send"), ("Esc", "normal mode")],
    };

    let mut spans = vec![Span::styled(mode_text, mode_style), Span::raw(" ")];
    for (key, label) in hints {
        spans.push(Span::styled(format!(" {key} "), key_style));
        spans.push(Span::styled(format!(" {label} "), label_style));
    }
    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}

fn render_code_popup(app: &App, frame: &mut Frame, area: Rect) {
    let popup_area = centered(area, 48, 11);
    frame.render_widget(Clear, popup_area);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Magenta))
        .title(" Confirm payment ");
    let inner = block.inner(popup_area);
    frame.render_widget(block, popup_area);

    let proposal = app
        .payment
        .as_ref()
        .map(|flow| flow.proposal())
        .or(app.settling.as_ref());
    let mut lines: Vec<Line> = Vec::new();
    if let Some(p) = proposal {
        lines.push(Line::from(Span::styled(
            format!("{} {} → {}", p.amount, p.currency, p.merchant),
            Style::default().add_modifier(Modifier::BOLD),
        )));
        lines.push(Line::from(format!("Card: {}", p.bank_name)));
        lines.push(Line::default());
    }

    match (app.payment_state(), app.payment.as_ref()) {
        (Some(PaymentState::Verifying), _) => {
            let dots = ".".repeat((app.animation_frame as usize) + 1);
            lines.push(Line::from(Span::styled(
                format!("Processing payment{dots}"),
                Style::default().fg(Color::Yellow),
            )));
        }
        (Some(PaymentState::AwaitingCode), Some(flow)) => {
            let now = std::time::Instant::now();
            if let Some(code) = flow.code() {
                lines.push(Line::from(vec![
                    Span::raw("SMS code: "),
                    Span::styled(code.as_str().to_string(), Style::default().fg(Color::Cyan).bold()),
                    Span::styled(
                        format!("   {}s left", flow.remaining(now).as_secs()),
                        Style::default().fg(Color::DarkGray),
                    ),
                ]));
            }
            let slots: String = flow
                .slots()
                .iter()
                .map(|slot| match slot {
                    Some(d) => format!("[{d}]"),
                    None => "[ ]".to_string(),
                })
                .collect::<Vec<_>>()
                .join(" ");
            lines.push(Line::from(Span::styled(
                slots,
                Style::default().add_modifier(Modifier::BOLD),
            )));
        }
        (Some(PaymentState::Cancelled(_)), _) => {
            lines.push(Line::from(Span::styled(
                "Code no longer valid. r to resend, Esc to close.",
                Style::default().fg(Color::Red),
            )));
        }
        _ => {}
    }

    if let Some(error) = &app.code_error {
        lines.push(Line::from(Span::styled(error.clone(), Style::default().fg(Color::Red))));
    }
    lines.push(Line::from(Span::styled(
        "digits enter · Backspace fix · r resend · Esc cancel",
        Style::default().fg(Color::DarkGray),
    )));

    frame.render_widget(Paragraph::new(lines).wrap(Wrap { trim: true }), inner);
}

fn render_quick_actions(app: &mut App, frame: &mut Frame, area: Rect) {
    let popup_area = centered(area, 44, QUICK_ACTIONS.len() as u16 + 2);
    frame.render_widget(Clear, popup_area);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan))
        .title(" Quick actions (Enter to use, Esc to close) ");
    let items: Vec<ListItem> = QUICK_ACTIONS
        .iter()
        .map(|action| ListItem::new(format!(" {action} ")))
        .collect();
    let list = List::new(items)
        .block(block)
        .highlight_style(
            Style::default()
                .bg(Color::Blue)
                .fg(Color::White)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("> ");

    frame.render_stateful_widget(list, popup_area, &mut app.quick_action_state);
}

fn render_model_picker(app: &mut App, frame: &mut Frame, area: Rect) {
    let popup_area = centered(area, 40, app.available_models.len() as u16 + 2);
    frame.render_widget(Clear, popup_area);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan))
        .title(" Select Model (Enter to select, Esc to cancel) ");

    let items: Vec<ListItem> = app
        .available_models
        .iter()
        .map(|model| {
            let style = if model == &app.config.model {
                Style::default().fg(Color::Green).add_modifier(Modifier::BOLD)
            } else {
                Style::default()
            };
            ListItem::new(format!(" {} ", model)).style(style)
        })
        .collect();

    let list = List::new(items)
        .block(block)
        .highlight_style(
            Style::default()
                .bg(Color::Blue)
                .fg(Color::White)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("> ");

    frame.render_stateful_widget(list, popup_area, &mut app.model_picker_state);
}

/// Key that cancels a pending turn in the given mode.
fn cancel_key(mode: InputMode) -> &'static str {
    match mode {
        InputMode::Normal => "x",
        InputMode::Editing => "Esc",
    }
}
