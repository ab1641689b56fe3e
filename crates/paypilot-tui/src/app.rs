use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, OnceLock};
use std::time::Instant;

use paypilot_core::ledger::BonusStats;
use paypilot_core::locale::code_mismatch_text;
use paypilot_core::prompt::DEFAULT_AUDIO_MIME;
use paypilot_core::{
    settle, AssistantError, Backend, CompletedPayment, Config, Conversation, FunctionClient, GeminiClient,
    IntentBackend, IntentResolver, Language, Ledger, PaymentFlow, PaymentProposal, PaymentState, SqliteLedger,
    StructuredIntent, UserInput,
};
use ratatui::widgets::ListState;
use regex::Regex;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    Editing,
}

/// Canned prompts offered from the quick-action picker.
pub const QUICK_ACTIONS: &[&str] = &[
    "📱 Azercell 10 AZN artır",
    "🚕 Bolt ilə 8 AZN ödə",
    "🎬 CinemaPlus 2 bilet al",
    "💡 İşıq haqqı 25 AZN ödə",
    "🍔 Wolt sifarişi 15 AZN",
    "💳 Kino üçün hansı kart yaxşıdır?",
];

type TurnTask = JoinHandle<(u64, paypilot_core::Result<StructuredIntent>)>;
type SettleTask = JoinHandle<(PaymentFlow, paypilot_core::Result<CompletedPayment>)>;

pub struct App {
    pub should_quit: bool,
    pub input_mode: InputMode,
    pub config: Config,
    pub language: Language,

    // Conversation
    pub conversation: Conversation,
    pub backend_kind: Backend,
    backend: Arc<dyn IntentBackend>,
    pub input: String,
    pub cursor: usize,
    pub chat_scroll: u16,
    pub chat_height: u16,
    pub chat_width: u16,
    pub turn_task: Option<TurnTask>,
    pub animation_frame: u8,

    // Payment confirmation
    pub payment: Option<PaymentFlow>,
    pub settle_task: Option<SettleTask>,
    /// What is being settled while `settle_task` runs.
    pub settling: Option<PaymentProposal>,
    pub code_error: Option<String>,
    /// Confirmation entry the current payment came from.
    payment_entry: Option<String>,
    /// Confirmation entries that have already been paid.
    paid_entries: HashSet<String>,

    // Wallet
    pub ledger: Arc<SqliteLedger>,
    pub bonus_stats: BonusStats,

    // Pickers
    pub show_quick_actions: bool,
    pub quick_action_state: ListState,
    pub show_model_picker: bool,
    pub available_models: Vec<String>,
    pub model_picker_state: ListState,
}

impl App {
    pub fn new(config: Config) -> anyhow::Result<Self> {
        let ledger = SqliteLedger::open(&config.database_path()?, &config.user_id)?;
        ledger.seed_demo_wallet()?;

        let language = config.language();
        let backend_kind = config.backend();
        let backend = build_backend(&config, backend_kind);

        let mut conversation = Conversation::new(language, config.history_window);
        conversation.replace_wallet(ledger.cards()?);
        let bonus_stats = ledger.bonus_stats()?;

        log::info!("starting with {} backend", backend_kind.as_str());

        Ok(Self {
            should_quit: false,
            input_mode: InputMode::Editing,
            config,
            language,
            conversation,
            backend_kind,
            backend,
            input: String::new(),
            cursor: 0,
            chat_scroll: 0,
            chat_height: 0,
            chat_width: 0,
            turn_task: None,
            animation_frame: 0,
            payment: None,
            settle_task: None,
            settling: None,
            code_error: None,
            payment_entry: None,
            paid_entries: HashSet::new(),
            ledger: Arc::new(ledger),
            bonus_stats,
            show_quick_actions: false,
            quick_action_state: ListState::default(),
            show_model_picker: false,
            available_models: GeminiClient::list_models(),
            model_picker_state: ListState::default(),
        })
    }

    pub fn is_thinking(&self) -> bool {
        self.turn_task.is_some()
    }

    pub fn selected_model(&self) -> &str {
        &self.config.model
    }

    // ------------------------------------------------------------------
    // Turns
    // ------------------------------------------------------------------

    /// Submit whatever is in the input box. `/voice <path>` sends an audio file.
    pub fn submit_input(&mut self) {
        let text = self.input.trim().to_string();
        if text.is_empty() {
            return;
        }

        let input = match text.strip_prefix("/voice") {
            Some(path) => match read_voice_note(path.trim()) {
                Ok(input) => input,
                Err(e) => {
                    log::warn!("voice note rejected: {e}");
                    self.conversation.notice(format!("⚠ {e}"));
                    return;
                }
            },
            None => UserInput::Text(text.clone()),
        };

        let ticket = match self.conversation.submit(input) {
            Ok(ticket) => ticket,
            Err(AssistantError::TurnInFlight) => return,
            Err(e) => {
                self.conversation.notice(format!("⚠ {e}"));
                return;
            }
        };

        if !ticket.message.is_audio() {
            self.persist_message(&text, false);
        }
        self.input.clear();
        self.cursor = 0;
        self.scroll_to_bottom();

        let backend = Arc::clone(&self.backend);
        self.turn_task = Some(tokio::spawn(async move {
            let result = ticket.resolve(backend.as_ref()).await;
            (ticket.id, result)
        }));
    }

    pub fn cancel_turn(&mut self) {
        if self.conversation.cancel_turn() {
            if let Some(task) = self.turn_task.take() {
                task.abort();
            }
        }
    }

    /// Collect finished background work. Called on every tick.
    pub async fn poll_tasks(&mut self) -> anyhow::Result<()> {
        if self.turn_task.as_ref().map_or(false, JoinHandle::is_finished) {
            if let Some(task) = self.turn_task.take() {
                let (id, result) = task.await?;
                if let Some(entry) = self.conversation.complete_turn(id, result) {
                    let text = entry.history_text().to_string();
                    self.persist_message(&text, true);
                }
                self.scroll_to_bottom();
            }
        }

        if self.settle_task.as_ref().map_or(false, JoinHandle::is_finished) {
            if let Some(task) = self.settle_task.take() {
                let (flow, result) = task.await?;
                self.finish_settlement(flow, result);
            }
        }

        if let Some(flow) = self.payment.as_mut() {
            if flow.tick(Instant::now()) {
                self.code_error = Some(AssistantError::CodeExpired.to_string());
            }
        }
        Ok(())
    }

    fn persist_message(&self, text: &str, is_bot: bool) {
        if text.trim().is_empty() {
            return;
        }
        if let Err(e) = self.ledger.save_chat_message(text, is_bot) {
            log::warn!("failed to save chat message: {e}");
        }
    }

    // ------------------------------------------------------------------
    // Payment confirmation
    // ------------------------------------------------------------------

    /// Start confirming the most recent payment prompt.
    pub fn confirm_latest(&mut self) {
        if self.payment.is_some() || self.is_settling() {
            return;
        }
        let Some(entry) = self.conversation.latest_confirmation() else {
            return;
        };
        if self.paid_entries.contains(&entry.id) {
            self.conversation.notice("This payment has already been made.");
            return;
        }
        let entry_id = entry.id.clone();
        let Some(proposal) = PaymentProposal::from_entry(entry) else {
            return;
        };

        match PaymentFlow::propose(proposal, self.config.code_policy()) {
            Ok(mut flow) => {
                if let Err(e) = flow.confirm(Instant::now()) {
                    self.conversation.notice(format!("⚠ {e}"));
                    return;
                }
                self.code_error = None;
                self.payment = Some(flow);
                self.payment_entry = Some(entry_id);
            }
            Err(e) => self.conversation.notice(format!("⚠ {e}")),
        }
    }

    pub fn enter_code_digit(&mut self, digit: char) {
        let Some(flow) = self.payment.as_mut() else {
            return;
        };
        let Some(slot) = flow.slots().iter().position(Option::is_none) else {
            return;
        };

        match flow.enter_digit(slot, digit, Instant::now()) {
            Ok(true) => {
                self.code_error = None;
                self.start_settlement();
            }
            Ok(false) => self.code_error = None,
            Err(AssistantError::CodeMismatch { remaining_attempts }) => {
                self.code_error = Some(code_mismatch_text(self.language, remaining_attempts));
            }
            Err(AssistantError::AttemptsExhausted) => {
                self.payment = None;
                self.code_error = None;
                self.conversation
                    .notice(format!("⚠ {}", AssistantError::AttemptsExhausted));
            }
            Err(e) => self.code_error = Some(e.to_string()),
        }
    }

    pub fn clear_code_digit(&mut self) {
        if let Some(flow) = self.payment.as_mut() {
            if let Some(slot) = flow.slots().iter().rposition(Option::is_some) {
                flow.clear_digit(slot);
            }
        }
    }

    pub fn resend_code(&mut self) {
        if let Some(flow) = self.payment.as_mut() {
            match flow.resend(Instant::now()) {
                Ok(_) => self.code_error = None,
                Err(e) => self.code_error = Some(e.to_string()),
            }
        }
    }

    /// Dismiss the code popup. Cancels the payment if it is still cancellable.
    pub fn cancel_payment(&mut self) {
        if let Some(mut flow) = self.payment.take() {
            if !flow.state().is_terminal() {
                if let Err(e) = flow.cancel() {
                    log::warn!("{e}");
                    self.payment = Some(flow);
                    return;
                }
            }
        }
        self.code_error = None;
    }

    fn start_settlement(&mut self) {
        let Some(mut flow) = self.payment.take() else {
            return;
        };
        let ledger = Arc::clone(&self.ledger);
        let delay = self.config.settlement_delay();
        self.settling = Some(flow.proposal().clone());
        self.settle_task = Some(tokio::spawn(async move {
            let result = settle(&mut flow, ledger.as_ref(), delay).await;
            (flow, result)
        }));
    }

    fn finish_settlement(&mut self, flow: PaymentFlow, result: paypilot_core::Result<CompletedPayment>) {
        self.settling = None;
        self.code_error = None;
        match result {
            Ok(completed) => {
                if let Some(entry_id) = self.payment_entry.take() {
                    self.paid_entries.insert(entry_id);
                }
                if self.conversation.deliver_completion(&completed) {
                    let receipt = format!(
                        "{} {} → {}",
                        completed.amount, completed.currency, completed.merchant
                    );
                    self.persist_message(&receipt, true);
                }
                self.refresh_wallet();
            }
            Err(e) => {
                log::error!("payment in state {} failed: {e}", flow.state().name());
                self.conversation.notice(format!("⚠ {e}"));
            }
        }
        self.scroll_to_bottom();
    }

    pub fn is_settling(&self) -> bool {
        self.settle_task.is_some()
    }

    pub fn payment_state(&self) -> Option<PaymentState> {
        if self.is_settling() {
            return Some(PaymentState::Verifying);
        }
        self.payment.as_ref().map(PaymentFlow::state)
    }

    pub fn refresh_wallet(&mut self) {
        match self.ledger.cards() {
            Ok(cards) => self.conversation.replace_wallet(cards),
            Err(e) => log::error!("failed to refresh wallet: {e}"),
        }
        match self.ledger.bonus_stats() {
            Ok(stats) => self.bonus_stats = stats,
            Err(e) => log::error!("failed to refresh bonus stats: {e}"),
        }
    }

    // ------------------------------------------------------------------
    // Pickers
    // ------------------------------------------------------------------

    pub fn open_quick_actions(&mut self) {
        self.show_quick_actions = true;
        self.quick_action_state.select(Some(0));
    }

    pub fn quick_action_nav_down(&mut self) {
        let i = self.quick_action_state.selected().unwrap_or(0);
        self.quick_action_state
            .select(Some((i + 1).min(QUICK_ACTIONS.len() - 1)));
    }

    pub fn quick_action_nav_up(&mut self) {
        let i = self.quick_action_state.selected().unwrap_or(0);
        self.quick_action_state.select(Some(i.saturating_sub(1)));
    }

    /// Put the chosen prompt, minus its decoration, into the input box.
    pub fn select_quick_action(&mut self) {
        if let Some(action) = self
            .quick_action_state
            .selected()
            .and_then(|i| QUICK_ACTIONS.get(i))
        {
            self.input = strip_symbols(action);
            self.cursor = self.input.chars().count();
            self.input_mode = InputMode::Editing;
        }
        self.show_quick_actions = false;
    }

    pub fn open_model_picker(&mut self) {
        if self.backend_kind != Backend::Gemini {
            self.conversation
                .notice("Model selection is only available with the Gemini backend.");
            return;
        }
        let current = self
            .available_models
            .iter()
            .position(|m| m == &self.config.model)
            .unwrap_or(0);
        self.model_picker_state.select(Some(current));
        self.show_model_picker = true;
    }

    pub fn model_picker_nav_down(&mut self) {
        let len = self.available_models.len();
        if len > 0 {
            let i = self.model_picker_state.selected().unwrap_or(0);
            self.model_picker_state.select(Some((i + 1).min(len - 1)));
        }
    }

    pub fn model_picker_nav_up(&mut self) {
        let i = self.model_picker_state.selected().unwrap_or(0);
        self.model_picker_state.select(Some(i.saturating_sub(1)));
    }

    pub fn select_model(&mut self) {
        if let Some(model) = self
            .model_picker_state
            .selected()
            .and_then(|i| self.available_models.get(i))
        {
            self.config.model = model.clone();
            self.backend = build_backend(&self.config, self.backend_kind);
            if let Err(e) = Config::save_default_model(&self.config.model) {
                log::warn!("failed to save model choice: {e}");
            }
        }
        self.show_model_picker = false;
    }

    // ------------------------------------------------------------------
    // Scrolling
    // ------------------------------------------------------------------

    pub fn tick_animation(&mut self) {
        if self.is_thinking() || self.is_settling() {
            self.animation_frame = (self.animation_frame + 1) % 3;
        }
    }

    pub fn scroll_up(&mut self) {
        self.chat_scroll = self.chat_scroll.saturating_sub(1);
    }

    pub fn scroll_down(&mut self) {
        self.chat_scroll = self.chat_scroll.saturating_add(1);
    }

    /// Scroll so the newest entry (and any "thinking" line) is visible.
    pub fn scroll_to_bottom(&mut self) {
        let wrap_width = if self.chat_width > 0 {
            self.chat_width as usize
        } else {
            50
        };

        let mut total_lines: u16 = 0;
        for entry in self.conversation.entries() {
            total_lines += 1; // role line
            let text = crate::ui::entry_body(entry);
            for line in text.lines() {
                let char_count = line.chars().count();
                total_lines += ((char_count / wrap_width) + 1) as u16;
            }
            total_lines += 1; // blank line after entry
        }
        total_lines += 2; // "Thinking..." indicator

        let visible_height = if self.chat_height > 0 {
            self.chat_height
        } else {
            20
        };
        self.chat_scroll = total_lines.saturating_sub(visible_height);
    }

    pub fn quit(&mut self) {
        self.cancel_turn();
        self.conversation.close();
        self.should_quit = true;
    }
}

fn build_backend(config: &Config, kind: Backend) -> Arc<dyn IntentBackend> {
    let language = config.language();
    match kind {
        Backend::Gemini => {
            let settings = config.model_settings();
            let resolver = match config.gemini_api_key.as_deref().filter(|k| !k.trim().is_empty()) {
                Some(key) => IntentResolver::new(GeminiClient::new(key), settings, language),
                None => IntentResolver::unconfigured(settings, language),
            };
            Arc::new(resolver.with_retry(config.retry_policy()))
        }
        Backend::Function => {
            let url = config.function_url.clone().unwrap_or_default();
            if url.is_empty() {
                log::warn!("no intent function URL configured");
            }
            Arc::new(
                FunctionClient::new(&url, config.access_token.clone(), language)
                    .with_retry(config.retry_policy()),
            )
        }
    }
}

/// Drop emoji and other decoration, keeping letters, digits and basic punctuation.
pub fn strip_symbols(text: &str) -> String {
    static SYMBOLS: OnceLock<Option<Regex>> = OnceLock::new();
    let stripped = match SYMBOLS.get_or_init(|| Regex::new(r"[^\p{L}\p{N}\s.,?!%-]").ok()) {
        Some(re) => re.replace_all(text, "").into_owned(),
        None => text.to_string(),
    };
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// MIME type for an audio file, by extension.
pub fn mime_for_path(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase);
    match ext.as_deref() {
        Some("mp3") => "audio/mpeg",
        Some("wav") => "audio/wav",
        Some("ogg") | Some("opus") => "audio/ogg",
        Some("webm") => "audio/webm",
        Some("aac") => "audio/aac",
        Some("flac") => "audio/flac",
        _ => DEFAULT_AUDIO_MIME,
    }
}

fn read_voice_note(path: &str) -> paypilot_core::Result<UserInput> {
    if path.is_empty() {
        return Err(AssistantError::RecordingFailure("usage: /voice <path>".into()));
    }
    let path = Path::new(path);
    let bytes = std::fs::read(path)
        .map_err(|e| AssistantError::RecordingFailure(format!("{}: {e}", path.display())))?;
    Ok(UserInput::Audio {
        bytes,
        mime_type: mime_for_path(path).to_string(),
    })
}
