use rust_decimal::Decimal;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Language {
    #[default]
    Az,
    En,
}

impl Language {
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Az => "az",
            Language::En => "en",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "az" | "azerbaijani" => Some(Language::Az),
            "en" | "english" => Some(Language::En),
            _ => None,
        }
    }

    pub fn all() -> Vec<Language> {
        vec![Language::Az, Language::En]
    }
}

/// Canned replies substituted for a model answer when the call cannot
/// produce one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FixedReply {
    SessionExpired,
    ServiceUnavailable,
    ConnectionError,
    NoResponse,
    AudioFailed,
    NotConfigured,
    Welcome,
}

impl FixedReply {
    pub fn text(&self, lang: Language) -> &'static str {
        match (self, lang) {
            (FixedReply::SessionExpired, Language::Az) => {
                "Sessiyanız bitib. Zəhmət olmasa yenidən giriş edin."
            }
            (FixedReply::SessionExpired, Language::En) => "Your session has expired. Please sign in again.",
            (FixedReply::ServiceUnavailable, Language::Az) => "Xidmət müvəqqəti əlçatmazdır.",
            (FixedReply::ServiceUnavailable, Language::En) => "Service temporarily unavailable.",
            (FixedReply::ConnectionError, Language::Az) => {
                "Bağlantı xətası. İnterneti və ya girişi yoxlayın."
            }
            (FixedReply::ConnectionError, Language::En) => {
                "Connection error. Check your internet connection or sign-in."
            }
            (FixedReply::NoResponse, Language::Az) => "AI cavab vermədi. Yenidən cəhd edin.",
            (FixedReply::NoResponse, Language::En) => "The assistant did not answer. Please try again.",
            (FixedReply::AudioFailed, Language::Az) => {
                "Səs faylını emal edə bilmədim. Zəhmət olmasa yenidən danışın və ya mesaj yazın."
            }
            (FixedReply::AudioFailed, Language::En) => {
                "I could not process the voice message. Please speak again or type instead."
            }
            (FixedReply::NotConfigured, Language::Az) => "AI xidməti aktiv deyil (API açarı yoxdur).",
            (FixedReply::NotConfigured, Language::En) => "The AI service is not configured (missing API key).",
            (FixedReply::Welcome, Language::Az) => {
                "Salam! Mən sənin maliyyə dostunam. Bu gün necə kömək edə bilərəm?\n\nNümunə əmrlər:\n• \"ABB kartından işıq haqqı 25 AZN ödə\"\n• \"Azercell 10 AZN artır\"\n• \"Kino üçün hansı kart yaxşıdır?\""
            }
            (FixedReply::Welcome, Language::En) => {
                "Hello! I am your AI banking assistant. How can I help you today?\n\nExample commands:\n• \"Pay electricity bill 25 AZN from ABB\"\n• \"Top up Azercell 10 AZN\"\n• \"Which card is best for cinema?\""
            }
        }
    }
}

pub fn code_mismatch_text(lang: Language, remaining_attempts: u32) -> String {
    match lang {
        Language::Az => format!("Kod yanlışdır. {} cəhd qalıb.", remaining_attempts),
        Language::En if remaining_attempts == 1 => "Incorrect code. 1 attempt left.".to_string(),
        Language::En => format!("Incorrect code. {} attempts left.", remaining_attempts),
    }
}

pub fn bonus_text(lang: Language, partner: &str, bonus: Decimal, currency: &str) -> String {
    match lang {
        Language::Az => format!(
            "Təbriklər! {} ilə ödənişdən {} {} bonus qazandınız!",
            partner, bonus, currency
        ),
        Language::En => format!(
            "Congratulations! You earned {} {} bonus from {}!",
            bonus, currency, partner
        ),
    }
}
