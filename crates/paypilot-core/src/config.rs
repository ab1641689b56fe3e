use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::backend::{Backend, RetryPolicy};
use crate::history::DEFAULT_HISTORY_WINDOW;
use crate::locale::Language;
use crate::payment::{CodePolicy, DEFAULT_MAX_ATTEMPTS};
use crate::request::ModelSettings;

const APP_DIR: &str = "paypilot";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    pub backend: Option<String>,
    pub gemini_api_key: Option<String>,
    pub model: String,
    pub temperature: f32,
    pub top_p: f32,
    pub max_output_tokens: u32,
    pub function_url: Option<String>,
    pub access_token: Option<String>,
    pub language: String,
    pub history_window: usize,
    pub code_ttl_secs: u64,
    pub max_code_attempts: u32,
    pub settlement_delay_ms: u64,
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
    pub database_path: Option<PathBuf>,
    pub user_id: String,
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    pub fn new() -> Self {
        let model = ModelSettings::default();
        Self {
            backend: None,
            gemini_api_key: None,
            model: model.model,
            temperature: model.temperature,
            top_p: model.top_p,
            max_output_tokens: model.max_output_tokens,
            function_url: None,
            access_token: None,
            language: Language::default().as_str().to_string(),
            history_window: DEFAULT_HISTORY_WINDOW,
            code_ttl_secs: 60,
            max_code_attempts: DEFAULT_MAX_ATTEMPTS,
            settlement_delay_ms: 1500,
            max_retries: 0,
            retry_base_delay_ms: 400,
            database_path: None,
            user_id: "local".to_string(),
        }
    }

    /// Load from the default location, then apply environment overrides.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(&Self::get_config_path()?)?;
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::new());
        }

        let config_content = fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&config_content)
            .map_err(|e| anyhow!("Invalid config file {}: {}", path.display(), e))?;
        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let config_content = serde_json::to_string_pretty(self)?;
        fs::write(path, config_content)?;
        Ok(())
    }

    pub fn save_default_model(model: &str) -> Result<()> {
        let path = Self::get_config_path()?;
        let mut config = Self::load_from(&path).unwrap_or_else(|_| Self::new());
        config.model = model.to_string();
        config.save_to(&path)
    }

    /// Environment wins over the file for secrets and endpoints.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_blank = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(key) = non_blank("GEMINI_API_KEY") {
            self.gemini_api_key = Some(key);
        }
        if let Some(url) = non_blank("PAYPILOT_FUNCTION_URL") {
            self.function_url = Some(url);
        }
        if let Some(token) = non_blank("PAYPILOT_ACCESS_TOKEN") {
            self.access_token = Some(token);
        }
    }

    /// Explicit choice, else Gemini when a key is present, else the hosted function.
    pub fn backend(&self) -> Backend {
        if let Some(backend) = self.backend.as_deref().and_then(Backend::from_str) {
            return backend;
        }
        if self.gemini_api_key.as_deref().map_or(false, |k| !k.trim().is_empty()) {
            Backend::Gemini
        } else {
            Backend::Function
        }
    }

    pub fn language(&self) -> Language {
        Language::from_str(&self.language).unwrap_or_default()
    }

    pub fn model_settings(&self) -> ModelSettings {
        ModelSettings {
            model: self.model.clone(),
            temperature: self.temperature,
            top_p: self.top_p,
            max_output_tokens: self.max_output_tokens,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries, Duration::from_millis(self.retry_base_delay_ms))
    }

    pub fn code_policy(&self) -> CodePolicy {
        CodePolicy {
            ttl: Duration::from_secs(self.code_ttl_secs.max(1)),
            max_attempts: self.max_code_attempts.max(1),
        }
    }

    pub fn settlement_delay(&self) -> Duration {
        Duration::from_millis(self.settlement_delay_ms)
    }

    pub fn database_path(&self) -> Result<PathBuf> {
        match &self.database_path {
            Some(path) => Ok(path.clone()),
            None => Ok(Self::app_dir()?.join("wallet.db")),
        }
    }

    pub fn log_path() -> Result<PathBuf> {
        Ok(Self::app_dir()?.join("paypilot.log"))
    }

    fn get_config_path() -> Result<PathBuf> {
        Ok(Self::app_dir()?.join("config.json"))
    }

    fn app_dir() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow!("Could not determine config directory"))?;

        Ok(config_dir.join(APP_DIR))
    }
}
