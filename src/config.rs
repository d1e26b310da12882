use serde::Deserialize;
use std::collections::HashSet;
use std::{fs, io, path::Path, path::PathBuf};
use thiserror::Error;

use crate::strategy::ProcessingMode;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Read(#[from] io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub llm: LlmSection,
    #[serde(default)]
    pub extraction: ExtractionConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
    /// When set, generated workbooks are also written here and served by
    /// `GET /download/{filename}`.
    #[serde(default)]
    pub output_dir: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            max_body_bytes: default_max_body_bytes(),
            output_dir: None,
        }
    }
}

fn default_bind() -> String {
    "0.0.0.0:5001".to_string()
}

fn default_max_body_bytes() -> usize {
    16 * 1024 * 1024
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmBackend {
    #[default]
    Gemini,
    OpenAi,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmSection {
    #[serde(default)]
    pub backend: LlmBackend,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_gemini")]
    pub gemini: EndpointConfig,
    #[serde(default = "default_openai")]
    pub openai: EndpointConfig,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            backend: LlmBackend::default(),
            timeout_secs: default_timeout_secs(),
            gemini: default_gemini(),
            openai: default_openai(),
        }
    }
}

impl LlmSection {
    /// Endpoint for the selected backend.
    pub fn endpoint(&self) -> &EndpointConfig {
        match self.backend {
            LlmBackend::Gemini => &self.gemini,
            LlmBackend::OpenAi => &self.openai,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct EndpointConfig {
    pub base_url: String,
    pub model: String,
}

fn default_timeout_secs() -> u64 {
    120
}

fn default_gemini() -> EndpointConfig {
    EndpointConfig {
        base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
        model: "gemini-2.0-flash".to_string(),
    }
}

fn default_openai() -> EndpointConfig {
    EndpointConfig {
        base_url: "https://api.openai.com/v1".to_string(),
        model: "gpt-4o-mini".to_string(),
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExtractionConfig {
    /// Strategies in the order they are attempted.
    #[serde(default = "default_strategies")]
    pub strategies: Vec<ProcessingMode>,
    #[serde(default = "default_rasterize")]
    pub rasterize: bool,
    #[serde(default = "default_render_dpi")]
    pub render_dpi: u32,
    #[serde(default = "default_max_text_chars")]
    pub max_text_chars: usize,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            strategies: default_strategies(),
            rasterize: default_rasterize(),
            render_dpi: default_render_dpi(),
            max_text_chars: default_max_text_chars(),
        }
    }
}

fn default_strategies() -> Vec<ProcessingMode> {
    vec![
        ProcessingMode::NativePdf,
        ProcessingMode::Multimodal,
        ProcessingMode::TextOnly,
    ]
}

fn default_rasterize() -> bool {
    true
}

fn default_render_dpi() -> u32 {
    300
}

fn default_max_text_chars() -> usize {
    30_000
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        let cfg: Config = toml::from_str(&content)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Like [`Config::load`], but a missing file yields the defaults.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        match Self::load(path.as_ref()) {
            Err(ConfigError::Read(e)) if e.kind() == io::ErrorKind::NotFound => {
                tracing::warn!(path = %path.as_ref().display(), "Config file not found — using defaults");
                Ok(Self::default())
            }
            other => other,
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.extraction.strategies.is_empty() {
            return Err(ConfigError::Invalid(
                "extraction.strategies must name at least one strategy".to_string(),
            ));
        }
        let mut seen = HashSet::new();
        if let Some(mode) = self.extraction.strategies.iter().find(|m| !seen.insert(**m)) {
            return Err(ConfigError::Invalid(format!(
                "extraction.strategies lists {mode} more than once"
            )));
        }
        if self.extraction.render_dpi == 0 {
            return Err(ConfigError::Invalid("extraction.render_dpi must be > 0".to_string()));
        }
        Ok(())
    }
}
