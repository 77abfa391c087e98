use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub db: DbConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub extraction: ExtractionConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./data/pdfchat.sqlite"),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_embedding_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub url: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: Some("all-minilm-l6-v2".to_string()),
            dims: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_embedding_timeout_secs(),
            url: None,
        }
    }
}

fn default_embedding_provider() -> String {
    "local".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_embedding_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    #[serde(default = "default_generation_provider")]
    pub provider: String,
    #[serde(default = "default_generation_model")]
    pub model: String,
    #[serde(default = "default_generation_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub url: Option<String>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: default_generation_provider(),
            model: default_generation_model(),
            timeout_secs: default_generation_timeout_secs(),
            url: None,
        }
    }
}

fn default_generation_provider() -> String {
    "gemini".to_string()
}
fn default_generation_model() -> String {
    "gemini-2.5-flash".to_string()
}
fn default_generation_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_context_chars")]
    pub context_chars: usize,
    #[serde(default = "default_source_chars")]
    pub source_chars: usize,
    #[serde(default = "default_history_turns")]
    pub history_turns: usize,
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            context_chars: default_context_chars(),
            source_chars: default_source_chars(),
            history_turns: default_history_turns(),
            history_capacity: default_history_capacity(),
        }
    }
}

fn default_top_k() -> usize {
    5
}
fn default_context_chars() -> usize {
    500
}
fn default_source_chars() -> usize {
    200
}
fn default_history_turns() -> usize {
    3
}
fn default_history_capacity() -> usize {
    10
}

#[derive(Debug, Deserialize, Clone)]
pub struct ExtractionConfig {
    #[serde(default = "default_render_images")]
    pub render_images: bool,
    #[serde(default = "default_renderer")]
    pub renderer: String,
    #[serde(default = "default_dpi")]
    pub dpi: u32,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            render_images: default_render_images(),
            renderer: default_renderer(),
            dpi: default_dpi(),
        }
    }
}

fn default_render_images() -> bool {
    true
}
fn default_renderer() -> String {
    "pdftoppm".to_string()
}
fn default_dpi() -> u32 {
    200
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

fn default_bind() -> String {
    "0.0.0.0:8000".to_string()
}
fn default_max_upload_bytes() -> usize {
    20 * 1024 * 1024
}

/// Load configuration from `path`, falling back to defaults when the file
/// does not exist, then apply environment overrides and validate.
///
/// A `.env` file in the working directory is loaded first, if present.
pub fn load_config(path: &Path) -> Result<Config> {
    env_file_loaded(dotenvy::dotenv());

    let mut config: Config = if path.exists() {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&content).with_context(|| "Failed to parse config file")?
    } else {
        Config::default()
    };

    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    validate(&config)?;
    Ok(config)
}

/// A missing `.env` is normal; one that fails to parse is logged and skipped.
fn env_file_loaded<T>(result: dotenvy::Result<T>) -> bool {
    match result {
        Ok(_) => true,
        Err(e) if e.not_found() => false,
        Err(e) => {
            tracing::warn!(error = %e, "ignoring unreadable .env file");
            false
        }
    }
}

/// Overlay environment variables onto a parsed config.
///
/// `lookup` is injected so tests do not have to mutate the process env.
pub fn apply_env_overrides(config: &mut Config, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(path) = lookup("PDFCHAT_INDEX_PATH") {
        config.db.path = PathBuf::from(path);
    }
    if let Some(provider) = lookup("PDFCHAT_EMBEDDING_PROVIDER") {
        config.embedding.provider = provider;
    }
    if let Some(model) = lookup("PDFCHAT_EMBEDDING_MODEL") {
        config.embedding.model = Some(model);
    }
    if let Some(provider) = lookup("PDFCHAT_GENERATION_PROVIDER") {
        config.generation.provider = provider;
    }
    if let Some(model) = lookup("PDFCHAT_GENERATION_MODEL") {
        config.generation.model = model;
    }
    if let Some(bind) = lookup("PDFCHAT_BIND") {
        config.server.bind = bind;
    }
}

pub fn validate(config: &Config) -> Result<()> {
    let retrieval = &config.retrieval;
    if retrieval.top_k < 1 {
        anyhow::bail!("retrieval.top_k must be >= 1");
    }
    if retrieval.context_chars == 0 || retrieval.source_chars == 0 {
        anyhow::bail!("retrieval.context_chars and retrieval.source_chars must be > 0");
    }
    if retrieval.history_turns < 1 {
        anyhow::bail!("retrieval.history_turns must be >= 1");
    }
    if retrieval.history_capacity < retrieval.history_turns {
        anyhow::bail!("retrieval.history_capacity must be >= retrieval.history_turns");
    }

    if config.extraction.dpi == 0 {
        anyhow::bail!("extraction.dpi must be > 0");
    }
    match config.extraction.renderer.as_str() {
        "pdftoppm" | "none" => {}
        other => anyhow::bail!(
            "Unknown page renderer: '{}'. Must be pdftoppm or none.",
            other
        ),
    }

    match config.embedding.provider.as_str() {
        "disabled" | "local" => {}
        "openai" | "ollama" => {
            if config.embedding.model.is_none() {
                anyhow::bail!(
                    "embedding.model must be specified when provider is '{}'",
                    config.embedding.provider
                );
            }
            if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
                anyhow::bail!(
                    "embedding.dims must be > 0 when provider is '{}'",
                    config.embedding.provider
                );
            }
        }
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled, local, openai, or ollama.",
            other
        ),
    }

    match config.generation.provider.as_str() {
        "disabled" | "gemini" | "openai" | "ollama" => {}
        other => anyhow::bail!(
            "Unknown generation provider: '{}'. Must be disabled, gemini, openai, or ollama.",
            other
        ),
    }
    if config.generation.timeout_secs == 0 {
        anyhow::bail!("generation.timeout_secs must be > 0");
    }

    Ok(())
}
