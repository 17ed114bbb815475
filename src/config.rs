use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use smartdoc_core::confidence::ConfidenceScorer;
use smartdoc_core::policy::DefaultPersistencePolicy;

/// Default location of the config file, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "./config/smartdoc.toml";

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub workspace: WorkspaceConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub persistence: PersistenceConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub vision: VisionConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct WorkspaceConfig {
    /// Root that chunk `image_ref` values are resolved against.
    #[serde(default = "default_images_dir")]
    pub images_dir: PathBuf,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            images_dir: default_images_dir(),
        }
    }
}

fn default_images_dir() -> PathBuf {
    PathBuf::from(".smartdoc/images")
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_schematic_top_k")]
    pub schematic_top_k: usize,
    /// Results kept after merging reprocessed findings.
    #[serde(default = "default_answer_limit")]
    pub answer_limit: usize,
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,
    #[serde(default = "default_high_confidence")]
    pub high_confidence: f64,
    #[serde(default = "default_max_reprocess_candidates")]
    pub max_reprocess_candidates: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            schematic_top_k: default_schematic_top_k(),
            answer_limit: default_answer_limit(),
            confidence_threshold: default_confidence_threshold(),
            high_confidence: default_high_confidence(),
            max_reprocess_candidates: default_max_reprocess_candidates(),
        }
    }
}

impl RetrievalConfig {
    pub fn scorer(&self) -> ConfidenceScorer {
        ConfidenceScorer::new(self.confidence_threshold, self.high_confidence)
    }
}

fn default_top_k() -> usize {
    5
}
fn default_schematic_top_k() -> usize {
    10
}
fn default_answer_limit() -> usize {
    3
}
fn default_confidence_threshold() -> f64 {
    0.6
}
fn default_high_confidence() -> f64 {
    0.8
}
fn default_max_reprocess_candidates() -> usize {
    3
}

#[derive(Debug, Deserialize, Clone)]
pub struct PersistenceConfig {
    #[serde(default = "default_min_confidence_gain")]
    pub min_confidence_gain: f64,
    #[serde(default = "default_high_confidence")]
    pub high_confidence: f64,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            min_confidence_gain: default_min_confidence_gain(),
            high_confidence: default_high_confidence(),
        }
    }
}

impl PersistenceConfig {
    pub fn policy(&self) -> DefaultPersistencePolicy {
        DefaultPersistencePolicy {
            min_gain: self.min_confidence_gain,
            high_confidence: self.high_confidence,
        }
    }
}

fn default_min_confidence_gain() -> f64 {
    0.3
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Ollama base URL. Defaults to `http://localhost:11434`.
    #[serde(default)]
    pub url: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
            url: None,
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct VisionConfig {
    #[serde(default = "default_vision_provider")]
    pub provider: String,
    #[serde(default = "default_vision_model")]
    pub model: String,
    #[serde(default = "default_vision_temperature")]
    pub temperature: f64,
    /// Total attempts per image, including the first.
    #[serde(default = "default_vision_max_attempts")]
    pub max_attempts: u32,
    /// Base delay; attempt `n` waits `backoff_ms * 2^(n-1)` before retrying.
    #[serde(default = "default_vision_backoff_ms")]
    pub backoff_ms: u64,
    #[serde(default = "default_vision_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub url: Option<String>,
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            provider: default_vision_provider(),
            model: default_vision_model(),
            temperature: default_vision_temperature(),
            max_attempts: default_vision_max_attempts(),
            backoff_ms: default_vision_backoff_ms(),
            timeout_secs: default_vision_timeout_secs(),
            url: None,
        }
    }
}

impl VisionConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_vision_provider() -> String {
    "gemini".to_string()
}
fn default_vision_model() -> String {
    "gemini-2.5-pro".to_string()
}
fn default_vision_temperature() -> f64 {
    0.1
}
fn default_vision_max_attempts() -> u32 {
    3
}
fn default_vision_backoff_ms() -> u64 {
    1000
}
fn default_vision_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    /// `tracing` filter directive, overridden by `RUST_LOG`.
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn check_unit(name: &str, value: f64) -> Result<()> {
    if !(0.0..=1.0).contains(&value) {
        anyhow::bail!("{} must be in [0.0, 1.0], got {}", name, value);
    }
    Ok(())
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    parse_config(&content)
}

pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    // Validate retrieval
    let r = &config.retrieval;
    if r.top_k < 1 {
        anyhow::bail!("retrieval.top_k must be >= 1");
    }
    if r.schematic_top_k < r.top_k {
        anyhow::bail!("retrieval.schematic_top_k must be >= retrieval.top_k");
    }
    if r.answer_limit < 1 {
        anyhow::bail!("retrieval.answer_limit must be >= 1");
    }
    check_unit("retrieval.confidence_threshold", r.confidence_threshold)?;
    check_unit("retrieval.high_confidence", r.high_confidence)?;
    if r.high_confidence < r.confidence_threshold {
        anyhow::bail!("retrieval.high_confidence must be >= retrieval.confidence_threshold");
    }

    // Validate persistence
    check_unit(
        "persistence.min_confidence_gain",
        config.persistence.min_confidence_gain,
    )?;
    check_unit(
        "persistence.high_confidence",
        config.persistence.high_confidence,
    )?;

    // Validate embedding
    if config.embedding.is_enabled() {
        if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
            anyhow::bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.model.is_none() {
            anyhow::bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
    }

    match config.embedding.provider.as_str() {
        "disabled" | "openai" | "ollama" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled, openai, or ollama.",
            other
        ),
    }

    // Validate vision
    match config.vision.provider.as_str() {
        "disabled" | "gemini" => {}
        other => anyhow::bail!(
            "Unknown vision provider: '{}'. Must be disabled or gemini.",
            other
        ),
    }
    if config.vision.max_attempts < 1 {
        anyhow::bail!("vision.max_attempts must be >= 1");
    }
    if !(0.0..=2.0).contains(&config.vision.temperature) {
        anyhow::bail!("vision.temperature must be in [0.0, 2.0]");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_gets_defaults() {
        let config = parse_config("[db]\npath = \"x.sqlite\"\n").unwrap();
        assert_eq!(config.retrieval.top_k, 5);
        assert_eq!(config.retrieval.schematic_top_k, 10);
        assert_eq!(config.retrieval.max_reprocess_candidates, 3);
        assert!((config.retrieval.confidence_threshold - 0.6).abs() < 1e-9);
        assert!((config.persistence.min_confidence_gain - 0.3).abs() < 1e-9);
        assert_eq!(config.vision.model, "gemini-2.5-pro");
        assert_eq!(config.vision.max_attempts, 3);
        assert!(!config.embedding.is_enabled());
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_rejects_threshold_out_of_range() {
        let err = parse_config("[db]\npath = \"x\"\n[retrieval]\nconfidence_threshold = 1.5\n")
            .unwrap_err();
        assert!(err.to_string().contains("confidence_threshold"));
    }

    #[test]
    fn test_rejects_narrow_schematic_breadth() {
        let err = parse_config("[db]\npath = \"x\"\n[retrieval]\ntop_k = 8\nschematic_top_k = 4\n")
            .unwrap_err();
        assert!(err.to_string().contains("schematic_top_k"));
    }

    #[test]
    fn test_enabled_embedding_needs_model_and_dims() {
        let err = parse_config("[db]\npath = \"x\"\n[embedding]\nprovider = \"openai\"\n").unwrap_err();
        assert!(err.to_string().contains("embedding.dims"));
    }

    #[test]
    fn test_unknown_providers_rejected() {
        assert!(parse_config("[db]\npath = \"x\"\n[embedding]\nprovider = \"local\"\n").is_err());
        assert!(parse_config("[db]\npath = \"x\"\n[vision]\nprovider = \"openai\"\n").is_err());
    }

    #[test]
    fn test_zero_attempts_rejected() {
        assert!(parse_config("[db]\npath = \"x\"\n[vision]\nmax_attempts = 0\n").is_err());
    }
}
