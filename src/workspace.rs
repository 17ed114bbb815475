//! The explicit context every command runs against.
//!
//! A [`Workspace`] bundles the settings and the handles the query pipeline
//! needs: chunk store, source registry, vision service, image source, and
//! persistence policy. Nothing is process-global; tests build a workspace
//! from in-memory parts, the CLI opens one from a config file.

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;

use smartdoc_core::policy::PersistencePolicy;
use smartdoc_core::registry::SourceRegistry;
use smartdoc_core::store::VectorStore;
use smartdoc_core::vision::{ImageSource, VisionService};

use crate::config::{Config, RetrievalConfig, VisionConfig};
use crate::db;
use crate::embedding::create_provider;
use crate::gemini::create_vision;
use crate::images::FsImageSource;
use crate::migrate;
use crate::sqlite_registry::SqliteRegistry;
use crate::sqlite_store::SqliteStore;

/// Bounded retry for vision calls: `max_attempts` total, waiting
/// `base_delay * 2^(n-1)` after the n-th failed attempt.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &VisionConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            base_delay: Duration::from_millis(config.backoff_ms),
        }
    }

    /// Delay before retrying after failed attempt `attempt` (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(1u32 << exp)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(1000),
        }
    }
}

/// Tunables the query pipeline reads.
#[derive(Debug, Clone, Default)]
pub struct Settings {
    pub retrieval: RetrievalConfig,
    pub retry: RetryPolicy,
}

impl Settings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            retrieval: config.retrieval.clone(),
            retry: RetryPolicy::from_config(&config.vision),
        }
    }
}

pub struct Workspace {
    pub settings: Settings,
    pub store: Arc<dyn VectorStore>,
    pub registry: Arc<dyn SourceRegistry>,
    pub vision: Arc<dyn VisionService>,
    pub images: Arc<dyn ImageSource>,
    pub policy: Arc<dyn PersistencePolicy>,
}

impl Workspace {
    /// Open the SQLite-backed workspace described by `config`, applying
    /// the schema if needed.
    pub async fn open(config: &Config) -> Result<Self> {
        let pool = db::connect(config).await?;
        migrate::apply(&pool).await?;

        let embedder = create_provider(&config.embedding)?;
        let vision = create_vision(&config.vision)?;

        Ok(Self {
            settings: Settings::from_config(config),
            store: Arc::new(SqliteStore::new(pool.clone(), embedder)),
            registry: Arc::new(SqliteRegistry::new(pool)),
            vision: Arc::from(vision),
            images: Arc::new(FsImageSource::new(config.workspace.images_dir.clone())),
            policy: Arc::new(config.persistence.policy()),
        })
    }

    /// Remove a source everywhere: its chunks from the store, then its
    /// registry record with cache entries and logs. Returns the number of
    /// chunks deleted and whether the source was registered.
    pub async fn remove_source(&self, path: &str) -> Result<(u64, bool)> {
        let chunks = self.store.delete_source(path).await?;
        let registered = self.registry.delete_source(path).await?;
        tracing::info!(source = path, chunks, registered, "removed source");
        Ok((chunks, registered))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles() {
        let retry = RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
        };
        assert_eq!(retry.delay_after(1), Duration::from_millis(100));
        assert_eq!(retry.delay_after(2), Duration::from_millis(200));
        assert_eq!(retry.delay_after(3), Duration::from_millis(400));
    }
}
