//! Vision reanalysis of one schematic candidate.
//!
//! For a candidate chunk and a query:
//!
//! 1. load the image and fingerprint it;
//! 2. look up `(fingerprint, normalized query)` in the cache, and on a hit
//!    return the cached analysis without calling the vision service;
//! 3. on a miss, call the vision service with bounded retry;
//! 4. cache the analysis (a failed cache write is only logged);
//! 5. ask the persistence policy whether to add it to the store.
//!
//! A persisted analysis gets a deterministic id derived from the cache key,
//! so repeating the same reanalysis never adds a second chunk.

use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Map, Value};

use smartdoc_core::cache::{fingerprint_image, CacheKey};
use smartdoc_core::lexicon;
use smartdoc_core::models::{
    meta, CacheEntry, Chunk, ContentCategory, LogEntry, LogStatus,
};
use smartdoc_core::policy::{PersistenceDecision, PersistenceInput};
use smartdoc_core::vision::{build_prompt, VisionError, VisionService};

use crate::workspace::{RetryPolicy, Workspace};

const STEP: &str = "schematic_reprocess";

/// A successful reanalysis.
#[derive(Debug, Clone, Serialize)]
pub struct Reanalysis {
    /// Id of the chunk that was reanalyzed.
    pub candidate_id: String,
    /// The analysis as a schematic chunk. Present in the store only when
    /// it was persisted now or by an earlier run.
    pub chunk: Chunk,
    pub confidence: f64,
    pub from_cache: bool,
    /// True only when this call added the chunk to the store.
    pub added_to_db: bool,
    pub decision: Option<PersistenceDecision>,
}

/// A candidate that could not be reanalyzed.
#[derive(Debug, Clone, Serialize)]
pub struct CandidateFailure {
    pub chunk_id: String,
    pub source: String,
    pub kind: String,
    pub message: String,
}

impl CandidateFailure {
    fn new(candidate: &Chunk, kind: &str, message: impl Into<String>) -> Self {
        Self {
            chunk_id: candidate.id.clone(),
            source: candidate.source.clone(),
            kind: kind.to_string(),
            message: message.into(),
        }
    }
}

/// Call the vision service, retrying transient failures with exponential
/// backoff until `retry.max_attempts` calls have been made.
pub async fn analyze_with_retry(
    vision: &dyn VisionService,
    image: &[u8],
    prompt: &str,
    retry: &RetryPolicy,
) -> Result<String, VisionError> {
    let mut attempt = 1;
    loop {
        match vision.analyze(image, prompt).await {
            Ok(text) => return Ok(text),
            Err(e) if e.is_transient() && attempt < retry.max_attempts => {
                let delay = retry.delay_after(attempt);
                tracing::warn!(attempt, ?delay, error = %e, "vision call failed, retrying");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Schematic chunk carrying a reanalysis of `candidate`'s image.
pub fn analysis_chunk(
    candidate: &Chunk,
    key: &CacheKey,
    image_ref: &str,
    query: &str,
    analysis: &str,
    confidence: f64,
) -> Chunk {
    let pins: Map<String, Value> = lexicon::extract_pin_mappings(analysis)
        .into_iter()
        .map(|(name, pin)| (name, Value::from(pin)))
        .collect();

    let mut metadata = Map::new();
    metadata.insert(meta::IMAGE_REF.into(), Value::from(image_ref));
    metadata.insert(meta::IMAGE_HASH.into(), Value::from(key.fingerprint.clone()));
    metadata.insert(meta::CONFIDENCE.into(), Value::from(confidence));
    metadata.insert(meta::QUERY_CONTEXT.into(), Value::from(query.trim()));
    metadata.insert(meta::REPROCESSED.into(), Value::from(true));
    metadata.insert(meta::PARENT_CHUNK.into(), Value::from(candidate.id.clone()));
    metadata.insert(meta::PIN_MAPPINGS.into(), Value::Object(pins));
    metadata.insert(
        meta::COMPONENTS.into(),
        Value::from(lexicon::extract_components(analysis)),
    );
    if let Some(title) = candidate.metadata.get(meta::TITLE) {
        metadata.insert(meta::TITLE.into(), title.clone());
    }

    Chunk {
        id: key.chunk_id(),
        content: analysis.to_string(),
        source: candidate.source.clone(),
        source_type: candidate.source_type,
        category: ContentCategory::Schematic,
        location: candidate.location.clone(),
        metadata,
        created_at: Utc::now(),
    }
}

async fn log_best_effort(ws: &Workspace, entry: LogEntry) {
    if let Err(e) = ws.registry.append_log(&entry).await {
        tracing::warn!(source = %entry.source, error = %e, "failed to append processing log");
    }
}

/// Reanalyze one candidate for `query`. `baseline` is the confidence of
/// the retrieval that triggered reprocessing.
pub async fn reanalyze(
    ws: &Workspace,
    candidate: &Chunk,
    query: &str,
    baseline: f64,
) -> Result<Reanalysis, CandidateFailure> {
    let result = run(ws, candidate, query, baseline).await;

    if let Err(ref failure) = result {
        tracing::warn!(
            chunk = %candidate.id,
            kind = %failure.kind,
            "schematic reanalysis failed: {}",
            failure.message
        );
        log_best_effort(
            ws,
            LogEntry::new(
                &candidate.source,
                STEP,
                LogStatus::Failed,
                format!("Reanalysis failed: {}", failure.message),
            )
            .with_details(json!({
                "chunk_id": candidate.id,
                "location": candidate.location,
                "kind": failure.kind,
                "query": query,
            })),
        )
        .await;
    }

    result
}

async fn run(
    ws: &Workspace,
    candidate: &Chunk,
    query: &str,
    baseline: f64,
) -> Result<Reanalysis, CandidateFailure> {
    let image_ref = candidate
        .image_ref()
        .ok_or_else(|| CandidateFailure::new(candidate, "no_image", "chunk has no image reference"))?;

    let image = ws
        .images
        .load(image_ref)
        .await
        .map_err(|e| CandidateFailure::new(candidate, "image", format!("{:#}", e)))?;

    let key = CacheKey::new(fingerprint_image(&image), query);

    match ws.registry.get_cache(&key).await {
        Ok(Some(entry)) => {
            tracing::info!(chunk = %candidate.id, image = image_ref, "schematic cache hit");
            let chunk = analysis_chunk(
                candidate,
                &key,
                image_ref,
                query,
                &entry.analysis,
                entry.confidence,
            );
            return Ok(Reanalysis {
                candidate_id: candidate.id.clone(),
                chunk,
                confidence: entry.confidence,
                from_cache: true,
                added_to_db: false,
                decision: None,
            });
        }
        Ok(None) => {
            tracing::debug!(chunk = %candidate.id, image = image_ref, "schematic cache miss");
        }
        Err(e) => {
            tracing::warn!(error = %e, "schematic cache lookup failed, treating as miss");
        }
    }

    let prompt = build_prompt(query, candidate.location.as_deref());
    let analysis = analyze_with_retry(ws.vision.as_ref(), &image, &prompt, &ws.settings.retry)
        .await
        .map_err(|e| CandidateFailure::new(candidate, e.kind(), e.to_string()))?;

    let confidence = lexicon::estimate_analysis_confidence(&analysis, query);

    let entry = CacheEntry {
        key: key.clone(),
        source: candidate.source.clone(),
        location: candidate.location.clone(),
        last_query: query.to_string(),
        analysis: analysis.clone(),
        confidence,
        analyzed_at: Utc::now(),
    };
    if let Err(e) = ws.registry.put_cache(&entry).await {
        tracing::warn!(error = %e, "failed to cache schematic analysis");
    }

    let decision = ws.policy.decide(&PersistenceInput {
        baseline_confidence: baseline,
        analysis_confidence: confidence,
        analysis: &analysis,
        query,
    });
    tracing::info!(
        chunk = %candidate.id,
        baseline,
        confidence,
        ?decision,
        "persistence decision"
    );

    let chunk = analysis_chunk(candidate, &key, image_ref, query, &analysis, confidence);

    let mut added_to_db = false;
    if decision.should_persist() {
        match ws.store.add(&chunk).await {
            Ok(newly) => added_to_db = newly,
            Err(e) => tracing::warn!(error = %e, "failed to persist schematic analysis"),
        }
    }

    log_best_effort(
        ws,
        LogEntry::new(
            &candidate.source,
            STEP,
            LogStatus::Success,
            format!("Reanalyzed schematic at {}", candidate.location.as_deref().unwrap_or("?")),
        )
        .with_details(json!({
            "chunk_id": chunk.id,
            "parent_chunk_id": candidate.id,
            "confidence": confidence,
            "baseline": baseline,
            "decision": decision,
            "added_to_db": added_to_db,
        })),
    )
    .await;

    Ok(Reanalysis {
        candidate_id: candidate.id.clone(),
        chunk,
        confidence,
        from_cache: false,
        added_to_db,
        decision: Some(decision),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use smartdoc_core::models::SourceType;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    struct Flaky {
        calls: AtomicU32,
        fail_first: u32,
        error: fn() -> VisionError,
    }

    #[async_trait]
    impl VisionService for Flaky {
        async fn analyze(&self, _image: &[u8], _prompt: &str) -> Result<String, VisionError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if n <= self.fail_first {
                Err((self.error)())
            } else {
                Ok("MOSI: D11".to_string())
            }
        }
    }

    fn fast_retry() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(0),
        }
    }

    #[tokio::test]
    async fn test_retry_recovers_from_transient() {
        let vision = Flaky {
            calls: AtomicU32::new(0),
            fail_first: 2,
            error: || VisionError::Transient("503".into()),
        };
        let text = analyze_with_retry(&vision, b"img", "p", &fast_retry())
            .await
            .unwrap();
        assert_eq!(text, "MOSI: D11");
        assert_eq!(vision.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_is_bounded() {
        let vision = Flaky {
            calls: AtomicU32::new(0),
            fail_first: u32::MAX,
            error: || VisionError::Transient("timeout".into()),
        };
        assert!(analyze_with_retry(&vision, b"img", "p", &fast_retry())
            .await
            .is_err());
        assert_eq!(vision.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_auth_errors_not_retried() {
        let vision = Flaky {
            calls: AtomicU32::new(0),
            fail_first: u32::MAX,
            error: || VisionError::Auth("401".into()),
        };
        let err = analyze_with_retry(&vision, b"img", "p", &fast_retry())
            .await
            .unwrap_err();
        assert!(matches!(err, VisionError::Auth(_)));
        assert_eq!(vision.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_analysis_chunk_metadata() {
        let candidate = Chunk {
            id: "parent".to_string(),
            content: "Figure 4".to_string(),
            source: "nano.pdf".to_string(),
            source_type: SourceType::Document,
            category: ContentCategory::Schematic,
            location: Some("4".to_string()),
            metadata: Map::new(),
            created_at: Utc::now(),
        };
        let key = CacheKey::new("fp", "SPI pins");
        let chunk = analysis_chunk(
            &candidate,
            &key,
            "nano/p4.png",
            " SPI pins ",
            "MOSI: D11\nMISO: D12 on ATMEGA328P",
            0.9,
        );
        assert_eq!(chunk.id, key.chunk_id());
        assert!(chunk.is_schematic());
        assert_eq!(chunk.location.as_deref(), Some("4"));
        assert_eq!(chunk.metadata_str(meta::PARENT_CHUNK), Some("parent"));
        assert_eq!(chunk.metadata_str(meta::QUERY_CONTEXT), Some("SPI pins"));
        assert_eq!(chunk.metadata[meta::PIN_MAPPINGS]["MOSI"], "D11");
        assert_eq!(chunk.metadata[meta::COMPONENTS][0], "ATMEGA328P");
        assert_eq!(chunk.metadata[meta::REPROCESSED], true);
    }
}
