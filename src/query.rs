//! Confidence-gated query pipeline.
//!
//! # Flow
//!
//! ```text
//! query ──▶ retrieve top-K ──▶ confidence ──▶ low and schematic? ──no──▶ cite
//!                                                     │ yes
//!                                               locate candidates
//!                                                     │
//!                                      reanalyze each (cache / vision)
//!                                                     │
//!                                  merge, rerank, recompute confidence ──▶ cite
//! ```
//!
//! Retrieval breadth is `top_k`, or `schematic_top_k` for schematic
//! queries. Reprocessing runs when the caller forces it or when confidence
//! is low on a schematic query, and only if candidates exist. Low
//! confidence and empty results are normal responses, never errors.

use serde::Serialize;
use std::collections::HashSet;

use smartdoc_core::citation::format_citation;
use smartdoc_core::confidence::{result_score, ConfidenceLevel};
use smartdoc_core::locator;
use smartdoc_core::models::{Chunk, RetrievalFilter, RetrievedChunk, SourceType};

use crate::reprocess::{self, CandidateFailure, Reanalysis};
use crate::workspace::Workspace;

#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("retrieval failed: {0:#}")]
    Retrieval(anyhow::Error),
}

#[derive(Debug, Clone, Default)]
pub struct QueryRequest {
    pub text: String,
    pub filter: RetrievalFilter,
    pub force_reprocess: bool,
}

impl QueryRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    pub fn with_filter(mut self, filter: RetrievalFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn force_reprocess(mut self, force: bool) -> Self {
        self.force_reprocess = force;
        self
    }
}

/// Build a filter from raw command-line values.
pub fn parse_filter(
    source: Option<&str>,
    source_type: Option<&str>,
) -> Result<RetrievalFilter, QueryError> {
    let source = match source.map(str::trim) {
        Some("") => return Err(QueryError::InvalidInput("source filter is empty".into())),
        other => other.map(String::from),
    };
    let source_type = source_type
        .map(|t| t.parse::<SourceType>())
        .transpose()
        .map_err(|e| QueryError::InvalidInput(e.to_string()))?;

    Ok(RetrievalFilter {
        source,
        source_type,
        category: None,
    })
}

/// One surfaced chunk.
#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub chunk: Chunk,
    pub score: f64,
    pub citation: String,
    pub reprocessed: bool,
    pub from_cache: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct QueryResponse {
    pub query: String,
    pub results: Vec<Answer>,
    pub confidence: f64,
    pub confidence_level: ConfidenceLevel,
    /// Confidence of the initial retrieval, before any reanalysis.
    pub initial_confidence: f64,
    pub citations: Vec<String>,
    /// Number of chunks the initial retrieval returned.
    pub total_results: usize,
    pub reprocessed: bool,
    pub from_cache: bool,
    pub added_to_db: bool,
    pub suggestion: Option<String>,
    pub failures: Vec<CandidateFailure>,
}

struct Ranked {
    result: RetrievedChunk,
    reprocessed: bool,
    from_cache: bool,
}

pub struct QueryEngine<'a> {
    ws: &'a Workspace,
}

impl<'a> QueryEngine<'a> {
    pub fn new(ws: &'a Workspace) -> Self {
        Self { ws }
    }

    pub async fn query(&self, request: &QueryRequest) -> Result<QueryResponse, QueryError> {
        let text = request.text.trim();
        if text.is_empty() {
            return Err(QueryError::InvalidInput("query text is empty".into()));
        }

        let settings = &self.ws.settings.retrieval;
        let scorer = settings.scorer();
        let schematic = locator::is_schematic_query(text);
        let top_k = if schematic {
            settings.schematic_top_k
        } else {
            settings.top_k
        };

        tracing::info!(query = text, schematic, top_k, "query received");

        let initial = self
            .ws
            .store
            .query(text, top_k, &request.filter)
            .await
            .map_err(QueryError::Retrieval)?;
        let initial_confidence = scorer.score(&initial);
        let total_results = initial.len();

        tracing::info!(
            results = total_results,
            confidence = initial_confidence,
            level = scorer.classify(initial_confidence).as_str(),
            "initial retrieval"
        );

        let wants_reprocess =
            request.force_reprocess || (scorer.is_low(initial_confidence) && schematic);

        let candidates = if wants_reprocess {
            locator::locate(
                self.ws.store.as_ref(),
                text,
                &initial,
                &request.filter,
                settings.max_reprocess_candidates,
            )
            .await
            .map_err(QueryError::Retrieval)?
        } else {
            Vec::new()
        };

        tracing::info!(
            wanted = wants_reprocess,
            candidates = candidates.len(),
            "reprocessing decision"
        );

        let mut reanalyses: Vec<Reanalysis> = Vec::new();
        let mut failures: Vec<CandidateFailure> = Vec::new();
        let mut seen_chunks: HashSet<String> = HashSet::new();
        for candidate in &candidates {
            match reprocess::reanalyze(self.ws, candidate, text, initial_confidence).await {
                // Two candidates with identical images collapse to one analysis.
                Ok(r) if !seen_chunks.insert(r.chunk.id.clone()) => {}
                Ok(r) => reanalyses.push(r),
                Err(f) => failures.push(f),
            }
        }

        let reprocessed = !reanalyses.is_empty();
        let from_cache = reprocessed && reanalyses.iter().all(|r| r.from_cache);
        let added_to_db = reanalyses.iter().any(|r| r.added_to_db);

        let ranked = if reprocessed {
            merge(&initial, &reanalyses, settings.answer_limit)
        } else {
            initial
                .iter()
                .take(settings.answer_limit)
                .cloned()
                .map(|result| Ranked {
                    result,
                    reprocessed: false,
                    from_cache: false,
                })
                .collect()
        };

        let confidence = if reprocessed {
            let results: Vec<RetrievedChunk> = ranked.iter().map(|r| r.result.clone()).collect();
            scorer.score(&results)
        } else {
            initial_confidence
        };
        let confidence_level = scorer.classify(confidence);

        if reprocessed {
            tracing::info!(
                before = initial_confidence,
                after = confidence,
                added_to_db,
                from_cache,
                "reprocessed schematics"
            );
        }

        let suggestion = if !reprocessed && scorer.is_low(confidence) && schematic {
            Some(suggest(confidence, &candidates, &failures))
        } else {
            None
        };

        let results: Vec<Answer> = ranked
            .into_iter()
            .map(|r| Answer {
                score: result_score(&r.result),
                citation: format_citation(&r.result.chunk),
                chunk: r.result.chunk,
                reprocessed: r.reprocessed,
                from_cache: r.from_cache,
            })
            .collect();

        let mut citations: Vec<String> = Vec::new();
        for answer in &results {
            if !citations.contains(&answer.citation) {
                citations.push(answer.citation.clone());
            }
        }

        Ok(QueryResponse {
            query: text.to_string(),
            results,
            confidence,
            confidence_level,
            initial_confidence,
            citations,
            total_results,
            reprocessed,
            from_cache,
            added_to_db,
            suggestion,
            failures,
        })
    }
}

/// Reanalyses first, then initial results that were neither reanalyzed nor
/// replaced, reranked by score and truncated. Ties keep that order.
fn merge(initial: &[RetrievedChunk], reanalyses: &[Reanalysis], limit: usize) -> Vec<Ranked> {
    let mut replaced: HashSet<&str> = HashSet::new();
    for r in reanalyses {
        replaced.insert(r.candidate_id.as_str());
        replaced.insert(r.chunk.id.as_str());
    }

    let mut merged: Vec<Ranked> = reanalyses
        .iter()
        .map(|r| Ranked {
            result: RetrievedChunk::new(r.chunk.clone(), r.confidence, 0),
            reprocessed: true,
            from_cache: r.from_cache,
        })
        .collect();

    merged.extend(
        initial
            .iter()
            .filter(|r| !replaced.contains(r.chunk.id.as_str()))
            .cloned()
            .map(|result| Ranked {
                result,
                reprocessed: false,
                from_cache: false,
            }),
    );

    merged.sort_by(|a, b| {
        result_score(&b.result)
            .partial_cmp(&result_score(&a.result))
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    merged.truncate(limit);
    for (rank, r) in merged.iter_mut().enumerate() {
        r.result.rank = rank;
    }
    merged
}

fn suggest(confidence: f64, candidates: &[Chunk], failures: &[CandidateFailure]) -> String {
    if candidates.is_empty() {
        format!(
            "Low confidence answer ({:.2}). No schematic diagrams were found for these results; \
             try --source to point at a datasheet.",
            confidence
        )
    } else if !failures.is_empty() {
        format!(
            "Low confidence answer ({:.2}). Schematic reanalysis failed for {} candidate(s); \
             see `smartdoc logs {}`.",
            confidence,
            failures.len(),
            failures[0].source
        )
    } else {
        format!("Low confidence answer ({:.2}).", confidence)
    }
}

/// CLI entry point for `smartdoc query`.
pub async fn run_query(ws: &Workspace, request: &QueryRequest, as_json: bool) -> anyhow::Result<()> {
    let response = QueryEngine::new(ws).query(request).await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&response)?);
        return Ok(());
    }

    println!("Query: {}", response.query);
    println!(
        "Confidence: {:.2} ({})",
        response.confidence,
        response.confidence_level.as_str()
    );
    println!("Found {} results", response.total_results);
    if response.reprocessed {
        println!(
            "Reprocessed schematics (initial confidence {:.2}{}{})",
            response.initial_confidence,
            if response.from_cache { ", from cache" } else { "" },
            if response.added_to_db { ", saved new findings" } else { "" },
        );
    }
    if let Some(ref suggestion) = response.suggestion {
        println!("{}", suggestion);
    }
    for failure in &response.failures {
        println!("  ! {} ({}): {}", failure.chunk_id, failure.kind, failure.message);
    }

    if response.results.is_empty() {
        println!("No results.");
        return Ok(());
    }

    println!();
    println!("Results:");
    println!("{}", "-".repeat(80));
    for (idx, answer) in response.results.iter().enumerate() {
        println!();
        println!("{}. {}", idx + 1, answer.citation);
        println!("   Score: {:.2}", answer.score);
        println!("   {}", preview(&answer.chunk.content, 300));
        if answer.reprocessed {
            println!("   [reanalyzed with query context]");
        }
    }

    Ok(())
}

fn preview(text: &str, max_chars: usize) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() > max_chars {
        let cut: String = flat.chars().take(max_chars).collect();
        format!("{}...", cut)
    } else {
        flat
    }
}
