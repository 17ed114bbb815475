//! # SmartDoc
//!
//! Confidence-gated document retrieval. Queries are answered from an
//! indexed chunk store; when a schematic question comes back with low
//! confidence, the schematic images behind the results are reanalyzed by a
//! vision model with the question in hand, and useful findings are saved
//! back to the store for next time.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────────┐   ┌──────────────┐
//! │  Query   │──▶│ Chunk store  │──▶│  Confidence  │
//! │  (CLI)   │   │ SQLite + vec │   │   scorer     │
//! └──────────┘   └──────────────┘   └──────┬───────┘
//!                                          │ low + schematic
//!                      ┌───────────────────┤
//!                      ▼                   ▼
//!               ┌──────────────┐    ┌──────────────┐
//!               │ Vision cache │◀──▶│   Gemini     │
//!               │  (registry)  │    │   vision     │
//!               └──────────────┘    └──────────────┘
//! ```
//!
//! The domain types and traits live in `smartdoc-core`; this crate supplies
//! the SQLite, HTTP, and filesystem implementations plus the CLI.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`sqlite_store`] | SQLite-backed chunk store |
//! | [`sqlite_registry`] | SQLite-backed source registry, cache, and logs |
//! | [`gemini`] | Gemini vision client |
//! | [`images`] | Filesystem image loading |
//! | [`import`] | Chunk import from JSON Lines |
//! | [`workspace`] | Explicit context for every command |
//! | [`reprocess`] | Per-candidate reanalysis |
//! | [`query`] | The confidence-gated query pipeline |
//! | [`sources`] | Source listing, logs, and removal |
//! | [`stats`] | Registry statistics |

pub mod config;
pub mod db;
pub mod embedding;
pub mod gemini;
pub mod images;
pub mod import;
pub mod migrate;
pub mod query;
pub mod reprocess;
pub mod sources;
pub mod sqlite_registry;
pub mod sqlite_store;
pub mod stats;
pub mod workspace;
