//! # SmartDoc Core
//!
//! Shared logic for SmartDoc's confidence-gated retrieval: data models,
//! cache keys, confidence scoring, the schematic lexicon and locator, the
//! persistence policy, and the store, registry, and vision abstractions.
//!
//! This crate contains no tokio, sqlx, HTTP, or filesystem I/O. In-memory
//! implementations of every trait live here for tests and embedded use.

pub mod cache;
pub mod citation;
pub mod confidence;
pub mod lexicon;
pub mod locator;
pub mod models;
pub mod policy;
pub mod registry;
pub mod store;
pub mod vision;
