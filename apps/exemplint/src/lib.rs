//! exemplint core library.
//!
//! This crate turns the ✅ GOOD / ❌ BAD code examples of Markdown coding
//! standards into lint rules and checks a source tree against them.
//!
//! High-level modules:
//! - `extract`: Markdown parsing into documents, sections and exemplars.
//! - `synth`: Rule synthesis from BAD exemplars.
//! - `registry`: Immutable rule registry, document discovery and hashing.
//! - `cache`: On-disk registry cache keyed by content hash.
//! - `scan`: Parallel scanner with cancellation.
//! - `output`: Human/JSON/GitHub renderers and the report policy.
//! - `sketch`, `matchers`: Token-level view of sources and rule predicates.
//! - `cli`: CLI argument parsing (binary uses this).
//! - `config`: Discovery and effective configuration resolution.
//! - `models`: Data models for documents, rules, findings and diagnostics.
//! - `utils`: Supporting helpers.
pub mod cache;
pub mod cli;
pub mod config;
pub mod error;
pub mod extract;
pub mod matchers;
pub mod models;
pub mod output;
pub mod registry;
pub mod scan;
pub mod sketch;
pub mod synth;
pub mod utils;

pub use error::{Error, Result};
