//! Assisted venue approval: concurrent validation pipeline and decision
//! engine.
//!
//! The library drives user-submitted venue records through external
//! enrichment, language-model scoring, and a deterministic decision
//! function, landing each record in one of three terminal states
//! (approved, rejected, manual review) with a durable validation-history
//! trail and field-level replacement auditing.

pub mod api;
pub mod breaker;
pub mod config;
pub mod decision;
pub mod domain;
pub mod drafts;
pub mod enrichment;
pub mod error;
pub mod metrics;
pub mod persistence;
pub mod pipeline;
pub mod quality;
pub mod scoring;

pub use config::Config;
pub use error::{ExternalSystem, PipelineError, PipelineResult};
