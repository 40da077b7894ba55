//! plotgen library crate
//!
//! Exposes the pipeline modules so unit tests and external tooling can
//! exercise them without going through CLI startup.

pub mod cache;
pub mod config;
pub mod error;
pub mod fingerprint;
pub mod llm;
pub mod matcher;
pub mod prompts;
pub mod refine;
pub mod runner;
pub mod synth;
pub mod validate;
