//! Error taxonomy for the synthesis pipeline.
//!
//! Only the failures that cross module boundaries live here. Locally
//! recovered conditions (a stored pattern that no longer compiles, a
//! corrupt metadata file) are handled where they occur and never surface
//! as error values.

use thiserror::Error;

/// Failures produced while deriving a pattern or synthesizing a script.
#[derive(Debug, Error)]
pub enum SynthesisError {
    /// The model reply did not end with a fenced code block.
    #[error("model reply did not end with a fenced code block")]
    MalformedResponse,

    /// The retry budget ran out before a candidate validated.
    #[error("gave up after {attempts} attempts; last failure:\n{last_failure}")]
    Exhausted {
        attempts: usize,
        last_failure: String,
    },

    /// Transport failure talking to the model, or any other fault that
    /// ends the current synthesis outright.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
