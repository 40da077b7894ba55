//! Bounded propose/validate retry loop.
//!
//! Pattern inference and script repair share the same shape: ask the
//! model for a candidate, check it against reality, and on failure feed
//! the evidence back and ask again, up to a fixed attempt budget. Both
//! loops run through this one abstraction so the retry accounting and
//! the terminal `Exhausted` error live in a single place.

use crate::error::SynthesisError;
use async_trait::async_trait;

/// Verdict on a single candidate.
pub enum Check {
    Accepted,
    Rejected {
        /// Short account of what went wrong, kept for error reporting.
        diagnostic: String,
        /// Follow-up message phrased for the model's next attempt.
        follow_up: String,
    },
}

#[async_trait]
pub trait Refine {
    type Candidate: Send + Sync;

    /// Produce the next candidate. `feedback` is `None` on the first
    /// attempt and carries the previous rejection afterwards.
    async fn propose(&mut self, feedback: Option<&str>) -> Result<Self::Candidate, SynthesisError>;

    /// Judge a candidate. Rejections are recoverable until the attempt
    /// budget runs out.
    async fn check(&mut self, candidate: &Self::Candidate) -> Check;
}

/// Drive a refinement to acceptance or exhaustion.
///
/// A candidate accepted on attempt `k` is returned immediately with no
/// further proposals. A hard proposal error (e.g. a malformed model
/// reply) aborts the loop; it is not counted as a rejection.
pub async fn run<R: Refine + Send>(
    refinement: &mut R,
    max_attempts: usize,
) -> Result<R::Candidate, SynthesisError> {
    let mut feedback: Option<String> = None;
    let mut last_failure: Option<String> = None;

    for _ in 0..max_attempts {
        let candidate = refinement.propose(feedback.as_deref()).await?;
        match refinement.check(&candidate).await {
            Check::Accepted => return Ok(candidate),
            Check::Rejected {
                diagnostic,
                follow_up,
            } => {
                last_failure = Some(diagnostic);
                feedback = Some(follow_up);
            }
        }
    }

    Err(SynthesisError::Exhausted {
        attempts: max_attempts,
        last_failure: last_failure.unwrap_or_else(|| "no attempts were made".to_string()),
    })
}
