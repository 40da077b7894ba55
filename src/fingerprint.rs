//! Structural pattern derivation for incoming data.
//!
//! A pattern is a line-anchored regex that stands in for "this data has
//! the same shape as a dataset we've seen before". Two strategies derive
//! one:
//!
//! - `Llm`: ask the model for a regex, verify it against every line, and
//!   feed mismatches back until it matches or the budget runs out.
//! - `Literal`: generalize the sample lines themselves, digit runs to
//!   `\d+` and whitespace runs to `\s+`. Never fails, generalizes weakly.

use crate::error::SynthesisError;
use crate::llm::{final_code_block, Conversation, LlmClient};
use crate::prompts;
use crate::refine::{self, Check, Refine};
use async_trait::async_trait;
use clap::ValueEnum;
use regex::Regex;

/// How many lines seed the representative sample.
pub const REPRESENTATIVE_LINES: usize = 5;

/// How many mismatches to report back to the model per round.
const MAX_REPORTED_FAILURES: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum FingerprintStrategy {
    /// Model-driven inference with verification and repair
    Llm,
    /// Deterministic generalization of the sample lines
    Literal,
}

/// Result of pattern derivation: the pattern plus the representative
/// lines that justified it (used downstream as the synthesis sample).
#[derive(Debug, Clone)]
pub struct Fingerprint {
    pub pattern: String,
    pub representative: Vec<String>,
}

/// Lines the pattern fails to match, capped for prompt hygiene.
fn collect_failures(pattern: &Regex, lines: &[String]) -> Vec<String> {
    lines
        .iter()
        .filter(|line| !pattern.is_match(line))
        .take(MAX_REPORTED_FAILURES)
        .cloned()
        .collect()
}

/// Why a candidate pattern was rejected.
#[derive(Debug)]
enum PatternFailure {
    /// The candidate is not a valid regex.
    Invalid(String),
    /// The candidate compiled but missed these lines.
    Mismatches(Vec<String>),
}

fn evaluate_pattern(candidate: &str, lines: &[String]) -> Option<PatternFailure> {
    let compiled = match Regex::new(candidate) {
        Ok(re) => re,
        Err(err) => return Some(PatternFailure::Invalid(err.to_string())),
    };
    let failures = collect_failures(&compiled, lines);
    if failures.is_empty() {
        None
    } else {
        Some(PatternFailure::Mismatches(failures))
    }
}

struct PatternRefinement<'a> {
    client: &'a LlmClient,
    conversation: Conversation,
    lines: &'a [String],
    representative: Vec<String>,
    round: usize,
}

#[async_trait]
impl Refine for PatternRefinement<'_> {
    type Candidate = String;

    async fn propose(&mut self, feedback: Option<&str>) -> Result<String, SynthesisError> {
        match feedback {
            None => {
                self.conversation
                    .push_user(prompts::pattern_inference_prompt(&self.representative));
            }
            Some(follow_up) => {
                self.conversation.push_user(follow_up);
            }
        }

        let response = self.client.send(&self.conversation).await?;
        self.conversation.push_assistant(response.clone());

        let pattern = final_code_block(&response)?;
        if self.round == 0 {
            eprintln!("  Initial regex attempt: {}", pattern);
        } else {
            eprintln!("  Attempt {} at regex: {}", self.round, pattern);
        }
        self.round += 1;
        Ok(pattern)
    }

    async fn check(&mut self, candidate: &String) -> Check {
        match evaluate_pattern(candidate, self.lines) {
            None => {
                eprintln!("  Found a regex that matches all lines: {}", candidate);
                Check::Accepted
            }
            Some(PatternFailure::Invalid(err)) => {
                eprintln!("  Regex failed to compile: {}", err);
                Check::Rejected {
                    follow_up: prompts::pattern_invalid_prompt(&err),
                    diagnostic: format!("invalid regex: {}", err),
                }
            }
            Some(PatternFailure::Mismatches(failures)) => {
                eprintln!("  Regex failed to match: {:?}", failures);
                // Failing lines join the representative set so the context
                // the model sees grows monotonically across rounds.
                self.representative.extend(failures.clone());
                Check::Rejected {
                    follow_up: prompts::pattern_repair_prompt(&failures.join("\n")),
                    diagnostic: failures.join("\n"),
                }
            }
        }
    }
}

/// Derive a pattern by asking the model and verifying against every line.
pub async fn infer_pattern(
    client: &LlmClient,
    lines: &[String],
    max_attempts: usize,
) -> Result<Fingerprint, SynthesisError> {
    let representative: Vec<String> = lines.iter().take(REPRESENTATIVE_LINES).cloned().collect();

    let mut refinement = PatternRefinement {
        client,
        conversation: Conversation::new(),
        lines,
        representative,
        round: 0,
    };

    let pattern = refine::run(&mut refinement, max_attempts).await?;
    Ok(Fingerprint {
        pattern,
        representative: refinement.representative,
    })
}

/// Derive a pattern mechanically from the sample lines.
///
/// Each line becomes a literal alternative with digit runs widened to
/// `\d+` and whitespace runs to `\s+`; a blank line becomes `^$`.
pub fn literal_pattern(lines: &[String]) -> Fingerprint {
    let representative: Vec<String> = lines.iter().take(REPRESENTATIVE_LINES).cloned().collect();

    let mut alternatives: Vec<String> = Vec::new();
    for line in &representative {
        let alt = generalize_line(line);
        if !alternatives.contains(&alt) {
            alternatives.push(alt);
        }
    }
    if alternatives.is_empty() {
        alternatives.push("^$".to_string());
    }

    Fingerprint {
        pattern: alternatives.join("|"),
        representative,
    }
}

fn generalize_line(line: &str) -> String {
    let mut out = String::from("^");
    let mut chars = line.chars().peekable();
    while let Some(c) = chars.next() {
        if c.is_ascii_digit() {
            while matches!(chars.peek(), Some(d) if d.is_ascii_digit()) {
                chars.next();
            }
            out.push_str(r"\d+");
        } else if c.is_whitespace() {
            while matches!(chars.peek(), Some(w) if w.is_whitespace()) {
                chars.next();
            }
            out.push_str(r"\s+");
        } else {
            out.push_str(&regex::escape(&c.to_string()));
        }
    }
    out.push('$');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn literal_pattern_matches_sample_and_generalizes_digits() {
        let sample = lines(&["1,2", "3,4", "5,6"]);
        let fp = literal_pattern(&sample);
        let re = Regex::new(&fp.pattern).unwrap();
        for line in &sample {
            assert!(re.is_match(line), "pattern must match sample line {}", line);
        }
        assert!(re.is_match("10,20"));
        assert!(!re.is_match("a,b"));
    }

    #[test]
    fn literal_pattern_generalizes_whitespace_runs() {
        let sample = lines(&["2020 1", "2021\t\t42"]);
        let fp = literal_pattern(&sample);
        let re = Regex::new(&fp.pattern).unwrap();
        assert!(re.is_match("1999   7"));
        assert!(!re.is_match("1999seven"));
    }

    #[test]
    fn literal_pattern_escapes_regex_metacharacters() {
        let sample = lines(&["a+b=3 (approx.)"]);
        let fp = literal_pattern(&sample);
        let re = Regex::new(&fp.pattern).unwrap();
        assert!(re.is_match("a+b=7 (approx.)"));
        assert!(!re.is_match("aXb=7 (approxZ)"));
    }

    #[test]
    fn literal_pattern_dedupes_identical_shapes() {
        let sample = lines(&["1,2", "3,4"]);
        let fp = literal_pattern(&sample);
        assert_eq!(fp.pattern, r"^\d+,\d+$");
    }

    #[test]
    fn literal_pattern_maps_blank_line_to_blank_alternative() {
        let sample = lines(&["", "12"]);
        let fp = literal_pattern(&sample);
        let re = Regex::new(&fp.pattern).unwrap();
        assert!(re.is_match(""));
        assert!(re.is_match("99"));
    }

    #[test]
    fn collect_failures_caps_at_five() {
        let re = Regex::new(r"^\d+$").unwrap();
        let sample = lines(&["a", "b", "c", "d", "e", "f", "g", "1"]);
        let failures = collect_failures(&re, &sample);
        assert_eq!(failures.len(), 5);
        assert_eq!(failures[0], "a");
    }

    #[test]
    fn collect_failures_empty_when_all_match() {
        let re = Regex::new(r"^\d+$").unwrap();
        let sample = lines(&["1", "22", "333"]);
        assert!(collect_failures(&re, &sample).is_empty());
    }

    #[test]
    fn evaluate_pattern_accepts_full_coverage() {
        let sample = lines(&["1,2", "3,4"]);
        assert!(evaluate_pattern(r"^\d+,\d+$", &sample).is_none());
    }

    #[test]
    fn invalid_candidate_gets_compile_feedback_not_mismatch_feedback() {
        let sample = lines(&["1,2"]);
        match evaluate_pattern(r"^(\d+,$", &sample) {
            Some(PatternFailure::Invalid(err)) => {
                let follow_up = prompts::pattern_invalid_prompt(&err);
                assert!(follow_up.contains("not a valid regular expression"));
                assert!(!follow_up.contains("failed to match"));
            }
            other => panic!("expected an invalid-pattern failure, got {:?}", other),
        }
    }

    #[test]
    fn mismatched_candidate_reports_the_missed_lines() {
        let sample = lines(&["1,2", "a,b"]);
        match evaluate_pattern(r"^\d+,\d+$", &sample) {
            Some(PatternFailure::Mismatches(failures)) => {
                assert_eq!(failures, vec!["a,b".to_string()]);
            }
            other => panic!("expected mismatches, got {:?}", other),
        }
    }
}
