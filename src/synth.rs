//! Script synthesis and the repair loop.
//!
//! One conversation with the model carries the whole exchange: the
//! initial synthesis request, every failed candidate, and every piece of
//! validation feedback. Each candidate is written to a scratch draft and
//! dry-run against the full dataset; failures go back to the model as a
//! correction request until a candidate validates or the attempt budget
//! runs out.

use crate::error::SynthesisError;
use crate::llm::{final_code_block, Conversation, LlmClient};
use crate::prompts;
use crate::refine::{self, Check, Refine};
use crate::validate::validate_script;
use async_trait::async_trait;
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Ensure a script body opens with an interpreter directive.
pub fn normalize_script(body: &str) -> String {
    if body.starts_with("#!") {
        body.to_string()
    } else {
        format!("#!/usr/bin/env python3\n\n{}", body)
    }
}

fn write_draft(path: &Path, body: &str) -> anyhow::Result<()> {
    fs::write(path, body)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o755))?;
    }
    Ok(())
}

struct ScriptRefinement<'a> {
    client: &'a LlmClient,
    conversation: Conversation,
    instructions: &'a str,
    sample: &'a [String],
    /// Newline-joined full dataset, piped to every dry run.
    data: &'a str,
    draft_path: &'a Path,
    timeout: Duration,
}

#[async_trait]
impl Refine for ScriptRefinement<'_> {
    type Candidate = String;

    async fn propose(&mut self, feedback: Option<&str>) -> Result<String, SynthesisError> {
        match feedback {
            None => {
                eprintln!("  Synthesizing script...");
                self.conversation
                    .push_user(prompts::synthesis_prompt(self.instructions, self.sample));
            }
            Some(follow_up) => {
                self.conversation.push_user(follow_up);
            }
        }

        let response = self.client.send(&self.conversation).await?;
        self.conversation.push_assistant(response.clone());

        let body = normalize_script(&final_code_block(&response)?);
        write_draft(self.draft_path, &body).map_err(SynthesisError::Other)?;

        eprintln!("  Draft saved to {}", self.draft_path.display());
        if std::env::var("DEBUG").is_ok() {
            eprintln!("{}", body);
        }

        Ok(body)
    }

    async fn check(&mut self, _candidate: &String) -> Check {
        match validate_script(self.draft_path, self.data, self.timeout) {
            Ok(()) => Check::Accepted,
            Err(failure) => {
                let diagnostic = failure.to_string();
                eprintln!("  Script failed with error:\n\n{}", diagnostic);
                Check::Rejected {
                    follow_up: prompts::script_repair_prompt(&diagnostic),
                    diagnostic,
                }
            }
        }
    }
}

/// Synthesize a script for `instructions` against the sampled lines,
/// repairing it until it survives a dry run over the full dataset.
///
/// Returns the accepted script body; the draft file is discarded either
/// way, and nothing is cached here.
pub async fn synthesize_script(
    client: &LlmClient,
    instructions: &str,
    sample: &[String],
    full_lines: &[String],
    max_attempts: usize,
    timeout: Duration,
) -> Result<String, SynthesisError> {
    let draft = tempfile::Builder::new()
        .prefix("plotgen-draft-")
        .suffix(".py")
        .tempfile()
        .map_err(|e| SynthesisError::Other(e.into()))?;

    let data = full_lines.join("\n");
    let mut refinement = ScriptRefinement {
        client,
        conversation: Conversation::new(),
        instructions,
        sample,
        data: &data,
        draft_path: draft.path(),
        timeout,
    };

    refine::run(&mut refinement, max_attempts).await
}
