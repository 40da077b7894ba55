//! Extraction of code from model replies.

use crate::error::SynthesisError;
use regex::Regex;

/// Pull the fenced code block that closes out a model reply.
///
/// The model is instructed to end every reply with a ``` block; prose may
/// precede it but nothing other than whitespace may follow. A reply
/// without such a block is a `MalformedResponse`, never an empty program.
pub fn final_code_block(text: &str) -> Result<String, SynthesisError> {
    let fence = Regex::new(r"(?s)```\w*\n(.*?)\n```\s*\z")
        .unwrap_or_else(|_| Regex::new("$^").unwrap());

    fence
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .ok_or(SynthesisError::MalformedResponse)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_trailing_block() {
        let reply = "Here you go:\n\n```\n^\\d+$\n```";
        assert_eq!(final_code_block(reply).unwrap(), "^\\d+$");
    }

    #[test]
    fn extracts_block_with_language_tag() {
        let reply = "Some explanation.\n\n```python\nimport sys\nprint(1)\n```\n";
        assert_eq!(final_code_block(reply).unwrap(), "import sys\nprint(1)");
    }

    #[test]
    fn tolerates_trailing_whitespace() {
        let reply = "```\nbody\n```   \n\n";
        assert_eq!(final_code_block(reply).unwrap(), "body");
    }

    #[test]
    fn missing_block_is_malformed_response() {
        let reply = "I could not produce a script for this data.";
        assert!(matches!(
            final_code_block(reply),
            Err(SynthesisError::MalformedResponse)
        ));
    }

    #[test]
    fn block_followed_by_prose_is_malformed() {
        let reply = "```\ncode\n```\nand then some commentary";
        assert!(final_code_block(reply).is_err());
    }
}
