//! Per-subject transcript and prompt assembly.

use sha2::{Digest, Sha256};

use tourledger_shared::Message;

/// Appended when a transcript is cut to fit the oracle's context.
pub const TRUNCATION_MARKER: &str = "\n\n[... transcript truncated ...]";

/// One subject's messages joined for the oracle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transcript {
    pub text: String,
    /// SHA-256 of `text`, hex encoded.
    pub hash: String,
    pub message_count: usize,
    pub truncated: bool,
}

impl Transcript {
    /// Join message bodies oldest first, one per line, keeping at most
    /// `max_chars` characters.
    pub fn build(messages: &[Message], max_chars: usize) -> Self {
        let joined = messages
            .iter()
            .map(|m| m.body.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        let (text, truncated) = truncate_chars(&joined, max_chars);
        Self {
            hash: transcript_hash(&text),
            text,
            message_count: messages.len(),
            truncated,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// Hex SHA-256 of a transcript.
pub fn transcript_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// User turn sent alongside the instructions.
pub fn build_prompt(transcript: &Transcript) -> String {
    format!(
        "CLIENT MESSAGES ({count}, oldest first):\n{text}\n\nReturn the JSON list only.",
        count = transcript.message_count,
        text = transcript.text,
    )
}

fn truncate_chars(content: &str, max_chars: usize) -> (String, bool) {
    match content.char_indices().nth(max_chars) {
        None => (content.to_string(), false),
        Some((cut, _)) => (format!("{}{TRUNCATION_MARKER}", &content[..cut]), true),
    }
}
