//! Extraction adapter: transcript in, raw oracle text out.
//!
//! The [`Oracle`] trait is the seam to the natural-language service;
//! [`GeminiOracle`] is the production implementation. [`ExtractionAdapter`]
//! pairs an oracle with the fixed [`EXTRACTION_INSTRUCTIONS`] and never
//! retries: a failed call comes back as [`OracleReply::Failed`].

mod gemini;
mod instructions;
mod transcript;

use tracing::{instrument, warn};

use tourledger_shared::{Message, Result};

pub use gemini::GeminiOracle;
pub use instructions::EXTRACTION_INSTRUCTIONS;
pub use transcript::{TRUNCATION_MARKER, Transcript, build_prompt, transcript_hash};

/// A text-in, text-out extraction service.
#[allow(async_fn_in_trait)]
pub trait Oracle {
    /// Model identifier for tracing.
    fn model(&self) -> &str;

    /// Send the instructions and prompt, returning the reply text.
    async fn complete(&self, instructions: &str, prompt: &str) -> Result<String>;
}

/// Outcome of one oracle call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OracleReply {
    /// Raw reply text, not yet validated.
    Ok(String),
    /// The call itself failed; the cause reads `Error: ...`.
    Failed(String),
}

pub struct ExtractionAdapter<O> {
    oracle: O,
    max_transcript_chars: usize,
}

impl<O: Oracle> ExtractionAdapter<O> {
    pub fn new(oracle: O, max_transcript_chars: usize) -> Self {
        Self {
            oracle,
            max_transcript_chars,
        }
    }

    pub fn oracle(&self) -> &O {
        &self.oracle
    }

    /// Join a subject's messages into the transcript sent to the oracle.
    pub fn transcript(&self, messages: &[Message]) -> Transcript {
        Transcript::build(messages, self.max_transcript_chars)
    }

    /// One oracle call for one transcript.
    #[instrument(skip_all, fields(model = %self.oracle.model(), messages = transcript.message_count))]
    pub async fn extract(&self, transcript: &Transcript) -> OracleReply {
        if transcript.truncated {
            warn!(limit = self.max_transcript_chars, "transcript truncated");
        }
        let prompt = build_prompt(transcript);
        match self.oracle.complete(EXTRACTION_INSTRUCTIONS, &prompt).await {
            Ok(text) => OracleReply::Ok(text),
            Err(e) => {
                warn!(error = %e, "oracle call failed");
                OracleReply::Failed(format!("Error: {e}"))
            }
        }
    }
}
