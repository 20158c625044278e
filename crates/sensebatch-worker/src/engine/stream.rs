//! Incremental parsing of a streamed JSON answer.

use sensebatch_core::prompt::{parse_answer, OptionSet};
use sensebatch_core::{Result, SenseError};

/// Collects streamed text and reports an answer as soon as the buffer is
/// one complete JSON document naming an acceptable label.
///
/// A prefix that is merely incomplete keeps the stream going. A complete
/// document with an unacceptable label, or text that can never become
/// valid JSON, ends it with `MalformedResponse`.
#[derive(Debug)]
pub struct StreamAccumulator<'a> {
    options: &'a OptionSet,
    text: String,
}

impl<'a> StreamAccumulator<'a> {
    pub fn new(options: &'a OptionSet) -> Self {
        Self {
            options,
            text: String::new(),
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn push(&mut self, chunk: &str) -> Result<Option<String>> {
        self.text.push_str(chunk);
        let candidate = self.text.trim();
        if candidate.is_empty() {
            return Ok(None);
        }
        match serde_json::from_str::<serde_json::Value>(candidate) {
            Ok(_) => parse_answer(candidate, self.options).map(Some),
            Err(e) if e.is_eof() => Ok(None),
            Err(e) => Err(SenseError::MalformedResponse(format!(
                "streamed answer {candidate:?}: {e}"
            ))),
        }
    }

    /// The stream ended before a complete answer arrived.
    pub fn finish(self) -> SenseError {
        SenseError::MalformedResponse(format!(
            "stream ended without a complete answer: {:?}",
            self.text
        ))
    }
}
