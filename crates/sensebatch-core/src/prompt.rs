//! The disambiguation prompt shared by the batch builder and the workers.

use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::{Result, SenseError};
use crate::types::{CandidateSense, FALLBACK_CATEGORIES, OTHER_LABEL};

/// Name of the forced function call in tool-calling requests.
pub const TOOL_NAME: &str = "specify_sense";

/// Key carrying the label in the structured answer.
pub const ANSWER_KEY: &str = "sense";

/// The options offered for one unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptionSet {
    pub options: Vec<CandidateSense>,
    /// True when the unit had no stored senses and grammatical categories
    /// are offered instead.
    pub fallback: bool,
}

impl OptionSet {
    pub fn from_candidates(candidates: Vec<CandidateSense>) -> Self {
        if candidates.is_empty() {
            let options = FALLBACK_CATEGORIES
                .iter()
                .map(|c| CandidateSense::new(*c, format!("the word is used as a {c}")))
                .collect();
            Self {
                options,
                fallback: true,
            }
        } else {
            Self {
                options: candidates,
                fallback: false,
            }
        }
    }

    /// Every acceptable answer: the options plus the catch-all.
    pub fn labels(&self) -> Vec<&str> {
        self.options
            .iter()
            .map(|o| o.label.as_str())
            .chain(std::iter::once(OTHER_LABEL))
            .collect()
    }

    pub fn accepts(&self, label: &str) -> bool {
        label == OTHER_LABEL || self.options.iter().any(|o| o.label == label)
    }
}

/// A rendered prompt for one unit.
#[derive(Debug, Clone)]
pub struct SensePrompt {
    pub text: String,
    pub options: OptionSet,
}

impl SensePrompt {
    /// `position` is the 0-based word number; the prompt counts from one.
    pub fn new(sentence: &str, word: &str, position: i64, options: OptionSet) -> Self {
        let mut text = format!(
            "Consider this sentence:\n    {sentence}\nThe word `{word}` (which is word #{}) can have multiple meanings. Which of the following meanings is it being used for in this sentence?\n\n",
            position + 1
        );
        for option in &options.options {
            text.push_str(&format!(" ({}) -- {}", option.label, option.description));
            if let Some(example) = option.example.as_deref().filter(|e| !e.trim().is_empty()) {
                text.push_str(&format!("\n       Example use: {example}"));
            }
            text.push_str("\n\n");
        }
        text.push_str(&format!(
            " {OTHER_LABEL} -- none of those meanings match the word's meaning here\n"
        ));
        Self { text, options }
    }

    /// The prompt with the JSON answer instruction appended, for engines
    /// without tool calling.
    pub fn with_json_instruction(&self) -> String {
        format!(
            "{}\n\nAnswer in JSON format, with a key of \"{ANSWER_KEY}\", e.g.\n\n{{\n    \"{ANSWER_KEY}\": \"{}\"\n}}\n",
            self.text,
            self.options
                .options
                .first()
                .map(|o| o.label.as_str())
                .unwrap_or(OTHER_LABEL)
        )
    }

    /// Function schema whose `sense` enum is exactly the acceptable labels.
    pub fn tool(&self) -> Value {
        json!({
            "type": "function",
            "function": {
                "name": TOOL_NAME,
                "description": "Specify which meaning the word is being used for",
                "parameters": {
                    "type": "object",
                    "properties": {
                        ANSWER_KEY: {
                            "type": "string",
                            "enum": self.options.labels(),
                            "description": format!(
                                "Which meaning the word corresponds to, or '{OTHER_LABEL}' if none of the supplied meanings are appropriate"
                            ),
                        }
                    },
                    "required": [ANSWER_KEY],
                },
            },
        })
    }

    pub fn tool_choice() -> Value {
        json!({ "type": "function", "function": { "name": TOOL_NAME } })
    }
}

#[derive(Debug, Deserialize)]
struct Answer {
    sense: String,
}

/// Parse a structured answer and check it names an offered label.
pub fn parse_answer(raw: &str, options: &OptionSet) -> Result<String> {
    let answer: Answer = serde_json::from_str(raw)
        .map_err(|e| SenseError::MalformedResponse(format!("answer {raw:?}: {e}")))?;
    let label = answer.sense.trim();
    if !options.accepts(label) {
        return Err(SenseError::MalformedResponse(format!(
            "label {label:?} is not one of the offered options"
        )));
    }
    Ok(label.to_string())
}
