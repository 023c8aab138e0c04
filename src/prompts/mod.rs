//! Prompts for the problem analysis call
//!
//! The vision model is asked to read the photographed problem and answer
//! with a small JSON object. This module holds the prompt text and the
//! lenient parser for the model's reply.

use crate::analysis::AnalyzeProblemOutput;
use serde::Deserialize;

pub mod tutor_prompt;

pub use tutor_prompt::{generate_tutor_prompt, TUTOR_SYSTEM_PROMPT};

#[derive(Debug, Deserialize)]
struct TutorReply {
    #[serde(default)]
    advice: Option<serde_json::Value>,
    #[serde(default)]
    concepts: Option<serde_json::Value>,
}

/// Parses the model's reply into advice and concepts
///
/// Accepts a bare JSON object, a JSON object wrapped in a Markdown code
/// fence, or plain prose. Prose becomes the advice with empty concepts.
/// List-valued fields are joined one item per line.
///
/// # Examples
///
/// ```
/// use examsnap::prompts::parse_tutor_reply;
///
/// let out = parse_tutor_reply(r#"{"advice":"Isolate x.","concepts":"Linear equations"}"#);
/// assert_eq!(out.advice, "Isolate x.");
/// assert_eq!(out.concepts, "Linear equations");
///
/// let prose = parse_tutor_reply("Start by drawing a diagram.");
/// assert_eq!(prose.advice, "Start by drawing a diagram.");
/// assert!(prose.concepts.is_empty());
/// ```
pub fn parse_tutor_reply(reply: &str) -> AnalyzeProblemOutput {
    let trimmed = strip_code_fence(reply.trim());

    match serde_json::from_str::<TutorReply>(trimmed) {
        Ok(parsed) => AnalyzeProblemOutput {
            advice: flatten_field(parsed.advice),
            concepts: flatten_field(parsed.concepts),
        },
        Err(_) => AnalyzeProblemOutput {
            advice: reply.trim().to_string(),
            concepts: String::new(),
        },
    }
}

fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

fn flatten_field(value: Option<serde_json::Value>) -> String {
    match value {
        None | Some(serde_json::Value::Null) => String::new(),
        Some(serde_json::Value::String(s)) => s.trim().to_string(),
        Some(serde_json::Value::Array(items)) => items
            .into_iter()
            .map(|item| match item {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            })
            .collect::<Vec<_>>()
            .join("\n"),
        Some(other) => other.to_string(),
    }
}
