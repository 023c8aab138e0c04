//! Tutor prompt for problem analysis
//!
//! The prompt asks the model to transcribe the photographed problem and to
//! coach the student towards a solution rather than hand over an answer.

/// System instructions sent with every analysis request
pub const TUTOR_SYSTEM_PROMPT: &str = "You are a patient exam tutor. \
Students send you photos of exam problems, often taken on a phone at an angle \
or in poor light. Read the problem carefully before answering.";

/// Generates the user prompt that accompanies the problem image
///
/// # Examples
///
/// ```
/// use examsnap::prompts::generate_tutor_prompt;
///
/// let prompt = generate_tutor_prompt();
/// assert!(prompt.contains("\"advice\""));
/// assert!(prompt.contains("\"concepts\""));
/// ```
pub fn generate_tutor_prompt() -> String {
    r#"The attached image contains an exam problem.

1. Transcribe the problem text from the image (OCR). If parts are illegible,
   say which parts and continue with what you can read.
2. Explain how to approach the problem step by step. Coach the student
   through the reasoning; do not only state the final answer.
3. Summarize the key concepts the problem tests, one per line.

Reply with a single JSON object and nothing else:
{"advice": "<transcription followed by the step-by-step explanation>",
 "concepts": "<key concepts, one per line>"}"#
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_requests_json_fields() {
        let prompt = generate_tutor_prompt();
        assert!(prompt.contains("\"advice\""));
        assert!(prompt.contains("\"concepts\""));
    }

    #[test]
    fn test_prompt_mentions_ocr_and_coaching() {
        let prompt = generate_tutor_prompt().to_lowercase();
        assert!(prompt.contains("ocr"));
        assert!(prompt.contains("step by step"));
    }

    #[test]
    fn test_system_prompt_not_empty() {
        assert!(TUTOR_SYSTEM_PROMPT.contains("tutor"));
    }
}
