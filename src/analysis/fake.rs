//! Scripted in-process analyzer
//!
//! [`ScriptedAnalyzer`] replays queued results instead of calling a model.
//! Integration tests use it to drive the controller deterministically, and
//! it records every image it was asked to analyze.

use crate::analysis::{AnalysisError, AnalyzeProblemInput, AnalyzeProblemOutput, ProblemAnalyzer};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

type Scripted = Result<AnalyzeProblemOutput, AnalysisError>;

/// Analyzer that answers from a queue of scripted results
///
/// # Examples
///
/// ```
/// use examsnap::analysis::{AnalyzeProblemInput, ProblemAnalyzer, ScriptedAnalyzer};
///
/// # #[tokio::main]
/// # async fn main() {
/// let analyzer = ScriptedAnalyzer::new();
/// analyzer.push_success("Factor the quadratic.", "Quadratics");
/// analyzer.push_failure("network timeout");
///
/// let input = AnalyzeProblemInput { problem_image: "data:image/png;base64,AAAA".into() };
/// assert!(analyzer.analyze(input.clone()).await.is_ok());
/// assert_eq!(analyzer.analyze(input).await.unwrap_err().to_string(), "network timeout");
/// assert_eq!(analyzer.call_count(), 2);
/// # }
/// ```
#[derive(Default)]
pub struct ScriptedAnalyzer {
    script: Mutex<VecDeque<Scripted>>,
    calls: Mutex<Vec<AnalyzeProblemInput>>,
    delay: Option<Duration>,
}

impl ScriptedAnalyzer {
    /// Creates an analyzer with an empty script
    pub fn new() -> Self {
        Self::default()
    }

    /// Delays every answer, simulating a slow model
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Queues a successful answer
    pub fn push_success(&self, advice: impl Into<String>, concepts: impl Into<String>) {
        self.push(Ok(AnalyzeProblemOutput {
            advice: advice.into(),
            concepts: concepts.into(),
        }));
    }

    /// Queues a failure whose message is shown to the user
    pub fn push_failure(&self, message: impl Into<String>) {
        self.push(Err(AnalysisError::Remote(message.into())));
    }

    fn push(&self, result: Scripted) {
        self.script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(result);
    }

    /// Number of analysis calls made so far
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Images passed to each call, oldest first
    pub fn received_images(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|input| input.problem_image.clone())
            .collect()
    }
}

#[async_trait]
impl ProblemAnalyzer for ScriptedAnalyzer {
    async fn analyze(&self, input: AnalyzeProblemInput) -> Scripted {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(input);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        self.script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
            .unwrap_or_else(|| {
                Err(AnalysisError::Remote(
                    "No scripted analysis result left".to_string(),
                ))
            })
    }

    fn describe(&self) -> String {
        "scripted".to_string()
    }
}
