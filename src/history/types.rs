use crate::data_uri::DataUri;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// A single analyzed submission
///
/// Created only when an analysis call succeeds and never modified afterwards.
/// Field names serialize in camelCase so the stored blob keeps the
/// `problemImageUri` shape history readers expect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzedProblem {
    /// Unique identifier (ULID, derived from the creation time)
    pub id: String,
    /// The captured or uploaded image
    pub problem_image_uri: DataUri,
    /// Tutoring explanation; may be empty
    #[serde(default)]
    pub advice: String,
    /// Key concepts summary; may be empty
    #[serde(default)]
    pub concepts: String,
    /// Creation time in epoch milliseconds
    pub timestamp: i64,
}

impl AnalyzedProblem {
    /// Creates a new record stamped with the current time
    ///
    /// # Examples
    ///
    /// ```
    /// use examsnap::data_uri::DataUri;
    /// use examsnap::history::AnalyzedProblem;
    ///
    /// let image = DataUri::parse("data:image/png;base64,AAAA").unwrap();
    /// let problem = AnalyzedProblem::new(image, "Factor first.", "Quadratics");
    /// assert_eq!(problem.id.len(), 26);
    /// assert!(problem.timestamp > 0);
    /// ```
    pub fn new(
        problem_image_uri: DataUri,
        advice: impl Into<String>,
        concepts: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        let id = Ulid::from_datetime(now.into()).to_string();
        Self {
            id,
            problem_image_uri,
            advice: advice.into(),
            concepts: concepts.into(),
            timestamp: now.timestamp_millis(),
        }
    }

    /// Creation time as a UTC datetime
    pub fn created_at(&self) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(self.timestamp)
            .single()
            .unwrap_or_default()
    }

    /// True when the model returned neither advice nor concepts
    pub fn is_blank(&self) -> bool {
        self.advice.trim().is_empty() && self.concepts.trim().is_empty()
    }
}
