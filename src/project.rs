//! Projects: the unit a breakdown is attached to.
//!
//! A [`Project`] is an immutable snapshot. Every mutation is a pure method
//! returning a new snapshot with a fresh `updated_at`; stores swap whole
//! snapshots and never patch fields in place.

use crate::breakdown::{BreakdownSummary, BudgetCategory, ScriptBreakdown};
use crate::error::SceneSplitError;
use crate::pipeline::{budget, normalize};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use uuid::Uuid;

/// Open, uppercase status label. `ACTIVE` and `COMPLETED` are the usual
/// values, the review loop adds four more, and any other label is accepted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProjectStatus(String);

impl ProjectStatus {
    pub const ACTIVE: &'static str = "ACTIVE";
    pub const COMPLETED: &'static str = "COMPLETED";
    /// Analysis done, waiting for a human to review it.
    pub const AWAITING_FEEDBACK: &'static str = "AWAITING_FEEDBACK";
    pub const COMPLETED_WITH_FEEDBACK: &'static str = "COMPLETED_WITH_FEEDBACK";
    /// Rejected; the reviewer wants the script analysed again.
    pub const PENDING_REVISION: &'static str = "PENDING_REVISION";
    pub const NEEDS_ATTENTION: &'static str = "NEEDS_ATTENTION";

    /// Normalise a label: trimmed, uppercased, inner whitespace as `_`.
    /// A blank label means `ACTIVE`.
    pub fn new(label: &str) -> Self {
        let label = label
            .split_whitespace()
            .collect::<Vec<_>>()
            .join("_")
            .to_uppercase();
        if label.is_empty() {
            return Self::active();
        }
        Self(label)
    }

    pub fn active() -> Self {
        Self(Self::ACTIVE.to_string())
    }

    pub fn completed() -> Self {
        Self(Self::COMPLETED.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ProjectStatus {
    fn default() -> Self {
        Self::active()
    }
}

impl fmt::Display for ProjectStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One reviewer verdict on a project's analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewNote {
    pub approved: bool,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

/// A film project owned by one user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub owner_id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub status: ProjectStatus,
    /// Aggregate of the breakdown's budget categories, in RM.
    #[serde(default)]
    pub budget_total: Option<f64>,
    #[serde(default)]
    pub script_filename: Option<String>,
    #[serde(default)]
    pub analysis_data: Option<ScriptBreakdown>,
    /// Reviewer feedback, oldest first.
    #[serde(default)]
    pub review_notes: Vec<ReviewNote>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Project {
    pub fn new(owner_id: impl Into<String>, title: impl Into<String>) -> Self {
        let now = Utc::now();
        let title = title.into();
        let title = match title.trim() {
            "" => "Untitled project".to_string(),
            t => t.to_string(),
        };
        Self {
            id: Uuid::now_v7().to_string(),
            owner_id: owner_id.into(),
            title,
            description: None,
            status: ProjectStatus::active(),
            budget_total: None,
            script_filename: None,
            analysis_data: None,
            review_notes: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// A new project titled after an uploaded script (`pilot_v2.pdf` → `pilot_v2`).
    pub fn from_script(owner_id: impl Into<String>, filename: &str) -> Self {
        let stem = Path::new(filename)
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        Self::new(owner_id, stem)
    }

    pub fn with_description(&self, description: impl Into<String>) -> Self {
        let description = description.into();
        Self {
            description: (!description.trim().is_empty()).then_some(description),
            ..self.touched()
        }
    }

    pub fn with_title(&self, title: impl Into<String>) -> Self {
        let title = title.into();
        match title.trim() {
            "" => self.clone(),
            t => Self {
                title: t.to_string(),
                ..self.touched()
            },
        }
    }

    pub fn with_status(&self, status: ProjectStatus) -> Self {
        Self {
            status,
            ..self.touched()
        }
    }

    /// Attach a completed analysis, replacing any earlier one.
    pub fn with_analysis(&self, script_filename: Option<&str>, breakdown: ScriptBreakdown) -> Self {
        Self {
            budget_total: Some(budget::aggregate(&breakdown.budget).total),
            script_filename: script_filename
                .map(str::to_string)
                .or_else(|| self.script_filename.clone()),
            analysis_data: Some(breakdown),
            ..self.touched()
        }
    }

    /// Override one budget category and recompute `budget_total`.
    pub fn with_budget_override(
        &self,
        category: BudgetCategory,
        amount: f64,
    ) -> Result<Self, SceneSplitError> {
        let breakdown = self.require_analysis()?.with_budget_amount(category, amount);
        Ok(self.with_analysis(None, breakdown))
    }

    /// Replace the analysis with a hand-edited breakdown.
    ///
    /// `raw` goes through the same normalisation as a model reply, so a
    /// partial document still yields every category and scene field.
    pub fn with_analysis_replaced(&self, raw: &str) -> Result<Self, SceneSplitError> {
        let breakdown = normalize::normalize_response(raw)?;
        Ok(self.with_analysis(None, breakdown))
    }

    /// Queue the analysis for human review.
    pub fn with_review_requested(&self) -> Result<Self, SceneSplitError> {
        self.require_analysis()?;
        Ok(self.with_status(ProjectStatus::new(ProjectStatus::AWAITING_FEEDBACK)))
    }

    /// Record a reviewer verdict.
    ///
    /// Approval → `COMPLETED_WITH_FEEDBACK`. Rejection → `PENDING_REVISION`
    /// when `request_reanalysis`, otherwise `NEEDS_ATTENTION`. Non-blank
    /// `text` is appended to `review_notes`.
    pub fn with_feedback(
        &self,
        approved: bool,
        request_reanalysis: bool,
        text: &str,
    ) -> Result<Self, SceneSplitError> {
        self.require_analysis()?;
        let status = match (approved, request_reanalysis) {
            (true, _) => ProjectStatus::COMPLETED_WITH_FEEDBACK,
            (false, true) => ProjectStatus::PENDING_REVISION,
            (false, false) => ProjectStatus::NEEDS_ATTENTION,
        };
        let mut next = self.with_status(ProjectStatus::new(status));
        let text = text.trim();
        if !text.is_empty() {
            next.review_notes.push(ReviewNote {
                approved,
                text: text.to_string(),
                created_at: next.updated_at,
            });
        }
        Ok(next)
    }

    pub fn summary(&self) -> Option<BreakdownSummary> {
        self.analysis_data.as_ref().map(ScriptBreakdown::summary)
    }

    fn require_analysis(&self) -> Result<&ScriptBreakdown, SceneSplitError> {
        self.analysis_data
            .as_ref()
            .ok_or_else(|| SceneSplitError::NoAnalysis {
                id: self.id.clone(),
            })
    }

    fn touched(&self) -> Self {
        Self {
            updated_at: Utc::now().max(self.updated_at),
            ..self.clone()
        }
    }
}
