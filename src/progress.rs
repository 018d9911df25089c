//! Progress-callback trait for analysis stage events.
//!
//! Inject an [`Arc<dyn AnalysisProgressCallback>`] via
//! [`crate::config::AnalysisConfigBuilder::progress_callback`] to hear about
//! each pipeline stage as it starts and finishes. The library does not know
//! whether the events end up on a terminal spinner, a WebSocket or a log.
//!
//! # Example
//!
//! ```rust
//! use scenesplit::{AnalysisConfig, AnalysisProgressCallback, AnalysisStage};
//! use std::sync::Arc;
//!
//! struct Printer;
//!
//! impl AnalysisProgressCallback for Printer {
//!     fn on_stage_start(&self, stage: AnalysisStage) {
//!         eprintln!("{} …", stage.label());
//!     }
//! }
//!
//! let config = AnalysisConfig::builder()
//!     .progress_callback(Arc::new(Printer))
//!     .build()
//!     .unwrap();
//! ```

use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// One step of the analysis pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AnalysisStage {
    /// Read the local file or download the URL.
    Resolve,
    /// Pull plain text out of the PDF/TXT/FDX payload.
    Extract,
    /// Wait for the model's reply.
    Request,
    /// Parse and default the reply into a breakdown.
    Normalize,
    /// Write the breakdown to the project store.
    Persist,
}

impl AnalysisStage {
    pub fn label(self) -> &'static str {
        match self {
            AnalysisStage::Resolve => "Reading script",
            AnalysisStage::Extract => "Extracting text",
            AnalysisStage::Request => "Waiting for breakdown",
            AnalysisStage::Normalize => "Normalising breakdown",
            AnalysisStage::Persist => "Saving to project",
        }
    }
}

/// Called by the pipeline around each stage.
///
/// All methods have default no-op implementations. Implementations must be
/// `Send + Sync`: separate uploads may share one callback.
pub trait AnalysisProgressCallback: Send + Sync {
    fn on_stage_start(&self, stage: AnalysisStage) {
        let _ = stage;
    }

    /// `detail` is a short human-readable result, e.g. "12 480 chars".
    fn on_stage_complete(&self, stage: AnalysisStage, detail: &str) {
        let _ = (stage, detail);
    }

    fn on_stage_error(&self, stage: AnalysisStage, error: &str) {
        let _ = (stage, error);
    }
}

/// No-op implementation.
pub struct NoopProgressCallback;

impl AnalysisProgressCallback for NoopProgressCallback {}

/// Convenience alias for a shareable callback.
pub type ProgressCallback = Arc<dyn AnalysisProgressCallback>;
