//! Error types for the scenesplit library.
//!
//! Every failure is scoped to a single analysis or store request; nothing in
//! here is fatal to the host process. The variants fall into three groups:
//!
//! * **Client input**: [`SceneSplitError::UnsupportedFormat`],
//!   [`SceneSplitError::ExtractionFailed`], [`SceneSplitError::FileTooLarge`].
//!   Surface these to the user verbatim.
//!
//! * **Transient upstream**: [`SceneSplitError::UpstreamUnavailable`],
//!   [`SceneSplitError::UpstreamTimeout`] and the download failures.
//!   [`SceneSplitError::is_transient`] is true for these and
//!   [`SceneSplitError::retry_hint`] carries the suggestion to show. The
//!   library never retries on its own.
//!
//! * **Model output**: [`SceneSplitError::MalformedResponse`] is raised only
//!   when the response contains no parsable JSON object at all. Missing or
//!   extra fields are tolerated by the normaliser.

use std::path::PathBuf;
use thiserror::Error;

/// All errors returned by the scenesplit library.
#[derive(Debug, Error)]
pub enum SceneSplitError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("Script file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    /// Upload is larger than the configured limit.
    #[error("File too large: {size} bytes (maximum {max} bytes)")]
    FileTooLarge { size: usize, max: usize },

    // ── Extraction errors ─────────────────────────────────────────────────
    /// Extension or content type is not one of PDF, TXT/Fountain, FDX.
    #[error("Unsupported script format '{declared}'. Supported: .pdf, .txt, .fountain, .fdx")]
    UnsupportedFormat { declared: String },

    /// The file was recognised but no text could be pulled out of it.
    #[error("Failed to extract text from {format} script: {detail}")]
    ExtractionFailed { format: String, detail: String },

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
PDF text extraction needs the pdfium shared library.\n\
  • Install libpdfium system-wide, or\n\
  • Set PDFIUM_LIB_PATH=/path/to/dir-containing-libpdfium.\n"
    )]
    PdfiumBindingFailed(String),

    // ── LLM errors ────────────────────────────────────────────────────────
    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// Network, authentication or provider-side failure.
    #[error("Breakdown service unavailable: {detail}")]
    UpstreamUnavailable { detail: String },

    /// The single bounded wait for the model expired.
    #[error("Breakdown service did not answer within {secs}s")]
    UpstreamTimeout { secs: u64 },

    /// The model's response contained no parsable JSON object.
    #[error("Model response is not a JSON breakdown: {detail}\nResponse starts with: {snippet:?}")]
    MalformedResponse { detail: String, snippet: String },

    // ── Project errors ────────────────────────────────────────────────────
    /// No project with this id is visible to the caller.
    #[error("Project '{id}' not found")]
    ProjectNotFound { id: String },

    /// A budget edit was requested on a project that has no breakdown yet.
    #[error("Project '{id}' has no script analysis yet")]
    NoAnalysis { id: String },

    /// Budget edit named a category outside the fixed seven.
    #[error("Unknown budget category '{0}'. Expected one of: talent, location, propsSet, wardrobeMakeup, sfxVfx, crew, miscellaneous")]
    UnknownBudgetCategory(String),

    /// The persistence adapter could not read or write its backing store.
    #[error("Project store error at '{path}': {detail}")]
    StoreFailed { path: PathBuf, detail: String },

    // ── Configuration ─────────────────────────────────────────────────────
    /// A configuration value is out of range.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl SceneSplitError {
    /// True for failures that may go away on a manual retry.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            SceneSplitError::UpstreamUnavailable { .. }
                | SceneSplitError::UpstreamTimeout { .. }
                | SceneSplitError::DownloadFailed { .. }
                | SceneSplitError::DownloadTimeout { .. }
        )
    }

    /// User-facing retry suggestion for transient failures.
    pub fn retry_hint(&self) -> Option<&'static str> {
        match self {
            SceneSplitError::UpstreamTimeout { .. } => Some(
                "The analysis took too long. Try again, or split the script into smaller parts.",
            ),
            SceneSplitError::UpstreamUnavailable { .. } => {
                Some("The analysis service could not be reached. Please try again in a moment.")
            }
            SceneSplitError::DownloadFailed { .. } | SceneSplitError::DownloadTimeout { .. } => {
                Some("The script could not be downloaded. Check the URL and try again.")
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upstream_errors_are_transient() {
        assert!(SceneSplitError::UpstreamTimeout { secs: 300 }.is_transient());
        assert!(SceneSplitError::UpstreamUnavailable {
            detail: "401".into()
        }
        .is_transient());
        assert!(!SceneSplitError::MalformedResponse {
            detail: "no object".into(),
            snippet: String::new(),
        }
        .is_transient());
        assert!(!SceneSplitError::UnsupportedFormat {
            declared: ".docx".into()
        }
        .is_transient());
    }

    #[test]
    fn retry_hint_only_for_transient() {
        assert!(SceneSplitError::UpstreamTimeout { secs: 5 }
            .retry_hint()
            .is_some());
        assert!(SceneSplitError::ExtractionFailed {
            format: "PDF".into(),
            detail: "no text".into(),
        }
        .retry_hint()
        .is_none());
    }

    #[test]
    fn timeout_display_mentions_seconds() {
        let e = SceneSplitError::UpstreamTimeout { secs: 300 };
        assert!(e.to_string().contains("300s"), "got: {e}");
    }

    #[test]
    fn unsupported_format_display() {
        let e = SceneSplitError::UnsupportedFormat {
            declared: ".docx".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains(".docx"));
        assert!(msg.contains(".fdx"));
    }
}
