//! # scenesplit
//!
//! Break film scripts into scenes, characters, locations, props and a
//! category budget using a hosted language model.
//!
//! ## Pipeline Overview
//!
//! ```text
//! Script (PDF / TXT / Fountain / FDX)
//!  │
//!  ├─ 1. Input      resolve local file or download from URL
//!  ├─ 2. Extract    plain text (pdfium text layer, UTF-8 decode, FDX XML)
//!  ├─ 3. Request    one bounded call to gemini / openai / ollama / …
//!  ├─ 4. Normalize  tolerant JSON → ScriptBreakdown with every field defaulted
//!  ├─ 5. Budget     category totals and percentages for display
//!  └─ 6. Persist    optional: attach to a Project in a ProjectStore
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use scenesplit::{analyze, AnalysisConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from GEMINI_API_KEY / SCENESPLIT_LLM_PROVIDER / …
//!     let config = AnalysisConfig::default();
//!     let output = analyze("pilot.fdx", &config).await?;
//!     for line in &output.budget.lines {
//!         println!("{:<24} {:>5.1}%", line.name, line.percent);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `scenesplit` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! ```toml
//! scenesplit = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod analyze;
pub mod breakdown;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod progress;
pub mod project;
pub mod prompts;
pub mod store;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use analyze::{
    analyze, analyze_bytes, analyze_into_project, analyze_sync, analyze_text, AnalysisMetadata,
    AnalysisOutput,
};
pub use breakdown::{Budget, BudgetCategory, BreakdownSummary, Scene, ScriptBreakdown, TimeOfDay};
pub use config::{AnalysisConfig, AnalysisConfigBuilder};
pub use error::SceneSplitError;
pub use pipeline::budget::{aggregate, BudgetDisplay, BudgetLine};
pub use pipeline::extract::{extract_text, ScriptFormat};
pub use pipeline::input::{resolve_input, ScriptSource};
pub use pipeline::llm::{Completion, CompletionBackend, RequestOptions};
pub use pipeline::normalize::normalize_response;
pub use progress::{AnalysisProgressCallback, AnalysisStage, NoopProgressCallback, ProgressCallback};
pub use project::{Project, ProjectStatus, ReviewNote};
pub use store::{JsonFileStore, MemoryStore, ProjectStore};
