//! Pipeline stages for script breakdown.
//!
//! Each submodule implements exactly one transformation step.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ extract ──▶ llm ──▶ normalize ──▶ (store)
//! (path/URL) (PDF/TXT/FDX) (model) (tolerant JSON)
//!                                    │
//!                                    └──▶ budget (display lines)
//! ```
//!
//! 1. [`input`]    : resolve the user-supplied path or URL to script bytes
//! 2. [`extract`]  : pull plain text out of the payload; PDF work runs in
//!    `spawn_blocking` because pdfium is synchronous
//! 3. [`llm`]      : one bounded request to the model; the only stage with
//!    network I/O besides URL download
//! 4. [`normalize`]: turn the raw reply into a fully defaulted
//!    [`crate::ScriptBreakdown`]
//! 5. [`budget`]   : category totals and percentages for display

pub mod budget;
pub mod extract;
pub mod input;
pub mod llm;
pub mod normalize;
