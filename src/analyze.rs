//! Analysis entry points.
//!
//! One call runs one forward pass: resolve → extract → request → normalize,
//! then aggregates the budget for display. Nothing is shared between calls,
//! so independent uploads may be analysed concurrently. Dropping the future
//! abandons the pending model call; [`analyze_into_project`] only writes to
//! the store after every other stage has succeeded.

use crate::breakdown::{BreakdownSummary, ScriptBreakdown};
use crate::config::{AnalysisConfig, DEFAULT_PROVIDER};
use crate::error::SceneSplitError;
use crate::pipeline::budget::{self, BudgetDisplay};
use crate::pipeline::extract::{self, ScriptFormat};
use crate::pipeline::input::{self, ScriptSource};
use crate::pipeline::llm::{self, CompletionBackend};
use crate::pipeline::normalize;
use crate::progress::AnalysisStage;
use crate::project::Project;
use crate::store::ProjectStore;
use edgequake_llm::{LLMProvider, ProviderFactory};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Everything one analysis produces.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisOutput {
    pub breakdown: ScriptBreakdown,
    pub summary: BreakdownSummary,
    /// Display lines, see [`budget::aggregate`].
    pub budget: BudgetDisplay,
    pub metadata: AnalysisMetadata,
}

/// Provenance and timings of one analysis.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisMetadata {
    /// None for [`analyze_text`].
    pub filename: Option<String>,
    pub format: Option<ScriptFormat>,
    pub file_size_bytes: Option<usize>,
    /// Characters of extracted text, before truncation.
    pub text_chars: usize,
    /// True when the text exceeded `max_script_chars` and was cut.
    pub truncated: bool,
    pub model: String,
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
    pub extract_duration_ms: u64,
    pub llm_duration_ms: u64,
    pub total_duration_ms: u64,
}

/// Analyse a script file or URL.
///
/// # Errors
/// Input errors (`FileNotFound`, `FileTooLarge`, `UnsupportedFormat`,
/// `ExtractionFailed`), upstream errors (`UpstreamUnavailable`,
/// `UpstreamTimeout`) and `MalformedResponse` when the model returned no JSON.
pub async fn analyze(
    input_str: impl AsRef<str>,
    config: &AnalysisConfig,
) -> Result<AnalysisOutput, SceneSplitError> {
    let input_str = input_str.as_ref();
    info!("Starting analysis: {}", input_str);

    stage_start(config, AnalysisStage::Resolve);
    let source = stage_end(
        config,
        AnalysisStage::Resolve,
        input::resolve_input(
            input_str,
            config.download_timeout_secs,
            config.max_file_size_bytes,
        )
        .await,
        |s| format!("{} bytes", s.bytes.len()),
    )?;

    analyze_bytes(source, config).await
}

/// Analyse an in-memory upload (file content plus filename/content type).
pub async fn analyze_bytes(
    source: ScriptSource,
    config: &AnalysisConfig,
) -> Result<AnalysisOutput, SceneSplitError> {
    let total_start = Instant::now();
    input::check_size(source.bytes.len(), config.max_file_size_bytes)?;

    let format = ScriptFormat::detect(&source.filename, source.content_type.as_deref())?;
    debug!("Detected {} for '{}'", format, source.filename);

    // Fail on a missing API key before spending time on extraction.
    let resolved = resolve_backend(config)?;

    stage_start(config, AnalysisStage::Extract);
    let extract_start = Instant::now();
    let text = stage_end(
        config,
        AnalysisStage::Extract,
        extract::extract_text(&source.bytes, format, config.pdfium_lib_path.as_deref()).await,
        |t| format!("{} chars", t.chars().count()),
    )?;
    let extract_duration_ms = extract_start.elapsed().as_millis() as u64;

    let metadata = AnalysisMetadata {
        filename: Some(source.filename),
        format: Some(format),
        file_size_bytes: Some(source.bytes.len()),
        extract_duration_ms,
        ..Default::default()
    };
    run_breakdown(&text, resolved, metadata, config, total_start).await
}

/// Analyse already-extracted script text.
pub async fn analyze_text(
    text: &str,
    config: &AnalysisConfig,
) -> Result<AnalysisOutput, SceneSplitError> {
    let total_start = Instant::now();
    let text = text.trim();
    if text.is_empty() {
        return Err(SceneSplitError::ExtractionFailed {
            format: ScriptFormat::Txt.label().to_string(),
            detail: "script text is empty".into(),
        });
    }
    let resolved = resolve_backend(config)?;
    run_breakdown(text, resolved, AnalysisMetadata::default(), config, total_start).await
}

/// Analyse an upload and attach the result to a project.
///
/// With `project_id` the existing project (owned by `owner_id`) receives the
/// breakdown; without it a new project titled after the file is created.
/// The store is written once, after the analysis has fully succeeded.
pub async fn analyze_into_project(
    store: &dyn ProjectStore,
    owner_id: &str,
    project_id: Option<&str>,
    source: ScriptSource,
    config: &AnalysisConfig,
) -> Result<(Project, AnalysisOutput), SceneSplitError> {
    if let Some(id) = project_id {
        store.get(owner_id, id)?;
    }

    let filename = source.filename.clone();
    let output = analyze_bytes(source, config).await?;

    stage_start(config, AnalysisStage::Persist);
    let persisted = match project_id {
        Some(id) => store.update(owner_id, id, &|p| {
            Ok(p.with_analysis(Some(&filename), output.breakdown.clone()))
        }),
        None => store.create(
            Project::from_script(owner_id, &filename)
                .with_analysis(Some(&filename), output.breakdown.clone()),
        ),
    };
    let project = stage_end(config, AnalysisStage::Persist, persisted, |p| p.id.clone())?;

    info!("Stored analysis on project {}", project.id);
    Ok((project, output))
}

/// Synchronous wrapper around [`analyze`].
///
/// Creates a temporary tokio runtime internally.
pub fn analyze_sync(
    input_str: impl AsRef<str>,
    config: &AnalysisConfig,
) -> Result<AnalysisOutput, SceneSplitError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| SceneSplitError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(analyze(input_str, config))
}

// ── Internal helpers ─────────────────────────────────────────────────────

struct ResolvedBackend {
    backend: Arc<dyn CompletionBackend>,
    model: String,
}

async fn run_breakdown(
    text: &str,
    resolved: ResolvedBackend,
    mut metadata: AnalysisMetadata,
    config: &AnalysisConfig,
    total_start: Instant,
) -> Result<AnalysisOutput, SceneSplitError> {
    let (prompt_text, truncated) = truncate_chars(text, config.max_script_chars);
    metadata.text_chars = text.chars().count();
    metadata.truncated = truncated;
    if truncated {
        warn!(
            "Script text truncated from {} to {} chars before prompting",
            metadata.text_chars, config.max_script_chars
        );
    }

    stage_start(config, AnalysisStage::Request);
    let llm_start = Instant::now();
    let completion = stage_end(
        config,
        AnalysisStage::Request,
        llm::request_breakdown(resolved.backend.as_ref(), prompt_text, config).await,
        |c| format!("{} output tokens", c.completion_tokens),
    )?;
    metadata.llm_duration_ms = llm_start.elapsed().as_millis() as u64;

    stage_start(config, AnalysisStage::Normalize);
    let breakdown = stage_end(
        config,
        AnalysisStage::Normalize,
        normalize::normalize_response(&completion.content),
        |b| format!("{} scenes", b.scenes.len()),
    )?;

    metadata.model = resolved.model;
    metadata.prompt_tokens = completion.prompt_tokens;
    metadata.completion_tokens = completion.completion_tokens;
    metadata.total_duration_ms = total_start.elapsed().as_millis() as u64;

    info!(
        "Analysis complete: {} scenes, {} characters, {}ms total",
        breakdown.scenes.len(),
        breakdown.characters.len(),
        metadata.total_duration_ms
    );

    Ok(AnalysisOutput {
        summary: breakdown.summary(),
        budget: budget::aggregate(&breakdown.budget),
        breakdown,
        metadata,
    })
}

/// Cut `text` to at most `max` characters on a char boundary.
fn truncate_chars(text: &str, max: usize) -> (&str, bool) {
    match text.char_indices().nth(max) {
        Some((byte_idx, _)) => (&text[..byte_idx], true),
        None => (text, false),
    }
}

fn stage_start(config: &AnalysisConfig, stage: AnalysisStage) {
    debug!("Stage: {}", stage.label());
    if let Some(ref cb) = config.progress_callback {
        cb.on_stage_start(stage);
    }
}

fn stage_end<T>(
    config: &AnalysisConfig,
    stage: AnalysisStage,
    result: Result<T, SceneSplitError>,
    detail: impl FnOnce(&T) -> String,
) -> Result<T, SceneSplitError> {
    if let Some(ref cb) = config.progress_callback {
        match &result {
            Ok(value) => cb.on_stage_complete(stage, &detail(value)),
            Err(e) => cb.on_stage_error(stage, &e.to_string()),
        }
    }
    result
}

fn create_provider(provider_name: &str, model: &str) -> Result<Arc<dyn LLMProvider>, SceneSplitError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        SceneSplitError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

fn from_provider(provider: Arc<dyn LLMProvider>, model: impl Into<String>) -> ResolvedBackend {
    ResolvedBackend {
        backend: Arc::new(provider),
        model: model.into(),
    }
}

/// Resolve the completion backend, from most-specific to least-specific.
///
/// 1. **Pre-built backend** (`config.backend`), used as-is.
/// 2. **Pre-built provider** (`config.provider`).
/// 3. **Named provider + model** (`config.provider_name`); the factory reads
///    the matching API key from the environment.
/// 4. **Environment pair** (`SCENESPLIT_LLM_PROVIDER` + `SCENESPLIT_MODEL`),
///    both non-empty.
/// 5. **`GEMINI_API_KEY`** present ⇒ the `gemini` provider with the
///    configured or default model.
/// 6. **Full auto-detection** via [`ProviderFactory::from_env`].
fn resolve_backend(config: &AnalysisConfig) -> Result<ResolvedBackend, SceneSplitError> {
    if let Some(ref backend) = config.backend {
        return Ok(ResolvedBackend {
            backend: Arc::clone(backend),
            model: config.model_name().to_string(),
        });
    }

    if let Some(ref provider) = config.provider {
        return Ok(from_provider(Arc::clone(provider), config.model_name()));
    }

    if let Some(ref name) = config.provider_name {
        let model = config.model_name();
        return Ok(from_provider(create_provider(name, model)?, model));
    }

    if let (Ok(prov), Ok(model)) = (
        std::env::var("SCENESPLIT_LLM_PROVIDER"),
        std::env::var("SCENESPLIT_MODEL"),
    ) {
        if !prov.is_empty() && !model.is_empty() {
            return Ok(from_provider(create_provider(&prov, &model)?, model));
        }
    }

    if std::env::var("GEMINI_API_KEY").is_ok_and(|k| !k.is_empty()) {
        let model = config.model_name();
        return Ok(from_provider(create_provider(DEFAULT_PROVIDER, model)?, model));
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| SceneSplitError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set GEMINI_API_KEY, or SCENESPLIT_LLM_PROVIDER and SCENESPLIT_MODEL.\n\
                Error: {}",
                e
            ),
        })?;

    Ok(from_provider(llm_provider, "auto"))
}
