//! Pipeline integration tests.
//!
//! The model is replaced by a scripted [`CompletionBackend`], so these run
//! offline and need no API key. The one live test at the bottom is gated
//! behind `E2E_ENABLED`, like the other end-to-end checks.
//!
//! Run with:
//!   cargo test --test pipeline
//!
//! Live provider (uses GEMINI_API_KEY or SCENESPLIT_LLM_PROVIDER/SCENESPLIT_MODEL):
//!   E2E_ENABLED=1 cargo test --test pipeline live -- --nocapture

use futures::future::BoxFuture;
use scenesplit::{
    analyze, analyze_bytes, analyze_into_project, analyze_text, AnalysisConfig,
    AnalysisProgressCallback, AnalysisStage, BudgetCategory, Completion, CompletionBackend,
    JsonFileStore, MemoryStore, Project, ProjectStatus, ProjectStore, RequestOptions,
    SceneSplitError, ScriptSource, TimeOfDay,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ── Test helpers ─────────────────────────────────────────────────────────────

const REPLY: &str = r#"Here is the breakdown you asked for:

```json
{
  "scenes": [
    {
      "number": 1,
      "heading": "INT. KITCHEN - NIGHT",
      "characters": ["MAYA", "DEV"],
      "props": ["kettle", "letter"],
      "wardrobe": ["raincoat"],
      "sfx": [],
      "notes": "Rain on the window throughout.",
      "budget": "RM 350"
    },
    {
      "number": "2",
      "heading": "EXT. JETTY - DAWN",
      "characters": ["MAYA"],
      "props": ["rope"],
      "budget": 900
    }
  ],
  "characters": ["MAYA", "DEV", "OLD FISHERMAN"],
  "locations": ["KITCHEN"],
  "budget": {
    "talent": "RM 400",
    "crew": 900,
    "propsSet": "RM 530",
    "location": "RM 300"
  }
}
```
"#;

/// Replies with a fixed result and records what it was asked.
struct ScriptedBackend {
    reply: Result<String, String>,
    calls: AtomicUsize,
    last_message: Mutex<String>,
}

impl ScriptedBackend {
    fn ok(reply: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: Ok(reply.to_string()),
            calls: AtomicUsize::new(0),
            last_message: Mutex::new(String::new()),
        })
    }

    fn failing(detail: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: Err(detail.to_string()),
            calls: AtomicUsize::new(0),
            last_message: Mutex::new(String::new()),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn last_message(&self) -> String {
        self.last_message.lock().unwrap().clone()
    }
}

impl CompletionBackend for ScriptedBackend {
    fn complete<'a>(
        &'a self,
        _system_prompt: &'a str,
        user_message: &'a str,
        _options: RequestOptions,
    ) -> BoxFuture<'a, Result<Completion, String>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_message.lock().unwrap() = user_message.to_string();
        let reply = self.reply.clone();
        Box::pin(async move {
            reply.map(|content| Completion {
                content,
                prompt_tokens: 1200,
                completion_tokens: 640,
            })
        })
    }
}

/// Never answers.
struct SilentBackend;

impl CompletionBackend for SilentBackend {
    fn complete<'a>(
        &'a self,
        _system_prompt: &'a str,
        _user_message: &'a str,
        _options: RequestOptions,
    ) -> BoxFuture<'a, Result<Completion, String>> {
        Box::pin(futures::future::pending())
    }
}

#[derive(Default)]
struct StageLog(Mutex<Vec<String>>);

impl AnalysisProgressCallback for StageLog {
    fn on_stage_complete(&self, stage: AnalysisStage, _detail: &str) {
        self.0.lock().unwrap().push(format!("{stage:?}"));
    }

    fn on_stage_error(&self, stage: AnalysisStage, _error: &str) {
        self.0.lock().unwrap().push(format!("{stage:?}!"));
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn config_with(backend: Arc<dyn CompletionBackend>) -> AnalysisConfig {
    AnalysisConfig::builder().backend(backend).build().unwrap()
}

const FOUNTAIN: &str = "Title: Monsoon\n\nINT. KITCHEN - NIGHT\r\n\r\nMAYA waits by the kettle.\r\n\r\nEXT. JETTY - DAWN\r\n";

const FDX: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<FinalDraft DocumentType="Script" Version="5">
  <Content>
    <Paragraph Type="Scene Heading"><Text>INT. KITCHEN - NIGHT</Text></Paragraph>
    <Paragraph Type="Action"><Text>MAYA waits by the kettle.</Text></Paragraph>
  </Content>
</FinalDraft>"#;

// ── Analysis ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn text_analysis_produces_normalised_breakdown_and_budget() {
    init_tracing();
    let backend = ScriptedBackend::ok(REPLY);
    let config = config_with(backend.clone());

    let output = analyze_text("INT. KITCHEN - NIGHT\n\nMAYA waits.", &config)
        .await
        .unwrap();

    let b = &output.breakdown;
    assert_eq!(b.scenes.len(), 2);
    assert_eq!(b.scenes[1].number, 2);
    assert_eq!(b.scenes[1].location, "JETTY");
    assert_eq!(b.scenes[1].time, TimeOfDay::Dawn);
    assert_eq!(b.scenes[1].budget, "RM 900");
    assert!(b.scenes[1].wardrobe.is_empty());
    assert_eq!(
        b.characters.iter().cloned().collect::<Vec<_>>(),
        vec!["MAYA", "DEV", "OLD FISHERMAN"]
    );
    assert!(b.locations.contains("JETTY"));
    assert!(b.props.contains("rope"));

    assert_eq!(b.budget.get(BudgetCategory::Crew), "RM 900");
    assert_eq!(b.budget.get(BudgetCategory::SfxVfx), "RM 0");

    let order: Vec<BudgetCategory> = output.budget.lines.iter().map(|l| l.key).collect();
    assert_eq!(
        order,
        vec![
            BudgetCategory::Crew,
            BudgetCategory::PropsSet,
            BudgetCategory::Talent,
            BudgetCategory::Location
        ]
    );
    let percents: Vec<f64> = output.budget.lines.iter().map(|l| l.percent).collect();
    assert_eq!(percents, vec![42.3, 24.9, 18.8, 14.1]);
    assert_eq!(output.budget.total, 2130.0);

    assert_eq!(output.summary.total_scenes, 2);
    assert_eq!(output.summary.estimated_budget, 2130.0);
    assert_eq!(output.metadata.prompt_tokens, 1200);
    assert_eq!(output.metadata.completion_tokens, 640);
    assert_eq!(output.metadata.model, "gemini-2.0-flash");
    assert!(output.metadata.filename.is_none());
    assert_eq!(backend.calls(), 1);
}

#[tokio::test]
async fn local_fountain_file_runs_every_stage() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("monsoon.fountain");
    std::fs::write(&path, FOUNTAIN).unwrap();

    let backend = ScriptedBackend::ok(REPLY);
    let log = Arc::new(StageLog::default());
    let config = AnalysisConfig::builder()
        .backend(backend.clone())
        .progress_callback(log.clone())
        .build()
        .unwrap();

    let output = analyze(path.to_str().unwrap(), &config).await.unwrap();

    assert_eq!(
        *log.0.lock().unwrap(),
        vec!["Resolve", "Extract", "Request", "Normalize"]
    );
    assert_eq!(output.metadata.filename.as_deref(), Some("monsoon.fountain"));
    assert_eq!(output.metadata.format, Some(scenesplit::ScriptFormat::Txt));
    assert!(!output.metadata.truncated);

    let sent = backend.last_message();
    assert!(sent.contains("INT. KITCHEN - NIGHT\n\nMAYA waits by the kettle."));
    assert!(!sent.contains('\r'));
}

#[tokio::test]
async fn fdx_upload_is_extracted_before_prompting() {
    let backend = ScriptedBackend::ok(REPLY);
    let config = config_with(backend.clone());

    let source = ScriptSource::new("pilot.fdx", FDX.as_bytes().to_vec());
    let output = analyze_bytes(source, &config).await.unwrap();

    assert_eq!(output.metadata.format, Some(scenesplit::ScriptFormat::Fdx));
    let sent = backend.last_message();
    assert!(sent.contains("INT. KITCHEN - NIGHT\nMAYA waits by the kettle."));
    assert!(!sent.contains("<Paragraph"));
}

#[tokio::test]
async fn content_type_decides_when_extension_is_missing() {
    let backend = ScriptedBackend::ok(REPLY);
    let config = config_with(backend.clone());

    let source =
        ScriptSource::new("upload", FOUNTAIN.as_bytes().to_vec()).with_content_type("text/plain");
    assert!(analyze_bytes(source, &config).await.is_ok());

    let source = ScriptSource::new("upload", FOUNTAIN.as_bytes().to_vec())
        .with_content_type("application/msword");
    let err = analyze_bytes(source, &config).await.unwrap_err();
    assert!(matches!(err, SceneSplitError::UnsupportedFormat { .. }));
    assert_eq!(backend.calls(), 1);
}

#[tokio::test]
async fn long_scripts_are_truncated_before_prompting() {
    let backend = ScriptedBackend::ok("{}");
    let config = AnalysisConfig::builder()
        .backend(backend.clone())
        .max_script_chars(12)
        .build()
        .unwrap();

    let output = analyze_text("INT. KITCHEN - NIGHT and much more", &config)
        .await
        .unwrap();

    assert!(output.metadata.truncated);
    assert_eq!(output.metadata.text_chars, 34);
    let sent = backend.last_message();
    assert!(sent.contains("INT. KITCHEN"));
    assert!(!sent.contains("NIGHT"));
}

#[test]
fn empty_object_reply_is_a_valid_empty_breakdown() {
    let config = config_with(ScriptedBackend::ok("{}"));
    let output = tokio_test::block_on(analyze_text("FADE IN:", &config)).unwrap();

    assert!(output.breakdown.scenes.is_empty());
    assert_eq!(output.budget.total, 0.0);
    assert!(output.budget.lines.is_empty());
    assert_eq!(output.breakdown.budget.iter().count(), 7);
}

#[tokio::test]
async fn braces_in_reply_prose_do_not_hide_the_breakdown() {
    let reply = "Breakdown {draft 1}:\n{\"scenes\": [{\"heading\": \"INT. CAR - DAY\"}]}\nAsk if you want {more}.";
    let config = config_with(ScriptedBackend::ok(reply));

    let output = analyze_text("INT. CAR - DAY", &config).await.unwrap();
    assert_eq!(output.summary.total_scenes, 1);
    assert!(output.breakdown.locations.contains("CAR"));
}

// ── Failures ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn prose_reply_is_malformed() {
    let log = Arc::new(StageLog::default());
    let config = AnalysisConfig::builder()
        .backend(ScriptedBackend::ok("Sorry, I cannot help with that script."))
        .progress_callback(log.clone())
        .build()
        .unwrap();

    let err = analyze_text("FADE IN:", &config).await.unwrap_err();
    assert!(matches!(err, SceneSplitError::MalformedResponse { .. }));
    assert!(!err.is_transient());
    assert_eq!(*log.0.lock().unwrap(), vec!["Request", "Normalize!"]);
}

#[tokio::test]
async fn backend_error_is_upstream_unavailable() {
    let config = config_with(ScriptedBackend::failing("401 invalid API key"));

    let err = analyze_text("FADE IN:", &config).await.unwrap_err();
    match &err {
        SceneSplitError::UpstreamUnavailable { detail } => assert!(detail.contains("401")),
        other => panic!("unexpected: {other:?}"),
    }
    assert!(err.is_transient());
    assert!(err.retry_hint().is_some());
}

#[tokio::test(start_paused = true)]
async fn silent_backend_times_out() {
    let config = AnalysisConfig::builder()
        .backend(Arc::new(SilentBackend))
        .api_timeout_secs(30)
        .build()
        .unwrap();

    let err = analyze_text("FADE IN:", &config).await.unwrap_err();
    assert!(matches!(err, SceneSplitError::UpstreamTimeout { secs: 30 }));
}

#[tokio::test(start_paused = true)]
async fn abandoned_analysis_persists_nothing() {
    let store = MemoryStore::new();
    let config = config_with(Arc::new(SilentBackend));
    let source = ScriptSource::new("pilot.txt", FOUNTAIN.as_bytes().to_vec());

    let pending = analyze_into_project(&store, "alice", None, source, &config);
    let abandoned = tokio::time::timeout(Duration::from_secs(1), pending).await;

    assert!(abandoned.is_err());
    assert!(store.list("alice").unwrap().is_empty());
}

#[tokio::test]
async fn scanned_or_fake_pdf_is_rejected() {
    let backend = ScriptedBackend::ok(REPLY);
    let config = config_with(backend.clone());
    let source = ScriptSource::new("pilot.pdf", b"this is not a pdf".to_vec());

    let err = analyze_bytes(source, &config).await.unwrap_err();
    assert!(matches!(err, SceneSplitError::ExtractionFailed { .. }));
    assert_eq!(backend.calls(), 0);
}

// ── Projects ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn upload_without_project_creates_one() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonFileStore::new(dir.path().join("projects.json"));
    let config = config_with(ScriptedBackend::ok(REPLY));
    let source = ScriptSource::new("monsoon_v3.txt", FOUNTAIN.as_bytes().to_vec());

    let (project, output) = analyze_into_project(&store, "alice", None, source, &config)
        .await
        .unwrap();

    assert_eq!(project.title, "monsoon_v3");
    assert_eq!(project.budget_total, Some(2130.0));
    assert_eq!(project.script_filename.as_deref(), Some("monsoon_v3.txt"));
    assert_eq!(project.analysis_data.as_ref(), Some(&output.breakdown));

    let reopened = JsonFileStore::new(dir.path().join("projects.json"));
    let stored = reopened.get("alice", &project.id).unwrap();
    assert_eq!(stored.analysis_data, project.analysis_data);
}

#[tokio::test]
async fn upload_into_existing_project_replaces_analysis() {
    let store = MemoryStore::new();
    let existing = store
        .create(Project::new("alice", "Monsoon").with_description("Feature, 2027"))
        .unwrap();
    let config = config_with(ScriptedBackend::ok(REPLY));
    let source = ScriptSource::new("monsoon.txt", FOUNTAIN.as_bytes().to_vec());

    let (project, _) = analyze_into_project(&store, "alice", Some(&existing.id), source, &config)
        .await
        .unwrap();

    assert_eq!(project.id, existing.id);
    assert_eq!(project.title, "Monsoon");
    assert_eq!(project.description.as_deref(), Some("Feature, 2027"));
    assert_eq!(store.list("alice").unwrap().len(), 1);

    let edited = store
        .update("alice", &project.id, &|p| {
            p.with_budget_override(BudgetCategory::SfxVfx, 870.0)
        })
        .unwrap();
    assert_eq!(edited.budget_total, Some(3000.0));
}

#[tokio::test]
async fn foreign_project_is_not_found_and_model_is_not_called() {
    let store = MemoryStore::new();
    let theirs = store.create(Project::new("bob", "Private")).unwrap();
    let backend = ScriptedBackend::ok(REPLY);
    let config = config_with(backend.clone());
    let source = ScriptSource::new("pilot.txt", FOUNTAIN.as_bytes().to_vec());

    let err = analyze_into_project(&store, "alice", Some(&theirs.id), source, &config)
        .await
        .unwrap_err();

    assert!(matches!(err, SceneSplitError::ProjectNotFound { .. }));
    assert_eq!(backend.calls(), 0);
    assert!(store.get("bob", &theirs.id).unwrap().analysis_data.is_none());
}

#[tokio::test]
async fn failed_analysis_leaves_store_untouched() {
    let store = MemoryStore::new();
    let existing = store.create(Project::new("alice", "Monsoon")).unwrap();
    let config = config_with(ScriptedBackend::ok("no json here"));
    let source = ScriptSource::new("pilot.txt", FOUNTAIN.as_bytes().to_vec());

    let err = analyze_into_project(&store, "alice", Some(&existing.id), source, &config)
        .await
        .unwrap_err();

    assert!(matches!(err, SceneSplitError::MalformedResponse { .. }));
    assert_eq!(store.get("alice", &existing.id).unwrap(), existing);
}

#[tokio::test]
async fn review_loop_on_stored_analysis() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonFileStore::new(dir.path().join("projects.json"));
    let config = config_with(ScriptedBackend::ok(REPLY));
    let source = ScriptSource::new("monsoon.txt", FOUNTAIN.as_bytes().to_vec());
    let (project, _) = analyze_into_project(&store, "alice", None, source, &config)
        .await
        .unwrap();
    let awaiting = ProjectStatus::new(ProjectStatus::AWAITING_FEEDBACK);

    store
        .update("alice", &project.id, &|p| p.with_review_requested())
        .unwrap();
    assert_eq!(store.list_by_status("alice", &awaiting).unwrap().len(), 1);
    assert!(store.list_by_status("bob", &awaiting).unwrap().is_empty());

    let rejected = store
        .update("alice", &project.id, &|p| {
            p.with_feedback(false, true, "Jetty scene needs a boat")
        })
        .unwrap();
    assert_eq!(rejected.status.as_str(), ProjectStatus::PENDING_REVISION);
    assert!(store.list_by_status("alice", &awaiting).unwrap().is_empty());

    let corrected = store
        .update("alice", &project.id, &|p| {
            p.with_analysis_replaced(r#"{"scenes": [{"heading": "EXT. JETTY - DAWN", "props": ["boat"]}], "budget": {"propsSet": "RM 800"}}"#)
        })
        .unwrap();
    assert_eq!(corrected.budget_total, Some(800.0));
    assert!(corrected.analysis_data.as_ref().unwrap().props.contains("boat"));

    let reopened = JsonFileStore::new(dir.path().join("projects.json"));
    let stored = reopened.get("alice", &project.id).unwrap();
    assert_eq!(stored.review_notes.len(), 1);
    assert_eq!(stored.review_notes[0].text, "Jetty scene needs a boat");
    assert_eq!(stored.status.as_str(), ProjectStatus::PENDING_REVISION);
}

// ── Live provider ────────────────────────────────────────────────────────────

#[tokio::test]
async fn live_provider_breaks_down_a_short_script() {
    if std::env::var("E2E_ENABLED").is_err() {
        println!("SKIP: set E2E_ENABLED=1 to run live tests");
        return;
    }
    init_tracing();

    let config = AnalysisConfig::builder().api_timeout_secs(120).build().unwrap();
    let output = analyze_text(
        "INT. KITCHEN - NIGHT\n\nMAYA (30s) boils water in a dented kettle.\n\n\
         EXT. JETTY - DAWN\n\nMAYA unties a fishing boat. DEV runs up with a lantern.",
        &config,
    )
    .await
    .unwrap();

    println!("{}", serde_json::to_string_pretty(&output).unwrap());
    assert!(!output.breakdown.scenes.is_empty());
    assert_eq!(output.breakdown.budget.iter().count(), 7);
}
