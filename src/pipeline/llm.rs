//! Breakdown request: send the script text to the model and return its raw reply.
//!
//! This module is intentionally thin. The prompt lives in [`crate::prompts`]
//! and parsing lives in [`crate::pipeline::normalize`]; here we only build the
//! messages, make one call, and bound the wait.
//!
//! ## No automatic retry
//!
//! A single request is made with a bounded timeout. Failures surface as
//! [`SceneSplitError::UpstreamUnavailable`] or [`SceneSplitError::UpstreamTimeout`]
//! and the caller decides whether to retry. Dropping the returned future
//! abandons the pending call without side effects.

use crate::config::AnalysisConfig;
use crate::error::SceneSplitError;
use crate::prompts::{script_message, BREAKDOWN_SYSTEM_PROMPT};
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{timeout, Duration};
use tracing::{debug, info, warn};

/// A model completion as seen by the pipeline.
#[derive(Debug, Clone, Default)]
pub struct Completion {
    pub content: String,
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
}

/// Sampling settings passed through to the backend.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RequestOptions {
    pub temperature: f32,
    pub max_tokens: usize,
}

/// Text-in / text-out seam in front of the hosted model.
///
/// Implemented for `Arc<dyn LLMProvider>`; tests and alternative transports
/// implement it directly.
pub trait CompletionBackend: Send + Sync {
    fn complete<'a>(
        &'a self,
        system_prompt: &'a str,
        user_message: &'a str,
        options: RequestOptions,
    ) -> BoxFuture<'a, Result<Completion, String>>;
}

impl CompletionBackend for Arc<dyn LLMProvider> {
    fn complete<'a>(
        &'a self,
        system_prompt: &'a str,
        user_message: &'a str,
        options: RequestOptions,
    ) -> BoxFuture<'a, Result<Completion, String>> {
        async move {
            let messages = vec![
                ChatMessage::system(system_prompt),
                ChatMessage::user(user_message),
            ];
            let completion_options = CompletionOptions {
                temperature: Some(options.temperature),
                max_tokens: Some(options.max_tokens),
                ..Default::default()
            };
            let response = self
                .chat(&messages, Some(&completion_options))
                .await
                .map_err(|e| e.to_string())?;
            Ok(Completion {
                content: response.content,
                prompt_tokens: response.prompt_tokens,
                completion_tokens: response.completion_tokens,
            })
        }
        .boxed()
    }
}

/// Request a breakdown for `script_text` and return the model's raw reply.
pub async fn request_breakdown(
    backend: &dyn CompletionBackend,
    script_text: &str,
    config: &AnalysisConfig,
) -> Result<Completion, SceneSplitError> {
    let start = Instant::now();
    let system_prompt = config
        .system_prompt
        .as_deref()
        .unwrap_or(BREAKDOWN_SYSTEM_PROMPT);
    let user_message = script_message(script_text);
    let options = build_options(config);

    info!(
        "Requesting breakdown for {} chars of script text",
        script_text.chars().count()
    );

    let secs = config.api_timeout_secs;
    let outcome = timeout(
        Duration::from_secs(secs),
        backend.complete(system_prompt, &user_message, options),
    )
    .await;

    match outcome {
        Err(_) => {
            warn!("Breakdown request timed out after {}s", secs);
            Err(SceneSplitError::UpstreamTimeout { secs })
        }
        Ok(Err(detail)) => {
            warn!("Breakdown request failed: {}", detail);
            Err(SceneSplitError::UpstreamUnavailable { detail })
        }
        Ok(Ok(completion)) => {
            debug!(
                "Breakdown reply: {} input tokens, {} output tokens, {:?}",
                completion.prompt_tokens,
                completion.completion_tokens,
                start.elapsed()
            );
            Ok(completion)
        }
    }
}

fn build_options(config: &AnalysisConfig) -> RequestOptions {
    RequestOptions {
        temperature: config.temperature,
        max_tokens: config.max_tokens,
    }
}
