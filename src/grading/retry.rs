use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::errors::AnalysisError;
use super::parser::parse_completion;
use super::types::AiAnalysisResult;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum MessagePart {
    Text(String),
    ImageUrl(String),
}

/// One vision-model request: instructions plus the ordered user message parts.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct CompletionRequest {
    pub(crate) submission_id: String,
    pub(crate) model: String,
    pub(crate) system_prompt: String,
    pub(crate) parts: Vec<MessagePart>,
    pub(crate) temperature: f64,
    pub(crate) max_tokens: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Completion {
    pub(crate) content: String,
    pub(crate) finish_reason: Option<String>,
    pub(crate) tokens_used: Option<u64>,
}

impl Completion {
    pub(crate) fn was_truncated(&self) -> bool {
        self.finish_reason.as_deref() == Some("length")
    }
}

#[async_trait]
pub(crate) trait CompletionTransport: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, AnalysisError>;
}

#[async_trait]
pub(crate) trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Attempt budget with exponential backoff: `base * 2^(attempt - 1)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
}

impl RetryPolicy {
    pub(crate) fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self { max_attempts: max_attempts.max(1), base_delay }
    }

    pub(crate) fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub(crate) fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(1 << exponent)
    }
}

#[derive(Clone)]
pub(crate) struct AnalysisRetryExecutor {
    transport: Arc<dyn CompletionTransport>,
    policy: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
}

impl AnalysisRetryExecutor {
    pub(crate) fn new(
        transport: Arc<dyn CompletionTransport>,
        policy: RetryPolicy,
        sleeper: Arc<dyn Sleeper>,
    ) -> Self {
        Self { transport, policy, sleeper }
    }

    /// Calls the transport until a completion parses and validates.
    ///
    /// A content-error verdict is a valid answer and ends the loop at once.
    /// There is no cancellation: attempts run until success or exhaustion.
    pub(crate) async fn run(
        &self,
        request: &CompletionRequest,
    ) -> Result<AiAnalysisResult, AnalysisError> {
        let max_attempts = self.policy.max_attempts();
        let mut attempt = 1;

        loop {
            let outcome = match self.transport.complete(request).await {
                Ok(completion) => {
                    parse_completion(&completion.content, completion.was_truncated())
                }
                Err(err) => Err(err),
            };

            match outcome {
                Ok(result) => {
                    metrics::counter!("ai_analysis_attempts_total", "outcome" => "success")
                        .increment(1);
                    tracing::info!(
                        submission_id = %request.submission_id,
                        attempt,
                        "AI analysis parsed"
                    );
                    return Ok(result);
                }
                Err(err) => {
                    metrics::counter!("ai_analysis_attempts_total", "outcome" => err.kind())
                        .increment(1);
                    if attempt >= max_attempts {
                        tracing::error!(
                            submission_id = %request.submission_id,
                            attempt,
                            error = %err,
                            "AI analysis attempts exhausted"
                        );
                        return Err(err);
                    }

                    let delay = self.policy.backoff(attempt);
                    tracing::warn!(
                        submission_id = %request.submission_id,
                        attempt,
                        max_attempts,
                        delay_seconds = delay.as_secs_f64(),
                        error = %err,
                        "AI analysis attempt failed, retrying"
                    );
                    self.sleeper.sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
