pub(crate) mod api;
pub(crate) mod core;
pub(crate) mod db;
pub(crate) mod grading;
pub(crate) mod repositories;
pub(crate) mod schemas;
pub(crate) mod services;
pub(crate) mod tasks;

#[cfg(test)]
mod test_support;

use std::sync::Arc;
use std::time::Duration;

use crate::core::{config::Settings, state::AppState, telemetry};
use crate::grading::retry::{AnalysisRetryExecutor, RetryPolicy, TokioSleeper};
use crate::repositories::PgStore;
use crate::services::ai_analysis::OpenAiTransport;
use crate::services::evaluation::{EvaluationPipeline, PipelineOptions};

pub async fn run() -> anyhow::Result<()> {
    let state = bootstrap().await?;

    let app = api::router::router(state.clone());
    let listener = tokio::net::TcpListener::bind(state.settings().server_addr()).await?;

    tracing::info!(
        host = %state.settings().server_host(),
        port = state.settings().server_port(),
        environment = %state.settings().runtime().environment.as_str(),
        "Checkwork API listening"
    );

    axum::serve(listener, app).with_graceful_shutdown(core::shutdown::shutdown_signal()).await?;

    Ok(())
}

pub async fn run_worker() -> anyhow::Result<()> {
    let state = bootstrap().await?;
    tasks::scheduler::run(state).await
}

async fn bootstrap() -> anyhow::Result<AppState> {
    dotenvy::dotenv().ok();

    let settings = Settings::load()?;
    telemetry::init_tracing(&settings)?;
    core::metrics::init(&settings)?;

    let db_pool = db::init_pool(&settings).await?;
    db::run_migrations(&db_pool).await?;

    let pipeline = build_pipeline(&settings, PgStore::new(db_pool))?;
    Ok(AppState::new(settings, pipeline))
}

fn build_pipeline(settings: &Settings, store: PgStore) -> anyhow::Result<EvaluationPipeline> {
    let store = Arc::new(store);
    let transport = Arc::new(OpenAiTransport::from_settings(settings)?);
    let policy = RetryPolicy::new(
        settings.evaluation().max_attempts,
        Duration::from_secs(settings.evaluation().backoff_base_seconds),
    );
    let executor = AnalysisRetryExecutor::new(transport, policy, Arc::new(TokioSleeper));

    let options = PipelineOptions {
        model: settings.ai().ai_model.clone(),
        temperature: settings.ai().ai_temperature,
        max_tokens: settings.ai().ai_max_tokens,
        credits_per_page: settings.evaluation().credits_per_page,
    };

    Ok(EvaluationPipeline::new(store.clone(), store.clone(), store, executor, options))
}
