use std::sync::Arc;

use crate::core::config::Settings;
use crate::services::evaluation::EvaluationPipeline;

#[derive(Clone)]
pub(crate) struct AppState {
    inner: Arc<InnerState>,
}

struct InnerState {
    settings: Settings,
    pipeline: EvaluationPipeline,
}

impl AppState {
    pub(crate) fn new(settings: Settings, pipeline: EvaluationPipeline) -> Self {
        Self { inner: Arc::new(InnerState { settings, pipeline }) }
    }

    pub(crate) fn settings(&self) -> &Settings {
        &self.inner.settings
    }

    pub(crate) fn pipeline(&self) -> &EvaluationPipeline {
        &self.inner.pipeline
    }
}
