pub(crate) mod ai_analysis;
pub(crate) mod evaluation;
