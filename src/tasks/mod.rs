pub(crate) mod evaluation;
pub(crate) mod scheduler;
