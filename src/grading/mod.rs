//! Deterministic grading of AI-extracted answers.

pub(crate) mod calculator;
pub(crate) mod errors;
pub(crate) mod matcher;
pub(crate) mod normalizer;
pub(crate) mod parser;
pub(crate) mod retry;
pub(crate) mod types;
