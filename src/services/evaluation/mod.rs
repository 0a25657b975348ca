//! Submission state machine: claim, charge, analyse, grade, persist.

mod pipeline;
mod ports;


pub(crate) use pipeline::{EvaluationError, EvaluationPipeline, EvaluationStatus, PipelineOptions};
pub(crate) use ports::{
    Completed, CreditLedger, LedgerError, ReferenceResolver, StoreError, SubmissionStore,
};
