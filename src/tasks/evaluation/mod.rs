mod maintenance;
mod worker;

pub(crate) use maintenance::recover_stale_processing;
pub(crate) use worker::evaluate_next_pending;
