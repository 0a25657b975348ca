mod commands;
mod queries;
mod types;

pub(crate) use commands::{begin_processing, fail_stale_processing, mark_completed, mark_failed};
pub(crate) use queries::{exists, find_by_id, list_pending_ids};
pub(crate) use types::CompletionUpdate;
