pub(crate) mod checks;
pub(crate) mod credits;
pub(crate) mod evaluation_results;
pub(crate) mod health;
pub(crate) mod store;
pub(crate) mod submissions;

pub(crate) use store::PgStore;
