pub mod query;
pub mod watch;
