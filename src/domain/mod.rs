pub mod message;
pub mod store;
pub mod types;
