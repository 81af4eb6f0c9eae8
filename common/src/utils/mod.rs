pub mod config;
pub mod short_id;
