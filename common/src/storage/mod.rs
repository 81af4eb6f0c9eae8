pub mod db;
pub mod records;
pub mod store;
pub mod types;
