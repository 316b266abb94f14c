pub mod batch;
pub mod config;
pub mod db;
pub mod errors;
pub mod fetch;
pub mod pipeline;
pub mod timestamp;
pub mod utils;
