pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod membership;
pub mod models;
pub mod position;
pub mod resolver;
pub mod snowflake;
pub mod store;
