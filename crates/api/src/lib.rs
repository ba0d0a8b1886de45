pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod normalize;
pub mod store;
