pub mod api;
pub mod config;
pub mod db;
pub mod workflow;

pub use self::config::Config;
