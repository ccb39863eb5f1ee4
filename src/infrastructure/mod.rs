pub mod config;
pub mod csrf;
pub mod error;
pub mod planner_client;
