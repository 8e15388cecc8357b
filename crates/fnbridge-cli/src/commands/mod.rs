pub mod config;
pub mod invoke;
