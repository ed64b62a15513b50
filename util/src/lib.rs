pub mod config;
pub mod languages;
pub mod logging;
pub mod paths;
pub mod ws;
