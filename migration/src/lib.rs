pub mod migrations;
pub mod migrator;
pub mod runner;

pub use migrator::Migrator;
