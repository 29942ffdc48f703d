pub mod async_core;
pub mod database;
pub mod importer;
pub mod runtime;
pub mod settings;
