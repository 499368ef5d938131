use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Runtime error: {0}")]
    Runtime(String),
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("Invalid string: {0}")]
    InvalidString(#[from] std::ffi::NulError),
    #[error("IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Thread mode can not change while {0} connection(s) are open")]
    ThreadModeLocked(usize),
    #[error("Thread mode configuration failed (sqlite code {0})")]
    ThreadModeConfig(i32),
    #[error("Error: '{0}' configuration not found")]
    ConfigNotFound(String),
    #[error("Error opening database: {0}")]
    OpenFailed(String),
    #[error("Error creating database schema: {0}")]
    SchemaCreation(String),
    #[error("Error during connection configuration: {0}")]
    ConnectionConfiguration(String),
}
