//! Lightweight sqlite wrapper on top of the libsqlite3-sys crate.
//!
//! Connections own their engine handle and report failures through status codes, statements expose typed
//! parameter binding and column decoding with explicit copy or zero-copy semantics.
//! The [`ConnectionRegistry`] keeps named configurations and turns them into opened, schema initialized
//! and configured connections.

mod config;
mod connection;
mod ffi;
mod registry;
mod runtime;
mod statement;

/// How the backing store of a connection is opened
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum OpenMode {
    #[default]
    ReadWriteCreate,
    ReadWrite,
    ReadOnly,
    /// Private on-disk database that is deleted when the connection closes, the configured name is discarded
    Temporary,
    /// Memory resident database, a non-empty name makes it shareable between connections using the shared cache
    InMemory,
}

/// Visibility of the page cache
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CacheMode {
    #[default]
    Private,
    Shared,
}

pub use config::ConnectionConfig;
pub use connection::Connection;
pub use connection::ReadStatus;
pub use registry::ConnectionRegistry;
pub use runtime::Runtime;
pub use runtime::ThreadMode;
pub use statement::ColumnType;
pub use statement::Statement;
pub use statement::StatementKind;

pub type Error = inf::Error;
pub type Result<T> = inf::Result<T>;
