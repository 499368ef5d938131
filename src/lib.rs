//! Typed access layer over the embedded sqlite engine.
//!
//! ```
//! use sqlite_infra::sqlite::{ConnectionConfig, ConnectionRegistry, OpenMode, ReadStatus};
//!
//! let registry = ConnectionRegistry::new();
//! registry.add_config(
//!     "memory",
//!     ConnectionConfig::builder()
//!         .open_mode(OpenMode::InMemory)
//!         .schema_script("CREATE TABLE T (id INTEGER); INSERT INTO T VALUES (42)")
//!         .build(),
//! );
//!
//! let mut conn = registry.new_connection("memory")?;
//! assert_eq!(conn.read_int64("SELECT id FROM T"), (42, ReadStatus::Success));
//! # Ok::<(), sqlite_infra::Error>(())
//! ```

pub use inf::{Error, Result};

#[cfg(feature = "sqlite")]
pub use sqlite;
