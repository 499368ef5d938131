use crate::{CacheMode, OpenMode};

/// Describes how the [`crate::ConnectionRegistry`] builds and initializes a connection.
///
/// ```
/// use sqlite::{CacheMode, ConnectionConfig, OpenMode};
///
/// let config = ConnectionConfig::builder()
///     .name("settings")
///     .open_mode(OpenMode::InMemory)
///     .cache_mode(CacheMode::Shared)
///     .schema_script("CREATE TABLE setting (key TEXT PRIMARY KEY, value TEXT)")
///     .configuration_script("PRAGMA foreign_keys = ON")
///     .build();
/// assert_eq!(config.name(), "settings");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default, bon::Builder)]
#[builder(on(String, into))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ConnectionConfig {
    /// Database path, or the shared identifier of an in-memory database
    #[builder(default)]
    name: String,
    #[builder(default)]
    open_mode: OpenMode,
    #[builder(default)]
    cache_mode: CacheMode,
    /// Executed after every open, typically pragmas
    #[builder(default)]
    configuration_script: String,
    /// Executed once, when the database does not contain any schema objects yet
    #[builder(default)]
    schema_script: String,
}

impl ConnectionConfig {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn open_mode(&self) -> OpenMode {
        self.open_mode
    }

    pub fn cache_mode(&self) -> CacheMode {
        self.cache_mode
    }

    pub fn configuration_script(&self) -> &str {
        &self.configuration_script
    }

    pub fn schema_script(&self) -> &str {
        &self.schema_script
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn set_open_mode(&mut self, mode: OpenMode) {
        self.open_mode = mode;
    }

    pub fn set_cache_mode(&mut self, mode: CacheMode) {
        self.cache_mode = mode;
    }

    pub fn set_configuration_script(&mut self, script: impl Into<String>) {
        self.configuration_script = script.into();
    }

    pub fn set_schema_script(&mut self, script: impl Into<String>) {
        self.schema_script = script.into();
    }
}
