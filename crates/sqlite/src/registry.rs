use crate::{Connection, ConnectionConfig, Error, ReadStatus, Result, Runtime};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

const SCHEMA_OBJECT_COUNT_QUERY: &str = "SELECT count(*) FROM sqlite_master";

/// Thread safe store of named connection configurations that hands out ready to use connections.
///
/// A single lock guards the whole map, reads included.
pub struct ConnectionRegistry {
    configs: Mutex<HashMap<String, ConnectionConfig>>,
    runtime: Arc<Runtime>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        ConnectionRegistry::with_runtime(Runtime::global())
    }

    /// Registry whose connections belong to the given runtime
    pub fn with_runtime(runtime: Arc<Runtime>) -> Self {
        ConnectionRegistry {
            configs: Mutex::new(HashMap::new()),
            runtime,
        }
    }

    /// Adds the configuration, returns false and leaves the registry untouched when the name is already in use
    pub fn add_config(&self, name: impl Into<String>, config: ConnectionConfig) -> bool {
        let mut configs = self.configs.lock();
        match configs.entry(name.into()) {
            std::collections::hash_map::Entry::Occupied(_) => false,
            std::collections::hash_map::Entry::Vacant(entry) => {
                entry.insert(config);
                true
            }
        }
    }

    pub fn add_or_replace_config(&self, name: impl Into<String>, config: ConnectionConfig) {
        self.configs.lock().insert(name.into(), config);
    }

    /// Replaces an existing configuration, returns false when the name is unknown
    pub fn replace_config(&self, name: &str, config: ConnectionConfig) -> bool {
        match self.configs.lock().get_mut(name) {
            Some(existing) => {
                *existing = config;
                true
            }
            None => false,
        }
    }

    pub fn delete_config(&self, name: &str) -> bool {
        self.configs.lock().remove(name).is_some()
    }

    pub fn clear_configs(&self) {
        self.configs.lock().clear();
    }

    /// Names of the registered configurations, in no particular order
    pub fn config_names(&self) -> Vec<String> {
        self.configs.lock().keys().cloned().collect()
    }

    pub fn config_by_name(&self, name: &str) -> Option<ConnectionConfig> {
        self.configs.lock().get(name).cloned()
    }

    pub fn count(&self) -> usize {
        self.configs.lock().len()
    }

    pub fn exists(&self, name: &str) -> bool {
        self.configs.lock().contains_key(name)
    }

    /// Builds a connection from the named configuration: it is opened, the schema script runs when the database
    /// has no schema objects yet, and the configuration script runs last.
    /// A failing phase closes the connection again and reports which phase failed.
    pub fn new_connection(&self, config_name: &str) -> Result<Connection> {
        let config = self
            .config_by_name(config_name)
            .ok_or_else(|| Error::ConfigNotFound(config_name.to_string()))?;

        let mut conn = Connection::with_runtime(self.runtime.clone(), config.name(), config.open_mode(), config.cache_mode());
        if !conn.open() {
            log::warn!("Opening connection '{config_name}' failed: {}", conn.last_error());
            return Err(Error::OpenFailed(conn.last_error()));
        }

        if !create_schema(&mut conn, config.schema_script()) {
            log::warn!("Creating schema for connection '{config_name}' failed: {}", conn.last_error());
            return Err(Error::SchemaCreation(conn.last_error()));
        }

        let script = config.configuration_script();
        if !script.is_empty() && !conn.execute(script) {
            log::warn!("Configuring connection '{config_name}' failed: {}", conn.last_error());
            return Err(Error::ConnectionConfiguration(conn.last_error()));
        }

        log::debug!("Created connection '{config_name}'");
        Ok(conn)
    }
}

fn create_schema(conn: &mut Connection, script: &str) -> bool {
    if script.is_empty() {
        return true;
    }

    match conn.read_int64(SCHEMA_OBJECT_COUNT_QUERY) {
        (0, ReadStatus::Success) => conn.execute(script),
        (_, ReadStatus::Success) => {
            log::debug!("Schema of '{}' already present", conn.database_name());
            true
        }
        _ => false,
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        ConnectionRegistry::new()
    }
}

impl Clone for ConnectionRegistry {
    fn clone(&self) -> Self {
        let configs = self.configs.lock().clone();
        ConnectionRegistry {
            configs: Mutex::new(configs),
            runtime: self.runtime.clone(),
        }
    }
}
