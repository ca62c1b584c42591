//! Store configuration

use serde::Deserialize;

/// Schema version every database is opened at. Setup only ever runs when moving to it.
pub const DB_VERSION: u32 = 1;

/// Database name used when none is configured.
pub const DEFAULT_DATABASE_NAME: &str = "default_database";

/// Storage area name used when none is configured.
pub const DEFAULT_AREA_NAME: &str = "default_store";

/// Identifies the (database, storage area) pair a store handle works against.
///
/// Missing fields fall back to the defaults when deserialized:
///
/// ```rust
/// use keyval_core::StoreConfig;
///
/// let config: StoreConfig = serde_json::from_str(r#"{"database_name":"notes"}"#).unwrap();
/// assert_eq!(config.database_name, "notes");
/// assert_eq!(config.area_name, "default_store");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub database_name: String,
    pub area_name: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_name: DEFAULT_DATABASE_NAME.to_string(),
            area_name: DEFAULT_AREA_NAME.to_string(),
        }
    }
}

impl StoreConfig {
    pub fn new(database_name: impl Into<String>, area_name: impl Into<String>) -> Self {
        Self {
            database_name: database_name.into(),
            area_name: area_name.into(),
        }
    }

    pub fn database_name(mut self, name: impl Into<String>) -> Self {
        self.database_name = name.into();
        self
    }

    pub fn area_name(mut self, name: impl Into<String>) -> Self {
        self.area_name = name.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = StoreConfig::default();
        assert_eq!(config.database_name, "default_database");
        assert_eq!(config.area_name, "default_store");
    }

    #[test]
    fn test_builder() {
        let config = StoreConfig::default().database_name("app").area_name("prefs");
        assert_eq!(config, StoreConfig::new("app", "prefs"));
    }

    #[test]
    fn test_deserialize_partial() {
        let config: StoreConfig = serde_json::from_str(r#"{"area_name":"cache"}"#).unwrap();
        assert_eq!(config.database_name, DEFAULT_DATABASE_NAME);
        assert_eq!(config.area_name, "cache");
    }
}
