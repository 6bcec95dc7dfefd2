//! Registry of open tables, keyed by table name.
//!
//! Each table name maps to exactly one open [`Table`] backed by
//! `<data_dir>/<name>.db`. Handles are constructed lazily on first access and
//! cached for the lifetime of the registry.

use crate::table::Table;
use basalt_common::{BasaltError, Result, StorageConfig};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::path::Path;

/// Maximum length for a table name.
const MAX_TABLE_NAME_LENGTH: usize = 128;

/// Registry of open tables.
pub struct Database {
    config: StorageConfig,
    open_tables: HashMap<String, Table>,
}

impl Database {
    /// Creates a registry over the configured data directory, creating the
    /// directory if needed.
    pub fn open(config: StorageConfig) -> Result<Self> {
        std::fs::create_dir_all(&config.data_dir)?;
        Ok(Self {
            config,
            open_tables: HashMap::new(),
        })
    }

    /// Returns the data directory path.
    pub fn data_dir(&self) -> &Path {
        &self.config.data_dir
    }

    /// Gets the table for `name`, opening `<data_dir>/<name>.db` on first
    /// access.
    pub fn get_table(&mut self, name: &str) -> Result<&mut Table> {
        validate_table_name(name)?;

        match self.open_tables.entry(name.to_string()) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let path = self.config.data_dir.join(format!("{name}.db"));
                let table = Table::open(path, self.config.fsync_enabled)?;
                tracing::info!("opened table '{}'", name);
                Ok(entry.insert(table))
            }
        }
    }

    /// Returns the names of the tables currently open in this registry.
    pub fn open_table_names(&self) -> Vec<&str> {
        self.open_tables.keys().map(String::as_str).collect()
    }
}

/// Table names become file names, so they are restricted to a safe alphabet.
fn validate_table_name(name: &str) -> Result<()> {
    let valid_chars = name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if name.is_empty() || name.len() > MAX_TABLE_NAME_LENGTH || !valid_chars {
        return Err(BasaltError::InvalidTableName(name.to_string()));
    }
    Ok(())
}
