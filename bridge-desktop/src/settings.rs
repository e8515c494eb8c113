//! Settings Storage using a JSON file

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    storage::SettingsStore,
};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, error};

/// File name used inside the plugin settings directory.
pub const SETTINGS_FILE_NAME: &str = "settings.json";

/// JSON-file settings store implementation
///
/// Keeps the whole settings object in memory and rewrites the file after
/// every mutation:
/// - Values keep their JSON type (strings stay strings, booleans stay booleans)
/// - Writes go to a temporary file first and are renamed into place
/// - A store without a path never touches the disk (tests)
pub struct JsonFileSettingsStore {
    path: Option<PathBuf>,
    values: Mutex<Map<String, Value>>,
}

impl JsonFileSettingsStore {
    /// Open (or create) the settings file at `path`.
    pub async fn open(path: PathBuf) -> Result<Self> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let contents = match tokio::fs::read(&path).await {
            Ok(bytes) => Some(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => return Err(e.into()),
        };
        Self::from_contents(path, contents)
    }

    /// Synchronous variant of [`open`](Self::open) for configuration code
    /// that runs outside an async context.
    pub fn open_blocking(path: PathBuf) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = match std::fs::read(&path) {
            Ok(bytes) => Some(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => return Err(e.into()),
        };
        Self::from_contents(path, contents)
    }

    fn from_contents(path: PathBuf, contents: Option<Vec<u8>>) -> Result<Self> {
        let values = match contents {
            None => Map::new(),
            Some(bytes) if bytes.is_empty() => Map::new(),
            Some(bytes) => match serde_json::from_slice::<Value>(&bytes)? {
                Value::Object(map) => map,
                other => {
                    error!(path = ?path, "Settings file is not a JSON object");
                    return Err(BridgeError::OperationFailed(format!(
                        "settings file must hold an object, found {}",
                        json_type(&other)
                    )));
                }
            },
        };

        debug!(path = ?path, keys = values.len(), "Initialized settings store");

        Ok(Self {
            path: Some(path),
            values: Mutex::new(values),
        })
    }

    /// Open `settings.json` inside a settings directory.
    pub async fn in_dir(dir: &Path) -> Result<Self> {
        Self::open(dir.join(SETTINGS_FILE_NAME)).await
    }

    /// Create an in-memory settings store (for testing)
    pub fn in_memory() -> Self {
        Self {
            path: None,
            values: Mutex::new(Map::new()),
        }
    }

    async fn persist(&self, values: &Map<String, Value>) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let bytes = serde_json::to_vec_pretty(values)?;
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }

    /// Apply `change` to a copy of the settings, write it, then commit it in
    /// memory. A failed write leaves the in-memory settings untouched.
    async fn update<F>(&self, change: F) -> Result<()>
    where
        F: FnOnce(&mut Map<String, Value>) -> bool,
    {
        let mut values = self.values.lock().await;
        let mut staged = values.clone();
        if !change(&mut staged) {
            return Ok(());
        }
        self.persist(&staged).await?;
        *values = staged;
        Ok(())
    }

    async fn set_value(&self, key: &str, value: Value) -> Result<()> {
        self.update(|values| {
            values.insert(key.to_string(), value);
            true
        })
        .await?;

        debug!(key = key, "Stored setting");
        Ok(())
    }

    async fn get_value(&self, key: &str) -> Option<Value> {
        self.values.lock().await.get(key).cloned()
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn type_mismatch(key: &str, expected: &str, actual: &Value) -> BridgeError {
    error!(
        key = key,
        expected = expected,
        actual = json_type(actual),
        "Type mismatch"
    );
    BridgeError::OperationFailed(format!(
        "Type mismatch for '{}': expected {}, got {}",
        key,
        expected,
        json_type(actual)
    ))
}

#[async_trait]
impl SettingsStore for JsonFileSettingsStore {
    async fn set_string(&self, key: &str, value: &str) -> Result<()> {
        self.set_value(key, Value::String(value.to_string())).await
    }

    async fn get_string(&self, key: &str) -> Result<Option<String>> {
        match self.get_value(key).await {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) => Ok(Some(s)),
            // list settings such as `additional_sync_args` are read as JSON text
            Some(list @ Value::Array(_)) => Ok(Some(list.to_string())),
            Some(other) => Err(type_mismatch(key, "string", &other)),
        }
    }

    async fn set_bool(&self, key: &str, value: bool) -> Result<()> {
        self.set_value(key, Value::Bool(value)).await
    }

    async fn get_bool(&self, key: &str) -> Result<Option<bool>> {
        match self.get_value(key).await {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Bool(b)) => Ok(Some(b)),
            // older settings files stored flags as "true"/"false"
            Some(Value::String(s)) => s
                .parse()
                .map(Some)
                .map_err(|e| BridgeError::OperationFailed(format!("Parse error: {}", e))),
            Some(other) => Err(type_mismatch(key, "bool", &other)),
        }
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.update(|values| values.remove(key).is_some()).await?;
        debug!(key = key, "Deleted setting");
        Ok(())
    }

    async fn has_key(&self, key: &str) -> Result<bool> {
        Ok(self.values.lock().await.contains_key(key))
    }

    async fn list_keys(&self) -> Result<Vec<String>> {
        let mut keys: Vec<String> = self.values.lock().await.keys().cloned().collect();
        keys.sort();
        Ok(keys)
    }

    async fn clear_all(&self) -> Result<()> {
        self.update(|values| {
            values.clear();
            true
        })
        .await?;

        debug!("Cleared all settings");
        Ok(())
    }
}
