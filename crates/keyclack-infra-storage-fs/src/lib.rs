use keyclack_ports::preset::PresetSet;
use keyclack_ports::storage::{EngineSettings, KeyBindings, StorageError, StoragePort};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

const SETTINGS_FILE: &str = "settings.json";
const PRESETS_FILE: &str = "presets.json";
const BINDINGS_FILE: &str = "bindings.json";

/// JSON files under one base directory.
pub struct FsStorage {
    base_dir: PathBuf,
}

impl FsStorage {
    pub fn new(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    pub fn default_base_dir() -> Result<PathBuf, StorageError> {
        let base = dirs_next::config_dir()
            .ok_or_else(|| StorageError::Io("config dir not found".to_string()))?;
        Ok(base.join("KeyClack"))
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Resolves a relative path from settings against the base directory.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }

    pub fn has_presets(&self) -> bool {
        self.presets_path().exists()
    }

    pub fn save_presets(&self, presets: &PresetSet) -> Result<(), StorageError> {
        Self::write_json(&self.presets_path(), presets)
    }

    fn settings_path(&self) -> PathBuf {
        self.base_dir.join(SETTINGS_FILE)
    }

    fn presets_path(&self) -> PathBuf {
        self.base_dir.join(PRESETS_FILE)
    }

    fn bindings_path(&self) -> PathBuf {
        self.base_dir.join(BINDINGS_FILE)
    }

    fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, StorageError> {
        let data = fs::read(path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => StorageError::NotFound(path.display().to_string()),
            _ => StorageError::Io(e.to_string()),
        })?;
        serde_json::from_slice(&data).map_err(|e| StorageError::Serde(e.to_string()))
    }

    fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<(), StorageError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| StorageError::Io(e.to_string()))?;
        }
        let data =
            serde_json::to_vec_pretty(value).map_err(|e| StorageError::Serde(e.to_string()))?;
        fs::write(path, data).map_err(|e| StorageError::Io(e.to_string()))
    }
}

impl Default for FsStorage {
    fn default() -> Self {
        let base_dir = Self::default_base_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self { base_dir }
    }
}

impl StoragePort for FsStorage {
    fn load_settings(&self) -> Result<EngineSettings, StorageError> {
        let path = self.settings_path();
        if !path.exists() {
            return Ok(EngineSettings::default());
        }
        Self::read_json(&path)
    }

    fn save_settings(&self, s: &EngineSettings) -> Result<(), StorageError> {
        let path = self.settings_path();
        Self::write_json(&path, s)
    }

    fn load_presets(&self) -> Result<PresetSet, StorageError> {
        Self::read_json(&self.presets_path())
    }

    /// Bindings are optional: a missing, empty or unreadable file yields no bindings.
    fn load_bindings(&self) -> Result<KeyBindings, StorageError> {
        let path = self.bindings_path();
        let data = match fs::read(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(KeyBindings::new()),
            Err(e) => {
                log::warn!("bindings {} unreadable: {e}", path.display());
                return Ok(KeyBindings::new());
            }
        };
        if data.iter().all(u8::is_ascii_whitespace) {
            return Ok(KeyBindings::new());
        }
        match serde_json::from_slice(&data) {
            Ok(bindings) => Ok(bindings),
            Err(e) => {
                log::warn!("bindings {} malformed, ignoring: {e}", path.display());
                Ok(KeyBindings::new())
            }
        }
    }

    fn save_bindings(&self, b: &KeyBindings) -> Result<(), StorageError> {
        Self::write_json(&self.bindings_path(), b)
    }
}
