use std::fs;
use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};

pub const DEFAULT_PREFS_PATH: &str = "data/preferences.json";

/// Locally persisted knobs. Everything else lives in the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preferences {
    /// Play a chime when someone else's message arrives.
    #[serde(default = "default_sound_enabled")]
    pub sound_enabled: bool,
}

fn default_sound_enabled() -> bool {
    true
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            sound_enabled: true,
        }
    }
}

/// Load preferences, falling back to defaults on a missing or broken file.
pub fn load(path: &str) -> Preferences {
    let path = Path::new(path);
    match fs::read_to_string(path) {
        Ok(content) => match serde_json::from_str::<Preferences>(&content) {
            Ok(prefs) => prefs,
            Err(err) => {
                log::warn!("Failed to parse preferences {}: {err}", path.display());
                Preferences::default()
            }
        },
        Err(err) if err.kind() == io::ErrorKind::NotFound => Preferences::default(),
        Err(err) => {
            log::warn!("Failed to read preferences {}: {err}", path.display());
            Preferences::default()
        }
    }
}

pub fn save(path: &str, prefs: &Preferences) -> io::Result<()> {
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let json = serde_json::to_string_pretty(prefs)?;
    fs::write(path, json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nope.json");
        let prefs = load(path.to_str().unwrap());
        assert!(prefs.sound_enabled);
    }

    #[test]
    fn test_last_saved_value_survives_reload() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("prefs.json");
        let path = path.to_str().unwrap();

        save(path, &Preferences { sound_enabled: false }).unwrap();
        assert!(!load(path).sound_enabled);

        save(path, &Preferences { sound_enabled: true }).unwrap();
        assert!(load(path).sound_enabled);
    }

    #[test]
    fn test_garbage_file_yields_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("prefs.json");
        fs::write(&path, "{not json").unwrap();
        let prefs = load(path.to_str().unwrap());
        assert_eq!(prefs, Preferences::default());
    }

    #[test]
    fn test_save_creates_parent_directories() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("deep/nested/prefs.json");
        let path = path.to_str().unwrap();
        save(path, &Preferences { sound_enabled: false }).unwrap();
        assert!(!load(path).sound_enabled);
    }
}
