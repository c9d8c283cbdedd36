use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::matcher::DEFAULT_SAMPLE_COUNT;

/// Runtime knobs, read from `settings.json`. Missing fields take defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Pixels sampled per candidate before full verification
    pub sample_count: usize,
    /// Fixed matcher seed; random per run when absent
    pub seed: Option<u64>,
    /// Abort a run after this many goto jumps; unlimited when absent
    pub jump_limit: Option<u64>,
    /// Apply +/-30% jitter to delay steps
    pub delay_jitter: bool,
    pub log_dir: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            sample_count: DEFAULT_SAMPLE_COUNT,
            seed: None,
            jump_limit: None,
            delay_jitter: false,
            log_dir: PathBuf::from("logs"),
        }
    }
}

impl Settings {
    pub fn load(path: &Path) -> Self {
        std::fs::read_to_string(path)
            .ok()
            .and_then(|s| serde_json::from_str(&s).ok())
            .unwrap_or_default()
    }

    pub fn save(&self, path: &Path) {
        if let Ok(json) = serde_json::to_string_pretty(self) {
            let _ = std::fs::write(path, json);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_defaults() {
        let s: Settings = serde_json::from_str(r#"{ "jump_limit": 50 }"#).unwrap();
        assert_eq!(s.jump_limit, Some(50));
        assert_eq!(s.sample_count, DEFAULT_SAMPLE_COUNT);
        assert!(!s.delay_jitter);
    }

    #[test]
    fn missing_file_yields_defaults() {
        let s = Settings::load(Path::new("/nonexistent/replay/settings.json"));
        assert_eq!(s, Settings::default());
    }

    #[test]
    fn saved_settings_load_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let s = Settings { seed: Some(9), delay_jitter: true, ..Settings::default() };
        s.save(&path);
        assert_eq!(Settings::load(&path), s);
    }
}
