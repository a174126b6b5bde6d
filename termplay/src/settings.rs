use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use media_pipeline::PipelineConfig;

/**
    Seek distances, in seconds, for the three seek key variants.
*/
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeekSteps {
    pub small: f64,
    pub normal: f64,
    pub large: f64,
}

impl Default for SeekSteps {
    fn default() -> Self {
        Self {
            small: 4.0,
            normal: 10.0,
            large: 30.0,
        }
    }
}

/**
    Persistent player settings.

    Stored as JSON; any field left out of the file takes its default.
*/
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub pipeline: PipelineConfig,
    pub seek_steps: SeekSteps,
    /// Pre-roll before playback starts, so the queues can fill.
    pub startup_delay_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            pipeline: PipelineConfig::default(),
            seek_steps: SeekSteps::default(),
            startup_delay_ms: 500,
        }
    }
}

impl Settings {
    /**
        Default location of the settings file.
    */
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("termplay").join("config.json"))
    }

    /**
        Load settings from `path`. A missing file yields the defaults;
        an unreadable or malformed one is an error.
    */
    pub fn load(path: &Path) -> io::Result<Self> {
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no settings file, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(e),
        };
        serde_json::from_str(&contents).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }

    /**
        Write settings to `path`, creating parent directories as needed.
    */
    pub fn save(&self, path: &Path) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self).map_err(io::Error::other)?;
        fs::write(path, contents)
    }

    pub fn startup_delay(&self) -> Duration {
        Duration::from_millis(self.startup_delay_ms)
    }
}
