//! TOML configuration file loading
//!
//! Supports `~/.config/ipguard/config.toml` as a persistent config source.
//! All fields are optional; the file is a partial overlay on top of defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct ConsultConfigFile {
    /// Live service configuration
    #[serde(default)]
    pub live: LiveFileConfig,

    /// Audio device configuration
    #[serde(default)]
    pub audio: AudioFileConfig,
}

/// Live service configuration
#[derive(Debug, Default, Deserialize)]
pub struct LiveFileConfig {
    /// WebSocket endpoint of the live service
    pub endpoint: Option<String>,

    /// Model identifier (e.g. "models/gemini-2.5-flash-native-audio-preview-09-2025")
    pub model: Option<String>,

    /// Prebuilt voice name (e.g. "Kore")
    pub voice: Option<String>,

    /// System instruction for the consultant persona
    pub system_instruction: Option<String>,

    /// API key (prefer the environment)
    pub api_key: Option<String>,

    /// Seconds to wait for the stream to open
    pub connect_timeout_secs: Option<u64>,
}

/// Audio device configuration
#[derive(Debug, Default, Deserialize)]
pub struct AudioFileConfig {
    pub input_sample_rate: Option<u32>,
    pub output_sample_rate: Option<u32>,
    pub frame_size: Option<usize>,
}

/// Load the TOML config file from the standard path
///
/// Returns `ConsultConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file() -> ConsultConfigFile {
    config_file_path().map_or_else(ConsultConfigFile::default, |path| load_config_file_from(&path))
}

/// Load a TOML config file from an explicit path
///
/// Missing or unparsable files yield defaults.
pub fn load_config_file_from(path: &Path) -> ConsultConfigFile {
    if !path.exists() {
        return ConsultConfigFile::default();
    }

    match std::fs::read_to_string(path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                ConsultConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            ConsultConfigFile::default()
        }
    }
}

/// Return the config file path: `~/.config/ipguard/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("ipguard").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[live]\nvoice = \"Puck\"\n\n[audio]\nframe_size = 2048\n",
        )
        .unwrap();

        let fc = load_config_file_from(&path);
        assert_eq!(fc.live.voice.as_deref(), Some("Puck"));
        assert_eq!(fc.audio.frame_size, Some(2048));
        assert!(fc.live.model.is_none());
    }

    #[test]
    fn invalid_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[live\nvoice = ").unwrap();

        let fc = load_config_file_from(&path);
        assert!(fc.live.voice.is_none());
    }

    #[test]
    fn missing_file_is_default() {
        let fc = load_config_file_from(Path::new("/nonexistent/ipguard/config.toml"));
        assert!(fc.live.endpoint.is_none());
        assert!(fc.audio.input_sample_rate.is_none());
    }
}
