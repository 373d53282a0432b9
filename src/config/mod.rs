//! Configuration management for the consultation client
//!
//! Precedence: environment > TOML file > defaults.

pub mod file;

use std::time::Duration;

use secrecy::SecretString;

use crate::live::SessionSetup;

pub use file::{ConsultConfigFile, config_file_path, load_config_file, load_config_file_from};

/// Default live service WebSocket endpoint
pub const DEFAULT_ENDPOINT: &str = "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent";

/// Default native-audio model
pub const DEFAULT_MODEL: &str = "models/gemini-2.5-flash-native-audio-preview-09-2025";

/// Default prebuilt voice
pub const DEFAULT_VOICE: &str = "Kore";

/// Default consultant persona
pub const DEFAULT_SYSTEM_INSTRUCTION: &str = "You are an elite international trademark and IP consultant. Speak professionally, calmly, and help the user with their filing strategy. Keep answers concise for a natural conversation.";

/// Client configuration
#[derive(Debug)]
pub struct Config {
    /// Live service configuration
    pub live: LiveConfig,

    /// Audio device configuration
    pub audio: AudioConfig,
}

/// Live service configuration
#[derive(Debug)]
pub struct LiveConfig {
    /// WebSocket endpoint
    pub endpoint: String,

    /// Model identifier
    pub model: String,

    /// Prebuilt voice name
    pub voice: String,

    /// System instruction for the consultant persona
    pub system_instruction: String,

    /// API key for the live service
    pub api_key: Option<SecretString>,

    /// Time allowed for the stream to open
    pub connect_timeout: Duration,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            model: DEFAULT_MODEL.to_string(),
            voice: DEFAULT_VOICE.to_string(),
            system_instruction: DEFAULT_SYSTEM_INSTRUCTION.to_string(),
            api_key: None,
            connect_timeout: Duration::from_secs(15),
        }
    }
}

impl LiveConfig {
    /// Fixed session setup sent when the stream opens
    #[must_use]
    pub fn setup(&self) -> SessionSetup {
        SessionSetup::new(&self.model, &self.voice, &self.system_instruction)
    }
}

/// Audio device configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioConfig {
    /// Microphone sample rate (16kHz for speech)
    pub input_sample_rate: u32,

    /// Playback sample rate of received audio
    pub output_sample_rate: u32,

    /// Samples per captured frame
    pub frame_size: usize,

    /// Requested capture channel count
    pub channels: u16,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            input_sample_rate: 16000,
            output_sample_rate: 24000,
            frame_size: 4096,
            channels: 1,
        }
    }
}

impl Config {
    /// Load configuration from the config file and process environment
    #[must_use]
    pub fn load() -> Self {
        Self::from_sources(load_config_file(), |key| std::env::var(key).ok())
    }

    /// Build configuration from a parsed file and an environment lookup
    pub fn from_sources(fc: ConsultConfigFile, env: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = LiveConfig::default();
        let non_empty = |key: &str| env(key).filter(|v| !v.trim().is_empty());

        let api_key = non_empty("IPGUARD_API_KEY")
            .or_else(|| non_empty("GEMINI_API_KEY"))
            .or_else(|| non_empty("API_KEY"))
            .or(fc.live.api_key)
            .map(SecretString::from);

        let live = LiveConfig {
            endpoint: non_empty("IPGUARD_ENDPOINT")
                .or(fc.live.endpoint)
                .unwrap_or(defaults.endpoint),
            model: non_empty("IPGUARD_MODEL")
                .or(fc.live.model)
                .unwrap_or(defaults.model),
            voice: non_empty("IPGUARD_VOICE")
                .or(fc.live.voice)
                .unwrap_or(defaults.voice),
            system_instruction: fc
                .live
                .system_instruction
                .unwrap_or(defaults.system_instruction),
            api_key,
            connect_timeout: fc
                .live
                .connect_timeout_secs
                .map_or(defaults.connect_timeout, Duration::from_secs),
        };

        let audio_defaults = AudioConfig::default();
        let audio = AudioConfig {
            input_sample_rate: fc
                .audio
                .input_sample_rate
                .unwrap_or(audio_defaults.input_sample_rate),
            output_sample_rate: fc
                .audio
                .output_sample_rate
                .unwrap_or(audio_defaults.output_sample_rate),
            frame_size: fc
                .audio
                .frame_size
                .filter(|&n| n > 0)
                .unwrap_or(audio_defaults.frame_size),
            channels: audio_defaults.channels,
        };

        Self { live, audio }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use secrecy::ExposeSecret;

    use super::*;

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_without_sources() {
        let config = Config::from_sources(ConsultConfigFile::default(), env_from(&[]));

        assert_eq!(config.live.model, DEFAULT_MODEL);
        assert_eq!(config.live.voice, "Kore");
        assert!(config.live.api_key.is_none());
        assert_eq!(config.audio, AudioConfig::default());
        assert_eq!(config.audio.frame_size, 4096);
    }

    #[test]
    fn env_overrides_file() {
        let mut fc = ConsultConfigFile::default();
        fc.live.voice = Some("Puck".to_string());
        fc.live.model = Some("models/from-file".to_string());
        fc.live.api_key = Some("file-key".to_string());

        let config = Config::from_sources(
            fc,
            env_from(&[("IPGUARD_VOICE", "Charon"), ("GEMINI_API_KEY", "env-key")]),
        );

        assert_eq!(config.live.voice, "Charon");
        assert_eq!(config.live.model, "models/from-file");
        assert_eq!(
            config.live.api_key.as_ref().map(ExposeSecret::expose_secret),
            Some("env-key")
        );
    }

    #[test]
    fn blank_env_values_are_ignored() {
        let config = Config::from_sources(
            ConsultConfigFile::default(),
            env_from(&[("IPGUARD_API_KEY", "  "), ("API_KEY", "fallback")]),
        );

        assert_eq!(
            config.live.api_key.as_ref().map(ExposeSecret::expose_secret),
            Some("fallback")
        );
    }

    #[test]
    fn api_key_is_redacted_in_debug() {
        let config = Config::from_sources(
            ConsultConfigFile::default(),
            env_from(&[("IPGUARD_API_KEY", "super-secret")]),
        );

        assert!(!format!("{config:?}").contains("super-secret"));
    }
}
