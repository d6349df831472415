use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const DEFAULT_SOURCE_URL: &str = "/sample-audio.mp3";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Track {
    pub id: String,
    pub title: String,
    pub artist: String,
    pub source_url: String,
}

impl Track {
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        artist: impl Into<String>,
        source_url: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            artist: artist.into(),
            source_url: source_url.into(),
        }
    }

    pub fn label(&self) -> String {
        format!("{} - {}", self.title, self.artist)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackDraft {
    pub title: String,
    pub artist: String,
    pub source_url: String,
}

impl TrackDraft {
    /// Parses `title | artist | url`.
    pub fn parse(raw: &str) -> Self {
        let mut parts = raw.splitn(3, '|').map(str::trim);
        Self {
            title: parts.next().unwrap_or_default().to_string(),
            artist: parts.next().unwrap_or_default().to_string(),
            source_url: parts.next().unwrap_or_default().to_string(),
        }
    }
}

pub fn default_seed() -> Vec<Track> {
    vec![
        Track::new("1", "Summertime", "Cinematic Orchestra", DEFAULT_SOURCE_URL),
        Track::new("2", "Midnight Jazz", "Blue Note Ensemble", DEFAULT_SOURCE_URL),
        Track::new("3", "Ocean Waves", "Ambient Sounds", DEFAULT_SOURCE_URL),
    ]
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PersistedSettings {
    #[serde(default)]
    pub classifier_url: Option<String>,
    #[serde(default)]
    pub csrf_cookie: Option<String>,
    #[serde(default)]
    pub frames_dir: Option<PathBuf>,
    #[serde(default = "default_capture_interval_ms")]
    pub capture_interval_ms: u64,
    #[serde(default = "default_simulated_tick_ms")]
    pub simulated_tick_ms: u64,
    #[serde(default = "default_simulated_detect_probability")]
    pub simulated_detect_probability: f64,
    #[serde(default = "default_gesture_display_ms")]
    pub gesture_display_ms: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
    #[serde(default = "default_saved_volume")]
    pub saved_volume: f32,
}

fn default_capture_interval_ms() -> u64 {
    2000
}

fn default_simulated_tick_ms() -> u64 {
    100
}

fn default_simulated_detect_probability() -> f64 {
    0.05
}

fn default_gesture_display_ms() -> u64 {
    1500
}

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_cache_ttl_secs() -> u64 {
    60
}

fn default_saved_volume() -> f32 {
    0.8
}

impl Default for PersistedSettings {
    fn default() -> Self {
        Self {
            classifier_url: None,
            csrf_cookie: None,
            frames_dir: None,
            capture_interval_ms: default_capture_interval_ms(),
            simulated_tick_ms: default_simulated_tick_ms(),
            simulated_detect_probability: default_simulated_detect_probability(),
            gesture_display_ms: default_gesture_display_ms(),
            request_timeout_secs: default_request_timeout_secs(),
            cache_ttl_secs: default_cache_ttl_secs(),
            saved_volume: default_saved_volume(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn draft_parses_pipe_separated_fields() {
        let draft = TrackDraft::parse(" Moanin | Art Blakey |/static/audio/Moanin.mp3 ");
        assert_eq!(draft.title, "Moanin");
        assert_eq!(draft.artist, "Art Blakey");
        assert_eq!(draft.source_url, "/static/audio/Moanin.mp3");
    }

    #[test]
    fn draft_keeps_missing_fields_empty() {
        let draft = TrackDraft::parse("only a title");
        assert_eq!(draft.title, "only a title");
        assert!(draft.artist.is_empty());
        assert!(draft.source_url.is_empty());
    }

    #[test]
    fn missing_settings_fields_use_defaults() {
        let settings: PersistedSettings =
            serde_json::from_str(r#"{"classifier_url":"http://127.0.0.1:8000/detectar-gesto/"}"#)
                .expect("parse");
        assert_eq!(settings.capture_interval_ms, 2000);
        assert_eq!(settings.gesture_display_ms, 1500);
        assert_eq!(settings.cache_ttl_secs, 60);
        assert!(settings.frames_dir.is_none());
    }
}
