use anyhow::Result;
use std::time::Duration;
use std::time::Instant;
use tracing::debug;

const MAX_VOLUME: f32 = 1.0;
pub const DEFAULT_NOMINAL_DURATION: Duration = Duration::from_secs(180);

pub trait AudioEngine {
    fn play(&mut self, source_url: &str) -> Result<()>;
    fn pause(&mut self);
    fn resume(&mut self);
    fn stop(&mut self);
    fn is_paused(&self) -> bool;
    fn current_source(&self) -> Option<&str>;
    fn position(&self) -> Option<Duration>;
    fn duration(&self) -> Option<Duration>;
    fn seek_to(&mut self, position: Duration) -> Result<()>;
    fn volume(&self) -> f32;
    fn set_volume(&mut self, volume: f32);
    fn is_muted(&self) -> bool;
    fn set_muted(&mut self, muted: bool);
    /// True once the current track has played to its end.
    fn is_finished(&self) -> bool;
}

/// Keeps time for a track without producing sound. Every source is assumed
/// to last `nominal_duration`.
pub struct SimulatedAudioEngine {
    paused: bool,
    muted: bool,
    current: Option<String>,
    volume: f32,
    started_at: Option<Instant>,
    position_offset: Duration,
    nominal_duration: Duration,
}

impl SimulatedAudioEngine {
    pub fn new() -> Self {
        Self::with_duration(DEFAULT_NOMINAL_DURATION)
    }

    pub fn with_duration(nominal_duration: Duration) -> Self {
        Self {
            paused: false,
            muted: false,
            current: None,
            volume: 1.0,
            started_at: None,
            position_offset: Duration::ZERO,
            nominal_duration,
        }
    }

    fn current_position(&self) -> Duration {
        let mut position = self.position_offset;
        if !self.paused
            && self.current.is_some()
            && let Some(started_at) = self.started_at
        {
            position = position.saturating_add(started_at.elapsed());
        }
        position.min(self.nominal_duration)
    }
}

impl Default for SimulatedAudioEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioEngine for SimulatedAudioEngine {
    fn play(&mut self, source_url: &str) -> Result<()> {
        if source_url.trim().is_empty() {
            anyhow::bail!("track has no source url");
        }
        debug!(source = source_url, "simulated playback started");
        self.paused = false;
        self.current = Some(source_url.to_string());
        self.started_at = Some(Instant::now());
        self.position_offset = Duration::ZERO;
        Ok(())
    }

    fn pause(&mut self) {
        self.position_offset = self.current_position();
        self.started_at = None;
        self.paused = true;
    }

    fn resume(&mut self) {
        if self.current.is_some() {
            self.started_at = Some(Instant::now());
        }
        self.paused = false;
    }

    fn stop(&mut self) {
        self.current = None;
        self.paused = false;
        self.started_at = None;
        self.position_offset = Duration::ZERO;
    }

    fn is_paused(&self) -> bool {
        self.paused
    }

    fn current_source(&self) -> Option<&str> {
        self.current.as_deref()
    }

    fn position(&self) -> Option<Duration> {
        self.current.as_ref()?;
        Some(self.current_position())
    }

    fn duration(&self) -> Option<Duration> {
        self.current.as_ref().map(|_| self.nominal_duration)
    }

    fn seek_to(&mut self, position: Duration) -> Result<()> {
        if self.current.is_none() {
            anyhow::bail!("no active track");
        }

        self.position_offset = position.min(self.nominal_duration);
        self.started_at = if self.paused {
            None
        } else {
            Some(Instant::now())
        };
        Ok(())
    }

    fn volume(&self) -> f32 {
        self.volume
    }

    fn set_volume(&mut self, volume: f32) {
        self.volume = volume.clamp(0.0, MAX_VOLUME);
    }

    fn is_muted(&self) -> bool {
        self.muted
    }

    fn set_muted(&mut self, muted: bool) {
        self.muted = muted;
    }

    fn is_finished(&self) -> bool {
        self.current.is_some() && !self.paused && self.current_position() >= self.nominal_duration
    }
}

pub fn format_time(time: Duration) -> String {
    let total = time.as_secs();
    format!("{}:{:02}", total / 60, total % 60)
}
