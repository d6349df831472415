use crate::audio::{AudioEngine, SimulatedAudioEngine, format_time};
use crate::camera::{CameraError, StillFrameCamera};
use crate::classifier::{ClassifierClient, ClassifierConfig, RemoteGestureSource};
use crate::config;
use crate::core::{PlaylistStore, StoreEvent};
use crate::gesture::{
    FeedEvent, Gesture, GestureFeed, ScriptedGestureSource, SimulatedGestureSource, apply_gesture,
};
use crate::model::{PersistedSettings, TrackDraft, default_seed};
use anyhow::{Context, Result};
use std::io::{BufRead, Write, stdin, stdout};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{info, warn};

const INPUT_POLL: Duration = Duration::from_millis(33);
const HELP: &str = "Commands: list | play | next | prev | select <id> | add <title> | <artist> | <url> | remove <id> | gesture <label> | camera on|off | seek <seconds> | volume <0-100> | mute | status | save | quit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GestureMode {
    Simulated,
    Remote,
    Scripted(String),
}

#[derive(Debug, Clone, Default)]
pub struct SessionOptions {
    pub settings: PersistedSettings,
    pub gestures: Option<GestureMode>,
}

pub struct Session {
    pub store: PlaylistStore,
    audio: Box<dyn AudioEngine>,
    settings: PersistedSettings,
    store_events: Receiver<StoreEvent>,
    feed: Option<GestureFeed>,
    last_gesture: Option<(Gesture, Instant)>,
    pub quit: bool,
}

impl Session {
    pub fn new(
        mut store: PlaylistStore,
        audio: Box<dyn AudioEngine>,
        settings: PersistedSettings,
    ) -> Self {
        let store_events = store.subscribe();
        Self {
            store,
            audio,
            settings,
            store_events,
            feed: None,
            last_gesture: None,
            quit: false,
        }
    }

    pub fn audio(&self) -> &dyn AudioEngine {
        &*self.audio
    }

    pub fn settings(&self) -> &PersistedSettings {
        &self.settings
    }

    pub fn gestures_enabled(&self) -> bool {
        self.feed.is_some()
    }

    pub fn detected_gesture(&self) -> Option<&Gesture> {
        self.last_gesture.as_ref().map(|(gesture, _)| gesture)
    }

    pub fn enable_gestures(&mut self, mode: GestureMode) -> Result<()> {
        self.disable_gestures();
        let feed = match mode {
            GestureMode::Simulated => GestureFeed::spawn(SimulatedGestureSource::new(
                Duration::from_millis(self.settings.simulated_tick_ms),
                self.settings.simulated_detect_probability,
            ))?,
            GestureMode::Scripted(labels) => GestureFeed::spawn(ScriptedGestureSource::from_labels(
                &labels,
                Duration::from_millis(self.settings.capture_interval_ms),
            ))?,
            GestureMode::Remote => {
                let endpoint = self
                    .settings
                    .classifier_url
                    .clone()
                    .context("no classifier url configured")?;
                let Some(frames_dir) = self.settings.frames_dir.clone() else {
                    anyhow::bail!(CameraError::NotFound);
                };
                let client = ClassifierClient::new(ClassifierConfig {
                    endpoint,
                    csrf_cookie: self.settings.csrf_cookie.clone(),
                    timeout: Duration::from_secs(self.settings.request_timeout_secs),
                    cache_ttl: Duration::from_secs(self.settings.cache_ttl_secs),
                })?;
                GestureFeed::spawn(RemoteGestureSource::new(
                    Box::new(StillFrameCamera::new(frames_dir)),
                    client,
                    Duration::from_millis(self.settings.capture_interval_ms),
                ))?
            }
        };
        self.attach_feed(feed);
        Ok(())
    }

    pub fn attach_feed(&mut self, feed: GestureFeed) {
        self.disable_gestures();
        self.store
            .set_status(&format!("Gesture control on ({})", feed.source_name()));
        self.feed = Some(feed);
    }

    pub fn disable_gestures(&mut self) {
        if let Some(feed) = self.feed.take() {
            info!(source = feed.source_name(), "gesture control off");
            feed.stop();
            self.last_gesture = None;
            self.store.set_status("Gesture control off");
        }
    }

    pub fn handle_gesture(&mut self, gesture: Gesture) {
        if gesture == Gesture::None {
            return;
        }
        if apply_gesture(&mut self.store, &gesture).is_none() {
            info!(gesture = %gesture, "gesture not bound to a control");
        }
        self.store.set_status(&format!("Gesture detected: {gesture}"));
        self.last_gesture = Some((gesture, Instant::now()));
    }

    pub fn tick(&mut self) {
        self.pump_gesture_events();
        self.sync_audio();
        self.maybe_auto_advance();
        self.sync_audio();
        self.expire_gesture_indicator();
    }

    pub fn shutdown(&mut self) {
        self.disable_gestures();
        self.audio.stop();
    }

    fn pump_gesture_events(&mut self) {
        let Some(feed) = &self.feed else {
            return;
        };

        let finished = feed.is_finished();
        let mut events = Vec::new();
        while let Some(event) = feed.try_recv_event() {
            events.push(event);
        }
        if finished {
            self.feed = None;
        }

        for event in events {
            match event {
                FeedEvent::Detected(gesture) => self.handle_gesture(gesture),
                FeedEvent::Status(message) => self.store.set_status(&message),
                FeedEvent::CameraUnavailable(err) => {
                    warn!(error = %err, "falling back to manual controls");
                    self.store
                        .set_status(&format!("{err} Using manual controls."));
                }
            }
        }
    }

    fn sync_audio(&mut self) {
        let mut current_changed = false;
        let mut playback_changed = false;
        while let Ok(event) = self.store_events.try_recv() {
            match event {
                StoreEvent::CurrentChanged(_) => current_changed = true,
                StoreEvent::PlaybackChanged(_) => playback_changed = true,
                StoreEvent::TrackAdded(_) | StoreEvent::TrackRemoved(_) => {}
            }
        }
        if !current_changed && !playback_changed {
            return;
        }

        let Some(source_url) = self
            .store
            .current_track()
            .map(|track| track.source_url.clone())
        else {
            self.audio.stop();
            return;
        };

        if current_changed {
            self.audio.stop();
        }

        if !self.store.is_playing() {
            if self.audio.current_source().is_some() {
                self.audio.pause();
            }
            return;
        }

        if self.audio.current_source().is_some() {
            if self.audio.is_paused() {
                self.audio.resume();
            }
            return;
        }

        if let Err(err) = self.audio.play(&source_url) {
            warn!(source = %source_url, error = %err, "playback failed");
            self.store.set_playing(false);
            self.store.set_status(&format!("playback error: {err:#}"));
        }
    }

    fn maybe_auto_advance(&mut self) {
        if self.audio.current_source().is_none()
            || self.audio.is_paused()
            || !self.audio.is_finished()
        {
            return;
        }

        let before = self.store.current_track_id().map(str::to_string);
        self.store.next();
        if self.store.current_track_id().map(str::to_string) == before {
            self.audio.stop();
            self.store.set_playing(false);
            self.store.set_status("Reached end of playlist");
        }
    }

    fn expire_gesture_indicator(&mut self) {
        let hold = Duration::from_millis(self.settings.gesture_display_ms);
        if self
            .last_gesture
            .as_ref()
            .is_some_and(|(_, seen_at)| seen_at.elapsed() >= hold)
        {
            self.last_gesture = None;
            self.store.dirty = true;
        }
    }

    /// Returns text to print for listing commands.
    pub fn run_command(&mut self, raw: &str) -> Option<String> {
        let input = raw.trim();
        if input.is_empty() {
            return None;
        }

        let mut command_split = input.splitn(2, char::is_whitespace);
        let command = command_split.next().unwrap_or_default();
        let rest = command_split.next().unwrap_or("").trim();

        match command {
            "help" => return Some(String::from(HELP)),
            "list" => return Some(self.playlist_listing()),
            "status" => return Some(self.status_line()),
            "play" => self.store.play_pause(),
            "next" => self.store.next(),
            "prev" => self.store.previous(),
            "select" => {
                if rest.is_empty() {
                    self.store.set_status("Usage: select <id>");
                } else if let Err(err) = self.store.set_current_track(rest) {
                    warn!(error = %err, "select failed");
                }
            }
            "add" => {
                if let Err(err) = self.store.add_draft(TrackDraft::parse(rest)) {
                    warn!(error = %err, "add failed");
                }
            }
            "remove" => {
                if rest.is_empty() {
                    self.store.set_status("Usage: remove <id>");
                } else if let Err(err) = self.store.remove_track(rest) {
                    warn!(error = %err, "remove failed");
                }
            }
            "gesture" => {
                if rest.is_empty() {
                    self.store.set_status("Usage: gesture <label>");
                } else {
                    self.handle_gesture(Gesture::parse(rest));
                }
            }
            "camera" => match rest {
                "on" => {
                    let mode = if self.settings.classifier_url.is_some() {
                        GestureMode::Remote
                    } else {
                        GestureMode::Simulated
                    };
                    if let Err(err) = self.enable_gestures(mode) {
                        warn!(error = %err, "gesture control unavailable");
                        self.store
                            .set_status(&format!("{err:#} Using manual controls."));
                    }
                }
                "off" => self.disable_gestures(),
                _ => self.store.set_status("Usage: camera on|off"),
            },
            "seek" => match rest.parse::<f64>().map(Duration::try_from_secs_f64) {
                Ok(Ok(position)) => match self.audio.seek_to(position) {
                    Ok(()) => self
                        .store
                        .set_status(&format!("Seeked to {}", format_time(position))),
                    Err(err) => self.store.set_status(&format!("seek error: {err:#}")),
                },
                _ => self.store.set_status("Usage: seek <seconds>"),
            },
            "volume" => match rest.parse::<u8>() {
                Ok(percent) if percent <= 100 => {
                    let volume = f32::from(percent) / 100.0;
                    self.audio.set_volume(volume);
                    self.settings.saved_volume = volume;
                    self.store.set_status(&format!("Volume: {percent}%"));
                }
                _ => self.store.set_status("Usage: volume <0-100>"),
            },
            "mute" => {
                let muted = !self.audio.is_muted();
                self.audio.set_muted(muted);
                self.store
                    .set_status(if muted { "Muted" } else { "Unmuted" });
            }
            "save" => {
                if let Err(err) = config::save_settings(&self.settings) {
                    self.store.set_status(&format!("save error: {err:#}"));
                } else {
                    self.store.set_status("Settings saved");
                }
            }
            "quit" | "exit" => self.quit = true,
            _ => self.store.set_status("Unknown command. Use help"),
        }
        None
    }

    pub fn playlist_listing(&self) -> String {
        if self.store.is_empty() {
            return String::from("Playlist is empty");
        }

        let current = self.store.current_track_id();
        self.store
            .tracks()
            .iter()
            .map(|track| {
                let marker = if Some(track.id.as_str()) == current {
                    '>'
                } else {
                    ' '
                };
                format!("{marker} [{}] {}", track.id, track.label())
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn status_line(&self) -> String {
        let now_playing = self
            .store
            .current_track()
            .map(|track| track.label())
            .unwrap_or_else(|| String::from("No song selected"));
        let state = if self.store.is_playing() {
            "playing"
        } else {
            "paused"
        };
        let progress = match (self.audio.position(), self.audio.duration()) {
            (Some(position), Some(duration)) => {
                format!(" {}/{}", format_time(position), format_time(duration))
            }
            _ => String::new(),
        };
        let gesture = self
            .detected_gesture()
            .map(|gesture| format!(" [{gesture}]"))
            .unwrap_or_default();
        format!(
            "{now_playing} ({state}){progress}{gesture} | {}",
            self.store.status
        )
    }
}

pub fn run(options: SessionOptions) -> Result<()> {
    let store = PlaylistStore::seeded(default_seed())?;
    let mut audio = SimulatedAudioEngine::new();
    audio.set_volume(options.settings.saved_volume);
    let mut session = Session::new(store, Box::new(audio), options.settings);

    if let Some(mode) = options.gestures
        && let Err(err) = session.enable_gestures(mode)
    {
        warn!(error = %err, "gesture control unavailable");
        session
            .store
            .set_status(&format!("{err:#} Using manual controls."));
    }

    let input = spawn_input_reader()?;
    let mut out = stdout();
    writeln!(out, "{HELP}")?;

    while !session.quit {
        session.tick();
        if session.store.dirty {
            writeln!(out, "{}", session.status_line())?;
            session.store.dirty = false;
        }

        match input.recv_timeout(INPUT_POLL) {
            Ok(line) => {
                if let Some(output) = session.run_command(&line) {
                    writeln!(out, "{output}")?;
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    session.shutdown();
    info!("session ended");
    Ok(())
}

fn spawn_input_reader() -> Result<Receiver<String>> {
    let (tx, rx) = mpsc::channel();
    thread::Builder::new()
        .name(String::from("stdin"))
        .spawn(move || {
            for line in stdin().lock().lines() {
                let Ok(line) = line else {
                    break;
                };
                if tx.send(line).is_err() {
                    break;
                }
            }
        })
        .context("failed to start input reader")?;
    Ok(rx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Track;

    fn session_with_duration(duration: Duration) -> Session {
        let store = PlaylistStore::seeded(default_seed()).expect("seed");
        Session::new(
            store,
            Box::new(SimulatedAudioEngine::with_duration(duration)),
            PersistedSettings::default(),
        )
    }

    #[test]
    fn unknown_command_is_reported() {
        let mut session = session_with_duration(Duration::from_secs(60));
        session.run_command("wat");
        assert!(session.store.status.contains("Unknown command"));
    }

    #[test]
    fn play_starts_current_track_audio() {
        let mut session = session_with_duration(Duration::from_secs(60));
        session.run_command("play");
        session.tick();
        assert!(session.store.is_playing());
        assert_eq!(session.audio().current_source(), Some("/sample-audio.mp3"));
        assert!(!session.audio().is_paused());

        session.run_command("play");
        session.tick();
        assert!(session.audio().is_paused());
    }

    #[test]
    fn auto_advance_moves_to_next_track_when_finished() {
        let mut session = session_with_duration(Duration::ZERO);
        session.run_command("play");
        session.tick();
        assert_eq!(session.store.current_track_id(), Some("2"));
        assert!(session.store.is_playing());
    }

    #[test]
    fn auto_advance_pauses_when_nowhere_to_go() {
        let store = PlaylistStore::seeded(vec![Track::new("a", "a", "a", "a.mp3")]).expect("seed");
        let mut session = Session::new(
            store,
            Box::new(SimulatedAudioEngine::with_duration(Duration::ZERO)),
            PersistedSettings::default(),
        );
        session.run_command("play");
        session.tick();

        assert!(!session.store.is_playing());
        assert_eq!(session.audio().current_source(), None);
        assert_eq!(session.store.status, "Reached end of playlist");
    }

    #[test]
    fn add_command_validates_fields() {
        let mut session = session_with_duration(Duration::from_secs(60));
        session.run_command("add Moanin | | /static/audio/Moanin.mp3");
        assert_eq!(session.store.len(), 3);
        assert!(session.store.status.contains("missing artist"));

        session.run_command("add Moanin | Art Blakey | /static/audio/Moanin.mp3");
        assert_eq!(session.store.len(), 4);
    }

    #[test]
    fn removing_last_track_stops_audio() {
        let store = PlaylistStore::seeded(vec![Track::new("a", "a", "a", "a.mp3")]).expect("seed");
        let mut session = Session::new(
            store,
            Box::new(SimulatedAudioEngine::new()),
            PersistedSettings::default(),
        );
        session.run_command("play");
        session.tick();
        session.run_command("remove a");
        session.tick();

        assert!(session.store.is_empty());
        assert!(!session.store.is_playing());
        assert_eq!(session.audio().current_source(), None);
    }

    #[test]
    fn gesture_command_drives_store_and_indicator() {
        let mut session = session_with_duration(Duration::from_secs(60));
        session.run_command("gesture wave_right");
        assert_eq!(session.store.current_track_id(), Some("2"));
        assert_eq!(session.detected_gesture(), Some(&Gesture::WaveRight));

        session.run_command("gesture none");
        assert_eq!(session.store.current_track_id(), Some("2"));
        assert_eq!(session.detected_gesture(), Some(&Gesture::WaveRight));
    }

    #[test]
    fn gesture_indicator_expires() {
        let mut session = session_with_duration(Duration::from_secs(60));
        session.settings.gesture_display_ms = 0;
        session.run_command("gesture fist");
        session.tick();
        assert_eq!(session.detected_gesture(), None);
    }

    #[test]
    fn scripted_feed_is_drained_and_dropped() {
        let mut session = session_with_duration(Duration::from_secs(60));
        let feed = GestureFeed::spawn(ScriptedGestureSource::from_labels(
            "wave_right,wave_right,fist",
            Duration::ZERO,
        ))
        .expect("spawn");
        session.attach_feed(feed);

        let deadline = Instant::now() + Duration::from_secs(3);
        while session.gestures_enabled() && Instant::now() < deadline {
            session.tick();
            thread::sleep(Duration::from_millis(5));
        }

        assert!(!session.gestures_enabled());
        assert_eq!(session.store.current_track_id(), Some("3"));
        assert!(session.store.is_playing());
        assert_eq!(session.audio().current_source(), Some("/sample-audio.mp3"));
    }

    #[test]
    fn remote_mode_without_camera_falls_back_to_manual() {
        let mut session = session_with_duration(Duration::from_secs(60));
        session.settings.classifier_url = Some(String::from("http://127.0.0.1:9/detectar-gesto/"));
        session.run_command("camera on");

        assert!(!session.gestures_enabled());
        assert!(session.store.status.contains("No camera was found"));
        session.run_command("next");
        assert_eq!(session.store.current_track_id(), Some("2"));
    }

    #[test]
    fn volume_command_is_remembered() {
        let mut session = session_with_duration(Duration::from_secs(60));
        session.run_command("volume 35");
        assert_eq!(session.audio().volume(), 0.35);
        assert_eq!(session.settings().saved_volume, 0.35);
        session.run_command("volume 250");
        assert_eq!(session.store.status, "Usage: volume <0-100>");
    }

    #[test]
    fn rejected_playlist_commands_leave_state_alone() {
        let mut session = session_with_duration(Duration::from_secs(60));
        session.run_command("select 42");
        assert_eq!(session.store.current_track_id(), Some("1"));
        assert_eq!(session.store.status, "Track 42 not found");

        session.run_command("remove 42");
        assert_eq!(session.store.len(), 3);
        assert_eq!(session.store.status, "Track 42 not found");
    }

    #[test]
    fn listing_marks_current_track() {
        let session = session_with_duration(Duration::from_secs(60));
        let listing = session.playlist_listing();
        assert!(listing.starts_with("> [1] Summertime - Cinematic Orchestra"));
        assert_eq!(listing.lines().count(), 3);
    }
}
