use crate::camera::CameraError;
use crate::core::PlaylistStore;
use anyhow::Context;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use std::fmt;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info};

const SIMULATED_LABELS: [&str; 5] = ["wave_right", "wave_left", "palm_up", "palm_down", "fist"];

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Gesture {
    WaveRight,
    WaveLeft,
    Fist,
    PalmUp,
    PalmDown,
    None,
    Other(String),
}

impl Gesture {
    pub fn parse(label: &str) -> Self {
        // Classifier labels come from a mirrored frame.
        match label.trim() {
            "Close" => return Self::Fist,
            "Next" => return Self::WaveLeft,
            "Previous" => return Self::WaveRight,
            _ => {}
        }

        match label.trim().to_ascii_lowercase().as_str() {
            "wave_right" => Self::WaveRight,
            "wave_left" => Self::WaveLeft,
            "fist" => Self::Fist,
            "palm_up" => Self::PalmUp,
            "palm_down" => Self::PalmDown,
            "none" | "" => Self::None,
            _ => Self::Other(label.trim().to_string()),
        }
    }

    pub fn label(&self) -> &str {
        match self {
            Self::WaveRight => "wave_right",
            Self::WaveLeft => "wave_left",
            Self::Fist => "fist",
            Self::PalmUp => "palm_up",
            Self::PalmDown => "palm_down",
            Self::None => "none",
            Self::Other(label) => label,
        }
    }

    pub fn command(&self) -> Option<PlayerCommand> {
        match self {
            Self::WaveRight => Some(PlayerCommand::Next),
            Self::WaveLeft => Some(PlayerCommand::Previous),
            Self::Fist => Some(PlayerCommand::PlayPause),
            Self::PalmUp | Self::PalmDown | Self::None | Self::Other(_) => None,
        }
    }
}

impl fmt::Display for Gesture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerCommand {
    Next,
    Previous,
    PlayPause,
}

impl PlayerCommand {
    pub fn apply(self, store: &mut PlaylistStore) {
        match self {
            Self::Next => store.next(),
            Self::Previous => store.previous(),
            Self::PlayPause => store.play_pause(),
        }
    }
}

pub fn apply_gesture(store: &mut PlaylistStore, gesture: &Gesture) -> Option<PlayerCommand> {
    let command = gesture.command()?;
    debug!(gesture = %gesture, ?command, "gesture applied");
    command.apply(store);
    Some(command)
}

#[derive(Debug)]
pub enum FeedEvent {
    Detected(Gesture),
    Status(String),
    CameraUnavailable(CameraError),
}

#[derive(Debug)]
enum FeedCommand {
    Shutdown,
}

pub struct FeedSender {
    event_tx: Sender<FeedEvent>,
    cmd_rx: Receiver<FeedCommand>,
}

impl FeedSender {
    pub fn send(&self, event: FeedEvent) -> bool {
        self.event_tx.send(event).is_ok()
    }

    pub fn wait(&self, interval: Duration) -> bool {
        match self.cmd_rx.recv_timeout(interval) {
            Ok(FeedCommand::Shutdown) => false,
            Err(RecvTimeoutError::Timeout) => true,
            Err(RecvTimeoutError::Disconnected) => false,
        }
    }
}

pub trait GestureSource: Send + 'static {
    fn name(&self) -> &'static str;
    fn run(self: Box<Self>, feed: FeedSender);
}

pub struct GestureFeed {
    source_name: &'static str,
    cmd_tx: Sender<FeedCommand>,
    event_rx: Receiver<FeedEvent>,
    worker: Option<JoinHandle<()>>,
}

impl GestureFeed {
    pub fn spawn<G: GestureSource>(source: G) -> anyhow::Result<Self> {
        let (cmd_tx, cmd_rx) = mpsc::channel();
        let (event_tx, event_rx) = mpsc::channel();
        let source_name = source.name();
        let feed = FeedSender { event_tx, cmd_rx };

        let worker = thread::Builder::new()
            .name(format!("gesture-{source_name}"))
            .spawn(move || Box::new(source).run(feed))
            .with_context(|| format!("failed to start {source_name} gesture source"))?;
        info!(source = source_name, "gesture feed started");

        Ok(Self {
            source_name,
            cmd_tx,
            event_rx,
            worker: Some(worker),
        })
    }

    pub fn source_name(&self) -> &'static str {
        self.source_name
    }

    pub fn try_recv_event(&self) -> Option<FeedEvent> {
        self.event_rx.try_recv().ok()
    }

    pub fn recv_event_timeout(&self, timeout: Duration) -> Option<FeedEvent> {
        self.event_rx.recv_timeout(timeout).ok()
    }

    pub fn is_finished(&self) -> bool {
        self.worker
            .as_ref()
            .is_none_or(|worker| worker.is_finished())
    }

    pub fn shutdown(&self) {
        let _ = self.cmd_tx.send(FeedCommand::Shutdown);
    }

    /// Joins the source thread, so whatever it held is released on return.
    pub fn stop(mut self) {
        self.shutdown();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
        info!(source = self.source_name, "gesture feed stopped");
    }
}

impl Drop for GestureFeed {
    fn drop(&mut self) {
        self.shutdown();
    }
}

pub struct SimulatedGestureSource {
    rng: SmallRng,
    tick: Duration,
    probability: f64,
}

impl SimulatedGestureSource {
    pub fn new(tick: Duration, probability: f64) -> Self {
        Self {
            rng: SmallRng::from_os_rng(),
            tick,
            probability: probability.clamp(0.0, 1.0),
        }
    }

    pub fn seeded(seed: u64, tick: Duration, probability: f64) -> Self {
        Self {
            rng: SmallRng::seed_from_u64(seed),
            tick,
            probability: probability.clamp(0.0, 1.0),
        }
    }

    fn draw(&mut self) -> Option<Gesture> {
        let label = SIMULATED_LABELS[self.rng.random_range(0..SIMULATED_LABELS.len())];
        let roll: f64 = self.rng.random_range(0.0..1.0);
        (roll < self.probability).then(|| Gesture::parse(label))
    }
}

impl GestureSource for SimulatedGestureSource {
    fn name(&self) -> &'static str {
        "simulated"
    }

    fn run(mut self: Box<Self>, feed: FeedSender) {
        while feed.wait(self.tick) {
            if let Some(gesture) = self.draw()
                && !feed.send(FeedEvent::Detected(gesture))
            {
                break;
            }
        }
    }
}

pub struct ScriptedGestureSource {
    gestures: Vec<Gesture>,
    gap: Duration,
}

impl ScriptedGestureSource {
    pub fn new(gestures: Vec<Gesture>, gap: Duration) -> Self {
        Self { gestures, gap }
    }

    pub fn from_labels(labels: &str, gap: Duration) -> Self {
        let gestures = labels
            .split(',')
            .filter(|label| !label.trim().is_empty())
            .map(Gesture::parse)
            .collect();
        Self::new(gestures, gap)
    }
}

impl GestureSource for ScriptedGestureSource {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn run(self: Box<Self>, feed: FeedSender) {
        for gesture in self.gestures {
            if !feed.wait(self.gap) || !feed.send(FeedEvent::Detected(gesture)) {
                return;
            }
        }
        let _ = feed.send(FeedEvent::Status(String::from("Gesture script finished")));
    }
}
