use crate::model::{Track, TrackDraft};
use std::sync::mpsc::{self, Receiver, Sender};
use thiserror::Error;
use time::OffsetDateTime;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlaylistError {
    #[error("a track with id {0} is already in the playlist")]
    DuplicateId(String),
    #[error("no track with id {0} in the playlist")]
    NotFound(String),
    #[error("missing {0}")]
    MissingField(&'static str),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    TrackAdded(String),
    TrackRemoved(String),
    CurrentChanged(Option<String>),
    PlaybackChanged(bool),
}

/// Owns the playlist and the playback flag. Every mutation goes through here
/// and is announced to subscribers.
#[derive(Debug)]
pub struct PlaylistStore {
    tracks: Vec<Track>,
    current_track_id: Option<String>,
    is_playing: bool,
    subscribers: Vec<Sender<StoreEvent>>,
    pub dirty: bool,
    pub status: String,
}

impl Default for PlaylistStore {
    fn default() -> Self {
        Self::new()
    }
}

impl PlaylistStore {
    pub fn new() -> Self {
        Self {
            tracks: Vec::new(),
            current_track_id: None,
            is_playing: false,
            subscribers: Vec::new(),
            dirty: true,
            status: String::from("Ready"),
        }
    }

    pub fn seeded(seed: Vec<Track>) -> Result<Self, PlaylistError> {
        let mut store = Self::new();
        for track in seed {
            store.add_track(track)?;
        }
        store.set_status("Ready");
        Ok(store)
    }

    pub fn subscribe(&mut self) -> Receiver<StoreEvent> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.push(tx);
        rx
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn is_playing(&self) -> bool {
        self.is_playing
    }

    pub fn current_track_id(&self) -> Option<&str> {
        self.current_track_id.as_deref()
    }

    pub fn current_index(&self) -> Option<usize> {
        let id = self.current_track_id.as_deref()?;
        self.position_of(id)
    }

    pub fn current_track(&self) -> Option<&Track> {
        self.current_index().and_then(|idx| self.tracks.get(idx))
    }

    pub fn track(&self, id: &str) -> Option<&Track> {
        self.position_of(id).and_then(|idx| self.tracks.get(idx))
    }

    pub fn add_track(&mut self, track: Track) -> Result<(), PlaylistError> {
        if self.position_of(&track.id).is_some() {
            self.set_status(&format!("Track {} already exists", track.id));
            return Err(PlaylistError::DuplicateId(track.id));
        }

        info!(id = %track.id, title = %track.title, "track added");
        let id = track.id.clone();
        self.set_status(&format!("Added {}", track.label()));
        self.tracks.push(track);
        self.emit(StoreEvent::TrackAdded(id));

        if self.current_track_id.is_none() {
            self.select_first();
        }
        Ok(())
    }

    pub fn add_draft(&mut self, draft: TrackDraft) -> Result<String, PlaylistError> {
        let title = draft.title.trim();
        let artist = draft.artist.trim();
        let source_url = draft.source_url.trim();
        let missing = if title.is_empty() {
            Some("title")
        } else if artist.is_empty() {
            Some("artist")
        } else if source_url.is_empty() {
            Some("source url")
        } else {
            None
        };
        if let Some(field) = missing {
            self.set_status(&format!("Please fill in all fields (missing {field})"));
            return Err(PlaylistError::MissingField(field));
        }

        let id = self.fresh_id();
        self.add_track(Track::new(id.clone(), title, artist, source_url))?;
        Ok(id)
    }

    pub fn remove_track(&mut self, id: &str) -> Result<Track, PlaylistError> {
        let Some(idx) = self.position_of(id) else {
            self.set_status(&format!("Track {id} not found"));
            return Err(PlaylistError::NotFound(id.to_string()));
        };

        let removed = self.tracks.remove(idx);
        info!(id = %removed.id, remaining = self.tracks.len(), "track removed");
        self.set_status(&format!("Removed {}", removed.label()));
        self.emit(StoreEvent::TrackRemoved(removed.id.clone()));

        if self.current_track_id.as_deref() == Some(id) {
            self.current_track_id = None;
            if self.tracks.is_empty() {
                self.emit(StoreEvent::CurrentChanged(None));
                if self.is_playing {
                    self.is_playing = false;
                    self.emit(StoreEvent::PlaybackChanged(false));
                }
            } else {
                self.select_first();
            }
        }
        Ok(removed)
    }

    pub fn set_current_track(&mut self, id: &str) -> Result<(), PlaylistError> {
        let Some(idx) = self.position_of(id) else {
            self.set_status(&format!("Track {id} not found"));
            return Err(PlaylistError::NotFound(id.to_string()));
        };
        self.select_index(idx);
        Ok(())
    }

    pub fn play_pause(&mut self) {
        if self.tracks.is_empty() {
            self.set_status("Playlist is empty");
            return;
        }
        let playing = !self.is_playing;
        self.set_playing(playing);
    }

    pub fn set_playing(&mut self, playing: bool) {
        if self.tracks.is_empty() || self.is_playing == playing {
            return;
        }

        self.is_playing = playing;
        debug!(playing, "playback toggled");
        self.set_status(if playing { "Playing" } else { "Paused" });
        self.emit(StoreEvent::PlaybackChanged(playing));
    }

    pub fn next(&mut self) {
        let len = self.tracks.len();
        if len <= 1 {
            return;
        }
        let Some(current) = self.current_index() else {
            return;
        };
        self.select_index((current + 1) % len);
    }

    pub fn previous(&mut self) {
        let len = self.tracks.len();
        if len <= 1 {
            return;
        }
        let Some(current) = self.current_index() else {
            return;
        };
        self.select_index((current + len - 1) % len);
    }

    pub fn set_status(&mut self, message: &str) {
        self.status = message.to_string();
        self.dirty = true;
    }

    fn select_first(&mut self) {
        if !self.tracks.is_empty() {
            self.select_index(0);
        }
    }

    fn select_index(&mut self, idx: usize) {
        let Some(track) = self.tracks.get(idx) else {
            return;
        };
        if self.current_track_id.as_deref() == Some(track.id.as_str()) {
            return;
        }

        let id = track.id.clone();
        let label = track.label();
        debug!(id = %id, index = idx, "current track changed");
        self.current_track_id = Some(id.clone());
        self.set_status(&format!("Now selected: {label}"));
        self.emit(StoreEvent::CurrentChanged(Some(id)));
    }

    fn position_of(&self, id: &str) -> Option<usize> {
        self.tracks.iter().position(|track| track.id == id)
    }

    fn fresh_id(&self) -> String {
        let mut candidate = (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as u64;
        while self.position_of(&candidate.to_string()).is_some() {
            candidate += 1;
        }
        candidate.to_string()
    }

    fn emit(&mut self, event: StoreEvent) {
        self.dirty = true;
        self.subscribers
            .retain(|subscriber| subscriber.send(event.clone()).is_ok());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::default_seed;
    use proptest::prop_assert_eq;

    fn numbered(len: usize) -> Vec<Track> {
        (0..len)
            .map(|n| Track::new(format!("{n}"), format!("song {n}"), "artist", "song.mp3"))
            .collect()
    }

    #[test]
    fn seed_selects_first_track() {
        let store = PlaylistStore::seeded(default_seed()).expect("seed");
        assert_eq!(store.current_track_id(), Some("1"));
        assert!(!store.is_playing());
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn next_walks_and_wraps() {
        let mut store = PlaylistStore::seeded(default_seed()).expect("seed");
        store.next();
        assert_eq!(store.current_track_id(), Some("2"));
        store.next();
        assert_eq!(store.current_track_id(), Some("3"));
        store.next();
        assert_eq!(store.current_track_id(), Some("1"));
    }

    #[test]
    fn previous_wraps_backwards() {
        let mut store = PlaylistStore::seeded(default_seed()).expect("seed");
        store.previous();
        assert_eq!(store.current_track_id(), Some("3"));
    }

    #[test]
    fn navigation_is_noop_for_single_track() {
        let mut store = PlaylistStore::seeded(numbered(1)).expect("seed");
        store.next();
        store.previous();
        assert_eq!(store.current_track_id(), Some("0"));
    }

    #[test]
    fn removing_only_track_clears_current() {
        let mut store = PlaylistStore::seeded(numbered(1)).expect("seed");
        store.remove_track("0").expect("remove");
        assert!(store.is_empty());
        assert_eq!(store.current_track_id(), None);
    }

    #[test]
    fn removing_current_selects_new_first() {
        let mut store = PlaylistStore::seeded(default_seed()).expect("seed");
        store.set_current_track("2").expect("select");
        store.remove_track("2").expect("remove");
        assert_eq!(store.current_track_id(), Some("1"));

        store.remove_track("1").expect("remove");
        assert_eq!(store.current_track_id(), Some("3"));
    }

    #[test]
    fn removing_other_track_keeps_current() {
        let mut store = PlaylistStore::seeded(default_seed()).expect("seed");
        store.set_current_track("3").expect("select");
        store.remove_track("1").expect("remove");
        assert_eq!(store.current_track_id(), Some("3"));
        assert_eq!(store.current_index(), Some(1));
    }

    #[test]
    fn removing_unknown_id_is_rejected_without_change() {
        let mut store = PlaylistStore::seeded(default_seed()).expect("seed");
        let err = store.remove_track("42").expect_err("missing");
        assert_eq!(err, PlaylistError::NotFound(String::from("42")));
        assert_eq!(store.len(), 3);
        assert_eq!(store.current_track_id(), Some("1"));
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let mut store = PlaylistStore::seeded(default_seed()).expect("seed");
        let err = store
            .add_track(Track::new("2", "other", "other", "x.mp3"))
            .expect_err("duplicate");
        assert_eq!(err, PlaylistError::DuplicateId(String::from("2")));
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn selecting_non_member_is_rejected() {
        let mut store = PlaylistStore::seeded(default_seed()).expect("seed");
        assert!(store.set_current_track("9").is_err());
        assert_eq!(store.current_track_id(), Some("1"));
    }

    #[test]
    fn first_added_track_becomes_current() {
        let mut store = PlaylistStore::new();
        assert_eq!(store.current_track_id(), None);
        store
            .add_track(Track::new("a", "a", "a", "a.mp3"))
            .expect("add");
        store
            .add_track(Track::new("b", "b", "b", "b.mp3"))
            .expect("add");
        assert_eq!(store.current_track_id(), Some("a"));
    }

    #[test]
    fn play_pause_ignored_when_empty() {
        let mut store = PlaylistStore::new();
        store.play_pause();
        assert!(!store.is_playing());
        assert_eq!(store.status, "Playlist is empty");
    }

    #[test]
    fn draft_requires_every_field() {
        let mut store = PlaylistStore::seeded(default_seed()).expect("seed");
        let err = store
            .add_draft(TrackDraft {
                title: String::from("Moanin"),
                artist: String::from("  "),
                source_url: String::from("/static/audio/Moanin.mp3"),
            })
            .expect_err("missing artist");
        assert_eq!(err, PlaylistError::MissingField("artist"));
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn drafts_get_unique_ids() {
        let mut store = PlaylistStore::new();
        let draft = TrackDraft {
            title: String::from("Moanin"),
            artist: String::from("Art Blakey"),
            source_url: String::from("/static/audio/Moanin.mp3"),
        };
        let first = store.add_draft(draft.clone()).expect("first");
        let second = store.add_draft(draft).expect("second");
        assert_ne!(first, second);
        assert_eq!(store.track(&second).map(|t| t.title.as_str()), Some("Moanin"));
    }

    #[test]
    fn subscribers_see_every_change() {
        let mut store = PlaylistStore::seeded(default_seed()).expect("seed");
        let events = store.subscribe();
        store.next();
        store.play_pause();
        store.remove_track("2").expect("remove");

        let seen: Vec<StoreEvent> = events.try_iter().collect();
        assert_eq!(
            seen,
            vec![
                StoreEvent::CurrentChanged(Some(String::from("2"))),
                StoreEvent::PlaybackChanged(true),
                StoreEvent::TrackRemoved(String::from("2")),
                StoreEvent::CurrentChanged(Some(String::from("1"))),
            ]
        );
    }

    #[test]
    fn dropped_subscribers_are_pruned() {
        let mut store = PlaylistStore::seeded(default_seed()).expect("seed");
        drop(store.subscribe());
        let live = store.subscribe();
        store.next();
        assert_eq!(store.subscribers.len(), 1);
        assert_eq!(live.try_iter().count(), 1);
    }

    proptest::proptest! {
        #[test]
        fn next_n_times_returns_to_start(len in 2usize..40, start in 0usize..40) {
            let mut store = PlaylistStore::seeded(numbered(len)).expect("seed");
            let start_id = format!("{}", start % len);
            store.set_current_track(&start_id).expect("select");
            for _ in 0..len {
                store.next();
            }
            prop_assert_eq!(store.current_track_id(), Some(start_id.as_str()));
        }

        #[test]
        fn previous_undoes_next(len in 2usize..40, start in 0usize..40) {
            let mut store = PlaylistStore::seeded(numbered(len)).expect("seed");
            let start_id = format!("{}", start % len);
            store.set_current_track(&start_id).expect("select");
            store.next();
            store.previous();
            prop_assert_eq!(store.current_track_id(), Some(start_id.as_str()));
        }

        #[test]
        fn double_toggle_restores_playback(len in 1usize..10, initially_playing: bool) {
            let mut store = PlaylistStore::seeded(numbered(len)).expect("seed");
            store.set_playing(initially_playing);
            store.play_pause();
            store.play_pause();
            prop_assert_eq!(store.is_playing(), initially_playing);
        }

        #[test]
        fn removing_current_selects_first_or_none(len in 1usize..20, pick in 0usize..20) {
            let mut store = PlaylistStore::seeded(numbered(len)).expect("seed");
            let id = format!("{}", pick % len);
            store.set_current_track(&id).expect("select");
            store.remove_track(&id).expect("remove");
            let expected = store.tracks().first().map(|track| track.id.clone());
            prop_assert_eq!(store.current_track_id().map(str::to_string), expected);
        }

        #[test]
        fn invariants_hold_after_random_ops(ops in proptest::collection::vec(0u8..7, 1..200)) {
            let mut store = PlaylistStore::seeded(numbered(5)).expect("seed");
            let mut next_id = 100usize;

            for op in ops {
                match op {
                    0 => store.next(),
                    1 => store.previous(),
                    2 => store.play_pause(),
                    3 => {
                        if let Some(id) = store.tracks().last().map(|t| t.id.clone()) {
                            let _ = store.remove_track(&id);
                        }
                    }
                    4 => {
                        if let Some(id) = store.current_track_id().map(str::to_string) {
                            let _ = store.remove_track(&id);
                        }
                    }
                    5 => {
                        next_id += 1;
                        let _ = store.add_track(Track::new(format!("{next_id}"), "t", "a", "u"));
                    }
                    _ => {
                        if let Some(id) = store.tracks().first().map(|t| t.id.clone()) {
                            let _ = store.set_current_track(&id);
                        }
                    }
                }

                prop_assert_eq!(store.current_track_id().is_none(), store.is_empty());
                if let Some(id) = store.current_track_id() {
                    prop_assert_eq!(store.track(id).map(|t| t.id.as_str()), Some(id));
                }
                let mut ids: Vec<&str> = store.tracks().iter().map(|t| t.id.as_str()).collect();
                ids.sort_unstable();
                ids.dedup();
                prop_assert_eq!(ids.len(), store.len());
            }
        }
    }
}
