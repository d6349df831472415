#![no_main]

use gesture_player::core::PlaylistStore;
use gesture_player::gesture::{Gesture, apply_gesture};
use gesture_player::model::Track;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let mut store = PlaylistStore::new();

    for (step, byte) in data.iter().enumerate() {
        let id = format!("{}", byte % 16);
        match byte % 7 {
            0 => {
                let _ = store.add_track(Track::new(id, "t", "a", "u.mp3"));
            }
            1 => {
                let _ = store.remove_track(&id);
            }
            2 => {
                let _ = store.set_current_track(&id);
            }
            3 => store.play_pause(),
            4 => store.next(),
            5 => store.previous(),
            _ => {
                let labels = ["wave_right", "wave_left", "fist", "none", "Close", "Next"];
                apply_gesture(&mut store, &Gesture::parse(labels[step % labels.len()]));
            }
        }

        assert_eq!(store.current_track_id().is_none(), store.is_empty());
        if let Some(current) = store.current_track_id() {
            assert!(store.track(current).is_some());
        }
    }
});
