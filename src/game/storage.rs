use std::cell::RefCell;
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::state::{Card, CardStatus, Difficulty, GameState, Symbol, Theme};

/// Durable key-value entries. The snapshot is session-scoped; the counter
/// and instance keys are shared with every sibling instance of the same
/// origin, which sees our writes through the host's change notifications.
pub mod keys {
    pub const GAME_STATE: &str = "gameState";
    pub const MOVES: &str = "moves";
    pub const TOTAL_MOVES: &str = "totalMoves";
    pub const INSTANCE_COUNT: &str = "instanceCount";
    pub const SELECTED_THEME: &str = "selectedTheme";
    pub const SELECTED_DIFFICULTY: &str = "selectedDifficulty";
}

/// Injected durable store: localStorage in the browser, an in-memory map in
/// tests. Shared counters ride on the same interface, so nothing in the core
/// reaches for ambient globals.
pub trait SharedStore {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str);
    fn remove(&self, key: &str);
}

/// Browser-backed store. Every operation degrades to a no-op when
/// localStorage is unavailable (sandboxed frame, storage disabled).
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalStore;

impl LocalStore {
    fn backing() -> Option<web_sys::Storage> {
        web_sys::window()?.local_storage().ok().flatten()
    }
}

impl SharedStore for LocalStore {
    fn get(&self, key: &str) -> Option<String> {
        Self::backing()?.get_item(key).ok().flatten()
    }

    fn set(&self, key: &str, value: &str) {
        if let Some(storage) = Self::backing() {
            let _ = storage.set_item(key, value);
        }
    }

    fn remove(&self, key: &str) {
        if let Some(storage) = Self::backing() {
            let _ = storage.remove_item(key);
        }
    }
}

/// In-memory store for tests and native hosts. A single instance stands in
/// for the origin-wide storage that sibling game instances share.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RefCell<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SharedStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.borrow().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) {
        self.entries
            .borrow_mut()
            .insert(key.to_owned(), value.to_owned());
    }

    fn remove(&self, key: &str) {
        self.entries.borrow_mut().remove(key);
    }
}

/// Wire shape of one card in the snapshot; `text` is the rendered face at
/// save time, blank while hidden.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SavedCard {
    pub value: Symbol,
    pub status: CardStatus,
    #[serde(default)]
    pub text: String,
}

/// Snapshot written under `keys::GAME_STATE`. The selection is stored as
/// card indices: identity is positional, and indices make the reload
/// round-trip exact.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SavedGame {
    pub difficulty: u8,
    pub elapsed_time: u32,
    pub cards: Vec<SavedCard>,
    #[serde(default)]
    pub selection: Vec<usize>,
}

impl SavedGame {
    pub fn capture(state: &GameState) -> Self {
        Self {
            difficulty: state.difficulty.grid(),
            elapsed_time: state.stopwatch.elapsed_secs(),
            cards: state
                .cards
                .iter()
                .map(|card| SavedCard {
                    value: card.value,
                    status: card.status,
                    text: card.face_text(),
                })
                .collect(),
            selection: state.selection.clone(),
        }
    }

    /// Rebuilds a state from the snapshot, or `None` when it is structurally
    /// invalid so the caller starts a fresh game instead. A session that had
    /// already started gets its stopwatch resumed from the saved elapsed
    /// time.
    pub fn restore(&self, theme: Theme, now_ms: f64) -> Option<GameState> {
        if self.cards.is_empty() {
            return None;
        }
        let difficulty = Difficulty::try_from(self.difficulty).ok()?;
        let cards: Vec<Card> = self
            .cards
            .iter()
            .map(|saved| Card {
                value: saved.value,
                status: saved.status,
            })
            .collect();

        let mut state = GameState::new(difficulty, theme, cards);
        state.selection = self.selection.clone();
        if state.integrity_check().is_err() {
            return None;
        }

        let started = self.elapsed_time > 0
            || state.cards.iter().any(|card| card.status != CardStatus::Hidden);
        if started {
            state.stopwatch.resume(self.elapsed_time, now_ms);
        }
        Some(state)
    }
}

/// Persists everything a reload needs: the session snapshot, the shared
/// counters, and the user preferences. A completed session removes its
/// snapshot instead of rewriting it.
pub fn save<S: SharedStore>(store: &S, state: &GameState) {
    if state.outcome.is_some() {
        store.remove(keys::GAME_STATE);
    } else if let Ok(json) = serde_json::to_string(&SavedGame::capture(state)) {
        store.set(keys::GAME_STATE, &json);
    }
    store.set(keys::MOVES, &state.moves.to_string());
    store.set(keys::TOTAL_MOVES, &state.total_moves.to_string());
    store.set(keys::SELECTED_THEME, state.theme.as_str());
    store.set(
        keys::SELECTED_DIFFICULTY,
        &state.difficulty.grid().to_string(),
    );
}

/// Reads back the saved session, counters included. `None` (missing or
/// malformed snapshot) means "start fresh", never a fatal error.
pub fn load<S: SharedStore>(store: &S, now_ms: f64) -> Option<GameState> {
    let raw = store.get(keys::GAME_STATE)?;
    let snapshot: SavedGame = serde_json::from_str(&raw).ok()?;
    let mut state = snapshot.restore(saved_theme(store), now_ms)?;
    state.moves = read_counter(store, keys::MOVES);
    state.total_moves = read_counter(store, keys::TOTAL_MOVES);
    Some(state)
}

pub fn clear_session<S: SharedStore>(store: &S) {
    store.remove(keys::GAME_STATE);
}

pub fn saved_theme<S: SharedStore>(store: &S) -> Theme {
    store
        .get(keys::SELECTED_THEME)
        .and_then(|raw| raw.parse().ok())
        .unwrap_or_default()
}

pub fn saved_difficulty<S: SharedStore>(store: &S) -> Difficulty {
    store
        .get(keys::SELECTED_DIFFICULTY)
        .and_then(|raw| raw.trim().parse::<u8>().ok())
        .and_then(|grid| Difficulty::try_from(grid).ok())
        .unwrap_or_default()
}

fn read_counter<S: SharedStore>(store: &S, key: &str) -> u32 {
    store
        .get(key)
        .and_then(|raw| raw.trim().parse().ok())
        .unwrap_or(0)
}

/// Registers one more live instance; returns the new count.
pub fn register_instance<S: SharedStore>(store: &S) -> u32 {
    let count = read_counter(store, keys::INSTANCE_COUNT) + 1;
    store.set(keys::INSTANCE_COUNT, &count.to_string());
    count
}

/// Unregisters a closing instance. The last one out wipes the shared move
/// counters; session snapshots are left alone so an abandoned game can
/// resume on the next visit.
pub fn release_instance<S: SharedStore>(store: &S) -> u32 {
    let count = read_counter(store, keys::INSTANCE_COUNT).saturating_sub(1);
    store.set(keys::INSTANCE_COUNT, &count.to_string());
    if count == 0 {
        store.remove(keys::MOVES);
        store.remove(keys::TOTAL_MOVES);
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::rules::MatchEngine;

    const NOW: f64 = 50_000.0;

    fn played_state() -> GameState {
        let mut engine = MatchEngine::with_seed(21);
        let mut state = engine.new_game(Difficulty::Normal, Theme::Green);
        let partner = state
            .cards
            .iter()
            .position(|card| card.value != state.cards[0].value)
            .expect("a different symbol should exist");
        MatchEngine::flip(&mut state, 0, NOW);
        MatchEngine::flip(&mut state, partner, NOW);
        state
    }

    #[test]
    fn round_trip_reconstructs_the_session() {
        let store = MemoryStore::new();
        let state = played_state();
        save(&store, &state);

        let restored = load(&store, NOW + 4_000.0).expect("snapshot should load");
        assert_eq!(restored.difficulty, state.difficulty);
        assert_eq!(restored.theme, state.theme);
        assert_eq!(restored.cards, state.cards);
        assert_eq!(restored.selection, state.selection);
        assert_eq!(restored.moves, state.moves);
        assert_eq!(restored.total_moves, state.total_moves);
        assert_eq!(
            restored.stopwatch.elapsed_secs(),
            state.stopwatch.elapsed_secs()
        );
        assert!(restored.stopwatch.is_running(), "a started session resumes");
    }

    #[test]
    fn snapshot_carries_the_documented_wire_shape() {
        let state = played_state();
        let json = serde_json::to_string(&SavedGame::capture(&state)).expect("serializes");
        assert!(json.contains("\"difficulty\":4"));
        assert!(json.contains("\"elapsedTime\""));
        assert!(json.contains("\"status\":\"shown\""));
        assert!(json.contains("\"text\":\"\""));
    }

    #[test]
    fn untouched_board_restores_with_a_stopped_timer() {
        let store = MemoryStore::new();
        let mut engine = MatchEngine::with_seed(2);
        let state = engine.new_game(Difficulty::Easy, Theme::Black);
        save(&store, &state);

        let restored = load(&store, NOW).expect("snapshot should load");
        assert!(!restored.stopwatch.is_running());
        assert_eq!(restored.stopwatch.elapsed_secs(), 0);
    }

    #[test]
    fn missing_or_malformed_snapshots_load_as_none() {
        let store = MemoryStore::new();
        assert!(load(&store, NOW).is_none(), "empty store");

        store.set(keys::GAME_STATE, "not json");
        assert!(load(&store, NOW).is_none(), "garbage payload");

        store.set(
            keys::GAME_STATE,
            r#"{"difficulty":4,"elapsedTime":3,"cards":[],"selection":[]}"#,
        );
        assert!(load(&store, NOW).is_none(), "empty card sequence");

        store.set(
            keys::GAME_STATE,
            r#"{"difficulty":3,"elapsedTime":0,"cards":[{"value":"A","status":"hidden","text":""}],"selection":[]}"#,
        );
        assert!(load(&store, NOW).is_none(), "unsupported difficulty");
    }

    #[test]
    fn structurally_inconsistent_snapshots_are_rejected() {
        let snapshot = SavedGame {
            difficulty: 2,
            elapsed_time: 0,
            cards: ['A', 'B', 'A', 'B']
                .into_iter()
                .map(|value| SavedCard {
                    value,
                    status: CardStatus::Hidden,
                    text: String::new(),
                })
                .collect(),
            selection: vec![9],
        };
        assert!(
            snapshot.restore(Theme::Black, NOW).is_none(),
            "selection outside the board"
        );
    }

    #[test]
    fn completed_session_save_drops_the_snapshot() {
        let store = MemoryStore::new();
        let state = played_state();
        save(&store, &state);
        assert!(store.get(keys::GAME_STATE).is_some());

        let mut done = state;
        for card in &mut done.cards {
            card.status = CardStatus::Matched;
        }
        done.selection.clear();
        done.outcome = Some(crate::game::state::Completion {
            moves: done.moves,
            elapsed_secs: 12,
        });
        save(&store, &done);

        assert!(store.get(keys::GAME_STATE).is_none());
        assert_eq!(store.get(keys::MOVES).as_deref(), Some("1"));
    }

    #[test]
    fn preferences_round_trip() {
        let store = MemoryStore::new();
        let state = played_state();
        save(&store, &state);
        assert_eq!(saved_theme(&store), Theme::Green);
        assert_eq!(saved_difficulty(&store), Difficulty::Normal);

        let empty = MemoryStore::new();
        assert_eq!(saved_theme(&empty), Theme::Black);
        assert_eq!(saved_difficulty(&empty), Difficulty::Easy);
    }

    #[test]
    fn last_instance_out_clears_the_shared_counters() {
        let store = MemoryStore::new();
        let state = played_state();
        save(&store, &state);

        assert_eq!(register_instance(&store), 1);
        assert_eq!(register_instance(&store), 2);

        assert_eq!(release_instance(&store), 1);
        assert_eq!(
            store.get(keys::MOVES).as_deref(),
            Some("1"),
            "counters survive while an instance is still open"
        );

        assert_eq!(release_instance(&store), 0);
        assert!(store.get(keys::MOVES).is_none());
        assert!(store.get(keys::TOTAL_MOVES).is_none());
        assert!(
            store.get(keys::GAME_STATE).is_some(),
            "session snapshots are not wiped on close"
        );
    }

    #[test]
    fn release_never_underflows() {
        let store = MemoryStore::new();
        assert_eq!(release_instance(&store), 0);
        assert_eq!(release_instance(&store), 0);
    }
}
