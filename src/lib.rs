pub mod game;
pub mod utils;

use std::cell::RefCell;
use std::rc::Rc;

use gloo_timers::callback::Interval;
use gloo_timers::future::TimeoutFuture;
use serde_wasm_bindgen::{from_value, to_value};
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::spawn_local;
use web_sys::StorageEvent;

use game::storage;

pub use game::{
    Card, CardIndex, CardStatus, Command, Completion, Difficulty, GameEvent, GameState,
    IntegrityError, LocalStore, MatchEngine, MemoryStore, RuleError, RuleResolution, SavedCard,
    SavedGame, SharedStore, Stopwatch, Symbol, Theme,
};

#[cfg(feature = "wee_alloc")]
#[global_allocator]
static ALLOC: wee_alloc::WeeAlloc = wee_alloc::WeeAlloc::INIT;

/// Mismatched pairs flip back after this long.
const MISMATCH_HIDE_DELAY_MS: u32 = 1_000;
/// Period of the elapsed-time tick.
const TICK_PERIOD_MS: u32 = 1_000;

#[wasm_bindgen(start)]
pub fn start() {
    set_panic_hook();
}

fn to_js_error(error: RuleError) -> JsValue {
    to_value(&error).unwrap_or_else(|serialize_err| JsValue::from_str(&serialize_err.to_string()))
}

fn serde_to_js_error<E: std::fmt::Display>(error: E) -> JsValue {
    JsValue::from_str(&error.to_string())
}

/// One open tab/window of the game. The handle side owns the host wiring
/// (tick interval, deferred hide tasks, storage listener) while all game
/// semantics stay in `MatchEngine` + `GameState`.
struct Instance {
    state: GameState,
    engine: MatchEngine,
    store: LocalStore,
    ticker: Option<Interval>,
    sync_hook: Option<Closure<dyn FnMut(StorageEvent)>>,
    closed: bool,
}

/// Runs one command through the engine, reacts to the produced events
/// (scheduling, timer control), persists, and hands the resolution back.
fn dispatch(inner: &Rc<RefCell<Instance>>, command: Command) -> RuleResolution {
    let events = {
        let mut guard = inner.borrow_mut();
        let Instance { state, engine, .. } = &mut *guard;
        engine.apply(state, command)
    };
    react(inner, &events);
    let guard = inner.borrow();
    // Persist only when something happened. Saving on ignored commands would
    // echo sibling-instance storage notifications back as fresh writes and
    // the two tabs would ping-pong forever.
    if !events.is_empty() {
        storage::save(&guard.store, &guard.state);
    }
    RuleResolution::new(guard.state.clone(), events)
}

fn react(inner: &Rc<RefCell<Instance>>, events: &[GameEvent]) {
    for event in events {
        match event {
            GameEvent::TimerStarted => start_ticker(inner),
            GameEvent::PairMissed {
                first,
                second,
                generation,
            } => schedule_hide(inner, *generation, *first, *second),
            GameEvent::GameCompleted { .. } | GameEvent::BoardReset { .. } => {
                inner.borrow_mut().ticker = None;
            }
            _ => {}
        }
    }
}

fn start_ticker(inner: &Rc<RefCell<Instance>>) {
    let weak = Rc::downgrade(inner);
    let interval = Interval::new(TICK_PERIOD_MS, move || {
        if let Some(inner) = weak.upgrade() {
            dispatch(&inner, Command::Tick {
                now_ms: utils::now_ms(),
            });
        }
    });
    inner.borrow_mut().ticker = Some(interval);
}

/// One-shot deferred hide. The task holds only a weak handle and the
/// generation it was scheduled under; if the game is gone or was reset in
/// the meantime, the resolve is a no-op.
fn schedule_hide(inner: &Rc<RefCell<Instance>>, generation: u64, first: CardIndex, second: CardIndex) {
    let weak = Rc::downgrade(inner);
    spawn_local(async move {
        TimeoutFuture::new(MISMATCH_HIDE_DELAY_MS).await;
        if let Some(inner) = weak.upgrade() {
            dispatch(&inner, Command::DeferredResolve {
                generation,
                first,
                second,
            });
        }
    });
}

/// Game handle exposed to the presentation layer. Construction restores the
/// saved session (or starts fresh from the persisted preferences), registers
/// the instance and subscribes to sibling-instance counter updates; the
/// frontend then forwards clicks and selector changes and renders from the
/// returned resolutions.
#[wasm_bindgen]
pub struct PairsGame {
    inner: Rc<RefCell<Instance>>,
}

#[wasm_bindgen]
impl PairsGame {
    #[wasm_bindgen(constructor)]
    pub fn new() -> Result<PairsGame, JsValue> {
        let store = LocalStore;
        let mut engine = MatchEngine::new();
        let state = match storage::load(&store, utils::now_ms()) {
            Some(state) => state,
            None => {
                web_sys::console::log_1(&"wasm_pairs: no saved session, starting fresh".into());
                engine.new_game(storage::saved_difficulty(&store), storage::saved_theme(&store))
            }
        };
        storage::register_instance(&store);

        let inner = Rc::new(RefCell::new(Instance {
            state,
            engine,
            store,
            ticker: None,
            sync_hook: None,
            closed: false,
        }));
        let game = PairsGame { inner };
        game.attach_sync_listener()?;
        if game.inner.borrow().state.stopwatch.is_running() {
            start_ticker(&game.inner);
        }
        // A snapshot taken inside the mismatch window still shows the missed
        // pair with an empty selection; re-arm its hide so the two cards do
        // not stay face up forever.
        let pending = {
            let guard = game.inner.borrow();
            let state = &guard.state;
            let shown: Vec<CardIndex> = state
                .cards
                .iter()
                .enumerate()
                .filter(|(index, card)| {
                    card.status == CardStatus::Shown && !state.selection.contains(index)
                })
                .map(|(index, _)| index)
                .collect();
            match shown[..] {
                [first, second] => Some((state.generation, first, second)),
                _ => None,
            }
        };
        if let Some((generation, first, second)) = pending {
            schedule_hide(&game.inner, generation, first, second);
        }
        {
            let guard = game.inner.borrow();
            storage::save(&guard.store, &guard.state);
        }
        Ok(game)
    }

    /// Flips the card at `index`. Guarded flips (selection full, card
    /// already shown or matched) resolve to an empty event list.
    pub fn flip(&self, index: usize) -> Result<JsValue, JsValue> {
        let resolution = dispatch(&self.inner, Command::Flip {
            index,
            now_ms: utils::now_ms(),
        });
        to_value(&resolution).map_err(JsValue::from)
    }

    /// Starts a new game on a `grid`×`grid` board (2, 4 or 6).
    pub fn reset(&self, grid: u8) -> Result<JsValue, JsValue> {
        let difficulty = Difficulty::try_from(grid)
            .map_err(|error| to_js_error(RuleError::IntegrityViolation { error }))?;
        let resolution = dispatch(&self.inner, Command::Reset { difficulty });
        to_value(&resolution).map_err(JsValue::from)
    }

    /// Records the selected theme; unknown names fall back to the default.
    /// Applying the matching CSS class is the frontend's job.
    #[wasm_bindgen(js_name = "setTheme")]
    pub fn set_theme(&self, theme: &str) -> Result<JsValue, JsValue> {
        let theme = theme.parse::<Theme>().unwrap_or_default();
        let resolution = dispatch(&self.inner, Command::ThemeChange { theme });
        to_value(&resolution).map_err(JsValue::from)
    }

    /// Feeds a raw storage notification, for hosts that proxy the `storage`
    /// event themselves instead of relying on the built-in listener.
    #[wasm_bindgen(js_name = "syncExternal")]
    pub fn sync_external(&self, key: &str, value: Option<String>) -> Result<JsValue, JsValue> {
        let resolution = dispatch(&self.inner, Command::ExternalSync {
            key: key.to_owned(),
            value,
        });
        to_value(&resolution).map_err(JsValue::from)
    }

    pub fn snapshot(&self) -> Result<JsValue, JsValue> {
        to_value(&self.inner.borrow().state).map_err(JsValue::from)
    }

    #[wasm_bindgen(js_name = "stateJson")]
    pub fn state_json(&self) -> Result<String, JsValue> {
        serde_json::to_string(&self.inner.borrow().state).map_err(serde_to_js_error)
    }

    pub fn moves(&self) -> u32 {
        self.inner.borrow().state.moves
    }

    #[wasm_bindgen(js_name = "totalMoves")]
    pub fn total_moves(&self) -> u32 {
        self.inner.borrow().state.total_moves
    }

    #[wasm_bindgen(js_name = "elapsedSecs")]
    pub fn elapsed_secs(&self) -> u32 {
        self.inner.borrow().state.stopwatch.elapsed_secs()
    }

    #[wasm_bindgen(js_name = "isComplete")]
    pub fn is_complete(&self) -> bool {
        self.inner.borrow().state.outcome.is_some()
    }

    /// Call from `beforeunload`/`pagehide`. Stops the timers, detaches the
    /// storage listener and unregisters the instance; the last instance out
    /// clears the shared counters. Idempotent.
    pub fn close(&self) {
        let mut guard = self.inner.borrow_mut();
        if guard.closed {
            return;
        }
        guard.closed = true;
        guard.ticker = None;
        if let Some(hook) = guard.sync_hook.take() {
            if let Some(window) = web_sys::window() {
                let _ = window.remove_event_listener_with_callback(
                    "storage",
                    hook.as_ref().unchecked_ref(),
                );
            }
        }
        storage::release_instance(&guard.store);
    }

    fn attach_sync_listener(&self) -> Result<(), JsValue> {
        let window = match web_sys::window() {
            Some(window) => window,
            // Headless host; `syncExternal` still works.
            None => return Ok(()),
        };
        let weak = Rc::downgrade(&self.inner);
        let hook = Closure::<dyn FnMut(StorageEvent)>::new(move |event: StorageEvent| {
            let key = match event.key() {
                Some(key) => key,
                None => return,
            };
            if let Some(inner) = weak.upgrade() {
                dispatch(&inner, Command::ExternalSync {
                    key,
                    value: event.new_value(),
                });
            }
        });
        window.add_event_listener_with_callback("storage", hook.as_ref().unchecked_ref())?;
        self.inner.borrow_mut().sync_hook = Some(hook);
        Ok(())
    }
}

/// Builds a fresh shuffled state without persisting anything.
#[wasm_bindgen(js_name = "createGameState")]
pub fn create_game_state(grid: u8) -> Result<JsValue, JsValue> {
    let difficulty = Difficulty::try_from(grid)
        .map_err(|error| to_js_error(RuleError::IntegrityViolation { error }))?;
    let mut engine = MatchEngine::new();
    let state = engine.new_game(difficulty, Theme::default());
    to_value(&state).map_err(JsValue::from)
}

#[wasm_bindgen(js_name = "validateState")]
pub fn validate_state(state: JsValue) -> Result<(), JsValue> {
    let state: GameState = from_value(state).map_err(JsValue::from)?;
    state
        .integrity_check()
        .map_err(|error| to_js_error(RuleError::IntegrityViolation { error }))?;
    Ok(())
}

/// Pure transition for hosts that keep the state on the JS side: applies one
/// command to the passed state and returns the resolution.
#[wasm_bindgen(js_name = "applyCommand")]
pub fn apply_command(state: JsValue, command: JsValue) -> Result<JsValue, JsValue> {
    let mut state: GameState = from_value(state).map_err(JsValue::from)?;
    let command: Command = from_value(command).map_err(JsValue::from)?;
    let mut engine = MatchEngine::new();
    let events = engine.apply(&mut state, command);
    to_value(&RuleResolution::new(state, events)).map_err(JsValue::from)
}

#[cfg(feature = "console_error_panic_hook")]
fn set_panic_hook() {
    console_error_panic_hook::set_once();
}

#[cfg(not(feature = "console_error_panic_hook"))]
fn set_panic_hook() {}
