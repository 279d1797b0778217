use rand::rngs::SmallRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use super::{
    deck,
    state::{
        Card, CardIndex, CardStatus, Completion, Difficulty, GameEvent, GameState, IntegrityError,
        Theme,
    },
    storage::keys,
};

/// The closed set of inputs one instance processes, one at a time. User
/// clicks, timer ticks, deferred hides and sibling-instance notifications
/// all funnel through here, so the state machine never sees concurrent
/// mutation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum Command {
    Flip {
        index: CardIndex,
        now_ms: f64,
    },
    Reset {
        difficulty: Difficulty,
    },
    Tick {
        now_ms: f64,
    },
    DeferredResolve {
        generation: u64,
        first: CardIndex,
        second: CardIndex,
    },
    ThemeChange {
        theme: Theme,
    },
    ExternalSync {
        key: String,
        value: Option<String>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum RuleError {
    IntegrityViolation { error: IntegrityError },
}

impl From<IntegrityError> for RuleError {
    fn from(error: IntegrityError) -> Self {
        RuleError::IntegrityViolation { error }
    }
}

/// State plus the events one command produced, handed back to the caller in
/// one piece for rendering.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RuleResolution {
    pub state: GameState,
    pub events: Vec<GameEvent>,
}

impl RuleResolution {
    pub fn new(state: GameState, events: Vec<GameEvent>) -> Self {
        Self { state, events }
    }
}

/// Match-resolution state machine. Holds only the deck RNG; all game state
/// lives in the `GameState` each call mutates.
pub struct MatchEngine {
    rng: SmallRng,
}

impl Default for MatchEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl MatchEngine {
    pub fn new() -> Self {
        Self {
            rng: SmallRng::from_entropy(),
        }
    }

    /// Deterministic boards for tests.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: SmallRng::seed_from_u64(seed),
        }
    }

    /// Builds a fresh, shuffled state without touching any existing one.
    pub fn new_game(&mut self, difficulty: Difficulty, theme: Theme) -> GameState {
        let cards = deck::shuffled(difficulty, &mut self.rng)
            .into_iter()
            .map(Card::hidden)
            .collect();
        GameState::new(difficulty, theme, cards)
    }

    pub fn apply(&mut self, state: &mut GameState, command: Command) -> Vec<GameEvent> {
        match command {
            Command::Flip { index, now_ms } => Self::flip(state, index, now_ms),
            Command::Reset { difficulty } => self.reset(state, difficulty),
            Command::Tick { now_ms } => Self::tick(state, now_ms),
            Command::DeferredResolve {
                generation,
                first,
                second,
            } => Self::resolve_deferred(state, generation, first, second),
            Command::ThemeChange { theme } => Self::set_theme(state, theme),
            Command::ExternalSync { key, value } => {
                Self::sync_external(state, &key, value.as_deref())
            }
        }
    }

    /// Reveals the card at `index`. Guarded flips are silent no-ops, not
    /// errors: a full selection, an out-of-range index, or a card that is
    /// already shown or matched all resolve to an empty event list.
    pub fn flip(state: &mut GameState, index: CardIndex, now_ms: f64) -> Vec<GameEvent> {
        if state.outcome.is_some() || state.selection.len() >= 2 {
            return Vec::new();
        }
        let value = match state.card(index) {
            Some(card) if card.status == CardStatus::Hidden => card.value,
            _ => return Vec::new(),
        };

        let mut events = Vec::new();
        if !state.stopwatch.is_running() {
            state.stopwatch.start(now_ms);
            events.push(GameEvent::TimerStarted);
        }

        state.cards[index].status = CardStatus::Shown;
        state.selection.push(index);
        events.push(GameEvent::CardRevealed { index, value });

        if state.selection.len() == 2 {
            events.extend(Self::evaluate(state, now_ms));
        }
        events
    }

    /// Pair evaluation. The selection clears immediately either way; a
    /// mismatch leaves both cards shown and announces the deferred hide via
    /// `PairMissed`.
    fn evaluate(state: &mut GameState, now_ms: f64) -> Vec<GameEvent> {
        let (first, second) = (state.selection[0], state.selection[1]);
        state.selection.clear();

        let mut events = Vec::new();
        if state.cards[first].value == state.cards[second].value {
            state.cards[first].status = CardStatus::Matched;
            state.cards[second].status = CardStatus::Matched;
            events.push(GameEvent::PairMatched { first, second });
        } else {
            events.push(GameEvent::PairMissed {
                first,
                second,
                generation: state.generation,
            });
        }

        state.moves += 1;
        state.total_moves += 1;
        events.push(GameEvent::MovesRecorded {
            moves: state.moves,
            total_moves: state.total_moves,
        });

        if state.is_won() {
            state.stopwatch.freeze(now_ms);
            let completion = Completion {
                moves: state.moves,
                elapsed_secs: state.stopwatch.elapsed_secs(),
            };
            state.outcome = Some(completion);
            events.push(GameEvent::GameCompleted {
                moves: completion.moves,
                elapsed_secs: completion.elapsed_secs,
            });
        }
        events
    }

    /// Deferred mismatch hide. Work scheduled against a superseded board
    /// (older generation, cards gone, no longer shown) drops silently.
    pub fn resolve_deferred(
        state: &mut GameState,
        generation: u64,
        first: CardIndex,
        second: CardIndex,
    ) -> Vec<GameEvent> {
        if generation != state.generation {
            return Vec::new();
        }
        let shown = |state: &GameState, index: CardIndex| {
            matches!(state.card(index), Some(card) if card.status == CardStatus::Shown)
        };
        if !shown(state, first) || !shown(state, second) {
            return Vec::new();
        }
        state.cards[first].status = CardStatus::Hidden;
        state.cards[second].status = CardStatus::Hidden;
        vec![GameEvent::CardsHidden { first, second }]
    }

    /// Starts a new session: fresh shuffled board, zeroed session moves,
    /// cleared timer. The cumulative counter and theme carry over, and the
    /// generation bump orphans any pending deferred hide.
    pub fn reset(&mut self, state: &mut GameState, difficulty: Difficulty) -> Vec<GameEvent> {
        let mut fresh = self.new_game(difficulty, state.theme);
        fresh.generation = state.generation + 1;
        fresh.total_moves = state.total_moves;
        *state = fresh;
        vec![GameEvent::BoardReset { difficulty }]
    }

    pub fn tick(state: &mut GameState, now_ms: f64) -> Vec<GameEvent> {
        if !state.stopwatch.is_running() {
            return Vec::new();
        }
        state.stopwatch.tick(now_ms);
        vec![GameEvent::TimerTicked {
            minutes: state.stopwatch.minutes(),
            seconds: state.stopwatch.seconds(),
        }]
    }

    pub fn set_theme(state: &mut GameState, theme: Theme) -> Vec<GameEvent> {
        state.theme = theme;
        vec![GameEvent::ThemeChanged { theme }]
    }

    /// Last-writer-wins counter reconciliation from a sibling instance.
    /// Unrecognized keys and unparsable payloads are ignored.
    pub fn sync_external(
        state: &mut GameState,
        key: &str,
        value: Option<&str>,
    ) -> Vec<GameEvent> {
        let count = match value.and_then(|raw| raw.trim().parse::<u32>().ok()) {
            Some(count) => count,
            None => return Vec::new(),
        };
        match key {
            keys::MOVES => state.moves = count,
            keys::TOTAL_MOVES => state.total_moves = count,
            _ => return Vec::new(),
        }
        vec![GameEvent::CountersSynced {
            moves: state.moves,
            total_moves: state.total_moves,
        }]
    }
}
