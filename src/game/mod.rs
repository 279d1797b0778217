//! Core game logic: board state, match rules, timing, persistence and
//! cross-instance sync.

pub mod deck;
pub mod rules;
pub mod state;
pub mod storage;
pub mod timer;

pub use state::{
    Card,
    CardIndex,
    CardStatus,
    Completion,
    Difficulty,
    GameEvent,
    GameState,
    IntegrityError,
    Symbol,
    Theme,
};
pub use storage::{
    keys,
    LocalStore,
    MemoryStore,
    SavedCard,
    SavedGame,
    SharedStore,
};
pub use rules::{Command, MatchEngine, RuleError, RuleResolution};
pub use timer::Stopwatch;
