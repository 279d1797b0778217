use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::timer::Stopwatch;

/// Position of a card in the board sequence. Card identity is positional,
/// never by symbol: every symbol appears on exactly two cards.
pub type CardIndex = usize;
/// Face value painted on a pair of cards.
pub type Symbol = char;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CardStatus {
    Hidden,
    Shown,
    Matched,
}

impl Default for CardStatus {
    fn default() -> Self {
        CardStatus::Hidden
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Card {
    pub value: Symbol,
    #[serde(default)]
    pub status: CardStatus,
}

impl Card {
    pub fn hidden(value: Symbol) -> Self {
        Self {
            value,
            status: CardStatus::Hidden,
        }
    }

    pub fn is_matched(&self) -> bool {
        self.status == CardStatus::Matched
    }

    /// Rendered face: the symbol while shown or matched, blank while hidden.
    pub fn face_text(&self) -> String {
        match self.status {
            CardStatus::Hidden => String::new(),
            CardStatus::Shown | CardStatus::Matched => self.value.to_string(),
        }
    }
}

/// Board edge length. Serializes as the numeric grid size (2, 4 or 6) the
/// presentation layer's difficulty selector works in.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(try_from = "u8", into = "u8")]
pub enum Difficulty {
    #[default]
    Easy,
    Normal,
    Hard,
}

impl Difficulty {
    pub fn grid(self) -> u8 {
        match self {
            Difficulty::Easy => 2,
            Difficulty::Normal => 4,
            Difficulty::Hard => 6,
        }
    }

    pub fn card_count(self) -> usize {
        let grid = self.grid() as usize;
        grid * grid
    }

    pub fn pair_count(self) -> usize {
        self.card_count() / 2
    }
}

impl TryFrom<u8> for Difficulty {
    type Error = IntegrityError;

    fn try_from(grid: u8) -> Result<Self, Self::Error> {
        match grid {
            2 => Ok(Difficulty::Easy),
            4 => Ok(Difficulty::Normal),
            6 => Ok(Difficulty::Hard),
            _ => Err(IntegrityError::UnsupportedDifficulty { grid }),
        }
    }
}

impl From<Difficulty> for u8 {
    fn from(difficulty: Difficulty) -> Self {
        difficulty.grid()
    }
}

/// Color theme the presentation layer applies. `Black` doubles as the
/// fallback for an empty or unknown selector value.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    Blue,
    Green,
    #[default]
    Black,
}

impl Theme {
    pub fn as_str(self) -> &'static str {
        match self {
            Theme::Blue => "blue",
            Theme::Green => "green",
            Theme::Black => "black",
        }
    }
}

impl FromStr for Theme {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "blue" => Ok(Theme::Blue),
            "green" => Ok(Theme::Green),
            "black" => Ok(Theme::Black),
            other => Err(format!("unknown theme: {other}")),
        }
    }
}

/// Final tally of a completed session.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Completion {
    pub moves: u32,
    pub elapsed_secs: u32,
}

/// Everything the presentation layer reacts to. Returned per command so the
/// host can render, persist and schedule without diffing the state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum GameEvent {
    TimerStarted,
    CardRevealed {
        index: CardIndex,
        value: Symbol,
    },
    PairMatched {
        first: CardIndex,
        second: CardIndex,
    },
    /// The two cards stay shown until the deferred hide fires; `generation`
    /// lets the scheduled task detect that a reset superseded the board.
    PairMissed {
        first: CardIndex,
        second: CardIndex,
        generation: u64,
    },
    MovesRecorded {
        moves: u32,
        total_moves: u32,
    },
    CardsHidden {
        first: CardIndex,
        second: CardIndex,
    },
    TimerTicked {
        minutes: u32,
        seconds: u32,
    },
    GameCompleted {
        moves: u32,
        elapsed_secs: u32,
    },
    BoardReset {
        difficulty: Difficulty,
    },
    ThemeChanged {
        theme: Theme,
    },
    CountersSynced {
        moves: u32,
        total_moves: u32,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum IntegrityError {
    UnsupportedDifficulty { grid: u8 },
    WrongBoardSize { expected: usize, actual: usize },
    UnbalancedSymbol { value: Symbol, count: usize },
    TooManyShown { count: usize },
    SelectionOverflow { count: usize },
    SelectionOutOfBounds { index: CardIndex },
    SelectionNotShown { index: CardIndex },
}

impl fmt::Display for IntegrityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IntegrityError::UnsupportedDifficulty { grid } => {
                write!(f, "unsupported grid size: {grid}")
            }
            IntegrityError::WrongBoardSize { expected, actual } => {
                write!(f, "expected {expected} cards, found {actual}")
            }
            IntegrityError::UnbalancedSymbol { value, count } => {
                write!(f, "symbol {value} appears {count} times instead of 2")
            }
            IntegrityError::TooManyShown { count } => {
                write!(f, "{count} cards shown at once")
            }
            IntegrityError::SelectionOverflow { count } => {
                write!(f, "selection holds {count} cards")
            }
            IntegrityError::SelectionOutOfBounds { index } => {
                write!(f, "selection references card {index} outside the board")
            }
            IntegrityError::SelectionNotShown { index } => {
                write!(f, "selected card {index} is not shown")
            }
        }
    }
}

/// Full state of one game instance. A session runs from reset to completion
/// or abandonment; `total_moves` outlives sessions and is shared across
/// sibling instances through the durable store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GameState {
    pub difficulty: Difficulty,
    #[serde(default)]
    pub theme: Theme,
    #[serde(default)]
    pub cards: Vec<Card>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub selection: Vec<CardIndex>,
    #[serde(default)]
    pub moves: u32,
    #[serde(default)]
    pub total_moves: u32,
    /// Bumped on every reset so deferred work scheduled against an older
    /// board recognizes itself as stale.
    #[serde(default)]
    pub generation: u64,
    #[serde(default)]
    pub stopwatch: Stopwatch,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<Completion>,
}

impl GameState {
    pub fn new(difficulty: Difficulty, theme: Theme, cards: Vec<Card>) -> Self {
        Self {
            difficulty,
            theme,
            cards,
            selection: Vec::new(),
            moves: 0,
            total_moves: 0,
            generation: 0,
            stopwatch: Stopwatch::default(),
            outcome: None,
        }
    }

    pub fn card(&self, index: CardIndex) -> Option<&Card> {
        self.cards.get(index)
    }

    pub fn shown_count(&self) -> usize {
        self.cards
            .iter()
            .filter(|card| card.status == CardStatus::Shown)
            .count()
    }

    pub fn matched_count(&self) -> usize {
        self.cards.iter().filter(|card| card.is_matched()).count()
    }

    pub fn is_won(&self) -> bool {
        !self.cards.is_empty() && self.cards.iter().all(Card::is_matched)
    }

    pub fn integrity_check(&self) -> Result<(), IntegrityError> {
        let expected = self.difficulty.card_count();
        if self.cards.len() != expected {
            return Err(IntegrityError::WrongBoardSize {
                expected,
                actual: self.cards.len(),
            });
        }

        let mut counts: HashMap<Symbol, usize> = HashMap::new();
        for card in &self.cards {
            *counts.entry(card.value).or_insert(0) += 1;
        }
        for (value, count) in counts {
            if count != 2 {
                return Err(IntegrityError::UnbalancedSymbol { value, count });
            }
        }

        let shown = self.shown_count();
        if shown > 2 {
            return Err(IntegrityError::TooManyShown { count: shown });
        }

        if self.selection.len() > 2 {
            return Err(IntegrityError::SelectionOverflow {
                count: self.selection.len(),
            });
        }
        for &index in &self.selection {
            match self.cards.get(index) {
                None => return Err(IntegrityError::SelectionOutOfBounds { index }),
                Some(card) if card.status != CardStatus::Shown => {
                    return Err(IntegrityError::SelectionNotShown { index });
                }
                Some(_) => {}
            }
        }

        Ok(())
    }

    /// Deterministic 2×2 board, unshuffled. Handy for frontend debugging and
    /// tests.
    pub fn sample() -> Self {
        let cards = ['A', 'B', 'A', 'B'].into_iter().map(Card::hidden).collect();
        Self::new(Difficulty::Easy, Theme::default(), cards)
    }
}
