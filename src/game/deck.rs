use rand::seq::SliceRandom;
use rand::Rng;

use super::state::{Difficulty, Symbol};

/// Symbols are consecutive characters starting here, one per pair; a 6×6
/// board uses 'A' through 'R'.
const FIRST_SYMBOL: u8 = b'A';

fn symbol_for(pair: usize) -> Symbol {
    (FIRST_SYMBOL + pair as u8) as char
}

/// Builds the unshuffled deck for `difficulty`: all first occurrences, then
/// all duplicates. Callers shuffle before dealing.
pub fn build(difficulty: Difficulty) -> Vec<Symbol> {
    let singles: Vec<Symbol> = (0..difficulty.pair_count()).map(symbol_for).collect();
    let mut deck = Vec::with_capacity(singles.len() * 2);
    deck.extend(&singles);
    deck.extend(&singles);
    deck
}

/// Uniform in-place permutation. The observable contract is only "some
/// permutation of the input multiset".
pub fn shuffle<R: Rng>(deck: &mut [Symbol], rng: &mut R) {
    deck.shuffle(rng);
}

pub fn shuffled<R: Rng>(difficulty: Difficulty, rng: &mut R) -> Vec<Symbol> {
    let mut deck = build(difficulty);
    shuffle(&mut deck, rng);
    deck
}
