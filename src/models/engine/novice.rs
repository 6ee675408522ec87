//! Novice backend: a beginner that grabs material only some of the time.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use shakmaty::{Chess, Position};

use crate::models::engine::rules::{Rules, material, to_record};

/// Chance that a capture is preferred over a random move
const GREED: f64 = 0.6;

#[derive(Debug)]
pub struct NoviceEngine {
    pub(crate) rules: Rules,
    rng: StdRng,
}

impl NoviceEngine {
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            rules: Rules::new(),
            rng,
        }
    }

    /// Seed for one search, drawn from this engine's generator so a seeded
    /// engine replays the same game
    pub(crate) fn next_seed(&mut self) -> u64 {
        self.rng.r#gen()
    }
}

/// Pick a move: with probability `GREED` the one-ply move that leaves the
/// best material balance, otherwise any legal move.
pub fn pick_move(pos: &Chess, seed: u64) -> Option<String> {
    let mut rng = StdRng::seed_from_u64(seed);
    let moves: Vec<_> = pos.legal_moves().iter().cloned().collect();
    if moves.is_empty() {
        return None;
    }

    let chosen = if rng.gen_bool(GREED) {
        moves
            .iter()
            .filter_map(|m| {
                let child = pos.clone().play(m.clone()).ok()?;
                Some((-material(&child), m))
            })
            .max_by_key(|(score, _)| *score)
            .map(|(_, m)| m)
    } else {
        moves.choose(&mut rng)
    };

    chosen.and_then(to_record).map(|record| record.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pick_move_is_legal() {
        let rules = Rules::new();
        for seed in 0..20 {
            let text = pick_move(rules.position(), seed).unwrap();
            assert!(rules.resolve(&text).is_ok(), "illegal novice move {}", text);
        }
    }

    #[test]
    fn test_same_seed_same_move() {
        let rules = Rules::new();
        assert_eq!(pick_move(rules.position(), 7), pick_move(rules.position(), 7));
    }

    #[test]
    fn test_no_moves() {
        let mut rules = Rules::new();
        rules.set_position("7k/5Q2/6K1/8/8/8/8/8 b - - 0 1").unwrap();
        assert_eq!(pick_move(rules.position(), 1), None);
    }

    #[test]
    fn test_seeded_engine_is_reproducible() {
        let mut a = NoviceEngine::new(Some(42));
        let mut b = NoviceEngine::new(Some(42));
        assert_eq!(a.next_seed(), b.next_seed());
    }
}
