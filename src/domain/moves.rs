//! Move records, coordinate move text, and the ply history.
//!
//! This is a pure domain module with no threads or I/O.

use std::fmt;
use std::str::FromStr;

use shakmaty::Square;

use crate::domain::board::BoardState;
use crate::domain::chess::{PieceKind, parse_square};
use crate::error::MoveTextError;

/// Immutable description of a single ply
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct MoveRecord {
    pub from: Square,
    pub to: Square,
    pub promotion: Option<PieceKind>,
    pub is_castle: bool,
    pub is_capture: bool,
    /// A pawn reaching its last rank (promotion must be chosen)
    pub is_promotion_trigger: bool,
}

impl MoveRecord {
    pub fn new(from: Square, to: Square) -> Self {
        Self {
            from,
            to,
            promotion: None,
            is_castle: false,
            is_capture: false,
            is_promotion_trigger: false,
        }
    }

    pub fn text(&self) -> MoveText {
        MoveText {
            from: self.from,
            to: self.to,
            promotion: self.promotion,
        }
    }

    /// Whether this record describes the same from/to/promotion as `text`
    pub fn matches(&self, text: &MoveText) -> bool {
        self.from == text.from && self.to == text.to && self.promotion == text.promotion
    }
}

impl fmt::Display for MoveRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.text().fmt(f)
    }
}

/// Coordinate move text: `e2e4`, or `e7e8q` with a lowercase promotion letter
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct MoveText {
    pub from: Square,
    pub to: Square,
    pub promotion: Option<PieceKind>,
}

impl FromStr for MoveText {
    type Err = MoveTextError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let text = text.trim();
        if !text.is_ascii() || !(4..=5).contains(&text.len()) {
            return Err(MoveTextError::Length(text.to_string()));
        }

        let from = parse_square(&text[0..2]).ok_or_else(|| MoveTextError::Square(text.to_string()))?;
        let to = parse_square(&text[2..4]).ok_or_else(|| MoveTextError::Square(text.to_string()))?;

        let promotion = match text[4..].chars().next() {
            None => None,
            Some(c) => match PieceKind::from_char(c) {
                Some(kind) if c.is_ascii_lowercase() && kind.is_promotion_choice() => Some(kind),
                _ => return Err(MoveTextError::Promotion(text.to_string())),
            },
        };

        Ok(Self { from, to, promotion })
    }
}

impl fmt::Display for MoveText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.from, self.to)?;
        if let Some(kind) = self.promotion {
            write!(f, "{}", kind.to_char())?;
        }
        Ok(())
    }
}

/// A ply in the history together with the state it replaced
#[derive(Clone, Debug)]
pub struct MoveNode<T> {
    /// 1-based ply number of this move
    pub ply: usize,
    pub record: MoveRecord,
    /// Board as it was before this move was applied
    pub board_before: BoardState,
    /// Caller-defined state captured before the move (clock readings, flags)
    pub saved: T,
}

impl<T> MoveNode<T> {
    /// Get the move number (1-based, for display)
    /// Returns (move_number, is_black_move) assuming white moved first
    pub fn move_number(&self) -> (usize, bool) {
        let move_num = self.ply.div_ceil(2);
        let is_black = self.ply % 2 == 0;
        (move_num, is_black)
    }
}

/// Ordered ply history. Local play pops from the tail on undo; online play
/// only appends, or is rebuilt wholesale on a resync.
#[derive(Clone, Debug)]
pub struct MoveHistory<T> {
    nodes: Vec<MoveNode<T>>,
}

impl<T> MoveHistory<T> {
    pub fn new() -> Self {
        Self { nodes: Vec::new() }
    }

    /// Append a move, returning its ply number
    pub fn push(&mut self, record: MoveRecord, board_before: BoardState, saved: T) -> usize {
        let ply = self.nodes.len() + 1;
        self.nodes.push(MoveNode {
            ply,
            record,
            board_before,
            saved,
        });
        ply
    }

    /// Remove and return the last move
    pub fn pop(&mut self) -> Option<MoveNode<T>> {
        self.nodes.pop()
    }

    pub fn last(&self) -> Option<&MoveNode<T>> {
        self.nodes.last()
    }

    pub fn get(&self, ply: usize) -> Option<&MoveNode<T>> {
        ply.checked_sub(1).and_then(|i| self.nodes.get(i))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, MoveNode<T>> {
        self.nodes.iter()
    }

    /// Coordinate text of every move, oldest first
    pub fn texts(&self) -> Vec<String> {
        self.nodes.iter().map(|n| n.record.to_string()).collect()
    }

    /// The most recent `count` records, oldest first
    pub fn last_moves(&self, count: usize) -> Vec<MoveRecord> {
        let start = self.nodes.len().saturating_sub(count);
        self.nodes[start..].iter().map(|n| n.record).collect()
    }
}

impl<T> Default for MoveHistory<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::chess::PieceColor;

    #[test]
    fn test_parse_plain_move() {
        let text: MoveText = "e2e4".parse().unwrap();
        assert_eq!(text.from, Square::E2);
        assert_eq!(text.to, Square::E4);
        assert_eq!(text.promotion, None);
        assert_eq!(text.to_string(), "e2e4");
    }

    #[test]
    fn test_parse_promotion_move() {
        let text: MoveText = "e7e8q".parse().unwrap();
        assert_eq!(text.promotion, Some(PieceKind::Queen));
        assert_eq!(text.to_string(), "e7e8q");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!("e2".parse::<MoveText>(), Err(MoveTextError::Length(_))));
        assert!(matches!("e2e4e5".parse::<MoveText>(), Err(MoveTextError::Length(_))));
        assert!(matches!("z2e4".parse::<MoveText>(), Err(MoveTextError::Square(_))));
        assert!(matches!("e7e8k".parse::<MoveText>(), Err(MoveTextError::Promotion(_))));
        assert!(matches!("e7e8Q".parse::<MoveText>(), Err(MoveTextError::Promotion(_))));
        assert!("(none)".parse::<MoveText>().is_err());
    }

    #[test]
    fn test_history_push_pop() {
        let mut history: MoveHistory<()> = MoveHistory::new();
        let board = BoardState::initial(PieceColor::Black);
        assert!(history.is_empty());

        let ply = history.push(MoveRecord::new(Square::E2, Square::E4), board.clone(), ());
        assert_eq!(ply, 1);
        history.push(MoveRecord::new(Square::E7, Square::E5), board.clone(), ());
        assert_eq!(history.texts(), vec!["e2e4", "e7e5"]);

        let popped = history.pop().unwrap();
        assert_eq!(popped.ply, 2);
        assert_eq!(history.len(), 1);
        assert_eq!(history.last().unwrap().record.to_string(), "e2e4");
    }

    #[test]
    fn test_move_numbers() {
        let mut history: MoveHistory<()> = MoveHistory::new();
        let board = BoardState::initial(PieceColor::Black);
        for _ in 0..3 {
            history.push(MoveRecord::new(Square::A2, Square::A3), board.clone(), ());
        }
        assert_eq!(history.get(1).unwrap().move_number(), (1, false));
        assert_eq!(history.get(2).unwrap().move_number(), (1, true));
        assert_eq!(history.get(3).unwrap().move_number(), (2, false));
        assert!(history.get(0).is_none());
        assert_eq!(history.last_moves(2).len(), 2);
    }
}
