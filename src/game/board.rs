use serde::{Deserialize, Serialize};

use super::state::UnitId;

/// A tile coordinate. Signed so that neighbour arithmetic can step off the
/// board and be rejected by the bounds check instead of underflowing.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Position {
    pub row: i32,
    pub col: i32,
}

impl Position {
    pub const fn new(row: i32, col: i32) -> Self {
        Self { row, col }
    }

    pub const fn offset(self, rows: i32, cols: i32) -> Self {
        Self {
            row: self.row + rows,
            col: self.col + cols,
        }
    }
}

/// Fixed rows x cols grid mapping each tile to at most one unit.
///
/// The board knows nothing about rules. Every operation reports failure with
/// `false` instead of panicking.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Board {
    rows: i32,
    cols: i32,
    tiles: Vec<Vec<Option<UnitId>>>,
}

impl Board {
    pub fn new(rows: i32, cols: i32) -> Self {
        let rows = rows.max(1);
        let cols = cols.max(1);
        Self {
            rows,
            cols,
            tiles: vec![vec![None; cols as usize]; rows as usize],
        }
    }

    pub fn rows(&self) -> i32 {
        self.rows
    }

    pub fn cols(&self) -> i32 {
        self.cols
    }

    pub fn is_valid_position(&self, pos: Position) -> bool {
        pos.row >= 0 && pos.row < self.rows && pos.col >= 0 && pos.col < self.cols
    }

    /// Whether the tile grid matches `rows` x `cols`. Only a deserialized
    /// board can fail this.
    pub fn is_well_formed(&self) -> bool {
        self.rows > 0
            && self.cols > 0
            && self.tiles.len() == self.rows as usize
            && self.tiles.iter().all(|cells| cells.len() == self.cols as usize)
    }

    fn tile(&self, pos: Position) -> Option<&Option<UnitId>> {
        if !self.is_valid_position(pos) {
            return None;
        }
        self.tiles.get(pos.row as usize)?.get(pos.col as usize)
    }

    fn tile_mut(&mut self, pos: Position) -> Option<&mut Option<UnitId>> {
        if !self.is_valid_position(pos) {
            return None;
        }
        self.tiles.get_mut(pos.row as usize)?.get_mut(pos.col as usize)
    }

    pub fn place(&mut self, unit_id: UnitId, pos: Position) -> bool {
        match self.tile_mut(pos) {
            Some(cell) if cell.is_none() => {
                *cell = Some(unit_id);
                true
            }
            _ => false,
        }
    }

    pub fn remove(&mut self, pos: Position) -> bool {
        match self.tile_mut(pos) {
            Some(cell) => {
                *cell = None;
                true
            }
            None => false,
        }
    }

    pub fn move_unit(&mut self, from: Position, to: Position) -> bool {
        let Some(unit_id) = self.occupant(from) else {
            return false;
        };
        if !self.is_empty(to) {
            return false;
        }
        self.remove(from) && self.place(unit_id, to)
    }

    pub fn occupant(&self, pos: Position) -> Option<UnitId> {
        self.tile(pos).copied().flatten()
    }

    /// An out-of-bounds tile is never empty, so callers can use this as a
    /// single "can something go here" check.
    pub fn is_empty(&self, pos: Position) -> bool {
        self.tile(pos).is_some_and(Option::is_none)
    }

    pub fn row_positions(&self, row: i32) -> impl Iterator<Item = Position> + '_ {
        (0..self.cols).map(move |col| Position::new(row, col))
    }

    pub fn occupied(&self) -> impl Iterator<Item = (Position, UnitId)> + '_ {
        self.tiles.iter().enumerate().flat_map(|(row, cells)| {
            cells.iter().enumerate().filter_map(move |(col, cell)| {
                cell.map(|unit_id| (Position::new(row as i32, col as i32), unit_id))
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn place_then_occupant_returns_unit() {
        let mut board = Board::new(5, 7);
        for row in 0..5 {
            for col in 0..7 {
                let pos = Position::new(row, col);
                let id = (row * 7 + col) as UnitId + 1;
                assert!(board.place(id, pos), "empty in-bounds tile should accept a unit");
                assert_eq!(board.occupant(pos), Some(id));
            }
        }
    }

    #[test]
    fn place_on_occupied_tile_fails_and_keeps_occupant() {
        let mut board = Board::new(5, 7);
        let pos = Position::new(2, 3);
        assert!(board.place(1, pos));
        assert!(!board.place(2, pos), "occupied tile must reject a second unit");
        assert_eq!(board.occupant(pos), Some(1));
    }

    #[test]
    fn out_of_bounds_operations_fail() {
        let mut board = Board::new(5, 7);
        assert!(!board.place(1, Position::new(-1, 0)));
        assert!(!board.place(1, Position::new(0, 7)));
        assert!(!board.remove(Position::new(5, 0)));
        assert!(!board.is_empty(Position::new(0, -1)));
        assert_eq!(board.occupant(Position::new(9, 9)), None);
    }

    #[test]
    fn move_never_duplicates_a_unit() {
        let mut board = Board::new(5, 7);
        let from = Position::new(4, 1);
        let to = Position::new(3, 1);
        board.place(7, from);
        board.place(8, Position::new(2, 1));

        assert!(board.move_unit(from, to));
        assert_eq!(board.occupant(from), None);
        assert_eq!(board.occupant(to), Some(7));
        assert_eq!(board.occupied().filter(|(_, id)| *id == 7).count(), 1);

        assert!(!board.move_unit(to, Position::new(2, 1)), "destination occupied");
        assert!(!board.move_unit(from, to), "source now empty");
        assert!(!board.move_unit(to, Position::new(-1, 1)), "destination out of bounds");
        assert_eq!(board.occupied().count(), 2);
    }

    #[test]
    fn ragged_tiles_are_rejected_without_panicking() {
        let empty: Board =
            serde_json::from_str(r#"{"rows":5,"cols":7,"tiles":[]}"#).expect("board should parse");
        assert!(!empty.is_well_formed());
        assert_eq!(empty.occupant(Position::new(0, 0)), None);
        assert!(!empty.is_empty(Position::new(4, 6)));

        let mut short: Board =
            serde_json::from_str(r#"{"rows":2,"cols":2,"tiles":[[null,null],[null]]}"#).expect("board should parse");
        assert!(!short.is_well_formed());
        assert!(!short.place(1, Position::new(1, 1)));
        assert!(short.place(1, Position::new(1, 0)));
        assert!(!short.move_unit(Position::new(1, 0), Position::new(1, 1)));
        assert_eq!(short.occupant(Position::new(1, 0)), Some(1));
        assert!(Board::new(5, 7).is_well_formed());
    }

    #[test]
    fn remove_clears_tile() {
        let mut board = Board::new(5, 7);
        let pos = Position::new(0, 0);
        board.place(3, pos);
        assert!(board.remove(pos));
        assert!(board.is_empty(pos));
    }
}
