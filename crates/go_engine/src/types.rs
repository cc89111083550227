//! Core domain types for the Go board.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Stone colour.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    schemars::JsonSchema,
    strum::Display,
    strum::EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Stone {
    /// Black (moves first).
    Black,
    /// White.
    White,
}

impl Stone {
    /// Returns the opposing colour.
    pub fn opponent(self) -> Self {
        match self {
            Stone::Black => Stone::White,
            Stone::White => Stone::Black,
        }
    }
}

/// A single intersection on the board.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, schemars::JsonSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum Cell {
    /// No stone.
    #[default]
    Empty,
    /// A stone of the given colour.
    Occupied(Stone),
}

impl Cell {
    /// Returns the stone on this cell, if any.
    pub fn stone(self) -> Option<Stone> {
        match self {
            Cell::Empty => None,
            Cell::Occupied(stone) => Some(stone),
        }
    }

    /// Checks if the cell is empty.
    pub fn is_empty(self) -> bool {
        matches!(self, Cell::Empty)
    }
}

/// Board coordinate. `(-1, -1)` is reserved for passing.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    schemars::JsonSchema,
    derive_more::Display,
)]
#[display("({x}, {y})")]
pub struct Point {
    /// Column, growing to the right.
    pub x: i32,
    /// Row, growing downwards.
    pub y: i32,
}

impl Point {
    /// The pass sentinel.
    pub const PASS: Point = Point { x: -1, y: -1 };

    /// Creates a point.
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Checks if this is the pass sentinel.
    pub fn is_pass(self) -> bool {
        self == Self::PASS
    }

    /// Returns the point shifted by `(dx, dy)`.
    pub fn offset(self, dx: i32, dy: i32) -> Self {
        Self::new(self.x + dx, self.y + dy)
    }
}

/// A stone placement request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Move {
    /// Where the stone goes.
    pub position: Point,
    /// Who places it.
    pub player: Stone,
}

impl Move {
    /// Creates a new move.
    pub fn new(player: Stone, position: Point) -> Self {
        Self { position, player }
    }
}

impl std::fmt::Display for Move {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} -> {}", self.player, self.position)
    }
}

/// Forbids recapturing at `point` while `turn_index` equals the move count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, schemars::JsonSchema)]
pub struct KoRecord {
    /// The single stone captured by the ko-shaped move.
    pub point: Point,
    /// Move index at which replaying `point` is forbidden.
    pub turn_index: usize,
}

/// One changed cell between two boards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct CellChange {
    /// The changed intersection.
    pub point: Point,
    /// Its new content.
    pub cell: Cell,
}

/// Error for writes that miss the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
pub enum BoardError {
    /// The point is not on the board.
    #[display("Point {_0} is off the board")]
    OffBoard(Point),
    /// A diagram could not be parsed.
    #[display("Malformed board diagram: {_0}")]
    Malformed(&'static str),
}

impl std::error::Error for BoardError {}

/// Square Go board with copy-on-write storage.
///
/// Cloning a board shares the cell buffer; the first write to a clone
/// detaches it, so a board handed out never changes underneath its holder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "BoardRepr", into = "BoardRepr")]
pub struct Board {
    size: usize,
    cells: Arc<Vec<Cell>>,
}

#[derive(Serialize, Deserialize)]
struct BoardRepr {
    size: usize,
    cells: Vec<Cell>,
}

impl TryFrom<BoardRepr> for Board {
    type Error = BoardError;

    fn try_from(repr: BoardRepr) -> Result<Self, Self::Error> {
        if repr.cells.len() != repr.size * repr.size {
            return Err(BoardError::Malformed("cell count does not match size"));
        }
        Ok(Self {
            size: repr.size,
            cells: Arc::new(repr.cells),
        })
    }
}

impl From<Board> for BoardRepr {
    fn from(board: Board) -> Self {
        Self {
            size: board.size,
            cells: board.cells.as_ref().clone(),
        }
    }
}

impl Board {
    /// Creates an empty board of `size × size`.
    pub fn new(size: usize) -> Self {
        Self {
            size,
            cells: Arc::new(vec![Cell::Empty; size * size]),
        }
    }

    /// Parses a diagram of `.`, `B`/`X` and `W`/`O` rows.
    ///
    /// Whitespace inside rows is ignored, so rows may be written `". B W"`.
    pub fn from_diagram(diagram: &str) -> Result<Self, BoardError> {
        let rows: Vec<Vec<Cell>> = diagram
            .lines()
            .map(|line| {
                line.chars()
                    .filter(|c| !c.is_whitespace())
                    .map(|c| match c {
                        '.' | '+' => Ok(Cell::Empty),
                        'B' | 'X' => Ok(Cell::Occupied(Stone::Black)),
                        'W' | 'O' => Ok(Cell::Occupied(Stone::White)),
                        _ => Err(BoardError::Malformed("unknown cell character")),
                    })
                    .collect::<Result<Vec<_>, _>>()
            })
            .filter(|row| !matches!(row, Ok(r) if r.is_empty()))
            .collect::<Result<_, _>>()?;

        let size = rows.len();
        if rows.iter().any(|row| row.len() != size) {
            return Err(BoardError::Malformed("diagram is not square"));
        }
        Ok(Self {
            size,
            cells: Arc::new(rows.into_iter().flatten().collect()),
        })
    }

    /// Side length.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Checks if `point` lies on the board.
    pub fn contains(&self, point: Point) -> bool {
        let n = self.size as i64;
        (0..n).contains(&(point.x as i64)) && (0..n).contains(&(point.y as i64))
    }

    /// Gets the cell at `point`, `None` when off the board.
    pub fn get(&self, point: Point) -> Option<Cell> {
        self.contains(point).then(|| self.cells[self.index(point)])
    }

    /// Sets the cell at `point`, detaching shared storage first.
    pub fn set(&mut self, point: Point, cell: Cell) -> Result<(), BoardError> {
        if !self.contains(point) {
            return Err(BoardError::OffBoard(point));
        }
        let idx = self.index(point);
        Arc::make_mut(&mut self.cells)[idx] = cell;
        Ok(())
    }

    /// Orthogonal on-board neighbours of `point`.
    pub fn neighbors(&self, point: Point) -> impl Iterator<Item = Point> + '_ {
        const OFFSETS: [(i32, i32); 4] = [(-1, 0), (1, 0), (0, -1), (0, 1)];
        OFFSETS
            .into_iter()
            .map(move |(dx, dy)| point.offset(dx, dy))
            .filter(|p| self.contains(*p))
    }

    /// All stones on the board in row-major order.
    pub fn stones(&self) -> impl Iterator<Item = (Point, Stone)> + '_ {
        self.cells.iter().enumerate().filter_map(|(idx, cell)| {
            cell.stone().map(|stone| (self.point_at(idx), stone))
        })
    }

    /// Counts stones of `stone`.
    pub fn count(&self, stone: Stone) -> usize {
        self.stones().filter(|(_, s)| *s == stone).count()
    }

    /// The grid as rows (`rows[y][x]`).
    pub fn rows(&self) -> Vec<Vec<Cell>> {
        if self.size == 0 {
            return Vec::new();
        }
        self.cells.chunks(self.size).map(<[Cell]>::to_vec).collect()
    }

    /// Cells that differ between `self` and `next`, in row-major order.
    ///
    /// Boards of different sizes yield every cell of `next`.
    pub fn diff(&self, next: &Board) -> Vec<CellChange> {
        if Arc::ptr_eq(&self.cells, &next.cells) {
            return Vec::new();
        }
        next.cells
            .iter()
            .enumerate()
            .filter(|(idx, cell)| self.size != next.size || self.cells[*idx] != **cell)
            .map(|(idx, cell)| CellChange {
                point: next.point_at(idx),
                cell: *cell,
            })
            .collect()
    }

    /// Writes every change of a delta; stops at the first off-board point.
    pub fn apply(&mut self, changes: &[CellChange]) -> Result<(), BoardError> {
        changes
            .iter()
            .try_for_each(|change| self.set(change.point, change.cell))
    }

    /// Formats the board as rows of `.`, `B` and `W`.
    pub fn display(&self) -> String {
        self.rows()
            .iter()
            .map(|row| {
                row.iter()
                    .map(|cell| match cell {
                        Cell::Empty => '.',
                        Cell::Occupied(Stone::Black) => 'B',
                        Cell::Occupied(Stone::White) => 'W',
                    })
                    .collect::<String>()
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn index(&self, point: Point) -> usize {
        point.y as usize * self.size + point.x as usize
    }

    fn point_at(&self, idx: usize) -> Point {
        Point::new((idx % self.size) as i32, (idx / self.size) as i32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pass_sentinel_is_off_board() {
        let board = Board::new(9);
        assert!(Point::PASS.is_pass());
        assert!(!board.contains(Point::PASS));
        assert_eq!(board.get(Point::PASS), None);
    }

    #[test]
    fn test_clone_does_not_observe_writes() {
        let original = Board::new(5);
        let mut copy = original.clone();
        copy.set(Point::new(2, 2), Cell::Occupied(Stone::Black))
            .expect("on board");

        assert_eq!(original.get(Point::new(2, 2)), Some(Cell::Empty));
        assert_eq!(copy.get(Point::new(2, 2)), Some(Cell::Occupied(Stone::Black)));
    }

    #[test]
    fn test_diagram_round_trips_through_display() {
        let board = Board::from_diagram(
            "
            .B.
            W.B
            ...
            ",
        )
        .expect("valid diagram");

        assert_eq!(board.size(), 3);
        assert_eq!(board.display(), ".B.\nW.B\n...");
        assert_eq!(board.count(Stone::Black), 2);
        assert_eq!(board.count(Stone::White), 1);
    }

    #[test]
    fn test_diff_reports_changed_cells_only() {
        let before = Board::new(3);
        let mut after = before.clone();
        after
            .set(Point::new(1, 0), Cell::Occupied(Stone::White))
            .expect("on board");

        let changes = before.diff(&after);
        assert_eq!(
            changes,
            vec![CellChange {
                point: Point::new(1, 0),
                cell: Cell::Occupied(Stone::White),
            }]
        );
        assert!(after.diff(&after.clone()).is_empty());

        let mut replayed = before.clone();
        replayed.apply(&changes).expect("on board");
        assert_eq!(replayed, after);
    }

    #[test]
    fn test_serde_rejects_wrong_cell_count() {
        let json = r#"{"size":2,"cells":["empty"]}"#;
        assert!(serde_json::from_str::<Board>(json).is_err());
    }

    #[test]
    fn test_set_off_board_fails() {
        let mut board = Board::new(3);
        assert_eq!(
            board.set(Point::new(3, 0), Cell::Empty),
            Err(BoardError::OffBoard(Point::new(3, 0)))
        );
    }
}
