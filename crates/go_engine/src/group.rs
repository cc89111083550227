//! Connected-group and liberty analysis.

use super::types::{Board, Cell, Point, Stone};
use std::collections::{BTreeSet, HashSet, VecDeque};

/// A maximal 4-connected set of same-coloured stones.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Group {
    color: Stone,
    stones: Vec<Point>,
    liberties: BTreeSet<Point>,
}

impl Group {
    /// Colour of every stone in the group.
    pub fn color(&self) -> Stone {
        self.color
    }

    /// Stones in breadth-first order from the seed.
    pub fn stones(&self) -> &[Point] {
        &self.stones
    }

    /// Distinct empty cells adjacent to the group.
    pub fn liberties(&self) -> &BTreeSet<Point> {
        &self.liberties
    }

    /// Number of liberties.
    pub fn liberty_count(&self) -> usize {
        self.liberties.len()
    }

    /// Checks if `point` belongs to the group.
    pub fn contains(&self, point: Point) -> bool {
        self.stones.contains(&point)
    }
}

/// Flood-fills the group containing `seed`.
///
/// Returns `None` when `seed` is off the board or empty. Each stone and each
/// boundary cell is visited once.
pub fn find_group(board: &Board, seed: Point) -> Option<Group> {
    let color = board.get(seed)?.stone()?;

    let mut visited = HashSet::from([seed]);
    let mut queue = VecDeque::from([seed]);
    let mut stones = vec![seed];
    let mut liberties = BTreeSet::new();

    while let Some(current) = queue.pop_front() {
        for neighbor in board.neighbors(current) {
            match board.get(neighbor) {
                Some(Cell::Empty) => {
                    liberties.insert(neighbor);
                }
                Some(Cell::Occupied(stone)) if stone == color => {
                    if visited.insert(neighbor) {
                        queue.push_back(neighbor);
                        stones.push(neighbor);
                    }
                }
                _ => {}
            }
        }
    }

    Some(Group {
        color,
        stones,
        liberties,
    })
}
