//! Fixed 2×2 spatial-to-color mapping shared by every grid-based phase.
//!
//! The table below is the single source of truth. UI code that builds its own
//! grid must run it through [`validate_grid`] rather than merging anything back
//! into the table.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{ChoreoError, Result};

/// Side length of the grid.
pub const GRID_SIZE: usize = 2;

/// Grid rows as rendered: `rows[row][column]`.
pub type GridRows = [[GridColor; GRID_SIZE]; GRID_SIZE];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GridColor {
    Red,
    Blue,
    Yellow,
    Green,
}

impl GridColor {
    pub const ALL: [GridColor; 4] = [
        GridColor::Red,
        GridColor::Blue,
        GridColor::Yellow,
        GridColor::Green,
    ];

    /// Partner color for the diagonal variant. Colors on opposite corners of
    /// the canonical grid swap places, which makes this an involution.
    pub fn diagonal(self) -> GridColor {
        match self {
            GridColor::Red => GridColor::Green,
            GridColor::Green => GridColor::Red,
            GridColor::Blue => GridColor::Yellow,
            GridColor::Yellow => GridColor::Blue,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            GridColor::Red => "red",
            GridColor::Blue => "blue",
            GridColor::Yellow => "yellow",
            GridColor::Green => "green",
        }
    }
}

impl fmt::Display for GridColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum GridPosition {
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
}

impl GridPosition {
    pub const ALL: [GridPosition; 4] = [
        GridPosition::TopLeft,
        GridPosition::TopRight,
        GridPosition::BottomLeft,
        GridPosition::BottomRight,
    ];

    /// `(row, column)` of the position.
    pub fn coordinates(self) -> (usize, usize) {
        match self {
            GridPosition::TopLeft => (0, 0),
            GridPosition::TopRight => (0, 1),
            GridPosition::BottomLeft => (1, 0),
            GridPosition::BottomRight => (1, 1),
        }
    }
}

/// Color shown at `position` in the canonical grid.
pub fn color_at(position: GridPosition) -> GridColor {
    match position {
        GridPosition::TopLeft => GridColor::Red,
        GridPosition::TopRight => GridColor::Blue,
        GridPosition::BottomLeft => GridColor::Yellow,
        GridPosition::BottomRight => GridColor::Green,
    }
}

/// Inverse of [`color_at`].
pub fn position_of(color: GridColor) -> GridPosition {
    match color {
        GridColor::Red => GridPosition::TopLeft,
        GridColor::Blue => GridPosition::TopRight,
        GridColor::Yellow => GridPosition::BottomLeft,
        GridColor::Green => GridPosition::BottomRight,
    }
}

/// Canonical table laid out as rows.
pub fn canonical_grid() -> GridRows {
    let mut rows = [[GridColor::Red; GRID_SIZE]; GRID_SIZE];
    for position in GridPosition::ALL {
        let (row, column) = position.coordinates();
        rows[row][column] = color_at(position);
    }
    rows
}

/// Harder variant: every canonical cell replaced by its diagonal partner.
pub fn diagonal_grid() -> GridRows {
    canonical_grid().map(|row| row.map(GridColor::diagonal))
}

/// Checks a caller-assembled grid against the canonical table.
pub fn validate_grid<R: AsRef<[GridColor]>>(candidate: &[R]) -> Result<()> {
    compare(candidate, &canonical_grid())
}

/// Checks a caller-assembled grid against the diagonal variant.
pub fn validate_diagonal_grid<R: AsRef<[GridColor]>>(candidate: &[R]) -> Result<()> {
    compare(candidate, &diagonal_grid())
}

fn compare<R: AsRef<[GridColor]>>(candidate: &[R], expected: &GridRows) -> Result<()> {
    if candidate.len() != GRID_SIZE {
        return Err(ChoreoError::StructuralMismatch(format!(
            "expected {GRID_SIZE} rows, found {}",
            candidate.len()
        )));
    }

    for (row_index, (row, expected_row)) in candidate.iter().zip(expected).enumerate() {
        let row = row.as_ref();
        if row.len() != GRID_SIZE {
            return Err(ChoreoError::StructuralMismatch(format!(
                "row {row_index} has {} cells, expected {GRID_SIZE}",
                row.len()
            )));
        }

        for (column, (found, wanted)) in row.iter().zip(expected_row).enumerate() {
            if found != wanted {
                return Err(ChoreoError::StructuralMismatch(format!(
                    "cell ({row_index}, {column}) is {found}, expected {wanted}"
                )));
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn permutations(colors: [GridColor; 4]) -> Vec<[GridColor; 4]> {
        let mut out = Vec::new();
        for a in 0..4 {
            for b in 0..4 {
                for c in 0..4 {
                    for d in 0..4 {
                        let idx = [a, b, c, d];
                        let mut seen = [false; 4];
                        idx.iter().for_each(|i| seen[*i] = true);
                        if seen.iter().all(|s| *s) {
                            out.push(idx.map(|i| colors[i]));
                        }
                    }
                }
            }
        }
        out
    }

    #[test]
    fn diagonal_is_an_involution() {
        for color in GridColor::ALL {
            assert_eq!(color.diagonal().diagonal(), color);
            assert_ne!(color.diagonal(), color);
        }
    }

    #[test]
    fn diagonal_pairs_are_disjoint_and_cover_all_colors() {
        let mut pairs: Vec<(GridColor, GridColor)> = GridColor::ALL
            .iter()
            .map(|c| {
                let d = c.diagonal();
                if (*c as u8) < (d as u8) {
                    (*c, d)
                } else {
                    (d, *c)
                }
            })
            .collect();
        pairs.sort_by_key(|(a, b)| (*a as u8, *b as u8));
        pairs.dedup();

        assert_eq!(pairs.len(), 2);
        let covered: Vec<GridColor> = pairs.iter().flat_map(|(a, b)| [*a, *b]).collect();
        for color in GridColor::ALL {
            assert_eq!(covered.iter().filter(|c| **c == color).count(), 1);
        }
    }

    #[test]
    fn position_and_color_lookups_are_inverse() {
        for position in GridPosition::ALL {
            assert_eq!(position_of(color_at(position)), position);
        }
        for color in GridColor::ALL {
            assert_eq!(color_at(position_of(color)), color);
        }
    }

    #[test]
    fn diagonal_pairs_sit_on_opposite_corners() {
        let grid = canonical_grid();
        assert_eq!(grid[0][0].diagonal(), grid[1][1]);
        assert_eq!(grid[0][1].diagonal(), grid[1][0]);
    }

    #[test]
    fn accepts_canonical_grid() {
        assert!(validate_grid(&canonical_grid()).is_ok());
        let as_vecs: Vec<Vec<GridColor>> = canonical_grid().iter().map(|r| r.to_vec()).collect();
        assert!(validate_grid(&as_vecs).is_ok());
    }

    #[test]
    fn rejects_every_other_permutation() {
        let canonical = canonical_grid();
        let flat = [canonical[0][0], canonical[0][1], canonical[1][0], canonical[1][1]];

        let mut rejected = 0;
        for perm in permutations(flat) {
            let grid = [[perm[0], perm[1]], [perm[2], perm[3]]];
            if perm == flat {
                assert!(validate_grid(&grid).is_ok());
            } else {
                let err = validate_grid(&grid).unwrap_err();
                assert!(matches!(err, ChoreoError::StructuralMismatch(_)));
                rejected += 1;
            }
        }
        assert_eq!(rejected, 23);
    }

    #[test]
    fn rejects_non_square_shapes() {
        let three_rows = vec![
            vec![GridColor::Red, GridColor::Blue],
            vec![GridColor::Yellow, GridColor::Green],
            vec![GridColor::Red, GridColor::Blue],
        ];
        assert!(validate_grid(&three_rows).is_err());

        let short_row = vec![vec![GridColor::Red, GridColor::Blue], vec![GridColor::Yellow]];
        let err = validate_grid(&short_row).unwrap_err();
        assert!(err.to_string().contains("row 1 has 1 cells"));

        let empty: Vec<Vec<GridColor>> = Vec::new();
        assert!(validate_grid(&empty).is_err());
    }

    #[test]
    fn rejects_duplicated_colors() {
        let grid = [
            [GridColor::Red, GridColor::Red],
            [GridColor::Yellow, GridColor::Green],
        ];
        let err = validate_grid(&grid).unwrap_err();
        assert!(err.to_string().contains("cell (0, 1) is red, expected blue"));

        let column_dupe = [
            [GridColor::Red, GridColor::Blue],
            [GridColor::Red, GridColor::Green],
        ];
        assert!(validate_grid(&column_dupe).is_err());
    }

    #[test]
    fn diagonal_grid_validates_against_its_own_table() {
        let diagonal = diagonal_grid();
        assert!(validate_diagonal_grid(&diagonal).is_ok());
        assert!(validate_grid(&diagonal).is_err());
        assert!(validate_diagonal_grid(&canonical_grid()).is_err());
    }
}
