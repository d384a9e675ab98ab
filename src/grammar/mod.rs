//! Structural validation of solver input.
//!
//! The solver reads a line-oriented problem description:
//!
//! ```text
//! N M B K           grid rows, grid columns, battery capacity, recharge amount
//! h h ... h         N lines of M non-negative heights
//! S                 number of recharge stations
//! r c               S lines of 0-indexed station coordinates
//! ```
//!
//! Rules are checked in order and the first violation wins. Nothing here
//! allocates in proportion to a *claimed* size: every buffer is bounded by
//! the lines actually present, and the caller enforces a byte limit first.

use std::panic;

use thiserror::Error;

use crate::consts::MAX_GRID_DIM;
use crate::handler::describe_panic;

/// A recharge station cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Station {
    pub row: usize,
    pub col: usize,
}

/// A problem that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProblemSpec {
    pub rows: usize,
    pub cols: usize,
    pub battery: u64,
    pub recharge: u64,
    pub heights: Vec<Vec<u64>>,
    /// Duplicates are kept as given.
    pub stations: Vec<Station>,
}

/// Why a payload was rejected. `Display` is the client-facing message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GrammarError {
    #[error("Input is empty")]
    Empty,
    #[error("First line must contain exactly 4 integers (N M B K)")]
    HeaderArity,
    #[error("First line must contain valid integers")]
    HeaderNotInteger,
    #[error("Grid dimensions (N, M) must be positive")]
    NonPositiveDimensions,
    #[error("Grid dimensions too large (max 1000x1000)")]
    DimensionsTooLarge,
    #[error("Maximum battery (B) must be positive")]
    NonPositiveBattery,
    #[error("Recharge amount (K) must be positive")]
    NonPositiveRecharge,
    #[error("Expected at least {expected} grid lines, got {got}")]
    MissingGridLines { expected: usize, got: usize },
    #[error("Grid line {row} has {got} integers, expected {expected}")]
    RowArity {
        row: usize,
        got: usize,
        expected: usize,
    },
    #[error("Grid line {row} contains invalid integers")]
    RowNotInteger { row: usize },
    #[error("Grid line {row} contains negative heights")]
    RowNegative { row: usize },
    #[error("Missing recharge station count (S)")]
    MissingStationCount,
    #[error("Recharge station count (S) must be an integer")]
    StationCountNotInteger,
    #[error("Number of recharge stations cannot be negative")]
    NegativeStationCount,
    #[error("Expected {expected} recharge station coordinates, got {got}")]
    MissingStations { expected: i64, got: usize },
    #[error("Recharge station {index} must have 2 coordinates (r c)")]
    StationArity { index: usize },
    #[error("Recharge station {index} coordinates must be integers")]
    StationNotInteger { index: usize },
    #[error("Recharge station {index} at ({row}, {col}) is outside grid bounds")]
    StationOutOfBounds { index: usize, row: i64, col: i64 },
    #[error("Input validation error: {0}")]
    Internal(String),
}

/// Either a well-formed problem or the first rule it broke.
pub type ValidationOutcome = Result<ProblemSpec, GrammarError>;

/// Validate a raw payload. Never panics: an internal fault comes back as
/// [`GrammarError::Internal`].
pub fn validate(input: &str) -> ValidationOutcome {
    match panic::catch_unwind(|| parse(input)) {
        Ok(outcome) => outcome,
        Err(payload) => Err(GrammarError::Internal(describe_panic(payload.as_ref()))),
    }
}

fn parse(input: &str) -> ValidationOutcome {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(GrammarError::Empty);
    }
    let lines: Vec<&str> = trimmed.split('\n').collect();

    let [n, m, battery, recharge] = parse_header(lines[0])?;
    if n <= 0 || m <= 0 {
        return Err(GrammarError::NonPositiveDimensions);
    }
    if n > MAX_GRID_DIM || m > MAX_GRID_DIM {
        return Err(GrammarError::DimensionsTooLarge);
    }
    if battery <= 0 {
        return Err(GrammarError::NonPositiveBattery);
    }
    if recharge <= 0 {
        return Err(GrammarError::NonPositiveRecharge);
    }

    // Bounded by MAX_GRID_DIM above.
    let rows = n as usize;
    let cols = m as usize;

    if lines.len() < rows + 1 {
        return Err(GrammarError::MissingGridLines {
            expected: rows,
            got: lines.len() - 1,
        });
    }
    let heights = (1..=rows)
        .map(|row| parse_row(lines[row], row, cols))
        .collect::<Result<Vec<_>, _>>()?;

    let count_line = lines
        .get(rows + 1)
        .ok_or(GrammarError::MissingStationCount)?;
    let count = parse_int(count_line.trim()).ok_or(GrammarError::StationCountNotInteger)?;
    if count < 0 {
        return Err(GrammarError::NegativeStationCount);
    }

    let station_lines = &lines[rows + 2..];
    if (station_lines.len() as i64) < count {
        return Err(GrammarError::MissingStations {
            expected: count,
            got: station_lines.len(),
        });
    }
    // Lines after the last station are ignored.
    let stations = station_lines[..count as usize]
        .iter()
        .enumerate()
        .map(|(i, line)| parse_station(line, i + 1, n, m))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(ProblemSpec {
        rows,
        cols,
        battery: battery as u64,
        recharge: recharge as u64,
        heights,
        stations,
    })
}

/// A decimal integer with an optional sign. Magnitudes past `i64` saturate
/// instead of failing, so range checks still see them as huge.
fn parse_int(token: &str) -> Option<i64> {
    let digits = token.strip_prefix(['+', '-']).unwrap_or(token);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let saturated = if token.starts_with('-') {
        i64::MIN
    } else {
        i64::MAX
    };
    Some(token.parse().unwrap_or(saturated))
}

fn parse_header(line: &str) -> Result<[i64; 4], GrammarError> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    if tokens.len() != 4 {
        return Err(GrammarError::HeaderArity);
    }
    let mut header = [0i64; 4];
    for (slot, token) in header.iter_mut().zip(&tokens) {
        *slot = parse_int(token).ok_or(GrammarError::HeaderNotInteger)?;
    }
    Ok(header)
}

/// `row` is 1-based, matching how users count lines of the grid.
fn parse_row(line: &str, row: usize, cols: usize) -> Result<Vec<u64>, GrammarError> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    if tokens.len() != cols {
        return Err(GrammarError::RowArity {
            row,
            got: tokens.len(),
            expected: cols,
        });
    }
    let values = tokens
        .iter()
        .map(|t| parse_int(t))
        .collect::<Option<Vec<_>>>()
        .ok_or(GrammarError::RowNotInteger { row })?;
    if values.iter().any(|&h| h < 0) {
        return Err(GrammarError::RowNegative { row });
    }
    Ok(values.into_iter().map(|h| h as u64).collect())
}

fn parse_station(line: &str, index: usize, n: i64, m: i64) -> Result<Station, GrammarError> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    let [r, c] = tokens[..] else {
        return Err(GrammarError::StationArity { index });
    };
    let (row, col) = match (parse_int(r), parse_int(c)) {
        (Some(row), Some(col)) => (row, col),
        _ => return Err(GrammarError::StationNotInteger { index }),
    };
    if !(0..n).contains(&row) || !(0..m).contains(&col) {
        return Err(GrammarError::StationOutOfBounds { index, row, col });
    }
    Ok(Station {
        row: row as usize,
        col: col as usize,
    })
}
