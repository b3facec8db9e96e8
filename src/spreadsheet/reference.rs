//! Conversions between zero-based (row, column) indexes and A1-style cell references.

use regex::Regex;
use std::sync::LazyLock;

static REFERENCE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\$?([A-Za-z]{1,3})\$?([0-9]{1,7})$").expect("Hardcode regex pattern"));

/// Column letters for a zero-based column index (0 -> "A", 26 -> "AA").
pub fn index_to_col(col: usize) -> String {
    let mut letters = Vec::new();
    let mut value = col + 1;
    while value > 0 {
        let remainder = (value - 1) % 26;
        letters.push(b'A' + remainder as u8);
        value = (value - 1) / 26;
    }
    letters.iter().rev().map(|letter| *letter as char).collect()
}

/// Zero-based column index for column letters, case-insensitive.
pub fn col_to_index(col: &str) -> Option<usize> {
    if col.is_empty() {
        return None;
    }
    col.chars().try_fold(0usize, |index, letter| {
        letter
            .is_ascii_alphabetic()
            .then(|| index * 26 + (letter.to_ascii_uppercase() as usize - 'A' as usize + 1))
    })
    .map(|index| index - 1)
}

/// Zero-based row index for a 1-based row number.
pub fn row_to_index(row: &str) -> Option<usize> {
    row.parse::<usize>().ok().and_then(|row| row.checked_sub(1))
}

/// A1 reference for zero-based indexes.
pub fn index_to_reference(row: usize, col: usize) -> String {
    format!("{}{}", index_to_col(col), row + 1)
}

/// Zero-based (row, column) for an A1 reference; absolute markers are accepted.
pub fn reference_to_index(reference: &str) -> Option<(usize, usize)> {
    let captures = REFERENCE_PATTERN.captures(reference)?;
    let col = col_to_index(captures.get(1)?.as_str())?;
    let row = row_to_index(captures.get(2)?.as_str())?;
    Some((row, col))
}
