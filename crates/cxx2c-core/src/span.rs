//! Byte-range source spans.

use serde::{Deserialize, Serialize};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, salsa::Update)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub const fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// A span covering both `self` and `other`.
    pub fn to(self, other: Span) -> Span {
        Span::new(self.start, other.end)
    }
}

pub type Spanned<T> = (T, Span);

/// Compute the 1-based (line, column) of a byte offset in `text`.
///
/// Offsets past the end of the text resolve to the final position, so
/// diagnostics at EOF still render something sensible.
pub fn line_col(text: &str, offset: usize) -> (u32, u32) {
    let mut line = 1u32;
    let mut col = 1u32;
    for (i, ch) in text.char_indices() {
        if i >= offset {
            break;
        }
        if ch == '\n' {
            line += 1;
            col = 1;
        } else {
            col += 1;
        }
    }
    (line, col)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_col_start() {
        assert_eq!(line_col("abc", 0), (1, 1));
    }

    #[test]
    fn line_col_multiline() {
        let text = "int x;\nint y;\n";
        assert_eq!(line_col(text, 7), (2, 1));
        assert_eq!(line_col(text, 11), (2, 5));
    }

    #[test]
    fn line_col_past_end() {
        assert_eq!(line_col("ab", 10), (1, 3));
    }
}
