/// One line that differs between two texts.
///
/// A line missing from the shorter text compares as empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineMismatch {
    /// 1-based line number.
    pub line: usize,
    pub left: String,
    pub right: String,
}

/// Compare two texts line by line.
pub fn compare_lines(left: &str, right: &str) -> Vec<LineMismatch> {
    let mut left_lines = left.lines();
    let mut right_lines = right.lines();
    let mut mismatches = Vec::new();
    let mut line = 1;

    loop {
        let (l, r) = match (left_lines.next(), right_lines.next()) {
            (None, None) => break,
            (l, r) => (l.unwrap_or(""), r.unwrap_or("")),
        };
        if l != r {
            mismatches.push(LineMismatch {
                line,
                left: l.to_string(),
                right: r.to_string(),
            });
        }
        line += 1;
    }
    mismatches
}

/// Number of differing bytes: mismatches over the common prefix plus the
/// length difference.
pub fn count_byte_differences(left: &[u8], right: &[u8]) -> usize {
    let common = left.iter().zip(right).filter(|(a, b)| a != b).count();
    common + left.len().abs_diff(right.len())
}
