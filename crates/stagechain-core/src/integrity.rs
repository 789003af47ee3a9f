//! Integrity helpers: the additive checksum and loader minification.
//!
//! The checksum is deliberately the same trivial function the generated
//! loaders compute at runtime: the sum of all bytes modulo 256.

/// Sum of all bytes modulo 256.
pub fn checksum(data: &[u8]) -> u8 {
    data.iter().fold(0u8, |sum, &b| sum.wrapping_add(b))
}

/// Strip `--` comments and collapse whitespace runs to single spaces.
///
/// Comments run to end of line, so they are removed before lines are joined.
/// Templates passed through here must not contain `--` inside string
/// literals.
pub fn minify(code: &str) -> String {
    let mut out = String::with_capacity(code.len());
    for line in code.lines() {
        let line = match line.find("--") {
            Some(idx) => &line[..idx],
            None => line,
        };
        for word in line.split_whitespace() {
            if !out.is_empty() {
                out.push(' ');
            }
            out.push_str(word);
        }
    }
    out
}
