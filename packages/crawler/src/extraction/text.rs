//! Text normalization shared by every text-producing strategy.

/// Delivered when no strategy could extract a posting body.
pub const CONTENT_UNAVAILABLE: &str = "content unavailable";

/// Canonical form for extracted text.
///
/// - `\r\n` and lone `\r` become `\n`
/// - form feeds and other control characters are dropped; tabs and other
///   whitespace become spaces
/// - each line is whitespace-collapsed and trimmed
/// - runs of identical consecutive lines (blank lines included) collapse to one
/// - leading and trailing blank lines are removed
///
/// `normalize(normalize(x)) == normalize(x)` for every input.
pub fn normalize(raw: String) -> String {
    let unified = raw.replace("\r\n", "\n").replace('\r', "\n");

    let mut lines: Vec<String> = Vec::new();
    for line in unified.split('\n') {
        let cleaned: String = line
            .chars()
            .filter_map(|c| {
                if c.is_whitespace() {
                    Some(' ')
                } else if c.is_control() {
                    None
                } else {
                    Some(c)
                }
            })
            .collect();
        let collapsed = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");

        if lines.last() != Some(&collapsed) {
            lines.push(collapsed);
        }
    }

    let start = lines.iter().position(|l| !l.is_empty());
    let end = lines.iter().rposition(|l| !l.is_empty());
    match (start, end) {
        (Some(start), Some(end)) => lines[start..=end].join("\n"),
        _ => String::new(),
    }
}

/// Collapse runs of whitespace inside a single cell or title.
pub fn squash(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
