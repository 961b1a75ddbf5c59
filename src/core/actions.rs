//! Action-item extraction from an action-items summary.
//!
//! Best-effort line heuristic, not a guaranteed extraction: it never fails
//! on malformed summaries, it only skips lines that don't match.

/// Scan a summary line by line and return the action texts.
///
/// A line qualifies if, after trimming, it starts with a bullet marker
/// (`-`, `•`) or a numeric-list marker (`1.`, `2.` ...). The marker is
/// stripped and the remainder kept only if its trimmed length exceeds 5
/// characters.
pub fn extract_actions(summary: &str) -> Vec<String> {
    summary
        .lines()
        .filter_map(|line| {
            let rest = strip_marker(line.trim())?.trim();
            (rest.chars().count() > 5).then(|| rest.to_string())
        })
        .collect()
}

fn strip_marker(line: &str) -> Option<&str> {
    if let Some(rest) = line.strip_prefix('-').or_else(|| line.strip_prefix('•')) {
        return Some(rest);
    }

    // Numeric-list marker: one or more digits followed by '.'
    let digits = line.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits > 0 {
        line[digits..].strip_prefix('.')
    } else {
        None
    }
}
