// 👤 Owner Extraction - who a holdings file belongs to
// The owner label lives in the file name; nothing inside the sheet identifies it

use regex::Regex;
use std::sync::OnceLock;

fn client_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)CLIENT[\s_]+([^|]+?)[\s_]+CLIENT-ID").expect("client pattern is valid")
    })
}

/// Derive the owner label from a file name
///
/// # Examples:
/// ```
/// use holdings_pivot::owner::extract_owner;
/// assert_eq!(extract_owner("CLIENT John_Doe CLIENT-ID 123.xlsx"), "John Doe");
/// assert_eq!(extract_owner("report.csv"), "report");
/// ```
///
/// Never fails: anything without a `CLIENT <name> CLIENT-ID` marker falls back to
/// the name minus its `.xlsx`/`.csv` extension. Works on the name as given; callers
/// holding a path pass its final component.
pub fn extract_owner(filename: &str) -> String {
    if let Some(caps) = client_pattern().captures(filename) {
        let name = normalize_name(&caps[1]);
        if !name.is_empty() {
            return name;
        }
    }

    strip_extension(filename).to_string()
}

/// `_` and `-` act as word separators inside the captured name
fn normalize_name(raw: &str) -> String {
    raw.replace(['_', '-'], " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn strip_extension(filename: &str) -> &str {
    for ext in [".xlsx", ".csv"] {
        let Some(cut) = filename.len().checked_sub(ext.len()) else {
            continue;
        };
        if filename.is_char_boundary(cut) && filename[cut..].eq_ignore_ascii_case(ext) {
            return &filename[..cut];
        }
    }
    filename
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_owner_client_marker() {
        assert_eq!(extract_owner("CLIENT John_Doe CLIENT-ID 123.xlsx"), "John Doe");
        assert_eq!(extract_owner("CLIENT Alice CLIENT-ID.xlsx"), "Alice");
    }

    #[test]
    fn test_extract_owner_case_insensitive() {
        assert_eq!(extract_owner("holding client Bob Smith client-id 99.csv"), "Bob Smith");
    }

    #[test]
    fn test_extract_owner_hyphenated_name() {
        assert_eq!(extract_owner("CLIENT Mary-Jane CLIENT-ID 7.xlsx"), "Mary Jane");
    }

    #[test]
    fn test_extract_owner_underscore_separated_marker() {
        assert_eq!(extract_owner("CLIENT_Ravi_Kumar_CLIENT-ID_55.xlsx"), "Ravi Kumar");
    }

    #[test]
    fn test_extract_owner_fallback_strips_extension() {
        assert_eq!(extract_owner("report.csv"), "report");
        assert_eq!(extract_owner("Holdings March.XLSX"), "Holdings March");
        assert_eq!(extract_owner("notes.txt"), "notes.txt");
    }

    #[test]
    fn test_extract_owner_is_purely_syntactic() {
        assert_eq!(extract_owner("/tmp/uploads/summary.csv"), "/tmp/uploads/summary");
        assert_eq!(extract_owner("a/b.xlsx"), "a/b");
        assert_eq!(extract_owner("/tmp/uploads/CLIENT Priya CLIENT-ID 1.xlsx"), "Priya");
    }

    #[test]
    fn test_extract_owner_pipe_breaks_marker() {
        // `|` cannot be part of a name, so the marker does not match
        assert_eq!(extract_owner("CLIENT A|B CLIENT-ID.csv"), "CLIENT A|B CLIENT-ID");
    }
}
