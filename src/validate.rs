//! Input validation for configured identifiers.
//!
//! Project keys end up inside JQL and database ids inside Notion URLs, so
//! both are checked once at load time rather than failing mid-cycle.
//! Errors carry the original input and an optional suggestion.

use std::collections::HashSet;
use std::sync::LazyLock;

/// JQL keywords that cannot be used unquoted as a project key.
pub static JQL_RESERVED: LazyLock<HashSet<&str>> = LazyLock::new(|| {
    [
        "AND", "OR", "NOT", "EMPTY", "NULL", "ORDER", "BY", "ASC", "DESC", "IN", "IS", "WAS",
        "CHANGED", "FROM", "TO", "ON", "DURING", "BEFORE", "AFTER",
    ]
    .into_iter()
    .collect()
});

/// Validate a Jira project key and return its canonical (uppercase) form.
///
/// Keys start with a letter and contain only letters, digits and underscores.
pub fn normalize_project_key(input: &str) -> Result<String, (String, Option<String>)> {
    let upper = input.trim().to_uppercase();

    let mut chars = upper.chars();
    let starts_with_letter = chars.next().is_some_and(|c| c.is_ascii_alphabetic());
    let rest_valid = chars.all(|c| c.is_ascii_alphanumeric() || c == '_');

    if !starts_with_letter || !rest_valid {
        let cleaned: String = upper
            .chars()
            .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
            .skip_while(|c| !c.is_ascii_alphabetic())
            .collect();
        let suggestion = (!cleaned.is_empty() && cleaned != upper).then_some(cleaned);
        return Err((input.to_string(), suggestion));
    }

    if JQL_RESERVED.contains(upper.as_str()) {
        return Err((
            input.to_string(),
            Some(format!("'{upper}' is a reserved JQL word")),
        ));
    }

    Ok(upper)
}

/// Validate a Notion database id and return it in dashed 8-4-4-4-12 form.
///
/// Accepts the bare 32-hex form, the dashed form, and a full database URL
/// (the id is the trailing 32 hex characters of the last path segment).
pub fn normalize_database_id(input: &str) -> Result<String, (String, Option<String>)> {
    let trimmed = input.trim();
    let segment = trimmed
        .split(['?', '#'])
        .next()
        .unwrap_or(trimmed)
        .rsplit('/')
        .next()
        .unwrap_or(trimmed);

    let hex: String = segment.chars().filter(|c| *c != '-').collect();
    let hex = if hex.len() > 32 {
        hex[hex.len() - 32..].to_string()
    } else {
        hex
    };

    if hex.len() != 32 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err((
            input.to_string(),
            Some("Expected 32 hex characters, e.g. 0123456789abcdef0123456789abcdef".to_string()),
        ));
    }

    let hex = hex.to_lowercase();
    Ok(format!(
        "{}-{}-{}-{}-{}",
        &hex[0..8],
        &hex[8..12],
        &hex[12..16],
        &hex[16..20],
        &hex[20..32]
    ))
}

// ── Levenshtein distance ─────────────────────────────────────

/// Compute the Levenshtein edit distance between two strings.
pub fn levenshtein_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();

    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    // Single-row optimization
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];

    for i in 1..=a.len() {
        curr[0] = i;
        for j in 1..=b.len() {
            let cost = usize::from(a[i - 1] != b[j - 1]);
            curr[j] = (prev[j] + 1).min(curr[j - 1] + 1).min(prev[j - 1] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b.len()]
}

/// Find configured project keys similar to the one asked for.
///
/// Returns up to `max` suggestions with edit distance ≤ 2,
/// sorted by distance then alphabetically.
pub fn find_similar_keys(searched: &str, existing: &[String], max: usize) -> Vec<String> {
    let searched = searched.to_uppercase();
    let mut candidates: Vec<(usize, &str)> = existing
        .iter()
        .map(|key| (levenshtein_distance(&searched, key), key.as_str()))
        .filter(|(dist, _)| *dist <= 2)
        .collect();

    candidates.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(b.1)));

    candidates
        .into_iter()
        .take(max)
        .map(|(_, key)| key.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_project_key() {
        assert_eq!(normalize_project_key("proj"), Ok("PROJ".to_string()));
        assert_eq!(normalize_project_key(" OPS_2 "), Ok("OPS_2".to_string()));
        assert!(normalize_project_key("").is_err());
        assert!(normalize_project_key("and").is_err());
    }

    #[test]
    fn test_normalize_project_key_suggests_cleanup() {
        let (input, suggestion) = normalize_project_key("PR-OJ").unwrap_err();
        assert_eq!(input, "PR-OJ");
        assert_eq!(suggestion.as_deref(), Some("PROJ"));

        let (_, suggestion) = normalize_project_key("1ABC").unwrap_err();
        assert_eq!(suggestion.as_deref(), Some("ABC"));
    }

    #[test]
    fn test_normalize_database_id_forms() {
        let dashed = "01234567-89ab-cdef-0123-456789abcdef";
        assert_eq!(
            normalize_database_id("0123456789ABCDEF0123456789abcdef"),
            Ok(dashed.to_string())
        );
        assert_eq!(normalize_database_id(dashed), Ok(dashed.to_string()));
        assert_eq!(
            normalize_database_id(
                "https://www.notion.so/acme/Issues-0123456789abcdef0123456789abcdef?v=42"
            ),
            Ok(dashed.to_string())
        );
    }

    #[test]
    fn test_normalize_database_id_rejects_garbage() {
        assert!(normalize_database_id("not-an-id").is_err());
        assert!(normalize_database_id("0123456789abcdef0123456789abcdeg").is_err());
    }

    #[test]
    fn test_levenshtein() {
        assert_eq!(levenshtein_distance("", ""), 0);
        assert_eq!(levenshtein_distance("abc", "abc"), 0);
        assert_eq!(levenshtein_distance("abc", "abd"), 1);
        assert_eq!(levenshtein_distance("kitten", "sitting"), 3);
    }

    #[test]
    fn test_find_similar_keys() {
        let keys = vec!["PROJ".to_string(), "PROD".to_string(), "OPS".to_string()];
        let result = find_similar_keys("proh", &keys, 3);
        assert_eq!(result, vec!["PROD".to_string(), "PROJ".to_string()]);
        assert!(find_similar_keys("ZZZZZZ", &keys, 3).is_empty());
    }
}
