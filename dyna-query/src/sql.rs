//! SQL identifier helpers.

/// Escape a string for use in SQL (for identifiers, not values).
pub fn escape_identifier(name: &str) -> String {
    let escaped = name.replace('"', "\"\"");
    format!("\"{}\"", escaped)
}

/// Check if an identifier needs quoting.
pub fn needs_quoting(name: &str) -> bool {
    let reserved = [
        "user", "order", "group", "select", "from", "where", "table", "index", "key", "primary",
        "foreign", "check", "default", "null", "not", "and", "or", "in", "is", "like", "between",
        "case", "when", "then", "else", "end", "as", "on", "join", "left", "right", "inner",
        "outer", "cross", "natural", "using", "limit", "offset", "union", "all", "distinct",
        "having", "create", "alter", "drop", "insert", "update", "delete", "into", "values", "set",
    ];

    if reserved.contains(&name.to_lowercase().as_str()) {
        return true;
    }

    !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Quote an identifier if needed.
pub fn quote_identifier(name: &str) -> String {
    if needs_quoting(name) {
        escape_identifier(name)
    } else {
        name.to_string()
    }
}

/// Apply a table prefix and quote the result for interpolation into a
/// FROM or JOIN clause.
pub fn prefix_table(prefix: &str, table: &str) -> String {
    quote_identifier(&format!("{}{}", prefix, table))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_identifier() {
        assert_eq!(quote_identifier("books"), "books");
        assert_eq!(quote_identifier("order"), "\"order\"");
        assert_eq!(quote_identifier("odd\"name"), "\"odd\"\"name\"");
    }

    #[test]
    fn test_prefix_table() {
        assert_eq!(prefix_table("", "authors"), "authors");
        assert_eq!(prefix_table("app_", "authors"), "app_authors");
        assert_eq!(prefix_table("", "user"), "\"user\"");
    }
}
