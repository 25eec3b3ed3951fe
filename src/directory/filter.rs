//! Search filter construction

/// Matches every person entry under a search root
pub const PERSON_FILTER: &str = "(objectClass=person)";

/// Escape a filter assertion value per RFC 4515.
pub fn escape_filter_value(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => escaped.push_str("\\5c"),
            '*' => escaped.push_str("\\2a"),
            '(' => escaped.push_str("\\28"),
            ')' => escaped.push_str("\\29"),
            '\0' => escaped.push_str("\\00"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// `(&(objectClass=person)(<attribute>=<username>))`
pub fn user_filter(attribute: &str, username: &str) -> String {
    format!(
        "(&{}({}={}))",
        PERSON_FILTER,
        attribute,
        escape_filter_value(username)
    )
}
