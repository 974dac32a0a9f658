const UNNAMED: &str = "unnamed";

fn is_separator(c: char) -> bool {
    c.is_whitespace()
        || c.is_control()
        || matches!(c, '_' | '(' | ')' | '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|')
}

/// Turn a display name into a directory name.
///
/// Parentheses and path-illegal characters act as word breaks, so
/// `"Jean Tremblay (Chicoutimi)"` becomes `"Jean_Tremblay_Chicoutimi"`.
/// Output never contains separators, so applying it twice is a no-op.
pub fn sanitize_name(name: &str) -> String {
    let joined = name
        .split(is_separator)
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("_");

    let trimmed = joined.trim_matches(|c| c == '_' || c == '.');
    if trimmed.is_empty() {
        UNNAMED.to_string()
    } else {
        trimmed.to_string()
    }
}
