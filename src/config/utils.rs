use std::str::FromStr;

/// Split a comma separated list, dropping blank entries
///
/// `"a, b,,c "` becomes `["a", "b", "c"]`.
pub fn parse_list(s: &str) -> Vec<String> {
    s.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

/// Parse a numeric environment value, naming the variable on failure
pub fn parse_number<T>(name: &str, value: &str) -> Result<T, String>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse::<T>()
        .map_err(|e| format!("Invalid {name} environment variable: {e}"))
}
