//! Dotted full names (`Flow.Sequence.Display`) used as stable handles for
//! nodes. A literal `.` inside a name is written as `\.`.

/// Escapes dots (and the escape character) in a single name segment
pub fn escape_name(name: &str) -> String {
    let mut result = String::with_capacity(name.len());
    for c in name.chars() {
        if c == '.' || c == '\\' {
            result.push('\\');
        }
        result.push(c);
    }
    result
}

/// Joins name segments from root to node into a full name
pub fn join_full_name<I, S>(names: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    names
        .into_iter()
        .map(|name| escape_name(name.as_ref()))
        .collect::<Vec<_>>()
        .join(".")
}

/// Splits a full name back into its unescaped segments
pub fn split_full_name(full_name: &str) -> Vec<String> {
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut chars = full_name.chars();

    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some(next) => current.push(next),
                None => current.push('\\'),
            },
            '.' => segments.push(std::mem::take(&mut current)),
            other => current.push(other),
        }
    }
    segments.push(current);
    segments
}
