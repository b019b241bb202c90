//! Line-oriented `meaning-URL` import format.

/// Split one `meaning-URL` line. The first `-` separates the two halves.
///
/// Returns the trimmed meaning and URL, or the reason the line is rejected.
pub fn parse_line(line: &str) -> Result<(&str, &str), &'static str> {
    let (meaning, url) = line.split_once('-').ok_or("missing '-' separator")?;
    let (meaning, url) = (meaning.trim(), url.trim());
    if meaning.is_empty() {
        return Err("empty meaning");
    }
    if !is_well_formed_url(url) {
        return Err("invalid URL");
    }
    Ok((meaning, url))
}

/// `http(s)://` followed by a host, without whitespace.
pub fn is_well_formed_url(url: &str) -> bool {
    if url.chars().any(char::is_whitespace) {
        return false;
    }
    let lower = url.to_ascii_lowercase();
    let Some(rest) = lower.strip_prefix("https://").or_else(|| lower.strip_prefix("http://")) else {
        return false;
    };
    let host = rest.split(['/', '?', '#']).next().unwrap_or_default();
    !host.is_empty() && !host.starts_with(':') && !host.starts_with('@')
}
