//! # Legacy Filename List
//!
//! The `current-files` endpoint reports committed identifiers as one
//! pipe-delimited string with a trailing delimiter: `"a.png|b.jpg|"`.
//! Older admin pages parse this format, so it is kept alongside the
//! structured list.

/// Field separator.
pub const DELIMITER: char = '|';

/// Encode names as `name|name|...|`. An empty list encodes to `""`.
pub fn encode_filenames<I, S>(names: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out = String::new();
    for name in names {
        out.push_str(name.as_ref());
        out.push(DELIMITER);
    }
    out
}

/// Split a pipe-delimited string, dropping empty segments.
///
/// Tolerates a missing trailing delimiter and doubled delimiters.
pub fn parse_filenames(s: &str) -> Vec<String> {
    s.split(DELIMITER)
        .filter(|part| !part.is_empty())
        .map(str::to_string)
        .collect()
}
