pub mod actas;
pub mod discover;
pub mod export;
pub mod init;
pub mod validate;

/// Split a comma-separated option into trimmed, non-empty items.
pub fn split_list(s: &str) -> Vec<String> {
    s.split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}
