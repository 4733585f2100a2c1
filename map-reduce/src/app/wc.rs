use std::path::Path;

use crate::KeyValue;

/// Emits `(word, "1")` for every run of alphabetic characters.
pub fn map(_filename: &Path, contents: &str) -> Vec<KeyValue> {
    contents
        .split(|c: char| !c.is_alphabetic())
        .filter(|w| !w.is_empty())
        .map(|w| KeyValue::new(w, "1"))
        .collect()
}

pub fn reduce(_key: &str, values: &[String]) -> String {
    values.len().to_string()
}
