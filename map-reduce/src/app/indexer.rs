//! Inverted index: for every word, the documents it appears in.

use std::collections::BTreeSet;
use std::path::Path;

use crate::KeyValue;

pub fn map(document: &Path, contents: &str) -> Vec<KeyValue> {
    let name = document.to_string_lossy();
    contents
        .split(|c: char| !c.is_alphabetic())
        .filter(|w| !w.is_empty())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .map(|w| KeyValue::new(w, &*name))
        .collect()
}

/// `"<count> <doc>,<doc>,..."` with documents sorted and de-duplicated.
pub fn reduce(_key: &str, values: &[String]) -> String {
    let docs: BTreeSet<&str> = values.iter().map(String::as_str).collect();
    format!(
        "{} {}",
        docs.len(),
        docs.into_iter().collect::<Vec<_>>().join(",")
    )
}
