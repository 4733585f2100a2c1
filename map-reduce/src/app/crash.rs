//! An application whose map and reduce randomly kill or stall the worker.
//!
//! Output depends only on the input, so a job run with crashing workers must
//! match a job run without them, provided the coordinator reassigns the
//! abandoned tasks.

use std::path::Path;
use std::process;
use std::thread;
use std::time::Duration;

use log::warn;
use rand::Rng;

use crate::KeyValue;

fn maybe_crash() {
    let mut rng = rand::thread_rng();
    let roll: u32 = rng.gen_range(0..1000);
    if roll < 330 {
        warn!("crashing on purpose");
        process::exit(1);
    } else if roll < 660 {
        let ms = rng.gen_range(0..10_000);
        warn!("stalling for {}ms on purpose", ms);
        thread::sleep(Duration::from_millis(ms));
    }
}

pub fn map(filename: &Path, contents: &str) -> Vec<KeyValue> {
    maybe_crash();
    let name = filename.to_string_lossy();
    vec![
        KeyValue::new("a", &*name),
        KeyValue::new("b", name.len().to_string()),
        KeyValue::new("c", contents.len().to_string()),
        KeyValue::new("d", "xyzzy"),
    ]
}

pub fn reduce(_key: &str, values: &[String]) -> String {
    maybe_crash();
    let mut values = values.to_vec();
    values.sort();
    values.join(" ")
}
