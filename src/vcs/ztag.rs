//! Parser for `p4 -ztag` tagged output.
//!
//! Every field is printed as `... <key> <value>`. Records are separated by a
//! blank line, or start implicitly when a key repeats.

use std::collections::BTreeMap;

pub(crate) type Record = BTreeMap<String, String>;

pub(crate) fn parse(output: &str) -> Vec<Record> {
    let mut records = Vec::new();
    let mut current = Record::new();
    for line in output.lines() {
        let line = line.trim_end_matches('\r');
        if line.trim().is_empty() {
            if !current.is_empty() {
                records.push(std::mem::take(&mut current));
            }
            continue;
        }
        let Some(field) = line.strip_prefix("... ") else {
            continue;
        };
        let (key, value) = field.split_once(' ').unwrap_or((field, ""));
        if current.contains_key(key) {
            records.push(std::mem::take(&mut current));
        }
        current.insert(key.to_string(), value.to_string());
    }
    if !current.is_empty() {
        records.push(current);
    }
    records
}
