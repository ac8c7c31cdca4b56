//! Java-style properties files
//!
//! `key=value`, `key: value` or `key value` per line. Lines starting with `#`
//! or `!` are comments. A trailing backslash continues the value on the next
//! line.

use std::collections::BTreeMap;

pub fn parse_properties(content: &str) -> BTreeMap<String, String> {
    let mut properties = BTreeMap::new();
    let mut pending = String::new();

    for raw in content.lines() {
        let line = raw.trim_start();

        if pending.is_empty() && (line.is_empty() || line.starts_with('#') || line.starts_with('!'))
        {
            continue;
        }

        if let Some(continued) = line.strip_suffix('\\') {
            pending.push_str(continued);
            continue;
        }
        pending.push_str(line);

        let (key, value) = split_entry(&pending);
        if !key.is_empty() {
            properties.insert(key.to_string(), value.to_string());
        }
        pending.clear();
    }

    if !pending.is_empty() {
        let (key, value) = split_entry(&pending);
        if !key.is_empty() {
            properties.insert(key.to_string(), value.to_string());
        }
    }

    properties
}

fn split_entry(entry: &str) -> (&str, &str) {
    let Some(end) = entry.find(['=', ':', ' ', '\t']) else {
        return (entry.trim(), "");
    };

    let key = &entry[..end];
    let mut rest = entry[end..].trim_start();
    if let Some(stripped) = rest.strip_prefix(['=', ':']) {
        rest = stripped.trim_start();
    }
    (key, rest.trim_end())
}
