//! Parsing of `pdftk dump_data` output.
//!
//! A dump looks like:
//!
//! ```text
//! InfoBegin
//! InfoKey: Title
//! InfoValue: Annual report
//! InfoBegin
//! InfoKey: Author
//! InfoValue: J&#252;rgen
//! PdfID0: 8b1f…
//! NumberOfPages: 12
//! ```
//!
//! Non-ASCII characters are written as numeric HTML entities.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;

static NUMBER_OF_PAGES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^NumberOfPages:\s*(\d+)\s*$").expect("valid regex"));

static ENTITY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"&(#[0-9]+|#x[0-9a-fA-F]+|amp|lt|gt|quot);").expect("valid regex"));

/// Extract `NumberOfPages` from a dump.
pub fn parse_page_count(dump: &str) -> Option<usize> {
    NUMBER_OF_PAGES
        .captures(dump)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Extract the document info dictionary from a dump.
///
/// Keys without a value, and values without a key, are dropped. A dump with
/// no info block yields an empty map.
pub fn parse_info(dump: &str) -> BTreeMap<String, String> {
    let mut info = BTreeMap::new();
    let mut key: Option<String> = None;

    for line in dump.lines() {
        if line == "InfoBegin" {
            key = None;
        } else if let Some(k) = line.strip_prefix("InfoKey:") {
            key = Some(decode_entities(k.trim()));
        } else if let Some(v) = line.strip_prefix("InfoValue:") {
            if let Some(k) = key.take() {
                info.insert(k, decode_entities(v.trim()));
            }
        }
    }

    info
}

fn decode_entities(s: &str) -> String {
    ENTITY
        .replace_all(s, |caps: &regex::Captures<'_>| {
            let body = &caps[1];
            let decoded = match body {
                "amp" => Some('&'),
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                _ => {
                    let code = match body.strip_prefix("#x") {
                        Some(hex) => u32::from_str_radix(hex, 16).ok(),
                        None => body[1..].parse().ok(),
                    };
                    code.and_then(char::from_u32)
                }
            };
            decoded.map_or_else(|| caps[0].to_string(), String::from)
        })
        .into_owned()
}
