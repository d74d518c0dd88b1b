// src/config/parser.rs

//! Line-oriented reader for the IMOD config file.
//!
//! The format is a PowerShell fragment, but only a handful of assignments
//! are understood; everything else is skipped so that newer files still
//! load:
//!
//! ```text
//! $globalInterval = 0xC8
//! $globalHCSPARAMSOffset = 0x4
//! $globalRTSOFF = 0x18
//! $userDefinedData = @{
//!     "DEV_A36D" = @{
//!         "ENABLED" = $true
//!         "INTERVAL" = 0x10
//!     }
//! }
//! ```

use crate::config::model::{DEFAULT_INTERVAL, ImodConfig, OverrideEntry};

pub const GLOBAL_INTERVAL_VAR: &str = "$globalInterval";
pub const GLOBAL_HCSPARAMS_VAR: &str = "$globalHCSPARAMSOffset";
pub const GLOBAL_RTSOFF_VAR: &str = "$globalRTSOFF";
pub const USER_DATA_VAR: &str = "$userDefinedData";

/// Where the reader currently is inside the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Globals,
    Overrides,
    Device(usize),
}

/// Parse a decimal or `0x`-prefixed hexadecimal 32-bit value.
pub fn parse_u32(text: &str) -> Option<u32> {
    let text = text.trim();
    match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) if !hex.is_empty() && !hex.starts_with('+') => u32::from_str_radix(hex, 16).ok(),
        Some(_) => None,
        None => text.parse().ok(),
    }
}

/// Canonical `0x` upper-case hex rendering used in written files.
pub fn format_u32(value: u32) -> String {
    format!("0x{value:X}")
}

/// Accepts `$true`/`$false`, `true`/`false` (any case) or a number.
pub fn parse_bool(text: &str) -> Option<bool> {
    let text = text.trim();
    let word = text.strip_prefix('$').unwrap_or(text);
    if word.eq_ignore_ascii_case("true") {
        Some(true)
    } else if word.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        parse_u32(text).map(|v| v != 0)
    }
}

/// Parse config text. Never fails: unknown lines are ignored and a zero
/// global interval is coerced back to the default.
pub fn parse(text: &str) -> ImodConfig {
    let mut cfg = ImodConfig::default();
    let mut section = Section::Globals;

    for raw in text.lines() {
        let line = strip_comment(raw.trim_start_matches('\u{feff}')).trim();
        if line.is_empty() {
            continue;
        }

        if let Some(v) = scalar_assignment(line, GLOBAL_INTERVAL_VAR) {
            cfg.global_interval = v;
            continue;
        }
        if let Some(v) = scalar_assignment(line, GLOBAL_HCSPARAMS_VAR) {
            cfg.global_hcsparams_offset = v;
            continue;
        }
        if let Some(v) = scalar_assignment(line, GLOBAL_RTSOFF_VAR) {
            cfg.global_rtsoff = v;
            continue;
        }

        if starts_with_ignore_case(line, USER_DATA_VAR) {
            let compact: String = line.chars().filter(|c| !c.is_whitespace()).collect();
            section = if compact.contains("@{}") { Section::Globals } else { Section::Overrides };
            continue;
        }

        section = match section {
            Section::Globals => Section::Globals,
            Section::Overrides => open_device(line, &mut cfg.overrides),
            Section::Device(index) => {
                let (pairs, closed) = scan_pairs(line);
                for (key, value) in pairs {
                    apply_field(&mut cfg.overrides[index], &key, value);
                }
                if closed { Section::Overrides } else { Section::Device(index) }
            }
        };
    }

    if cfg.global_interval == 0 {
        cfg.global_interval = DEFAULT_INTERVAL;
    }
    cfg
}

/// Handle a line seen while inside `$userDefinedData`.
fn open_device(line: &str, overrides: &mut Vec<OverrideEntry>) -> Section {
    if line.starts_with('}') {
        return Section::Globals;
    }
    let Some((hwid, rest)) = quoted(line) else {
        return Section::Overrides;
    };
    let hwid = hwid.trim();
    if hwid.is_empty() {
        return Section::Overrides;
    }

    overrides.push(OverrideEntry::new(hwid));
    let index = overrides.len() - 1;

    // Single-line form: "HWID" = @{ "INTERVAL" = 0x10 }
    match rest.find("@{") {
        Some(pos) => {
            let (pairs, closed) = scan_pairs(&rest[pos + 2..]);
            for (key, value) in pairs {
                apply_field(&mut overrides[index], &key, value);
            }
            if closed { Section::Overrides } else { Section::Device(index) }
        }
        None => Section::Device(index),
    }
}

fn apply_field(entry: &mut OverrideEntry, key: &str, value: &str) {
    let key = key.trim().to_uppercase();
    if let Some(v) = parse_u32(value) {
        match key.as_str() {
            "INTERVAL" => entry.interval = Some(v),
            "HCSPARAMS_OFFSET" | "HCSPARAPS_OFFSET" => entry.hcsparams_offset = Some(v),
            "RTSOFF" => entry.rtsoff = Some(v),
            "ENABLED" => entry.enabled = Some(v != 0),
            _ => {}
        }
    } else if key == "ENABLED" {
        if let Some(b) = parse_bool(value) {
            entry.enabled = Some(b);
        }
    }
}

/// `NAME = value` where NAME matches ignoring case.
fn scalar_assignment(line: &str, name: &str) -> Option<u32> {
    if !starts_with_ignore_case(line, name) {
        return None;
    }
    let value = line[name.len()..].trim_start().strip_prefix('=')?;
    parse_u32(value)
}

fn starts_with_ignore_case(line: &str, prefix: &str) -> bool {
    line.len() >= prefix.len()
        && line.is_char_boundary(prefix.len())
        && line[..prefix.len()].eq_ignore_ascii_case(prefix)
}

fn strip_comment(line: &str) -> &str {
    match line.find(['#', ';']) {
        Some(pos) => &line[..pos],
        None => line,
    }
}

/// Contents of the first double-quoted string and whatever follows it.
fn quoted(text: &str) -> Option<(&str, &str)> {
    let start = text.find('"')? + 1;
    let len = text[start..].find('"')?;
    Some((&text[start..start + len], &text[start + len + 1..]))
}

/// Read `"KEY" = VALUE` pairs until the text runs out or a `}` closes the
/// block. Returns the pairs and whether the block was closed.
fn scan_pairs(mut text: &str) -> (Vec<(String, &str)>, bool) {
    let mut pairs = Vec::new();
    loop {
        text = text.trim_start();
        if text.starts_with('}') {
            return (pairs, true);
        }
        if !text.starts_with('"') {
            return (pairs, false);
        }
        let Some((key, rest)) = quoted(text) else {
            return (pairs, false);
        };
        let Some(rest) = rest.trim_start().strip_prefix('=') else {
            return (pairs, false);
        };
        let rest = rest.trim_start();
        let end = rest
            .find(|c: char| c.is_whitespace() || c == '}' || c == '"')
            .unwrap_or(rest.len());
        pairs.push((key.to_string(), &rest[..end]));
        text = &rest[end..];
    }
}
