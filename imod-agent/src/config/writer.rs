// src/config/writer.rs

//! Renders the marker-delimited config block and splices it into the
//! startup script.
//!
//! A file that already carries [`VERSION_MARKER`] and both block markers is
//! updated in place: only the bytes from the start marker through the line
//! break after the end marker change. Anything else is rewritten from
//! [`SCRIPT_TEMPLATE`].

use crate::config::model::ImodConfig;
use crate::config::parser::{
    GLOBAL_HCSPARAMS_VAR, GLOBAL_INTERVAL_VAR, GLOBAL_RTSOFF_VAR, USER_DATA_VAR, format_u32,
};
use std::path::Path;

pub const BLOCK_BEGIN_MARKER: &str = "$imodSettingsBegin = $true";
pub const BLOCK_END_MARKER: &str = "$imodSettingsEnd = $true";
pub const VERSION_MARKER: &str = "$imodScriptVersion = 11";

pub const BLOCK_TOKEN: &str = "{{IMOD_CONFIG_BLOCK}}";
pub const AGENT_TOKEN: &str = "{{IMOD_AGENT_PATH}}";

const NEWLINE: &str = "\r\n";

/// Startup launcher. Runs the agent against this very file, elevating first
/// when the logon session is not already elevated.
pub const SCRIPT_TEMPLATE: &str = r#"param(
    [switch]$verbose
)

$imodScriptVersion = 11

{{IMOD_CONFIG_BLOCK}}
$imodAgent = {{IMOD_AGENT_PATH}}
if (-not (Test-Path -LiteralPath $imodAgent -PathType Leaf)) {
    Write-Host "IMOD failed: agent not found at $imodAgent"
    exit 1
}

$agentArgs = @('apply', '--config', $PSCommandPath)
if ($verbose) {
    $agentArgs += '--verbose'
}

$identity = [Security.Principal.WindowsIdentity]::GetCurrent()
$principal = New-Object Security.Principal.WindowsPrincipal($identity)
if (-not $principal.IsInRole([Security.Principal.WindowsBuiltInRole]::Administrator)) {
    $quotedArgs = $agentArgs | ForEach-Object { '"{0}"' -f $_ }
    Start-Process -FilePath $imodAgent -ArgumentList $quotedArgs -Verb RunAs -WindowStyle Hidden | Out-Null
    exit 0
}

& $imodAgent @agentArgs
exit $LASTEXITCODE
"#;

/// Single-quoted PowerShell literal.
pub fn ps_quote(text: &str) -> String {
    format!("'{}'", text.replace('\'', "''"))
}

/// Marker-delimited block for `config`. Every line, including the end
/// marker, is CRLF terminated.
pub fn render_block(config: &ImodConfig, driver_path: &Path) -> String {
    let mut lines = vec![
        BLOCK_BEGIN_MARKER.to_string(),
        format!("$winioPath = {}", ps_quote(&driver_path.to_string_lossy())),
        format!("{GLOBAL_INTERVAL_VAR} = {}", format_u32(config.global_interval)),
        format!("{GLOBAL_HCSPARAMS_VAR} = {}", format_u32(config.global_hcsparams_offset)),
        format!("{GLOBAL_RTSOFF_VAR} = {}", format_u32(config.global_rtsoff)),
        format!("{USER_DATA_VAR} = @{{"),
    ];

    for entry in config.overrides.iter().filter(|e| !e.hwid.trim().is_empty()) {
        lines.push(format!("    \"{}\" = @{{", entry.hwid.trim().replace('"', "")));
        if let Some(enabled) = entry.enabled {
            lines.push(format!("        \"ENABLED\" = {}", if enabled { "$true" } else { "$false" }));
        }
        if let Some(v) = entry.interval {
            lines.push(format!("        \"INTERVAL\" = {}", format_u32(v)));
        }
        if let Some(v) = entry.hcsparams_offset {
            lines.push(format!("        \"HCSPARAMS_OFFSET\" = {}", format_u32(v)));
        }
        if let Some(v) = entry.rtsoff {
            lines.push(format!("        \"RTSOFF\" = {}", format_u32(v)));
        }
        lines.push("    }".to_string());
    }

    lines.push("}".to_string());
    lines.push(BLOCK_END_MARKER.to_string());

    let mut block = lines.join(NEWLINE);
    block.push_str(NEWLINE);
    block
}

/// Fresh script text from [`SCRIPT_TEMPLATE`].
pub fn render_script(block: &str, agent_path: &Path) -> String {
    let agent = ps_quote(&agent_path.to_string_lossy());
    let mut out = String::with_capacity(SCRIPT_TEMPLATE.len() + block.len());
    for line in SCRIPT_TEMPLATE.lines() {
        if line.trim() == BLOCK_TOKEN {
            out.push_str(block);
        } else {
            out.push_str(&line.replace(AGENT_TOKEN, &agent));
            out.push_str(NEWLINE);
        }
    }
    out
}

/// Swap the existing block in `existing` for `block`.
///
/// Works on raw bytes so everything outside the block, including a BOM or
/// non-ASCII text the user added, is kept as is. Returns `None` when
/// `existing` lacks the version marker or a complete begin/end pair.
pub fn replace_block(existing: &[u8], block: &str) -> Option<Vec<u8>> {
    find(existing, VERSION_MARKER.as_bytes())?;
    let start = find(existing, BLOCK_BEGIN_MARKER.as_bytes())?;
    let end_marker = start + find(&existing[start..], BLOCK_END_MARKER.as_bytes())?;
    let after_marker = end_marker + BLOCK_END_MARKER.len();
    let end = match existing[after_marker..].iter().position(|b| *b == b'\n') {
        Some(pos) => after_marker + pos + 1,
        None => existing.len(),
    };

    let mut out = Vec::with_capacity(existing.len() + block.len());
    out.extend_from_slice(&existing[..start]);
    out.extend_from_slice(block.as_bytes());
    out.extend_from_slice(&existing[end..]);
    Some(out)
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Replace anything outside 7-bit ASCII with `?`.
pub fn to_ascii_lossy(text: &str) -> String {
    text.chars().map(|c| if c.is_ascii() { c } else { '?' }).collect()
}
