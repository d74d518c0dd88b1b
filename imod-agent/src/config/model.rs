// src/config/model.rs

//! In-memory IMOD configuration: global register defaults plus an ordered
//! list of per-device overrides matched by hardware-id substring.

/// Compiled-in interrupt moderation interval (in 250 ns units).
pub const DEFAULT_INTERVAL: u32 = 0xC8;
/// Compiled-in offset of HCSPARAMS1 from the capability base.
pub const DEFAULT_HCSPARAMS_OFFSET: u32 = 0x4;
/// Compiled-in offset of RTSOFF from the capability base.
pub const DEFAULT_RTSOFF: u32 = 0x18;

/// One `"HWID" = @{ ... }` record. Unset fields inherit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OverrideEntry {
    pub hwid: String,
    pub interval: Option<u32>,
    pub hcsparams_offset: Option<u32>,
    pub rtsoff: Option<u32>,
    pub enabled: Option<bool>,
}

impl OverrideEntry {
    pub fn new(hwid: impl Into<String>) -> Self {
        Self { hwid: hwid.into(), ..Self::default() }
    }

    /// Case-insensitive containment of `hwid` in `device_id`. Blank entries
    /// never match.
    pub fn matches(&self, device_id: &str) -> bool {
        let needle = self.hwid.trim();
        !needle.is_empty() && device_id.to_uppercase().contains(&needle.to_uppercase())
    }

    fn carries_values(&self) -> bool {
        self.interval.is_some() || self.hcsparams_offset.is_some() || self.rtsoff.is_some()
    }

    fn is_explicitly_disabled(&self) -> bool {
        self.enabled == Some(false)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImodConfig {
    pub global_interval: u32,
    pub global_hcsparams_offset: u32,
    pub global_rtsoff: u32,
    pub overrides: Vec<OverrideEntry>,
    /// Set when the config was loaded from an existing startup artifact.
    pub has_persisted_script: bool,
}

impl Default for ImodConfig {
    fn default() -> Self {
        Self {
            global_interval: DEFAULT_INTERVAL,
            global_hcsparams_offset: DEFAULT_HCSPARAMS_OFFSET,
            global_rtsoff: DEFAULT_RTSOFF,
            overrides: Vec::new(),
            has_persisted_script: false,
        }
    }
}

/// Values the engine programs for one controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EffectiveSettings {
    pub interval: u32,
    pub hcsparams_offset: u32,
    pub rtsoff: u32,
    pub enabled: bool,
}

impl ImodConfig {
    /// Merge every matching override over the globals.
    ///
    /// Matches are applied in declaration order and each field is taken from
    /// the last match that sets it, so two partial overrides combine.
    pub fn effective_for(&self, device_id: &str) -> EffectiveSettings {
        let mut settings = EffectiveSettings {
            interval: self.global_interval,
            hcsparams_offset: self.global_hcsparams_offset,
            rtsoff: self.global_rtsoff,
            enabled: true,
        };
        for entry in self.overrides.iter().filter(|e| e.matches(device_id)) {
            if let Some(v) = entry.interval {
                settings.interval = v;
            }
            if let Some(v) = entry.hcsparams_offset {
                settings.hcsparams_offset = v;
            }
            if let Some(v) = entry.rtsoff {
                settings.rtsoff = v;
            }
            if let Some(v) = entry.enabled {
                settings.enabled = v;
            }
        }
        settings
    }

    fn globals_differ(&self) -> bool {
        self.global_interval != DEFAULT_INTERVAL
            || self.global_hcsparams_offset != DEFAULT_HCSPARAMS_OFFSET
            || self.global_rtsoff != DEFAULT_RTSOFF
    }

    /// True when applying this config could change anything, or when a
    /// startup artifact already exists and must be honoured.
    pub fn has_active_config(&self) -> bool {
        if self.has_persisted_script || self.globals_differ() {
            return true;
        }
        self.overrides
            .iter()
            .filter(|e| !e.hwid.trim().is_empty() && !e.is_explicitly_disabled())
            .any(|e| e.carries_values() || e.enabled == Some(true))
    }

    /// True only when the effective values diverge from the compiled-in
    /// defaults. Decides whether a startup artifact is kept on disk.
    pub fn has_non_default_config(&self) -> bool {
        if self.globals_differ() {
            return true;
        }
        self.overrides
            .iter()
            .filter(|e| !e.hwid.trim().is_empty())
            .any(|e| {
                e.is_explicitly_disabled()
                    || e.interval.is_some_and(|v| v != DEFAULT_INTERVAL)
                    || e.hcsparams_offset.is_some_and(|v| v != DEFAULT_HCSPARAMS_OFFSET)
                    || e.rtsoff.is_some_and(|v| v != DEFAULT_RTSOFF)
            })
    }

    /// Existing override for `hwid`, or a new one appended at the end.
    pub fn override_entry(&mut self, hwid: &str) -> &mut OverrideEntry {
        let hwid = hwid.trim();
        let index = match self.overrides.iter().position(|e| e.hwid.eq_ignore_ascii_case(hwid)) {
            Some(i) => i,
            None => {
                self.overrides.push(OverrideEntry::new(hwid));
                self.overrides.len() - 1
            }
        };
        &mut self.overrides[index]
    }

    /// Drop the override for `hwid`. Returns whether one was removed.
    pub fn remove_override(&mut self, hwid: &str) -> bool {
        let before = self.overrides.len();
        self.overrides.retain(|e| !e.hwid.eq_ignore_ascii_case(hwid.trim()));
        self.overrides.len() != before
    }

    /// Restore compiled-in globals and clear all overrides.
    pub fn reset(&mut self) {
        let has_persisted_script = self.has_persisted_script;
        *self = Self { has_persisted_script, ..Self::default() };
    }
}

/// Short override key for a PCI instance id: the `DEV_XXXX` token, or the
/// whole id when there is none.
///
/// `PCI\VEN_8086&DEV_A36D&SUBSYS_...\3&11583659&0&A0` gives `DEV_A36D`.
pub fn override_key_for(instance_id: &str) -> String {
    let upper = instance_id.to_uppercase();
    if let Some(start) = upper.find("DEV_") {
        let token: String = upper[start..]
            .chars()
            .take_while(|c| *c != '&' && *c != '\\')
            .collect();
        if token.len() > "DEV_".len() {
            return token;
        }
    }
    instance_id.trim().to_string()
}
