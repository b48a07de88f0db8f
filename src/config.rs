// SPDX-License-Identifier: MIT

use std::{fs, path::Path};

use anyhow::Context;
use serde::Deserialize;

fn default_initial_periodic_scan_interval() -> u32 {
    10
}

fn default_maximum_periodic_scan_interval() -> u32 {
    300
}

fn default_band_modifier_5ghz() -> f64 {
    1.0
}

/// The `[Scan]` section of the daemon configuration file.
#[derive(Debug, Clone, Deserialize)]
pub struct ScanSection {
    /// Probe actively on every periodic scan, not only when a hidden
    /// network needs discovering
    #[serde(default, rename = "EnableActiveScanning")]
    pub enable_active_scanning: bool,

    #[serde(default, rename = "DisableMacAddressRandomization")]
    pub disable_mac_address_randomization: bool,

    #[serde(default, rename = "DisablePeriodicScan")]
    pub disable_periodic_scan: bool,

    /// Seconds between periodic scans before backoff, clamped to u16
    #[serde(
        default = "default_initial_periodic_scan_interval",
        rename = "InitialPeriodicScanInterval"
    )]
    pub initial_periodic_scan_interval: u32,

    /// Backoff ceiling in seconds, clamped to u16
    #[serde(
        default = "default_maximum_periodic_scan_interval",
        rename = "MaximumPeriodicScanInterval"
    )]
    pub maximum_periodic_scan_interval: u32,
}

impl Default for ScanSection {
    fn default() -> Self {
        Self {
            enable_active_scanning: false,
            disable_mac_address_randomization: false,
            disable_periodic_scan: false,
            initial_periodic_scan_interval:
                default_initial_periodic_scan_interval(),
            maximum_periodic_scan_interval:
                default_maximum_periodic_scan_interval(),
        }
    }
}

/// The `[Rank]` section of the daemon configuration file.
#[derive(Debug, Clone, Deserialize)]
pub struct RankSection {
    /// Multiplier applied to the rank of BSSes above 4000 MHz
    #[serde(default = "default_band_modifier_5ghz", rename = "BandModifier5Ghz")]
    pub band_modifier_5ghz: f64,
}

impl Default for RankSection {
    fn default() -> Self {
        Self {
            band_modifier_5ghz: default_band_modifier_5ghz(),
        }
    }
}

/// Daemon configuration as read from disk.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default, rename = "Scan")]
    pub scan: ScanSection,
    #[serde(default, rename = "Rank")]
    pub rank: RankSection,
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        toml::from_str(&raw)
            .with_context(|| format!("failed to parse {}", path.display()))
    }
}

/// Scan-core settings distilled from [Config], intervals clamped to the
/// u16 range the periodic backoff works in.
#[derive(Debug, Clone)]
pub struct ScanSettings {
    pub enable_active_scanning: bool,
    pub disable_mac_address_randomization: bool,
    pub disable_periodic_scan: bool,
    pub initial_periodic_scan_interval: u16,
    pub maximum_periodic_scan_interval: u16,
    pub rank_5g_factor: f64,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for ScanSettings {
    fn from(config: &Config) -> Self {
        Self {
            enable_active_scanning: config.scan.enable_active_scanning,
            disable_mac_address_randomization: config
                .scan
                .disable_mac_address_randomization,
            disable_periodic_scan: config.scan.disable_periodic_scan,
            initial_periodic_scan_interval: config
                .scan
                .initial_periodic_scan_interval
                .min(u32::from(u16::MAX))
                as u16,
            maximum_periodic_scan_interval: config
                .scan
                .maximum_periodic_scan_interval
                .min(u32::from(u16::MAX))
                as u16,
            rank_5g_factor: config.rank.band_modifier_5ghz,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_values() {
        let settings = ScanSettings::default();
        assert!(!settings.enable_active_scanning);
        assert!(!settings.disable_periodic_scan);
        assert_eq!(settings.initial_periodic_scan_interval, 10);
        assert_eq!(settings.maximum_periodic_scan_interval, 300);
        assert_eq!(settings.rank_5g_factor, 1.0);
    }

    #[test]
    fn sections_parse_with_wire_case_keys() {
        let config: Config = toml::from_str(
            r#"
            [Scan]
            EnableActiveScanning = true
            InitialPeriodicScanInterval = 90000

            [Rank]
            BandModifier5Ghz = 1.2
            "#,
        )
        .unwrap();

        let settings = ScanSettings::from(&config);
        assert!(settings.enable_active_scanning);
        // Clamped into the u16 backoff range
        assert_eq!(settings.initial_periodic_scan_interval, u16::MAX);
        assert_eq!(settings.rank_5g_factor, 1.2);
    }
}
