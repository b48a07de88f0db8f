// SPDX-License-Identifier: MIT

use crate::FrequencySet;

/// Everything a caller can vary about one scan request.
///
/// The zero value is a plain broadcast scan of every supported channel.
#[derive(Debug, Default, Clone)]
pub struct ScanParameters {
    /// Channels to visit; `None` scans all supported channels
    pub freqs: Option<FrequencySet>,
    /// Probe for one specific SSID instead of the hidden-network sweep
    pub ssid: Option<Vec<u8>>,
    /// Extra element(s) for the probe request, appended after the ones the
    /// scan core builds itself
    pub extra_ie: Vec<u8>,
    /// Ask the kernel to drop cached results before scanning
    pub flush: bool,
    /// Randomize the source MAC if the radio supports it and the
    /// configuration does not forbid it
    pub randomize_mac_addr_hint: bool,
    /// Fixed source MAC for the probe requests
    pub source_mac: Option<[u8; 6]>,
    /// Strip the 802.11b CCK rates from the advertised rate set
    pub no_cck_rates: bool,
    /// Per-channel dwell time in TUs
    pub duration: Option<u16>,
    /// Fail instead of shortening the dwell time
    pub duration_mandatory: bool,
}
