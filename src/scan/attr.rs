// SPDX-License-Identifier: MIT

use netlink_packet_core::{
    parse_u32, DecodeError, Emitable, Nla, NlasIterator, Parseable,
};

use netlink_packet_core::ErrorContext;

use crate::bytes::write_u32;

/// One SSID inside the `NL80211_ATTR_SCAN_SSIDS` nested list.
///
/// SSIDs are raw octet strings up to 32 bytes, not necessarily UTF-8. The
/// empty SSID is the wildcard that makes the kernel send a broadcast probe.
#[derive(Debug, Clone)]
pub(crate) struct Nla80211ScanSsidNla {
    index: u16,
    ssid: Vec<u8>,
}

impl Nla for Nla80211ScanSsidNla {
    fn value_len(&self) -> usize {
        self.ssid.len()
    }

    fn emit_value(&self, buffer: &mut [u8]) {
        buffer.copy_from_slice(self.ssid.as_slice())
    }

    fn kind(&self) -> u16 {
        // Kernel ignores the nested kind, `iw` counts from 1.
        self.index + 1
    }
}

#[derive(Debug, Clone)]
pub(crate) struct Nla80211ScanSsidNlas(Vec<Nla80211ScanSsidNla>);

impl std::ops::Deref for Nla80211ScanSsidNlas {
    type Target = Vec<Nla80211ScanSsidNla>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<&Vec<Vec<u8>>> for Nla80211ScanSsidNlas {
    fn from(ssids: &Vec<Vec<u8>>) -> Self {
        let mut nlas = Vec::new();
        for (i, ssid) in ssids.iter().enumerate() {
            nlas.push(Nla80211ScanSsidNla {
                index: i as u16,
                ssid: ssid.to_vec(),
            });
        }
        Self(nlas)
    }
}

impl From<Nla80211ScanSsidNlas> for Vec<Vec<u8>> {
    fn from(ssids: Nla80211ScanSsidNlas) -> Self {
        let mut ssids = ssids;
        ssids.0.drain(..).map(|c| c.ssid).collect()
    }
}

impl Nla80211ScanSsidNlas {
    pub(crate) fn parse(payload: &[u8]) -> Result<Self, DecodeError> {
        let mut ssids: Vec<Nla80211ScanSsidNla> = Vec::new();
        for (index, nla) in NlasIterator::new(payload).enumerate() {
            let error_msg = format!("Invalid NL80211_ATTR_SCAN_SSIDS: {nla:?}");
            let nla = &nla.context(error_msg)?;
            ssids.push(Nla80211ScanSsidNla {
                index: index as u16,
                ssid: nla.value().to_vec(),
            });
        }
        Ok(Self(ssids))
    }
}

bitflags::bitflags! {
    /// Scan request control flags
    // Kernel data type: enum nl80211_scan_flags
    #[derive(Debug, Default, PartialEq, Eq, Clone, Copy)]
    #[non_exhaustive]
    pub struct Nl80211ScanFlags: u32 {
        /// Scan request has low priority
        const LowPriority = 1 << 0;
        /// Flush the kernel BSS cache before scanning
        const Flush = 1 << 1;
        /// Force a scan even when beaconing as AP
        const Ap = 1 << 2;
        /// Use a random MAC address for this scan. Without an explicit
        /// [crate::Nl80211Attr::Mac]/[crate::Nl80211Attr::MacMask] pair the
        /// kernel randomizes 46 bits (locally administered 1, multicast 0).
        const RandomAddr = 1 << 3;
        /// Fill the dwell time in the FILS request parameters IE
        const FilsMaxChannelTime = 1 << 4;
        /// Accept broadcast probe responses
        const AcceptBcastProbeResp = 1 << 5;
        /// Send probe requests at a rate of at least 5.5M
        const OceProbeReqHighTxRate = 1 << 6;
        /// Allow probe request tx deferral and suppression
        const OceProbeReqDeferralSuppression = 1 << 7;
        /// Trade scan accuracy for a shorter overall scan
        const LowSpan = 1 << 8;
        /// Trade scan accuracy for lower power use
        const LowPower = 1 << 9;
        /// Maximize result completeness at latency/power cost
        const HighAccuracy = 1 << 10;
        /// Randomize the probe-request sequence number to defeat tracking
        const RandomSn = 1 << 11;
        /// Minimize probe request content to supported rates only
        const MinPreqContent = 1 << 12;
        /// Report scan results in kHz
        const FreqKhz = 1 << 13;
        /// Only actively scan 6GHz channels where colocated APs are expected
        const Colocated6Ghz = 1 << 14;
        const _ = !0;
    }
}

impl<T: AsRef<[u8]> + ?Sized> Parseable<T> for Nl80211ScanFlags {
    fn parse(buf: &T) -> Result<Self, DecodeError> {
        let buf: &[u8] = buf.as_ref();
        Ok(Self::from_bits_retain(parse_u32(buf).context(format!(
            "Invalid Nl80211ScanFlags payload {buf:?}"
        ))?))
    }
}

impl Nl80211ScanFlags {
    pub const LENGTH: usize = 4;
}

impl Emitable for Nl80211ScanFlags {
    fn buffer_len(&self) -> usize {
        Self::LENGTH
    }

    fn emit(&self, buffer: &mut [u8]) {
        buffer.copy_from_slice(&self.bits().to_ne_bytes())
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct Nla80211ScanFreqNla {
    index: u16,
    freq: u32,
}

impl Nla for Nla80211ScanFreqNla {
    fn value_len(&self) -> usize {
        4
    }

    fn emit_value(&self, buffer: &mut [u8]) {
        write_u32(buffer, self.freq)
    }

    fn kind(&self) -> u16 {
        self.index
    }
}

#[derive(Debug, Clone)]
pub(crate) struct Nla80211ScanFreqNlas(Vec<Nla80211ScanFreqNla>);

impl std::ops::Deref for Nla80211ScanFreqNlas {
    type Target = Vec<Nla80211ScanFreqNla>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<&Vec<u32>> for Nla80211ScanFreqNlas {
    fn from(freqs: &Vec<u32>) -> Self {
        let mut nlas = Vec::new();
        for (i, freq) in freqs.iter().enumerate() {
            nlas.push(Nla80211ScanFreqNla {
                index: i as u16,
                freq: *freq,
            });
        }
        Self(nlas)
    }
}

impl From<Nla80211ScanFreqNlas> for Vec<u32> {
    fn from(freqs: Nla80211ScanFreqNlas) -> Self {
        let mut freqs = freqs;
        freqs.0.drain(..).map(|c| c.freq).collect()
    }
}

impl Nla80211ScanFreqNlas {
    pub(crate) fn parse(payload: &[u8]) -> Result<Self, DecodeError> {
        let mut freqs: Vec<Nla80211ScanFreqNla> = Vec::new();
        for (index, nla) in NlasIterator::new(payload).enumerate() {
            let error_msg =
                format!("Invalid NL80211_ATTR_SCAN_FREQUENCIES: {nla:?}");
            let nla = &nla.context(error_msg.clone())?;
            let freq = parse_u32(nla.value()).context(error_msg)?;
            freqs.push(Nla80211ScanFreqNla {
                index: index as u16,
                freq,
            });
        }
        Ok(Self(freqs))
    }
}

/// Rates for one band inside the `NL80211_ATTR_SCAN_SUPP_RATES` nested
/// list, in units of 500 kbit/s. The nested kind is the kernel band index.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Nl80211BandRates {
    pub band: u16,
    pub rates: Vec<u8>,
}

impl Nla for Nl80211BandRates {
    fn value_len(&self) -> usize {
        self.rates.len()
    }

    fn emit_value(&self, buffer: &mut [u8]) {
        buffer.copy_from_slice(self.rates.as_slice())
    }

    fn kind(&self) -> u16 {
        self.band
    }
}

#[derive(Debug, Clone)]
pub(crate) struct Nla80211BandRatesNlas(Vec<Nl80211BandRates>);

impl std::ops::Deref for Nla80211BandRatesNlas {
    type Target = Vec<Nl80211BandRates>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<&Vec<Nl80211BandRates>> for Nla80211BandRatesNlas {
    fn from(rates: &Vec<Nl80211BandRates>) -> Self {
        Self(rates.to_vec())
    }
}

impl From<Nla80211BandRatesNlas> for Vec<Nl80211BandRates> {
    fn from(rates: Nla80211BandRatesNlas) -> Self {
        rates.0
    }
}

impl Nla80211BandRatesNlas {
    pub(crate) fn parse(payload: &[u8]) -> Result<Self, DecodeError> {
        let mut bands: Vec<Nl80211BandRates> = Vec::new();
        for nla in NlasIterator::new(payload) {
            let error_msg =
                format!("Invalid NL80211_ATTR_SCAN_SUPP_RATES: {nla:?}");
            let nla = &nla.context(error_msg)?;
            bands.push(Nl80211BandRates {
                band: nla.kind(),
                rates: nla.value().to_vec(),
            });
        }
        Ok(Self(bands))
    }
}
