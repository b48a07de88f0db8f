// SPDX-License-Identifier: MIT

use std::cmp::Ordering;

use netlink_packet_core::DecodeError;

use crate::{
    bytes::get_bit,
    ie::{
        self, advertisement_protocol_has_anqp, parse_bss_load, IeIterator,
        P2pAttributes,
    },
    scan::Nl80211BssInfo,
    wiphy::operating_class_to_frequency,
    Nl80211BssCapabilities, WiphyInfo,
};

const SSID_MAX_SIZE: usize = 32;

/// Default channel utilization when the BSS Load element is absent.
const UTILIZATION_DEFAULT: u8 = 127;

/// Fallback peer rate when estimation fails, bits/s.
const DATA_RATE_FALLBACK: u64 = 2_000_000;

/// Which management frame subtype the reported elements came from.
///
/// The kernel only hints at this, and for beacons the guess is refined from
/// the P2P payload signature; nothing safety-critical may depend on it.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum BssSource {
    #[default]
    Beacon,
    ProbeResponse,
    ProbeRequest,
}

/// OWE transition target advertised by an open BSS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OweTransition {
    pub bssid: [u8; 6],
    pub ssid: Vec<u8>,
    /// Global operating class and channel of the paired BSS, when the
    /// element carries the optional band information.
    pub band_info: Option<(u8, u8)>,
}

impl OweTransition {
    /// The frequency the paired OWE BSS operates on, falling back to the
    /// advertising BSS's own channel when no band information was given.
    pub(crate) fn frequency(&self, own_frequency: u32) -> u32 {
        self.band_info
            .and_then(|(oper_class, channel)| {
                operating_class_to_frequency(oper_class, channel)
            })
            .unwrap_or(own_frequency)
    }
}

/// One observed basic service set.
///
/// Raw retained elements (`rsne`, `rsnxe`, `wpa`, `osen`,
/// `roaming_consortium`) keep their two header bytes so downstream parsers
/// see the element exactly as it appeared in the frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Bss {
    pub bssid: [u8; 6],
    /// MHz
    pub frequency: u32,
    pub capability: Nl80211BssCapabilities,
    /// Signed milli-dBm
    pub signal_mbm: i32,
    /// Up to 32 bytes; empty when the network is hidden
    pub ssid: Vec<u8>,
    /// Channel utilization, 0..=255
    pub utilization: u8,
    /// Estimated achievable rate, bits/s
    pub data_rate: u64,
    pub rank: u16,
    pub source_frame: BssSource,
    /// Microseconds on the monotonic clock when the BSS was last seen
    pub time_stamp_us: u64,
    /// TSF of the scan that found this BSS, from the trigger notification
    pub start_tsf: u64,
    pub parent_tsf: u64,

    pub rsne: Option<Vec<u8>>,
    pub rsnxe: Option<Vec<u8>>,
    pub wpa: Option<Vec<u8>>,
    pub osen: Option<Vec<u8>>,
    pub wsc: Option<Vec<u8>>,
    pub roaming_consortium: Option<Vec<u8>>,
    pub wfd: Option<Vec<u8>>,
    pub owe_transition: Option<OweTransition>,
    pub p2p_beacon: Option<Vec<u8>>,
    pub p2p_probe_response: Option<Vec<u8>>,
    pub p2p_probe_request: Option<Vec<u8>>,
    pub hs20_version: u8,
    pub hessid: Option<[u8; 6]>,
    pub mobility_domain: Option<[u8; 3]>,
    pub country_code: Option<[u8; 3]>,
    pub cost_level: Option<u16>,
    pub cost_flags: Option<u16>,

    pub anqp_capable: bool,
    pub ht_capable: bool,
    pub vht_capable: bool,
    pub proxy_arp: bool,
    pub cap_rm_neighbor_report: bool,
    pub hs20_capable: bool,
    pub hs20_dgaf_disable: bool,
    pub dpp_configurator: bool,
    pub force_default_sae_group: bool,
}

/// Maps the unit-less 0..=100 strength a few legacy drivers report onto the
/// mBm scale. Not real mBm, but the best available for those drivers.
fn signal_unspec_to_mbm(strength: u8) -> i32 {
    if strength > 100 {
        log::warn!("signal strength {strength} out of range");
        return 0;
    }
    i32::from(strength) * 100 - 10000
}

impl Bss {
    fn empty() -> Self {
        Self {
            utilization: UTILIZATION_DEFAULT,
            data_rate: DATA_RATE_FALLBACK,
            ..Default::default()
        }
    }

    /// Builds a BSS record from the nested attributes of one `GET_SCAN`
    /// dump entry. Returns `None` for malformed records, which are dropped
    /// silently apart from a debug line.
    pub(crate) fn from_scan_result(
        attrs: &[Nl80211BssInfo],
        wiphy: &dyn WiphyInfo,
        scan_time_us: u64,
    ) -> Option<Self> {
        let mut bss = Self::empty();
        let mut ies: Option<&[u8]> = None;
        let mut beacon_ies: Option<&[u8]> = None;
        let mut seen_ms_ago = 0u32;

        for attr in attrs {
            match attr {
                Nl80211BssInfo::Bssid(addr) => bss.bssid = *addr,
                Nl80211BssInfo::Capability(capability) => {
                    bss.capability = *capability
                }
                Nl80211BssInfo::Frequency(freq) => bss.frequency = *freq,
                Nl80211BssInfo::SignalMbm(mbm) => bss.signal_mbm = *mbm,
                Nl80211BssInfo::SignalUnspec(strength) => {
                    bss.signal_mbm = signal_unspec_to_mbm(*strength)
                }
                Nl80211BssInfo::InformationElements(data) => {
                    ies = Some(data.as_slice())
                }
                Nl80211BssInfo::BeaconInformationElements(data) => {
                    beacon_ies = Some(data.as_slice())
                }
                Nl80211BssInfo::ParentTsf(tsf) => bss.parent_tsf = *tsf,
                Nl80211BssInfo::ProbeResponseData => {
                    bss.source_frame = BssSource::ProbeResponse
                }
                Nl80211BssInfo::SeenMsAgo(ms) => seen_ms_ago = *ms,
                Nl80211BssInfo::LastSeenBootTime(ns) => {
                    bss.time_stamp_us = ns / 1000
                }
                _ => (),
            }
        }

        // Per the hints in nl80211.h (enum nl80211_bss): elements that
        // differ from the known beacon contents come from a probe response.
        if bss.source_frame == BssSource::Beacon {
            if let Some(ies) = ies {
                if beacon_ies.map_or(true, |beacon| beacon != ies) {
                    bss.source_frame = BssSource::ProbeResponse;
                }
            }
        }

        if bss.time_stamp_us == 0 {
            bss.time_stamp_us = scan_time_us
                .saturating_sub(u64::from(seen_ms_ago) * 1000);
        }

        if let Some(ies) = ies {
            if let Err(e) = bss.parse_information_elements(ies) {
                log::debug!(
                    "dropping BSS {:02x?} with malformed elements: {e}",
                    bss.bssid
                );
                return None;
            }

            if let Some(rate) = wiphy.estimate_data_rate(ies, &bss) {
                bss.data_rate = rate;
            }
        }

        Some(bss)
    }

    /// Builds a BSS record from a received probe request body. Used by the
    /// P2P side of the daemon where our interface is the one being probed.
    pub fn from_probe_request(
        addr: [u8; 6],
        frequency: u32,
        signal_mbm: i32,
        body: &[u8],
    ) -> Option<Self> {
        let mut bss = Self::empty();
        bss.bssid = addr;
        bss.frequency = frequency;
        bss.signal_mbm = signal_mbm;
        bss.source_frame = BssSource::ProbeRequest;

        bss.parse_information_elements(body).ok()?;
        Some(bss)
    }

    /// Walks the element list and fills in every derived field. An error
    /// means the record must be rejected; nothing is retained on that path.
    fn parse_information_elements(
        &mut self,
        ies: &[u8],
    ) -> Result<(), DecodeError> {
        let mut have_ssid = false;

        for item in IeIterator::new(ies) {
            let element = item?;
            match element.tag {
                ie::IE_TYPE_SSID => {
                    if element.data.len() > SSID_MAX_SIZE {
                        return Err(DecodeError::from(format!(
                            "SSID length {} exceeds maximum",
                            element.data.len()
                        )));
                    }
                    self.ssid = element.data.to_vec();
                    have_ssid = true;
                }
                ie::IE_TYPE_RSN => {
                    if self.rsne.is_none() {
                        self.rsne = Some(element.to_raw());
                    }
                }
                ie::IE_TYPE_RSNX => {
                    if self.rsnxe.is_none() {
                        self.rsnxe = Some(element.to_raw());
                    }
                }
                ie::IE_TYPE_BSS_LOAD => match parse_bss_load(element.data) {
                    Some(utilization) => self.utilization = utilization,
                    None => log::warn!(
                        "unable to parse BSS Load element for {:02x?}",
                        self.bssid
                    ),
                },
                ie::IE_TYPE_VENDOR_SPECIFIC => {
                    self.parse_vendor_element(element.data)
                }
                ie::IE_TYPE_MOBILITY_DOMAIN => {
                    if self.mobility_domain.is_none()
                        && element.data.len() == 3
                    {
                        self.mobility_domain = Some([
                            element.data[0],
                            element.data[1],
                            element.data[2],
                        ]);
                    }
                }
                ie::IE_TYPE_RM_ENABLED_CAPABILITIES => {
                    if element.data.len() != 5 {
                        continue;
                    }

                    // Only interested in Neighbor Reports
                    self.cap_rm_neighbor_report = get_bit(element.data, 1);
                }
                ie::IE_TYPE_COUNTRY => {
                    if self.country_code.is_some() || element.data.len() < 6 {
                        continue;
                    }
                    self.country_code = Some([
                        element.data[0],
                        element.data[1],
                        element.data[2],
                    ]);
                }
                ie::IE_TYPE_HT_CAPABILITIES => self.ht_capable = true,
                ie::IE_TYPE_VHT_CAPABILITIES => self.vht_capable = true,
                ie::IE_TYPE_ADVERTISEMENT_PROTOCOL => {
                    if element.data.len() < 2 {
                        return Err(DecodeError::from(
                            "short advertisement protocol element",
                        ));
                    }
                    if advertisement_protocol_has_anqp(element.data) {
                        self.anqp_capable = true;
                    }
                }
                ie::IE_TYPE_INTERWORKING => {
                    // No bits say whether venue/HESSID are included, the
                    // length is the only indication (802.11-2016 Fig 9-439)
                    let hessid_offset = match element.data.len() {
                        9 => Some(3),
                        7 => Some(1),
                        _ => None,
                    };
                    if let Some(offset) = hessid_offset {
                        let mut hessid = [0u8; 6];
                        hessid
                            .copy_from_slice(&element.data[offset..offset + 6]);
                        self.hessid = Some(hessid);
                    }
                }
                ie::IE_TYPE_ROAMING_CONSORTIUM => {
                    if element.data.len() < 2 {
                        return Err(DecodeError::from(
                            "short roaming consortium element",
                        ));
                    }
                    self.roaming_consortium = Some(element.to_raw());
                }
                ie::IE_TYPE_EXTENDED_CAPABILITIES => {
                    // Bits past the received length read as zero
                    self.proxy_arp = get_bit(element.data, 12);
                }
                _ => (),
            }
        }

        if !have_ssid {
            return Err(DecodeError::from("no SSID element"));
        }

        self.wsc = ie::extract_wsc_payload(ies);
        self.parse_p2p_payload(ies)?;
        self.wfd = ie::extract_wfd_payload(ies);

        Ok(())
    }

    fn parse_vendor_element(&mut self, data: &[u8]) {
        if self.wpa.is_none() && ie::is_wpa(data) {
            self.wpa = Some(raw_vendor_element(data));
            return;
        }

        if self.osen.is_none() && ie::is_osen(data) {
            self.osen = Some(raw_vendor_element(data));
            return;
        }

        if ie::is_wfa_subtype(data, ie::WFA_SUBTYPE_HS20_INDICATION) {
            if let Ok(indication) = ie::parse_hs20_indication(data) {
                self.hs20_dgaf_disable = indication.dgaf_disable;
                self.hs20_version = indication.version;
                self.hs20_capable = true;
            }
            return;
        }

        if ie::is_wfa_subtype(data, ie::WFA_SUBTYPE_OWE_TRANSITION) {
            let Ok(owe) = ie::parse_owe_transition(data) else {
                return;
            };

            // A band info that maps to no known frequency is useless
            if let Some((oper_class, channel)) = owe.band_info {
                if operating_class_to_frequency(oper_class, channel).is_none()
                {
                    return;
                }
            }

            self.owe_transition = Some(owe);
            return;
        }

        if ie::is_dpp_configurator_connectivity(data) {
            self.dpp_configurator = true;
        }

        if let Some(cost) = ie::parse_network_cost(data) {
            self.cost_level = Some(cost.level);
            self.cost_flags = Some(cost.flags);
            return;
        }

        if ie::is_default_sae_group_vendor(data) {
            self.force_default_sae_group = true;
        }
    }

    /// Beacon and Probe Response P2P payload formats are incompatible, so a
    /// successful parse of one refines `source_frame` when the driver did
    /// not expose enough information.
    fn parse_p2p_payload(&mut self, ies: &[u8]) -> Result<(), DecodeError> {
        let Some(payload) = ie::extract_p2p_payload(ies) else {
            return Ok(());
        };

        let attrs = P2pAttributes::parse(&payload)?;

        match self.source_frame {
            BssSource::ProbeResponse => {
                if attrs.looks_like_probe_response() {
                    self.p2p_probe_response = Some(payload);
                }
            }
            BssSource::ProbeRequest => {
                if attrs.looks_like_probe_request() {
                    self.p2p_probe_request = Some(payload);
                }
            }
            BssSource::Beacon => {
                if attrs.looks_like_beacon() {
                    self.p2p_beacon = Some(payload);
                } else if attrs.looks_like_probe_response() {
                    self.source_frame = BssSource::ProbeResponse;
                    self.p2p_probe_response = Some(payload);
                }
            }
        }

        Ok(())
    }

    /// Security element selection: RSN takes priority over WPA over OSEN.
    pub fn preferred_security_ie(&self) -> Option<&[u8]> {
        self.rsne
            .as_deref()
            .or(self.wpa.as_deref())
            .or(self.osen.as_deref())
    }

    /// A zero-length SSID, or one of all zero bytes, marks a hidden network.
    pub fn has_hidden_ssid(&self) -> bool {
        self.ssid.iter().all(|b| *b == 0)
    }

    pub(crate) fn compute_rank(&mut self, rank_5g_factor: f64) {
        const RANK_HIGH_UTILIZATION_FACTOR: f64 = 0.8;
        const RANK_LOW_UTILIZATION_FACTOR: f64 = 1.2;
        // Maximum rate is 2340Mbps (VHT)
        const MAX_RATE: f64 = 2_340_000_000.0;

        let mut rank =
            self.data_rate as f64 / MAX_RATE * f64::from(u16::MAX);

        // Prefer 5G networks over 2.4G
        if self.frequency > 4000 {
            rank *= rank_5g_factor;
        }

        // Rank loaded APs lower and lightly loaded APs higher
        if self.utilization >= 192 {
            rank *= RANK_HIGH_UTILIZATION_FACTOR;
        } else if self.utilization <= 63 {
            rank *= RANK_LOW_UTILIZATION_FACTOR;
        }

        self.rank = if rank >= f64::from(u16::MAX) {
            u16::MAX
        } else {
            rank as u16
        };
    }

    /// Total order used for result lists: rank first, then signal strength.
    pub fn compare_rank(&self, other: &Bss) -> Ordering {
        self.rank
            .cmp(&other.rank)
            .then(self.signal_mbm.cmp(&other.signal_mbm))
    }
}

/// Rebuilds `tag | len | payload` for a vendor element payload.
fn raw_vendor_element(data: &[u8]) -> Vec<u8> {
    let mut raw = Vec::with_capacity(data.len() + 2);
    raw.push(ie::IE_TYPE_VENDOR_SPECIFIC);
    raw.push(data.len() as u8);
    raw.extend(data);
    raw
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Wiphy;

    fn element(tag: u8, data: &[u8]) -> Vec<u8> {
        let mut out = vec![tag, data.len() as u8];
        out.extend(data);
        out
    }

    fn bss_with_ies(ies: &[u8]) -> Result<Bss, DecodeError> {
        let mut bss = Bss::empty();
        bss.parse_information_elements(ies)?;
        Ok(bss)
    }

    #[test]
    fn parses_a_typical_beacon_body() {
        let mut ies = element(ie::IE_TYPE_SSID, b"corp");
        ies.extend(element(ie::IE_TYPE_BSS_LOAD, &[1, 0, 200, 0, 0]));
        ies.extend(element(ie::IE_TYPE_HT_CAPABILITIES, &[0; 26]));
        ies.extend(element(ie::IE_TYPE_MOBILITY_DOMAIN, &[0xab, 0xcd, 0x01]));
        ies.extend(element(ie::IE_TYPE_COUNTRY, b"DE \x01\x0d\x14"));
        ies.extend(element(ie::IE_TYPE_RSN, &[0x01, 0x00]));
        ies.extend(element(ie::IE_TYPE_RSN, &[0x02, 0x00]));

        let bss = bss_with_ies(&ies).unwrap();
        assert_eq!(bss.ssid, b"corp");
        assert_eq!(bss.utilization, 200);
        assert!(bss.ht_capable);
        assert!(!bss.vht_capable);
        assert_eq!(bss.mobility_domain, Some([0xab, 0xcd, 0x01]));
        assert_eq!(bss.country_code, Some(*b"DE "));
        // First RSN element wins, header retained
        assert_eq!(bss.rsne.unwrap(), vec![48, 2, 0x01, 0x00]);
    }

    #[test]
    fn rejects_oversized_ssid() {
        let ies = element(ie::IE_TYPE_SSID, &[b'x'; 33]);
        assert!(bss_with_ies(&ies).is_err());
    }

    #[test]
    fn rejects_missing_ssid() {
        let ies = element(ie::IE_TYPE_HT_CAPABILITIES, &[0; 26]);
        assert!(bss_with_ies(&ies).is_err());
    }

    #[test]
    fn short_extended_capabilities_read_as_zero() {
        let mut ies = element(ie::IE_TYPE_SSID, b"x");
        ies.extend(element(ie::IE_TYPE_EXTENDED_CAPABILITIES, &[0xff]));
        let bss = bss_with_ies(&ies).unwrap();
        assert!(!bss.proxy_arp);

        let mut ies = element(ie::IE_TYPE_SSID, b"x");
        ies.extend(element(
            ie::IE_TYPE_EXTENDED_CAPABILITIES,
            &[0x00, 0x10],
        ));
        let bss = bss_with_ies(&ies).unwrap();
        assert!(bss.proxy_arp);
    }

    #[test]
    fn interworking_hessid_position_follows_length() {
        let mut ies = element(ie::IE_TYPE_SSID, b"x");
        ies.extend(element(
            ie::IE_TYPE_INTERWORKING,
            &[0x00, 1, 2, 3, 4, 5, 6],
        ));
        let bss = bss_with_ies(&ies).unwrap();
        assert_eq!(bss.hessid, Some([1, 2, 3, 4, 5, 6]));

        let mut ies = element(ie::IE_TYPE_SSID, b"x");
        ies.extend(element(
            ie::IE_TYPE_INTERWORKING,
            &[0x00, 0xaa, 0xbb, 1, 2, 3, 4, 5, 6],
        ));
        let bss = bss_with_ies(&ies).unwrap();
        assert_eq!(bss.hessid, Some([1, 2, 3, 4, 5, 6]));
    }

    #[test]
    fn hidden_ssid_forms() {
        let mut bss = Bss::empty();
        assert!(bss.has_hidden_ssid());
        bss.ssid = vec![0, 0, 0, 0];
        assert!(bss.has_hidden_ssid());
        bss.ssid = b"net".to_vec();
        assert!(!bss.has_hidden_ssid());
    }

    #[test]
    fn rank_is_deterministic_and_saturates() {
        let mut bss = Bss::empty();
        bss.data_rate = 866_000_000;
        bss.frequency = 5200;
        bss.utilization = 10;
        bss.compute_rank(1.2);
        let first = bss.rank;
        bss.compute_rank(1.2);
        assert_eq!(bss.rank, first);

        bss.data_rate = u64::MAX;
        bss.compute_rank(1.2);
        assert_eq!(bss.rank, u16::MAX);
    }

    #[test]
    fn five_ghz_outranks_two_ghz_with_band_modifier() {
        let mut a = Bss::empty();
        a.data_rate = 866_000_000;
        a.frequency = 5200;
        a.utilization = 10;
        a.compute_rank(1.2);

        let mut b = a.clone();
        b.frequency = 2437;
        b.compute_rank(1.2);

        assert!(a.rank > b.rank);
        assert_eq!(a.compare_rank(&b), Ordering::Greater);
    }

    #[test]
    fn signal_breaks_rank_ties() {
        let mut a = Bss::empty();
        a.signal_mbm = -4000;
        let mut b = Bss::empty();
        b.signal_mbm = -7500;
        assert_eq!(a.compare_rank(&b), Ordering::Greater);
    }

    #[test]
    fn unspec_signal_is_mapped_to_mbm() {
        assert_eq!(signal_unspec_to_mbm(0), -10000);
        assert_eq!(signal_unspec_to_mbm(55), -4500);
        assert_eq!(signal_unspec_to_mbm(100), 0);
        assert_eq!(signal_unspec_to_mbm(101), 0);
    }

    #[test]
    fn beacon_with_probe_response_p2p_signature_is_reclassified() {
        let mut ies = element(ie::IE_TYPE_SSID, b"DIRECT-xy");
        let mut p2p = vec![0x50, 0x6f, 0x9a, 0x09];
        // capability + device info attributes
        p2p.extend([2, 2, 0, 0x25, 0x00, 13, 1, 0, 0xaa]);
        ies.extend(element(ie::IE_TYPE_VENDOR_SPECIFIC, &p2p));

        let bss = bss_with_ies(&ies).unwrap();
        assert_eq!(bss.source_frame, BssSource::ProbeResponse);
        assert!(bss.p2p_probe_response.is_some());
        assert!(bss.p2p_beacon.is_none());
    }

    #[test]
    fn builder_maps_signal_and_synthesizes_timestamp() {
        let wiphy = Wiphy::default();
        let attrs = vec![
            Nl80211BssInfo::Bssid([1, 2, 3, 4, 5, 6]),
            Nl80211BssInfo::Frequency(2437),
            Nl80211BssInfo::SignalUnspec(55),
            Nl80211BssInfo::SeenMsAgo(100),
            Nl80211BssInfo::InformationElements(element(
                ie::IE_TYPE_SSID,
                b"net",
            )),
        ];

        let bss =
            Bss::from_scan_result(&attrs, &wiphy, 1_000_000).unwrap();
        assert_eq!(bss.signal_mbm, -4500);
        assert_eq!(bss.time_stamp_us, 900_000);
        assert_eq!(bss.data_rate, DATA_RATE_FALLBACK);
        // No beacon elements to compare against: assume probe response
        assert_eq!(bss.source_frame, BssSource::ProbeResponse);
    }

    #[test]
    fn builder_keeps_beacon_source_when_elements_match() {
        let wiphy = Wiphy::default();
        let ies = element(ie::IE_TYPE_SSID, b"net");
        let attrs = vec![
            Nl80211BssInfo::Bssid([1, 2, 3, 4, 5, 6]),
            Nl80211BssInfo::InformationElements(ies.clone()),
            Nl80211BssInfo::BeaconInformationElements(ies),
            Nl80211BssInfo::LastSeenBootTime(5_000_000_000),
        ];

        let bss = Bss::from_scan_result(&attrs, &wiphy, 0).unwrap();
        assert_eq!(bss.source_frame, BssSource::Beacon);
        assert_eq!(bss.time_stamp_us, 5_000_000);
    }

    #[test]
    fn builder_drops_malformed_records() {
        let wiphy = Wiphy::default();
        let attrs = vec![
            Nl80211BssInfo::Bssid([1, 2, 3, 4, 5, 6]),
            Nl80211BssInfo::InformationElements(element(
                ie::IE_TYPE_SSID,
                &[0u8; 33],
            )),
        ];
        assert!(Bss::from_scan_result(&attrs, &wiphy, 0).is_none());
    }
}
