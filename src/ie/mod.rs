// SPDX-License-Identifier: MIT

mod vendor;

pub(crate) use self::vendor::{
    extract_p2p_payload, extract_wfd_payload, extract_wsc_payload,
    is_default_sae_group_vendor, is_dpp_configurator_connectivity, is_osen,
    is_wfa_subtype, is_wpa, parse_hs20_indication, parse_network_cost,
    parse_owe_transition, P2pAttributes, WFA_SUBTYPE_HS20_INDICATION,
    WFA_SUBTYPE_OWE_TRANSITION,
};

use netlink_packet_core::DecodeError;

// Element IDs defined in IEEE 802.11-2020, 9.4.2.1 Table 9-92
pub(crate) const IE_TYPE_SSID: u8 = 0;
pub(crate) const IE_TYPE_SUPPORTED_RATES: u8 = 1;
pub(crate) const IE_TYPE_COUNTRY: u8 = 7;
pub(crate) const IE_TYPE_BSS_LOAD: u8 = 11;
pub(crate) const IE_TYPE_HT_CAPABILITIES: u8 = 45;
pub(crate) const IE_TYPE_RSN: u8 = 48;
pub(crate) const IE_TYPE_EXT_SUPPORTED_RATES: u8 = 50;
pub(crate) const IE_TYPE_MOBILITY_DOMAIN: u8 = 54;
pub(crate) const IE_TYPE_RM_ENABLED_CAPABILITIES: u8 = 70;
pub(crate) const IE_TYPE_INTERWORKING: u8 = 107;
pub(crate) const IE_TYPE_ADVERTISEMENT_PROTOCOL: u8 = 108;
pub(crate) const IE_TYPE_ROAMING_CONSORTIUM: u8 = 111;
pub(crate) const IE_TYPE_EXTENDED_CAPABILITIES: u8 = 127;
pub(crate) const IE_TYPE_VHT_CAPABILITIES: u8 = 191;
pub(crate) const IE_TYPE_VENDOR_SPECIFIC: u8 = 221;
pub(crate) const IE_TYPE_RSNX: u8 = 244;

// Advertisement protocol IDs, IEEE 802.11-2020 Table 9-215
const IE_ADVERTISEMENT_ANQP: u8 = 0;
const IE_ADVERTISEMENT_MIH_SERVICE: u8 = 1;
const IE_ADVERTISEMENT_MIH_DISCOVERY: u8 = 2;
const IE_ADVERTISEMENT_EAS: u8 = 3;
const IE_ADVERTISEMENT_RLQP: u8 = 4;
const IE_ADVERTISEMENT_VENDOR_SPECIFIC: u8 = 221;

/// One information element, borrowing from the frame body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Ie<'a> {
    pub tag: u8,
    /// Element payload, header stripped
    pub data: &'a [u8],
    raw: &'a [u8],
}

impl Ie<'_> {
    /// The element including its tag and length bytes.
    pub(crate) fn to_raw(self) -> Vec<u8> {
        self.raw.to_vec()
    }
}

/// Iterator over an 802.11 element list.
///
/// Total over arbitrary input: a truncated element yields one `Err` and the
/// iterator fuses. Nothing is allocated while iterating.
#[derive(Debug, Clone)]
pub(crate) struct IeIterator<'a> {
    buf: &'a [u8],
    offset: usize,
    failed: bool,
}

impl<'a> IeIterator<'a> {
    pub(crate) fn new(buf: &'a [u8]) -> Self {
        Self {
            buf,
            offset: 0,
            failed: false,
        }
    }
}

impl<'a> Iterator for IeIterator<'a> {
    type Item = Result<Ie<'a>, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.offset >= self.buf.len() {
            return None;
        }
        if self.offset + 2 > self.buf.len() {
            self.failed = true;
            return Some(Err(DecodeError::from(format!(
                "truncated element header at offset {}",
                self.offset
            ))));
        }
        let tag = self.buf[self.offset];
        let len = self.buf[self.offset + 1] as usize;
        let end = self.offset + 2 + len;
        if end > self.buf.len() {
            self.failed = true;
            return Some(Err(DecodeError::from(format!(
                "element {tag} at offset {} truncated: \
                 length {len} exceeds buffer",
                self.offset
            ))));
        }
        let ie = Ie {
            tag,
            data: &self.buf[self.offset + 2..end],
            raw: &self.buf[self.offset..end],
        };
        self.offset = end;
        Some(Ok(ie))
    }
}

/// BSS Load element: station count (2), channel utilization (1),
/// admission capacity (2).
pub(crate) fn parse_bss_load(data: &[u8]) -> Option<u8> {
    if data.len() != 5 {
        return None;
    }
    Some(data[2])
}

/// Walks the Advertisement Protocol element looking for the ANQP protocol
/// ID, which may be buried behind other advertisement tuples.
pub(crate) fn advertisement_protocol_has_anqp(data: &[u8]) -> bool {
    let mut offset = 0;

    // Tuples are (query response info, advertisement protocol id); a
    // vendor-specific id is followed by a full vendor element.
    while offset + 2 <= data.len() {
        match data[offset + 1] {
            IE_ADVERTISEMENT_ANQP => return true,
            IE_ADVERTISEMENT_MIH_SERVICE
            | IE_ADVERTISEMENT_MIH_DISCOVERY
            | IE_ADVERTISEMENT_EAS
            | IE_ADVERTISEMENT_RLQP => offset += 2,
            IE_ADVERTISEMENT_VENDOR_SPECIFIC => {
                let Some(len) = data.get(offset + 2) else {
                    return false;
                };
                offset += 3 + *len as usize;
            }
            _ => return false,
        }
    }

    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iterates_well_formed_elements() {
        let buf = [0x00, 0x03, b'f', b'o', b'o', 0x2d, 0x00, 0xdd, 0x01, 0xaa];
        let ies: Vec<_> =
            IeIterator::new(&buf).collect::<Result<_, _>>().unwrap();
        assert_eq!(ies.len(), 3);
        assert_eq!(ies[0].tag, IE_TYPE_SSID);
        assert_eq!(ies[0].data, b"foo");
        assert_eq!(ies[0].to_raw(), vec![0x00, 0x03, b'f', b'o', b'o']);
        assert_eq!(ies[1].tag, IE_TYPE_HT_CAPABILITIES);
        assert_eq!(ies[1].data, &[] as &[u8]);
        assert_eq!(ies[2].tag, IE_TYPE_VENDOR_SPECIFIC);
    }

    #[test]
    fn refuses_truncated_payload() {
        let buf = [0x00, 0x05, b'f', b'o', b'o'];
        let mut iter = IeIterator::new(&buf);
        assert!(iter.next().unwrap().is_err());
        assert!(iter.next().is_none());
    }

    #[test]
    fn refuses_truncated_header() {
        let buf = [0x00, 0x01, b'x', 0x30];
        let mut iter = IeIterator::new(&buf);
        assert!(iter.next().unwrap().is_ok());
        assert!(iter.next().unwrap().is_err());
        assert!(iter.next().is_none());
    }

    #[test]
    fn empty_input_yields_nothing() {
        assert!(IeIterator::new(&[]).next().is_none());
    }

    #[test]
    fn bss_load_requires_exact_length() {
        assert_eq!(parse_bss_load(&[0x01, 0x00, 0xc8, 0x00, 0x00]), Some(200));
        assert_eq!(parse_bss_load(&[0x01, 0x00, 0xc8]), None);
    }

    #[test]
    fn anqp_found_behind_other_tuples() {
        // MIH service tuple, then vendor tuple, then ANQP
        let data = [
            0x00,
            IE_ADVERTISEMENT_MIH_SERVICE,
            0x00,
            IE_ADVERTISEMENT_VENDOR_SPECIFIC,
            0x02,
            0xaa,
            0xbb,
            0x00,
            IE_ADVERTISEMENT_ANQP,
        ];
        assert!(advertisement_protocol_has_anqp(&data));
        assert!(!advertisement_protocol_has_anqp(&data[..7]));
    }

    #[test]
    fn unknown_advertisement_id_stops_the_walk() {
        assert!(!advertisement_protocol_has_anqp(&[0x00, 0x77]));
    }
}
