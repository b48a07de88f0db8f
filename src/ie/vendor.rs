// SPDX-License-Identifier: MIT

use std::collections::BTreeSet;

use netlink_packet_core::DecodeError;

use crate::{
    bytes::{get_bit, parse_u16_le},
    OweTransition,
};

use super::{IeIterator, IE_TYPE_VENDOR_SPECIFIC};

const MICROSOFT_OUI: [u8; 3] = [0x00, 0x50, 0xf2];
const WIFI_ALLIANCE_OUI: [u8; 3] = [0x50, 0x6f, 0x9a];

const MICROSOFT_SUBTYPE_WPA: u8 = 0x01;
const MICROSOFT_SUBTYPE_WSC: u8 = 0x04;
const MICROSOFT_SUBTYPE_NETWORK_COST: u8 = 0x11;

pub(crate) const WFA_SUBTYPE_P2P: u8 = 0x09;
pub(crate) const WFA_SUBTYPE_WFD: u8 = 0x0a;
pub(crate) const WFA_SUBTYPE_HS20_INDICATION: u8 = 0x10;
pub(crate) const WFA_SUBTYPE_OSEN: u8 = 0x12;
pub(crate) const WFA_SUBTYPE_OWE_TRANSITION: u8 = 0x1c;
pub(crate) const WFA_SUBTYPE_DPP_CONFIGURATOR_CONNECTIVITY: u8 = 0x1e;

// Units carrying this vendor element only complete SAE with the default
// group; the connection path uses the hint to skip group negotiation.
const DEFAULT_SAE_GROUP_VENDOR_IE: [u8; 4] = [0x00, 0x0c, 0xe7, 0x08];

/// `data` is a vendor element payload: OUI, subtype, then vendor bytes.
pub(crate) fn is_wpa(data: &[u8]) -> bool {
    data.len() >= 4
        && data[..3] == MICROSOFT_OUI
        && data[3] == MICROSOFT_SUBTYPE_WPA
}

pub(crate) fn is_wfa_subtype(data: &[u8], subtype: u8) -> bool {
    data.len() >= 4 && data[..3] == WIFI_ALLIANCE_OUI && data[3] == subtype
}

pub(crate) fn is_osen(data: &[u8]) -> bool {
    is_wfa_subtype(data, WFA_SUBTYPE_OSEN)
}

pub(crate) fn is_dpp_configurator_connectivity(data: &[u8]) -> bool {
    is_wfa_subtype(data, WFA_SUBTYPE_DPP_CONFIGURATOR_CONNECTIVITY)
}

pub(crate) fn is_default_sae_group_vendor(data: &[u8]) -> bool {
    data == DEFAULT_SAE_GROUP_VENDOR_IE
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Hs20Indication {
    pub dgaf_disable: bool,
    pub version: u8,
}

/// Hotspot 2.0 Indication element: OUI, subtype, then the indication byte.
/// Bit 0 is DGAF disabled, bits 4..8 the release number.
pub(crate) fn parse_hs20_indication(
    data: &[u8],
) -> Result<Hs20Indication, DecodeError> {
    if !is_wfa_subtype(data, WFA_SUBTYPE_HS20_INDICATION) || data.len() < 5 {
        return Err(DecodeError::from(format!(
            "Invalid HS20 indication element {data:?}"
        )));
    }
    let indication = data[4];
    Ok(Hs20Indication {
        dgaf_disable: get_bit(&[indication], 0),
        version: (indication >> 4) & 0x0f,
    })
}

/// OWE Transition Mode element: OUI, subtype, BSSID, SSID length, SSID,
/// optionally followed by operating class and channel.
pub(crate) fn parse_owe_transition(
    data: &[u8],
) -> Result<OweTransition, DecodeError> {
    let err = || {
        DecodeError::from(format!("Invalid OWE transition element {data:?}"))
    };

    if !is_wfa_subtype(data, WFA_SUBTYPE_OWE_TRANSITION) || data.len() < 11 {
        return Err(err());
    }

    let mut bssid = [0u8; 6];
    bssid.copy_from_slice(&data[4..10]);

    let ssid_len = data[10] as usize;
    if ssid_len > 32 || data.len() < 11 + ssid_len {
        return Err(err());
    }
    let ssid = data[11..11 + ssid_len].to_vec();

    let band_info = match data.len() - (11 + ssid_len) {
        0 => None,
        2 => Some((data[11 + ssid_len], data[12 + ssid_len])),
        _ => return Err(err()),
    };

    Ok(OweTransition {
        bssid,
        ssid,
        band_info,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct NetworkCost {
    pub level: u16,
    pub flags: u16,
}

/// Microsoft Network Cost element: OUI, subtype 0x11, cost level (le16),
/// cost flags (le16).
pub(crate) fn parse_network_cost(data: &[u8]) -> Option<NetworkCost> {
    if data.len() != 8
        || data[..3] != MICROSOFT_OUI
        || data[3] != MICROSOFT_SUBTYPE_NETWORK_COST
    {
        return None;
    }
    Some(NetworkCost {
        level: parse_u16_le(&data[4..6])?,
        flags: parse_u16_le(&data[6..8])?,
    })
}

/// Concatenates the payloads of every matching vendor element, headers and
/// OUI/subtype stripped. WSC and similar blobs may span several elements.
fn extract_vendor_payload(
    ies: &[u8],
    oui: &[u8; 3],
    subtype: u8,
) -> Option<Vec<u8>> {
    let mut payload: Option<Vec<u8>> = None;

    for ie in IeIterator::new(ies).flatten() {
        if ie.tag != IE_TYPE_VENDOR_SPECIFIC
            || ie.data.len() < 4
            || ie.data[..3] != oui[..]
            || ie.data[3] != subtype
        {
            continue;
        }
        payload.get_or_insert_with(Vec::new).extend(&ie.data[4..]);
    }

    payload
}

pub(crate) fn extract_wsc_payload(ies: &[u8]) -> Option<Vec<u8>> {
    extract_vendor_payload(ies, &MICROSOFT_OUI, MICROSOFT_SUBTYPE_WSC)
}

pub(crate) fn extract_wfd_payload(ies: &[u8]) -> Option<Vec<u8>> {
    extract_vendor_payload(ies, &WIFI_ALLIANCE_OUI, WFA_SUBTYPE_WFD)
}

pub(crate) fn extract_p2p_payload(ies: &[u8]) -> Option<Vec<u8>> {
    extract_vendor_payload(ies, &WIFI_ALLIANCE_OUI, WFA_SUBTYPE_P2P)
}

const P2P_ATTR_CAPABILITY: u8 = 2;
const P2P_ATTR_DEVICE_ID: u8 = 3;
const P2P_ATTR_LISTEN_CHANNEL: u8 = 6;
const P2P_ATTR_DEVICE_INFO: u8 = 13;

/// The set of attribute IDs present in a P2P payload. Beacon and Probe
/// Response P2P payloads have mutually incompatible mandatory attributes,
/// which lets the BSS builder second-guess the frame subtype.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub(crate) struct P2pAttributes(BTreeSet<u8>);

impl P2pAttributes {
    /// Walks the (id, le16 length, value) attribute list. Truncation is a
    /// hard error since the payload was reassembled from validated elements.
    pub(crate) fn parse(payload: &[u8]) -> Result<Self, DecodeError> {
        let mut ids = BTreeSet::new();
        let mut offset = 0;

        while offset < payload.len() {
            if offset + 3 > payload.len() {
                return Err(DecodeError::from(format!(
                    "truncated P2P attribute header at offset {offset}"
                )));
            }
            let id = payload[offset];
            let len =
                parse_u16_le(&payload[offset + 1..offset + 3]).unwrap_or(0)
                    as usize;
            if offset + 3 + len > payload.len() {
                return Err(DecodeError::from(format!(
                    "P2P attribute {id} at offset {offset} truncated"
                )));
            }
            ids.insert(id);
            offset += 3 + len;
        }

        Ok(Self(ids))
    }

    pub(crate) fn looks_like_beacon(&self) -> bool {
        self.0.contains(&P2P_ATTR_CAPABILITY)
            && self.0.contains(&P2P_ATTR_DEVICE_ID)
            && !self.0.contains(&P2P_ATTR_DEVICE_INFO)
    }

    pub(crate) fn looks_like_probe_response(&self) -> bool {
        self.0.contains(&P2P_ATTR_CAPABILITY)
            && self.0.contains(&P2P_ATTR_DEVICE_INFO)
    }

    pub(crate) fn looks_like_probe_request(&self) -> bool {
        self.0.contains(&P2P_ATTR_CAPABILITY)
            && self.0.contains(&P2P_ATTR_LISTEN_CHANNEL)
    }
}
