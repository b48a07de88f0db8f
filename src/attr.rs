// SPDX-License-Identifier: MIT

use std::convert::TryInto;

use netlink_packet_core::ErrorContext;
use netlink_packet_core::{
    parse_u16, parse_u32, parse_u64, parse_u8, DecodeError, DefaultNla,
    Emitable, Nla, NlaBuffer, NlasIterator, Parseable,
};

use crate::{
    bytes::{write_u16, write_u32, write_u64},
    scan::{
        Nl80211BssInfo, Nl80211ScanFlags, Nla80211BandRatesNlas,
        Nla80211ScanFreqNlas, Nla80211ScanSsidNlas,
    },
    Nl80211BandRates,
};

const ETH_ALEN: usize = 6;

const NL80211_ATTR_WIPHY: u16 = 1;
const NL80211_ATTR_IFINDEX: u16 = 3;
const NL80211_ATTR_MAC: u16 = 6;
const NL80211_ATTR_IE: u16 = 42;
const NL80211_ATTR_MAX_NUM_SCAN_SSIDS: u16 = 43;
const NL80211_ATTR_SCAN_FREQUENCIES: u16 = 44;
const NL80211_ATTR_SCAN_SSIDS: u16 = 45;
const NL80211_ATTR_BSS: u16 = 47;
const NL80211_ATTR_MAX_SCAN_IE_LEN: u16 = 56;
const NL80211_ATTR_SCAN_SUPP_RATES: u16 = 125;
const NL80211_ATTR_TX_NO_CCK_RATE: u16 = 135;
const NL80211_ATTR_WDEV: u16 = 153;
const NL80211_ATTR_SCAN_FLAGS: u16 = 158;
const NL80211_ATTR_MAC_MASK: u16 = 215;
const NL80211_ATTR_SCAN_START_TIME_TSF: u16 = 233;
const NL80211_ATTR_MEASUREMENT_DURATION: u16 = 235;
const NL80211_ATTR_MEASUREMENT_DURATION_MANDATORY: u16 = 236;

/// The subset of `enum nl80211_attrs` used by scan triggers, scan dumps and
/// scan multicast notifications.
#[derive(Debug, PartialEq, Eq, Clone)]
#[non_exhaustive]
pub enum Nl80211Attr {
    Wiphy(u32),
    IfIndex(u32),
    Mac([u8; ETH_ALEN]),
    /// Extra information element(s) to append to probe request frames,
    /// already in wire format
    Ie(Vec<u8>),
    MaxNumScanSsids(u8),
    /// Frequencies to scan, MHz
    ScanFrequencies(Vec<u32>),
    /// SSIDs to probe for; an empty SSID is the broadcast wildcard.
    /// Presence of this attribute marks an active scan.
    ScanSsids(Vec<Vec<u8>>),
    Bss(Vec<Nl80211BssInfo>),
    MaxScanIeLen(u16),
    /// Rates per band allowed to be advertised in probe requests
    ScanSuppRates(Vec<Nl80211BandRates>),
    /// Flag: do not send probe requests at CCK rates
    TxNoCckRate,
    Wdev(u64),
    ScanFlags(Nl80211ScanFlags),
    /// Mask for [Self::Mac]: set bits are kept, clear bits are randomized
    MacMask([u8; ETH_ALEN]),
    /// TSF of the radio when the scan was started, microseconds
    ScanStartTimeTsf(u64),
    /// Per-channel dwell time in TUs
    MeasurementDuration(u16),
    /// Flag: fail the scan instead of shortening the dwell time
    MeasurementDurationMandatory,
    Other(DefaultNla),
}

impl Nla for Nl80211Attr {
    fn value_len(&self) -> usize {
        match self {
            Self::MaxNumScanSsids(_) => 1,
            Self::MaxScanIeLen(_) | Self::MeasurementDuration(_) => 2,
            Self::Wiphy(_) | Self::IfIndex(_) => 4,
            Self::Wdev(_) | Self::ScanStartTimeTsf(_) => 8,
            Self::Mac(_) | Self::MacMask(_) => ETH_ALEN,
            Self::Ie(v) => v.len(),
            Self::ScanFrequencies(v) => {
                Nla80211ScanFreqNlas::from(v).as_slice().buffer_len()
            }
            Self::ScanSsids(v) => {
                Nla80211ScanSsidNlas::from(v).as_slice().buffer_len()
            }
            Self::Bss(v) => v.as_slice().buffer_len(),
            Self::ScanSuppRates(v) => {
                Nla80211BandRatesNlas::from(v).as_slice().buffer_len()
            }
            Self::ScanFlags(v) => v.buffer_len(),
            Self::TxNoCckRate | Self::MeasurementDurationMandatory => 0,
            Self::Other(attr) => attr.value_len(),
        }
    }

    fn kind(&self) -> u16 {
        match self {
            Self::Wiphy(_) => NL80211_ATTR_WIPHY,
            Self::IfIndex(_) => NL80211_ATTR_IFINDEX,
            Self::Mac(_) => NL80211_ATTR_MAC,
            Self::Ie(_) => NL80211_ATTR_IE,
            Self::MaxNumScanSsids(_) => NL80211_ATTR_MAX_NUM_SCAN_SSIDS,
            Self::ScanFrequencies(_) => NL80211_ATTR_SCAN_FREQUENCIES,
            Self::ScanSsids(_) => NL80211_ATTR_SCAN_SSIDS,
            Self::Bss(_) => NL80211_ATTR_BSS,
            Self::MaxScanIeLen(_) => NL80211_ATTR_MAX_SCAN_IE_LEN,
            Self::ScanSuppRates(_) => NL80211_ATTR_SCAN_SUPP_RATES,
            Self::TxNoCckRate => NL80211_ATTR_TX_NO_CCK_RATE,
            Self::Wdev(_) => NL80211_ATTR_WDEV,
            Self::ScanFlags(_) => NL80211_ATTR_SCAN_FLAGS,
            Self::MacMask(_) => NL80211_ATTR_MAC_MASK,
            Self::ScanStartTimeTsf(_) => NL80211_ATTR_SCAN_START_TIME_TSF,
            Self::MeasurementDuration(_) => NL80211_ATTR_MEASUREMENT_DURATION,
            Self::MeasurementDurationMandatory => {
                NL80211_ATTR_MEASUREMENT_DURATION_MANDATORY
            }
            Self::Other(attr) => attr.kind(),
        }
    }

    fn emit_value(&self, buffer: &mut [u8]) {
        match self {
            Self::MaxNumScanSsids(d) => buffer[0] = *d,
            Self::MaxScanIeLen(d) | Self::MeasurementDuration(d) => {
                write_u16(buffer, *d)
            }
            Self::Wiphy(d) | Self::IfIndex(d) => write_u32(buffer, *d),
            Self::Wdev(d) | Self::ScanStartTimeTsf(d) => write_u64(buffer, *d),
            Self::Mac(s) | Self::MacMask(s) => buffer.copy_from_slice(s),
            Self::Ie(v) => buffer[..v.len()].copy_from_slice(v.as_slice()),
            Self::ScanFrequencies(v) => {
                Nla80211ScanFreqNlas::from(v).as_slice().emit(buffer)
            }
            Self::ScanSsids(v) => {
                Nla80211ScanSsidNlas::from(v).as_slice().emit(buffer)
            }
            Self::Bss(v) => v.as_slice().emit(buffer),
            Self::ScanSuppRates(v) => {
                Nla80211BandRatesNlas::from(v).as_slice().emit(buffer)
            }
            Self::ScanFlags(v) => v.emit(buffer),
            Self::TxNoCckRate | Self::MeasurementDurationMandatory => (),
            Self::Other(attr) => attr.emit_value(buffer),
        }
    }
}

impl<'a, T: AsRef<[u8]> + ?Sized> Parseable<NlaBuffer<&'a T>> for Nl80211Attr {
    fn parse(buf: &NlaBuffer<&'a T>) -> Result<Self, DecodeError> {
        let payload = buf.value();
        Ok(match buf.kind() {
            NL80211_ATTR_WIPHY => {
                let err_msg =
                    format!("Invalid NL80211_ATTR_WIPHY value {payload:?}");
                Self::Wiphy(parse_u32(payload).context(err_msg)?)
            }
            NL80211_ATTR_IFINDEX => {
                let err_msg =
                    format!("Invalid NL80211_ATTR_IFINDEX value {payload:?}");
                Self::IfIndex(parse_u32(payload).context(err_msg)?)
            }
            NL80211_ATTR_MAC => Self::Mac(payload.try_into().map_err(|_| {
                DecodeError::from(format!(
                    "Invalid NL80211_ATTR_MAC value {payload:?}"
                ))
            })?),
            NL80211_ATTR_IE => Self::Ie(payload.to_vec()),
            NL80211_ATTR_MAX_NUM_SCAN_SSIDS => {
                let err_msg = format!(
                    "Invalid NL80211_ATTR_MAX_NUM_SCAN_SSIDS value {payload:?}"
                );
                Self::MaxNumScanSsids(parse_u8(payload).context(err_msg)?)
            }
            NL80211_ATTR_SCAN_FREQUENCIES => Self::ScanFrequencies(
                Nla80211ScanFreqNlas::parse(payload)?.into(),
            ),
            NL80211_ATTR_SCAN_SSIDS => {
                Self::ScanSsids(Nla80211ScanSsidNlas::parse(payload)?.into())
            }
            NL80211_ATTR_BSS => {
                let mut nlas = Vec::new();
                for nla in NlasIterator::new(payload) {
                    let err_msg =
                        format!("Invalid NL80211_ATTR_BSS value {nla:?}");
                    let nla = &nla.context(err_msg.clone())?;
                    nlas.push(Nl80211BssInfo::parse(nla).context(err_msg)?);
                }
                Self::Bss(nlas)
            }
            NL80211_ATTR_MAX_SCAN_IE_LEN => {
                let err_msg = format!(
                    "Invalid NL80211_ATTR_MAX_SCAN_IE_LEN value {payload:?}"
                );
                Self::MaxScanIeLen(parse_u16(payload).context(err_msg)?)
            }
            NL80211_ATTR_SCAN_SUPP_RATES => Self::ScanSuppRates(
                Nla80211BandRatesNlas::parse(payload)?.into(),
            ),
            NL80211_ATTR_TX_NO_CCK_RATE => Self::TxNoCckRate,
            NL80211_ATTR_WDEV => {
                let err_msg =
                    format!("Invalid NL80211_ATTR_WDEV value {payload:?}");
                Self::Wdev(parse_u64(payload).context(err_msg)?)
            }
            NL80211_ATTR_SCAN_FLAGS => {
                Self::ScanFlags(Nl80211ScanFlags::parse(payload)?)
            }
            NL80211_ATTR_MAC_MASK => {
                Self::MacMask(payload.try_into().map_err(|_| {
                    DecodeError::from(format!(
                        "Invalid NL80211_ATTR_MAC_MASK value {payload:?}"
                    ))
                })?)
            }
            NL80211_ATTR_SCAN_START_TIME_TSF => {
                let err_msg = format!(
                    "Invalid NL80211_ATTR_SCAN_START_TIME_TSF \
                    value {payload:?}"
                );
                Self::ScanStartTimeTsf(parse_u64(payload).context(err_msg)?)
            }
            NL80211_ATTR_MEASUREMENT_DURATION => {
                let err_msg = format!(
                    "Invalid NL80211_ATTR_MEASUREMENT_DURATION \
                    value {payload:?}"
                );
                Self::MeasurementDuration(parse_u16(payload).context(err_msg)?)
            }
            NL80211_ATTR_MEASUREMENT_DURATION_MANDATORY => {
                Self::MeasurementDurationMandatory
            }
            _ => Self::Other(
                DefaultNla::parse(buf).context("invalid NLA (unknown kind)")?,
            ),
        })
    }
}
