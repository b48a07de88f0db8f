// SPDX-License-Identifier: MIT

use std::convert::TryInto;

use netlink_packet_core::ErrorContext;
use netlink_packet_core::{
    parse_u16, parse_u32, parse_u64, parse_u8, DecodeError, DefaultNla,
    Emitable, Nla, NlaBuffer, Parseable,
};

use crate::bytes::{write_i32, write_u16, write_u32, write_u64};

bitflags::bitflags! {
    /// IEEE 802.11-2020, 9.4.1.4 Capability Information field
    #[derive(Debug, Default, PartialEq, Eq, Clone, Copy)]
    #[non_exhaustive]
    pub struct Nl80211BssCapabilities: u16 {
        const Ess = 1 << 0;
        const Ibss = 1 << 1;
        const Privacy = 1 << 4;
        const ShortPreamble = 1 << 5;
        const SpectrumManagement = 1 << 8;
        const Qos = 1 << 9;
        const ShortSlotTime = 1 << 10;
        const Apsd = 1 << 11;
        const RadioMeasurement = 1 << 12;
        const Epd = 1 << 13;
        const _ = !0;
    }
}

impl<T: AsRef<[u8]> + ?Sized> Parseable<T> for Nl80211BssCapabilities {
    fn parse(buf: &T) -> Result<Self, DecodeError> {
        let buf: &[u8] = buf.as_ref();
        Ok(Self::from_bits_retain(parse_u16(buf).context(format!(
            "Invalid Nl80211BssCapabilities payload {buf:?}"
        ))?))
    }
}

impl Nl80211BssCapabilities {
    pub const LENGTH: usize = 2;
}

impl Emitable for Nl80211BssCapabilities {
    fn buffer_len(&self) -> usize {
        Self::LENGTH
    }

    fn emit(&self, buffer: &mut [u8]) {
        buffer.copy_from_slice(&self.bits().to_ne_bytes())
    }
}

const ETH_ALEN: usize = 6;

const NL80211_BSS_BSSID: u16 = 1;
const NL80211_BSS_FREQUENCY: u16 = 2;
const NL80211_BSS_TSF: u16 = 3;
const NL80211_BSS_BEACON_INTERVAL: u16 = 4;
const NL80211_BSS_CAPABILITY: u16 = 5;
const NL80211_BSS_INFORMATION_ELEMENTS: u16 = 6;
const NL80211_BSS_SIGNAL_MBM: u16 = 7;
const NL80211_BSS_SIGNAL_UNSPEC: u16 = 8;
const NL80211_BSS_SEEN_MS_AGO: u16 = 10;
const NL80211_BSS_BEACON_IES: u16 = 11;
const NL80211_BSS_PRESP_DATA: u16 = 14;
const NL80211_BSS_LAST_SEEN_BOOTTIME: u16 = 15;
const NL80211_BSS_PARENT_TSF: u16 = 17;

/// Per-BSS attributes nested under [crate::Nl80211Attr::Bss] in a
/// `GET_SCAN` dump entry.
#[derive(Debug, PartialEq, Eq, Clone)]
#[non_exhaustive]
pub enum Nl80211BssInfo {
    Bssid([u8; ETH_ALEN]),
    /// Frequency in MHz
    Frequency(u32),
    /// TSF of the received probe response/beacon in microseconds
    Tsf(u64),
    BeaconInterval(u16),
    Capability(Nl80211BssCapabilities),
    /// Raw information elements from the latest frame
    InformationElements(Vec<u8>),
    /// Signal strength in mBm (100 * dBm)
    SignalMbm(i32),
    /// Unit-less signal strength reported by a few legacy drivers, 0..100
    SignalUnspec(u8),
    SeenMsAgo(u32),
    /// Raw information elements guaranteed to come from a beacon
    BeaconInformationElements(Vec<u8>),
    /// Flag: the `InformationElements` come from a probe response
    ProbeResponseData,
    /// `CLOCK_BOOTTIME` of the last received frame, nanoseconds
    LastSeenBootTime(u64),
    /// TSF of the frame that scheduled the radio measurement
    ParentTsf(u64),
    Other(DefaultNla),
}

impl Nla for Nl80211BssInfo {
    fn value_len(&self) -> usize {
        match self {
            Self::Bssid(_) => ETH_ALEN,
            Self::SignalUnspec(_) => 1,
            Self::BeaconInterval(_) => 2,
            Self::Frequency(_) | Self::SignalMbm(_) | Self::SeenMsAgo(_) => 4,
            Self::Tsf(_) | Self::LastSeenBootTime(_) | Self::ParentTsf(_) => 8,
            Self::InformationElements(v)
            | Self::BeaconInformationElements(v) => v.len(),
            Self::Capability(_) => Nl80211BssCapabilities::LENGTH,
            Self::ProbeResponseData => 0,
            Self::Other(attr) => attr.value_len(),
        }
    }

    fn kind(&self) -> u16 {
        match self {
            Self::Bssid(_) => NL80211_BSS_BSSID,
            Self::Frequency(_) => NL80211_BSS_FREQUENCY,
            Self::Tsf(_) => NL80211_BSS_TSF,
            Self::BeaconInterval(_) => NL80211_BSS_BEACON_INTERVAL,
            Self::Capability(_) => NL80211_BSS_CAPABILITY,
            Self::InformationElements(_) => NL80211_BSS_INFORMATION_ELEMENTS,
            Self::SignalMbm(_) => NL80211_BSS_SIGNAL_MBM,
            Self::SignalUnspec(_) => NL80211_BSS_SIGNAL_UNSPEC,
            Self::SeenMsAgo(_) => NL80211_BSS_SEEN_MS_AGO,
            Self::BeaconInformationElements(_) => NL80211_BSS_BEACON_IES,
            Self::ProbeResponseData => NL80211_BSS_PRESP_DATA,
            Self::LastSeenBootTime(_) => NL80211_BSS_LAST_SEEN_BOOTTIME,
            Self::ParentTsf(_) => NL80211_BSS_PARENT_TSF,
            Self::Other(attr) => attr.kind(),
        }
    }

    fn emit_value(&self, buffer: &mut [u8]) {
        match self {
            Self::Bssid(v) => buffer[..ETH_ALEN].copy_from_slice(v),
            Self::SignalUnspec(d) => buffer[0] = *d,
            Self::BeaconInterval(d) => write_u16(buffer, *d),
            Self::Frequency(d) | Self::SeenMsAgo(d) => write_u32(buffer, *d),
            Self::SignalMbm(d) => write_i32(buffer, *d),
            Self::Tsf(d) | Self::LastSeenBootTime(d) | Self::ParentTsf(d) => {
                write_u64(buffer, *d)
            }
            Self::InformationElements(v)
            | Self::BeaconInformationElements(v) => {
                buffer[..v.len()].copy_from_slice(v.as_slice())
            }
            Self::Capability(v) => v.emit(buffer),
            Self::ProbeResponseData => (),
            Self::Other(attr) => attr.emit_value(buffer),
        }
    }
}

impl<'a, T: AsRef<[u8]> + ?Sized> Parseable<NlaBuffer<&'a T>>
    for Nl80211BssInfo
{
    fn parse(buf: &NlaBuffer<&'a T>) -> Result<Self, DecodeError> {
        let payload = buf.value();
        Ok(match buf.kind() {
            NL80211_BSS_BSSID => {
                let bssid: [u8; ETH_ALEN] =
                    payload.try_into().map_err(|_| {
                        DecodeError::from(format!(
                            "Invalid NL80211_BSS_BSSID {payload:?}"
                        ))
                    })?;
                Self::Bssid(bssid)
            }
            NL80211_BSS_FREQUENCY => {
                let err_msg =
                    format!("Invalid NL80211_BSS_FREQUENCY value {payload:?}");
                Self::Frequency(parse_u32(payload).context(err_msg)?)
            }
            NL80211_BSS_TSF => {
                let err_msg =
                    format!("Invalid NL80211_BSS_TSF value {payload:?}");
                Self::Tsf(parse_u64(payload).context(err_msg)?)
            }
            NL80211_BSS_BEACON_INTERVAL => {
                let err_msg = format!(
                    "Invalid NL80211_BSS_BEACON_INTERVAL value {payload:?}"
                );
                Self::BeaconInterval(parse_u16(payload).context(err_msg)?)
            }
            NL80211_BSS_CAPABILITY => {
                Self::Capability(Nl80211BssCapabilities::parse(payload)?)
            }
            NL80211_BSS_INFORMATION_ELEMENTS => {
                Self::InformationElements(payload.to_vec())
            }
            NL80211_BSS_SIGNAL_MBM => {
                let err_msg =
                    format!("Invalid NL80211_BSS_SIGNAL_MBM value {payload:?}");
                Self::SignalMbm(i32::from_ne_bytes(
                    payload.try_into().map_err(|_| DecodeError::from(err_msg))?,
                ))
            }
            NL80211_BSS_SIGNAL_UNSPEC => {
                let err_msg = format!(
                    "Invalid NL80211_BSS_SIGNAL_UNSPEC value {payload:?}"
                );
                Self::SignalUnspec(parse_u8(payload).context(err_msg)?)
            }
            NL80211_BSS_SEEN_MS_AGO => {
                let err_msg = format!(
                    "Invalid NL80211_BSS_SEEN_MS_AGO value {payload:?}"
                );
                Self::SeenMsAgo(parse_u32(payload).context(err_msg)?)
            }
            NL80211_BSS_BEACON_IES => {
                Self::BeaconInformationElements(payload.to_vec())
            }
            NL80211_BSS_PRESP_DATA => Self::ProbeResponseData,
            NL80211_BSS_LAST_SEEN_BOOTTIME => {
                let err_msg = format!(
                    "Invalid NL80211_BSS_LAST_SEEN_BOOTTIME value {payload:?}"
                );
                Self::LastSeenBootTime(parse_u64(payload).context(err_msg)?)
            }
            NL80211_BSS_PARENT_TSF => {
                let err_msg =
                    format!("Invalid NL80211_BSS_PARENT_TSF value {payload:?}");
                Self::ParentTsf(parse_u64(payload).context(err_msg)?)
            }
            _ => Self::Other(
                DefaultNla::parse(buf).context("invalid NLA (unknown kind)")?,
            ),
        })
    }
}
