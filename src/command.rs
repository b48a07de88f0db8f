// SPDX-License-Identifier: MIT

const NL80211_CMD_GET_SCAN: u8 = 32;
const NL80211_CMD_TRIGGER_SCAN: u8 = 33;
const NL80211_CMD_NEW_SCAN_RESULTS: u8 = 34;
const NL80211_CMD_SCAN_ABORTED: u8 = 35;

/// The subset of `enum nl80211_commands` the scan core speaks.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[non_exhaustive]
pub enum Nl80211Command {
    TriggerScan,
    GetScan,
    NewScanResults,
    ScanAborted,
    Other(u8),
}

impl From<Nl80211Command> for u8 {
    fn from(cmd: Nl80211Command) -> Self {
        match cmd {
            Nl80211Command::TriggerScan => NL80211_CMD_TRIGGER_SCAN,
            Nl80211Command::GetScan => NL80211_CMD_GET_SCAN,
            Nl80211Command::NewScanResults => NL80211_CMD_NEW_SCAN_RESULTS,
            Nl80211Command::ScanAborted => NL80211_CMD_SCAN_ABORTED,
            Nl80211Command::Other(d) => d,
        }
    }
}

impl From<u8> for Nl80211Command {
    fn from(d: u8) -> Self {
        match d {
            NL80211_CMD_TRIGGER_SCAN => Self::TriggerScan,
            NL80211_CMD_GET_SCAN => Self::GetScan,
            NL80211_CMD_NEW_SCAN_RESULTS => Self::NewScanResults,
            NL80211_CMD_SCAN_ABORTED => Self::ScanAborted,
            _ => Self::Other(d),
        }
    }
}
