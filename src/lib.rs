// SPDX-License-Identifier: MIT

mod attr;
mod bss;
mod command;
mod config;
#[cfg(feature = "tokio_socket")]
mod connection;
mod driver;
mod error;
mod freq_set;
mod ie;
mod macros;
mod message;
mod scan;
mod wiphy;
mod work;

pub(crate) mod bytes;

#[cfg(test)]
mod tests;

pub use self::attr::Nl80211Attr;
pub use self::bss::{Bss, BssSource, OweTransition};
pub use self::command::Nl80211Command;
pub use self::config::{Config, RankSection, ScanSection, ScanSettings};
#[cfg(feature = "tokio_socket")]
pub use self::connection::{new_scan_connection, GenlScanDriver};
pub use self::driver::{ScanDriver, ScanEvent};
pub use self::error::ScanError;
pub use self::freq_set::FrequencySet;
pub use self::message::Nl80211Message;
pub use self::scan::{
    build_direct_probe_command, DestroyFn, Nl80211BandRates,
    Nl80211BssCapabilities, Nl80211BssInfo, Nl80211ScanFlags, NotifyFn,
    PeriodicNotifyFn, PeriodicTriggerFn, ScanParameters, ScanResults,
    ScanService, TriggerFn, WORK_PRIORITY_PERIODIC_SCAN, WORK_PRIORITY_SCAN,
};
pub use self::wiphy::{
    Band, ExtFeature, KnownNetwork, KnownNetworks, StaticWiphyRegistry, Wiphy,
    WiphyInfo, WiphyRegistry,
};
