// SPDX-License-Identifier: MIT

mod attr;
mod bss_info;
mod context;
mod params;
mod request;
mod service;

pub use self::attr::{Nl80211BandRates, Nl80211ScanFlags};
pub use self::bss_info::{Nl80211BssCapabilities, Nl80211BssInfo};
pub use self::params::ScanParameters;
pub use self::request::build_direct_probe_command;
pub use self::service::{
    DestroyFn, NotifyFn, PeriodicNotifyFn, PeriodicTriggerFn, ScanResults,
    ScanService, TriggerFn, WORK_PRIORITY_PERIODIC_SCAN, WORK_PRIORITY_SCAN,
};

pub(crate) use self::attr::{
    Nla80211BandRatesNlas, Nla80211ScanFreqNlas, Nla80211ScanSsidNlas,
};
