// SPDX-License-Identifier: MIT

use crate::{
    scan::{
        request::ScanRequest,
        service::{DestroyFn, NotifyFn, PeriodicNotifyFn, PeriodicTriggerFn},
    },
    work::RadioWorkQueue,
    Bss, FrequencySet,
};

/// Whether a scan, our own or an external one, is occupying the radio.
/// Set when a scan is triggered, cleared on scan-done before the results
/// are queried.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ScanState {
    #[default]
    NotRunning,
    Passive,
    Active,
}

/// Periodic scan bookkeeping for one radio. `interval` of zero means the
/// periodic driver is stopped.
#[derive(Default)]
pub(crate) struct PeriodicScan {
    pub interval: u16,
    pub trigger: Option<PeriodicTriggerFn>,
    pub notify: Option<PeriodicNotifyFn>,
    /// Request id of the periodic scan currently on the work queue
    pub request_id: Option<u32>,
    /// A hidden BSS showed up in the latest results; the next periodic
    /// scan probes actively if a hidden network is configured
    pub needs_active_scan: bool,
}

/// BSS records collected from one GET_SCAN dump, kept sorted by rank.
pub(crate) struct ResultsAccumulator {
    /// Monotonic microseconds when the dump was started, used to
    /// synthesize per-BSS timestamps
    pub time_stamp_us: u64,
    pub bss_list: Vec<Bss>,
    pub freqs: Option<FrequencySet>,
    /// Owning request, or `None` when an external scan's results are
    /// collected for the periodic consumer
    pub request_id: Option<u32>,
    /// `start_time_tsf` of the owning request, stamped onto each record
    pub start_tsf: u64,
}

impl ResultsAccumulator {
    pub(crate) fn new(
        time_stamp_us: u64,
        freqs: Option<FrequencySet>,
        request_id: Option<u32>,
        start_tsf: u64,
    ) -> Self {
        Self {
            time_stamp_us,
            bss_list: Vec::new(),
            freqs,
            request_id,
            start_tsf,
        }
    }

    /// Insertion sort keeping the best-ranked BSS first.
    pub(crate) fn insert_by_rank(&mut self, bss: Bss) {
        let pos = self
            .bss_list
            .iter()
            .position(|existing| {
                bss.compare_rank(existing) == std::cmp::Ordering::Greater
            })
            .unwrap_or(self.bss_list.len());
        self.bss_list.insert(pos, bss);
    }
}

/// The dump-only path used after firmware-initiated roams; not part of
/// the radio work queue.
pub(crate) struct FirmwareScan {
    pub results: ResultsAccumulator,
    pub notify: Option<NotifyFn>,
    pub destroy: Option<DestroyFn>,
}

/// Per-radio scan state, created on wdev add and torn down on removal.
pub(crate) struct ScanContext {
    pub wdev_id: u64,
    pub state: ScanState,
    /// All requests admitted and not yet destroyed; execution order is
    /// governed by the work queue, not by position here
    pub requests: Vec<ScanRequest>,
    pub work: RadioWorkQueue,
    /// Non-None while TRIGGER_SCAN is in flight
    pub start_cmd_id: Option<u32>,
    /// Non-None while GET_SCAN is in flight
    pub get_scan_cmd_id: Option<u32>,
    /// Non-None while the firmware-results GET_SCAN is in flight
    pub get_fw_scan_cmd_id: Option<u32>,
    pub results: Option<ResultsAccumulator>,
    pub fw_scan: Option<FirmwareScan>,
    pub sp: PeriodicScan,
}

impl ScanContext {
    pub(crate) fn new(wdev_id: u64) -> Self {
        Self {
            wdev_id,
            state: ScanState::NotRunning,
            requests: Vec::new(),
            work: RadioWorkQueue::new(),
            start_cmd_id: None,
            get_scan_cmd_id: None,
            get_fw_scan_cmd_id: None,
            results: None,
            fw_scan: None,
            sp: PeriodicScan::default(),
        }
    }

    pub(crate) fn request_index(&self, id: u32) -> Option<usize> {
        self.requests.iter().position(|r| r.id == id)
    }

    pub(crate) fn request(&self, id: u32) -> Option<&ScanRequest> {
        self.requests.iter().find(|r| r.id == id)
    }

    pub(crate) fn request_mut(&mut self, id: u32) -> Option<&mut ScanRequest> {
        self.requests.iter_mut().find(|r| r.id == id)
    }
}
