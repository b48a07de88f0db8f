// SPDX-License-Identifier: MIT

use std::{collections::VecDeque, time::Duration};

use crate::{
    scan::{
        context::{
            FirmwareScan, ResultsAccumulator, ScanContext, ScanState,
        },
        request::{self, ScanRequest},
        Nl80211ScanFlags, ScanParameters,
    },
    Bss, FrequencySet, KnownNetworks, Nl80211Attr, Nl80211Command,
    Nl80211Message, ScanDriver, ScanError, ScanEvent, ScanSettings,
    WiphyRegistry,
};

/// Work queue priority of user-requested scans.
pub const WORK_PRIORITY_SCAN: i32 = 2;
/// Work queue priority of periodic background scans; everything else on
/// the radio goes first.
pub const WORK_PRIORITY_PERIODIC_SCAN: i32 = 4;

/// Called once when the request's first trigger is resolved.
pub type TriggerFn = Box<dyn FnOnce(&mut ScanService, Result<(), ScanError>)>;
/// Called at most once with the scan outcome; the callback owns the
/// result list.
pub type NotifyFn =
    Box<dyn FnOnce(&mut ScanService, Result<ScanResults, ScanError>)>;
/// Called exactly once when the request is destroyed, whatever the path.
pub type DestroyFn = Box<dyn FnOnce(&mut ScanService)>;

/// Periodic-scan variants of the callbacks; fired on every cycle.
pub type PeriodicTriggerFn =
    Box<dyn FnMut(&mut ScanService, Result<(), ScanError>)>;
pub type PeriodicNotifyFn =
    Box<dyn FnMut(&mut ScanService, Result<ScanResults, ScanError>)>;

/// A delivered scan outcome. `bss_list` is sorted best rank first and is
/// owned by the receiver.
#[derive(Debug, PartialEq)]
pub struct ScanResults {
    pub wdev_id: u64,
    pub bss_list: Vec<Bss>,
    /// The channels the scan covered, when the kernel reported them
    pub freqs: Option<FrequencySet>,
}

/// The scan core: one registry owning every per-radio scan context,
/// driven by the daemon's event loop through [Self::dispatch].
///
/// Single-threaded and cooperative; user callbacks receive `&mut self` and
/// may re-enter any public method, including [Self::cancel].
pub struct ScanService {
    driver: Box<dyn ScanDriver>,
    wiphys: Box<dyn WiphyRegistry>,
    known_networks: Box<dyn KnownNetworks>,
    settings: ScanSettings,
    contexts: Vec<ScanContext>,
}

impl ScanService {
    pub fn new(
        driver: Box<dyn ScanDriver>,
        wiphys: Box<dyn WiphyRegistry>,
        known_networks: Box<dyn KnownNetworks>,
        settings: ScanSettings,
    ) -> Self {
        Self {
            driver,
            wiphys,
            known_networks,
            settings,
            contexts: Vec::new(),
        }
    }

    pub fn settings(&self) -> &ScanSettings {
        &self.settings
    }

    fn context_index(&self, wdev_id: u64) -> Option<usize> {
        self.contexts.iter().position(|c| c.wdev_id == wdev_id)
    }

    /// Registers a radio with the scan core. Fails if the radio is already
    /// known or its capabilities cannot be looked up.
    pub fn wdev_add(&mut self, wdev_id: u64) -> bool {
        if self.context_index(wdev_id).is_some() {
            return false;
        }
        if self.wiphys.find(wdev_id).is_none() {
            return false;
        }

        self.contexts.push(ScanContext::new(wdev_id));
        true
    }

    /// Tears down a radio's scan state: in-flight kernel commands are
    /// canceled and queued requests dropped silently, firing only their
    /// destroy callbacks.
    pub fn wdev_remove(&mut self, wdev_id: u64) -> bool {
        let Some(idx) = self.context_index(wdev_id) else {
            return false;
        };
        log::info!("removing scan context for wdev {wdev_id:x}");

        let mut ctx = self.contexts.remove(idx);

        if let Some(cmd_id) = ctx.start_cmd_id.take() {
            self.driver.cancel(cmd_id);
        }
        if let Some(cmd_id) = ctx.get_scan_cmd_id.take() {
            self.driver.cancel(cmd_id);
        }
        if let Some(cmd_id) = ctx.get_fw_scan_cmd_id.take() {
            self.driver.cancel(cmd_id);
        }
        self.driver.cancel_periodic_timer(wdev_id);

        for request in &mut ctx.requests {
            if let Some(destroy) = request.destroy.take() {
                destroy(self);
            }
        }
        if let Some(fw) = ctx.fw_scan.take() {
            if let Some(destroy) = fw.destroy {
                destroy(self);
            }
        }

        true
    }

    /// Feed one driver event into the core.
    pub fn dispatch(&mut self, event: ScanEvent) {
        match event {
            ScanEvent::CommandAck { cmd_id, result } => {
                self.command_acked(cmd_id, result)
            }
            ScanEvent::DumpEntry { cmd_id, message } => {
                self.dump_entry(cmd_id, &message)
            }
            ScanEvent::DumpDone { cmd_id } => self.dump_done(cmd_id),
            ScanEvent::Notification { message } => {
                self.notification(&message)
            }
            ScanEvent::PeriodicTimer { wdev_id } => {
                self.periodic_timer_fired(wdev_id)
            }
        }
    }

    //
    // Public scan API
    //

    pub fn passive(
        &mut self,
        wdev_id: u64,
        freqs: FrequencySet,
        trigger: Option<TriggerFn>,
        notify: Option<NotifyFn>,
        destroy: Option<DestroyFn>,
    ) -> Option<u32> {
        let params = ScanParameters {
            freqs: Some(freqs),
            ..Default::default()
        };
        self.scan_common(
            wdev_id,
            true,
            &params,
            WORK_PRIORITY_SCAN,
            false,
            trigger,
            notify,
            destroy,
        )
    }

    pub fn passive_with_params(
        &mut self,
        wdev_id: u64,
        params: &ScanParameters,
        trigger: Option<TriggerFn>,
        notify: Option<NotifyFn>,
        destroy: Option<DestroyFn>,
    ) -> Option<u32> {
        self.scan_common(
            wdev_id,
            true,
            params,
            WORK_PRIORITY_SCAN,
            false,
            trigger,
            notify,
            destroy,
        )
    }

    pub fn active(
        &mut self,
        wdev_id: u64,
        extra_ie: Vec<u8>,
        trigger: Option<TriggerFn>,
        notify: Option<NotifyFn>,
        destroy: Option<DestroyFn>,
    ) -> Option<u32> {
        let params = ScanParameters {
            extra_ie,
            ..Default::default()
        };
        self.scan_common(
            wdev_id,
            false,
            &params,
            WORK_PRIORITY_SCAN,
            false,
            trigger,
            notify,
            destroy,
        )
    }

    pub fn active_with_params(
        &mut self,
        wdev_id: u64,
        params: &ScanParameters,
        trigger: Option<TriggerFn>,
        notify: Option<NotifyFn>,
        destroy: Option<DestroyFn>,
    ) -> Option<u32> {
        self.scan_common(
            wdev_id,
            false,
            params,
            WORK_PRIORITY_SCAN,
            false,
            trigger,
            notify,
            destroy,
        )
    }

    /// Probes for the OWE counterparts of open BSSes advertising an OWE
    /// transition element. Targets sharing one SSID collapse into a single
    /// trigger with their frequencies combined; otherwise one trigger per
    /// target is queued, FLUSH enabled only on the first.
    pub fn owe_hidden(
        &mut self,
        wdev_id: u64,
        targets: &[&Bss],
        trigger: Option<TriggerFn>,
        notify: Option<NotifyFn>,
        destroy: Option<DestroyFn>,
    ) -> Option<u32> {
        self.context_index(wdev_id)?;
        let wiphy = self.wiphys.find(wdev_id)?;

        let owe_targets: Vec<(&Bss, &crate::OweTransition)> = targets
            .iter()
            .filter_map(|bss| {
                bss.owe_transition.as_ref().map(|owe| (*bss, owe))
            })
            .collect();
        if owe_targets.is_empty() {
            return None;
        }

        // Collect a combined frequency list while all SSIDs agree; a
        // single trigger is hopefully the common case.
        let mut freqs = FrequencySet::new();
        let mut same_ssid = true;
        let first_ssid = owe_targets[0].1.ssid.as_slice();
        for (bss, owe) in &owe_targets {
            freqs.add(owe.frequency(bss.frequency));
            if owe.ssid != first_ssid {
                same_ssid = false;
                break;
            }
        }

        let mut cmds = VecDeque::new();
        if same_ssid {
            cmds.push_back(request::build_owe_command(
                wiphy,
                &self.settings,
                wdev_id,
                false,
                &freqs,
                first_ssid,
            ));
        } else {
            // SSIDs differed, use separate scan commands
            let mut ignore_flush = false;
            for (bss, owe) in &owe_targets {
                let mut freq = FrequencySet::new();
                freq.add(owe.frequency(bss.frequency));
                cmds.push_back(request::build_owe_command(
                    wiphy,
                    &self.settings,
                    wdev_id,
                    ignore_flush,
                    &freq,
                    &owe.ssid,
                ));
                ignore_flush = true;
            }
        }

        self.submit_request(
            wdev_id,
            false,
            false,
            cmds,
            WORK_PRIORITY_SCAN,
            trigger,
            notify,
            destroy,
        )
    }

    /// Returns the radio TSF at which the request's scan was started, if
    /// the request is currently triggered.
    pub fn triggered_time(&self, wdev_id: u64, id: u32) -> Option<u64> {
        let ctx = &self.contexts[self.context_index(wdev_id)?];
        ctx.request(id)
            .filter(|r| r.triggered)
            .map(|r| r.start_time_tsf)
    }

    /// Dump-only path returning whatever the kernel already holds, used
    /// after firmware-initiated roams. Bypasses the work queue.
    pub fn firmware_scan(
        &mut self,
        wdev_id: u64,
        notify: NotifyFn,
        destroy: Option<DestroyFn>,
    ) -> bool {
        let Some(idx) = self.context_index(wdev_id) else {
            return false;
        };
        if self.contexts[idx].get_fw_scan_cmd_id.is_some() {
            return false;
        }

        let msg =
            Nl80211Message::new_scan_get(vec![Nl80211Attr::Wdev(wdev_id)]);
        let Ok(cmd_id) = self.driver.start_dump(msg) else {
            return false;
        };

        let now_us = self.driver.now_us();
        let ctx = &mut self.contexts[idx];
        ctx.get_fw_scan_cmd_id = Some(cmd_id);
        ctx.fw_scan = Some(FirmwareScan {
            results: ResultsAccumulator::new(now_us, None, None, 0),
            notify: Some(notify),
            destroy,
        });
        true
    }

    //
    // Request submission and the work queue
    //

    #[allow(clippy::too_many_arguments)]
    fn scan_common(
        &mut self,
        wdev_id: u64,
        passive: bool,
        params: &ScanParameters,
        priority: i32,
        periodic: bool,
        trigger: Option<TriggerFn>,
        notify: Option<NotifyFn>,
        destroy: Option<DestroyFn>,
    ) -> Option<u32> {
        self.context_index(wdev_id)?;
        let wiphy = self.wiphys.find(wdev_id)?;

        let cmds = request::build_scan_commands(
            wiphy,
            &self.settings,
            self.known_networks.as_ref(),
            wdev_id,
            passive,
            params,
        );

        self.submit_request(
            wdev_id, passive, periodic, cmds, priority, trigger, notify,
            destroy,
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn submit_request(
        &mut self,
        wdev_id: u64,
        passive: bool,
        periodic: bool,
        cmds: VecDeque<Nl80211Message>,
        priority: i32,
        trigger: Option<TriggerFn>,
        notify: Option<NotifyFn>,
        destroy: Option<DestroyFn>,
    ) -> Option<u32> {
        let idx = self.context_index(wdev_id)?;
        let ctx = &mut self.contexts[idx];

        let id = ctx.work.insert(priority);
        ctx.requests.push(ScanRequest::new(
            id, passive, periodic, cmds, trigger, notify, destroy,
        ));

        self.run_work(wdev_id);
        Some(id)
    }

    /// Grants execution to queued requests until one suspends on a kernel
    /// command or the queue drains.
    fn run_work(&mut self, wdev_id: u64) {
        loop {
            let Some(idx) = self.context_index(wdev_id) else {
                return;
            };
            let Some(work_id) = self.contexts[idx].work.start_next() else {
                return;
            };
            if !self.start_scan_request(wdev_id, work_id) {
                return;
            }
        }
    }

    /// Sends the head trigger of the request. Returns true when the
    /// request failed synchronously and has already been finalized, so
    /// the next queued request may start.
    fn start_scan_request(&mut self, wdev_id: u64, id: u32) -> bool {
        let Some(idx) = self.context_index(wdev_id) else {
            return false;
        };

        // An external scan occupies the radio; retried on scan-finished
        if self.contexts[idx].state != ScanState::NotRunning {
            return false;
        }

        let Some(cmd) = self.contexts[idx]
            .request(id)
            .and_then(|r| r.cmds.front().cloned())
        else {
            self.fail_request(wdev_id, id, ScanError::NoCommand);
            return true;
        };

        match self.driver.send_trigger(cmd) {
            Ok(cmd_id) => {
                self.contexts[idx].start_cmd_id = Some(cmd_id);
                false
            }
            Err(_) => {
                log::error!("scan request: failed to trigger scan");
                self.fail_request(wdev_id, id, ScanError::SendFailed);
                true
            }
        }
    }

    //
    // Kernel command completions
    //

    fn command_acked(
        &mut self,
        cmd_id: u32,
        result: Result<(), ScanError>,
    ) {
        if let Some(idx) = self
            .contexts
            .iter()
            .position(|c| c.start_cmd_id == Some(cmd_id))
        {
            self.trigger_acked(idx, result);
            return;
        }

        // Dumps normally complete via DumpDone; a failed dump ends here
        if let Err(error) = result {
            if let Some(idx) = self
                .contexts
                .iter()
                .position(|c| c.get_scan_cmd_id == Some(cmd_id))
            {
                let wdev_id = self.contexts[idx].wdev_id;
                self.contexts[idx].get_scan_cmd_id = None;
                let Some(results) = self.contexts[idx].results.take() else {
                    return;
                };
                if let Some(id) = results.request_id {
                    self.finish_request(wdev_id, id, Err(error));
                }
                return;
            }

            if let Some(idx) = self
                .contexts
                .iter()
                .position(|c| c.get_fw_scan_cmd_id == Some(cmd_id))
            {
                self.contexts[idx].get_fw_scan_cmd_id = None;
                self.finish_firmware_scan(idx, Err(error));
            }
        }
    }

    fn trigger_acked(&mut self, idx: usize, result: Result<(), ScanError>) {
        let wdev_id = self.contexts[idx].wdev_id;
        self.contexts[idx].start_cmd_id = None;

        let Some(work_id) = self.contexts[idx].work.running() else {
            return;
        };

        match result {
            // Scan in progress, assume another scan is running
            Err(ScanError::Busy) => {
                self.contexts[idx].state = ScanState::Passive;
                return;
            }
            Err(error) => {
                log::error!(
                    "received error during CMD_TRIGGER_SCAN: {error}"
                );
                self.fail_request(wdev_id, work_id, error);
                return;
            }
            Ok(()) => (),
        }

        let Some(request) = self.contexts[idx].request_mut(work_id) else {
            return;
        };

        request.triggered = true;
        request.started = true;
        request.cmds.pop_front();
        let passive = request.passive;

        // Reset so consecutive segments of a multi-segment scan do not
        // refire the callback
        let trigger = request.trigger.take();

        self.contexts[idx].state = if passive {
            ScanState::Passive
        } else {
            ScanState::Active
        };
        log::debug!(
            "{} scan triggered for wdev {wdev_id:x}",
            if passive { "passive" } else { "active" }
        );

        if let Some(trigger) = trigger {
            trigger(self, Ok(()));
        }
    }

    fn dump_entry(&mut self, cmd_id: u32, message: &Nl80211Message) {
        let Some(idx) = self.contexts.iter().position(|c| {
            c.get_scan_cmd_id == Some(cmd_id)
                || c.get_fw_scan_cmd_id == Some(cmd_id)
        }) else {
            return;
        };

        let ctx = &mut self.contexts[idx];
        let wdev_id = ctx.wdev_id;

        match message.attr(|a| match a {
            Nl80211Attr::Wdev(wdev) => Some(*wdev),
            _ => None,
        }) {
            Some(wdev) if wdev == wdev_id => (),
            Some(_) => {
                log::warn!("wdev mismatch in scan dump entry");
                return;
            }
            None => return,
        }

        let results = if ctx.get_scan_cmd_id == Some(cmd_id) {
            ctx.results.as_mut()
        } else {
            ctx.fw_scan.as_mut().map(|fw| &mut fw.results)
        };
        let Some(results) = results else {
            return;
        };

        let Some(bss_attrs) = message.attr(|a| match a {
            Nl80211Attr::Bss(nlas) => Some(nlas.clone()),
            _ => None,
        }) else {
            return;
        };

        let Some(wiphy) = self.wiphys.find(wdev_id) else {
            return;
        };
        let Some(mut bss) =
            Bss::from_scan_result(&bss_attrs, wiphy, results.time_stamp_us)
        else {
            return;
        };

        bss.start_tsf = results.start_tsf;
        bss.compute_rank(self.settings.rank_5g_factor);
        results.insert_by_rank(bss);
    }

    fn dump_done(&mut self, cmd_id: u32) {
        if let Some(idx) = self
            .contexts
            .iter()
            .position(|c| c.get_scan_cmd_id == Some(cmd_id))
        {
            let wdev_id = self.contexts[idx].wdev_id;
            self.contexts[idx].get_scan_cmd_id = None;
            let Some(results) = self.contexts[idx].results.take() else {
                return;
            };

            match results.request_id {
                Some(id) => {
                    // A canceled request has already left the queue; its
                    // results are discarded
                    if self.contexts[idx].request(id).is_none() {
                        return;
                    }
                    self.finish_request(
                        wdev_id,
                        id,
                        Ok((results.bss_list, results.freqs)),
                    );
                }
                None => {
                    // External scan results for the periodic consumer
                    self.note_hidden_bsses(idx, &results.bss_list);
                    let scan_results = ScanResults {
                        wdev_id,
                        bss_list: results.bss_list,
                        freqs: results.freqs,
                    };
                    self.call_periodic_notify(wdev_id, Ok(scan_results));
                }
            }
            return;
        }

        if let Some(idx) = self
            .contexts
            .iter()
            .position(|c| c.get_fw_scan_cmd_id == Some(cmd_id))
        {
            self.contexts[idx].get_fw_scan_cmd_id = None;
            self.finish_firmware_scan(idx, Ok(()));
        }
    }

    fn finish_firmware_scan(
        &mut self,
        idx: usize,
        result: Result<(), ScanError>,
    ) {
        let wdev_id = self.contexts[idx].wdev_id;
        let Some(mut fw) = self.contexts[idx].fw_scan.take() else {
            return;
        };

        let outcome = match result {
            Ok(()) if fw.results.bss_list.is_empty() => {
                Err(ScanError::EmptyCache)
            }
            Ok(()) => Ok(ScanResults {
                wdev_id,
                bss_list: std::mem::take(&mut fw.results.bss_list),
                freqs: None,
            }),
            Err(error) => Err(error),
        };

        if let Some(notify) = fw.notify.take() {
            notify(self, outcome);
        }
        if let Some(destroy) = fw.destroy.take() {
            destroy(self);
        }
    }

    //
    // Scan multicast notifications
    //

    fn notification(&mut self, message: &Nl80211Message) {
        let Some(wdev_id) = message.attr(|a| match a {
            Nl80211Attr::Wdev(wdev) => Some(*wdev),
            _ => None,
        }) else {
            return;
        };
        let Some(idx) = self.context_index(wdev_id) else {
            return;
        };

        log::debug!("scan notification {:?} for wdev {wdev_id:x}", message.cmd);

        match message.cmd {
            Nl80211Command::TriggerScan => {
                self.notify_trigger_scan(idx, message)
            }
            Nl80211Command::NewScanResults => {
                self.notify_scan_finished(idx, message)
            }
            Nl80211Command::ScanAborted => self.notify_scan_aborted(idx),
            _ => (),
        }
    }

    fn notify_trigger_scan(&mut self, idx: usize, message: &Nl80211Message) {
        // Presence of an SSIDs attribute marks the scan active
        let active = message
            .attributes
            .iter()
            .any(|a| matches!(a, Nl80211Attr::ScanSsids(_)));
        let start_time_tsf = message
            .attr(|a| match a {
                Nl80211Attr::ScanStartTimeTsf(tsf) => Some(*tsf),
                _ => None,
            })
            .unwrap_or(0);

        let ctx = &mut self.contexts[idx];
        ctx.state = if active {
            ScanState::Active
        } else {
            ScanState::Passive
        };

        if let Some(id) = ctx.work.running() {
            if let Some(request) = ctx.request_mut(id) {
                request.start_time_tsf = start_time_tsf;
            }
        }
    }

    fn notify_scan_finished(&mut self, idx: usize, message: &Nl80211Message) {
        let wdev_id = self.contexts[idx].wdev_id;
        self.contexts[idx].state = ScanState::NotRunning;

        let current = self.contexts[idx].work.running();
        let triggered = current
            .and_then(|id| self.contexts[idx].request(id))
            .map(|r| r.triggered)
            .unwrap_or(false);

        let mut retry = false;
        let mut send_next = false;
        let mut dump_for: Option<Option<u32>> = None;

        if let (Some(id), true) = (current, triggered) {
            let (notify_gone, cmds_empty) = {
                let Some(request) = self.contexts[idx].request_mut(id)
                else {
                    return;
                };
                request.triggered = false;
                (request.notify.is_none(), request.cmds.is_empty())
            };

            if notify_gone {
                // The caller abandoned notification through cancel
                self.finish_request(wdev_id, id, Err(ScanError::Canceled));
                return;
            }

            if cmds_empty {
                // Last command of the request; don't start the next
                // request before the GET_SCAN dump completes so the
                // current request keeps exclusive radio access
                dump_for = Some(Some(id));
            } else {
                send_next = true;
            }
        } else {
            if self.contexts[idx].get_scan_cmd_id.is_some() {
                return;
            }

            // An external scan completed
            if self.contexts[idx].sp.notify.is_some() {
                dump_for = Some(None);
            }

            let flushed = message
                .attr(|a| match a {
                    Nl80211Attr::ScanFlags(flags) => Some(*flags),
                    _ => None,
                })
                .map(|flags| flags.contains(Nl80211ScanFlags::Flush))
                .unwrap_or(false);
            let started = current
                .and_then(|id| self.contexts[idx].request(id))
                .map(|r| r.started)
                .unwrap_or(false);

            // Drop the ongoing scan if the external scan flushed our
            // results, otherwise retry a trigger that bounced with EBUSY
            if let (Some(id), true) = (current, started && flushed) {
                self.finish_request(
                    wdev_id,
                    id,
                    Err(ScanError::ResultsFlushed),
                );
            } else {
                retry = true;
            }
        }

        // Drive the next segment of the current request, or re-issue a
        // trigger that was blocked by an external scan
        if send_next || retry {
            if let Some(idx) = self.context_index(wdev_id) {
                if let Some(id) = self.contexts[idx].work.running() {
                    if self.start_scan_request(wdev_id, id) {
                        self.run_work(wdev_id);
                    }
                }
            }
        }

        let Some(request_id) = dump_for else {
            return;
        };
        self.start_result_dump(wdev_id, request_id, message);
    }

    fn start_result_dump(
        &mut self,
        wdev_id: u64,
        request_id: Option<u32>,
        message: &Nl80211Message,
    ) {
        let Some(idx) = self.context_index(wdev_id) else {
            return;
        };

        let freqs = message.attr(|a| match a {
            Nl80211Attr::ScanFrequencies(freqs) => {
                Some(freqs.iter().copied().collect::<FrequencySet>())
            }
            _ => None,
        });
        let start_tsf = request_id
            .and_then(|id| self.contexts[idx].request(id))
            .map(|r| r.start_time_tsf)
            .unwrap_or(0);

        let msg =
            Nl80211Message::new_scan_get(vec![Nl80211Attr::Wdev(wdev_id)]);
        match self.driver.start_dump(msg) {
            Ok(cmd_id) => {
                let now_us = self.driver.now_us();
                let ctx = &mut self.contexts[idx];
                ctx.get_scan_cmd_id = Some(cmd_id);
                ctx.results = Some(ResultsAccumulator::new(
                    now_us, freqs, request_id, start_tsf,
                ));
            }
            Err(error) => {
                if let Some(id) = request_id {
                    self.fail_request(wdev_id, id, error);
                }
            }
        }
    }

    fn notify_scan_aborted(&mut self, idx: usize) {
        let wdev_id = self.contexts[idx].wdev_id;
        self.contexts[idx].state = ScanState::NotRunning;

        // Nothing of ours pending: an external scan got aborted, ignore
        let Some(id) = self.contexts[idx].work.running() else {
            return;
        };
        let Some(request) = self.contexts[idx].request_mut(id) else {
            return;
        };

        if request.triggered {
            request.triggered = false;

            if request.periodic {
                // Periodic scans don't report the abort
                self.finalize_request(wdev_id, id);
            } else {
                self.finish_request(wdev_id, id, Err(ScanError::Canceled));
            }
        } else {
            // The aborted scan may have been external; the radio could be
            // free now, although the abort may also mean new activity is
            // starting, in which case the trigger bounces with EBUSY
            if self.start_scan_request(wdev_id, id) {
                self.run_work(wdev_id);
            }
        }
    }

    //
    // Completion, failure and teardown of requests
    //

    /// Failure before any results: prefers the trigger callback, falling
    /// back to notify, then finalizes the request.
    fn fail_request(&mut self, wdev_id: u64, id: u32, error: ScanError) {
        let Some(idx) = self.context_index(wdev_id) else {
            return;
        };
        let Some(request) = self.contexts[idx].request_mut(id) else {
            return;
        };

        request.in_callback = true;
        let trigger = request.trigger.take();
        let notify = request.notify.take();

        if let Some(trigger) = trigger {
            trigger(self, Err(error));
        } else if let Some(notify) = notify {
            notify(self, Err(error));
        }

        self.clear_in_callback(wdev_id, id);
        self.finalize_request(wdev_id, id);
    }

    /// Delivers the scan outcome through notify and finalizes the request.
    fn finish_request(
        &mut self,
        wdev_id: u64,
        id: u32,
        result: Result<(Vec<Bss>, Option<FrequencySet>), ScanError>,
    ) {
        let Some(idx) = self.context_index(wdev_id) else {
            return;
        };

        if let Ok((bss_list, _)) = &result {
            self.note_hidden_bsses(idx, bss_list);
        }

        let Some(request) = self.contexts[idx].request_mut(id) else {
            return;
        };
        request.in_callback = true;
        let notify = request.notify.take();

        if let Some(notify) = notify {
            let outcome = result.map(|(bss_list, freqs)| ScanResults {
                wdev_id,
                bss_list,
                freqs,
            });
            notify(self, outcome);
        }

        self.clear_in_callback(wdev_id, id);
        self.finalize_request(wdev_id, id);
    }

    fn clear_in_callback(&mut self, wdev_id: u64, id: u32) {
        if let Some(idx) = self.context_index(wdev_id) {
            if let Some(request) = self.contexts[idx].request_mut(id) {
                request.in_callback = false;
            }
        }
    }

    /// Removes the request from the queue, fires its destroy callback and
    /// grants the radio to the next item.
    fn finalize_request(&mut self, wdev_id: u64, id: u32) {
        let Some(idx) = self.context_index(wdev_id) else {
            return;
        };
        let Some(pos) = self.contexts[idx].request_index(id) else {
            return;
        };

        let mut request = self.contexts[idx].requests.remove(pos);
        self.contexts[idx].work.done(id);

        if let Some(destroy) = request.destroy.take() {
            destroy(self);
        }

        self.run_work(wdev_id);
    }

    /// Flags the periodic driver when any delivered BSS hides its SSID.
    fn note_hidden_bsses(&mut self, idx: usize, bss_list: &[Bss]) {
        if bss_list.iter().any(|bss| bss.has_hidden_ssid()) {
            self.contexts[idx].sp.needs_active_scan = true;
        }
    }

    //
    // Cancellation
    //

    /// Cancels a request. Never blocks, never calls notify; the destroy
    /// callback still fires exactly once. Returns false for unknown ids,
    /// making repeated cancels harmless.
    pub fn cancel(&mut self, wdev_id: u64, id: u32) -> bool {
        log::debug!("trying to cancel scan id {id} for wdev {wdev_id:x}");

        let Some(idx) = self.context_index(wdev_id) else {
            return false;
        };
        let Some(request) = self.contexts[idx].request_mut(id) else {
            return false;
        };

        // In the completion callback and about to be finalized: invoke
        // destroy now, the unwinding completion path does the rest
        if request.in_callback {
            let destroy = request.destroy.take();
            if let Some(destroy) = destroy {
                destroy(self);
            }
            return true;
        }

        // Already triggered: zero out notify and let the scan complete
        // naturally with its results discarded
        if request.triggered {
            log::debug!("scan has been triggered, wait for it to complete");
            request.notify = None;
            let destroy = request.destroy.take();
            if let Some(destroy) = destroy {
                destroy(self);
            }
            return true;
        }

        // Covers a TRIGGER_SCAN in flight, a trigger that bounced with
        // EBUSY, and a completed scan whose GET_SCAN is still pending.
        // Canceling the in-flight command suppresses its completion
        // events; pending accumulated results are dropped with it.
        if self.contexts[idx].work.is_running(id) {
            log::debug!("scan is already started");

            if let Some(request) = self.contexts[idx].request_mut(id) {
                request.canceled = true;
            }

            if let Some(cmd_id) = self.contexts[idx].start_cmd_id.take() {
                self.driver.cancel(cmd_id);
            }
            if let Some(cmd_id) = self.contexts[idx].get_scan_cmd_id.take() {
                self.driver.cancel(cmd_id);
                self.contexts[idx].results = None;
            }
        }

        self.finalize_request(wdev_id, id);
        true
    }

    //
    // Periodic scans
    //

    /// Arms the periodic scan machinery for one radio and submits the
    /// first request. A no-op when periodic scanning is disabled by
    /// configuration or already started.
    pub fn periodic_start(
        &mut self,
        wdev_id: u64,
        trigger: Option<PeriodicTriggerFn>,
        notify: Option<PeriodicNotifyFn>,
    ) {
        if self.settings.disable_periodic_scan {
            return;
        }

        let Some(idx) = self.context_index(wdev_id) else {
            log::error!("periodic_start called without wdev_add");
            return;
        };
        if self.contexts[idx].sp.interval != 0 {
            return;
        }

        log::debug!("starting periodic scan for wdev {wdev_id:x}");

        let sp = &mut self.contexts[idx].sp;
        sp.interval = self.settings.initial_periodic_scan_interval;
        sp.trigger = trigger;
        sp.notify = notify;

        self.periodic_queue(wdev_id);
    }

    pub fn periodic_stop(&mut self, wdev_id: u64) -> bool {
        let Some(idx) = self.context_index(wdev_id) else {
            return false;
        };
        if self.contexts[idx].sp.interval == 0 {
            return false;
        }

        log::debug!("stopping periodic scan for wdev {wdev_id:x}");

        self.driver.cancel_periodic_timer(wdev_id);

        if let Some(id) = self.contexts[idx].sp.request_id.take() {
            self.cancel(wdev_id, id);
        }

        if let Some(idx) = self.context_index(wdev_id) {
            let sp = &mut self.contexts[idx].sp;
            sp.interval = 0;
            sp.trigger = None;
            sp.notify = None;
            sp.needs_active_scan = false;
        }

        true
    }

    /// Submits the next periodic request. Active iff active scanning is
    /// globally enabled, or a hidden BSS was sighted and a hidden network
    /// is configured; passive otherwise.
    fn periodic_queue(&mut self, wdev_id: u64) {
        let Some(idx) = self.context_index(wdev_id) else {
            return;
        };

        let active = self.settings.enable_active_scanning
            || (self.contexts[idx].sp.needs_active_scan
                && self.known_networks.has_hidden());

        let mut params = ScanParameters::default();
        if active {
            params.randomize_mac_addr_hint = true;
            self.contexts[idx].sp.needs_active_scan = false;
        }

        let trigger: TriggerFn = Box::new(move |service, result| {
            service.periodic_triggered(wdev_id, result)
        });
        let notify: NotifyFn = Box::new(move |service, result| {
            service.periodic_notified(wdev_id, result)
        });
        let destroy: DestroyFn = Box::new(move |service| {
            if let Some(idx) = service.context_index(wdev_id) {
                service.contexts[idx].sp.request_id = None;
            }
        });

        let id = self.scan_common(
            wdev_id,
            !active,
            &params,
            WORK_PRIORITY_PERIODIC_SCAN,
            true,
            Some(trigger),
            Some(notify),
            Some(destroy),
        );

        if let Some(idx) = self.context_index(wdev_id) {
            self.contexts[idx].sp.request_id = id;
        }
    }

    fn periodic_triggered(
        &mut self,
        wdev_id: u64,
        result: Result<(), ScanError>,
    ) {
        if result.is_err() {
            self.periodic_rearm(wdev_id);
            return;
        }

        log::debug!("periodic scan triggered for wdev {wdev_id:x}");

        let Some(idx) = self.context_index(wdev_id) else {
            return;
        };
        let Some(mut trigger) = self.contexts[idx].sp.trigger.take() else {
            return;
        };
        trigger(self, Ok(()));
        if let Some(idx) = self.context_index(wdev_id) {
            let sp = &mut self.contexts[idx].sp;
            if sp.interval != 0 && sp.trigger.is_none() {
                sp.trigger = Some(trigger);
            }
        }
    }

    fn periodic_notified(
        &mut self,
        wdev_id: u64,
        result: Result<ScanResults, ScanError>,
    ) {
        self.periodic_rearm(wdev_id);
        self.call_periodic_notify(wdev_id, result);
    }

    fn call_periodic_notify(
        &mut self,
        wdev_id: u64,
        result: Result<ScanResults, ScanError>,
    ) {
        let Some(idx) = self.context_index(wdev_id) else {
            return;
        };
        let Some(mut notify) = self.contexts[idx].sp.notify.take() else {
            return;
        };
        notify(self, result);
        if let Some(idx) = self.context_index(wdev_id) {
            let sp = &mut self.contexts[idx].sp;
            if sp.interval != 0 && sp.notify.is_none() {
                sp.notify = Some(notify);
            }
        }
    }

    fn periodic_rearm(&mut self, wdev_id: u64) {
        let Some(idx) = self.context_index(wdev_id) else {
            return;
        };
        let interval = self.contexts[idx].sp.interval;
        if interval == 0 {
            return;
        }

        log::debug!("arming periodic scan timer: {interval}");
        self.driver
            .arm_periodic_timer(wdev_id, Duration::from_secs(interval.into()));
    }

    fn periodic_timer_fired(&mut self, wdev_id: u64) {
        let Some(idx) = self.context_index(wdev_id) else {
            return;
        };
        let (interval, scan_pending) = {
            let sp = &self.contexts[idx].sp;
            (sp.interval, sp.request_id.is_some())
        };
        if interval == 0 {
            return;
        }

        // Timer fired before the previous periodic scan completed; just
        // rearm with the same interval
        if scan_pending {
            log::debug!("periodic scan timer fired before scan could start");
            self.periodic_rearm(wdev_id);
            return;
        }

        self.contexts[idx].sp.interval = interval
            .saturating_mul(2)
            .min(self.settings.maximum_periodic_scan_interval);

        self.periodic_queue(wdev_id);
    }
}
