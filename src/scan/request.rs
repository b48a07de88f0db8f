// SPDX-License-Identifier: MIT

use std::collections::VecDeque;

use crate::{
    bytes::get_bit,
    ie::IE_TYPE_INTERWORKING,
    scan::{
        service::{DestroyFn, NotifyFn, TriggerFn},
        Nl80211ScanFlags, ScanParameters,
    },
    wiphy::{Band, ExtFeature, KnownNetworks, WiphyInfo},
    FrequencySet, Nl80211Attr, Nl80211BandRates, Nl80211Message, ScanSettings,
};

/// One user-visible scan operation as it moves through the pipeline.
///
/// `cmds` holds the pre-built trigger message(s); hidden-network sweeps that
/// exceed the radio's SSIDs-per-scan limit become several consecutive
/// triggers whose results accumulate in the kernel until the last one
/// finishes.
pub(crate) struct ScanRequest {
    /// Work queue item id, unique per radio
    pub id: u32,
    pub passive: bool,
    /// Submitted by the periodic scan driver
    pub periodic: bool,
    /// scan_cancel() has been called while the kernel held a command
    pub canceled: bool,
    /// TRIGGER_SCAN succeeded at least once during this request's life
    pub started: bool,
    /// The head of `cmds` was acked by the kernel. Cleared once the scan
    /// finishes and again set for each consecutive segment; false while a
    /// trigger bounced with EBUSY waits for a retry.
    pub triggered: bool,
    /// Completion callback re-entrancy guard
    pub in_callback: bool,
    pub cmds: VecDeque<Nl80211Message>,
    /// Radio TSF at scan start, from the trigger notification
    pub start_time_tsf: u64,
    pub trigger: Option<TriggerFn>,
    pub notify: Option<NotifyFn>,
    pub destroy: Option<DestroyFn>,
}

impl ScanRequest {
    pub(crate) fn new(
        id: u32,
        passive: bool,
        periodic: bool,
        cmds: VecDeque<Nl80211Message>,
        trigger: Option<TriggerFn>,
        notify: Option<NotifyFn>,
        destroy: Option<DestroyFn>,
    ) -> Self {
        Self {
            id,
            passive,
            periodic,
            canceled: false,
            started: false,
            triggered: false,
            in_callback: false,
            cmds,
            start_time_tsf: 0,
            trigger,
            notify,
            destroy,
        }
    }
}

/// The four 802.11b CCK rates in 500 kbit/s units.
const CCK_RATES: [u8; 4] = [2, 4, 11, 22];

/// Probe request elements in IEEE 802.11-2016 Table 9-33 order.
fn build_probe_request_ies(
    wiphy: &dyn WiphyInfo,
    params: &ScanParameters,
) -> Vec<u8> {
    let ext_capa = wiphy.extended_capabilities();
    let mut ies = Vec::new();

    // Order 9 - Extended Capabilities
    ies.extend(ext_capa);

    // Order 12 - Interworking, announced by extended capability bit 31
    // (byte 3 bit 7 of the capability field, after the element header)
    if get_bit(ext_capa, (2 + 3) * 8 + 7) {
        // Private network; INet=0, ASRA=0, ESR=0, UESA=0
        ies.extend([IE_TYPE_INTERWORKING, 1, 0x00]);
    }

    // Order Last (assuming WSC vendor specific)
    ies.extend(&params.extra_ie);

    ies
}

/// Builds one TRIGGER_SCAN message without any SSID list.
///
/// `ignore_flush_flag` is set for the second and later triggers of a batch
/// so results accumulate in the kernel across the segments.
pub(crate) fn build_trigger_command(
    wiphy: &dyn WiphyInfo,
    settings: &ScanSettings,
    wdev_id: u64,
    ignore_flush_flag: bool,
    is_passive: bool,
    params: &ScanParameters,
) -> Nl80211Message {
    let mut attributes = vec![Nl80211Attr::Wdev(wdev_id)];
    let mut flags = Nl80211ScanFlags::empty();

    if wiphy.max_scan_ie_len() > 0 {
        attributes
            .push(Nl80211Attr::Ie(build_probe_request_ies(wiphy, params)));
    }

    if let Some(freqs) = params.freqs.as_ref().filter(|f| !f.is_empty()) {
        attributes.push(Nl80211Attr::ScanFrequencies(freqs.to_vec()));
    }

    if params.flush && !ignore_flush_flag {
        flags |= Nl80211ScanFlags::Flush;
    }

    // Randomizing 46 bits (locally administered 1, multicast 0 is assumed)
    if !is_passive
        && params.randomize_mac_addr_hint
        && wiphy.can_randomize_mac_addr()
        && !settings.disable_mac_address_randomization
    {
        flags |= Nl80211ScanFlags::RandomAddr;
    }

    if !is_passive && wiphy.can_randomize_mac_addr() {
        if let Some(source_mac) = params.source_mac {
            flags |= Nl80211ScanFlags::RandomAddr;
            attributes.push(Nl80211Attr::Mac(source_mac));
            // No random bits
            attributes.push(Nl80211Attr::MacMask([0xff; 6]));
        }
    }

    if !is_passive && wiphy.has_ext_feature(ExtFeature::ScanRandomSn) {
        flags |= Nl80211ScanFlags::RandomSn;
    }

    if !flags.is_empty() {
        attributes.push(Nl80211Attr::ScanFlags(flags));
    }

    if params.no_cck_rates {
        // Probe requests go out at OFDM rates, so don't advertise
        // support for the 802.11b rates either.
        let rates: Vec<u8> = wiphy
            .supported_rates(Band::TwoGhz)
            .iter()
            .copied()
            .filter(|rate| !CCK_RATES.contains(rate))
            .collect();

        if !rates.is_empty() {
            attributes.push(Nl80211Attr::TxNoCckRate);
            attributes.push(Nl80211Attr::ScanSuppRates(vec![
                Nl80211BandRates {
                    band: Band::TwoGhz.kernel_index(),
                    rates,
                },
            ]));
        }
    }

    if wiphy.has_ext_feature(ExtFeature::SetScanDwell) {
        if let Some(duration) = params.duration {
            attributes.push(Nl80211Attr::MeasurementDuration(duration));

            if params.duration_mandatory {
                attributes.push(Nl80211Attr::MeasurementDurationMandatory);
            }
        }
    }

    Nl80211Message::new_trigger_scan(attributes)
}

/// Builds the trigger sequence for one request.
///
/// Passive scans carry no SSID list. An explicit SSID becomes a direct
/// probe. Otherwise every hidden known network is enumerated,
/// `max_num_ssids_per_scan` entries per trigger, and the wildcard SSID is
/// appended last.
pub(crate) fn build_scan_commands(
    wiphy: &dyn WiphyInfo,
    settings: &ScanSettings,
    known_networks: &dyn KnownNetworks,
    wdev_id: u64,
    passive: bool,
    params: &ScanParameters,
) -> VecDeque<Nl80211Message> {
    let mut cmds = VecDeque::new();
    let mut cmd =
        build_trigger_command(wiphy, settings, wdev_id, false, passive, params);

    if passive {
        cmds.push_back(cmd);
        return cmds;
    }

    if let Some(ssid) = &params.ssid {
        // direct probe request scan
        cmd.attributes
            .push(Nl80211Attr::ScanSsids(vec![ssid.clone()]));
        cmds.push_back(cmd);
        return cmds;
    }

    let max_ssids_per_scan = wiphy.max_num_ssids_per_scan().max(1);
    let mut ssids: Vec<Vec<u8>> = Vec::new();
    let mut num_ssids_can_append = max_ssids_per_scan;

    known_networks.for_each(&mut |network| {
        if !network.is_hidden {
            return;
        }

        ssids.push(network.ssid.clone());
        num_ssids_can_append -= 1;

        if num_ssids_can_append == 0 {
            cmd.attributes
                .push(Nl80211Attr::ScanSsids(std::mem::take(&mut ssids)));
            // Consecutive triggers of the batch ignore the flush flag so
            // the results of every segment survive until the last one.
            let next = build_trigger_command(
                wiphy, settings, wdev_id, true, false, params,
            );
            cmds.push_back(std::mem::replace(&mut cmd, next));
            num_ssids_can_append = max_ssids_per_scan;
        }
    });

    ssids.push(Vec::new());
    cmd.attributes.push(Nl80211Attr::ScanSsids(ssids));
    cmds.push_back(cmd);
    cmds
}

/// Single trigger for one OWE transition target, FLUSH on the first
/// command of the request only.
pub(crate) fn build_owe_command(
    wiphy: &dyn WiphyInfo,
    settings: &ScanSettings,
    wdev_id: u64,
    ignore_flush_flag: bool,
    freqs: &FrequencySet,
    ssid: &[u8],
) -> Nl80211Message {
    let params = ScanParameters {
        freqs: Some(freqs.clone()),
        flush: true,
        ..Default::default()
    };

    let mut cmd = build_trigger_command(
        wiphy,
        settings,
        wdev_id,
        ignore_flush_flag,
        false,
        &params,
    );
    cmd.attributes
        .push(Nl80211Attr::ScanSsids(vec![ssid.to_vec()]));
    cmd
}

/// One-off direct probe of a single frequency and SSID by interface
/// index, used outside the request pipeline after a connection candidate
/// appears.
pub fn build_direct_probe_command(
    if_index: u32,
    wiphy: &dyn WiphyInfo,
    frequency: u32,
    ssid: &[u8],
) -> Nl80211Message {
    let mut attributes = vec![
        Nl80211Attr::IfIndex(if_index),
        Nl80211Attr::ScanFrequencies(vec![frequency]),
    ];

    if wiphy.has_ext_feature(ExtFeature::ScanRandomSn) {
        attributes
            .push(Nl80211Attr::ScanFlags(Nl80211ScanFlags::RandomSn));
    }

    // direct probe request scan
    attributes.push(Nl80211Attr::ScanSsids(vec![ssid.to_vec()]));

    Nl80211Message::new_trigger_scan(attributes)
}
