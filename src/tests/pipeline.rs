// SPDX-License-Identifier: MIT

use std::{
    cell::{Cell, RefCell},
    rc::Rc,
};

use crate::{
    DestroyFn, FrequencySet, KnownNetwork, Nl80211Attr, Nl80211BssInfo,
    Nl80211Command, Nl80211Message, Nl80211ScanFlags, NotifyFn,
    PeriodicNotifyFn, ScanError, ScanEvent, ScanParameters, ScanResults,
    ScanSettings, Wiphy,
};

use super::{plain_wiphy, service_with, WDEV};

type NotifyLog = Rc<RefCell<Vec<Result<ScanResults, ScanError>>>>;

fn capture_notify(log: &NotifyLog) -> NotifyFn {
    let log = log.clone();
    Box::new(move |_service, result| log.borrow_mut().push(result))
}

fn capture_periodic_notify(log: &NotifyLog) -> PeriodicNotifyFn {
    let log = log.clone();
    Box::new(move |_service, result| log.borrow_mut().push(result))
}

fn count_destroy(counter: &Rc<Cell<u32>>) -> DestroyFn {
    let counter = counter.clone();
    Box::new(move |_service| counter.set(counter.get() + 1))
}

fn notif(cmd: Nl80211Command, extra: Vec<Nl80211Attr>) -> Nl80211Message {
    let mut attributes = vec![Nl80211Attr::Wdev(WDEV), Nl80211Attr::Wiphy(0)];
    attributes.extend(extra);
    Nl80211Message { cmd, attributes }
}

fn scan_done() -> Nl80211Message {
    notif(Nl80211Command::NewScanResults, vec![])
}

fn ssid_ie(ssid: &[u8]) -> Vec<u8> {
    let mut ie = vec![0u8, ssid.len() as u8];
    ie.extend(ssid);
    ie
}

/// One GET_SCAN dump entry; `rates` carries a Supported Rates element so
/// the data-rate estimate differs from the fallback.
fn bss_entry(last_octet: u8, frequency: u32, signal_mbm: i32, ies: Vec<u8>)
    -> Nl80211Message
{
    Nl80211Message {
        cmd: Nl80211Command::NewScanResults,
        attributes: vec![
            Nl80211Attr::Wdev(WDEV),
            Nl80211Attr::Bss(vec![
                Nl80211BssInfo::Bssid([0, 0, 0, 0, 0, last_octet]),
                Nl80211BssInfo::Frequency(frequency),
                Nl80211BssInfo::SignalMbm(signal_mbm),
                Nl80211BssInfo::InformationElements(ies),
            ]),
        ],
    }
}

fn ssids_of(message: &Nl80211Message) -> Option<Vec<Vec<u8>>> {
    message.attributes.iter().find_map(|a| match a {
        Nl80211Attr::ScanSsids(ssids) => Some(ssids.clone()),
        _ => None,
    })
}

fn freqs_of(message: &Nl80211Message) -> Option<Vec<u32>> {
    message.attributes.iter().find_map(|a| match a {
        Nl80211Attr::ScanFrequencies(freqs) => Some(freqs.clone()),
        _ => None,
    })
}

fn flags_of(message: &Nl80211Message) -> Nl80211ScanFlags {
    message
        .attributes
        .iter()
        .find_map(|a| match a {
            Nl80211Attr::ScanFlags(flags) => Some(*flags),
            _ => None,
        })
        .unwrap_or_default()
}

fn ack(service: &mut crate::ScanService, cmd_id: u32) {
    service.dispatch(ScanEvent::CommandAck {
        cmd_id,
        result: Ok(()),
    });
}

fn hidden(ssid: &[u8]) -> KnownNetwork {
    KnownNetwork {
        ssid: ssid.to_vec(),
        is_hidden: true,
    }
}

#[test]
fn passive_scan_delivers_ranked_results() {
    let settings = ScanSettings {
        rank_5g_factor: 1.2,
        ..Default::default()
    };
    let (driver, mut service) = service_with(plain_wiphy(), vec![], settings);
    let log: NotifyLog = Rc::new(RefCell::new(Vec::new()));
    let destroys = Rc::new(Cell::new(0));

    let freqs = FrequencySet::from([2462u32, 2412, 2437].as_slice());
    service
        .passive(
            WDEV,
            freqs,
            None,
            Some(capture_notify(&log)),
            Some(count_destroy(&destroys)),
        )
        .unwrap();

    let (cmd_id, trigger) = driver.last_trigger().unwrap();
    assert_eq!(trigger.cmd, Nl80211Command::TriggerScan);
    assert!(ssids_of(&trigger).is_none());
    assert_eq!(freqs_of(&trigger), Some(vec![2412, 2437, 2462]));

    ack(&mut service, cmd_id);
    assert!(log.borrow().is_empty());

    service.dispatch(ScanEvent::Notification {
        message: notif(
            Nl80211Command::NewScanResults,
            vec![Nl80211Attr::ScanFrequencies(vec![2412, 2437, 2462])],
        ),
    });

    let (dump_id, dump) = driver.last_dump().unwrap();
    assert_eq!(dump.cmd, Nl80211Command::GetScan);

    // Same rates on 2.4 and 5 GHz; the 5 GHz BSS must rank first
    let rates = vec![0x01, 0x01, 0x6c];
    let mut ies_a = ssid_ie(b"a");
    ies_a.extend(&rates);
    let mut ies_b = ssid_ie(b"b");
    ies_b.extend(&rates);
    service.dispatch(ScanEvent::DumpEntry {
        cmd_id: dump_id,
        message: bss_entry(1, 2437, -4000, ies_a),
    });
    service.dispatch(ScanEvent::DumpEntry {
        cmd_id: dump_id,
        message: bss_entry(2, 5200, -5000, ies_b),
    });
    service.dispatch(ScanEvent::DumpDone { cmd_id: dump_id });

    let log = log.borrow();
    assert_eq!(log.len(), 1);
    let results = log[0].as_ref().unwrap();
    assert_eq!(results.bss_list.len(), 2);
    assert_eq!(results.bss_list[0].frequency, 5200);
    assert!(results.bss_list[0].rank > results.bss_list[1].rank);
    assert_eq!(
        results.freqs.as_ref().unwrap().to_vec(),
        vec![2412, 2437, 2462]
    );
    assert_eq!(destroys.get(), 1);
}

#[test]
fn hidden_ssid_batching_splits_triggers() {
    let wiphy = Wiphy {
        max_num_ssids_per_scan: 2,
        ..Default::default()
    };
    let known = vec![
        hidden(b"A"),
        hidden(b"B"),
        KnownNetwork {
            ssid: b"visible".to_vec(),
            is_hidden: false,
        },
        hidden(b"C"),
        hidden(b"D"),
        hidden(b"E"),
    ];
    let (driver, mut service) =
        service_with(wiphy, known, ScanSettings::default());
    let log: NotifyLog = Rc::new(RefCell::new(Vec::new()));

    let params = ScanParameters {
        flush: true,
        ..Default::default()
    };
    service
        .active_with_params(
            WDEV,
            &params,
            None,
            Some(capture_notify(&log)),
            None,
        )
        .unwrap();

    let (cmd1, msg1) = driver.last_trigger().unwrap();
    assert_eq!(ssids_of(&msg1).unwrap(), vec![b"A".to_vec(), b"B".to_vec()]);
    assert!(flags_of(&msg1).contains(Nl80211ScanFlags::Flush));

    ack(&mut service, cmd1);
    service.dispatch(ScanEvent::Notification {
        message: scan_done(),
    });

    let (cmd2, msg2) = driver.last_trigger().unwrap();
    assert_ne!(cmd2, cmd1);
    assert_eq!(ssids_of(&msg2).unwrap(), vec![b"C".to_vec(), b"D".to_vec()]);
    assert!(!flags_of(&msg2).contains(Nl80211ScanFlags::Flush));

    ack(&mut service, cmd2);
    service.dispatch(ScanEvent::Notification {
        message: scan_done(),
    });

    let (cmd3, msg3) = driver.last_trigger().unwrap();
    assert_eq!(ssids_of(&msg3).unwrap(), vec![b"E".to_vec(), Vec::new()]);
    assert!(!flags_of(&msg3).contains(Nl80211ScanFlags::Flush));

    ack(&mut service, cmd3);
    assert!(driver.last_dump().is_none());
    service.dispatch(ScanEvent::Notification {
        message: scan_done(),
    });

    let (dump_id, _) = driver.last_dump().unwrap();
    service.dispatch(ScanEvent::DumpDone { cmd_id: dump_id });

    let log = log.borrow();
    assert_eq!(log.len(), 1);
    assert!(log[0].is_ok());
}

#[test]
fn busy_trigger_recovers_when_the_external_scan_completes() {
    let (driver, mut service) =
        service_with(plain_wiphy(), vec![], ScanSettings::default());
    let log: NotifyLog = Rc::new(RefCell::new(Vec::new()));
    let destroys = Rc::new(Cell::new(0));

    service
        .passive(
            WDEV,
            FrequencySet::from([2412u32].as_slice()),
            None,
            Some(capture_notify(&log)),
            Some(count_destroy(&destroys)),
        )
        .unwrap();

    let (cmd1, _) = driver.last_trigger().unwrap();
    service.dispatch(ScanEvent::CommandAck {
        cmd_id: cmd1,
        result: Err(ScanError::Busy),
    });

    // Neither failed nor retried yet
    assert!(log.borrow().is_empty());
    assert_eq!(driver.trigger_count(), 1);

    // The external scan finishes and our trigger is re-issued
    service.dispatch(ScanEvent::Notification {
        message: scan_done(),
    });
    assert_eq!(driver.trigger_count(), 2);

    let (cmd2, _) = driver.last_trigger().unwrap();
    ack(&mut service, cmd2);
    service.dispatch(ScanEvent::Notification {
        message: scan_done(),
    });
    let (dump_id, _) = driver.last_dump().unwrap();
    service.dispatch(ScanEvent::DumpDone { cmd_id: dump_id });

    let log = log.borrow();
    assert_eq!(log.len(), 1);
    assert!(log[0].is_ok());
    assert_eq!(destroys.get(), 1);
}

#[test]
fn cancel_while_trigger_in_flight_cancels_the_command_and_advances() {
    let (driver, mut service) =
        service_with(plain_wiphy(), vec![], ScanSettings::default());
    let log: NotifyLog = Rc::new(RefCell::new(Vec::new()));
    let destroys = Rc::new(Cell::new(0));

    let first = service
        .passive(
            WDEV,
            FrequencySet::from([2412u32].as_slice()),
            None,
            Some(capture_notify(&log)),
            Some(count_destroy(&destroys)),
        )
        .unwrap();
    service
        .passive(
            WDEV,
            FrequencySet::from([2437u32].as_slice()),
            None,
            None,
            None,
        )
        .unwrap();

    let (cmd1, _) = driver.last_trigger().unwrap();
    assert_eq!(driver.trigger_count(), 1);

    assert!(service.cancel(WDEV, first));
    assert_eq!(destroys.get(), 1);
    assert!(log.borrow().is_empty());
    assert_eq!(driver.canceled_cmd_ids(), vec![cmd1]);

    // The queue moved on to the second request
    assert_eq!(driver.trigger_count(), 2);

    // Canceling twice is harmless
    assert!(!service.cancel(WDEV, first));
    assert_eq!(destroys.get(), 1);
}

#[test]
fn cancel_after_trigger_discards_results_quietly() {
    let (driver, mut service) =
        service_with(plain_wiphy(), vec![], ScanSettings::default());
    let log: NotifyLog = Rc::new(RefCell::new(Vec::new()));
    let destroys = Rc::new(Cell::new(0));

    let id = service
        .passive(
            WDEV,
            FrequencySet::from([2412u32].as_slice()),
            None,
            Some(capture_notify(&log)),
            Some(count_destroy(&destroys)),
        )
        .unwrap();

    let (cmd1, _) = driver.last_trigger().unwrap();
    service.dispatch(ScanEvent::Notification {
        message: notif(
            Nl80211Command::TriggerScan,
            vec![Nl80211Attr::ScanStartTimeTsf(777)],
        ),
    });
    ack(&mut service, cmd1);

    assert_eq!(service.triggered_time(WDEV, id), Some(777));

    assert!(service.cancel(WDEV, id));
    assert_eq!(destroys.get(), 1);

    // The scan completes naturally; no dump is requested and notify
    // stays silent
    service.dispatch(ScanEvent::Notification {
        message: scan_done(),
    });
    assert!(driver.last_dump().is_none());
    assert!(log.borrow().is_empty());
    assert_eq!(destroys.get(), 1);
    assert_eq!(service.triggered_time(WDEV, id), None);
}

#[test]
fn external_flush_fails_a_started_request() {
    let wiphy = Wiphy {
        max_num_ssids_per_scan: 1,
        ..Default::default()
    };
    let (driver, mut service) =
        service_with(wiphy, vec![hidden(b"h")], ScanSettings::default());
    let log: NotifyLog = Rc::new(RefCell::new(Vec::new()));
    let destroys = Rc::new(Cell::new(0));

    service
        .active(
            WDEV,
            Vec::new(),
            None,
            Some(capture_notify(&log)),
            Some(count_destroy(&destroys)),
        )
        .unwrap();

    // First segment (the hidden SSID) triggers fine
    let (cmd1, msg1) = driver.last_trigger().unwrap();
    assert_eq!(ssids_of(&msg1).unwrap(), vec![b"h".to_vec()]);
    ack(&mut service, cmd1);

    // Our segment finished; the wildcard segment goes out
    service.dispatch(ScanEvent::Notification {
        message: scan_done(),
    });
    assert_eq!(driver.trigger_count(), 2);

    // Before its ack, another client's flushing scan completes and
    // wipes our accumulated results
    service.dispatch(ScanEvent::Notification {
        message: notif(
            Nl80211Command::NewScanResults,
            vec![Nl80211Attr::ScanFlags(Nl80211ScanFlags::Flush)],
        ),
    });

    let log = log.borrow();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0], Err(ScanError::ResultsFlushed));
    assert_eq!(destroys.get(), 1);
}

#[test]
fn kernel_abort_cancels_a_triggered_request() {
    let (driver, mut service) =
        service_with(plain_wiphy(), vec![], ScanSettings::default());
    let log: NotifyLog = Rc::new(RefCell::new(Vec::new()));
    let destroys = Rc::new(Cell::new(0));

    service
        .passive(
            WDEV,
            FrequencySet::from([2412u32].as_slice()),
            None,
            Some(capture_notify(&log)),
            Some(count_destroy(&destroys)),
        )
        .unwrap();
    let (cmd1, _) = driver.last_trigger().unwrap();
    ack(&mut service, cmd1);

    service.dispatch(ScanEvent::Notification {
        message: notif(Nl80211Command::ScanAborted, vec![]),
    });

    let log = log.borrow();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0], Err(ScanError::Canceled));
    assert_eq!(destroys.get(), 1);
}

#[test]
fn abort_of_an_external_scan_retries_the_blocked_request() {
    let (driver, mut service) =
        service_with(plain_wiphy(), vec![], ScanSettings::default());

    service
        .passive(
            WDEV,
            FrequencySet::from([2412u32].as_slice()),
            None,
            None,
            None,
        )
        .unwrap();
    let (cmd1, _) = driver.last_trigger().unwrap();
    service.dispatch(ScanEvent::CommandAck {
        cmd_id: cmd1,
        result: Err(ScanError::Busy),
    });

    service.dispatch(ScanEvent::Notification {
        message: notif(Nl80211Command::ScanAborted, vec![]),
    });
    assert_eq!(driver.trigger_count(), 2);
}

#[test]
fn periodic_backoff_doubles_and_clamps() {
    let settings = ScanSettings {
        initial_periodic_scan_interval: 10,
        maximum_periodic_scan_interval: 30,
        ..Default::default()
    };
    let (driver, mut service) = service_with(plain_wiphy(), vec![], settings);
    let log: NotifyLog = Rc::new(RefCell::new(Vec::new()));

    service.periodic_start(
        WDEV,
        None,
        Some(capture_periodic_notify(&log)),
    );

    let complete_cycle = |service: &mut crate::ScanService| {
        let (cmd_id, msg) = driver.last_trigger().unwrap();
        // No active scanning configured and no hidden sightings
        assert!(ssids_of(&msg).is_none());
        ack(service, cmd_id);
        service.dispatch(ScanEvent::Notification {
            message: scan_done(),
        });
        let (dump_id, _) = driver.last_dump().unwrap();
        service.dispatch(ScanEvent::DumpDone { cmd_id: dump_id });
    };

    complete_cycle(&mut service);
    for _ in 0..3 {
        service.dispatch(ScanEvent::PeriodicTimer { wdev_id: WDEV });
        complete_cycle(&mut service);
    }

    assert_eq!(driver.armed_intervals(), vec![10, 20, 30, 30]);
    assert_eq!(log.borrow().len(), 4);
}

#[test]
fn hidden_results_promote_the_next_periodic_scan_to_active() {
    let wiphy = Wiphy {
        max_num_ssids_per_scan: 4,
        supports_randomize_mac_addr: true,
        ..Default::default()
    };
    let (driver, mut service) =
        service_with(wiphy, vec![hidden(b"h")], ScanSettings::default());
    let log: NotifyLog = Rc::new(RefCell::new(Vec::new()));

    service.periodic_start(
        WDEV,
        None,
        Some(capture_periodic_notify(&log)),
    );

    let (cmd1, msg1) = driver.last_trigger().unwrap();
    assert!(ssids_of(&msg1).is_none());
    ack(&mut service, cmd1);
    service.dispatch(ScanEvent::Notification {
        message: scan_done(),
    });

    let (dump_id, _) = driver.last_dump().unwrap();
    service.dispatch(ScanEvent::DumpEntry {
        cmd_id: dump_id,
        message: bss_entry(1, 2412, -3000, ssid_ie(b"")),
    });
    service.dispatch(ScanEvent::DumpDone { cmd_id: dump_id });
    assert_eq!(log.borrow().len(), 1);

    service.dispatch(ScanEvent::PeriodicTimer { wdev_id: WDEV });

    let (_, msg2) = driver.last_trigger().unwrap();
    let ssids = ssids_of(&msg2).unwrap();
    assert!(ssids.contains(&b"h".to_vec()));
    assert_eq!(ssids.last(), Some(&Vec::new()));
    assert!(flags_of(&msg2).contains(Nl80211ScanFlags::RandomAddr));
}

#[test]
fn periodic_abort_is_silent() {
    let (driver, mut service) =
        service_with(plain_wiphy(), vec![], ScanSettings::default());
    let log: NotifyLog = Rc::new(RefCell::new(Vec::new()));

    service.periodic_start(
        WDEV,
        None,
        Some(capture_periodic_notify(&log)),
    );
    let (cmd1, _) = driver.last_trigger().unwrap();
    ack(&mut service, cmd1);

    service.dispatch(ScanEvent::Notification {
        message: notif(Nl80211Command::ScanAborted, vec![]),
    });

    assert!(log.borrow().is_empty());
    assert!(driver.armed_intervals().is_empty());
}

#[test]
fn periodic_start_is_a_no_op_when_disabled() {
    let settings = ScanSettings {
        disable_periodic_scan: true,
        ..Default::default()
    };
    let (driver, mut service) = service_with(plain_wiphy(), vec![], settings);

    service.periodic_start(WDEV, None, None);
    assert_eq!(driver.trigger_count(), 0);
    assert!(!service.periodic_stop(WDEV));
}

#[test]
fn firmware_scan_reports_the_cached_results_or_empty_cache() {
    let (driver, mut service) =
        service_with(plain_wiphy(), vec![], ScanSettings::default());
    let log: NotifyLog = Rc::new(RefCell::new(Vec::new()));
    let destroys = Rc::new(Cell::new(0));

    assert!(service.firmware_scan(
        WDEV,
        capture_notify(&log),
        Some(count_destroy(&destroys))
    ));
    let (dump_id, _) = driver.last_dump().unwrap();
    service.dispatch(ScanEvent::DumpDone { cmd_id: dump_id });

    assert_eq!(log.borrow().len(), 1);
    assert_eq!(*log.borrow().last().unwrap(), Err(ScanError::EmptyCache));
    assert_eq!(destroys.get(), 1);

    assert!(service.firmware_scan(
        WDEV,
        capture_notify(&log),
        Some(count_destroy(&destroys))
    ));
    let (dump_id, _) = driver.last_dump().unwrap();
    service.dispatch(ScanEvent::DumpEntry {
        cmd_id: dump_id,
        message: bss_entry(9, 5180, -2000, ssid_ie(b"roamed")),
    });
    service.dispatch(ScanEvent::DumpDone { cmd_id: dump_id });

    let log = log.borrow();
    assert_eq!(log.len(), 2);
    let results = log[1].as_ref().unwrap();
    assert_eq!(results.bss_list.len(), 1);
    assert_eq!(results.bss_list[0].ssid, b"roamed");
    assert_eq!(destroys.get(), 2);
}

#[test]
fn wdev_remove_drops_requests_silently() {
    let (driver, mut service) =
        service_with(plain_wiphy(), vec![], ScanSettings::default());
    let log: NotifyLog = Rc::new(RefCell::new(Vec::new()));
    let destroys = Rc::new(Cell::new(0));

    service
        .passive(
            WDEV,
            FrequencySet::from([2412u32].as_slice()),
            None,
            Some(capture_notify(&log)),
            Some(count_destroy(&destroys)),
        )
        .unwrap();
    service
        .passive(
            WDEV,
            FrequencySet::from([2437u32].as_slice()),
            None,
            Some(capture_notify(&log)),
            Some(count_destroy(&destroys)),
        )
        .unwrap();

    let (cmd1, _) = driver.last_trigger().unwrap();

    assert!(service.wdev_remove(WDEV));
    assert_eq!(destroys.get(), 2);
    assert!(log.borrow().is_empty());
    assert_eq!(driver.canceled_cmd_ids(), vec![cmd1]);

    assert!(!service.wdev_remove(WDEV));
}

#[test]
fn no_cck_scan_strips_the_b_rates_or_omits_the_clause() {
    let wiphy = Wiphy {
        rates_2ghz: vec![2, 4, 11, 22, 12, 18, 24, 36],
        ..plain_wiphy()
    };
    let (driver, mut service) =
        service_with(wiphy, vec![], ScanSettings::default());

    let params = ScanParameters {
        no_cck_rates: true,
        ssid: Some(b"net".to_vec()),
        ..Default::default()
    };
    service
        .active_with_params(WDEV, &params, None, None, None)
        .unwrap();

    let (_, msg) = driver.last_trigger().unwrap();
    assert!(msg
        .attributes
        .iter()
        .any(|a| matches!(a, Nl80211Attr::TxNoCckRate)));
    let rates = msg
        .attributes
        .iter()
        .find_map(|a| match a {
            Nl80211Attr::ScanSuppRates(bands) => Some(bands.clone()),
            _ => None,
        })
        .unwrap();
    assert_eq!(rates.len(), 1);
    assert_eq!(rates[0].band, 0);
    assert_eq!(rates[0].rates, vec![12, 18, 24, 36]);

    // A pure 802.11b rate set leaves nothing to advertise
    let wiphy = Wiphy {
        rates_2ghz: vec![2, 4, 11, 22],
        ..plain_wiphy()
    };
    let (driver, mut service) =
        service_with(wiphy, vec![], ScanSettings::default());
    service
        .active_with_params(WDEV, &params, None, None, None)
        .unwrap();

    let (_, msg) = driver.last_trigger().unwrap();
    assert!(!msg
        .attributes
        .iter()
        .any(|a| matches!(a, Nl80211Attr::TxNoCckRate)));
    assert!(!msg
        .attributes
        .iter()
        .any(|a| matches!(a, Nl80211Attr::ScanSuppRates(_))));
}

#[test]
fn probe_request_elements_keep_table_9_33_order() {
    let ext_capa = vec![127, 8, 0, 0, 0, 0x80, 0, 0, 0, 0];
    let wiphy = Wiphy {
        max_scan_ie_len: 256,
        extended_capabilities: ext_capa.clone(),
        ..plain_wiphy()
    };
    let (driver, mut service) =
        service_with(wiphy, vec![], ScanSettings::default());

    let extra_ie = vec![0xdd, 0x02, 0x00, 0x50];
    let params = ScanParameters {
        ssid: Some(b"net".to_vec()),
        extra_ie: extra_ie.clone(),
        ..Default::default()
    };
    service
        .active_with_params(WDEV, &params, None, None, None)
        .unwrap();

    let (_, msg) = driver.last_trigger().unwrap();
    let ie = msg
        .attributes
        .iter()
        .find_map(|a| match a {
            Nl80211Attr::Ie(ie) => Some(ie.clone()),
            _ => None,
        })
        .unwrap();

    let mut expected = ext_capa.clone();
    // Interworking, access network type private
    expected.extend([107, 1, 0]);
    expected.extend(&extra_ie);
    assert_eq!(ie, expected);

    // Without the interworking capability bit only the extended
    // capabilities and the caller's elements go out
    let ext_capa = vec![127, 8, 0, 0, 0, 0, 0, 0, 0, 0];
    let wiphy = Wiphy {
        max_scan_ie_len: 256,
        extended_capabilities: ext_capa.clone(),
        ..plain_wiphy()
    };
    let (driver, mut service) =
        service_with(wiphy, vec![], ScanSettings::default());
    service
        .active_with_params(WDEV, &params, None, None, None)
        .unwrap();

    let (_, msg) = driver.last_trigger().unwrap();
    let ie = msg
        .attributes
        .iter()
        .find_map(|a| match a {
            Nl80211Attr::Ie(ie) => Some(ie.clone()),
            _ => None,
        })
        .unwrap();
    let mut expected = ext_capa;
    expected.extend(&extra_ie);
    assert_eq!(ie, expected);
}

#[test]
fn owe_hidden_combines_targets_sharing_an_ssid() {
    let (driver, mut service) =
        service_with(plain_wiphy(), vec![], ScanSettings::default());

    let mut open_a = crate::Bss::default();
    open_a.frequency = 2412;
    open_a.owe_transition = Some(crate::OweTransition {
        bssid: [1; 6],
        ssid: b"owe-net".to_vec(),
        band_info: None,
    });
    let mut open_b = open_a.clone();
    open_b.frequency = 5200;
    open_b.owe_transition = Some(crate::OweTransition {
        bssid: [2; 6],
        ssid: b"owe-net".to_vec(),
        // Operating class 115 channel 36 is 5180 MHz
        band_info: Some((115, 36)),
    });

    service
        .owe_hidden(WDEV, &[&open_a, &open_b], None, None, None)
        .unwrap();

    assert_eq!(driver.trigger_count(), 1);
    let (_, msg) = driver.last_trigger().unwrap();
    assert_eq!(ssids_of(&msg).unwrap(), vec![b"owe-net".to_vec()]);
    assert_eq!(freqs_of(&msg), Some(vec![2412, 5180]));
    assert!(flags_of(&msg).contains(Nl80211ScanFlags::Flush));
}

#[test]
fn owe_hidden_with_differing_ssids_queues_one_command_each() {
    let (driver, mut service) =
        service_with(plain_wiphy(), vec![], ScanSettings::default());

    let mut open_a = crate::Bss::default();
    open_a.frequency = 2412;
    open_a.owe_transition = Some(crate::OweTransition {
        bssid: [1; 6],
        ssid: b"owe-a".to_vec(),
        band_info: None,
    });
    let mut open_b = crate::Bss::default();
    open_b.frequency = 2437;
    open_b.owe_transition = Some(crate::OweTransition {
        bssid: [2; 6],
        ssid: b"owe-b".to_vec(),
        band_info: None,
    });

    service
        .owe_hidden(WDEV, &[&open_a, &open_b], None, None, None)
        .unwrap();

    // First command carries FLUSH, the follow-up must not wipe the
    // first target's results
    let (cmd1, msg1) = driver.last_trigger().unwrap();
    assert_eq!(ssids_of(&msg1).unwrap(), vec![b"owe-a".to_vec()]);
    assert!(flags_of(&msg1).contains(Nl80211ScanFlags::Flush));

    ack(&mut service, cmd1);
    service.dispatch(ScanEvent::Notification {
        message: scan_done(),
    });

    let (_, msg2) = driver.last_trigger().unwrap();
    assert_eq!(ssids_of(&msg2).unwrap(), vec![b"owe-b".to_vec()]);
    assert!(!flags_of(&msg2).contains(Nl80211ScanFlags::Flush));
}

#[test]
fn notifications_for_unknown_radios_are_ignored() {
    let (driver, mut service) =
        service_with(plain_wiphy(), vec![], ScanSettings::default());

    service.dispatch(ScanEvent::Notification {
        message: Nl80211Message {
            cmd: Nl80211Command::NewScanResults,
            attributes: vec![Nl80211Attr::Wdev(0xdead)],
        },
    });
    assert!(driver.take_ops().is_empty());
}
