// SPDX-License-Identifier: MIT

mod pipeline;

use std::{cell::RefCell, rc::Rc, time::Duration};

use crate::{
    KnownNetwork, Nl80211Message, ScanDriver, ScanError, ScanService,
    ScanSettings, StaticWiphyRegistry, Wiphy,
};

pub(crate) const WDEV: u64 = 0x1001;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum DriverOp {
    Trigger { cmd_id: u32, message: Nl80211Message },
    Dump { cmd_id: u32, message: Nl80211Message },
    Cancel { cmd_id: u32 },
    ArmTimer { wdev_id: u64, interval: Duration },
    CancelTimer { wdev_id: u64 },
}

#[derive(Debug, Default)]
pub(crate) struct MockState {
    pub ops: Vec<DriverOp>,
    pub now_us: u64,
    next_cmd_id: u32,
}

/// Records every driver call; the test feeds completions back through
/// [ScanService::dispatch] by hand.
#[derive(Debug, Clone, Default)]
pub(crate) struct MockDriver(pub Rc<RefCell<MockState>>);

impl MockDriver {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn take_ops(&self) -> Vec<DriverOp> {
        std::mem::take(&mut self.0.borrow_mut().ops)
    }

    pub(crate) fn last_trigger(&self) -> Option<(u32, Nl80211Message)> {
        self.0.borrow().ops.iter().rev().find_map(|op| match op {
            DriverOp::Trigger { cmd_id, message } => {
                Some((*cmd_id, message.clone()))
            }
            _ => None,
        })
    }

    pub(crate) fn last_dump(&self) -> Option<(u32, Nl80211Message)> {
        self.0.borrow().ops.iter().rev().find_map(|op| match op {
            DriverOp::Dump { cmd_id, message } => {
                Some((*cmd_id, message.clone()))
            }
            _ => None,
        })
    }

    pub(crate) fn trigger_count(&self) -> usize {
        self.0
            .borrow()
            .ops
            .iter()
            .filter(|op| matches!(op, DriverOp::Trigger { .. }))
            .count()
    }

    pub(crate) fn armed_intervals(&self) -> Vec<u64> {
        self.0
            .borrow()
            .ops
            .iter()
            .filter_map(|op| match op {
                DriverOp::ArmTimer { interval, .. } => {
                    Some(interval.as_secs())
                }
                _ => None,
            })
            .collect()
    }

    pub(crate) fn canceled_cmd_ids(&self) -> Vec<u32> {
        self.0
            .borrow()
            .ops
            .iter()
            .filter_map(|op| match op {
                DriverOp::Cancel { cmd_id } => Some(*cmd_id),
                _ => None,
            })
            .collect()
    }
}

impl ScanDriver for MockDriver {
    fn send_trigger(&mut self, msg: Nl80211Message) -> Result<u32, ScanError> {
        let mut state = self.0.borrow_mut();
        state.next_cmd_id += 1;
        let cmd_id = state.next_cmd_id;
        state.ops.push(DriverOp::Trigger {
            cmd_id,
            message: msg,
        });
        Ok(cmd_id)
    }

    fn start_dump(&mut self, msg: Nl80211Message) -> Result<u32, ScanError> {
        let mut state = self.0.borrow_mut();
        state.next_cmd_id += 1;
        let cmd_id = state.next_cmd_id;
        state.ops.push(DriverOp::Dump {
            cmd_id,
            message: msg,
        });
        Ok(cmd_id)
    }

    fn cancel(&mut self, cmd_id: u32) {
        self.0.borrow_mut().ops.push(DriverOp::Cancel { cmd_id });
    }

    fn arm_periodic_timer(&mut self, wdev_id: u64, interval: Duration) {
        self.0
            .borrow_mut()
            .ops
            .push(DriverOp::ArmTimer { wdev_id, interval });
    }

    fn cancel_periodic_timer(&mut self, wdev_id: u64) {
        self.0
            .borrow_mut()
            .ops
            .push(DriverOp::CancelTimer { wdev_id });
    }

    fn now_us(&mut self) -> u64 {
        self.0.borrow().now_us
    }
}

pub(crate) fn plain_wiphy() -> Wiphy {
    Wiphy {
        id: 0,
        max_num_ssids_per_scan: 4,
        ..Default::default()
    }
}

pub(crate) fn service_with(
    wiphy: Wiphy,
    known_networks: Vec<KnownNetwork>,
    settings: ScanSettings,
) -> (MockDriver, ScanService) {
    let driver = MockDriver::new();
    let mut wiphys = StaticWiphyRegistry::new();
    wiphys.insert(WDEV, wiphy);

    let mut service = ScanService::new(
        Box::new(driver.clone()),
        Box::new(wiphys),
        Box::new(known_networks),
        settings,
    );
    assert!(service.wdev_add(WDEV));

    (driver, service)
}
