// SPDX-License-Identifier: MIT

use std::time::Duration;

use crate::{Nl80211Message, ScanError};

/// The edge between the single-threaded scan core and the outside world:
/// the nl80211 family socket plus a timer wheel.
///
/// Commands return a non-zero command id; the matching [ScanEvent] carries
/// it back in. After [Self::cancel] no further event for that id may be
/// delivered.
pub trait ScanDriver {
    /// Sends an acked command; completion arrives as
    /// [ScanEvent::CommandAck].
    fn send_trigger(&mut self, msg: Nl80211Message)
        -> Result<u32, ScanError>;

    /// Starts a dump; entries arrive as [ScanEvent::DumpEntry] followed by
    /// one [ScanEvent::DumpDone].
    fn start_dump(&mut self, msg: Nl80211Message) -> Result<u32, ScanError>;

    fn cancel(&mut self, cmd_id: u32);

    /// Arms (or re-arms) the periodic scan timer for one radio; fires as
    /// [ScanEvent::PeriodicTimer].
    fn arm_periodic_timer(&mut self, wdev_id: u64, interval: Duration);

    fn cancel_periodic_timer(&mut self, wdev_id: u64);

    /// Monotonic clock in microseconds, used to timestamp BSS records.
    fn now_us(&mut self) -> u64;
}

/// Everything the daemon's event loop feeds back into
/// [crate::ScanService::dispatch].
#[derive(Debug)]
pub enum ScanEvent {
    CommandAck {
        cmd_id: u32,
        result: Result<(), ScanError>,
    },
    DumpEntry {
        cmd_id: u32,
        message: Nl80211Message,
    },
    DumpDone {
        cmd_id: u32,
    },
    /// A message from the nl80211 "scan" multicast group
    Notification {
        message: Nl80211Message,
    },
    PeriodicTimer {
        wdev_id: u64,
    },
}
