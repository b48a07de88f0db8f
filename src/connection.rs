// SPDX-License-Identifier: MIT

use std::{
    collections::HashMap,
    time::{Duration, Instant},
};

use futures::StreamExt;
use genetlink::{
    message::{map_from_rawgenlmsg, RawGenlMessage},
    GenetlinkHandle,
};
use netlink_packet_core::{
    NetlinkMessage, NetlinkPayload, NLM_F_ACK, NLM_F_DUMP, NLM_F_REQUEST,
};
use netlink_packet_generic::{
    ctrl::{
        nlas::{GenlCtrlAttrs, McastGrpAttrs},
        GenlCtrl, GenlCtrlCmd,
    },
    GenlFamily, GenlMessage,
};
use netlink_proto::sys::{AsyncSocket, TokioSocket};
use tokio::{sync::mpsc, task::JoinHandle};

use crate::{Nl80211Message, ScanDriver, ScanError, ScanEvent};

const NL80211_MULTICAST_GROUP_SCAN: &str = "scan";

/// [ScanDriver] backed by a genetlink connection and the tokio timer
/// wheel. Each kernel command runs as a detached task that reports back
/// through the [ScanEvent] channel; cancel aborts the task so no stale
/// completion is ever delivered.
pub struct GenlScanDriver {
    handle: GenetlinkHandle,
    events: mpsc::UnboundedSender<ScanEvent>,
    next_cmd_id: u32,
    inflight: HashMap<u32, JoinHandle<()>>,
    timers: HashMap<u64, JoinHandle<()>>,
    started: Instant,
}

impl GenlScanDriver {
    pub fn new(
        handle: GenetlinkHandle,
        events: mpsc::UnboundedSender<ScanEvent>,
    ) -> Self {
        Self {
            handle,
            events,
            next_cmd_id: 0,
            inflight: HashMap::new(),
            timers: HashMap::new(),
            started: Instant::now(),
        }
    }

    fn next_command_id(&mut self) -> u32 {
        self.inflight.retain(|_, task| !task.is_finished());
        self.next_cmd_id += 1;
        self.next_cmd_id
    }
}

impl ScanDriver for GenlScanDriver {
    fn send_trigger(
        &mut self,
        msg: Nl80211Message,
    ) -> Result<u32, ScanError> {
        let cmd_id = self.next_command_id();
        let mut handle = self.handle.clone();
        let events = self.events.clone();

        let task = tokio::spawn(async move {
            let mut nl_msg =
                NetlinkMessage::from(GenlMessage::from_payload(msg));
            nl_msg.header.flags = NLM_F_REQUEST | NLM_F_ACK;

            let result = match handle.request(nl_msg).await {
                Ok(mut responses) => {
                    let mut outcome = Ok(());
                    while let Some(response) = responses.next().await {
                        match response {
                            Ok(message) => {
                                if let NetlinkPayload::Error(err) =
                                    message.payload
                                {
                                    outcome = match err.code {
                                        Some(code) => Err(
                                            ScanError::from_errno(code.get()),
                                        ),
                                        None => Ok(()),
                                    };
                                }
                            }
                            Err(_) => outcome = Err(ScanError::SendFailed),
                        }
                    }
                    outcome
                }
                Err(_) => Err(ScanError::SendFailed),
            };

            let _ = events.send(ScanEvent::CommandAck { cmd_id, result });
        });

        self.inflight.insert(cmd_id, task);
        Ok(cmd_id)
    }

    fn start_dump(&mut self, msg: Nl80211Message) -> Result<u32, ScanError> {
        let cmd_id = self.next_command_id();
        let mut handle = self.handle.clone();
        let events = self.events.clone();

        let task = tokio::spawn(async move {
            let mut nl_msg =
                NetlinkMessage::from(GenlMessage::from_payload(msg));
            nl_msg.header.flags = NLM_F_REQUEST | NLM_F_DUMP;

            match handle.request(nl_msg).await {
                Ok(mut responses) => {
                    while let Some(response) = responses.next().await {
                        let Ok(message) = response else {
                            continue;
                        };
                        if let NetlinkPayload::InnerMessage(genl) =
                            message.payload
                        {
                            let _ = events.send(ScanEvent::DumpEntry {
                                cmd_id,
                                message: genl.payload,
                            });
                        }
                    }
                }
                Err(_) => {
                    let _ = events.send(ScanEvent::CommandAck {
                        cmd_id,
                        result: Err(ScanError::SendFailed),
                    });
                    return;
                }
            }

            let _ = events.send(ScanEvent::DumpDone { cmd_id });
        });

        self.inflight.insert(cmd_id, task);
        Ok(cmd_id)
    }

    fn cancel(&mut self, cmd_id: u32) {
        if let Some(task) = self.inflight.remove(&cmd_id) {
            task.abort();
        }
    }

    fn arm_periodic_timer(&mut self, wdev_id: u64, interval: Duration) {
        if let Some(task) = self.timers.remove(&wdev_id) {
            task.abort();
        }

        let events = self.events.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(interval).await;
            let _ = events.send(ScanEvent::PeriodicTimer { wdev_id });
        });
        self.timers.insert(wdev_id, task);
    }

    fn cancel_periodic_timer(&mut self, wdev_id: u64) {
        if let Some(task) = self.timers.remove(&wdev_id) {
            task.abort();
        }
    }

    fn now_us(&mut self) -> u64 {
        self.started.elapsed().as_micros() as u64
    }
}

async fn resolve_scan_multicast_group(
    handle: &mut GenetlinkHandle,
) -> Result<u32, ScanError> {
    let msg = GenlMessage::from_payload(GenlCtrl {
        cmd: GenlCtrlCmd::GetFamily,
        nlas: vec![GenlCtrlAttrs::FamilyName(
            Nl80211Message::family_name().to_string(),
        )],
    });
    let mut nl_msg = NetlinkMessage::from(msg);
    nl_msg.header.flags = NLM_F_REQUEST | NLM_F_ACK;

    let mut responses = handle
        .request(nl_msg)
        .await
        .map_err(|_| ScanError::SendFailed)?;

    while let Some(response) = responses.next().await {
        let Ok(message) = response else {
            continue;
        };
        let NetlinkPayload::InnerMessage(genl) = message.payload else {
            continue;
        };
        for nla in genl.payload.nlas {
            let GenlCtrlAttrs::McastGroups(groups) = nla else {
                continue;
            };
            for group in groups {
                let mut name = None;
                let mut id = None;
                for attr in group {
                    match attr {
                        McastGrpAttrs::Name(n) => name = Some(n),
                        McastGrpAttrs::Id(i) => id = Some(i),
                    }
                }
                if name.as_deref() == Some(NL80211_MULTICAST_GROUP_SCAN) {
                    if let Some(id) = id {
                        return Ok(id);
                    }
                }
            }
        }
    }

    Err(ScanError::SendFailed)
}

async fn notification_pump(
    mut messages: futures::channel::mpsc::UnboundedReceiver<(
        NetlinkMessage<RawGenlMessage>,
        netlink_sys::SocketAddr,
    )>,
    events: mpsc::UnboundedSender<ScanEvent>,
) {
    while let Some((message, _addr)) = messages.next().await {
        let Ok(message) = map_from_rawgenlmsg::<Nl80211Message>(message)
        else {
            continue;
        };
        if let NetlinkPayload::InnerMessage(genl) = message.payload {
            if events
                .send(ScanEvent::Notification {
                    message: genl.payload,
                })
                .is_err()
            {
                return;
            }
        }
    }
}

/// Opens the nl80211 connection for the scan core: joins the "scan"
/// multicast group, spawns the socket and notification tasks and returns
/// the driver plus the event stream to feed into
/// [crate::ScanService::dispatch].
pub async fn new_scan_connection(
) -> Result<(GenlScanDriver, mpsc::UnboundedReceiver<ScanEvent>), ScanError> {
    // Group membership must be set before the connection task starts
    // owning the socket, so the group id is resolved over a throwaway
    // connection first.
    let (resolver_conn, mut resolver_handle, _messages) =
        genetlink::new_connection_with_socket::<TokioSocket>()
            .map_err(|_| ScanError::SendFailed)?;
    let resolver = tokio::spawn(resolver_conn);
    let group = resolve_scan_multicast_group(&mut resolver_handle).await?;
    resolver.abort();

    let (mut conn, handle, messages) =
        genetlink::new_connection_with_socket::<TokioSocket>()
            .map_err(|_| ScanError::SendFailed)?;
    conn.socket_mut()
        .socket_mut()
        .add_membership(group)
        .map_err(|_| ScanError::SendFailed)?;
    tokio::spawn(conn);

    let (events_tx, events_rx) = mpsc::unbounded_channel();
    tokio::spawn(notification_pump(messages, events_tx.clone()));

    Ok((GenlScanDriver::new(handle, events_tx), events_rx))
}
