//! Connection driver (ยง4.1): the single logical task owning phase
//! transitions, the operation and subscription managers, and the current
//! backend. Client-facing handles talk to it only through `Instruction`s
//! sent over an unbounded channel, the same shape as the websocket request
//! manager this crate's connection layer is grounded on.

use super::{
    backend::{BackendDriver, TcpBackend},
    phase::ConnectionPhase,
};
use crate::{
    config::ClientSettings,
    discovery::{self, ClusterProber},
    error::{ClientError, OperationError},
    operations::{Operation, OperationManager},
    package::{CommandTag, Package},
    subscriptions::{PendingSubscribe, SubscriptionKind, SubscriptionManager},
};
use futures_channel::mpsc;
use futures_util::{select_biased, StreamExt};
use std::{sync::Arc, time::Instant};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Requests a client-facing [`ConnectionHandle`] sends to the driver task.
pub enum Instruction {
    Enqueue(Operation),
    Subscribe(PendingSubscribe),
    Unsubscribe(Uuid),
    Ack { subscription_id: Uuid, event_id: Uuid },
    Nak { subscription_id: Uuid, event_id: Uuid, reason: String },
    Close,
}

/// Cloneable client-facing handle to a running connection driver.
#[derive(Clone)]
pub struct ConnectionHandle {
    instructions: mpsc::UnboundedSender<Instruction>,
}

impl ConnectionHandle {
    pub fn send(&self, instruction: Instruction) -> Result<(), ClientError> {
        self.instructions
            .unbounded_send(instruction)
            .map_err(|_| ClientError::Operation(OperationError::ConnectionClosed))
    }
}

struct HeartbeatState {
    last_activity: Instant,
    outstanding: Option<(Uuid, Instant)>,
}

pub struct ConnectionDriver {
    phase: ConnectionPhase,
    settings: ClientSettings,
    prober: Arc<dyn ClusterProber>,
    ops: OperationManager,
    subs: SubscriptionManager,
    backend: BackendDriver,
    heartbeat: HeartbeatState,
    reconnects_left: Option<u32>,
    instructions: mpsc::UnboundedReceiver<Instruction>,
}

impl ConnectionDriver {
    /// Discovers an endpoint, connects, authenticates and returns a running
    /// driver plus the handle used to talk to it. Per ยง4.1, this is the same
    /// sequence `reconnect()` replays internally on channel loss.
    pub async fn connect(
        settings: ClientSettings,
        prober: Arc<dyn ClusterProber>,
    ) -> Result<(Self, ConnectionHandle), ClientError> {
        let endpoints = settings.endpoints.clone().ok_or(ClientError::Config(crate::error::ConfigError::MissingNodeSettings))?;
        let endpoint = discovery::discover(&endpoints, settings.require_master, prober.as_ref()).await?;
        let (backend_task, backend) = TcpBackend::connect(&endpoint, &settings).await?;
        backend_task.spawn();

        let (tx, rx) = mpsc::unbounded();
        let mut driver = Self {
            phase: ConnectionPhase::Authentication,
            reconnects_left: settings.max_reconnections,
            ops: OperationManager::new(settings.max_operation_queue_size, settings.max_concurrent_operations),
            subs: SubscriptionManager::new(),
            backend,
            heartbeat: HeartbeatState { last_activity: Instant::now(), outstanding: None },
            instructions: rx,
            settings,
            prober,
        };
        driver.authenticate().await?;
        driver.phase = ConnectionPhase::Connected;
        info!("connection established");

        Ok((driver, ConnectionHandle { instructions: tx }))
    }

    async fn authenticate(&mut self) -> Result<(), ClientError> {
        let Some(creds) = self.settings.default_credentials.clone() else {
            return Ok(());
        };
        let id = Uuid::new_v4();
        let pkg = Package::new(CommandTag::Authenticate, id, vec![]).with_credentials(creds);
        self.backend
            .dispatcher
            .unbounded_send(pkg)
            .map_err(|_| ClientError::Operation(OperationError::ConnectionClosed))?;

        match self.backend.to_handle.next().await {
            Some(reply) if reply.command == CommandTag::Authenticated => Ok(()),
            Some(reply) if reply.command == CommandTag::NotAuthenticated => {
                Err(ClientError::Operation(OperationError::NotAuthenticated))
            }
            Some(_) => Err(ClientError::Operation(OperationError::CommandNotExpected)),
            None => Err(ClientError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "backend closed during authentication",
            ))),
        }
    }

    /// Reconnects per ยง4.1: tears down the current backend, rediscovers an
    /// endpoint, re-authenticates, then re-dispatches operations and
    /// subscriptions preserved by `on_reconnecting`.
    async fn reconnect(&mut self) -> Result<(), ClientError> {
        let remaining = match self.reconnects_left {
            Some(0) => return Err(ClientError::Operation(OperationError::ConnectionClosed)),
            Some(n) => {
                self.reconnects_left = Some(n - 1);
                Some(n - 1)
            }
            None => None,
        };
        self.phase = ConnectionPhase::Reconnecting;
        self.ops.on_reconnecting();
        self.subs.on_reconnecting(|entry| match &entry.kind {
            SubscriptionKind::Volatile => {
                let stream = entry.stream.clone();
                let resolve_link_tos = entry.resolve_link_tos;
                Box::new(move |id| {
                    let payload = crate::wire_messages::encode(&crate::wire_messages::SubscribeRequest { stream, resolve_link_tos });
                    Package::new(CommandTag::SubscribeToStream, id, payload)
                })
            }
            SubscriptionKind::Persistent(details) => {
                let stream = entry.stream.clone().unwrap_or_default();
                let group = details.group.clone();
                let buffer_size = details.buffer_size;
                let auto_ack = details.auto_ack;
                Box::new(move |id| {
                    let payload = crate::wire_messages::encode(&crate::wire_messages::CreatePersistentSubscriptionRequest {
                        stream,
                        group,
                        resolve_link_tos: true,
                        start_from: 0,
                        buffer_size,
                        auto_ack,
                    });
                    Package::new(CommandTag::ConnectToPersistentSubscription, id, payload)
                })
            }
        });

        tokio::time::sleep(self.settings.reconnection_delay).await;
        warn!(remaining = ?remaining, "reconnecting");

        self.phase = ConnectionPhase::EndpointDiscovery;
        let endpoints = self.settings.endpoints.clone().ok_or(ClientError::Config(crate::error::ConfigError::MissingNodeSettings))?;
        let endpoint = discovery::discover(&endpoints, self.settings.require_master, self.prober.as_ref()).await?;

        self.phase = ConnectionPhase::ConnectionEstablishing;
        let (backend_task, mut backend) = TcpBackend::connect(&endpoint, &self.settings).await?;
        backend_task.spawn();
        std::mem::swap(&mut self.backend, &mut backend);
        backend.shutdown();

        self.phase = ConnectionPhase::Authentication;
        self.authenticate().await?;

        self.heartbeat = HeartbeatState { last_activity: Instant::now(), outstanding: None };
        for pkg in self.ops.schedule_waiting() {
            let _ = self.backend.dispatcher.unbounded_send(pkg);
        }
        for pkg in self.subs.schedule_waiting() {
            let _ = self.backend.dispatcher.unbounded_send(pkg);
        }

        self.phase = ConnectionPhase::Connected;
        info!("reconnection complete");
        Ok(())
    }

    fn handle_incoming(&mut self, pkg: Package) {
        self.heartbeat.last_activity = Instant::now();

        if pkg.command == CommandTag::HeartbeatResponse {
            if let Some((id, _)) = self.heartbeat.outstanding {
                if id == pkg.correlation_id {
                    self.heartbeat.outstanding = None;
                }
            }
            return;
        }

        if self.ops.handle_response(pkg.correlation_id, &pkg) {
            return;
        }
        if self.subs.handle_frame(pkg.correlation_id, &pkg) {
            return;
        }
        self.ops.record_stale();
    }

    fn handle_instruction(&mut self, instruction: Instruction) -> bool {
        match instruction {
            Instruction::Enqueue(op) => {
                if let Err(e) = self.ops.enqueue(op) {
                    debug!(%e, "operation rejected");
                }
            }
            Instruction::Subscribe(pending) => {
                self.subs.enqueue(pending);
            }
            Instruction::Unsubscribe(id) => self.subs.unsubscribe(id),
            Instruction::Ack { subscription_id, event_id } => {
                self.subs.ack(subscription_id, event_id);
                let payload = crate::wire_messages::encode(&crate::wire_messages::AckEventsRequest { event_ids: vec![event_id] });
                let pkg = Package::new(CommandTag::PersistentSubscriptionAck, subscription_id, payload);
                let _ = self.backend.dispatcher.unbounded_send(pkg);
            }
            Instruction::Nak { subscription_id, event_id, reason } => {
                self.subs.nak(subscription_id, event_id);
                let payload = crate::wire_messages::encode(&crate::wire_messages::NakEventsRequest { event_ids: vec![event_id], reason });
                let pkg = Package::new(CommandTag::PersistentSubscriptionNak, subscription_id, payload);
                let _ = self.backend.dispatcher.unbounded_send(pkg);
            }
            Instruction::Close => return true,
        }
        false
    }

    fn dispatch_ready(&mut self) {
        if !self.phase.is_connected() {
            return;
        }
        for pkg in self.ops.schedule_waiting() {
            let _ = self.backend.dispatcher.unbounded_send(pkg);
        }
        for pkg in self.subs.schedule_waiting() {
            let _ = self.backend.dispatcher.unbounded_send(pkg);
        }
    }

    fn maybe_heartbeat(&mut self) {
        if !self.phase.is_connected() {
            return;
        }
        let now = Instant::now();
        if let Some((_, sent_at)) = self.heartbeat.outstanding {
            if now.duration_since(sent_at) > self.settings.heartbeat_timeout {
                warn!("heartbeat timed out");
                self.phase = ConnectionPhase::Reconnecting;
            }
            return;
        }
        if now.duration_since(self.heartbeat.last_activity) >= self.settings.heartbeat_interval {
            let id = Uuid::new_v4();
            let pkg = Package::new(CommandTag::HeartbeatRequest, id, vec![]);
            if self.backend.dispatcher.unbounded_send(pkg).is_ok() {
                self.heartbeat.outstanding = Some((id, now));
            }
        }
    }

    fn close(&mut self) {
        self.phase = ConnectionPhase::Closed;
        self.ops.on_closed();
        self.subs.on_closed();
    }

    /// Runs the driver loop until `Instruction::Close`, all handles dropping,
    /// or an unrecoverable reconnect failure.
    pub fn spawn(mut self) {
        tokio::spawn(async move {
            let mut timeout_check = tokio::time::interval(self.settings.operation_timeout_check_interval);
            let heartbeat_tick = std::cmp::min(self.settings.heartbeat_interval, self.settings.heartbeat_timeout) / 2;
            let mut heartbeat_timer =
                tokio::time::interval(heartbeat_tick.max(std::time::Duration::from_millis(10)));

            loop {
                if self.phase == ConnectionPhase::Reconnecting {
                    if let Err(e) = self.reconnect().await {
                        error!(%e, "reconnection failed");
                        self.close();
                        break;
                    }
                    continue;
                }

                select_biased! {
                    incoming = self.backend.to_handle.next() => {
                        match incoming {
                            Some(pkg) => self.handle_incoming(pkg),
                            None => self.phase = ConnectionPhase::Reconnecting,
                        }
                    }
                    backend_err = &mut self.backend.error => {
                        if let Ok(err) = backend_err {
                            warn!(%err, "backend reported a fatal error");
                        }
                        self.phase = ConnectionPhase::Reconnecting;
                    }
                    instruction = self.instructions.next() => {
                        match instruction {
                            Some(i) => {
                                if self.handle_instruction(i) {
                                    self.close();
                                    break;
                                }
                            }
                            None => {
                                self.close();
                                break;
                            }
                        }
                    }
                    _ = timeout_check.tick() => {
                        self.ops.check_timeouts(self.settings.fail_on_no_server_response);
                    }
                    _ = heartbeat_timer.tick() => {
                        self.maybe_heartbeat();
                    }
                }
                self.dispatch_ready();
            }
        });
    }
}
