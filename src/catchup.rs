//! Catch-up subscription (ยง4.4): historical read, then live push, with
//! exactly-once-per-event handoff. A dedicated task is the single writer to
//! the user's [`SubscriptionListener`], satisfying both the "callbacks run
//! off the driver task" rule (ยง5) and the single-writer discipline the
//! historical/live merge needs to avoid gaps or duplicates.

use crate::{
    client::EventStoreClient,
    connection::Instruction,
    error::{ClientError, DropReason},
    position::Position,
    subscriptions::{DispatchMessage, ResolvedEvent, SubscriptionConfirmation, SubscriptionListener},
};
use futures_channel::{mpsc, oneshot};
use futures_util::{select, StreamExt};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use tracing::{debug, warn};

/// Where a catch-up subscription starts and what it targets: a single
/// stream, or the whole `$all` log.
#[derive(Debug, Clone)]
pub enum CatchUpTarget {
    Stream { name: String, from_event_number: u64 },
    All { from_position: Position },
}

/// Forwards a live subscription's callbacks into a bounded queue the
/// catch-up task drains, rather than calling the user's listener directly.
/// A full queue sets `overflowed` instead of blocking, since
/// `SubscriptionListener` methods are synchronous.
struct QueueForwardingListener {
    tx: mpsc::Sender<DispatchMessage>,
    overflowed: Arc<AtomicBool>,
}

impl SubscriptionListener for QueueForwardingListener {
    fn on_confirmed(&mut self, confirmation: SubscriptionConfirmation) {
        let _ = self.tx.try_send(DispatchMessage::Confirmed(confirmation));
    }

    fn on_event(&mut self, event: ResolvedEvent) {
        if self.tx.try_send(DispatchMessage::Event(event)).is_err() {
            self.overflowed.store(true, Ordering::SeqCst);
        }
    }

    fn on_live_processing_started(&mut self) {
        let _ = self.tx.try_send(DispatchMessage::LiveProcessingStarted);
    }

    fn on_dropped(&mut self, reason: DropReason, error: Option<String>) {
        let _ = self.tx.try_send(DispatchMessage::Dropped(reason, error));
    }
}

/// Handle to a running catch-up subscription. Dropping it leaves the
/// background task running; call [`Self::stop`] to end it explicitly.
pub struct CatchUpSubscription {
    stop_tx: Option<oneshot::Sender<()>>,
}

impl CatchUpSubscription {
    /// Starts historical replay immediately in a background task, switching
    /// transparently to live push once caught up.
    pub fn start(
        client: EventStoreClient,
        target: CatchUpTarget,
        read_batch_size: u32,
        max_push_queue_size: usize,
        listener: Box<dyn SubscriptionListener>,
    ) -> Result<Self, ClientError> {
        client.settings().check_read_batch_size(read_batch_size)?;
        let (stop_tx, stop_rx) = oneshot::channel();
        tokio::spawn(run(client, target, read_batch_size, max_push_queue_size, listener, stop_rx));
        Ok(Self { stop_tx: Some(stop_tx) })
    }

    /// Requests the subscription stop. The drop callback fires with
    /// `UserInitiated` once the background task observes the request.
    pub fn stop(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
    }
}

async fn run(
    client: EventStoreClient,
    target: CatchUpTarget,
    read_batch_size: u32,
    max_push_queue_size: usize,
    mut listener: Box<dyn SubscriptionListener>,
    mut stop_rx: oneshot::Receiver<()>,
) {
    let stream_name = match &target {
        CatchUpTarget::Stream { name, .. } => Some(name.clone()),
        CatchUpTarget::All { .. } => None,
    };
    let mut from_event_number = match &target {
        CatchUpTarget::Stream { from_event_number, .. } => *from_event_number,
        CatchUpTarget::All { .. } => 0,
    };
    let mut from_position = match &target {
        CatchUpTarget::All { from_position } => *from_position,
        CatchUpTarget::Stream { .. } => Position::START,
    };
    let mut last_delivered_number: Option<u64> = None;
    let mut last_delivered_position: Option<Position> = None;

    // Phase H: historical read, batch by batch, until caught up.
    loop {
        if matches!(stop_rx.try_recv(), Ok(Some(()))) {
            listener.on_dropped(DropReason::UserInitiated, None);
            return;
        }
        let read = match &stream_name {
            Some(name) => client
                .read_stream_forward(name.clone(), from_event_number, read_batch_size, true)
                .await
                .map(|s| (s.events, s.next_event_number, from_position, s.is_end_of_stream)),
            None => client
                .read_all_forward(from_position, read_batch_size, true)
                .await
                .map(|s| (s.events, from_event_number, s.next_position, s.is_end_of_stream)),
        };
        let (events, next_event_number, next_position, is_end_of_stream) = match read {
            Ok(v) => v,
            Err(e) => {
                warn!(err = %e, "catch-up historical read failed");
                listener.on_dropped(DropReason::CatchUpError, Some(e.to_string()));
                return;
            }
        };
        for event in events {
            last_delivered_number = Some(event.original_event_number);
            last_delivered_position = event.original_position.or(last_delivered_position);
            listener.on_event(event);
        }
        from_event_number = next_event_number;
        from_position = next_position;
        if is_end_of_stream {
            break;
        }
    }

    // Phase S: subscribe live, buffering pushes into a bounded queue.
    let overflowed = Arc::new(AtomicBool::new(false));
    let (tx, mut rx) = mpsc::channel(max_push_queue_size.max(1));
    let forwarder = Box::new(QueueForwardingListener { tx, overflowed: overflowed.clone() });
    let subscription_id = match client.subscribe(stream_name.clone(), true, forwarder) {
        Ok(id) => id,
        Err(e) => {
            listener.on_dropped(DropReason::CatchUpError, Some(e.to_string()));
            return;
        }
    };

    let confirmation = loop {
        match rx.next().await {
            Some(DispatchMessage::Confirmed(c)) => break c,
            Some(DispatchMessage::Dropped(reason, err)) => {
                listener.on_dropped(reason, err);
                return;
            }
            Some(_) => continue,
            None => {
                listener.on_dropped(DropReason::ConnectionClosed, None);
                return;
            }
        }
    };

    // Catch anything written between the historical read finishing and the
    // live subscription's confirmation, per the confirmed last position.
    if let (Some(name), Some(target_number)) = (&stream_name, confirmation.last_event_number) {
        while last_delivered_number.map(|n| n < target_number).unwrap_or(true) {
            let slice = match client.read_stream_forward(name.clone(), from_event_number, read_batch_size, true).await {
                Ok(s) => s,
                Err(e) => {
                    listener.on_dropped(DropReason::CatchUpError, Some(e.to_string()));
                    return;
                }
            };
            if slice.events.is_empty() {
                break;
            }
            for event in slice.events {
                if last_delivered_number.map(|n| event.original_event_number > n).unwrap_or(true) {
                    last_delivered_number = Some(event.original_event_number);
                    listener.on_event(event);
                }
            }
            from_event_number = slice.next_event_number;
            if slice.is_end_of_stream {
                break;
            }
        }
    }

    listener.on_live_processing_started();

    // Phase L: drain the live queue, deduplicating at the historical/live
    // boundary against what was already delivered.
    loop {
        if overflowed.load(Ordering::SeqCst) {
            let _ = client.handle().send(Instruction::Unsubscribe(subscription_id));
            listener.on_dropped(DropReason::ProcessingQueueOverflow, None);
            return;
        }
        select! {
            stopped = &mut stop_rx => {
                if stopped.is_ok() {
                    let _ = client.handle().send(Instruction::Unsubscribe(subscription_id));
                    listener.on_dropped(DropReason::UserInitiated, None);
                    return;
                }
            }
            msg = rx.next() => {
                match msg {
                    Some(DispatchMessage::Event(event)) => {
                        let number = event.original_event_number;
                        let position = event.original_position;
                        let is_new = match &stream_name {
                            Some(_) => last_delivered_number.map(|last| number > last).unwrap_or(true),
                            None => match (position, last_delivered_position) {
                                (Some(p), Some(last)) => p > last,
                                _ => true,
                            },
                        };
                        if is_new {
                            last_delivered_number = Some(number);
                            last_delivered_position = position.or(last_delivered_position);
                            listener.on_event(event);
                        } else {
                            debug!(number, "dropping duplicate event at historical/live boundary");
                        }
                    }
                    Some(DispatchMessage::Dropped(reason, err)) => {
                        listener.on_dropped(reason, err);
                        return;
                    }
                    Some(_) => {}
                    None => {
                        listener.on_dropped(DropReason::ConnectionClosed, None);
                        return;
                    }
                }
            }
        }
    }
}
