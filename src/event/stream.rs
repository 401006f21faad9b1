// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The per-bridge event-stream session.
//!
//! One background connection task holds the server-sent-event
//! subscription and reconnects after drops with a constant backoff; a
//! second task fans decoded batches out to the registered handlers.
//! The two are decoupled by a bounded channel so a slow handler delays
//! later batches but never stalls the network read or handler
//! registration.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures_util::StreamExt;
use parking_lot::RwLock;
use reqwest::{Client, header};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use url::Url;

use super::Event;
use super::sse::SseParser;
use crate::bridge::Bridge;
use crate::error::{Error, Result};
use crate::rest::APPLICATION_KEY_HEADER;
use crate::transport;

/// Push subscription endpoint relative to the bridge origin.
const EVENT_STREAM_PATH: &str = "/eventstream/clip/v2";

/// Fixed delay before each reconnection attempt. Constant by design;
/// the bridge is a single local device, not a fleet to spread load over.
const RECONNECT_INTERVAL: Duration = Duration::from_secs(10);

/// Batches in flight between the connection task and dispatch.
const BATCH_CHANNEL_CAPACITY: usize = 16;

/// Configuration for an event-stream session.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// Delay before each reconnection attempt. Default: 10 seconds.
    pub reconnect_interval: Duration,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            reconnect_interval: RECONNECT_INTERVAL,
        }
    }
}

/// Unique identifier for a registered event handler.
///
/// Ids are strictly increasing for the lifetime of a session and are
/// never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    #[must_use]
    pub(crate) fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw id value.
    #[must_use]
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Sub({})", self.0)
    }
}

type Handler = Arc<dyn Fn(&Event) + Send + Sync>;

/// A running event-stream session for one bridge.
///
/// Obtained via [`Bridge::event_stream`]; at most one active session
/// exists per bridge. Handlers registered on the session receive every
/// event of every batch delivered after their registration, in batch
/// order; events lost while the connection is down are not replayed.
///
/// [`Bridge::event_stream`]: crate::Bridge::event_stream
pub struct EventStream {
    cancel: CancellationToken,
    next_id: AtomicU64,
    handlers: RwLock<HashMap<SubscriptionId, Handler>>,
}

impl EventStream {
    /// Builds the subscription endpoint and spawns the background tasks.
    ///
    /// The credential header is snapshotted here; changing the bridge's
    /// application key later does not affect a running session.
    pub(crate) fn spawn(bridge: &Bridge, config: StreamConfig) -> Result<Arc<Self>> {
        let url = bridge.endpoint(EVENT_STREAM_PATH)?;
        let client = transport::stream_client()?;
        let key = bridge.application_key();

        let stream = Arc::new(Self {
            cancel: CancellationToken::new(),
            next_id: AtomicU64::new(1),
            handlers: RwLock::new(HashMap::new()),
        });

        let (batch_tx, batch_rx) = mpsc::channel(BATCH_CHANNEL_CAPACITY);

        let cancel = stream.cancel.clone();
        let interval = config.reconnect_interval;
        tokio::spawn(async move {
            connection_loop(&client, url, &key, interval, &batch_tx, &cancel).await;
        });

        let dispatcher = Arc::clone(&stream);
        tokio::spawn(async move {
            dispatch_loop(&dispatcher, batch_rx).await;
        });

        Ok(stream)
    }

    /// Registers a handler for all future events.
    ///
    /// Returns immediately regardless of connection state; a handler
    /// registered while the stream is reconnecting receives the next
    /// batch delivered after reconnection. Handlers stay registered for
    /// the life of the session.
    pub fn register<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        let id = SubscriptionId::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.handlers.write().insert(id, Arc::new(handler));
        id
    }

    /// Returns the number of registered handlers.
    #[must_use]
    pub fn handler_count(&self) -> usize {
        self.handlers.read().len()
    }

    /// Signals the background tasks to stop.
    ///
    /// Cancellation takes effect before the next connection attempt or
    /// dispatch cycle; an in-flight handler invocation is not
    /// interrupted. Idempotent.
    pub fn close(&self) {
        self.cancel.cancel();
    }

    /// Returns `true` once [`close`](Self::close) has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Invokes every registered handler once per event, in batch order.
    ///
    /// The registry lock is only held to snapshot the handlers, so a
    /// registration during dispatch never blocks; it may see or miss the
    /// current batch.
    fn dispatch(&self, batch: &[Event]) {
        let handlers: Vec<Handler> = self.handlers.read().values().cloned().collect();

        for handler in handlers {
            for event in batch {
                handler(event);
            }
        }
    }
}

impl std::fmt::Debug for EventStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventStream")
            .field("handler_count", &self.handler_count())
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Pulls batches off the channel and fans them out.
///
/// Exits on cancellation before touching any buffered batch, so no
/// handler runs after [`EventStream::close`] returns and the current
/// dispatch cycle finishes.
async fn dispatch_loop(stream: &EventStream, mut batch_rx: mpsc::Receiver<Vec<Event>>) {
    loop {
        tokio::select! {
            biased;
            () = stream.cancel.cancelled() => break,
            batch = batch_rx.recv() => {
                let Some(batch) = batch else { break };
                stream.dispatch(&batch);
            }
        }
    }

    tracing::debug!("Event dispatch loop exiting");
}

/// Main loop: connect, stream until drop, wait the fixed interval,
/// reconnect. Runs until cancelled.
///
/// Connection failures are never surfaced to handlers; they only stop
/// receiving events until the stream is back.
async fn connection_loop(
    client: &Client,
    url: Url,
    key: &str,
    interval: Duration,
    batch_tx: &mpsc::Sender<Vec<Event>>,
    cancel: &CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            result = connect_and_stream(client, url.clone(), key, batch_tx, cancel) => {
                match result {
                    Ok(()) => tracing::info!("Event stream disconnected, reconnecting"),
                    Err(e) => tracing::warn!(error = %e, "Event stream failed, reconnecting"),
                }

                tokio::select! {
                    biased;
                    () = cancel.cancelled() => break,
                    () = tokio::time::sleep(interval) => {}
                }
            }
        }
    }

    tracing::debug!("Event stream loop exiting");
}

/// Establishes a single subscription and pumps it until it drops.
///
/// Malformed payloads are logged and discarded; the connection stays up.
async fn connect_and_stream(
    client: &Client,
    url: Url,
    key: &str,
    batch_tx: &mpsc::Sender<Vec<Event>>,
    cancel: &CancellationToken,
) -> Result<()> {
    tracing::debug!(url = %url, "Connecting to event stream");

    let mut request = client.get(url).header(header::ACCEPT, "text/event-stream");
    if !key.is_empty() {
        request = request.header(APPLICATION_KEY_HEADER, key);
    }

    let response = request.send().await?;

    let status = response.status();
    if !status.is_success() {
        return Err(Error::UnexpectedStatus(status.as_u16()));
    }

    tracing::info!("Event stream connected");

    let mut body = response.bytes_stream();
    let mut parser = SseParser::new();

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => return Ok(()),
            chunk = body.next() => {
                match chunk {
                    Some(Ok(chunk)) => {
                        for payload in parser.feed(&chunk) {
                            forward_batch(&payload, batch_tx).await;
                        }
                    }
                    Some(Err(e)) => return Err(Error::Http(e)),
                    None => {
                        tracing::info!("Event stream ended");
                        return Ok(());
                    }
                }
            }
        }
    }
}

/// Decodes one `data` payload and hands the batch to the dispatcher.
async fn forward_batch(payload: &str, batch_tx: &mpsc::Sender<Vec<Event>>) {
    match serde_json::from_str::<Vec<Event>>(payload) {
        Ok(batch) => {
            if batch.is_empty() {
                return;
            }
            // Send fails only when the dispatcher is gone, which means
            // the session is shutting down.
            let _ = batch_tx.send(batch).await;
        }
        Err(e) => {
            tracing::warn!(error = %e, "Discarding malformed event payload");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    fn empty_stream() -> EventStream {
        EventStream {
            cancel: CancellationToken::new(),
            next_id: AtomicU64::new(1),
            handlers: RwLock::new(HashMap::new()),
        }
    }

    fn sample_event(id: &str) -> Event {
        serde_json::from_str(&format!(
            r#"{{"id":"{id}","type":"update","creationtime":"2022-09-04T10:42:44Z","data":[]}}"#
        ))
        .unwrap()
    }

    #[test]
    fn subscription_id_display() {
        assert_eq!(SubscriptionId::new(42).to_string(), "Sub(42)");
    }

    #[test]
    fn subscription_ids_strictly_increase() {
        let stream = empty_stream();

        let ids: Vec<u64> = (0..5).map(|_| stream.register(|_| {}).value()).collect();
        for pair in ids.windows(2) {
            assert!(pair[1] > pair[0]);
        }
        assert_eq!(stream.handler_count(), 5);
    }

    #[test]
    fn dispatch_reaches_every_handler_in_event_order() {
        let stream = empty_stream();

        let seen1 = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let seen2 = Arc::new(parking_lot::Mutex::new(Vec::new()));

        let sink = Arc::clone(&seen1);
        stream.register(move |event| sink.lock().push(event.id.clone()));
        let sink = Arc::clone(&seen2);
        stream.register(move |event| sink.lock().push(event.id.clone()));

        stream.dispatch(&[sample_event("e1"), sample_event("e2")]);

        assert_eq!(*seen1.lock(), vec!["e1", "e2"]);
        assert_eq!(*seen2.lock(), vec!["e1", "e2"]);
    }

    #[test]
    fn registration_during_dispatch_does_not_deadlock() {
        let stream = Arc::new(empty_stream());

        let inner = Arc::clone(&stream);
        let registered = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&registered);
        stream.register(move |_| {
            // Re-entrant registration from inside a handler must not
            // block on the registry lock.
            inner.register(|_| {});
            counter.fetch_add(1, Ordering::SeqCst);
        });

        stream.dispatch(&[sample_event("e1")]);
        assert_eq!(registered.load(Ordering::SeqCst), 1);
        assert_eq!(stream.handler_count(), 2);
    }

    #[test]
    fn close_is_idempotent() {
        let stream = empty_stream();
        assert!(!stream.is_closed());
        stream.close();
        stream.close();
        assert!(stream.is_closed());
    }

    #[test]
    fn default_config_uses_constant_backoff() {
        assert_eq!(
            StreamConfig::default().reconnect_interval,
            Duration::from_secs(10)
        );
    }

    #[tokio::test]
    async fn dispatch_loop_skips_buffered_batches_after_close() {
        let stream = Arc::new(empty_stream());

        let count = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&count);
        stream.register(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let (tx, rx) = mpsc::channel(4);
        tx.send(vec![sample_event("e1")]).await.unwrap();
        tx.send(vec![sample_event("e2")]).await.unwrap();

        // Cancelled before the loop starts: buffered batches must not
        // reach the handler.
        stream.close();
        dispatch_loop(&stream, rx).await;

        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn forward_batch_discards_malformed_payload() {
        let (tx, mut rx) = mpsc::channel(4);

        forward_batch("{not json", &tx).await;
        forward_batch("[]", &tx).await;
        forward_batch(
            r#"[{"id":"e1","type":"update","creationtime":"2022-09-04T10:42:44Z","data":[]}]"#,
            &tx,
        )
        .await;

        let batch = rx.try_recv().unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].id, "e1");
        assert!(rx.try_recv().is_err());
    }
}
