//! # Stage: Client Notification
//!
//! ## Responsibility
//! Track connected WebSocket clients and deliver `{type, data}` event frames
//! to one of them or to all of them.
//!
//! ## Guarantees
//! - One live connection per client id; a new handshake replaces the old one
//! - Delivery never blocks and never fails the caller: a full or closed
//!   channel is logged and counted, then skipped
//! - A superseded connection cannot unregister its replacement
//!
//! ## NOT Responsible For
//! - Socket I/O (the transport drains the receiver returned by `register`)
//! - Ordering across concurrent senders

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use serde::Serialize;
use serde_json::{json, Value};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, info, warn};

use crate::api::ErrorBody;
use crate::metrics;

/// Default per-client outbound buffer.
pub const DEFAULT_CLIENT_BUFFER: usize = 64;

/// Event name used for error frames.
pub const ERROR_EVENT: &str = "error";

/// Wire shape of every event frame.
#[derive(Debug, Serialize)]
struct EventFrame<'a> {
    #[serde(rename = "type")]
    event: &'a str,
    data: &'a Value,
}

#[derive(Debug)]
struct ClientSlot {
    connection_id: u64,
    tx: mpsc::Sender<String>,
}

/// Registry of connected clients.
#[derive(Debug)]
pub struct ClientNotifier {
    clients: DashMap<String, ClientSlot>,
    next_connection: AtomicU64,
    buffer: usize,
}

impl Default for ClientNotifier {
    fn default() -> Self {
        Self::new(DEFAULT_CLIENT_BUFFER)
    }
}

impl ClientNotifier {
    /// Create a notifier whose per-client channels hold `buffer` frames.
    pub fn new(buffer: usize) -> Self {
        Self {
            clients: DashMap::new(),
            next_connection: AtomicU64::new(1),
            buffer: buffer.max(1),
        }
    }

    /// Mint a fresh client id (32 lowercase hex chars).
    pub fn mint_client_id() -> String {
        uuid::Uuid::new_v4().simple().to_string()
    }

    /// Register `client_id`, evicting any previous connection under that id.
    ///
    /// Returns the connection id and the receiver the transport must drain.
    /// Dropping the evicted sender closes the old connection's receiver.
    pub fn register(&self, client_id: &str) -> (u64, mpsc::Receiver<String>) {
        let connection_id = self.next_connection.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(self.buffer);
        let previous = self.clients.insert(
            client_id.to_string(),
            ClientSlot { connection_id, tx },
        );
        if let Some(prev) = previous {
            info!(
                client_id,
                old_connection = prev.connection_id,
                connection_id,
                "client reconnected, previous connection replaced"
            );
        } else {
            info!(client_id, connection_id, "client connected");
        }
        metrics::set_connected_clients(self.clients.len());
        (connection_id, rx)
    }

    /// Remove `client_id` whatever connection holds it.
    pub fn unregister(&self, client_id: &str) -> bool {
        let removed = self.clients.remove(client_id).is_some();
        if removed {
            debug!(client_id, "client unregistered");
            metrics::set_connected_clients(self.clients.len());
        }
        removed
    }

    /// Remove `client_id` only if it is still held by `connection_id`.
    pub fn unregister_connection(&self, client_id: &str, connection_id: u64) -> bool {
        let removed = self
            .clients
            .remove_if(client_id, |_, slot| slot.connection_id == connection_id)
            .is_some();
        if removed {
            debug!(client_id, connection_id, "client disconnected");
            metrics::set_connected_clients(self.clients.len());
        }
        removed
    }

    /// Number of registered clients.
    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    /// `true` if `client_id` is registered.
    pub fn is_connected(&self, client_id: &str) -> bool {
        self.clients.contains_key(client_id)
    }

    fn deliver(client_id: &str, slot: &ClientSlot, frame: String) -> bool {
        match slot.tx.try_send(frame) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!(client_id, "client buffer full, frame dropped");
                metrics::inc_delivery_failure("full");
                false
            }
            Err(TrySendError::Closed(_)) => {
                warn!(client_id, "client channel closed, frame dropped");
                metrics::inc_delivery_failure("closed");
                false
            }
        }
    }

    /// Send `{"type": event, "data": payload}` to `client_id`, or to every
    /// client when `None`. Unknown ids are a silent no-op.
    ///
    /// Returns the number of clients the frame was queued for.
    ///
    /// # Panics
    ///
    /// This function never panics.
    pub fn send(&self, event: &str, payload: &Value, client_id: Option<&str>) -> usize {
        let frame = match serde_json::to_string(&EventFrame {
            event,
            data: payload,
        }) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(event, error = %e, "event frame could not be encoded");
                return 0;
            }
        };
        self.send_raw(frame, client_id)
    }

    /// Send an `error` event carrying `{code, message, data}`.
    pub fn send_error(&self, body: &ErrorBody, client_id: Option<&str>) -> usize {
        let payload = json!({
            "code": body.code,
            "message": body.message,
            "data": body.data,
        });
        self.send(ERROR_EVENT, &payload, client_id)
    }

    /// Send a raw text frame to one client (e.g. `pong`).
    pub fn send_text(&self, client_id: &str, text: &str) -> bool {
        self.send_raw(text.to_string(), Some(client_id)) == 1
    }

    fn send_raw(&self, frame: String, client_id: Option<&str>) -> usize {
        match client_id {
            Some(id) => match self.clients.get(id) {
                Some(slot) => usize::from(Self::deliver(id, &slot, frame)),
                None => {
                    debug!(client_id = id, "send to unknown client ignored");
                    0
                }
            },
            None => self
                .clients
                .iter()
                .filter(|entry| Self::deliver(entry.key(), entry.value(), frame.clone()))
                .count(),
        }
    }
}
