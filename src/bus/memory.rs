//! The default in-memory [`Bus`]: a loopback implementation used by tests
//! and the reference binary when no real wire transport is wired in
//! (spec §6, SPEC_FULL §6). Messages are round-tripped through
//! `serde_json` on their way through the channel, standing in for the
//! encode/decode step a real wire transport would own.

use super::message::{Info, Orders};
use super::Bus;
use async_trait::async_trait;
use std::sync::Mutex;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

/// An in-process stand-in for the `PMD_INFO`/`PMD_ORDERS` bus. Deputies
/// (or tests) inject [`Info`]/[`Orders`] via the sender handles returned
/// from [`InMemoryBus::new`]; published orders accumulate in a log that
/// tests can inspect with [`InMemoryBus::published_orders`].
pub struct InMemoryBus {
    info_rx: Mutex<UnboundedReceiver<String>>,
    peer_orders_rx: Mutex<UnboundedReceiver<String>>,
    published: Mutex<Vec<Orders>>,
}

/// Sender handles for injecting inbound traffic into an [`InMemoryBus`].
/// Messages are encoded to JSON before being sent, matching what crosses
/// the channel on the receiving end.
pub struct InMemoryBusHandle {
    info_tx: UnboundedSender<String>,
    peer_orders_tx: UnboundedSender<String>,
}

impl InMemoryBusHandle {
    pub fn send_info(&self, info: Info) -> Result<(), serde_json::Error> {
        let encoded = serde_json::to_string(&info)?;
        let _ = self.info_tx.send(encoded);
        Ok(())
    }

    pub fn send_peer_orders(&self, orders: Orders) -> Result<(), serde_json::Error> {
        let encoded = serde_json::to_string(&orders)?;
        let _ = self.peer_orders_tx.send(encoded);
        Ok(())
    }
}

impl InMemoryBus {
    pub fn new() -> (Self, InMemoryBusHandle) {
        let (info_tx, info_rx) = unbounded_channel();
        let (peer_orders_tx, peer_orders_rx) = unbounded_channel();
        (
            InMemoryBus {
                info_rx: Mutex::new(info_rx),
                peer_orders_rx: Mutex::new(peer_orders_rx),
                published: Mutex::new(Vec::new()),
            },
            InMemoryBusHandle {
                info_tx,
                peer_orders_tx,
            },
        )
    }

    /// Every `Orders` message published so far, oldest first.
    pub fn published_orders(&self) -> Vec<Orders> {
        self.published.lock().expect("bus lock poisoned").clone()
    }
}

#[async_trait]
impl Bus for InMemoryBus {
    async fn try_recv_info(&self) -> Option<Info> {
        let encoded = self.info_rx.lock().expect("bus lock poisoned").try_recv().ok()?;
        match serde_json::from_str(&encoded) {
            Ok(info) => Some(info),
            Err(err) => {
                tracing::warn!(%err, "dropping malformed PMD_INFO payload");
                None
            }
        }
    }

    async fn try_recv_orders(&self) -> Option<Orders> {
        let encoded = self
            .peer_orders_rx
            .lock()
            .expect("bus lock poisoned")
            .try_recv()
            .ok()?;
        match serde_json::from_str(&encoded) {
            Ok(orders) => Some(orders),
            Err(err) => {
                tracing::warn!(%err, "dropping malformed PMD_ORDERS payload");
                None
            }
        }
    }

    async fn publish_orders(&self, orders: Orders) {
        self.published.lock().expect("bus lock poisoned").push(orders);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_info() -> Info {
        Info {
            utime: 0,
            host: "host-a".into(),
            cpu_load: 0.0,
            phys_mem_total: 0,
            phys_mem_free: 0,
            cmds: vec![],
            variables: Default::default(),
        }
    }

    #[tokio::test]
    async fn try_recv_info_is_non_blocking_when_empty() {
        let (bus, _handle) = InMemoryBus::new();
        assert!(bus.try_recv_info().await.is_none());
    }

    #[tokio::test]
    async fn injected_info_is_received() {
        let (bus, handle) = InMemoryBus::new();
        handle.send_info(sample_info()).unwrap();
        let received = bus.try_recv_info().await.unwrap();
        assert_eq!(received.host, "host-a");
    }

    #[tokio::test]
    async fn malformed_info_payload_is_dropped_not_panicked() {
        let (bus, handle) = InMemoryBus::new();
        handle.info_tx.send("not json".into()).unwrap();
        assert!(bus.try_recv_info().await.is_none());
    }

    #[tokio::test]
    async fn published_orders_are_logged() {
        let (bus, _handle) = InMemoryBus::new();
        bus.publish_orders(Orders {
            utime: 0,
            host: "host-a".into(),
            sheriff_name: "sheriff-1".into(),
            cmds: vec![],
            variables: Default::default(),
        })
        .await;
        assert_eq!(bus.published_orders().len(), 1);
    }
}
