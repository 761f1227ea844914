//! The pub/sub bus the sheriff talks to (spec §1, §6): an external
//! collaborator in production, represented here as a trait so the
//! reconciliation engine and event loop can be exercised without a real
//! wire transport.

pub mod memory;
pub mod message;

use async_trait::async_trait;
use message::{Info, Orders};

/// Non-blocking channel handle (spec §5: "the bus handle is non-blocking").
///
/// A real deployment implements this over the project's actual wire
/// transport and message encoding (both out of scope, spec §1); the
/// in-memory implementation in [`memory`] is what tests and the reference
/// binary's loopback mode use.
#[async_trait]
pub trait Bus: Send + Sync {
    /// Polls the `PMD_INFO` channel. Returns `None` immediately if nothing
    /// is queued — never blocks the event loop.
    async fn try_recv_info(&self) -> Option<Info>;

    /// Polls the `PMD_ORDERS` channel for a peer sheriff's broadcast
    /// (observer mode only, spec §4.4).
    async fn try_recv_orders(&self) -> Option<Orders>;

    /// Publishes this sheriff's own `PMD_ORDERS` broadcast.
    async fn publish_orders(&self, orders: Orders);
}

pub use memory::InMemoryBus;
