//! An unbounded broadcast channel: every subscriber gets its own receiver
//! and sees every message. Adapted from the teacher crate's
//! `event::broadcaster::unbounded::UnboundedBroadcast` — sufficient for a
//! single-threaded event loop's low-throughput fan-out (spec §5, §9).

use crossbeam::channel::{Receiver, Sender, unbounded};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Default)]
pub struct UnboundedBroadcast<T> {
    subscribed_senders: Arc<Mutex<Vec<Sender<T>>>>,
}

impl<T> UnboundedBroadcast<T>
where
    T: Clone,
{
    /// Registers a new receiver. Every subsequent `broadcast` call is
    /// visible to it.
    pub fn subscribe(&self) -> Receiver<T> {
        let (tx, rx) = unbounded();
        self.subscribed_senders
            .lock()
            .expect("broadcaster lock poisoned")
            .push(tx);
        rx
    }

    /// Sends `message` to every still-connected subscriber. Never blocks
    /// (unbounded channel) and never fails; disconnected subscribers are
    /// dropped from the list.
    pub fn broadcast(&self, message: T) {
        self.subscribed_senders
            .lock()
            .expect("broadcaster lock poisoned")
            .retain(|s| s.send(message.clone()).is_ok());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_subscriber_sees_every_message() {
        let broadcaster = UnboundedBroadcast::default();
        let sub1 = broadcaster.subscribe();
        let sub2 = broadcaster.subscribe();

        broadcaster.broadcast("hello");

        assert_eq!(sub1.recv().unwrap(), "hello");
        assert_eq!(sub2.recv().unwrap(), "hello");
    }

    #[test]
    fn disconnected_subscribers_are_pruned() {
        let broadcaster = UnboundedBroadcast::default();
        {
            let _sub = broadcaster.subscribe();
        }
        broadcaster.broadcast("first");
        assert_eq!(
            broadcaster
                .subscribed_senders
                .lock()
                .unwrap()
                .len(),
            0
        );
    }
}
