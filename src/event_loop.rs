//! The single-threaded cooperative event loop (spec §5): one Tokio task
//! that serializes inbound bus traffic, the periodic orders broadcast, and
//! script dispatch timers behind one `&mut Sheriff`.

use crate::bus::Bus;
use crate::sheriff::{DispatchStep, Sheriff};
use crate::timer::TimerWheel;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::oneshot;
use tokio::time::{interval, sleep_until, Instant};

/// How often the loop polls the bus for inbound traffic when nothing else
/// is scheduled sooner. The `Bus` trait is poll-based (spec §5: "the bus
/// handle is non-blocking") rather than notification-based, so this
/// stands in for a real wakeup source.
const BUS_POLL_INTERVAL_MS: u64 = 50;

fn now_us() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or(0)
}

/// Owns the sheriff and its bus handle for the lifetime of the process.
pub struct EventLoop<B: Bus> {
    sheriff: Sheriff,
    bus: B,
    timers: TimerWheel,
}

impl<B: Bus> EventLoop<B> {
    pub fn new(sheriff: Sheriff, bus: B) -> Self {
        EventLoop {
            sheriff,
            bus,
            timers: TimerWheel::new(),
        }
    }

    pub fn sheriff(&self) -> &Sheriff {
        &self.sheriff
    }

    pub fn sheriff_mut(&mut self) -> &mut Sheriff {
        &mut self.sheriff
    }

    /// Starts a script and immediately drives its first dispatch step,
    /// matching `execute_script`'s "enter the dispatch loop" (spec §4.5).
    pub fn execute_script(&mut self, name: &str) -> crate::error::Result<()> {
        self.sheriff.execute_script(name)?;
        self.dispatch_until_blocked(now_us());
        Ok(())
    }

    /// Runs until `shutdown` resolves (spec §5, §9: the reference binary
    /// wires this to `ctrlc`).
    pub async fn run(mut self, mut shutdown: oneshot::Receiver<()>) {
        let mut broadcast_tick = interval(Duration::from_secs(1));

        loop {
            self.drain_bus().await;
            self.drive_script();

            let wake_at = self.next_wake();
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("event loop shutting down");
                    return;
                }
                _ = broadcast_tick.tick() => {
                    if let Err(err) = self.sheriff.send_orders(&self.bus).await {
                        tracing::warn!(%err, "periodic orders broadcast failed");
                    }
                }
                _ = sleep_until(wake_at) => {}
            }
        }
    }

    async fn drain_bus(&mut self) {
        while let Some(info) = self.bus.try_recv_info().await {
            self.sheriff.apply_info(info);
        }
        while let Some(orders) = self.bus.try_recv_orders().await {
            self.sheriff.apply_orders(orders);
        }
    }

    /// Wakes any matured timers, then advances the dispatch loop. Safe to
    /// call even when nothing actually fired: `advance_script` is a pure
    /// function of current state, so a stray call that finds the script
    /// idle, finished, or still waiting is a no-op (spec §5, "Cancellation":
    /// a timer armed for a superseded script generation is simply ignored).
    fn drive_script(&mut self) {
        let now = now_us();
        let current_generation = self.sheriff.script_generation();
        for fired_generation in self.timers.pop_ready(now) {
            if fired_generation != current_generation {
                continue;
            }
            self.dispatch_until_blocked(now);
        }
    }

    fn dispatch_until_blocked(&mut self, now: u64) {
        loop {
            match self.sheriff.advance_script() {
                DispatchStep::Idle | DispatchStep::Waiting | DispatchStep::Finished => return,
                DispatchStep::Dispatched { delay_ms: None } => continue,
                DispatchStep::Dispatched { delay_ms: Some(delay) } => {
                    self.timers.arm(now, delay, self.sheriff.script_generation());
                    return;
                }
            }
        }
    }

    fn next_wake(&self) -> Instant {
        let default_wake = Instant::now() + Duration::from_millis(BUS_POLL_INTERVAL_MS);
        let Some(fire_at_us) = self.timers.next_fire_at_us() else {
            return default_wake;
        };
        let delay_ms = fire_at_us.saturating_sub(now_us()) / 1_000;
        default_wake.min(Instant::now() + Duration::from_millis(delay_ms))
    }
}
