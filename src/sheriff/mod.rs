//! The reconciliation engine: the root aggregate holding every deputy,
//! the command-id allocator, installed scripts, and (transiently) the
//! active script execution context (spec §3 "Sheriff", §4.4).

mod executor;
mod mutators;
mod reconcile;

pub use executor::DispatchStep;

use crate::bus::message::Orders;
use crate::event::broadcaster::UnboundedBroadcast;
use crate::event::Event;
use crate::model::{Command, Deputy, Script, SheriffId, WaitFor};
use nix::unistd::gethostname;
use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

pub(crate) fn now_micros() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or(0)
}

/// One running or just-finished script activation (spec §4.5,
/// `ScriptExecutionContext`). Lives in `executor.rs`; re-exported here so
/// `Sheriff` can hold it.
pub(crate) use executor::ScriptExecutionContext;

/// The sheriff: root aggregate for one fleet (spec §3).
pub struct Sheriff {
    pub(crate) deputies: HashMap<String, Deputy>,
    pub(crate) next_sheriff_id: SheriffId,
    pub(crate) name: String,
    pub(crate) is_observer: bool,
    pub(crate) scripts: Vec<Script>,
    pub(crate) events: UnboundedBroadcast<Event>,

    pub(crate) active_script: Option<ScriptExecutionContext>,
    pub(crate) waiting_on: Vec<SheriffId>,
    pub(crate) waiting_for: Option<WaitFor>,
    pub(crate) last_script_action_time_us: u64,
    /// Bumped every time the active script is (re)started or aborted, so
    /// the event loop can recognize a timer armed for a superseded
    /// execution and drop it (spec §5, "Cancellation").
    pub(crate) script_generation: u64,
}

impl Sheriff {
    /// Builds a fresh sheriff with the canonical `"<host>:<pid>:<start-us>"`
    /// instance name (spec §3).
    pub fn new() -> Self {
        let host = gethostname()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "unknown-host".to_string());
        let name = format!("{host}:{}:{}", std::process::id(), now_micros());
        Sheriff::with_name(name)
    }

    pub fn with_name(name: impl Into<String>) -> Self {
        Sheriff {
            deputies: HashMap::new(),
            next_sheriff_id: SheriffId::new(1),
            name: name.into(),
            is_observer: false,
            scripts: Vec::new(),
            events: UnboundedBroadcast::default(),
            active_script: None,
            waiting_on: Vec::new(),
            waiting_for: None,
            last_script_action_time_us: 0,
            script_generation: 0,
        }
    }

    pub fn script_generation(&self) -> u64 {
        self.script_generation
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_observer(&self) -> bool {
        self.is_observer
    }

    pub fn set_observer(&mut self, is_observer: bool) {
        self.is_observer = is_observer;
    }

    /// Subscribe to the event fan-out (spec §4.4, §9).
    pub fn subscribe(&self) -> crossbeam::channel::Receiver<Event> {
        self.events.subscribe()
    }

    pub(crate) fn emit(&self, event: Event) {
        self.events.broadcast(event);
    }

    pub fn deputies(&self) -> impl Iterator<Item = &Deputy> {
        self.deputies.values()
    }

    pub fn find_deputy(&self, name: &str) -> Option<&Deputy> {
        self.deputies.get(name)
    }

    pub(crate) fn get_or_make_deputy(&mut self, name: &str) -> &mut Deputy {
        self.deputies
            .entry(name.to_string())
            .or_insert_with(|| Deputy::new(name))
    }

    pub fn command(&self, id: SheriffId) -> Option<&Command> {
        self.deputies.values().find_map(|d| d.command(id))
    }

    pub(crate) fn command_mut(&mut self, id: SheriffId) -> Option<&mut Command> {
        self.deputies.values_mut().find_map(|d| d.command_mut(id))
    }

    pub(crate) fn deputy_owning(&self, id: SheriffId) -> Option<&str> {
        self.deputies
            .values()
            .find(|d| d.owns_command(id))
            .map(|d| d.name.as_str())
    }

    pub fn all_commands(&self) -> Vec<&Command> {
        self.deputies.values().flat_map(Deputy::commands).collect()
    }

    pub fn commands_by_nickname(&self, nickname: &str) -> Vec<&Command> {
        self.all_commands()
            .into_iter()
            .filter(|c| c.nickname == nickname)
            .collect()
    }

    pub fn commands_by_group(&self, group: &str) -> Vec<&Command> {
        self.all_commands()
            .into_iter()
            .filter(|c| c.group == group)
            .collect()
    }

    /// Linear-probes `next_sheriff_id` across every deputy's commands,
    /// wrapping past `2^30` back to `1`, giving up after `2^16` probes
    /// (spec §4.4).
    pub(crate) fn allocate_sheriff_id(&mut self) -> crate::error::Result<SheriffId> {
        const MAX_PROBES: u32 = 1 << 16;
        for _ in 0..MAX_PROBES {
            let candidate = self.next_sheriff_id;
            self.next_sheriff_id = self.next_sheriff_id.next();
            let collision = self.deputies.values().any(|d| d.owns_command(candidate));
            if !collision {
                return Ok(candidate);
            }
        }
        Err(crate::error::SheriffError::ResourceExhausted)
    }

    /// Drops deputies whose commands are all empty or all scheduled for
    /// removal (spec §4.4).
    pub fn purge_useless_deputies(&mut self) {
        self.deputies.retain(|_, d| !d.all_removable());
    }

    pub fn get_script(&self, name: &str) -> Option<&Script> {
        self.scripts.iter().find(|s| s.name == name)
    }

    pub fn scripts(&self) -> &[Script] {
        &self.scripts
    }

    pub fn active_script(&self) -> Option<&str> {
        self.active_script.as_ref().map(|ctx| ctx.root_script_name())
    }

    /// Broadcasts `PMD_ORDERS` once per deputy (spec §4.4).
    pub async fn send_orders(&self, bus: &dyn crate::bus::Bus) -> crate::error::Result<()> {
        if self.is_observer {
            return Err(crate::error::SheriffError::ModeViolation);
        }
        for deputy in self.deputies.values() {
            let orders: Orders = deputy.make_orders(&self.name);
            bus.publish_orders(orders).await;
        }
        Ok(())
    }
}

impl Default for Sheriff {
    fn default() -> Self {
        Sheriff::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sheriff_id_allocation_avoids_collisions_across_deputies() {
        let mut sheriff = Sheriff::with_name("test");
        let dep = sheriff.get_or_make_deputy("host-a");
        for i in 1..=1000u32 {
            if i % 7 == 0 {
                dep.insert(Command::new(SheriffId::new(i), "/bin/true"));
            }
        }
        sheriff.next_sheriff_id = SheriffId::new(7);

        let allocated = sheriff.allocate_sheriff_id().unwrap();
        assert!(sheriff
            .deputies
            .values()
            .all(|d| !d.owns_command(allocated)));
    }

    #[test]
    fn purge_removes_fully_scheduled_deputies() {
        let mut sheriff = Sheriff::with_name("test");
        let dep = sheriff.get_or_make_deputy("host-a");
        let mut cmd = Command::new(SheriffId::new(1), "/bin/true");
        cmd.scheduled_for_removal = true;
        dep.insert(cmd);
        sheriff.purge_useless_deputies();
        assert!(sheriff.find_deputy("host-a").is_none());
    }
}
