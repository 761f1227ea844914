//! Deputy model: a per-host table of commands (spec §3, §4.3).

use crate::bus::message::{CmdInfo, Info, Orders, SheriffCmd};
use crate::model::command::{Command, CommandStatus, Observation};
use crate::model::ids::{RunId, SheriffId};
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::time::{SystemTime, UNIX_EPOCH};

/// `(command, old_status, new_status)`. `old_status == None` means the
/// command was just added; `new_status == None` means it was just removed.
pub type StatusChange = (Command, Option<CommandStatus>, Option<CommandStatus>);

/// One remote agent's view, as held by the sheriff: its command table, host
/// metrics, and variables (spec §3, "Deputy").
#[derive(Debug, Clone, Default)]
pub struct Deputy {
    pub name: String,
    commands: HashMap<SheriffId, Command>,
    pub last_update_utime: u64,
    pub cpu_load: f64,
    pub phys_mem_total_bytes: u64,
    pub phys_mem_free_bytes: u64,
    pub variables: HashMap<String, String>,
}

impl Deputy {
    pub fn new(name: impl Into<String>) -> Self {
        Deputy {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn commands(&self) -> impl Iterator<Item = &Command> {
        self.commands.values()
    }

    pub fn command(&self, id: SheriffId) -> Option<&Command> {
        self.commands.get(&id)
    }

    pub fn command_mut(&mut self, id: SheriffId) -> Option<&mut Command> {
        self.commands.get_mut(&id)
    }

    pub fn owns_command(&self, id: SheriffId) -> bool {
        self.commands.contains_key(&id)
    }

    pub fn has_live_commands(&self) -> bool {
        !self.commands.is_empty()
    }

    pub fn all_removable(&self) -> bool {
        self.commands.is_empty() || self.commands.values().all(|c| c.scheduled_for_removal)
    }

    pub(crate) fn insert(&mut self, cmd: Command) {
        debug_assert!(!cmd.sheriff_id.is_unassigned());
        self.commands.insert(cmd.sheriff_id, cmd);
    }

    /// Reconciles an inbound `Info` report against the current table
    /// (spec §4.3, `apply_info`).
    pub fn apply_info(&mut self, info: &Info) -> Vec<StatusChange> {
        let mut changes = Vec::new();
        let mut seen = Vec::with_capacity(info.cmds.len());

        for cmd_info in &info.cmds {
            seen.push(cmd_info.sheriff_id);
            let old_status = self.commands.get(&cmd_info.sheriff_id).map(Command::status);

            let entry = match self.commands.entry(cmd_info.sheriff_id) {
                Entry::Occupied(e) => e.into_mut(),
                Entry::Vacant(e) => {
                    let mut cmd = Command::new(cmd_info.sheriff_id, cmd_info.name.clone());
                    cmd.nickname = cmd_info.nickname.clone();
                    cmd.group = cmd_info.group.clone();
                    cmd.desired_runid = RunId::new(cmd_info.actual_runid);
                    cmd.auto_respawn = cmd_info.auto_respawn;
                    e.insert(cmd)
                }
            };

            entry.apply_observation(observation_from(cmd_info));
            changes.push((entry.clone(), old_status, Some(entry.status())));
        }

        let to_remove: Vec<SheriffId> = self
            .commands
            .iter()
            .filter(|(id, cmd)| cmd.scheduled_for_removal && !seen.contains(id))
            .map(|(id, _)| *id)
            .collect();
        for id in to_remove {
            if let Some(cmd) = self.commands.remove(&id) {
                let old_status = cmd.status();
                changes.push((cmd, Some(old_status), None));
            }
        }

        self.last_update_utime = now_micros();
        self.cpu_load = info.cpu_load;
        self.phys_mem_total_bytes = info.phys_mem_total;
        self.phys_mem_free_bytes = info.phys_mem_free;
        changes
    }

    /// Mirrors intent from a peer sheriff's broadcast (observer mode, spec
    /// §4.3, `apply_orders`).
    pub fn apply_orders(&mut self, orders: &Orders) -> Vec<StatusChange> {
        let mut changes = Vec::new();
        let mut seen = Vec::with_capacity(orders.cmds.len());

        for cmd_order in &orders.cmds {
            seen.push(cmd_order.sheriff_id);
            let old_status = self.commands.get(&cmd_order.sheriff_id).map(Command::status);

            let entry = match self.commands.entry(cmd_order.sheriff_id) {
                Entry::Occupied(e) => e.into_mut(),
                Entry::Vacant(e) => {
                    let mut cmd = Command::new(cmd_order.sheriff_id, cmd_order.name.clone());
                    cmd.nickname = cmd_order.nickname.clone();
                    cmd.group = cmd_order.group.clone();
                    cmd.desired_runid = RunId::new(cmd_order.desired_runid);
                    cmd.auto_respawn = cmd_order.auto_respawn;
                    e.insert(cmd)
                }
            };

            entry.apply_intent(
                cmd_order.sheriff_id,
                cmd_order.name.clone(),
                cmd_order.nickname.clone(),
                cmd_order.group.clone(),
                RunId::new(cmd_order.desired_runid),
                cmd_order.force_quit,
            );
            changes.push((entry.clone(), old_status, Some(entry.status())));
        }

        for (id, cmd) in self.commands.iter_mut() {
            if !seen.contains(id) && !cmd.scheduled_for_removal {
                let old_status = cmd.status();
                cmd.scheduled_for_removal = true;
                let new_status = cmd.status();
                if old_status != new_status {
                    changes.push((cmd.clone(), Some(old_status), Some(new_status)));
                }
            }
        }
        changes
    }

    /// Schedules a command for removal. If this deputy has never reported
    /// in, it is removed immediately (spec §4.3).
    pub fn schedule_for_removal(&mut self, id: SheriffId) -> Option<StatusChange> {
        let old_status = self.commands.get(&id)?.status();
        if self.last_update_utime == 0 {
            let cmd = self.commands.remove(&id)?;
            return Some((cmd, Some(old_status), None));
        }
        let cmd = self.commands.get_mut(&id)?;
        cmd.scheduled_for_removal = true;
        let new_status = cmd.status();
        Some((cmd.clone(), Some(old_status), Some(new_status)))
    }

    /// Builds the outbound orders message for this deputy (spec §4.3,
    /// `make_orders`).
    pub fn make_orders(&self, sheriff_name: &str) -> Orders {
        let cmds: Vec<SheriffCmd> = self
            .commands
            .values()
            .filter(|c| !c.scheduled_for_removal)
            .map(|c| SheriffCmd {
                name: c.name.clone(),
                nickname: c.nickname.clone(),
                sheriff_id: c.sheriff_id,
                desired_runid: c.desired_runid.get(),
                force_quit: c.force_quit,
                group: c.group.clone(),
                auto_respawn: c.auto_respawn,
            })
            .collect();

        Orders {
            utime: now_micros(),
            host: self.name.clone(),
            sheriff_name: sheriff_name.to_string(),
            cmds,
            variables: self.variables.clone(),
        }
    }
}

/// Wire `cpu_usage` is a fraction (spec §6); the model keeps the observed
/// CPU usage as millipercent (thousandths of a percent) internally.
fn observation_from(info: &CmdInfo) -> Observation {
    Observation {
        pid: info.pid,
        actual_runid: info.actual_runid,
        exit_code: info.exit_code,
        cpu_usage_millipercent: (info.cpu_usage * 100_000.0).round() as u32,
        mem_vsize_bytes: info.mem_vsize_bytes,
        mem_rss_bytes: info.mem_rss_bytes,
    }
}

fn now_micros() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or(0)
}
