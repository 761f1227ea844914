//! Operator mutators (spec §4.4): everything that changes desired state.
//! Forbidden in observer mode except the read-only accessors in `mod.rs`.

use super::Sheriff;
use crate::bus::Bus;
use crate::error::{Result, SheriffError};
use crate::event::Event;
use crate::model::{Command, CommandStatus, Script, SheriffId};

impl Sheriff {
    pub(crate) fn require_mutable(&self) -> Result<()> {
        if self.is_observer {
            Err(SheriffError::ModeViolation)
        } else {
            Ok(())
        }
    }

    /// Allocates a fresh id, adds a new command to `deputy_name`'s table, and
    /// broadcasts the deputy's updated orders (spec §4.4, §5).
    pub async fn add_command(
        &mut self,
        bus: &dyn Bus,
        deputy_name: &str,
        name: impl Into<String>,
        nickname: impl Into<String>,
        group: impl Into<String>,
        auto_respawn: bool,
    ) -> Result<Command> {
        self.require_mutable()?;
        let id = self.allocate_sheriff_id()?;
        let mut cmd = Command::new(id, name);
        cmd.nickname = nickname.into();
        cmd.group = group.into();
        cmd.auto_respawn = auto_respawn;
        self.get_or_make_deputy(deputy_name).insert(cmd.clone());
        self.emit(Event::CommandAdded {
            deputy: deputy_name.to_string(),
            command: cmd.clone(),
        });
        self.send_orders(bus).await?;
        Ok(cmd)
    }

    pub async fn start_command(&mut self, bus: &dyn Bus, id: SheriffId) -> Result<()> {
        self.mutate_command(bus, id, Command::start).await
    }

    pub async fn stop_command(&mut self, bus: &dyn Bus, id: SheriffId) -> Result<()> {
        self.mutate_command(bus, id, Command::stop).await
    }

    pub async fn restart_command(&mut self, bus: &dyn Bus, id: SheriffId) -> Result<()> {
        self.mutate_command(bus, id, Command::restart).await
    }

    async fn mutate_command(
        &mut self,
        bus: &dyn Bus,
        id: SheriffId,
        mutate: fn(&mut Command),
    ) -> Result<()> {
        self.require_mutable()?;
        self.command(id)
            .ok_or_else(|| SheriffError::NotFound(format!("command {id}")))?;
        let old_status = self.command(id).map(Command::status);
        if let Some(cmd) = self.command_mut(id) {
            mutate(cmd);
        }
        let new_status = self.command(id).map(Command::status);
        if old_status != new_status {
            if let Some(cmd) = self.command(id).cloned() {
                self.emit(Event::CommandStatusChanged {
                    command: cmd,
                    old: old_status.unwrap_or(CommandStatus::Unknown),
                    new: new_status.unwrap_or(CommandStatus::Unknown),
                });
                self.check_wait_action_status();
            }
        }
        self.send_orders(bus).await?;
        Ok(())
    }

    pub fn set_command_group(&mut self, id: SheriffId, group: impl Into<String>) -> Result<()> {
        self.require_mutable()?;
        let group = group.into();
        let cmd = self
            .command_mut(id)
            .ok_or_else(|| SheriffError::NotFound(format!("command {id}")))?;
        if cmd.group != group {
            cmd.group = group;
            let cmd = cmd.clone();
            self.emit(Event::CommandGroupChanged { command: cmd });
        }
        Ok(())
    }

    pub fn set_command_name(&mut self, id: SheriffId, name: impl Into<String>) -> Result<()> {
        self.require_mutable()?;
        let cmd = self
            .command_mut(id)
            .ok_or_else(|| SheriffError::NotFound(format!("command {id}")))?;
        cmd.name = name.into();
        Ok(())
    }

    pub fn set_command_nickname(&mut self, id: SheriffId, nickname: impl Into<String>) -> Result<()> {
        self.require_mutable()?;
        let cmd = self
            .command_mut(id)
            .ok_or_else(|| SheriffError::NotFound(format!("command {id}")))?;
        cmd.nickname = nickname.into();
        Ok(())
    }

    pub fn set_command_auto_respawn(&mut self, id: SheriffId, auto_respawn: bool) -> Result<()> {
        self.require_mutable()?;
        let cmd = self
            .command_mut(id)
            .ok_or_else(|| SheriffError::NotFound(format!("command {id}")))?;
        cmd.auto_respawn = auto_respawn;
        Ok(())
    }

    pub async fn schedule_command_for_removal(&mut self, bus: &dyn Bus, id: SheriffId) -> Result<()> {
        self.require_mutable()?;
        let deputy_name = self
            .deputy_owning(id)
            .map(str::to_string)
            .ok_or_else(|| SheriffError::NotFound(format!("command {id}")))?;
        let deputy = self
            .deputies
            .get_mut(&deputy_name)
            .expect("deputy_owning just confirmed this deputy exists");
        if let Some((cmd, old, new)) = deputy.schedule_for_removal(id) {
            match new {
                None => self.emit(Event::CommandRemoved {
                    deputy: deputy_name,
                    command: cmd,
                }),
                Some(new_status) => self.emit(Event::CommandStatusChanged {
                    command: cmd,
                    old: old.unwrap_or(CommandStatus::Unknown),
                    new: new_status,
                }),
            }
        }
        self.send_orders(bus).await?;
        Ok(())
    }

    /// Schedules `id` for removal on its current deputy, then adds an
    /// equivalent command (fresh id) on `new_deputy` (spec §4.4).
    pub async fn move_command_to_deputy(
        &mut self,
        bus: &dyn Bus,
        id: SheriffId,
        new_deputy: &str,
    ) -> Result<Command> {
        self.require_mutable()?;
        let cmd = self
            .command(id)
            .cloned()
            .ok_or_else(|| SheriffError::NotFound(format!("command {id}")))?;
        self.schedule_command_for_removal(bus, id).await?;
        self.add_command(bus, new_deputy, cmd.name, cmd.nickname, cmd.group, cmd.auto_respawn)
            .await
    }

    /// Installs a new script (spec §3 supplement, grounded on `add_script`).
    pub fn add_script(&mut self, script: Script) -> Result<()> {
        if self.scripts.iter().any(|s| s.name == script.name) {
            return Err(SheriffError::InvalidArgument(format!(
                "duplicate script \"{}\"",
                script.name
            )));
        }
        let name = script.name.clone();
        self.scripts.push(script);
        self.emit(Event::ScriptAdded { name });
        Ok(())
    }

    /// Removes a script by name. Rejected while any script is active
    /// (spec §3 supplement, `ScriptInUse`).
    pub fn remove_script(&mut self, name: &str) -> Result<()> {
        if self.active_script.is_some() {
            return Err(SheriffError::ScriptInUse);
        }
        let pos = self
            .scripts
            .iter()
            .position(|s| s.name == name)
            .ok_or_else(|| SheriffError::NotFound(format!("script \"{name}\"")))?;
        self.scripts.remove(pos);
        self.emit(Event::ScriptRemoved {
            name: name.to_string(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::InMemoryBus;

    #[tokio::test]
    async fn mutators_are_rejected_in_observer_mode() {
        let (bus, _handle) = InMemoryBus::new();
        let mut sheriff = Sheriff::with_name("test");
        sheriff.set_observer(true);
        let err = sheriff
            .add_command(&bus, "host-a", "/bin/true", "", "", false)
            .await
            .unwrap_err();
        assert!(matches!(err, SheriffError::ModeViolation));
    }

    #[tokio::test]
    async fn start_command_emits_status_changed_on_transition() {
        let (bus, _handle) = InMemoryBus::new();
        let mut sheriff = Sheriff::with_name("test");
        let cmd = sheriff
            .add_command(&bus, "host-a", "/bin/true", "svc", "", false)
            .await
            .unwrap();
        let rx = sheriff.subscribe();
        let _ = rx.try_recv();

        sheriff.start_command(&bus, cmd.sheriff_id).await.unwrap();
        let event = rx.try_recv().unwrap();
        match event {
            Event::CommandStatusChanged { new, .. } => {
                assert_eq!(new, CommandStatus::TryingToStart)
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn move_command_to_deputy_reassigns_host() {
        let (bus, _handle) = InMemoryBus::new();
        let mut sheriff = Sheriff::with_name("test");
        let cmd = sheriff
            .add_command(&bus, "host-a", "/bin/true", "svc", "", false)
            .await
            .unwrap();
        let moved = sheriff
            .move_command_to_deputy(&bus, cmd.sheriff_id, "host-b")
            .await
            .unwrap();
        assert_eq!(moved.nickname, "svc");
        assert!(sheriff.find_deputy("host-b").unwrap().owns_command(moved.sheriff_id));
    }

    #[test]
    fn remove_script_rejected_while_one_is_active() {
        let mut sheriff = Sheriff::with_name("test");
        sheriff.add_script(Script::new("noop")).unwrap();
        sheriff.execute_script("noop").unwrap();
        let err = sheriff.remove_script("noop").unwrap_err();
        assert!(matches!(err, SheriffError::ScriptInUse));
    }

    #[test]
    fn add_script_rejects_duplicate_name() {
        let mut sheriff = Sheriff::with_name("test");
        sheriff.add_script(Script::new("a")).unwrap();
        let err = sheriff.add_script(Script::new("a")).unwrap_err();
        assert!(matches!(err, SheriffError::InvalidArgument(_)));
    }
}
