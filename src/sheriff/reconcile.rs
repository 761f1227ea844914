//! Inbound message reconciliation and config load/save (spec §4.4).

use super::{now_micros, Sheriff};
use crate::bus::message::{Info, Orders};
use crate::bus::Bus;
use crate::config::{CommandAttrs, Config, Group};
use crate::error::Result;
use crate::event::Event;
use crate::model::SheriffId;
use std::collections::BTreeMap;

/// Inbound `PMD_INFO` messages older than this are dropped (spec §4.4).
const STALE_AFTER_US: u64 = 30 * 1_000_000;

impl Sheriff {
    /// Reconciles one deputy's periodic report. Silently drops reports
    /// older than 30 seconds unless this sheriff is in observer mode.
    pub fn apply_info(&mut self, info: Info) {
        let age_us = now_micros().saturating_sub(info.utime);
        if age_us > STALE_AFTER_US && !self.is_observer {
            tracing::warn!(host = %info.host, age_ms = age_us / 1000, "dropping stale PMD_INFO");
            return;
        }
        let deputy_name = info.host.clone();
        let changes = self.get_or_make_deputy(&deputy_name).apply_info(&info);
        self.emit(Event::DeputyInfoReceived {
            deputy: deputy_name.clone(),
        });
        self.fan_out(&deputy_name, changes);
    }

    /// Mirrors a peer sheriff's broadcast. No-op unless in observer mode.
    pub fn apply_orders(&mut self, orders: Orders) {
        if !self.is_observer {
            return;
        }
        let deputy_name = orders.host.clone();
        let changes = self.get_or_make_deputy(&deputy_name).apply_orders(&orders);
        self.fan_out(&deputy_name, changes);
    }

    fn fan_out(&mut self, deputy_name: &str, changes: Vec<crate::model::StatusChange>) {
        let mut any_status_change = false;
        for (cmd, old, new) in changes {
            match (old, new) {
                (_, None) => self.emit(Event::CommandRemoved {
                    deputy: deputy_name.to_string(),
                    command: cmd,
                }),
                (None, Some(_)) => self.emit(Event::CommandAdded {
                    deputy: deputy_name.to_string(),
                    command: cmd,
                }),
                (Some(old_status), Some(new_status)) => {
                    self.emit(Event::CommandStatusChanged {
                        command: cmd,
                        old: old_status,
                        new: new_status,
                    });
                    any_status_change = true;
                }
            }
        }
        if any_status_change {
            self.check_wait_action_status();
        }
    }

    /// Replaces the entire model from a parsed config (spec §4.4): schedules
    /// every existing command for removal, drops all scripts, then installs
    /// the parsed commands and scripts fresh.
    pub async fn load_config(&mut self, bus: &dyn Bus, config: &Config) -> Result<()> {
        self.require_mutable()?;
        let ids: Vec<SheriffId> = self.all_commands().into_iter().map(|c| c.sheriff_id).collect();
        for id in ids {
            self.schedule_command_for_removal(bus, id).await?;
        }
        self.scripts.clear();

        for (group_name, attrs) in config.commands() {
            self.add_command(
                bus,
                &attrs.host,
                attrs.exec.clone(),
                attrs.nickname.clone(),
                group_name,
                attrs.auto_respawn,
            )
            .await?;
        }
        for script in &config.scripts {
            self.add_script(script.clone())?;
        }
        Ok(())
    }

    /// Builds a `Config` tree mirroring the current model (spec §4.4).
    pub fn save_config(&self) -> Config {
        let mut groups: BTreeMap<String, Vec<CommandAttrs>> = BTreeMap::new();
        for cmd in self.all_commands() {
            if cmd.scheduled_for_removal {
                continue;
            }
            let deputy_name = self
                .deputy_owning(cmd.sheriff_id)
                .unwrap_or_default()
                .to_string();
            groups.entry(cmd.group.clone()).or_default().push(CommandAttrs {
                exec: cmd.name.clone(),
                host: deputy_name,
                nickname: cmd.nickname.clone(),
                auto_respawn: cmd.auto_respawn,
            });
        }

        let mut config = Config::new();
        config.groups = groups
            .into_iter()
            .map(|(name, commands)| Group { name, commands })
            .collect();
        config.scripts = self.scripts.clone();
        config
    }
}
