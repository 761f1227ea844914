//! Command model and status derivation (spec §3, §4.2).

use crate::model::ids::{RunId, SheriffId};
use nix::sys::signal::Signal;
use nix::sys::wait::WaitStatus as NixWaitStatus;
use nix::unistd::Pid;

/// The six-valued status derived purely from a command's fields (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandStatus {
    TryingToStart,
    Restarting,
    Running,
    TryingToStop,
    Removing,
    StoppedOk,
    StoppedError,
    Unknown,
}

/// Fields written only by the inbound-info path (spec §3, "Observed fields").
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Observation {
    pub pid: i32,
    pub actual_runid: u32,
    pub exit_code: i32,
    pub cpu_usage_millipercent: u32,
    pub mem_vsize_bytes: u64,
    pub mem_rss_bytes: u64,
}

/// One process under supervision, identified by [`SheriffId`].
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    pub sheriff_id: SheriffId,
    pub name: String,
    pub nickname: String,
    pub group: String,
    pub desired_runid: RunId,
    pub force_quit: bool,
    pub auto_respawn: bool,
    pub scheduled_for_removal: bool,
    pub observation: Observation,
}

impl Command {
    pub fn new(sheriff_id: SheriffId, name: impl Into<String>) -> Self {
        Command {
            sheriff_id,
            name: name.into(),
            nickname: String::new(),
            group: String::new(),
            desired_runid: RunId::default(),
            force_quit: false,
            auto_respawn: false,
            scheduled_for_removal: false,
            observation: Observation::default(),
        }
    }

    pub fn actual_runid(&self) -> u32 {
        self.observation.actual_runid
    }

    pub fn pid(&self) -> i32 {
        self.observation.pid
    }

    /// Bumps `desired_runid` unless already running (mirrors `_start` in the
    /// original: a no-op if the process is running and not being force-quit).
    pub fn start(&mut self) {
        if self.pid() > 0 && !self.force_quit {
            return;
        }
        self.desired_runid = self.desired_runid.bump();
        self.force_quit = false;
    }

    /// Unconditionally bumps `desired_runid`, clearing `force_quit`.
    pub fn restart(&mut self) {
        self.desired_runid = self.desired_runid.bump();
        self.force_quit = false;
    }

    /// Requests termination.
    pub fn stop(&mut self) {
        self.force_quit = true;
    }

    /// Overwrites observed fields and applies the natural-completion
    /// invariant from spec §3: once a command has run to completion and
    /// doesn't need to respawn, force_quit is synthesized so a deputy
    /// restart won't bring it back.
    pub fn apply_observation(&mut self, obs: Observation) {
        self.observation = obs;
        if self.pid() == 0
            && self.actual_runid() == self.desired_runid.get()
            && !self.auto_respawn
            && !self.force_quit
        {
            self.force_quit = true;
        }
    }

    /// Mirrors desired fields from a peer sheriff's order (observer mode).
    ///
    /// The caller has already looked this command up by `sheriff_id`, so a
    /// mismatch here is an implementation bug, not a user-facing error
    /// (spec §9 open question) — hence `debug_assert!` rather than a
    /// `Result`.
    pub fn apply_intent(
        &mut self,
        sheriff_id: SheriffId,
        name: String,
        nickname: String,
        group: String,
        desired_runid: RunId,
        force_quit: bool,
    ) {
        debug_assert_eq!(self.sheriff_id, sheriff_id);
        self.name = name;
        self.nickname = nickname;
        self.group = group;
        self.desired_runid = desired_runid;
        self.force_quit = force_quit;
    }

    /// Pure function of fields; see the table in spec §3.
    pub fn status(&self) -> CommandStatus {
        let desired = self.desired_runid.get();
        let actual = self.actual_runid();

        if desired != actual {
            if self.force_quit {
                return CommandStatus::Unknown;
            }
            return if self.pid() == 0 {
                CommandStatus::TryingToStart
            } else {
                CommandStatus::Restarting
            };
        }

        if self.pid() > 0 {
            return if self.force_quit || self.scheduled_for_removal {
                CommandStatus::TryingToStop
            } else {
                CommandStatus::Running
            };
        }

        if self.scheduled_for_removal {
            return CommandStatus::Removing;
        }
        if self.observation.exit_code == 0 {
            return CommandStatus::StoppedOk;
        }
        if self.force_quit && exited_from_expected_signal(self.observation.exit_code) {
            return CommandStatus::StoppedOk;
        }
        CommandStatus::StoppedError
    }
}

/// Decodes a POSIX wait-status encoding and reports whether the process
/// died from one of TERM/INT/KILL — the signals a deliberate stop is
/// expected to use (spec §3 status table).
fn exited_from_expected_signal(raw_wait_status: i32) -> bool {
    matches!(
        NixWaitStatus::from_raw(Pid::from_raw(0), raw_wait_status),
        Ok(NixWaitStatus::Signaled(_, Signal::SIGTERM | Signal::SIGINT | Signal::SIGKILL, _))
    )
}
