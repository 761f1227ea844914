//! Typed event fan-out (spec §4.4's "status-change fan-out", §9's design
//! note on the event surface). Every signal the original's dynamic GObject
//! signal system emits becomes one [`Event`] variant; subscribers receive
//! clones over a [`broadcaster::UnboundedBroadcast`] channel, synchronously
//! on the event-loop thread (spec §5).

pub mod broadcaster;

use crate::model::{Action, Command, CommandStatus};

/// Every observable occurrence the reconciliation engine and script
/// executor produce.
#[derive(Debug, Clone)]
pub enum Event {
    /// A deputy's `PMD_INFO` report was reconciled (spec §4.4).
    DeputyInfoReceived { deputy: String },
    /// A command was newly added to the model (status-change fan-out,
    /// `old == None`).
    CommandAdded { deputy: String, command: Command },
    /// A command was removed from the model (status-change fan-out,
    /// `new == None`).
    CommandRemoved { deputy: String, command: Command },
    /// A command's derived status changed.
    CommandStatusChanged {
        command: Command,
        old: CommandStatus,
        new: CommandStatus,
    },
    /// A command moved to a different group (spec §4.4, `set_command_group`).
    CommandGroupChanged { command: Command },
    /// A script was installed (§3 supplement, grounded on the original's
    /// `script-added` signal).
    ScriptAdded { name: String },
    /// A script was removed (§3 supplement, `script-removed`).
    ScriptRemoved { name: String },
    /// `execute_script` began running a script.
    ScriptStarted { name: String },
    /// The dispatch loop is about to execute one action.
    ScriptActionExecuting { script: String, action: Action },
    /// The active script finished (or was aborted).
    ScriptFinished { name: String },
}
