//! Script and action types shared by the configuration grammar (spec §4.1)
//! and the script executor (spec §4.5).

use std::fmt;

/// What an action's `ident` refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentType {
    Cmd,
    Group,
    Everything,
}

impl fmt::Display for IdentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            IdentType::Cmd => "cmd",
            IdentType::Group => "group",
            IdentType::Everything => "everything",
        };
        write!(f, "{s}")
    }
}

/// The status a `wait` clause blocks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitFor {
    Running,
    Stopped,
}

impl fmt::Display for WaitFor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WaitFor::Running => "running",
            WaitFor::Stopped => "stopped",
        };
        write!(f, "{s}")
    }
}

/// One step of a [`Script`].
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Start {
        ident_type: IdentType,
        ident: Option<String>,
        wait: Option<WaitFor>,
    },
    Stop {
        ident_type: IdentType,
        ident: Option<String>,
        wait: Option<WaitFor>,
    },
    Restart {
        ident_type: IdentType,
        ident: Option<String>,
        wait: Option<WaitFor>,
    },
    WaitMs(u64),
    WaitStatus {
        ident_type: IdentType,
        ident: String,
        wait: WaitFor,
    },
    RunScript(String),
}

impl Action {
    /// The verb used both by the grammar and by error messages (`"start"`, ...).
    pub fn verb(&self) -> &'static str {
        match self {
            Action::Start { .. } => "start",
            Action::Stop { .. } => "stop",
            Action::Restart { .. } => "restart",
            Action::WaitMs(_) => "wait_ms",
            Action::WaitStatus { .. } => "wait_status",
            Action::RunScript(_) => "run_script",
        }
    }
}

/// A named, ordered sequence of actions.
#[derive(Debug, Clone, PartialEq)]
pub struct Script {
    pub name: String,
    pub actions: Vec<Action>,
}

impl Script {
    pub fn new(name: impl Into<String>) -> Self {
        Script {
            name: name.into(),
            actions: Vec::new(),
        }
    }
}
