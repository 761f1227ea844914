//! Parsed configuration tree (spec §4.1). Bidirectional: [`super::parse`]
//! builds it from text, [`std::fmt::Display`] renders it back out in
//! canonical form (spec §4.1's serializer).

use crate::model::Script;

/// One `cmd { ... }` block's recognized attributes.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommandAttrs {
    pub exec: String,
    pub host: String,
    pub nickname: String,
    pub auto_respawn: bool,
}

/// A `group "name" { cmd* }` block. The unnamed group (`name == ""`) holds
/// top-level commands and is printed as bare `cmd` blocks (spec §4.1).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Group {
    pub name: String,
    pub commands: Vec<CommandAttrs>,
}

/// The full parsed configuration: every group (including the unnamed one,
/// if it has commands) plus every script.
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub groups: Vec<Group>,
    pub scripts: Vec<Script>,
}

impl Config {
    pub fn new() -> Self {
        Config::default()
    }

    /// All commands across every group, paired with their group name.
    pub fn commands(&self) -> impl Iterator<Item = (&str, &CommandAttrs)> {
        self.groups
            .iter()
            .flat_map(|g| g.commands.iter().map(move |c| (g.name.as_str(), c)))
    }
}
