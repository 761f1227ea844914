//! The pure data model: commands, deputies, identifiers, and scripts
//! (spec §3). Nothing in this module performs I/O.

pub mod command;
pub mod deputy;
pub mod ids;
pub mod script;

pub use command::{Command, CommandStatus, Observation};
pub use deputy::{Deputy, StatusChange};
pub use ids::{RunId, SheriffId};
pub use script::{Action, IdentType, Script, WaitFor};
