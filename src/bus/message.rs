//! Wire-record shapes for the `PMD_INFO` / `PMD_ORDERS` channels (spec §6).
//!
//! The actual wire transport and byte encoding are external collaborators
//! (spec §1); these types exist so the crate has a concrete, inspectable
//! payload to build the reconciliation engine and its tests against. A real
//! deployment's [`crate::bus::Bus`] implementation is free to use any
//! encoding it likes as long as it produces/consumes these shapes.

use crate::model::SheriffId;
use serde::{Deserialize, Serialize};

/// One command's reported state, nested inside [`Info`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CmdInfo {
    pub name: String,
    pub nickname: String,
    pub group: String,
    pub sheriff_id: SheriffId,
    pub pid: i32,
    pub actual_runid: u32,
    pub exit_code: i32,
    pub cpu_usage: f64,
    pub mem_vsize_bytes: u64,
    pub mem_rss_bytes: u64,
    pub auto_respawn: bool,
}

/// A deputy's periodic report of its host and commands (`PMD_INFO`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Info {
    pub utime: u64,
    pub host: String,
    pub cpu_load: f64,
    pub phys_mem_total: u64,
    pub phys_mem_free: u64,
    pub cmds: Vec<CmdInfo>,
    /// Host variables as reported by the deputy. Kept on the wire shape but
    /// not reconciled into the deputy model (spec §9 open question).
    pub variables: std::collections::HashMap<String, String>,
}

/// One command's desired state, nested inside [`Orders`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SheriffCmd {
    pub name: String,
    pub nickname: String,
    pub sheriff_id: SheriffId,
    pub desired_runid: u32,
    pub force_quit: bool,
    pub group: String,
    pub auto_respawn: bool,
}

/// The sheriff's broadcast of desired state for one deputy (`PMD_ORDERS`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Orders {
    pub utime: u64,
    pub host: String,
    pub sheriff_name: String,
    pub cmds: Vec<SheriffCmd>,
    pub variables: std::collections::HashMap<String, String>,
}

impl serde::Serialize for SheriffId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_u32(self.get())
    }
}

impl<'de> serde::Deserialize<'de> for SheriffId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        Ok(SheriffId::new(u32::deserialize(deserializer)?))
    }
}
