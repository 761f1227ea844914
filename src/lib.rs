//! A distributed process-supervision controller: the sheriff half of a
//! sheriff/deputy fleet manager. This crate holds the reconciliation
//! engine, orders publisher, script executor, and configuration
//! parser/serializer; the wire transport, the deputy process, and any
//! GUI/terminal front-end are external collaborators.
//!
//! ```mermaid
//! flowchart LR
//!     Deputy -->|PMD_INFO| Bus
//!     Bus --> EventLoop
//!     EventLoop --> Sheriff
//!     Sheriff -->|PMD_ORDERS| Bus
//!     Bus --> Deputy
//!     Sheriff --> Events[event subscribers]
//! ```
#![cfg_attr(doc, aquamarine::aquamarine)]

pub mod bus;
pub mod config;
pub mod error;
pub mod event;
pub mod event_loop;
pub mod model;
pub mod sheriff;
pub mod timer;

pub use error::{Result, SheriffError};
pub use event_loop::EventLoop;
pub use sheriff::{DispatchStep, Sheriff};
