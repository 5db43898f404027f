//! discat-rd - Disc Read Daemon
//!
//! Reads optical disc metadata by driving the external disc tool in robot
//! mode, assembles its line-protocol output into a disc graph, and
//! reconciles that graph into the append-only SQLite catalog. Each read is
//! one session with a terminal outcome (complete, failed, or partial) and
//! an ordered stream of status events.

pub mod error;
pub mod graph;
pub mod orchestrator;
pub mod parser;
pub mod publish;
pub mod reconcile;
pub mod session;
pub mod tool;

pub use crate::error::{ParseError, SessionError};
pub use crate::orchestrator::{Orchestrator, ReadRequest, SessionOutcome};
