//! Catalog database access
//!
//! Three relations hold the disc catalog: `discs`, `disc_titles`, and
//! `disc_streams`. The catalog is append-only: a re-read of a disc with
//! changed content adds a new generation of rows linked to the prior one
//! via `supersedes_uid`; prior generations are never mutated or deleted.

pub mod catalog;
pub mod init;
pub mod models;

pub use init::{init_database, init_database_in_memory};
pub use models::{DiscRow, ReadStatus, StreamRow, TitleRow};
