//! Lineage-VCS: tool boundary for dataset lineage
//!
//! Everything that crosses from the lineage engine into the filesystem or an
//! external version-control process goes through this crate.
//!
//! ## Layer 1 - Tool Boundary
//!
//! Focus: path containment, bounded process execution, fixed argument shapes.

pub mod command;
pub mod error;
pub mod fakes;
pub mod path_guard;
pub mod runner;

pub use command::{GitCommands, Revision, LOG_FIELD_SEP, LOG_FORMAT, LOG_RECORD_SEP};
pub use error::{PathEscapeError, RevisionError, VcsError, VcsResult};
pub use fakes::ScriptedRunner;
pub use path_guard::{lexical_normalize, PathGuard, ResolvedPath};
pub use runner::{CommandOutput, CommandRunner, Invocation, ProcessRunner};
