//! Rift Pipeline - container execution and the test/fix loop
//!
//! Provides:
//! - Command resolution and normalization for install/test phases
//! - A container backend that execs into pre-provisioned language containers
//! - The orchestrator that runs install, then tests and fixes until green or
//!   out of iterations, streaming every step as events

pub mod backend;
pub mod command;
pub mod fakes;
pub mod normalize;
pub mod pipeline;
pub mod stream;
pub mod workspace;

// Re-export key types
pub use backend::{ContainerBackend, ContainerCli, ContainerPool, DockerBackend, ExecutionResult};
pub use command::{default_command, CommandResolver, CommandRole};
pub use pipeline::{agent_commit_message, Pipeline};
pub use stream::{LineSplitter, StreamingExecution};
pub use workspace::WorkspaceLayout;
