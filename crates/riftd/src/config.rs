//! Process-wide settings, from flags or `RIFT_*` environment variables.

use std::path::PathBuf;

use clap::Args;
use rift_core::domain::Language;
use rift_pipeline::{ContainerCli, ContainerPool, WorkspaceLayout};

#[derive(Debug, Clone, Args)]
pub struct Settings {
    /// Container serving Python projects
    #[arg(long, env = "RIFT_PYTHON_CONTAINER", default_value = "rift-python", global = true)]
    pub python_container: String,

    /// Container serving Node.js projects
    #[arg(long, env = "RIFT_NODE_CONTAINER", default_value = "rift-node", global = true)]
    pub node_container: String,

    /// Host directory that receives checkouts
    #[arg(long, env = "RIFT_REPOS_ROOT", default_value = "repos", global = true)]
    pub repos_root: PathBuf,

    /// Where the host repos root is mounted inside the containers
    #[arg(long, env = "RIFT_CONTAINER_REPOS_ROOT", default_value = "/repos", global = true)]
    pub container_repos_root: String,

    /// Container CLI invocation (e.g. "docker", "sudo docker", "podman")
    #[arg(long, env = "RIFT_CONTAINER_CLI", default_value = "docker", global = true)]
    pub container_cli: String,

    /// HTTP endpoint of the fix producer; without it fixes are always skipped
    #[arg(long, env = "RIFT_FIX_ENDPOINT", global = true)]
    pub fix_endpoint: Option<String>,

    /// Log lines buffered for a slow subscriber before new ones are dropped
    #[arg(long, env = "RIFT_EVENT_BUFFER", default_value_t = 1024, global = true)]
    pub event_buffer: usize,
}

impl Settings {
    pub fn container_pool(&self) -> ContainerPool {
        ContainerPool::new()
            .with(Language::Python, self.python_container.clone())
            .with(Language::Nodejs, self.node_container.clone())
    }

    pub fn container_cli(&self) -> rift_core::Result<ContainerCli> {
        ContainerCli::parse(&self.container_cli)
    }

    pub fn layout(&self) -> WorkspaceLayout {
        WorkspaceLayout::new(self.repos_root.clone(), self.container_repos_root.clone())
    }

    /// Configured fix endpoint, ignoring blank values.
    pub fn fix_endpoint(&self) -> Option<&str> {
        self.fix_endpoint
            .as_deref()
            .map(str::trim)
            .filter(|e| !e.is_empty())
    }
}
