//! Launching new backend processes.

use std::io;
use std::process::Stdio;
use tokio::process::Command;
use tracing::info;

/// Provisioning failure.
#[derive(Debug, thiserror::Error)]
pub enum ProvisionError {
    #[error("provisioning command is empty")]
    EmptyCommand,

    #[error("failed to spawn '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },
}

/// Starts a backend listening on a given port.
///
/// Success means the launch was issued, not that the backend is reachable;
/// the next health probe decides that.
pub trait Provisioner: Send + Sync {
    fn provision(&self, port: u16) -> Result<(), ProvisionError>;
}

/// Spawns a configured command with the port appended as its last argument.
#[derive(Debug, Clone)]
pub struct CommandProvisioner {
    command: Vec<String>,
}

impl CommandProvisioner {
    pub fn new(command: Vec<String>) -> Self {
        Self { command }
    }

    pub fn command(&self) -> &[String] {
        &self.command
    }
}

impl Provisioner for CommandProvisioner {
    fn provision(&self, port: u16) -> Result<(), ProvisionError> {
        let (program, args) = self
            .command
            .split_first()
            .ok_or(ProvisionError::EmptyCommand)?;

        let child = Command::new(program)
            .args(args)
            .arg(port.to_string())
            .stdin(Stdio::null())
            .spawn()
            .map_err(|source| ProvisionError::Spawn {
                command: self.command.join(" "),
                source,
            })?;

        // Not awaited; the runtime reaps the child when it exits
        info!(pid = ?child.id(), program = %program, port, "spawned backend process");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_empty_command() {
        let provisioner = CommandProvisioner::new(Vec::new());
        assert!(matches!(
            provisioner.provision(9084),
            Err(ProvisionError::EmptyCommand)
        ));
    }

    #[tokio::test]
    async fn test_missing_program() {
        let provisioner = CommandProvisioner::new(vec!["tcplb-no-such-program".to_string()]);
        let err = provisioner.provision(9084).unwrap_err();
        assert!(matches!(err, ProvisionError::Spawn { .. }));
        assert!(err.to_string().contains("tcplb-no-such-program"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_spawn_appends_port() {
        let provisioner = CommandProvisioner::new(vec!["true".to_string()]);
        assert!(provisioner.provision(9084).is_ok());
    }
}
