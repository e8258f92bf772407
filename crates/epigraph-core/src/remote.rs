//! Remote shell and file-transfer collaborator.
//!
//! Thin wrapper over the system `ssh`/`scp` binaries: run a command on a
//! remote host, copy a file back. Parameterized by host/port/user and an
//! identity file.

use anyhow::{bail, Context, Result};
use tokio::process::Command;

/// Connection parameters for one remote host.
#[derive(Debug, Clone)]
pub struct SshConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub key_path: String,
}

/// Executes commands and transfers files on a remote host.
pub struct RemoteShell {
    conf: SshConfig,
}

impl RemoteShell {
    #[must_use]
    pub fn new(conf: SshConfig) -> Self {
        Self { conf }
    }

    fn target(&self) -> String {
        format!("{}@{}", self.conf.user, self.conf.host)
    }

    /// Run `shell` on the remote host, returning its stdout.
    ///
    /// # Errors
    ///
    /// Fails when `ssh` can't be spawned or exits non-zero.
    pub async fn run(&self, shell: &str) -> Result<String> {
        let output = Command::new("ssh")
            .arg("-o")
            .arg("BatchMode=yes")
            .arg("-i")
            .arg(&self.conf.key_path)
            .arg("-p")
            .arg(self.conf.port.to_string())
            .arg(self.target())
            .arg(shell)
            .output()
            .await
            .context("failed to spawn ssh")?;

        if !output.status.success() {
            bail!(
                "remote command failed ({}): {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Copy `remote_path` on the host to `local_path`.
    ///
    /// # Errors
    ///
    /// Fails when `scp` can't be spawned or exits non-zero.
    pub async fn copy_from_remote(&self, remote_path: &str, local_path: &str) -> Result<()> {
        let output = Command::new("scp")
            .arg("-o")
            .arg("BatchMode=yes")
            .arg("-i")
            .arg(&self.conf.key_path)
            .arg("-P")
            .arg(self.conf.port.to_string())
            .arg(format!("{}:{}", self.target(), remote_path))
            .arg(local_path)
            .output()
            .await
            .context("failed to spawn scp")?;

        if !output.status.success() {
            bail!(
                "remote copy failed ({}): {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_formats_user_and_host() {
        let shell = RemoteShell::new(SshConfig {
            host: "10.0.0.5".into(),
            port: 2222,
            user: "epik".into(),
            key_path: "/root/.ssh/id_rsa".into(),
        });
        assert_eq!(shell.target(), "epik@10.0.0.5");
    }
}
