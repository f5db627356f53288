//! The remote-shell collaborator and its `ssh`/`scp` adapter.

use std::path::Path;
use std::process::{Command, Stdio};

use serde::{Deserialize, Serialize};
use urlfs_core::Error;

/// Captured result of one remote command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    /// Exit status; `None` if the process was killed by a signal.
    pub status: Option<i32>,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status == Some(0)
    }

    pub fn stdout_str(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    /// Turn a failed run into [`Error::BackendCommandFailure`].
    pub fn check(self, command: &str) -> Result<Self, Error> {
        if self.success() {
            return Ok(self);
        }
        Err(Error::BackendCommandFailure {
            command: command.to_string(),
            status: self.status,
            message: String::from_utf8_lossy(&self.stderr).trim().to_string(),
        })
    }
}

/// Runs commands on, and copies files to and from, a remote location.
///
/// `location` is `host` or `user@host`.
pub trait RemoteShell: Send + Sync {
    /// Run one shell command line remotely and capture its output.
    ///
    /// A non-zero exit is not an error here; callers inspect `status`.
    fn run_command(&self, location: &str, line: &str) -> Result<CommandOutput, Error>;

    /// Copy `local` to `remote` on `location`.
    fn copy_to(
        &self,
        local: &Path,
        location: &str,
        remote: &str,
        recursive: bool,
    ) -> Result<(), Error>;

    /// Copy `remote` on `location` to `local`.
    fn copy_from(
        &self,
        location: &str,
        remote: &str,
        local: &Path,
        recursive: bool,
    ) -> Result<(), Error>;
}

/// Quote `word` for a POSIX shell.
pub fn quote(word: &str) -> String {
    format!("'{}'", word.replace('\'', r"'\''"))
}

/// [`RemoteShell`] over the OpenSSH command line tools.
///
/// Non-interactive: password prompts fail instead of blocking and unknown
/// host keys are accepted. Use `ssh_config` for multiplexing and keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenSsh {
    pub ssh_program: String,
    pub scp_program: String,
    /// Extra arguments passed to both programs, e.g. `["-o", "Port=2222"]`.
    pub options: Vec<String>,
}

impl Default for OpenSsh {
    fn default() -> Self {
        Self {
            ssh_program: "ssh".to_string(),
            scp_program: "scp".to_string(),
            options: vec![
                "-o".to_string(),
                "PasswordAuthentication=no".to_string(),
                "-o".to_string(),
                "StrictHostKeyChecking=no".to_string(),
            ],
        }
    }
}

impl OpenSsh {
    fn ssh_command(&self, location: &str, line: &str) -> Command {
        let mut command = Command::new(&self.ssh_program);
        command.args(&self.options).arg(location).arg(line);
        command
    }

    fn scp_command(&self, recursive: bool, src: &str, dst: &str) -> Command {
        let mut command = Command::new(&self.scp_program);
        command.arg("-B").args(&self.options);
        if recursive {
            command.arg("-r");
        }
        command.arg(src).arg(dst);
        command
    }

    fn scp(&self, mut command: Command) -> Result<(), Error> {
        log::debug!("{}", describe(&command));
        let output = command.stdin(Stdio::null()).output()?;
        CommandOutput {
            stdout: output.stdout,
            stderr: output.stderr,
            status: output.status.code(),
        }
        .check(&self.scp_program)?;
        Ok(())
    }
}

fn describe(command: &Command) -> String {
    let program = command.get_program().to_string_lossy().to_string();
    let args: Vec<String> = command
        .get_args()
        .map(|arg| arg.to_string_lossy().to_string())
        .collect();
    format!("{} {}", program, args.join(" "))
}

impl RemoteShell for OpenSsh {
    fn run_command(&self, location: &str, line: &str) -> Result<CommandOutput, Error> {
        let mut command = self.ssh_command(location, line);
        log::trace!("{}", describe(&command));
        let output = command.stdin(Stdio::null()).output()?;
        Ok(CommandOutput {
            stdout: output.stdout,
            stderr: output.stderr,
            status: output.status.code(),
        })
    }

    fn copy_to(
        &self,
        local: &Path,
        location: &str,
        remote: &str,
        recursive: bool,
    ) -> Result<(), Error> {
        let src = local.to_string_lossy();
        let dst = format!("{}:{}", location, remote);
        self.scp(self.scp_command(recursive, &src, &dst))
    }

    fn copy_from(
        &self,
        location: &str,
        remote: &str,
        local: &Path,
        recursive: bool,
    ) -> Result<(), Error> {
        let src = format!("{}:{}", location, remote);
        let dst = local.to_string_lossy();
        self.scp(self.scp_command(recursive, &src, &dst))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(command: &Command) -> Vec<String> {
        command
            .get_args()
            .map(|a| a.to_string_lossy().to_string())
            .collect()
    }

    #[test]
    fn quote_plain_and_embedded_quotes() {
        assert_eq!(quote("/tmp/a b"), "'/tmp/a b'");
        assert_eq!(quote("it's"), r"'it'\''s'");
        assert_eq!(quote(""), "''");
    }

    #[test]
    fn ssh_command_is_non_interactive() {
        let ssh = OpenSsh::default();
        let command = ssh.ssh_command("deploy@build01", "ls -1A '/tmp'");
        assert_eq!(command.get_program(), "ssh");
        assert_eq!(
            args(&command),
            vec![
                "-o",
                "PasswordAuthentication=no",
                "-o",
                "StrictHostKeyChecking=no",
                "deploy@build01",
                "ls -1A '/tmp'",
            ]
        );
    }

    #[test]
    fn scp_command_is_batch_mode() {
        let ssh = OpenSsh {
            options: vec![],
            ..OpenSsh::default()
        };
        let command = ssh.scp_command(true, "/local/dir", "host:/remote/dir");
        assert_eq!(command.get_program(), "scp");
        assert_eq!(args(&command), vec!["-B", "-r", "/local/dir", "host:/remote/dir"]);

        let command = ssh.scp_command(false, "host:/f", "/tmp/f");
        assert_eq!(args(&command), vec!["-B", "host:/f", "/tmp/f"]);
    }

    #[test]
    fn failed_output_maps_to_backend_failure() {
        let output = CommandOutput {
            stdout: vec![],
            stderr: b"Permission denied\n".to_vec(),
            status: Some(255),
        };
        match output.check("ssh") {
            Err(Error::BackendCommandFailure {
                command,
                status,
                message,
            }) => {
                assert_eq!(command, "ssh");
                assert_eq!(status, Some(255));
                assert_eq!(message, "Permission denied");
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn missing_program_is_io_error() {
        let ssh = OpenSsh {
            ssh_program: "/nonexistent/ssh-binary".to_string(),
            ..OpenSsh::default()
        };
        assert!(matches!(
            ssh.run_command("localhost", "true"),
            Err(Error::Io(_))
        ));
    }

    #[test]
    fn config_defaults_fill_missing_fields() {
        let ssh: OpenSsh = serde_json::from_str(r#"{"ssh_program": "/opt/bin/ssh"}"#).unwrap();
        assert_eq!(ssh.ssh_program, "/opt/bin/ssh");
        assert_eq!(ssh.scp_program, "scp");
        assert_eq!(ssh.options, OpenSsh::default().options);
    }
}
