//! Command execution collaborator
//!
//! Everything winemason does to a prefix goes through an external process
//! (wine, winetricks, winecfg, chown). The `ShellRunner` trait is the seam
//! that lets the registry, cache and machine logic run against a fake in
//! tests instead of a live system.

use crate::error::{Result, WinemasonError};
use std::process::Command;
use tracing::{debug, info};

/// Options for a single command invocation
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Run the command through `sh -c` (needed for env-var prefixes and pipes)
    pub shell: bool,

    /// Run as another user via `sudo -u`
    pub run_as_user: Option<String>,

    /// Run with privilege elevation
    pub use_sudo: bool,

    /// Log at debug instead of info
    pub quiet: bool,

    /// Return the output even when the exit code is non-zero
    pub suppress_failure: bool,
}

impl RunOptions {
    pub fn shell() -> Self {
        Self {
            shell: true,
            ..Self::default()
        }
    }

    pub fn as_user(mut self, username: &str) -> Self {
        self.run_as_user = Some(username.to_string());
        self
    }

    pub fn sudo(mut self) -> Self {
        self.use_sudo = true;
        self
    }

    pub fn quiet(mut self) -> Self {
        self.quiet = true;
        self
    }

    pub fn suppress_failure(mut self) -> Self {
        self.suppress_failure = true;
        self
    }
}

/// Captured result of a finished command
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

/// Command execution seam
pub trait ShellRunner {
    fn run(&self, command: &str, options: &RunOptions) -> Result<CommandOutput>;
}

/// Runs commands against the live system
#[derive(Debug, Default)]
pub struct SystemShell;

impl SystemShell {
    pub fn new() -> Self {
        Self
    }

    fn build_command(command: &str, options: &RunOptions) -> Command {
        let elevate = options.use_sudo || options.run_as_user.is_some();

        let mut cmd = if elevate {
            let mut cmd = Command::new("sudo");
            if let Some(ref user) = options.run_as_user {
                cmd.arg("-u").arg(user);
            }
            cmd.arg("--");
            if options.shell {
                cmd.arg("sh").arg("-c").arg(command);
            } else {
                for part in command.split_whitespace() {
                    cmd.arg(part);
                }
            }
            cmd
        } else if options.shell {
            let mut cmd = Command::new("sh");
            cmd.arg("-c").arg(command);
            cmd
        } else {
            let mut parts = command.split_whitespace();
            let program = parts.next().unwrap_or(command);
            let mut cmd = Command::new(program);
            cmd.args(parts);
            cmd
        };

        // keep wine's own channel spam out of captured stderr
        cmd.env("WINEDEBUG", "-all");
        cmd
    }
}

impl ShellRunner for SystemShell {
    fn run(&self, command: &str, options: &RunOptions) -> Result<CommandOutput> {
        if options.quiet {
            debug!("running: {}", command);
        } else {
            info!("running: {}", command);
        }

        let output = Self::build_command(command, options).output().map_err(|e| {
            WinemasonError::CommandExecution {
                command: command.to_string(),
                error: e.to_string(),
            }
        })?;

        let result = CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            exit_code: output.status.code().unwrap_or(-1),
        };

        if result.exit_code != 0 && !options.suppress_failure {
            return Err(WinemasonError::CommandExecution {
                command: command.to_string(),
                error: format!(
                    "exit code {}: {}",
                    result.exit_code,
                    result.stderr.trim()
                ),
            });
        }

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shell_command_captures_stdout() {
        let shell = SystemShell::new();
        let out = shell
            .run("printf hello", &RunOptions::shell().quiet())
            .unwrap();
        assert_eq!(out.stdout, "hello");
        assert_eq!(out.exit_code, 0);
    }

    #[test]
    fn failing_command_maps_to_error() {
        let shell = SystemShell::new();
        let err = shell.run("false", &RunOptions::shell().quiet()).unwrap_err();
        assert!(matches!(err, WinemasonError::CommandExecution { .. }));
    }

    #[test]
    fn suppress_failure_returns_exit_code() {
        let shell = SystemShell::new();
        let out = shell
            .run("false", &RunOptions::shell().quiet().suppress_failure())
            .unwrap();
        assert_ne!(out.exit_code, 0);
    }
}
