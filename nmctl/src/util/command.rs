//! Invocation of the NetworkManager command-line tool.
//!
//! VPN import and route-metric changes go through `nmcli`. The
//! [`CommandRunner`] trait keeps the process boundary replaceable.

use async_trait::async_trait;
use log::debug;

use crate::Result;
use crate::api::models::ConnectionError;

/// Captured result of one command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// Combined stdout and stderr, the way `nmcli` reports most failures.
    pub fn combined(&self) -> String {
        let mut out = self.stdout.trim().to_string();
        let err = self.stderr.trim();
        if !err.is_empty() {
            if !out.is_empty() {
                out.push('\n');
            }
            out.push_str(err);
        }
        out
    }
}

/// Runs external programs.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Runs `program` with `args`. An `Err` means the process could not be
    /// started; a non-zero exit is reported through [`CommandOutput::success`].
    async fn run(&self, program: &str, args: &[String]) -> Result<CommandOutput>;
}

/// Runs commands with `tokio::process`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemCommandRunner;

#[async_trait]
impl CommandRunner for SystemCommandRunner {
    async fn run(&self, program: &str, args: &[String]) -> Result<CommandOutput> {
        debug!("Running {program} {}", args.join(" "));
        let output = tokio::process::Command::new(program)
            .args(args)
            .output()
            .await
            .map_err(|e| ConnectionError::Command(format!("{program}: {e}")))?;

        Ok(CommandOutput {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}
