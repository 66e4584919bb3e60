//! External flashing tool invocation.

use super::error::{FirmwareError, FirmwareResult};
use std::path::Path;
use tokio::process::Command;
use tracing::{info, warn};

/// A fully expanded flasher command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlasherCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl FlasherCommand {
    /// Expand `{port}`, `{dir}` and `{board}` in each template argument.
    pub fn from_template(
        program: &str,
        template: &[String],
        port: &str,
        dir: &Path,
        board: &str,
    ) -> Self {
        let dir = dir.display().to_string();
        let args = template
            .iter()
            .map(|arg| {
                arg.replace("{port}", port)
                    .replace("{dir}", &dir)
                    .replace("{board}", board)
            })
            .collect();
        Self {
            program: program.to_string(),
            args,
        }
    }

    /// Run the tool to completion, echoing its output to the log.
    pub async fn run(&self) -> FirmwareResult<()> {
        info!(program = %self.program, args = ?self.args, "running flasher");
        let output = Command::new(&self.program)
            .args(&self.args)
            .output()
            .await
            .map_err(|err| self.failure(err.to_string()))?;

        for line in String::from_utf8_lossy(&output.stdout).lines() {
            info!(target: "flasher", "{line}");
        }
        for line in String::from_utf8_lossy(&output.stderr).lines() {
            warn!(target: "flasher", "{line}");
        }

        if output.status.success() {
            Ok(())
        } else {
            Err(self.failure(output.status.to_string()))
        }
    }

    fn failure(&self, message: String) -> FirmwareError {
        FirmwareError::Flasher {
            program: self.program.clone(),
            message,
        }
    }
}
