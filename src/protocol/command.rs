//! Command/response exchange with the Lua console.
//!
//! A command is written with a CRLF terminator; the board echoes it, prints
//! its output and finishes with a prompt such as `/ > `.

use super::BoardChannel;
use crate::error::AgentResult;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

static PROMPT: Lazy<Regex> = Lazy::new(|| Regex::new(r"^/.*>.*$").expect("valid prompt regex"));

/// Whether `line` is the console prompt (a path followed by `>`).
pub fn is_prompt(line: &str) -> bool {
    PROMPT.is_match(line)
}

impl BoardChannel<'_> {
    /// Run a console command and collect its output.
    ///
    /// Output lines are joined with CRLF; the prompt line is not included.
    /// Fails with a desync error, without reading further, when the echo does
    /// not match the command.
    pub async fn send_command(&mut self, command: &str) -> AgentResult<String> {
        debug!(command, "send command");
        self.write(format!("{command}\r\n").as_bytes())?;
        self.expect_echo(command).await?;

        let mut lines = Vec::new();
        loop {
            let line = self.read_line().await?;
            if is_prompt(&line) {
                break;
            }
            lines.push(line);
        }
        Ok(lines.join("\r\n"))
    }

    /// Start the program stored at `path` in block development mode.
    ///
    /// The program keeps running after this returns; its output is left to
    /// the inspector.
    pub async fn launch(&mut self, path: &str) -> AgentResult<()> {
        debug!(path, "launch program");
        let command = format!("require(\"block\");wcBlock.delevepMode=true;dofile(\"{path}\")\r");
        self.write(command.as_bytes())?;
        self.drain().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_detection() {
        assert!(is_prompt("/ > "));
        assert!(is_prompt("/lib/lua >"));
        assert!(!is_prompt("> "));
        assert!(!is_prompt("true"));
        assert!(!is_prompt("/no prompt marker"));
    }
}
