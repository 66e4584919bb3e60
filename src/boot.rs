//! Reset and boot sequencing.
//!
//! A hard reset is forced by pulsing RTS. The sequencer then follows the
//! console through the ROM banner and the Lua RTOS banner, interrupts the
//! boot scripts with Ctrl-D and waits for the board to confirm they were
//! skipped, which leaves it sitting at the prompt.

use crate::error::{AgentError, AgentResult};
use crate::port::ControlLines;
use crate::protocol::BoardChannel;
use once_cell::sync::Lazy;
use regex::Regex;
use std::time::Duration;
use tracing::{debug, info, trace};

/// Ctrl-D, aborts the boot scripts.
pub const INTERRUPT: u8 = 0x04;

static POWER_ON_BANNER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^rst:.*\(POWERON_RESET\),boot:.*(.*)$").expect("valid power-on banner regex")
});

static RUNTIME_BANNER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Booting Lua RTOS...").expect("valid runtime banner regex"));

static SCRIPTS_ABORTED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^Lua RTOS-boot-scripts-aborted-ESP32$").expect("valid abort marker regex")
});

/// Where the board is in its boot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootStage {
    Resetting,
    AwaitPowerOnBanner,
    AwaitRuntimeBanner,
    SendInterrupt,
    AwaitBootScriptsAborted,
    Ready,
}

/// What the caller must do after feeding a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootAction {
    /// Keep reading lines.
    Wait,
    /// Write [`INTERRUPT`], then call [`BootSequencer::interrupt_sent`].
    SendInterrupt,
    /// The board is at its prompt.
    Ready,
}

/// Boot state machine, fed one console line at a time.
#[derive(Debug, Clone)]
pub struct BootSequencer {
    stage: BootStage,
}

impl Default for BootSequencer {
    fn default() -> Self {
        Self::new()
    }
}

impl BootSequencer {
    pub fn new() -> Self {
        Self {
            stage: BootStage::Resetting,
        }
    }

    pub fn stage(&self) -> BootStage {
        self.stage
    }

    /// The reset pulse was sent; start watching for the ROM banner.
    pub fn reset_done(&mut self) {
        self.stage = BootStage::AwaitPowerOnBanner;
    }

    /// The interrupt byte was written.
    pub fn interrupt_sent(&mut self) {
        if self.stage == BootStage::SendInterrupt {
            self.stage = BootStage::AwaitBootScriptsAborted;
        }
    }

    /// Advance on one console line.
    pub fn on_line(&mut self, line: &str) -> BootAction {
        match self.stage {
            BootStage::Resetting => BootAction::Wait,
            BootStage::AwaitPowerOnBanner => {
                if POWER_ON_BANNER.is_match(line) {
                    debug!("power-on banner");
                    self.stage = BootStage::AwaitRuntimeBanner;
                }
                BootAction::Wait
            }
            BootStage::AwaitRuntimeBanner => {
                if RUNTIME_BANNER.is_match(line) {
                    debug!("runtime banner");
                    self.stage = BootStage::SendInterrupt;
                    BootAction::SendInterrupt
                } else {
                    BootAction::Wait
                }
            }
            BootStage::SendInterrupt => BootAction::SendInterrupt,
            BootStage::AwaitBootScriptsAborted => {
                if SCRIPTS_ABORTED.is_match(line) {
                    self.stage = BootStage::Ready;
                    BootAction::Ready
                } else {
                    BootAction::Wait
                }
            }
            BootStage::Ready => BootAction::Ready,
        }
    }
}

impl BoardChannel<'_> {
    /// Hard-reset the board and wait until it sits at the prompt.
    ///
    /// Fails with [`AgentError::SequenceTimeout`] when the board is not ready
    /// within `timeout` of the reset pulse.
    pub async fn reset_board(&mut self, pulse: Duration, timeout: Duration) -> AgentResult<()> {
        self.drain().await;

        let mut sequencer = BootSequencer::new();
        debug!(?pulse, "pulsing reset line");
        self.set_control_lines(ControlLines::IDLE)?;
        tokio::time::sleep(pulse).await;
        self.set_control_lines(ControlLines::RESET)?;
        tokio::time::sleep(pulse).await;
        self.set_control_lines(ControlLines::IDLE)?;
        sequencer.reset_done();

        tokio::time::timeout(timeout, self.follow_boot(&mut sequencer))
            .await
            .map_err(|_| AgentError::SequenceTimeout(timeout))??;

        self.drain().await;
        info!("board is ready");
        Ok(())
    }

    async fn follow_boot(&mut self, sequencer: &mut BootSequencer) -> AgentResult<()> {
        loop {
            let line = self.read_line().await?;
            trace!(stage = ?sequencer.stage(), %line, "boot line");
            match sequencer.on_line(&line) {
                BootAction::Wait => {}
                BootAction::SendInterrupt => {
                    self.write(&[INTERRUPT])?;
                    sequencer.interrupt_sent();
                }
                BootAction::Ready => return Ok(()),
            }
        }
    }
}
