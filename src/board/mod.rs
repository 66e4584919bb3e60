//! Board session: one attached board and everything needed to talk to it.
//!
//! A session owns the link writer, the byte queue and the inspector thread.
//! Protocol operations borrow the session mutably through
//! [`BoardSession::channel`], so two operations can never share the link.

pub mod info;
pub mod listing;
pub mod provision;

pub use info::{normalize, BoardInfo, INFO_COMMAND};
pub use listing::{parse_listing, DirectoryEntry};
pub use provision::{provision, ProvisionReport};

use crate::error::{AgentError, AgentResult};
use crate::event::{EventBus, Notification, NotificationKind};
use crate::inspector::{InspectorHandle, InspectorMode};
use crate::port::{PortConfiguration, PortOpener, SerialPortAdapter};
use crate::protocol::{byte_queue, BoardChannel, ByteQueue, ChannelSettings, DEFAULT_QUEUE_CAPACITY};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Autorun script rewritten by [`BoardSession::run_program`].
pub const AUTORUN_PATH: &str = "/autorun.lua";

/// Everything a session needs besides the link itself.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub port: PortConfiguration,
    pub channel: ChannelSettings,
    pub queue_capacity: usize,
    /// How long RTS is held for a reset.
    pub reset_pulse: Duration,
    /// Limit for the board to reach its prompt after a reset.
    pub boot_timeout: Duration,
    /// Local directory holding the support scripts.
    pub assets_dir: PathBuf,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            port: PortConfiguration::default(),
            channel: ChannelSettings::default(),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            reset_pulse: Duration::from_millis(10),
            boot_timeout: Duration::from_secs(15),
            assets_dir: PathBuf::from("./boards/lua"),
        }
    }
}

/// An attached board.
#[derive(Debug)]
pub struct BoardSession {
    port: Box<dyn SerialPortAdapter>,
    queue: ByteQueue,
    inspector: InspectorHandle,
    bus: EventBus,
    settings: SessionSettings,
    info: Option<BoardInfo>,
    raw_info: String,
    new_firmware_available: bool,
}

impl BoardSession {
    /// Open `port_name` through `opener` and attach to the board behind it.
    pub async fn open(
        opener: &dyn PortOpener,
        port_name: &str,
        settings: SessionSettings,
        bus: EventBus,
    ) -> AgentResult<Self> {
        let port = opener.open(port_name, &settings.port).map_err(|source| {
            AgentError::PortUnavailable {
                port: port_name.to_string(),
                source,
            }
        })?;
        Self::attach(port, settings, bus).await
    }

    /// Attach to a board over an already open link.
    ///
    /// Starts the inspector, resets the board, provisions the support
    /// scripts and reads the board description. The link is closed again if
    /// any of that fails.
    pub async fn attach(
        mut port: Box<dyn SerialPortAdapter>,
        settings: SessionSettings,
        bus: EventBus,
    ) -> AgentResult<Self> {
        if settings.queue_capacity == 0 {
            return Err(AgentError::InvalidQueueCapacity);
        }
        let reader = port.reader().map_err(|source| AgentError::PortUnavailable {
            port: port.name().to_string(),
            source,
        })?;
        let (feeder, queue) = byte_queue(settings.queue_capacity);
        let inspector = InspectorHandle::spawn(reader, feeder, bus.clone())?;

        let mut session = Self {
            port,
            queue,
            inspector,
            bus,
            settings,
            info: None,
            raw_info: String::new(),
            new_firmware_available: false,
        };

        if let Err(err) = session.reset(true).await {
            warn!(port = session.port_name(), error = %err, "attach failed");
            session.detach().await;
            return Err(err);
        }

        info!(port = session.port_name(), build = %session.build(), "board attached");
        session
            .bus
            .publish(Notification::new(NotificationKind::BoardAttached));
        Ok(session)
    }

    /// Exclusive protocol access to the board.
    pub fn channel(&mut self) -> BoardChannel<'_> {
        BoardChannel::new(self.port.as_mut(), &mut self.queue, self.settings.channel)
    }

    /// Discard console output no operation is waiting for, so the inspector
    /// never blocks on a full queue while the session is idle.
    pub async fn consume(&mut self) -> usize {
        self.queue.drain(Duration::ZERO).await
    }

    /// Hard-reset the board and wait for its prompt, optionally pushing the
    /// support scripts, then refresh the board description.
    pub async fn reset(&mut self, provision_assets: bool) -> AgentResult<()> {
        let pulse = self.settings.reset_pulse;
        let timeout = self.settings.boot_timeout;
        self.channel().reset_board(pulse, timeout).await?;

        if provision_assets {
            let bus = self.bus.clone();
            let assets_dir = self.settings.assets_dir.clone();
            let report = provision(&mut self.channel(), &assets_dir, &bus).await?;
            debug!(?report, "provisioned");
        }

        self.new_firmware_available = false;
        self.refresh_info().await
    }

    /// Ask the board to describe itself.
    ///
    /// An unparseable description is kept as raw text only.
    pub async fn refresh_info(&mut self) -> AgentResult<()> {
        let raw = normalize(&self.channel().send_command(INFO_COMMAND).await?);
        self.info = match BoardInfo::parse(&raw) {
            Ok(info) => Some(info),
            Err(err) => {
                warn!(error = %err, raw = %raw, "unparseable board info");
                None
            }
        };
        debug!(info = %raw, "board info");
        self.raw_info = raw;
        Ok(())
    }

    /// Close the link and stop the inspector.
    pub async fn detach(mut self) {
        let dropped = self.queue.drain(self.settings.channel.settle).await;
        debug!(dropped, "draining before detach");

        let Self {
            port,
            queue,
            inspector,
            ..
        } = self;
        let name = port.name().to_string();
        drop(queue);
        drop(port);
        inspector.shutdown().await;
        info!(port = %name, "board detached");
    }

    /// Store `code` at `path`, make it the autorun target and start it.
    ///
    /// The board is reset first with boot notifications muted, so the IDE
    /// does not see the reset it asked for.
    pub async fn run_program(&mut self, path: &str, code: &[u8]) -> AgentResult<()> {
        info!(path, len = code.len(), "run program");
        self.inspector.set_boot_notifications(false);
        let reset = self.reset(false).await;
        self.inspector.set_boot_notifications(true);
        reset?;

        let autorun = format!("dofile(\"{path}\")\r\n");
        let mut channel = self.channel();
        channel.write_file(AUTORUN_PATH, autorun.as_bytes()).await?;
        channel.write_file(path, code).await?;
        channel.launch(path).await
    }

    /// Execute `code` without storing it.
    pub async fn run_code(&mut self, code: &[u8]) -> AgentResult<()> {
        self.channel().run_code(code).await
    }

    pub async fn read_file(&mut self, path: &str) -> AgentResult<Vec<u8>> {
        self.channel().read_file(path).await
    }

    pub async fn write_file(&mut self, path: &str, data: &[u8]) -> AgentResult<()> {
        self.channel().write_file(path, data).await
    }

    /// List the board directory at `path`.
    pub async fn list_directory(&mut self, path: &str) -> AgentResult<Vec<DirectoryEntry>> {
        let output = self.channel().send_command(&listing::list_command(path)).await?;
        Ok(parse_listing(&output))
    }

    /// Run a console command and return its output.
    pub async fn run_command(&mut self, command: &str) -> AgentResult<String> {
        let mut channel = self.channel();
        let output = channel.send_command(command).await?;
        channel.drain().await;
        Ok(output)
    }

    /// Pause or resume the inspector.
    pub fn suspend_inspector(&self, suspended: bool) {
        self.inspector.suspend(suspended);
    }

    pub fn inspector_mode(&self) -> InspectorMode {
        self.inspector.mode()
    }

    /// Whether the link is still being read.
    pub fn is_alive(&self) -> bool {
        self.inspector.is_running()
    }

    pub fn port_name(&self) -> &str {
        self.port.name()
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    pub fn info(&self) -> Option<&BoardInfo> {
        self.info.as_ref()
    }

    /// The board description as printed, after normalization.
    pub fn raw_info(&self) -> &str {
        &self.raw_info
    }

    /// Build identifier, empty when unknown.
    pub fn build(&self) -> &str {
        self.info.as_ref().map_or("", |info| info.build.as_str())
    }

    pub fn new_firmware_available(&self) -> bool {
        self.new_firmware_available
    }

    pub fn set_new_firmware_available(&mut self, available: bool) {
        self.new_firmware_available = available;
    }
}
