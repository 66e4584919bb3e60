//! Service layer for board operations.
//!
//! Front ends (the CLI today) talk to the board through a [`BoardService`]:
//! it holds the configuration, the event bus and at most one attached
//! [`BoardSession`], and turns "no board" into a typed error.
//!
//! # Architecture
//!
//! ```text
//! CLI ──> BoardService ──> BoardSession ──> BoardChannel ──> link
//!              │                 │
//!              └── EventBus <────┘ (inspector)
//! ```

use crate::board::{BoardInfo, BoardSession, DirectoryEntry, SessionSettings};
use crate::config::Config;
use crate::error::{AgentError, AgentResult};
use crate::event::{EventBus, Notification};
use crate::firmware::FirmwareUpgrader;
use crate::port::{PortOpener, SerialPortAdapter, SystemPorts};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{info, warn};

/// Owner of the single active board session.
#[derive(Debug)]
pub struct BoardService {
    config: Config,
    bus: EventBus,
    opener: Arc<dyn PortOpener>,
    session: Option<BoardSession>,
}

impl BoardService {
    pub fn new(config: Config) -> Self {
        Self::with_bus(config, EventBus::new())
    }

    /// Create a service publishing on an existing bus.
    pub fn with_bus(config: Config, bus: EventBus) -> Self {
        Self::with_opener(config, bus, Arc::new(SystemPorts))
    }

    /// Create a service that opens ports by name through `opener`.
    pub fn with_opener(config: Config, bus: EventBus, opener: Arc<dyn PortOpener>) -> Self {
        Self {
            config,
            bus,
            opener,
            session: None,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Subscribe to board notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.bus.subscribe()
    }

    fn settings(&self) -> AgentResult<SessionSettings> {
        Ok(self.config.session_settings()?)
    }

    /// Attach to the board on `port`, detaching any current board first.
    ///
    /// `port` may be an alias from `[serial.port_aliases]`.
    pub async fn attach(&mut self, port: &str) -> AgentResult<&mut BoardSession> {
        self.detach().await;
        let port = self.config.serial.resolve_port(port);
        info!(port = %port, "attaching");
        let session =
            BoardSession::open(self.opener.as_ref(), &port, self.settings()?, self.bus.clone())
                .await?;
        Ok(self.session.insert(session))
    }

    /// Attach over an already open link.
    pub async fn attach_link(
        &mut self,
        link: Box<dyn SerialPortAdapter>,
    ) -> AgentResult<&mut BoardSession> {
        self.detach().await;
        let session = BoardSession::attach(link, self.settings()?, self.bus.clone()).await?;
        Ok(self.session.insert(session))
    }

    /// Detach the current board, if any.
    pub async fn detach(&mut self) {
        if let Some(session) = self.session.take() {
            session.detach().await;
        }
    }

    pub fn is_attached(&self) -> bool {
        self.session.is_some()
    }

    pub fn session(&self) -> AgentResult<&BoardSession> {
        self.session.as_ref().ok_or(AgentError::NotAttached)
    }

    pub fn session_mut(&mut self) -> AgentResult<&mut BoardSession> {
        self.session.as_mut().ok_or(AgentError::NotAttached)
    }

    /// Forget a session whose link was lost.
    ///
    /// Returns `true` when a dead session was dropped.
    pub async fn reap(&mut self) -> bool {
        if self.session.as_ref().is_some_and(|s| !s.is_alive()) {
            info!("dropping session with lost link");
            self.detach().await;
            return true;
        }
        false
    }

    /// Drop the session when `result` says its link is gone.
    async fn reap_on_failure<T>(&mut self, result: AgentResult<T>) -> AgentResult<T> {
        if let Err(err) = &result {
            if err.is_fatal() {
                warn!(error = %err, "link failed, detaching");
                self.detach().await;
            }
        }
        result
    }

    pub async fn run_program(&mut self, path: &str, code: &[u8]) -> AgentResult<()> {
        let result = self.session_mut()?.run_program(path, code).await;
        self.reap_on_failure(result).await
    }

    pub async fn run_code(&mut self, code: &[u8]) -> AgentResult<()> {
        let result = self.session_mut()?.run_code(code).await;
        self.reap_on_failure(result).await
    }

    pub async fn read_file(&mut self, path: &str) -> AgentResult<Vec<u8>> {
        let result = self.session_mut()?.read_file(path).await;
        self.reap_on_failure(result).await
    }

    pub async fn write_file(&mut self, path: &str, data: &[u8]) -> AgentResult<()> {
        let result = self.session_mut()?.write_file(path, data).await;
        self.reap_on_failure(result).await
    }

    pub async fn list_directory(&mut self, path: &str) -> AgentResult<Vec<DirectoryEntry>> {
        let result = self.session_mut()?.list_directory(path).await;
        self.reap_on_failure(result).await
    }

    pub async fn run_command(&mut self, command: &str) -> AgentResult<String> {
        let result = self.session_mut()?.run_command(command).await;
        self.reap_on_failure(result).await
    }

    /// Discard console output nobody asked for. Front ends that only watch
    /// notifications call this periodically.
    pub async fn consume(&mut self) -> AgentResult<usize> {
        Ok(self.session_mut()?.consume().await)
    }

    /// Board description from the last reset.
    pub fn info(&self) -> AgentResult<Option<&BoardInfo>> {
        Ok(self.session()?.info())
    }

    fn upgrader(&self) -> AgentResult<FirmwareUpgrader> {
        Ok(FirmwareUpgrader::new(
            self.config.firmware.clone(),
            self.bus.clone(),
        )?)
    }

    /// Ask the firmware server whether the attached board is outdated.
    pub async fn check_for_update(&mut self) -> AgentResult<bool> {
        let upgrader = self.upgrader()?;
        upgrader.check_for_update(self.session_mut()?).await
    }

    /// Download, flash and re-attach.
    pub async fn upgrade_firmware(&mut self) -> AgentResult<()> {
        let upgrader = self.upgrader()?;
        self.session()?;
        let files = upgrader.fetch().await?;

        let session = self.session.take().ok_or(AgentError::NotAttached)?;
        let port = upgrader.flash(session, &files).await?;
        self.attach(&port).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_operations_need_a_board() {
        let mut service = BoardService::new(Config::default());

        assert!(!service.is_attached());
        assert!(matches!(
            service.run_command("print(1)").await,
            Err(AgentError::NotAttached)
        ));
        assert!(matches!(service.info(), Err(AgentError::NotAttached)));
        assert!(matches!(
            service.upgrade_firmware().await,
            Err(AgentError::NotAttached)
        ));
        assert!(!service.reap().await);
    }

    #[tokio::test]
    async fn test_invalid_config_fails_attach() {
        let mut config = Config::default();
        config.board.chunk_size = 0;
        let mut service = BoardService::new(config);

        let err = service
            .attach_link(Box::new(crate::port::MockSerialPort::new("MOCK0")))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("board.chunk_size"));
    }
}
