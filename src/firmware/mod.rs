//! Firmware update check and upgrade.
//!
//! The upgrade runs in two phases. [`FirmwareUpgrader::fetch`] downloads and
//! unpacks the archive while the board stays attached.
//! [`FirmwareUpgrader::flash`] then suspends the inspector, detaches the
//! session to free the port and hands the board to the external flashing
//! tool. Re-attaching afterwards is up to the caller.

pub mod archive;
pub mod error;
pub mod flasher;

pub use error::{FirmwareError, FirmwareResult};
pub use flasher::FlasherCommand;

use crate::board::BoardSession;
use crate::config::FirmwareConfig;
use crate::error::AgentResult;
use crate::event::{EventBus, Notification};
use std::path::PathBuf;
use tracing::info;

const ARCHIVE_NAME: &str = "firmware.zip";
const FILES_DIR: &str = "firmware_files";

/// Downloads firmware and drives the flashing tool.
#[derive(Debug, Clone)]
pub struct FirmwareUpgrader {
    config: FirmwareConfig,
    client: reqwest::Client,
    bus: EventBus,
}

impl FirmwareUpgrader {
    pub fn new(config: FirmwareConfig, bus: EventBus) -> FirmwareResult<Self> {
        let builder = match &config.http_proxy {
            Some(proxy) => reqwest::Client::builder().proxy(reqwest::Proxy::all(proxy)?),
            None => reqwest::Client::builder().no_proxy(),
        };
        Ok(Self {
            config,
            client: builder.build()?,
            bus,
        })
    }

    pub fn config(&self) -> &FirmwareConfig {
        &self.config
    }

    async fn get(&self, url: &str) -> FirmwareResult<reqwest::Response> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FirmwareError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(response)
    }

    /// Latest published build identifier.
    pub async fn latest_build(&self) -> FirmwareResult<String> {
        let body = self.get(&self.config.last_build_url()).await?.text().await?;
        Ok(body.trim().to_string())
    }

    /// Compare the board's build with the latest published one and record
    /// the result on the session.
    ///
    /// A board whose description could not be parsed is never reported as
    /// outdated.
    pub async fn check_for_update(&self, session: &mut BoardSession) -> AgentResult<bool> {
        let latest = self.latest_build().await?;
        let outdated = session
            .info()
            .is_some_and(|info| info.is_outdated(&latest));
        if outdated {
            info!(current = session.build(), latest = %latest, "new firmware available");
        }
        session.set_new_firmware_available(outdated);
        Ok(outdated)
    }

    /// Download and unpack the firmware, returning the unpacked directory.
    pub async fn fetch(&self) -> AgentResult<PathBuf> {
        let work_dir = self.config.resolved_work_dir();
        tokio::fs::create_dir_all(&work_dir).await?;

        self.bus.publish(Notification::update("Downloading firmware"));
        let url = self.config.firmware_url();
        info!(url = %url, "downloading firmware");
        let body = self.get(&url).await?.bytes().await.map_err(FirmwareError::from)?;
        let archive_path = work_dir.join(ARCHIVE_NAME);
        tokio::fs::write(&archive_path, &body).await?;

        self.bus.publish(Notification::update("Unpacking firmware"));
        let files_dir = work_dir.join(FILES_DIR);
        let target = files_dir.clone();
        let files = tokio::task::spawn_blocking(move || archive::extract(&archive_path, &target))
            .await
            .map_err(|err| FirmwareError::Io(std::io::Error::other(err)))??;
        info!(files = files.len(), dir = %files_dir.display(), "firmware unpacked");
        Ok(files_dir)
    }

    /// Release the board and flash the unpacked firmware onto it.
    ///
    /// Returns the port name so the caller can attach again.
    pub async fn flash(&self, session: BoardSession, files_dir: &std::path::Path) -> AgentResult<String> {
        let port = session.port_name().to_string();
        session.suspend_inspector(true);
        session.detach().await;

        self.bus.publish(Notification::update("Flashing firmware"));
        let command = FlasherCommand::from_template(
            &self.config.flasher_program,
            &self.config.flasher_args,
            &port,
            files_dir,
            &self.config.board,
        );
        command.run().await?;

        self.bus.publish(Notification::update("Firmware upgraded"));
        info!(port = %port, "firmware upgraded");
        Ok(port)
    }
}
