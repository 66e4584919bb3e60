//! Pushing the agent's support scripts to a freshly reset board.
//!
//! Assets live in a local directory:
//!
//! ```text
//! <assets>/board-info.lua   ->  /_info.lua
//! <assets>/lib/*.lua        ->  /lib/lua/<name>
//! ```

use crate::error::AgentResult;
use crate::event::{EventBus, Notification};
use crate::protocol::BoardChannel;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Board directories the support library lives in, parents first.
const LIBRARY_DIRS: [&str; 2] = ["/lib", "/lib/lua"];

/// Board path the introspection script is stored at.
pub const INFO_SCRIPT: &str = "/_info.lua";

/// What provisioning changed on the board.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProvisionReport {
    /// Directories that had to be created.
    pub created_dirs: Vec<String>,
    /// Board paths of the files pushed, in order.
    pub pushed: Vec<String>,
}

fn directory_check(dir: &str) -> String {
    format!(
        "do local att = io.attributes(\"{dir}\"); print(att ~= nil and att.type == \"directory\"); end"
    )
}

/// Library scripts found under `<assets>/lib`, sorted by name.
async fn library_scripts(assets_dir: &Path) -> Vec<PathBuf> {
    let lib_dir = assets_dir.join("lib");
    let mut entries = match tokio::fs::read_dir(&lib_dir).await {
        Ok(entries) => entries,
        Err(err) => {
            warn!(dir = %lib_dir.display(), error = %err, "no library scripts");
            return Vec::new();
        }
    };

    let mut scripts = Vec::new();
    while let Ok(Some(entry)) = entries.next_entry().await {
        let path = entry.path();
        if path.extension().is_some_and(|ext| ext == "lua") {
            scripts.push(path);
        }
    }
    scripts.sort();
    scripts
}

/// Create the library directories and push the support scripts.
///
/// Missing local assets are skipped with a warning; board side failures are
/// returned.
pub async fn provision(
    channel: &mut BoardChannel<'_>,
    assets_dir: &Path,
    bus: &EventBus,
) -> AgentResult<ProvisionReport> {
    bus.publish(Notification::update("Uploading framework"));
    let mut report = ProvisionReport::default();

    for dir in LIBRARY_DIRS {
        let exists = channel.send_command(&directory_check(dir)).await?;
        if exists == "true" {
            debug!(dir, "directory present");
        } else {
            info!(dir, "creating directory");
            channel.send_command(&format!("os.mkdir(\"{dir}\")")).await?;
            report.created_dirs.push(dir.to_string());
        }
    }

    let info_script = assets_dir.join("board-info.lua");
    match tokio::fs::read(&info_script).await {
        Ok(script) => {
            channel.write_file(INFO_SCRIPT, &script).await?;
            report.pushed.push(INFO_SCRIPT.to_string());
        }
        Err(err) => warn!(file = %info_script.display(), error = %err, "skipping info script"),
    }

    for script in library_scripts(assets_dir).await {
        let Some(name) = script.file_name().and_then(|name| name.to_str()) else {
            continue;
        };
        let target = format!("/lib/lua/{name}");
        let data = match tokio::fs::read(&script).await {
            Ok(data) => data,
            Err(err) => {
                warn!(file = %script.display(), error = %err, "skipping library script");
                continue;
            }
        };
        info!(target = %target, "sending library script");
        channel.write_file(&target, &data).await?;
        channel.drain().await;
        report.pushed.push(target);
    }

    Ok(report)
}
