//! Firmware update check, download and flashing against a local HTTP server
//! and a scripted board.

#![cfg(unix)]

#[path = "common/mod.rs"]
mod common;

use common::{next_of_kind, serve_http, zip_archive, SimBoard};
use lua_board_agent::config::FirmwareConfig;
use lua_board_agent::firmware::{FirmwareError, FirmwareUpgrader};
use lua_board_agent::{AgentError, BoardService, Config, EventBus, NotificationKind};
use pretty_assertions::assert_eq;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tokio_test::{assert_err, assert_ok};

fn firmware_config(addr: SocketAddr, work_dir: &Path, program: &str, args: &[&str]) -> FirmwareConfig {
    FirmwareConfig {
        base_url: format!("http://{addr}"),
        work_dir: Some(work_dir.to_path_buf()),
        flasher_program: program.to_string(),
        flasher_args: args.iter().map(|arg| arg.to_string()).collect(),
        ..FirmwareConfig::default()
    }
}

fn routes(entries: &[(&str, Vec<u8>)]) -> HashMap<String, Vec<u8>> {
    entries
        .iter()
        .map(|(path, body)| (path.to_string(), body.clone()))
        .collect()
}

#[tokio::test]
async fn test_check_for_update_compares_builds() {
    let addr = serve_http(routes(&[("/lastbuildv2.php", b"1503412346\n".to_vec())])).await;
    let work = tempfile::tempdir().unwrap();
    let assets = tempfile::tempdir().unwrap();
    let board = SimBoard::new();
    let bus = EventBus::new();
    let mut session = common::attach(&board, assets.path(), bus.clone()).await;

    let upgrader = assert_ok!(FirmwareUpgrader::new(
        firmware_config(addr, work.path(), "true", &[]),
        bus
    ));
    assert_eq!(upgrader.latest_build().await.unwrap(), "1503412346");

    assert!(assert_ok!(upgrader.check_for_update(&mut session).await));
    assert!(session.new_firmware_available());
    session.detach().await;
}

#[tokio::test]
async fn test_current_board_is_not_outdated() {
    let addr = serve_http(routes(&[("/lastbuildv2.php", b"1503412345".to_vec())])).await;
    let work = tempfile::tempdir().unwrap();
    let assets = tempfile::tempdir().unwrap();
    let board = SimBoard::new();
    let mut session = common::attach(&board, assets.path(), EventBus::new()).await;
    session.set_new_firmware_available(true);

    let upgrader = FirmwareUpgrader::new(
        firmware_config(addr, work.path(), "true", &[]),
        EventBus::new(),
    )
    .unwrap();

    assert!(!assert_ok!(upgrader.check_for_update(&mut session).await));
    assert!(!session.new_firmware_available());
    session.detach().await;
}

#[tokio::test]
async fn test_server_error_is_reported() {
    let addr = serve_http(HashMap::new()).await;
    let work = tempfile::tempdir().unwrap();
    let upgrader = FirmwareUpgrader::new(
        firmware_config(addr, work.path(), "true", &[]),
        EventBus::new(),
    )
    .unwrap();

    let err = assert_err!(upgrader.fetch().await);
    assert!(
        matches!(&err, AgentError::Firmware(FirmwareError::HttpStatus { status: 404, url }) if url.ends_with("/firmwarev2.php?board=WHITECAT-ESP32-N1")),
        "unexpected error: {err}"
    );
}

#[tokio::test]
async fn test_fetch_downloads_and_unpacks() {
    let archive = zip_archive(&[
        ("bootloader.bin", &b"boot"[..]),
        ("partitions/table.bin", &b"parts"[..]),
    ]);
    let addr = serve_http(routes(&[("/firmwarev2.php", archive)])).await;
    let work = tempfile::tempdir().unwrap();
    let bus = EventBus::new();
    let mut notifications = bus.subscribe();
    let upgrader = FirmwareUpgrader::new(firmware_config(addr, work.path(), "true", &[]), bus).unwrap();

    let files = assert_ok!(upgrader.fetch().await);

    assert_eq!(files, work.path().join("firmware_files"));
    assert_eq!(std::fs::read(files.join("bootloader.bin")).unwrap(), b"boot");
    assert_eq!(
        std::fs::read(files.join("partitions").join("table.bin")).unwrap(),
        b"parts"
    );
    assert!(work.path().join("firmware.zip").exists());

    let first = next_of_kind(&mut notifications, NotificationKind::BoardUpdate).await;
    assert_eq!(first.field("message"), Some("Downloading firmware"));
    let second = next_of_kind(&mut notifications, NotificationKind::BoardUpdate).await;
    assert_eq!(second.field("message"), Some("Unpacking firmware"));
}

#[tokio::test]
async fn test_flash_releases_the_port_before_the_tool_runs() {
    let work = tempfile::tempdir().unwrap();
    let assets = tempfile::tempdir().unwrap();
    let files = tempfile::tempdir().unwrap();
    let board = SimBoard::new();
    let bus = EventBus::new();
    let session = common::attach(&board, assets.path(), bus.clone()).await;
    let mut notifications = bus.subscribe();

    // Any address will do, nothing is downloaded.
    let addr: SocketAddr = "127.0.0.1:9".parse().unwrap();
    let upgrader = FirmwareUpgrader::new(
        firmware_config(
            addr,
            work.path(),
            "sh",
            &["-c", "sleep 0.2; printf %s {port} > {dir}/flashed"],
        ),
        bus,
    )
    .unwrap();

    let watcher = {
        let board = board.clone();
        tokio::spawn(async move {
            loop {
                let n = notifications.recv().await.expect("bus open");
                if n.field("message") == Some("Flashing firmware") {
                    return board.port.handles();
                }
            }
        })
    };

    let port = assert_ok!(upgrader.flash(session, files.path()).await);

    assert_eq!(port, "MOCK0");
    // Only the test's handle and the watcher's are left.
    assert_eq!(watcher.await.unwrap(), 2);
    assert_eq!(board.port.handles(), 1);
    assert_eq!(
        std::fs::read_to_string(files.path().join("flashed")).unwrap(),
        "MOCK0"
    );
}

fn upgrade_config(addr: SocketAddr, work_dir: &Path, assets_dir: &Path, program: &str) -> Config {
    let mut config = Config::default();
    config.board.assets_dir = assets_dir.to_path_buf();
    config.board.settle_ms = 0;
    config.board.reset_pulse_ms = 0;
    config.board.boot_timeout_ms = 2_000;
    config.firmware = firmware_config(addr, work_dir, program, &[]);
    config
}

#[tokio::test]
async fn test_upgrade_reattaches_after_flashing() {
    let archive = zip_archive(&[("firmware.bin", &b"image"[..])]);
    let addr = serve_http(routes(&[("/firmwarev2.php", archive)])).await;
    let work = tempfile::tempdir().unwrap();
    let assets = tempfile::tempdir().unwrap();
    let board = SimBoard::new();
    board.script_attach();
    board.script_attach();
    let bus = EventBus::new();
    let mut service = BoardService::with_opener(
        upgrade_config(addr, work.path(), assets.path(), "true"),
        bus.clone(),
        Arc::new(board.port.clone()),
    );
    assert_ok!(service.attach("MOCK0").await);
    let mut notifications = bus.subscribe();

    assert_ok!(service.upgrade_firmware().await);

    assert!(service.is_attached());
    assert_eq!(service.session().unwrap().port_name(), "MOCK0");
    assert_eq!(board.port.pending_replies(), 0);

    let mut messages = Vec::new();
    loop {
        let n = next_of_kind(&mut notifications, NotificationKind::BoardUpdate).await;
        let message = n.field("message").unwrap_or_default().to_string();
        messages.push(message.clone());
        if message == "Firmware upgraded" {
            break;
        }
    }
    assert_eq!(
        messages,
        vec![
            "Downloading firmware",
            "Unpacking firmware",
            "Flashing firmware",
            "Firmware upgraded"
        ]
    );
    next_of_kind(&mut notifications, NotificationKind::BoardAttached).await;
    service.detach().await;
}

#[tokio::test]
async fn test_failed_flash_surfaces_the_tool_error() {
    let archive = zip_archive(&[("firmware.bin", &b"image"[..])]);
    let addr = serve_http(routes(&[("/firmwarev2.php", archive)])).await;
    let work = tempfile::tempdir().unwrap();
    let assets = tempfile::tempdir().unwrap();
    let board = SimBoard::new();
    board.script_attach();
    let mut service = BoardService::with_opener(
        upgrade_config(addr, work.path(), assets.path(), "false"),
        EventBus::new(),
        Arc::new(board.port.clone()),
    );
    assert_ok!(service.attach("MOCK0").await);

    let err = assert_err!(service.upgrade_firmware().await);

    assert!(
        matches!(&err, AgentError::Firmware(FirmwareError::Flasher { program, .. }) if program == "false"),
        "unexpected error: {err}"
    );
    assert!(!service.is_attached());
    // The test's handle and the opener's.
    assert_eq!(board.port.handles(), 2);
}
