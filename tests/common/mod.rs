//! Shared test utilities for board agent tests.
//!
//! This module provides a scripted Lua RTOS board on top of
//! [`MockSerialPort`]: each helper registers the console output the board
//! produces in reaction to one exact write from the agent, so the agent's
//! drains never race the simulated output.

#![allow(dead_code)]

use lua_board_agent::board::{BoardSession, SessionSettings};
use lua_board_agent::event::{EventBus, Notification, NotificationKind};
use lua_board_agent::inspector::InspectorHandle;
use lua_board_agent::port::{MockSerialPort, SerialPortAdapter};
use std::collections::HashMap;
use std::io::Write;
use std::net::SocketAddr;
use lua_board_agent::protocol::{
    byte_queue, encode_frame, BoardChannel, ByteQueue, ChannelSettings, ChunkSize,
    DEFAULT_QUEUE_CAPACITY,
};
use std::path::Path;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::broadcast;

pub const POWER_ON_BANNER: &str = "rst:0x1 (POWERON_RESET),boot:0x13 (SPI_FAST_FLASH_BOOT)";
pub const INFO_JSON: &str = r#"{"build":"1503412345","board":"WHITECAT-ESP32-N1","cpus":[1,2,],}"#;

/// A simulated board behind a mock link.
#[derive(Debug, Clone)]
pub struct SimBoard {
    pub port: MockSerialPort,
}

impl Default for SimBoard {
    fn default() -> Self {
        Self::new()
    }
}

impl SimBoard {
    pub fn new() -> Self {
        Self {
            port: MockSerialPort::new("MOCK0"),
        }
    }

    /// A link handle for the agent.
    pub fn link(&self) -> Box<dyn SerialPortAdapter> {
        Box::new(self.port.clone())
    }

    /// Boot banners after a reset pulse, and the abort marker after Ctrl-D.
    pub fn script_boot(&self) {
        let banners = format!(
            "ets Jun  8 2016 00:22:57\r\n\r\n{POWER_ON_BANNER}\r\nconfigsip: 0, SPIWP:0xee\r\n\
             Lua RTOS beta 0.1 build 1503412345\r\nBooting Lua RTOS...\r\n"
        );
        self.port.reply_on_reset(banners.as_bytes());
        self.port
            .reply_on_write(&[0x04], b"Lua RTOS-boot-scripts-aborted-ESP32\r\n");
    }

    /// Echo `command`, print `output` lines, then the prompt.
    pub fn script_command(&self, command: &str, output: &[&str]) {
        let mut reply = format!("{command}\r\n");
        for line in output {
            reply.push_str(line);
            reply.push_str("\r\n");
        }
        reply.push_str("/ > \r\n");
        self.port
            .reply_on_write(format!("{command}\r\n").as_bytes(), reply.as_bytes());
    }

    /// Library directories already present (or missing and then created).
    pub fn script_library_dirs(&self, present: bool) {
        for dir in ["/lib", "/lib/lua"] {
            let check = format!(
                "do local att = io.attributes(\"{dir}\"); print(att ~= nil and att.type == \"directory\"); end"
            );
            if present {
                self.script_command(&check, &["true"]);
            } else {
                self.script_command(&check, &["false"]);
                self.script_command(&format!("os.mkdir(\"{dir}\")"), &[]);
            }
        }
    }

    pub fn script_info(&self, json: &str) {
        self.script_command("dofile(\"/_info.lua\")", &[json]);
    }

    /// Everything `attach` needs with library dirs present and no assets.
    pub fn script_attach(&self) {
        self.script_boot();
        self.script_library_dirs(true);
        self.script_info(INFO_JSON);
    }

    /// Accept a chunked upload behind `command`, cueing every frame.
    /// `ack` is printed after the terminating frame, if any.
    pub fn script_upload(&self, command: &str, data: &[u8], chunk: usize, ack: Option<&str>) {
        self.port.reply_on_write(
            format!("{command}\r").as_bytes(),
            format!("{command}\r\nC\n").as_bytes(),
        );
        for frame in frames(data, chunk) {
            self.port.reply_on_write(&frame, b"C\n");
        }
        if let Some(ack) = ack {
            self.port
                .reply_on_write(&[0], format!("{ack}\r\n").as_bytes());
        }
    }

    /// Accept `data` written to `path`.
    pub fn script_write(&self, path: &str, data: &[u8], chunk: usize) {
        self.script_upload(&format!("io.receive(\"{path}\")"), data, chunk, Some("true"));
    }

    /// Serve `data` from `path`, one frame per cue.
    pub fn script_read(&self, path: &str, data: &[u8], chunk: usize) {
        let command = format!("io.send(\"{path}\")");
        self.port.reply_on_write(
            format!("{command}\r").as_bytes(),
            format!("{command}\r\n").as_bytes(),
        );
        for frame in frames(data, chunk) {
            self.port.reply_on_write(b"C\n", &frame);
        }
        self.port.reply_on_write(b"C\n", &[0]);
    }
}

/// A bare link with a running inspector, for protocol level tests.
pub struct LinkHarness {
    pub board: SimBoard,
    pub bus: EventBus,
    link: Box<dyn SerialPortAdapter>,
    queue: ByteQueue,
    inspector: InspectorHandle,
}

impl LinkHarness {
    pub fn new(board: SimBoard) -> Self {
        let mut link = board.link();
        let reader = link.reader().expect("mock reader");
        let (feeder, queue) = byte_queue(DEFAULT_QUEUE_CAPACITY);
        let bus = EventBus::new();
        let inspector = InspectorHandle::spawn(reader, feeder, bus.clone()).expect("spawn inspector");
        Self {
            board,
            bus,
            link,
            queue,
            inspector,
        }
    }

    /// A channel with no settle delay and frames of `chunk_size` bytes.
    pub fn channel(&mut self, chunk_size: usize) -> BoardChannel<'_> {
        let settings = ChannelSettings {
            chunk_size: ChunkSize::new(chunk_size).expect("valid chunk size"),
            settle: Duration::ZERO,
        };
        BoardChannel::new(self.link.as_mut(), &mut self.queue, settings)
    }

    pub fn inspector(&self) -> &InspectorHandle {
        &self.inspector
    }

    pub async fn shutdown(self) {
        let Self {
            queue, inspector, ..
        } = self;
        drop(queue);
        inspector.shutdown().await;
    }
}

/// Data frames for `data`, without the terminating one.
pub fn frames(data: &[u8], chunk: usize) -> Vec<Vec<u8>> {
    data.chunks(chunk)
        .map(|c| encode_frame(c).expect("chunk fits a frame"))
        .collect()
}

/// Session settings tuned for the simulated board.
pub fn test_settings(assets_dir: &Path, chunk_size: usize) -> SessionSettings {
    SessionSettings {
        channel: ChannelSettings {
            chunk_size: ChunkSize::new(chunk_size).expect("valid chunk size"),
            settle: Duration::ZERO,
        },
        reset_pulse: Duration::ZERO,
        boot_timeout: Duration::from_secs(2),
        assets_dir: assets_dir.to_path_buf(),
        ..SessionSettings::default()
    }
}

/// Attach to a board scripted with [`SimBoard::script_attach`].
pub async fn attach(board: &SimBoard, assets_dir: &Path, bus: EventBus) -> BoardSession {
    board.script_attach();
    BoardSession::attach(board.link(), test_settings(assets_dir, 255), bus)
        .await
        .expect("attach to simulated board")
}

/// Wait for the next notification of `kind`, skipping others.
pub async fn next_of_kind(
    rx: &mut broadcast::Receiver<Notification>,
    kind: NotificationKind,
) -> Notification {
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            let notification = rx.recv().await.expect("bus open");
            if notification.kind == kind {
                return notification;
            }
        }
    })
    .await
    .expect("notification in time")
}

/// Drain whatever notifications are already buffered.
pub fn buffered(rx: &mut broadcast::Receiver<Notification>) -> Vec<Notification> {
    let mut out = Vec::new();
    while let Ok(notification) = rx.try_recv() {
        out.push(notification);
    }
    out
}

/// A minimal HTTP server answering `GET` requests by path (query ignored).
/// Unknown paths get a 404. Runs until the test's runtime shuts down.
pub async fn serve_http(routes: HashMap<String, Vec<u8>>) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        loop {
            let Ok((mut stream, _)) = listener.accept().await else {
                return;
            };
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                match stream.read(&mut buf).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => request.extend_from_slice(&buf[..n]),
                }
            }
            let head = String::from_utf8_lossy(&request);
            let target = head.split_whitespace().nth(1).unwrap_or("/");
            let path = target.split('?').next().unwrap_or(target);
            let (status, body) = match routes.get(path) {
                Some(body) => ("200 OK", body.clone()),
                None => ("404 Not Found", Vec::new()),
            };
            let header = format!(
                "HTTP/1.1 {status}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                body.len()
            );
            let _ = stream.write_all(header.as_bytes()).await;
            let _ = stream.write_all(&body).await;
            let _ = stream.shutdown().await;
        }
    });
    addr
}

/// A zip archive holding `entries`.
pub fn zip_archive(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut zip = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
    let options = zip::write::SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated);
    for (name, data) in entries {
        zip.start_file(*name, options).expect("start entry");
        zip.write_all(data).expect("write entry");
    }
    zip.finish().expect("finish archive").into_inner()
}
