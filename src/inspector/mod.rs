//! Stream inspector.
//!
//! The inspector is the only reader of the serial link. It runs on its own
//! thread for the lifetime of a session, forwards every byte to the
//! [`ByteQueue`](crate::protocol::ByteQueue) consumed by protocol operations,
//! and classifies each completed line into board events published on the
//! [`EventBus`].
//!
//! It is steered with [`InspectorMode`] messages rather than shared flags:
//! suspension (firmware flashing), boot notification suppression (program
//! runs) and shutdown.

pub mod classifier;

pub use classifier::classify;

use crate::error::AgentResult;
use crate::event::{BoardEvent, EventBus, Notification, NotificationKind};
use crate::port::PortReader;
use crate::protocol::QueueFeeder;
use std::thread;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Current instructions for the inspector thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InspectorMode {
    /// Keep reading the link but neither classify nor enqueue anything.
    pub suspended: bool,
    /// Report reset banners and block events.
    pub boot_notifications: bool,
    /// Stop reading and exit.
    pub shutdown: bool,
}

impl Default for InspectorMode {
    fn default() -> Self {
        Self {
            suspended: false,
            boot_notifications: true,
            shutdown: false,
        }
    }
}

/// What to do with one byte read from the link.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Inspection {
    /// Whether the byte goes to the byte queue.
    pub forward: bool,
    /// Events completed by this byte.
    pub events: Vec<BoardEvent>,
}

/// Line assembler and classifier, independent of any transport.
#[derive(Debug, Default)]
pub struct StreamInspector {
    line: Vec<u8>,
}

impl StreamInspector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process one byte.
    ///
    /// While suspended the byte is dropped and the partial line is left as
    /// it was.
    pub fn inspect(&mut self, byte: u8, mode: &InspectorMode) -> Inspection {
        if mode.suspended {
            return Inspection::default();
        }

        let events = match byte {
            b'\n' => {
                let line = String::from_utf8_lossy(&self.line).into_owned();
                self.line.clear();
                classify(&line, mode.boot_notifications)
            }
            b'\r' => Vec::new(),
            other => {
                self.line.push(other);
                Vec::new()
            }
        };

        Inspection {
            forward: true,
            events,
        }
    }

    /// Bytes of the line not yet terminated.
    pub fn pending_line(&self) -> &[u8] {
        &self.line
    }
}

/// Handle to a running inspector thread.
///
/// Dropping the handle asks the thread to stop without waiting for it.
#[derive(Debug)]
pub struct InspectorHandle {
    control: watch::Sender<InspectorMode>,
    thread: Option<thread::JoinHandle<()>>,
}

impl InspectorHandle {
    /// Start inspecting `reader`, feeding `feeder` and publishing on `bus`.
    pub fn spawn(
        reader: Box<dyn PortReader>,
        feeder: QueueFeeder,
        bus: EventBus,
    ) -> AgentResult<Self> {
        let (control, mode) = watch::channel(InspectorMode::default());
        let thread = thread::Builder::new()
            .name("board-inspector".into())
            .spawn(move || run(reader, feeder, bus, mode))?;

        Ok(Self {
            control,
            thread: Some(thread),
        })
    }

    /// Current mode.
    pub fn mode(&self) -> InspectorMode {
        *self.control.borrow()
    }

    /// Enter or leave suspension.
    pub fn suspend(&self, suspended: bool) {
        debug!(suspended, "inspector suspension");
        self.control.send_modify(|mode| mode.suspended = suspended);
    }

    /// Enable or disable reset banner and block notifications.
    pub fn set_boot_notifications(&self, enabled: bool) {
        debug!(enabled, "inspector boot notifications");
        self.control
            .send_modify(|mode| mode.boot_notifications = enabled);
    }

    /// Whether the thread is still reading the link.
    pub fn is_running(&self) -> bool {
        self.thread
            .as_ref()
            .is_some_and(|thread| !thread.is_finished())
    }

    /// Stop the thread and wait for it to exit.
    ///
    /// The byte queue must not be full, or be dropped first; a thread blocked
    /// on a full queue cannot observe the request.
    pub async fn shutdown(mut self) {
        self.control.send_modify(|mode| mode.shutdown = true);
        if let Some(thread) = self.thread.take() {
            match tokio::task::spawn_blocking(move || thread.join()).await {
                Ok(Ok(())) => debug!("inspector stopped"),
                _ => warn!("inspector thread panicked"),
            }
        }
    }
}

impl Drop for InspectorHandle {
    fn drop(&mut self) {
        self.control.send_modify(|mode| mode.shutdown = true);
    }
}

fn run(
    mut reader: Box<dyn PortReader>,
    feeder: QueueFeeder,
    bus: EventBus,
    mut control: watch::Receiver<InspectorMode>,
) {
    let mut inspector = StreamInspector::new();
    let mut mode = *control.borrow_and_update();

    loop {
        match control.has_changed() {
            Ok(true) => mode = *control.borrow_and_update(),
            Ok(false) => {}
            Err(_) => break,
        }
        if mode.shutdown {
            break;
        }

        let byte = match reader.read_byte() {
            Ok(Some(byte)) => byte,
            Ok(None) => continue,
            Err(err) => {
                info!(error = %err, "board link lost");
                bus.publish(
                    Notification::new(NotificationKind::BoardDetached)
                        .with_field("reason", err.to_string()),
                );
                break;
            }
        };

        let inspection = inspector.inspect(byte, &mode);
        for event in &inspection.events {
            bus.publish(event.to_notification());
        }
        if inspection.forward && !feeder.push(byte) {
            debug!("byte queue dropped, inspector exiting");
            break;
        }
    }
}
