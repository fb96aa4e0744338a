//! Microcontroller I/O board on a serial transport.
//!
//! The board streams status frames and accepts relay commands over the
//! same link. [`IoBoard`] owns the transport: a blocking reader task
//! decodes frames into a channel, and [`IoBoard::set_relay_state`] writes
//! commands on the write half while a read is pending. Nothing else
//! touches the transport.
//!
//! # Example
//!
//! ```rust
//! use rs_hydronic::board::IoBoard;
//! use rs_hydronic::config::BoardConfig;
//! use rs_hydronic::hal::MockTransport;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> rs_hydronic::Result<()> {
//! let transport = MockTransport::new();
//! transport.push_bytes(b"01|05|00\n");
//!
//! let board = IoBoard::new(BoardConfig::default())?;
//! let mut frames = board.open(transport.clone())?;
//!
//! let frame = frames.recv().await.unwrap();
//! assert!(frame.input_high(0));
//!
//! board.set_relay_state(0b11)?;
//! assert_eq!(transport.written_string(), "s 3\n");
//!
//! board.close().await?;
//! # Ok(())
//! # }
//! ```

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;

use crate::config::BoardConfig;
use crate::error::{Error, Result};
use crate::frame::{encode_relay_command, FrameParser, StatusFrame};
use crate::relay::RelayPort;
use crate::sync::lock;
use crate::traits::Transport;

const READ_CHUNK: usize = 64;

struct Reader {
    stop: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

/// Serial-attached I/O board.
pub struct IoBoard<T: Transport> {
    config: BoardConfig,
    transport: Mutex<Option<Arc<T>>>,
    commands: Mutex<()>,
    reader: Mutex<Option<Reader>>,
}

impl<T: Transport + 'static> IoBoard<T> {
    /// Closed board.
    pub fn new(config: BoardConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            transport: Mutex::new(None),
            commands: Mutex::new(()),
            reader: Mutex::new(None),
        })
    }

    /// Whether a transport is attached.
    pub fn is_open(&self) -> bool {
        lock(&self.transport).is_some()
    }

    /// Attach `transport` and start decoding frames.
    ///
    /// Frames arrive on the returned channel until the board is closed or
    /// the receiver is dropped.
    pub fn open(&self, transport: T) -> Result<mpsc::Receiver<StatusFrame>> {
        let handle = Handle::try_current()
            .map_err(|_| Error::Runtime("board must be opened inside a tokio runtime"))?;

        let mut reader = lock(&self.reader);
        let transport = {
            let mut slot = lock(&self.transport);
            if slot.is_some() {
                return Err(Error::AlreadyOpen);
            }
            let transport = Arc::new(transport);
            *slot = Some(Arc::clone(&transport));
            transport
        };

        let (tx, rx) = mpsc::channel(self.config.channel_capacity);
        let stop = Arc::new(AtomicBool::new(false));
        let read_loop = ReadLoop {
            transport,
            stop: Arc::clone(&stop),
            frames: tx,
            parser: FrameParser::new(self.config.format),
            idle_backoff: Duration::from_millis(self.config.idle_backoff_ms),
            retry_backoff: Duration::from_millis(self.config.retry_backoff_ms),
            name: self.config.name.to_string(),
        };
        let task = handle.spawn_blocking(move || read_loop.run());

        log::info!("{}: opened ({:?} frames)", self.config.name, self.config.format);
        *reader = Some(Reader { stop, task });
        Ok(rx)
    }

    /// Set the board's relays to `mask`.
    ///
    /// Commands are serialized with each other but never wait for the
    /// reader.
    pub fn set_relay_state(&self, mask: u32) -> Result<()> {
        let transport = lock(&self.transport).clone().ok_or(Error::NotOpen)?;
        let command = encode_relay_command(mask);
        let _commands = lock(&self.commands);

        let mut pending = command.as_bytes();
        while !pending.is_empty() {
            match transport.write(pending) {
                Ok(0) => {
                    return Err(Error::Io(io::Error::new(
                        io::ErrorKind::WriteZero,
                        "transport accepted no bytes",
                    )))
                }
                Ok(n) => pending = &pending[n..],
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(Error::Io(e)),
            }
        }
        log::debug!("{}: relays set to {mask:#04x}", self.config.name);
        Ok(())
    }

    /// Close the transport, then wait for the reader to exit.
    ///
    /// Closing a closed board does nothing.
    pub async fn close(&self) -> Result<()> {
        let reader = lock(&self.reader).take();
        let transport = lock(&self.transport).take();
        if let Some(reader) = &reader {
            reader.stop.store(true, Ordering::Release);
        }

        let closed = match transport {
            Some(t) => {
                log::info!("{}: closed", self.config.name);
                t.close().map_err(Error::Io)
            }
            None => Ok(()),
        };

        if let Some(reader) = reader {
            if let Err(e) = reader.task.await {
                log::warn!("{}: reader ended abnormally: {e}", self.config.name);
            }
        }
        closed
    }
}

impl<T: Transport + 'static> RelayPort for IoBoard<T> {
    fn write_relays(&self, mask: u32) -> io::Result<()> {
        self.set_relay_state(mask).map_err(|e| match e {
            Error::Io(e) => e,
            other => io::Error::new(io::ErrorKind::NotConnected, other),
        })
    }
}

impl<T: Transport> Drop for IoBoard<T> {
    fn drop(&mut self) {
        if let Some(reader) = lock(&self.reader).take() {
            reader.stop.store(true, Ordering::Release);
        }
        if let Some(t) = lock(&self.transport).take() {
            if let Err(e) = t.close() {
                log::warn!("{}: close on drop failed: {e}", self.config.name);
            }
        }
    }
}

struct ReadLoop<T> {
    transport: Arc<T>,
    stop: Arc<AtomicBool>,
    frames: mpsc::Sender<StatusFrame>,
    parser: FrameParser,
    idle_backoff: Duration,
    retry_backoff: Duration,
    name: String,
}

impl<T: Transport> ReadLoop<T> {
    fn run(mut self) {
        let mut buf = [0u8; READ_CHUNK];

        while !self.stopped() {
            let read = self.transport.read(&mut buf);
            if self.stopped() {
                break;
            }

            match read {
                Ok(0) => thread::sleep(self.idle_backoff),
                Ok(n) => {
                    for byte in &buf[..n] {
                        match self.parser.push(*byte) {
                            Some(Ok(frame)) => {
                                if !self.forward(frame) {
                                    return;
                                }
                            }
                            Some(Err(e)) => log::debug!("{}: {e}", self.name),
                            None => {}
                        }
                    }
                }
                Err(e)
                    if matches!(
                        e.kind(),
                        io::ErrorKind::WouldBlock
                            | io::ErrorKind::TimedOut
                            | io::ErrorKind::Interrupted
                    ) =>
                {
                    thread::sleep(self.idle_backoff)
                }
                Err(e) => {
                    log::warn!("{}: read failed, retrying: {e}", self.name);
                    thread::sleep(self.retry_backoff);
                }
            }
        }
        log::debug!("{}: reader exiting", self.name);
    }

    fn stopped(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }

    /// Hand a frame to the consumer, waiting while the channel is full.
    /// Returns `false` once the reader should exit.
    fn forward(&self, mut frame: StatusFrame) -> bool {
        loop {
            match self.frames.try_send(frame) {
                Ok(()) => return true,
                Err(TrySendError::Closed(_)) => {
                    log::info!("{}: frame receiver dropped, reader exiting", self.name);
                    return false;
                }
                Err(TrySendError::Full(f)) => {
                    if self.stopped() {
                        return false;
                    }
                    frame = f;
                    thread::sleep(self.idle_backoff);
                }
            }
        }
    }
}
