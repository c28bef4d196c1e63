//! Per-connection state for one observer socket.
//!
//! Each accepted connection gets an `ObserverConn` that owns a read task
//! (lines → [`CommandHandler`]) and a write task (queued event bytes →
//! socket).

use std::sync::Arc;

use futures_util::StreamExt;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::mpsc::{self, Receiver, Sender};
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedRead, LinesCodec, LinesCodecError};

use super::observers::ObserverSet;
use super::server::CommandHandler;
use super::ObserverId;
use crate::constants::{MAX_LINE_BYTES, OBSERVER_QUEUE_CAPACITY};
use crate::protocol::{decode_line, ProtocolError};

/// Engine-side state for a single observer connection.
pub struct ObserverConn {
    /// Unique identifier for this connection.
    id: ObserverId,
    /// Bounded queue of encoded event records for the write task.
    frame_tx: Sender<Arc<[u8]>>,
    /// Handle to the read task (for cleanup).
    read_handle: Option<JoinHandle<()>>,
    /// Handle to the write task (for cleanup).
    write_handle: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for ObserverConn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObserverConn")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

impl ObserverConn {
    /// Start the read and write tasks for an accepted socket.
    ///
    /// Only [`ObserverSet::accept`] calls this, with the set locked.
    pub(crate) fn spawn(
        id: ObserverId,
        stream: TcpStream,
        handler: Arc<dyn CommandHandler>,
        observers: Arc<ObserverSet>,
    ) -> Self {
        let (read_half, write_half) = stream.into_split();
        let (frame_tx, frame_rx) = mpsc::channel::<Arc<[u8]>>(OBSERVER_QUEUE_CAPACITY);

        let read_handle = tokio::spawn(Self::read_loop(
            id.clone(),
            read_half,
            handler,
            Arc::clone(&observers),
        ));
        let write_handle = tokio::spawn(Self::write_loop(
            id.clone(),
            write_half,
            frame_rx,
            observers,
        ));

        Self {
            id,
            frame_tx,
            read_handle: Some(read_handle),
            write_handle: Some(write_handle),
        }
    }

    /// A connection backed by an in-process channel instead of a socket.
    ///
    /// Everything queued for this observer arrives on the returned receiver;
    /// dropping the receiver makes the connection look broken.
    pub fn channel(id: ObserverId) -> (Self, Receiver<Arc<[u8]>>) {
        let (frame_tx, frame_rx) = mpsc::channel(OBSERVER_QUEUE_CAPACITY);
        let conn = Self {
            id,
            frame_tx,
            read_handle: None,
            write_handle: None,
        };
        (conn, frame_rx)
    }

    /// Queue encoded bytes for this observer.
    ///
    /// Never waits. Returns `false` if the write side is gone or the queue
    /// is full because the observer stopped reading.
    pub fn send(&self, encoded: Arc<[u8]>) -> bool {
        match self.frame_tx.try_send(encoded) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                log::warn!(
                    "[Session] Observer {} stalled with {OBSERVER_QUEUE_CAPACITY} queued records",
                    self.id
                );
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }

    /// Connection identifier.
    pub fn id(&self) -> &ObserverId {
        &self.id
    }

    /// Close the connection, aborting its read/write tasks.
    pub fn disconnect(self) {
        if let Some(handle) = self.read_handle {
            handle.abort();
        }
        if let Some(handle) = self.write_handle {
            handle.abort();
        }
    }

    /// Read loop - decodes control lines and hands them to the handler.
    async fn read_loop(
        id: ObserverId,
        reader: OwnedReadHalf,
        handler: Arc<dyn CommandHandler>,
        observers: Arc<ObserverSet>,
    ) {
        let mut lines = FramedRead::new(reader, LinesCodec::new_with_max_length(MAX_LINE_BYTES));
        // FramedRead yields one `None` after a decode error before resuming.
        let mut resume_after_error = false;

        loop {
            match lines.next().await {
                Some(Ok(line)) => {
                    let message = decode_line(&line);
                    if message.is_empty() {
                        log::debug!("[Session] Unrecognised line from {id}: {line:?}");
                        continue;
                    }
                    handler.handle(&id, message);
                }
                Some(Err(LinesCodecError::MaxLineLengthExceeded)) => {
                    let err = ProtocolError::LineTooLong { max: MAX_LINE_BYTES };
                    log::warn!("[Session] {err} from {id}, discarded");
                    resume_after_error = true;
                }
                Some(Err(LinesCodecError::Io(e))) => {
                    log::error!("[Session] Read error for {id}: {e}");
                    break;
                }
                None if resume_after_error => resume_after_error = false,
                None => break,
            }
        }

        log::info!("[Session] Observer disconnected: {id}");
        observers.remove(&id);
    }

    /// Write loop - drains the queue onto the socket.
    async fn write_loop(
        id: ObserverId,
        mut writer: OwnedWriteHalf,
        mut frame_rx: Receiver<Arc<[u8]>>,
        observers: Arc<ObserverSet>,
    ) {
        while let Some(data) = frame_rx.recv().await {
            if let Err(e) = writer.write_all(&data).await {
                log::error!("[Session] Write error for {id}: {e}");
                observers.remove(&id);
                break;
            }
        }
    }
}
