// MIT License - Copyright (c) 2015-2017 Nikishin Alexander
// Rust translation of OBDStreamDelegate.swift
//
//! Transport collaborator: turns a TCP socket into a typed event feed.
//!
//! The connection worker never touches the socket's read half directly.
//! A connect task creates the stream pair and a reader pump forwards
//! everything the adapter produces as [`StreamEvent`]s on a channel, in
//! the order the transport produced them. Events are tagged with the
//! session that created them so the worker can discard anything left over
//! from a torn-down transport.

use std::fmt;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error};

/// Bounded read size per `bytes-available` round.
const READ_CHUNK: usize = 512;

/// One direction of the stream pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Direction {
    Read,
    Write,
}

/// Low-level transport events, delivered in production order.
#[derive(Debug)]
pub(crate) enum StreamEvent {
    /// The stream pair was created; hands the write half to the worker.
    PairCreated(Transport),
    /// One direction finished opening.
    Opened(Direction),
    /// Bytes read from the adapter.
    Data(Vec<u8>),
    /// The write direction is writable again. Informational only.
    SpaceAvailable,
    /// The transport failed, with the underlying cause when it supplied one.
    Error(Option<std::io::Error>),
    /// Clean end-of-stream from the adapter side.
    End,
}

/// A [`StreamEvent`] tagged with the session that produced it.
#[derive(Debug)]
pub(crate) struct SessionEvent {
    pub(crate) session: u64,
    pub(crate) event: StreamEvent,
}

/// The connection's half of an established transport: the socket write
/// half plus the handle of the reader pump feeding the event channel.
///
/// The writer is boxed behind [`AsyncWrite`] so tests can substitute an
/// in-memory writer, matching [`spawn_reader`]'s generic reader.
pub(crate) struct Transport {
    writer: Box<dyn AsyncWrite + Send + Unpin>,
    pump: JoinHandle<()>,
}

impl Transport {
    pub(crate) fn new(
        writer: impl AsyncWrite + Send + Unpin + 'static,
        pump: JoinHandle<()>,
    ) -> Self {
        Self {
            writer: Box::new(writer),
            pump,
        }
    }

    /// Single non-blocking-style write: one syscall, returns the number of
    /// bytes accepted. The caller treats a short write as a failed send.
    pub(crate) async fn write(&mut self, data: &[u8]) -> std::io::Result<usize> {
        self.writer.write(data).await
    }

    /// Release the transport: stop the reader pump and drop the write
    /// half, which shuts down the outgoing direction.
    pub(crate) fn shutdown(self) {
        self.pump.abort();
    }
}

impl fmt::Debug for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transport").finish_non_exhaustive()
    }
}

/// Create the bidirectional stream pair to `addr` and start pumping its
/// events into `events`, tagged with `session`.
///
/// A connect failure is reported as `StreamEvent::Error` carrying the
/// cause; both directions report `Opened` once the pair is established.
pub(crate) fn connect(
    addr: String,
    session: u64,
    events: mpsc::Sender<SessionEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        debug!(%addr, "creating stream pair");
        match TcpStream::connect(&addr).await {
            Ok(stream) => {
                let (reader, writer) = stream.into_split();
                let pump = spawn_reader(reader, session, events.clone());
                let transport = Transport::new(writer, pump);
                send_event(&events, session, StreamEvent::PairCreated(transport)).await;
                send_event(&events, session, StreamEvent::Opened(Direction::Write)).await;
                send_event(&events, session, StreamEvent::Opened(Direction::Read)).await;
                send_event(&events, session, StreamEvent::SpaceAvailable).await;
            }
            Err(e) => {
                error!(%addr, "TCP connect failed: {e}");
                send_event(&events, session, StreamEvent::Error(Some(e))).await;
            }
        }
    })
}

async fn send_event(events: &mpsc::Sender<SessionEvent>, session: u64, event: StreamEvent) {
    // The worker only goes away when the whole connection does.
    let _ = events.send(SessionEvent { session, event }).await;
}

/// Reader pump: bounded reads until the adapter stops producing.
///
/// Generic over the reader so tests can drive it with an in-memory stream.
pub(crate) fn spawn_reader<R>(
    mut reader: R,
    session: u64,
    events: mpsc::Sender<SessionEvent>,
) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = vec![0u8; READ_CHUNK];
        loop {
            match reader.read(&mut buf).await {
                Ok(0) => {
                    debug!("reader: end of stream");
                    send_event(&events, session, StreamEvent::End).await;
                    break;
                }
                Ok(n) => {
                    send_event(&events, session, StreamEvent::Data(buf[..n].to_vec())).await;
                }
                Err(e) => {
                    error!("reader: read error: {e}");
                    send_event(&events, session, StreamEvent::Error(Some(e))).await;
                    break;
                }
            }
        }
    })
}
