// MIT License - Copyright (c) 2015-2017 Nikishin Alexander
// Rust translation of OBDConnection.swift
//
//! The connection itself: a public handle plus a worker task that owns
//! every piece of mutable connection state.
//!
//! The worker serializes all mutation through its mailbox: application
//! calls, transport events, and timer fires are just messages, so there
//! is no lock to acquire and no context can ever re-enter the state
//! machine. Completions resolve on the caller's own task via oneshot
//! channels; state changes go out on a broadcast channel in transition
//! order.

use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::ConnectionConfig;
use crate::error::{ObdError, Result};
use crate::request::PendingRequest;
use crate::state::ConnectionState;
use crate::transport::{self, Direction, SessionEvent, StreamEvent, Transport};

/// Messages from the public handle to the worker.
enum Command {
    Open { done: oneshot::Sender<()> },
    Close { done: oneshot::Sender<()> },
    Send {
        data: Vec<u8>,
        reply: oneshot::Sender<Result<String>>,
    },
}

/// A connection to an ELM327-class OBD-II adapter over TCP.
///
/// The connection is a transparent command/response shuttle: commands are
/// ASCII text (conventionally ending in `\r`), responses are ASCII text
/// ending in the adapter's prompt character `>`. One request may be in
/// flight at a time; a second `send` while transmitting fails fast with
/// [`ObdError::SendingNotAvailable`].
///
/// Dropping the connection tears down the transport and resolves any
/// request still in flight.
pub struct ObdConnection {
    config: ConnectionConfig,
    commands: mpsc::Sender<Command>,
    state_rx: watch::Receiver<ConnectionState>,
    changes: broadcast::Sender<ConnectionState>,
}

impl ObdConnection {
    /// Create a connection with the given configuration.
    ///
    /// Spawns the worker task, so this must be called within a tokio
    /// runtime. The connection starts out `Closed`; call [`open`] to
    /// establish the stream pair.
    ///
    /// [`open`]: ObdConnection::open
    pub fn new(config: ConnectionConfig) -> Self {
        let (commands_tx, commands_rx) = mpsc::channel(16);
        let (events_tx, events_rx) = mpsc::channel(64);
        let (timers_tx, timers_rx) = mpsc::channel(4);
        let (state_tx, state_rx) = watch::channel(ConnectionState::Closed);
        let (changes, _) = broadcast::channel(64);

        let worker = Worker {
            config: config.clone(),
            session: 0,
            timer_seq: 0,
            state: ConnectionState::Closed,
            state_tx,
            changes: changes.clone(),
            events_tx,
            timers_tx,
            transport: None,
            read_open: false,
            write_open: false,
            pending: None,
        };
        tokio::spawn(worker.run(commands_rx, events_rx, timers_rx));

        Self {
            config,
            commands: commands_tx,
            state_rx,
            changes,
        }
    }

    /// Create a connection targeting the conventional WiFi adapter
    /// address with the default request timeout.
    pub fn default_adapter() -> Self {
        Self::new(ConnectionConfig::default())
    }

    /// Open the connection: create the stream pair to the configured
    /// adapter and move to `Connecting`, then `Open` once both directions
    /// have finished opening.
    ///
    /// Accepted only while `Closed` or in an `Error(_)` state. Calling
    /// `open` on an already-active connection is a caller bug; it is
    /// rejected with a warning and no state change.
    pub async fn open(&self) {
        let (done, ack) = oneshot::channel();
        if self.commands.send(Command::Open { done }).await.is_ok() {
            let _ = ack.await;
        }
    }

    /// Close the connection: cancel any pending timeout, resolve any
    /// request in flight with [`ObdError::SendingNotAvailable`], release
    /// the transport, and move to `Closed`.
    ///
    /// A no-op when already closed. Safe to call from any context,
    /// including from a task awaiting a `send` on this same connection.
    pub async fn close(&self) {
        let (done, ack) = oneshot::channel();
        if self.commands.send(Command::Close { done }).await.is_ok() {
            let _ = ack.await;
        }
    }

    /// Send a command and wait for the adapter's response.
    ///
    /// Resolves exactly once, in one of three ways: the accumulated
    /// response text once the terminator `>` arrives (terminator
    /// included, exactly as received), [`ObdError::RequestTimeout`] when
    /// the configured timeout elapses first, or another [`ObdError`] kind
    /// when the request cannot be made or the connection fails mid-flight.
    pub async fn send(&self, data: impl AsRef<[u8]>) -> Result<String> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::Send {
                data: data.as_ref().to_vec(),
                reply,
            })
            .await
            .map_err(|_| ObdError::SendingNotAvailable)?;
        rx.await.unwrap_or(Err(ObdError::SendingNotAvailable))
    }

    /// The current connection state.
    pub fn state(&self) -> ConnectionState {
        self.state_rx.borrow().clone()
    }

    /// Subscribe to state changes.
    ///
    /// Every transition is delivered, in the order it occurred, and only
    /// when the state actually changed (no duplicate notifications).
    /// Delivery is asynchronous: observers can call back into the
    /// connection freely.
    pub fn subscribe(&self) -> broadcast::Receiver<ConnectionState> {
        self.changes.subscribe()
    }

    /// The configuration this connection was built with.
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }
}

/// Owns all mutable connection state; runs until the last handle is
/// dropped.
struct Worker {
    config: ConnectionConfig,
    /// Bumped on every open and teardown; events tagged with an older
    /// session belong to a transport that no longer exists.
    session: u64,
    /// Guards against a timer fire that was already queued when its
    /// request finished.
    timer_seq: u64,
    state: ConnectionState,
    state_tx: watch::Sender<ConnectionState>,
    changes: broadcast::Sender<ConnectionState>,
    events_tx: mpsc::Sender<SessionEvent>,
    timers_tx: mpsc::Sender<u64>,
    transport: Option<Transport>,
    read_open: bool,
    write_open: bool,
    pending: Option<PendingRequest>,
}

impl Worker {
    async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        mut events: mpsc::Receiver<SessionEvent>,
        mut timers: mpsc::Receiver<u64>,
    ) {
        loop {
            tokio::select! {
                cmd = commands.recv() => match cmd {
                    Some(cmd) => self.handle_command(cmd).await,
                    // Last handle dropped: release everything.
                    None => break,
                },
                Some(ev) = events.recv() => self.handle_session_event(ev),
                Some(seq) = timers.recv() => self.handle_timeout(seq),
            }
        }
        debug!("connection dropped, releasing transport");
        self.teardown(ObdError::SendingNotAvailable);
        self.set_state(ConnectionState::Closed);
    }

    async fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::Open { done } => {
                self.handle_open();
                let _ = done.send(());
            }
            Command::Close { done } => {
                self.handle_close();
                let _ = done.send(());
            }
            Command::Send { data, reply } => self.handle_send(data, reply).await,
        }
    }

    fn handle_open(&mut self) {
        if !self.state.can_open() {
            warn!(state = %self.state, "open() called while the connection is already active");
            return;
        }
        self.session += 1;
        self.read_open = false;
        self.write_open = false;
        self.set_state(ConnectionState::Connecting);
        info!(addr = %self.config.addr(), "opening connection");
        transport::connect(self.config.addr(), self.session, self.events_tx.clone());
    }

    fn handle_close(&mut self) {
        if self.state == ConnectionState::Closed {
            debug!("close() on a closed connection is a no-op");
            return;
        }
        info!("closing connection");
        self.teardown(ObdError::SendingNotAvailable);
        self.set_state(ConnectionState::Closed);
    }

    async fn handle_send(&mut self, data: Vec<u8>, reply: oneshot::Sender<Result<String>>) {
        if data.is_empty() {
            let _ = reply.send(Err(ObdError::InvalidData));
            return;
        }
        if self.state != ConnectionState::Open || self.transport.is_none() {
            let _ = reply.send(Err(ObdError::SendingNotAvailable));
            return;
        }

        self.set_state(ConnectionState::Transmitting);
        debug!(len = data.len(), "writing command");
        // The write is awaited inside the mailbox loop, so it must not
        // stall the worker: a wedged adapter with a full send buffer
        // would otherwise block close() and every transport event. Bound
        // it by the request timeout and fail the send on expiry.
        let written = match self.transport.as_mut() {
            Some(transport) => {
                match tokio::time::timeout(self.config.request_timeout, transport.write(&data))
                    .await
                {
                    Ok(result) => result,
                    Err(_) => Err(std::io::Error::new(
                        std::io::ErrorKind::TimedOut,
                        "write did not complete in time",
                    )),
                }
            }
            None => Err(std::io::Error::new(
                std::io::ErrorKind::NotConnected,
                "no write handle",
            )),
        };
        match written {
            Ok(n) if n == data.len() => {
                let timer = start_timer(
                    &mut self.timer_seq,
                    self.config.request_timeout,
                    self.timers_tx.clone(),
                );
                self.pending = Some(PendingRequest::new(reply, timer));
            }
            Ok(n) => {
                // A partial write leaves the adapter with half a command;
                // the command failed but the connection itself is healthy.
                warn!(wanted = data.len(), written = n, "short write, failing the send");
                self.set_state(ConnectionState::Open);
                let _ = reply.send(Err(ObdError::SendingFailed));
            }
            Err(e) => {
                error!("write failed: {e}");
                self.set_state(ConnectionState::Open);
                let _ = reply.send(Err(ObdError::SendingFailed));
            }
        }
    }

    fn handle_session_event(&mut self, ev: SessionEvent) {
        if ev.session != self.session {
            // A stream pair that arrives for a torn-down session must
            // still be released: just dropping it would detach its
            // reader pump and leave the socket's read half open.
            if let StreamEvent::PairCreated(transport) = ev.event {
                debug!("releasing transport from a torn-down session");
                transport.shutdown();
            } else {
                debug!("discarding event from a torn-down session");
            }
            return;
        }
        match ev.event {
            StreamEvent::PairCreated(transport) => {
                self.transport = Some(transport);
            }
            StreamEvent::Opened(direction) => self.handle_opened(direction),
            StreamEvent::Data(bytes) => self.handle_data(&bytes),
            StreamEvent::SpaceAvailable => {}
            StreamEvent::Error(cause) => self.handle_fatal(ObdError::from_stream_cause(cause)),
            StreamEvent::End => self.handle_fatal(ObdError::ConnectionEnded),
        }
    }

    fn handle_opened(&mut self, direction: Direction) {
        match direction {
            Direction::Read => self.read_open = true,
            Direction::Write => self.write_open = true,
        }
        if self.state == ConnectionState::Connecting
            && self.read_open
            && self.write_open
            && self.transport.is_some()
        {
            info!("connection open");
            self.set_state(ConnectionState::Open);
        }
    }

    fn handle_data(&mut self, bytes: &[u8]) {
        if self.pending.is_none() {
            // Adapters greet with a banner on connect; nothing is waiting
            // for it.
            debug!(len = bytes.len(), "data with no request in flight, dropping");
            return;
        }
        if !bytes.is_ascii() {
            warn!("non-ASCII bytes in response");
            self.finish_request(Err(ObdError::InvalidResponse));
            return;
        }
        let chunk = String::from_utf8_lossy(bytes);
        let complete = self
            .pending
            .as_mut()
            .map_or(false, |pending| pending.push_chunk(&chunk));
        if complete {
            self.finish_request(Ok(()));
        }
    }

    /// Shared tail of the success, timeout, and decode-failure paths:
    /// resolve the request exactly once and go back to `Open`.
    fn finish_request(&mut self, result: std::result::Result<(), ObdError>) {
        let Some(mut pending) = self.pending.take() else {
            return;
        };
        let result = match result {
            Ok(()) => {
                let response = pending.take_response();
                debug!(len = response.len(), "response complete");
                Ok(response)
            }
            Err(e) => Err(e),
        };
        pending.finish(result);
        self.set_state(ConnectionState::Open);
    }

    fn handle_timeout(&mut self, seq: u64) {
        if seq != self.timer_seq {
            // Fired before it was cancelled; its request already resolved.
            return;
        }
        if self.pending.is_some() {
            warn!(timeout = ?self.config.request_timeout, "request timed out");
            self.finish_request(Err(ObdError::RequestTimeout));
        }
    }

    /// Any transport error or end-of-stream is fatal to the connection.
    fn handle_fatal(&mut self, kind: ObdError) {
        match kind {
            ObdError::ConnectionEnded => warn!("adapter closed the connection"),
            ref e => error!("transport failure: {e}"),
        }
        self.teardown(kind.clone());
        self.set_state(ConnectionState::Error(kind));
    }

    /// Release transport resources and resolve any request in flight with
    /// `kind`, so no caller is ever left without a resolution.
    fn teardown(&mut self, kind: ObdError) {
        self.session += 1;
        if let Some(pending) = self.pending.take() {
            pending.finish(Err(kind));
        }
        if let Some(transport) = self.transport.take() {
            transport.shutdown();
        }
        self.read_open = false;
        self.write_open = false;
    }

    /// Apply a transition and notify observers, but only when the state
    /// actually changed. `Error(_)` states compare equal by class here;
    /// the notification still carries the specific kind.
    fn set_state(&mut self, new: ConnectionState) {
        if self.state == new {
            return;
        }
        debug!(from = %self.state, to = %new, "state changed");
        self.state = new.clone();
        self.state_tx.send_replace(new.clone());
        let _ = self.changes.send(new);
    }
}

/// Start the one-shot request timeout. Bumping the sequence number first
/// means at most one timer is ever live for the current request; a stale
/// fire no longer matches and is ignored.
fn start_timer(
    timer_seq: &mut u64,
    timeout: std::time::Duration,
    timers: mpsc::Sender<u64>,
) -> JoinHandle<()> {
    *timer_seq += 1;
    let seq = *timer_seq;
    tokio::spawn(async move {
        tokio::time::sleep(timeout).await;
        let _ = timers.send(seq).await;
    })
}
