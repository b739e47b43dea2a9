//! Tokio transport driver.
//!
//! Each connection runs two loops side by side over the split stream. The
//! read loop feeds arriving bytes through the [`StateMachine`]; the write
//! pump drains the outbound queue in order. Neither waits on the other, so
//! a slow reader on the far side never stops this side from reading. The
//! machine sits behind a mutex shared with the façade; outbound bytes are
//! queued while that mutex is held so the wire order matches the order of
//! state transitions.

use std::sync::{Mutex, MutexGuard, PoisonError};

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;

use crate::config::Limits;
use crate::connection::machine::{Action, StateMachine};
use crate::connection::{ConnectionState, Role};
use crate::error::{Error, Result};
use crate::message::{CloseCode, Message};
use crate::protocol::handshake::{HandshakeResponse, find_head_end};

/// Command for the task that owns the transport.
#[derive(Debug)]
pub(crate) enum Outbound {
    Write(Bytes),
    /// End the write side, keep reading until the peer does the same.
    Shutdown,
    /// Drop the transport now.
    Abort,
    /// The peer ended the stream; flush what is queued and stop.
    Finish,
}

/// Shared per-connection state: the machine plus the write queue into the
/// driver task.
#[derive(Debug)]
pub(crate) struct Session {
    machine: Mutex<StateMachine>,
    outbound: mpsc::UnboundedSender<Outbound>,
}

impl Session {
    pub(crate) fn new(role: Role, limits: Limits) -> (Self, mpsc::UnboundedReceiver<Outbound>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let session = Self {
            machine: Mutex::new(StateMachine::new(role, limits)),
            outbound: tx,
        };
        (session, rx)
    }

    fn lock(&self) -> MutexGuard<'_, StateMachine> {
        self.machine.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn state(&self) -> ConnectionState {
        self.lock().state()
    }

    /// Move to `Open`, decoding any bytes that followed the handshake head.
    pub(crate) fn open(&self, leftover: &[u8]) -> Result<Vec<Message>> {
        let mut machine = self.lock();
        machine.receive(leftover);
        let actions = machine.open()?;
        Ok(self.dispatch(actions))
    }

    pub(crate) fn receive(&self, chunk: &[u8]) -> Vec<Message> {
        let mut machine = self.lock();
        let actions = machine.receive(chunk);
        self.dispatch(actions)
    }

    pub(crate) fn send(&self, message: Message) -> Result<()> {
        let mut machine = self.lock();
        let bytes = machine.send(message)?;
        self.enqueue(Outbound::Write(bytes))
    }

    pub(crate) fn close(&self, status: Option<CloseCode>) -> Result<()> {
        let mut machine = self.lock();
        let bytes = machine.close(status)?;
        self.enqueue(Outbound::Write(bytes))
    }

    /// Tell the write pump the peer has ended the stream.
    pub(crate) fn finish(&self) {
        // The pump may already have stopped.
        let _ = self.enqueue(Outbound::Finish);
    }

    pub(crate) fn transport_closed(&self) -> ConnectionState {
        self.lock().transport_closed()
    }

    fn enqueue(&self, command: Outbound) -> Result<()> {
        self.outbound
            .send(command)
            .map_err(|_| Error::InvalidState(ConnectionState::Closed))
    }

    // Called with the machine lock held.
    fn dispatch(&self, actions: Vec<Action>) -> Vec<Message> {
        let mut messages = Vec::new();
        for action in actions {
            let command = match action {
                Action::Deliver(message) => {
                    messages.push(message);
                    continue;
                }
                Action::Write(bytes) => Outbound::Write(bytes),
                Action::Shutdown => Outbound::Shutdown,
                Action::Abort(_) => Outbound::Abort,
            };
            // The driver has already exited when the queue is closed.
            if self.enqueue(command).is_err() {
                break;
            }
        }
        messages
    }
}

/// Read an HTTP head from `stream`.
///
/// Returns the head (up to and including the empty line) and whatever bytes
/// arrived after it.
///
/// # Errors
///
/// - `Error::HandshakeTooLarge` once the head exceeds `max_handshake_size`
/// - `Error::InvalidHandshake` if the stream ends first
/// - `Error::Io` on transport failure
pub(crate) async fn read_head<S>(stream: &mut S, limits: &Limits) -> Result<(Bytes, Bytes)>
where
    S: AsyncRead + Unpin,
{
    let mut buf = BytesMut::with_capacity(1024);
    loop {
        if let Some(end) = find_head_end(&buf) {
            limits.check_handshake_size(end)?;
            let head = buf.split_to(end).freeze();
            return Ok((head, buf.freeze()));
        }
        limits.check_handshake_size(buf.len())?;
        if stream.read_buf(&mut buf).await? == 0 {
            return Err(Error::InvalidHandshake(
                "Connection closed during handshake".into(),
            ));
        }
    }
}

/// Write a handshake response and flush it.
pub(crate) async fn write_head<S>(stream: &mut S, response: &HandshakeResponse) -> Result<()>
where
    S: AsyncWrite + Unpin,
{
    let mut buf = Vec::with_capacity(256);
    response.write(&mut buf)?;
    stream.write_all(&buf).await?;
    stream.flush().await?;
    Ok(())
}

/// Pump one open connection until its transport ends.
///
/// Each delivered message is passed to `deliver` in arrival order. Returns
/// `Ok(())` when the peer ends the stream or the machine aborts, and the
/// I/O error otherwise.
pub(crate) async fn run<S, F>(
    stream: S,
    session: &Session,
    outbound: mpsc::UnboundedReceiver<Outbound>,
    read_buffer_size: usize,
    deliver: F,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
    F: FnMut(Message),
{
    let (reader, writer) = tokio::io::split(stream);
    let read = read_loop(reader, session, read_buffer_size, deliver);
    let write = write_pump(writer, outbound);
    tokio::pin!(read, write);

    // The pump decides when the connection is over; the read loop only
    // ends early on a transport error.
    let mut reading = true;
    loop {
        tokio::select! {
            result = &mut write => return result,
            result = &mut read, if reading => {
                result?;
                reading = false;
            }
        }
    }
}

async fn read_loop<R, F>(
    mut reader: R,
    session: &Session,
    read_buffer_size: usize,
    mut deliver: F,
) -> Result<()>
where
    R: AsyncRead + Unpin,
    F: FnMut(Message),
{
    let mut buf = BytesMut::with_capacity(read_buffer_size);
    loop {
        buf.reserve(read_buffer_size);
        if reader.read_buf(&mut buf).await? == 0 {
            tracing::debug!("peer ended the stream");
            session.finish();
            return Ok(());
        }
        let chunk = buf.split();
        for message in session.receive(&chunk) {
            deliver(message);
        }
    }
}

async fn write_pump<W>(mut writer: W, mut outbound: mpsc::UnboundedReceiver<Outbound>) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(command) = outbound.recv().await {
        match command {
            Outbound::Write(bytes) => writer.write_all(&bytes).await?,
            Outbound::Shutdown => {
                writer.flush().await?;
                writer.shutdown().await?;
                tracing::debug!("write side shut down, waiting for peer");
            }
            Outbound::Finish => {
                // The peer may already be gone entirely.
                let _ = writer.shutdown().await;
                return Ok(());
            }
            Outbound::Abort => return Ok(()),
        }
    }
    Ok(())
}
