//! An established QUIC connection to a peer, and the bidirectional streams
//! opened over it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, Weak};
use std::time::{Duration, Instant};

use dep2p_types::{Multiaddr, PeerId};

use crate::error::{TransportError, TransportResult};

/// Which side initiated a connection or stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Inbound,
    Outbound,
}

/// A stream's position in its half-close lifecycle. `Reset` is terminal and
/// overrides any other transition once reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Open,
    ReadClosed,
    WriteClosed,
    Closed,
    Reset,
}

#[derive(Debug, Clone)]
pub struct StreamStat {
    pub direction: Direction,
    pub opened: Instant,
    pub protocol: Option<String>,
    pub bytes_read: u64,
    pub bytes_written: u64,
}

#[derive(Debug, Clone, Copy)]
pub struct ConnectionStat {
    pub direction: Direction,
    pub opened: Instant,
    pub transient: bool,
    pub num_streams: usize,
}

/// A live connection to one peer. Cheap to clone (it's an `Arc` inside):
/// every clone shares the same underlying quinn connection and close state.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<ConnectionInner>,
}

struct ConnectionInner {
    quinn_conn: quinn::Connection,
    local_peer_id: PeerId,
    local_addr: Multiaddr,
    remote_peer_id: PeerId,
    remote_addr: Multiaddr,
    direction: Direction,
    opened_at: Instant,
    closed: RwLock<bool>,
    streams: RwLock<Vec<Weak<StreamInner>>>,
}

impl Connection {
    pub(crate) fn new(
        quinn_conn: quinn::Connection,
        local_peer_id: PeerId,
        local_addr: Multiaddr,
        remote_peer_id: PeerId,
        direction: Direction,
    ) -> Self {
        let remote_addr = Multiaddr::from_socket_addr_quic(quinn_conn.remote_address());
        Self {
            inner: Arc::new(ConnectionInner {
                quinn_conn,
                local_peer_id,
                local_addr,
                remote_peer_id,
                remote_addr,
                direction,
                opened_at: Instant::now(),
                closed: RwLock::new(false),
                streams: RwLock::new(Vec::new()),
            }),
        }
    }

    pub fn local_peer_id(&self) -> PeerId {
        self.inner.local_peer_id
    }

    pub fn local_multiaddr(&self) -> &Multiaddr {
        &self.inner.local_addr
    }

    pub fn remote_peer_id(&self) -> PeerId {
        self.inner.remote_peer_id
    }

    pub fn remote_multiaddr(&self) -> &Multiaddr {
        &self.inner.remote_addr
    }

    pub fn direction(&self) -> Direction {
        self.inner.direction
    }

    pub fn opened_at(&self) -> Instant {
        self.inner.opened_at
    }

    /// Snapshot of every stream still alive on this connection. Dead entries
    /// (the `Stream` handle was dropped) are pruned as a side effect.
    pub fn streams(&self) -> Vec<StreamStat> {
        let mut guard = self.inner.streams.write().expect("connection lock poisoned");
        guard.retain(|weak| weak.strong_count() > 0);
        guard.iter().filter_map(|weak| weak.upgrade()).map(|inner| inner.stat()).collect()
    }

    pub fn stat(&self) -> ConnectionStat {
        let num_streams = {
            let mut guard = self.inner.streams.write().expect("connection lock poisoned");
            guard.retain(|weak| weak.strong_count() > 0);
            guard.len()
        };
        ConnectionStat {
            direction: self.inner.direction,
            opened: self.inner.opened_at,
            // No relay/circuit feature exists on this transport, so every
            // connection is a direct one; there is no transient signal to
            // report here.
            transient: false,
            num_streams,
        }
    }

    pub fn supports_stream_priority(&self) -> bool {
        true
    }

    pub fn is_closed(&self) -> bool {
        *self.inner.closed.read().expect("connection lock poisoned")
            || self.inner.quinn_conn.close_reason().is_some()
    }

    fn register_stream(&self, inner: &Arc<StreamInner>) {
        let mut guard = self.inner.streams.write().expect("connection lock poisoned");
        guard.retain(|weak| weak.strong_count() > 0);
        guard.push(Arc::downgrade(inner));
    }

    /// Open a new bidirectional stream.
    ///
    /// This follows a split-lock pattern: the closed flag is checked under
    /// a read lock, the (suspending, possibly slow) stream open happens
    /// with no lock held, and the flag is re-checked under a write lock
    /// before the stream is handed back. Holding the lock across the
    /// `.await` would deadlock against a concurrent `close()` that is
    /// itself waiting to take the write lock.
    pub async fn open_stream(&self) -> TransportResult<Stream> {
        self.open_stream_with_priority(None).await
    }

    pub async fn open_stream_with_priority(&self, priority: Option<i32>) -> TransportResult<Stream> {
        {
            let closed = self.inner.closed.read().expect("connection lock poisoned");
            if *closed {
                return Err(TransportError::ConnectionClosed);
            }
        }

        let (mut send, recv) = self.inner.quinn_conn.open_bi().await?;

        {
            let closed = self.inner.closed.write().expect("connection lock poisoned");
            if *closed {
                let _ = send.reset(0u32.into());
                return Err(TransportError::ConnectionClosed);
            }
        }

        if let Some(priority) = priority {
            let _ = send.set_priority(priority);
        }

        let stream_inner = Arc::new(StreamInner::new(Arc::downgrade(&self.inner), Direction::Outbound));
        self.register_stream(&stream_inner);
        Ok(Stream::new(send, recv, stream_inner, priority.unwrap_or(0)))
    }

    pub async fn accept_stream(&self) -> TransportResult<Stream> {
        if self.is_closed() {
            return Err(TransportError::ConnectionClosed);
        }
        let (send, recv) = self.inner.quinn_conn.accept_bi().await?;
        let stream_inner = Arc::new(StreamInner::new(Arc::downgrade(&self.inner), Direction::Inbound));
        self.register_stream(&stream_inner);
        Ok(Stream::new(send, recv, stream_inner, 0))
    }

    pub fn close(&self, error_code: u32, reason: &str) {
        {
            let mut closed = self.inner.closed.write().expect("connection lock poisoned");
            if *closed {
                return;
            }
            *closed = true;
        }
        self.inner
            .quinn_conn
            .close(error_code.into(), reason.as_bytes());
    }
}

struct StreamInner {
    conn: Weak<ConnectionInner>,
    direction: Direction,
    opened_at: Instant,
    protocol: RwLock<Option<String>>,
    state: RwLock<StreamState>,
    bytes_read: AtomicU64,
    bytes_written: AtomicU64,
}

impl StreamInner {
    fn new(conn: Weak<ConnectionInner>, direction: Direction) -> Self {
        Self {
            conn,
            direction,
            opened_at: Instant::now(),
            protocol: RwLock::new(None),
            state: RwLock::new(StreamState::Open),
            bytes_read: AtomicU64::new(0),
            bytes_written: AtomicU64::new(0),
        }
    }

    fn stat(&self) -> StreamStat {
        StreamStat {
            direction: self.direction,
            opened: self.opened_at,
            protocol: self.protocol.read().expect("stream lock poisoned").clone(),
            bytes_read: self.bytes_read.load(Ordering::Relaxed),
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
        }
    }
}

/// A single bidirectional stream on a `Connection`. Holds only a weak
/// back-reference to its connection so a long-lived stream never keeps the
/// connection's resources alive past `close()`.
pub struct Stream {
    send: quinn::SendStream,
    recv: quinn::RecvStream,
    inner: Arc<StreamInner>,
    priority: i32,
    read_deadline: Option<Duration>,
    write_deadline: Option<Duration>,
}

impl Stream {
    fn new(send: quinn::SendStream, recv: quinn::RecvStream, inner: Arc<StreamInner>, priority: i32) -> Self {
        Self {
            send,
            recv,
            inner,
            priority,
            read_deadline: None,
            write_deadline: None,
        }
    }

    pub fn id(&self) -> u64 {
        self.send.id().index()
    }

    pub fn protocol(&self) -> Option<String> {
        self.inner.protocol.read().expect("stream lock poisoned").clone()
    }

    pub fn set_protocol(&mut self, protocol: impl Into<String>) {
        *self.inner.protocol.write().expect("stream lock poisoned") = Some(protocol.into());
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }

    pub fn set_read_deadline(&mut self, deadline: Option<Duration>) {
        self.read_deadline = deadline;
    }

    pub fn set_write_deadline(&mut self, deadline: Option<Duration>) {
        self.write_deadline = deadline;
    }

    pub fn state(&self) -> StreamState {
        *self.inner.state.read().expect("stream lock poisoned")
    }

    pub fn stat(&self) -> StreamStat {
        self.inner.stat()
    }

    /// The connection this stream belongs to, if it hasn't been dropped.
    pub fn connection(&self) -> Option<Connection> {
        self.inner.conn.upgrade().map(|inner| Connection { inner })
    }

    pub async fn write(&mut self, buf: &[u8]) -> TransportResult<usize> {
        if matches!(self.state(), StreamState::WriteClosed | StreamState::Closed | StreamState::Reset) {
            return Err(TransportError::Stream("stream write side is closed".into()));
        }
        let write_fut = self.send.write(buf);
        let written = match self.write_deadline {
            Some(deadline) => tokio::time::timeout(deadline, write_fut)
                .await
                .map_err(|_| TransportError::Stream("write deadline exceeded".into()))?
                .map_err(|e| TransportError::Stream(e.to_string()))?,
            None => write_fut.await.map_err(|e| TransportError::Stream(e.to_string()))?,
        };
        self.inner.bytes_written.fetch_add(written as u64, Ordering::Relaxed);
        Ok(written)
    }

    pub async fn read(&mut self, buf: &mut [u8]) -> TransportResult<Option<usize>> {
        if matches!(self.state(), StreamState::ReadClosed | StreamState::Closed | StreamState::Reset) {
            return Err(TransportError::Stream("stream read side is closed".into()));
        }
        let read_fut = self.recv.read(buf);
        let read = match self.read_deadline {
            Some(deadline) => tokio::time::timeout(deadline, read_fut)
                .await
                .map_err(|_| TransportError::Stream("read deadline exceeded".into()))?
                .map_err(|e| TransportError::Stream(e.to_string()))?,
            None => read_fut.await.map_err(|e| TransportError::Stream(e.to_string()))?,
        };
        if let Some(n) = read {
            self.inner.bytes_read.fetch_add(n as u64, Ordering::Relaxed);
        }
        Ok(read)
    }

    fn mark_read_closed(&self) {
        let mut state = self.inner.state.write().expect("stream lock poisoned");
        *state = match *state {
            StreamState::WriteClosed | StreamState::Closed => StreamState::Closed,
            StreamState::Reset => StreamState::Reset,
            _ => StreamState::ReadClosed,
        };
    }

    fn mark_write_closed(&self) {
        let mut state = self.inner.state.write().expect("stream lock poisoned");
        *state = match *state {
            StreamState::ReadClosed | StreamState::Closed => StreamState::Closed,
            StreamState::Reset => StreamState::Reset,
            _ => StreamState::WriteClosed,
        };
    }

    fn mark_reset(&self) {
        *self.inner.state.write().expect("stream lock poisoned") = StreamState::Reset;
    }

    pub fn close_write(&mut self) -> TransportResult<()> {
        self.send
            .finish()
            .map_err(|e| TransportError::Stream(e.to_string()))?;
        self.mark_write_closed();
        Ok(())
    }

    pub fn close_read(&mut self) {
        let _ = self.recv.stop(0u32.into());
        self.mark_read_closed();
    }

    pub fn reset(&mut self, error_code: u32) {
        let _ = self.send.reset(error_code.into());
        self.mark_reset();
    }

    /// Closes both halves: finishes the write side and stops the read side.
    pub fn close(&mut self) -> TransportResult<()> {
        self.close_read();
        self.close_write()
    }
}
