use futures::Stream;
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};
use svcgate::Message;
use svcgate_service::TransportError;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// A decoded reply addressed to one stream id.
#[derive(Debug)]
pub(crate) enum Reply {
    Next(Message),
    Complete,
    Error(Message),
}

enum Pending {
    Single(oneshot::Sender<Result<Message, TransportError>>),
    Stream(mpsc::UnboundedSender<Result<Message, TransportError>>),
}

/// Multiplexes concurrent calls over one connection.
///
/// Each call gets its own stream id. Outbound items are queued to the
/// connection's writer task; the reader task hands decoded replies to
/// [`Session::dispatch`], which routes them to the waiting call.
pub(crate) struct Session<Out> {
    outbound: mpsc::UnboundedSender<Out>,
    pending: Mutex<HashMap<u32, Pending>>,
    next_stream_id: AtomicU32,
    closed: AtomicBool,
    lost: AtomicBool,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    cancel: fn(u32) -> Out,
    address: String,
}

impl<Out: Send + 'static> Session<Out> {
    pub(crate) fn new(
        outbound: mpsc::UnboundedSender<Out>,
        cancel: fn(u32) -> Out,
        address: String,
    ) -> Arc<Self> {
        Arc::new(Self {
            outbound,
            pending: Mutex::new(HashMap::new()),
            next_stream_id: AtomicU32::new(1),
            closed: AtomicBool::new(false),
            lost: AtomicBool::new(false),
            tasks: Mutex::new(Vec::new()),
            cancel,
            address,
        })
    }

    pub(crate) fn attach_task(&self, task: JoinHandle<()>) {
        if self.closed.load(Ordering::Acquire) {
            task.abort();
            return;
        }
        lock(&self.tasks).push(task);
    }

    fn check_open(&self) -> Result<(), TransportError> {
        if self.lost.load(Ordering::Acquire) {
            Err(TransportError::ConnectionLost(format!(
                "connection to {} is no longer open",
                self.address
            )))
        } else if self.closed.load(Ordering::Acquire) {
            Err(TransportError::Closed)
        } else {
            Ok(())
        }
    }

    fn register(self: &Arc<Self>, pending: Pending) -> Result<PendingGuard<Out>, TransportError> {
        let stream_id = {
            let mut entries = lock(&self.pending);
            // Checked under the lock: `fail_all` drains only after the flags are set.
            self.check_open()?;

            // Ids wrap on long-lived connections; 0 is never handed out and a
            // live id is never reused.
            let stream_id = loop {
                let id = self.next_stream_id.fetch_add(1, Ordering::Relaxed);
                if id != 0 && !entries.contains_key(&id) {
                    break id;
                }
            };
            entries.insert(stream_id, pending);
            stream_id
        };

        Ok(PendingGuard {
            session: self.clone(),
            stream_id,
            sent: false,
        })
    }

    fn send(&self, guard: &mut PendingGuard<Out>, item: Out) -> Result<(), TransportError> {
        self.outbound
            .send(item)
            .map_err(|_| TransportError::Closed)?;
        guard.sent = true;
        Ok(())
    }

    /// Sends one request and waits for its single reply.
    ///
    /// `encode` receives the stream id assigned to the call.
    pub(crate) async fn request_response<F>(
        self: &Arc<Self>,
        encode: F,
    ) -> Result<Message, TransportError>
    where
        F: FnOnce(u32) -> Result<Out, TransportError>,
    {
        let (tx, rx) = oneshot::channel();
        let mut guard = self.register(Pending::Single(tx))?;
        let item = encode(guard.stream_id)?;
        self.send(&mut guard, item)?;

        tracing::trace!("Awaiting reply on stream {} to {}", guard.stream_id, self.address);

        rx.await.unwrap_or(Err(TransportError::Closed))
    }

    /// Sends one request and returns the stream of its replies.
    ///
    /// Replies are buffered without bound until the caller polls them. The
    /// reader task serves every call on the connection, so a slow consumer
    /// grows its own buffer instead of stalling the other streams.
    pub(crate) fn request_stream<F>(
        self: &Arc<Self>,
        encode: F,
    ) -> Result<SessionStream<Out>, TransportError>
    where
        F: FnOnce(u32) -> Result<Out, TransportError>,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut guard = self.register(Pending::Stream(tx))?;
        let item = encode(guard.stream_id)?;
        self.send(&mut guard, item)?;

        Ok(SessionStream { rx, _guard: guard })
    }

    /// Routes a reply from the peer to the call waiting on `stream_id`.
    pub(crate) fn dispatch(&self, stream_id: u32, reply: Reply) {
        let mut pending = lock(&self.pending);

        let Some(entry) = pending.remove(&stream_id) else {
            tracing::trace!("Discarding reply for unknown stream {}", stream_id);
            return;
        };

        match (entry, reply) {
            (Pending::Single(tx), Reply::Next(message) | Reply::Error(message)) => {
                let _ = tx.send(Ok(message));
            }
            (Pending::Single(tx), Reply::Complete) => {
                let _ = tx.send(Err(TransportError::Protocol(format!(
                    "stream {stream_id} completed without a reply"
                ))));
            }
            (Pending::Stream(tx), Reply::Next(message)) => {
                if tx.send(Ok(message)).is_ok() {
                    pending.insert(stream_id, Pending::Stream(tx));
                }
            }
            (Pending::Stream(tx), Reply::Error(message)) => {
                let _ = tx.send(Ok(message));
            }
            (Pending::Stream(_), Reply::Complete) => {}
        }
    }

    /// Fails the single call waiting on `stream_id`, leaving the connection
    /// and every other call untouched.
    pub(crate) fn fail(&self, stream_id: u32, error: TransportError) {
        let Some(entry) = lock(&self.pending).remove(&stream_id) else {
            tracing::trace!("Discarding failure for unknown stream {}", stream_id);
            return;
        };

        tracing::debug!("Stream {} to {} failed: {}", stream_id, self.address, error);
        match entry {
            Pending::Single(tx) => {
                let _ = tx.send(Err(error));
            }
            Pending::Stream(tx) => {
                let _ = tx.send(Err(error));
            }
        }
    }

    pub(crate) fn is_open(&self) -> bool {
        self.check_open().is_ok()
    }

    /// Fails every pending call with [`TransportError::Closed`] and stops the
    /// connection tasks.
    pub(crate) fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        tracing::debug!("Closing session to {}", self.address);
        self.fail_all(|| TransportError::Closed);

        for task in lock(&self.tasks).drain(..) {
            task.abort();
        }
    }

    /// Marks the connection as dead after an I/O failure or a peer close.
    pub(crate) fn connection_lost(&self, reason: &str) {
        if self.closed.load(Ordering::Acquire) || self.lost.swap(true, Ordering::AcqRel) {
            return;
        }

        tracing::warn!("Connection to {} lost: {}", self.address, reason);
        self.fail_all(|| TransportError::ConnectionLost(reason.to_owned()));
    }

    fn fail_all(&self, error: impl Fn() -> TransportError) {
        let drained: Vec<_> = lock(&self.pending).drain().collect();

        for (_, entry) in drained {
            match entry {
                Pending::Single(tx) => {
                    let _ = tx.send(Err(error()));
                }
                Pending::Stream(tx) => {
                    let _ = tx.send(Err(error()));
                }
            }
        }
    }
}

/// Removes an abandoned call from the pending map and tells the peer.
struct PendingGuard<Out: Send + 'static> {
    session: Arc<Session<Out>>,
    stream_id: u32,
    sent: bool,
}

impl<Out: Send + 'static> Drop for PendingGuard<Out> {
    fn drop(&mut self) {
        let abandoned = lock(&self.session.pending)
            .remove(&self.stream_id)
            .is_some();

        if abandoned && self.sent && !self.session.closed.load(Ordering::Acquire) {
            tracing::trace!("Cancelling stream {}", self.stream_id);
            let _ = self
                .session
                .outbound
                .send((self.session.cancel)(self.stream_id));
        }
    }
}

/// Replies of one streaming call. Dropping it early cancels the call.
///
/// The buffer behind it is unbounded; memory is held until the items are
/// polled or the stream is dropped.
pub(crate) struct SessionStream<Out: Send + 'static> {
    rx: mpsc::UnboundedReceiver<Result<Message, TransportError>>,
    _guard: PendingGuard<Out>,
}

impl<Out: Send + 'static> Stream for SessionStream<Out> {
    type Item = Result<Message, TransportError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

/// The runtime connection tasks are spawned on.
pub(crate) fn runtime_handle(configured: Option<&Handle>) -> Result<Handle, TransportError> {
    match configured {
        Some(handle) => Ok(handle.clone()),
        None => Handle::try_current()
            .map_err(|_| TransportError::Unsupported("connecting outside a tokio runtime")),
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
