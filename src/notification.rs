//! Lifecycle and data notifications published by the adapter

use tokio::sync::broadcast;
use tracing::{trace, warn};

use crate::{error::AmiError, message::AmiMessage};

/// Error returned when parsing an unknown notification name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseEventKindError(pub String);

impl std::fmt::Display for ParseEventKindError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unknown AMI notification: {}", self.0)
    }
}

impl std::error::Error for ParseEventKindError {}

define_wire_enum! {
    error_type: ParseEventKindError,
    /// Payload-free tag of an [`AmiEvent`], with its conventional name.
    pub enum AmiEventKind {
        Connect => "ami_connect",
        Login => "ami_login",
        Data => "ami_data",
        SocketDrain => "ami_socket_drain",
        SocketError => "ami_socket_error",
        SocketTimeout => "ami_socket_timeout",
        SocketEnd => "ami_socket_end",
        SocketClose => "ami_socket_close",
        SocketUnwritable => "ami_socket_unwritable",
    }
}

/// Notification delivered to every subscriber, in socket arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum AmiEvent {
    /// TCP connection established; login is being sent.
    Connect,
    /// Login accepted; the adapter is ready for actions.
    Login(AmiMessage),
    /// Every decoded message, whether or not it answered a pending action.
    Data(AmiMessage),
    /// A write that hit backpressure has been flushed.
    SocketDrain,
    /// Socket failure or rejected login.
    SocketError(String),
    /// No inbound bytes for the configured idle timeout. The socket stays open.
    SocketTimeout,
    /// The peer closed its side of the connection.
    SocketEnd,
    /// The socket is gone.
    SocketClose { had_error: bool },
    /// An action was dropped because the socket was not writable.
    SocketUnwritable,
}

impl AmiEvent {
    pub fn kind(&self) -> AmiEventKind {
        match self {
            AmiEvent::Connect => AmiEventKind::Connect,
            AmiEvent::Login(_) => AmiEventKind::Login,
            AmiEvent::Data(_) => AmiEventKind::Data,
            AmiEvent::SocketDrain => AmiEventKind::SocketDrain,
            AmiEvent::SocketError(_) => AmiEventKind::SocketError,
            AmiEvent::SocketTimeout => AmiEventKind::SocketTimeout,
            AmiEvent::SocketEnd => AmiEventKind::SocketEnd,
            AmiEvent::SocketClose { .. } => AmiEventKind::SocketClose,
            AmiEvent::SocketUnwritable => AmiEventKind::SocketUnwritable,
        }
    }

    /// The decoded message carried by `Login` and `Data`.
    pub fn message(&self) -> Option<&AmiMessage> {
        match self {
            AmiEvent::Login(m) | AmiEvent::Data(m) => Some(m),
            _ => None,
        }
    }
}

/// Fan-out point for [`AmiEvent`]s.
///
/// Each subscriber has its own bounded queue; a slow subscriber loses its
/// oldest events without affecting the others or the connection.
#[derive(Debug, Clone)]
pub(crate) struct NotificationHub {
    tx: broadcast::Sender<AmiEvent>,
}

impl NotificationHub {
    pub(crate) fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub(crate) fn publish(&self, event: AmiEvent) {
        let kind = event.kind();
        match self
            .tx
            .send(event)
        {
            Ok(n) => trace!("[NOTIFY] {} delivered to {} subscribers", kind, n),
            Err(_) => trace!("[NOTIFY] {} dropped, no subscribers", kind),
        }
    }

    pub(crate) fn subscribe(&self) -> AmiEventStream {
        AmiEventStream {
            rx: self
                .tx
                .subscribe(),
            dropped: 0,
        }
    }

    pub(crate) fn subscriber_count(&self) -> usize {
        self.tx
            .receiver_count()
    }
}

/// One subscriber's view of the notifications (!Clone).
///
/// Sees only events published after it subscribed.
pub struct AmiEventStream {
    rx: broadcast::Receiver<AmiEvent>,
    dropped: u64,
}

impl std::fmt::Debug for AmiEventStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AmiEventStream")
            .field("dropped", &self.dropped)
            .finish()
    }
}

impl AmiEventStream {
    /// Next notification, or `None` once the adapter is gone.
    ///
    /// Returns `Err(AmiError::Lagged)` once per overflow episode when this
    /// subscriber fell behind; later calls return the events that survived.
    pub async fn recv(&mut self) -> Option<Result<AmiEvent, AmiError>> {
        match self
            .rx
            .recv()
            .await
        {
            Ok(event) => Some(Ok(event)),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!("Notification stream lagged, {} events dropped", skipped);
                self.dropped += skipped;
                Some(Err(AmiError::Lagged { skipped }))
            }
            Err(broadcast::error::RecvError::Closed) => None,
        }
    }

    /// Non-blocking variant of [`recv`](Self::recv); `None` when nothing is queued.
    pub fn try_recv(&mut self) -> Option<Result<AmiEvent, AmiError>> {
        match self
            .rx
            .try_recv()
        {
            Ok(event) => Some(Ok(event)),
            Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                self.dropped += skipped;
                Some(Err(AmiError::Lagged { skipped }))
            }
            Err(_) => None,
        }
    }

    /// Total events this subscriber missed.
    pub fn dropped_event_count(&self) -> u64 {
        self.dropped
    }
}
