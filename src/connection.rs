//! Connection management for AMI

use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures_util::FutureExt;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{oneshot, watch, Mutex};
use tokio::time::timeout;
use tracing::{debug, error, info, trace, warn};

use crate::{
    action::AmiAction,
    config::AmiConfig,
    constants::SOCKET_BUF_SIZE,
    correlation::{ActionCallback, CorrelationTable},
    error::{AmiError, AmiResult},
    message::AmiMessage,
    notification::{AmiEvent, AmiEventStream, NotificationHub},
    protocol::FrameDecoder,
    sink::{LogLevel, LogSink},
};

/// Lifecycle state of the adapter's single connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ConnectionState {
    /// No socket and no connect attempt scheduled.
    Idle,
    /// TCP connect in progress.
    Connecting,
    /// Connected, login sent, waiting for its response.
    Authenticating,
    /// Logged in; `send_action` is accepted.
    Ready,
    /// Logoff sent or socket closed; waiting for teardown to finish.
    Closing,
    /// Socket closed, waiting out the reconnect delay.
    Reconnecting,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Idle => "idle",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Authenticating => "authenticating",
            ConnectionState::Ready => "ready",
            ConnectionState::Closing => "closing",
            ConnectionState::Reconnecting => "reconnecting",
        };
        f.write_str(name)
    }
}

/// Establish a TCP connection with a timeout.
async fn tcp_connect_with_timeout(host: &str, port: u16, limit: Duration) -> AmiResult<TcpStream> {
    match timeout(limit, TcpStream::connect((host, port))).await {
        Ok(Ok(s)) => {
            debug!("[CONNECT] TCP connection established");
            Ok(s)
        }
        Ok(Err(e)) => {
            warn!("[CONNECT] TCP connect failed: {}", e);
            Err(AmiError::from(e))
        }
        Err(_) => {
            warn!("[CONNECT] TCP connect timed out after {}ms", limit.as_millis());
            Err(AmiError::Connection {
                message: format!("connect timed out after {}ms", limit.as_millis()),
            })
        }
    }
}

/// Read one chunk. `None` when the idle timeout elapsed first.
async fn read_chunk(
    reader: &mut OwnedReadHalf,
    buf: &mut [u8],
    idle: Option<Duration>,
) -> Option<std::io::Result<usize>> {
    match idle {
        Some(limit) => timeout(limit, reader.read(buf))
            .await
            .ok(),
        None => Some(reader.read(buf).await),
    }
}

/// Write a whole payload. Returns `true` when the kernel buffer was full and
/// the remainder had to wait before being flushed.
async fn write_payload(writer: &mut OwnedWriteHalf, bytes: &[u8]) -> std::io::Result<bool> {
    let written = match writer.try_write(bytes) {
        Ok(n) => n,
        Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => 0,
        Err(e) => return Err(e),
    };
    if written == bytes.len() {
        return Ok(false);
    }
    trace!(
        "[SEND] Backpressure after {} of {} bytes",
        written,
        bytes.len()
    );
    writer
        .write_all(&bytes[written..])
        .await?;
    Ok(true)
}

/// Resolves once `flag` turns true.
async fn raised(flag: &mut watch::Receiver<bool>) {
    let _ = flag
        .wait_for(|raised| *raised)
        .await;
}

/// State shared between adapter handles and the connection task
struct Shared {
    config: AmiConfig,
    reconnect: AtomicBool,
    writer: Mutex<Option<OwnedWriteHalf>>,
    pending: CorrelationTable,
    hub: NotificationHub,
    state_tx: watch::Sender<ConnectionState>,
    /// Fired by `destroy()` to drop the current socket without logoff
    kill_switch: StdMutex<Option<oneshot::Sender<()>>>,
    /// Raised on teardown; in-flight writes give up the writer lock
    write_abort: watch::Sender<bool>,
    log_sink: Option<Arc<dyn LogSink>>,
}

impl Shared {
    fn state(&self) -> ConnectionState {
        *self
            .state_tx
            .borrow()
    }

    fn set_state(&self, state: ConnectionState) {
        let prev = self
            .state_tx
            .send_replace(state);
        if prev != state {
            debug!("[STATE] {} -> {}", prev, state);
        }
    }

    fn kill_switch(&self) -> MutexGuard<'_, Option<oneshot::Sender<()>>> {
        self.kill_switch
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Store a fresh kill switch for the next session and return its receiver.
    fn arm_kill_switch(&self) -> oneshot::Receiver<()> {
        let (tx, rx) = oneshot::channel();
        *self.kill_switch() = Some(tx);
        rx
    }

    /// Fire the kill switch of the current session, if any.
    fn fire_kill_switch(&self) -> bool {
        let Some(kill) = self
            .kill_switch()
            .take()
        else {
            return false;
        };
        let _ = kill.send(());
        true
    }

    /// Write unless teardown begins first. `None` when aborted.
    async fn write_or_abort(
        &self,
        writer: &mut OwnedWriteHalf,
        bytes: &[u8],
    ) -> Option<std::io::Result<bool>> {
        let mut abort = self
            .write_abort
            .subscribe();
        tokio::select! {
            biased;
            _ = raised(&mut abort) => None,
            res = write_payload(writer, bytes) => Some(res),
        }
    }

    /// Log through tracing and the optional sink.
    fn log(&self, level: LogLevel, text: &str) {
        match level {
            LogLevel::Info => info!("{}", text),
            LogLevel::Warn => warn!("{}", text),
            LogLevel::Error => error!("{}", text),
        }
        self.sink(level, text);
    }

    /// Sink only; the caller logs to tracing at its own level.
    fn sink(&self, level: LogLevel, text: &str) {
        if let Some(sink) = &self.log_sink {
            sink.write(level, text);
        }
    }

    fn publish(&self, event: AmiEvent) {
        self.hub
            .publish(event);
    }

    /// Encode, register and write one action.
    async fn dispatch(
        &self,
        mut action: AmiAction,
        callback: Option<ActionCallback>,
    ) -> AmiResult<String> {
        let action_id = action.ensure_action_id();
        let payload = match action.to_wire_format() {
            Ok(p) => p,
            Err(e) => {
                self.log(
                    LogLevel::Error,
                    &format!("Rejected action {}: {}", action.action(), e),
                );
                return Err(e);
            }
        };
        let bytes = self
            .config
            .encoding
            .encode(&payload);

        let mut guard = self
            .writer
            .lock()
            .await;
        let closing = self.state() == ConnectionState::Closing;
        let writer = match guard.as_mut() {
            Some(w) if !closing => w,
            _ => {
                self.log(LogLevel::Error, "cannot write to Asterisk socket");
                self.publish(AmiEvent::SocketUnwritable);
                return Err(AmiError::Unwritable);
            }
        };

        debug!("[SEND] {} ({} bytes)", action.action(), bytes.len());
        if self
            .log_sink
            .is_some()
        {
            self.sink(LogLevel::Info, "----- START SEND ----");
            self.sink(LogLevel::Info, &action.redacted());
        }

        if let Some(callback) = callback {
            if !self
                .pending
                .register(action_id.clone(), callback, self.config.action_ttl())
            {
                return Err(AmiError::DuplicateActionId { action_id });
            }
        }

        let result = self
            .write_or_abort(writer, &bytes)
            .await;
        drop(guard);

        match result {
            None => {
                debug!("[SEND] Write of {} aborted by teardown", action_id);
                self.pending
                    .reject(&action_id, AmiError::ConnectionClosed);
                Err(AmiError::ConnectionClosed)
            }
            Some(Ok(backpressured)) => {
                self.sink(LogLevel::Info, "----- END SEND ----");
                if backpressured {
                    self.log(LogLevel::Warn, "DRAIN. Asterisk Socket connection drained");
                    self.publish(AmiEvent::SocketDrain);
                }
                Ok(action_id)
            }
            Some(Err(e)) => {
                let err = AmiError::from(e);
                self.log(
                    LogLevel::Error,
                    &format!("ERROR. Write to Asterisk Socket failed: {}", err),
                );
                self.pending
                    .reject(&action_id, err.clone());
                self.publish(AmiEvent::SocketError(err.to_string()));
                Err(err)
            }
        }
    }

    /// Callback for the automatic login action.
    fn login_callback(self: &Arc<Self>) -> ActionCallback {
        let shared = Arc::clone(self);
        Box::new(move |outcome| match outcome {
            Ok(message) => {
                let promoted = shared
                    .state_tx
                    .send_if_modified(|s| {
                        if *s == ConnectionState::Authenticating {
                            *s = ConnectionState::Ready;
                            true
                        } else {
                            false
                        }
                    });
                if promoted {
                    shared.log(LogLevel::Info, "Login accepted");
                    shared.publish(AmiEvent::Login(message));
                } else {
                    debug!("[AUTH] Login response after leaving authenticating state");
                }
            }
            Err(AmiError::ConnectionClosed) => {
                debug!("[AUTH] Connection closed before login completed");
            }
            Err(e) => {
                shared.log(LogLevel::Error, &format!("Login failed: {}", e));
                shared.publish(AmiEvent::SocketError(e.to_string()));
            }
        })
    }

    /// Resolve pending requests and publish every decoded message.
    fn route(&self, messages: Vec<AmiMessage>) {
        if messages.is_empty() {
            return;
        }
        self.sink(LogLevel::Info, "----- NEW DATA ----");
        for message in messages {
            let json = message.to_json();
            debug!("[RECV] {}", json);
            self.sink(LogLevel::Info, &json);

            if self
                .pending
                .resolve(&message)
            {
                trace!("[RECV] Resolved pending action");
            }
            self.publish(AmiEvent::Data(message));
        }
        self.sink(LogLevel::Info, "----- END DATA ----");
    }

    /// Tear down after a socket lifetime ended.
    async fn close_session(&self, had_error: bool) {
        self.kill_switch()
            .take();
        self.write_abort
            .send_replace(true);
        self.writer
            .lock()
            .await
            .take();
        self.set_state(ConnectionState::Closing);

        self.log(
            LogLevel::Warn,
            &format!(
                "CLOSE. Asterisk Socket connection closed, hadError - {}",
                had_error
            ),
        );
        self.publish(AmiEvent::SocketClose { had_error });
        self.pending
            .fail_all(AmiError::ConnectionClosed);
    }
}

/// One socket lifetime: connect, login, read until the socket ends.
/// Returns whether it ended with an error.
///
/// `kill_rx` must already be armed in `Shared::kill_switch`, so a `destroy()`
/// or `disconnect()` issued before this runs still ends the session.
async fn run_session(shared: &Arc<Shared>, mut kill_rx: oneshot::Receiver<()>) -> bool {
    let config = &shared.config;
    shared.log(
        LogLevel::Info,
        &format!("Connecting to Asterisk host {}:{}", config.host, config.port),
    );

    let connected = tokio::select! {
        biased;
        _ = &mut kill_rx => {
            shared.log(LogLevel::Info, "Connect attempt aborted");
            return false;
        }
        res = tcp_connect_with_timeout(&config.host, config.port, config.connect_timeout()) => res,
    };
    let stream = match connected {
        Ok(s) => s,
        Err(e) => {
            shared.log(
                LogLevel::Error,
                &format!("ERROR. Asterisk Socket connection error, error was: {}", e),
            );
            shared.publish(AmiEvent::SocketError(e.to_string()));
            return true;
        }
    };
    if let Err(e) = stream.set_nodelay(true) {
        debug!("[CONNECT] set_nodelay failed: {}", e);
    }

    let (mut reader, writer) = stream.into_split();
    {
        // disconnect() inspects the state under this lock
        let mut slot = shared
            .writer
            .lock()
            .await;
        if kill_rx
            .try_recv()
            .is_ok()
        {
            shared.log(LogLevel::Info, "Connect attempt aborted");
            return false;
        }
        *slot = Some(writer);
        shared
            .write_abort
            .send_replace(false);
        shared.set_state(ConnectionState::Authenticating);
    }
    shared.publish(AmiEvent::Connect);

    let login = AmiAction::login(&config.username, &config.secret, config.events);
    if let Err(e) = shared
        .dispatch(login, Some(shared.login_callback()))
        .await
    {
        debug!("[AUTH] Login not sent: {}", e);
    }

    let mut decoder = FrameDecoder::new(config.encoding);
    let mut read_buffer = vec![0u8; SOCKET_BUF_SIZE];
    let idle = config.idle_timeout();

    loop {
        let read = tokio::select! {
            biased;
            _ = &mut kill_rx => {
                shared.log(LogLevel::Info, "destroy");
                return false;
            }
            read = read_chunk(&mut reader, &mut read_buffer, idle) => read,
        };

        match read {
            None => {
                shared.log(
                    LogLevel::Warn,
                    "TIMEOUT. Asterisk Socket connection has timed out",
                );
                shared.publish(AmiEvent::SocketTimeout);
            }
            Some(Ok(0)) => {
                shared.log(LogLevel::Info, "END. Asterisk Socket connection ran end event");
                shared.publish(AmiEvent::SocketEnd);
                return false;
            }
            Some(Ok(n)) => {
                trace!("[RECV] Read {} bytes from socket", n);
                match decoder.decode(&read_buffer[..n]) {
                    Ok(messages) => shared.route(messages),
                    Err(e) => {
                        shared.log(LogLevel::Error, &format!("ERROR. {}", e));
                        shared.publish(AmiEvent::SocketError(e.to_string()));
                        return true;
                    }
                }
            }
            Some(Err(e)) => {
                shared.log(
                    LogLevel::Error,
                    &format!("ERROR. Asterisk Socket connection error, error was: {}", e),
                );
                shared.publish(AmiEvent::SocketError(e.to_string()));
                return true;
            }
        }
    }
}

/// Drive sessions until the socket closes with reconnect disabled.
async fn connection_loop(shared: Arc<Shared>, mut kill_rx: oneshot::Receiver<()>) {
    loop {
        let had_error = run_session(&shared, kill_rx).await;
        shared
            .close_session(had_error)
            .await;

        if !shared
            .reconnect
            .load(Ordering::SeqCst)
        {
            shared.set_state(ConnectionState::Idle);
            return;
        }

        let delay = shared
            .config
            .reconnect_delay();
        shared.set_state(ConnectionState::Reconnecting);
        shared.log(
            LogLevel::Info,
            &format!("Reconnecting to Asterisk after {}ms", delay.as_millis()),
        );
        tokio::time::sleep(delay).await;

        // Arm before the flag check: a disconnect() landing in between
        // either clears the flag first or finds the switch to fire.
        kill_rx = shared.arm_kill_switch();
        if !shared
            .reconnect
            .load(Ordering::SeqCst)
        {
            shared.kill_switch()
                .take();
            shared.log(LogLevel::Info, "Reconnect cancelled by disconnect");
            shared.set_state(ConnectionState::Idle);
            return;
        }
        shared.set_state(ConnectionState::Connecting);
    }
}

/// Panic guard around the connection loop.
async fn connection_task(shared: Arc<Shared>, kill_rx: oneshot::Receiver<()>) {
    let result = AssertUnwindSafe(connection_loop(shared.clone(), kill_rx));
    if result
        .catch_unwind()
        .await
        .is_err()
    {
        error!("connection task panicked");
        shared.kill_switch()
            .take();
        shared
            .write_abort
            .send_replace(true);
        shared
            .writer
            .lock()
            .await
            .take();
        shared.publish(AmiEvent::SocketError(
            "connection task panicked".to_string(),
        ));
        shared.publish(AmiEvent::SocketClose { had_error: true });
        shared
            .pending
            .fail_all(AmiError::ConnectionClosed);
        shared.set_state(ConnectionState::Idle);
    }
}

/// AMI adapter handle (Clone + Send + Sync)
///
/// Owns at most one TCP connection to Asterisk. A background task reads the
/// socket, decodes frames, completes pending actions and publishes
/// [`AmiEvent`]s; handles send actions and control the lifecycle.
#[derive(Clone)]
pub struct AmiAdapter {
    shared: Arc<Shared>,
}

impl fmt::Debug for AmiAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AmiAdapter")
            .field("host", &self.shared.config.host)
            .field("port", &self.shared.config.port)
            .field("state", &self.state())
            .field("pending", &self.pending_count())
            .field("subscribers", &self.shared.hub.subscriber_count())
            .finish()
    }
}

impl AmiAdapter {
    /// Create an idle adapter. Fails on invalid configuration.
    pub fn new(config: AmiConfig) -> AmiResult<Self> {
        Self::build(config, None)
    }

    /// Create an idle adapter that also reports its debug log to `sink`.
    pub fn with_log_sink(config: AmiConfig, sink: Arc<dyn LogSink>) -> AmiResult<Self> {
        Self::build(config, Some(sink))
    }

    fn build(config: AmiConfig, log_sink: Option<Arc<dyn LogSink>>) -> AmiResult<Self> {
        config.validate()?;
        let (state_tx, _) = watch::channel(ConnectionState::Idle);
        let (write_abort, _) = watch::channel(false);
        let shared = Shared {
            reconnect: AtomicBool::new(config.reconnect),
            writer: Mutex::new(None),
            pending: CorrelationTable::new(),
            hub: NotificationHub::new(config.event_queue_size),
            state_tx,
            kill_switch: StdMutex::new(None),
            write_abort,
            log_sink,
            config,
        };
        Ok(Self {
            shared: Arc::new(shared),
        })
    }

    /// Start connecting in the background. Must be called inside a tokio runtime.
    ///
    /// Ignored unless the adapter is [`Idle`](ConnectionState::Idle), so at most
    /// one socket exists per adapter. Progress is reported through
    /// [`subscribe`](Self::subscribe) and [`state_changes`](Self::state_changes).
    pub fn connect(&self) {
        let shared = &self.shared;
        let mut armed = None;
        // Arming under the state lock makes the switch visible to
        // disconnect()/destroy() as soon as the state reads Connecting.
        shared
            .state_tx
            .send_if_modified(|s| {
                if *s == ConnectionState::Idle {
                    *s = ConnectionState::Connecting;
                    armed = Some(shared.arm_kill_switch());
                    true
                } else {
                    false
                }
            });
        let Some(kill_rx) = armed else {
            warn!("connect() ignored in state {}", self.state());
            return;
        };
        debug!("[CONNECT] state -> {}", ConnectionState::Connecting);
        tokio::spawn(connection_task(shared.clone(), kill_rx));
    }

    /// Disable reconnect and close gracefully: write `Logoff`, then shut down
    /// the write side and let Asterisk close the socket.
    ///
    /// A connect attempt still in progress is abandoned. Never fails; write
    /// errors are logged.
    pub async fn disconnect(&self) {
        let shared = &self.shared;
        shared
            .reconnect
            .store(false, Ordering::SeqCst);

        let mut guard = shared
            .writer
            .lock()
            .await;
        let Some(writer) = guard.as_mut() else {
            if shared.fire_kill_switch() {
                shared.log(LogLevel::Info, "disconnect");
            }
            return;
        };
        if shared.state() == ConnectionState::Closing {
            return;
        }

        shared.log(LogLevel::Info, "disconnect");
        shared.set_state(ConnectionState::Closing);

        if let Ok(payload) = AmiAction::logoff().to_wire_format() {
            let bytes = shared
                .config
                .encoding
                .encode(&payload);
            match shared
                .write_or_abort(writer, &bytes)
                .await
            {
                None => {
                    debug!("[CLOSE] Logoff write aborted by teardown");
                    return;
                }
                Some(Err(e)) => warn!("[CLOSE] Logoff write failed: {}", e),
                Some(Ok(_)) => {}
            }
        }
        if let Err(e) = writer
            .shutdown()
            .await
        {
            warn!("[CLOSE] Shutdown failed: {}", e);
        }
    }

    /// Drop the socket immediately, without logoff.
    ///
    /// The reconnect flag is left as is, so an adapter configured to reconnect
    /// will do so after the delay. No-op without a socket or connect attempt.
    pub fn destroy(&self) {
        let shared = &self.shared;
        let Some(kill) = shared
            .kill_switch()
            .take()
        else {
            return;
        };
        shared.log(LogLevel::Info, "destroy");
        // Release a write stuck on a peer that stopped reading, so the
        // connection task can take the writer and close.
        shared
            .write_abort
            .send_replace(true);
        let _ = kill.send(());
    }

    /// Send an action once the adapter is [`Ready`](ConnectionState::Ready).
    ///
    /// Returns the ActionID used (generated if the action had none), or `None`
    /// when the action was not sent: not ready, socket unwritable (also
    /// published as [`AmiEvent::SocketUnwritable`]), or invalid. In those cases
    /// the callback is not registered. Otherwise the callback runs exactly once:
    /// with the response, a failure, a timeout after the configured TTL, or
    /// [`AmiError::ConnectionClosed`].
    pub async fn send_action(
        &self,
        action: AmiAction,
        callback: Option<ActionCallback>,
    ) -> Option<String> {
        match self
            .submit(action, callback)
            .await
        {
            Ok(action_id) => Some(action_id),
            Err(e) => {
                debug!("[SEND] Action not sent: {}", e);
                None
            }
        }
    }

    /// Send an action and wait for its outcome.
    ///
    /// Same delivery rules as [`send_action`](Self::send_action), with the
    /// reasons for not sending returned as errors.
    ///
    /// ```rust,no_run
    /// use asterisk_ami_tokio::{AmiAction, AmiAdapter, AmiConfig, AmiError};
    ///
    /// # async fn example(adapter: &AmiAdapter) -> Result<(), AmiError> {
    /// let reply = adapter.request(AmiAction::new("CoreStatus")).await?;
    /// println!("{:?}", reply.get("CoreCurrentCalls"));
    /// # Ok(())
    /// # }
    /// ```
    pub async fn request(&self, action: AmiAction) -> AmiResult<AmiMessage> {
        let (tx, rx) = oneshot::channel();
        let callback: ActionCallback = Box::new(move |outcome| {
            let _ = tx.send(outcome);
        });
        self.submit(action, Some(callback))
            .await?;
        rx.await
            .unwrap_or(Err(AmiError::ConnectionClosed))
    }

    async fn submit(
        &self,
        action: AmiAction,
        callback: Option<ActionCallback>,
    ) -> AmiResult<String> {
        if !self.is_ready() {
            self.shared
                .log(LogLevel::Error, "Connection is not established");
            return Err(AmiError::NotReady);
        }
        self.shared
            .dispatch(action, callback)
            .await
    }

    /// New subscriber for events published from now on.
    pub fn subscribe(&self) -> AmiEventStream {
        self.shared
            .hub
            .subscribe()
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.state()
    }

    pub fn is_ready(&self) -> bool {
        self.state() == ConnectionState::Ready
    }

    /// Watch receiver for state transitions.
    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.shared
            .state_tx
            .subscribe()
    }

    /// Actions still waiting for their response.
    pub fn pending_count(&self) -> usize {
        self.shared
            .pending
            .len()
    }

    pub fn reconnect_enabled(&self) -> bool {
        self.shared
            .reconnect
            .load(Ordering::SeqCst)
    }

    pub fn config(&self) -> &AmiConfig {
        &self.shared.config
    }
}
