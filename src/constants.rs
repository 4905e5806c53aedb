//! Protocol constants and configuration defaults

/// Default Asterisk Manager Interface port
pub const DEFAULT_AMI_PORT: u16 = 5038;

/// Greeting line prefix sent once by Asterisk right after the TCP connect
pub const BANNER_PREFIX: &str = "Asterisk Call Manager";

/// Protocol line terminator
pub const LINE_TERMINATOR: &str = "\r\n";

/// Frame terminator: a blank line after the last `Key: Value` line
pub const FRAME_TERMINATOR: &str = "\r\n\r\n";

/// Separator between a field name and its value
pub const FIELD_SEPARATOR: &str = ": ";

/// Separator inside `Variable` sub-entries (`name=value`)
pub const VARIABLE_SEPARATOR: char = '=';

/// Socket read size (64KB)
pub const SOCKET_BUF_SIZE: usize = 64 * 1024;

/// Maximum unconsumed buffer size (16MB). AMI frames are a few KB at most;
/// hitting this means the peer is not speaking AMI.
pub const MAX_BUFFER_SIZE: usize = 16 * 1024 * 1024;

/// Pending-request lifetime in milliseconds
pub const DEFAULT_ACTION_TTL_MS: u64 = 10_000;

/// Delay before a reconnect attempt in milliseconds
pub const DEFAULT_RECONNECT_DELAY_MS: u64 = 5_000;

/// TCP connect timeout in milliseconds
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 10_000;

/// Capacity of each subscriber's notification queue
pub const MAX_EVENT_QUEUE_SIZE: usize = 1000;

/// Response value that resolves a pending request successfully
pub const RESPONSE_SUCCESS: &str = "Success";
