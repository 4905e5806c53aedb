//! Asterisk Manager Interface (AMI) client for Rust
//!
//! This crate provides an async client for Asterisk's Manager Interface,
//! the line-oriented TCP protocol on port 5038 used to send actions to
//! Asterisk and receive its responses and events.
//!
//! # Architecture
//!
//! - [`AmiAdapter`] (Clone + Send) owns one connection, logs in automatically
//!   and sends actions from any task
//! - [`AmiEventStream`] receives [`AmiEvent`]s published by the background
//!   reader task: lifecycle notifications and every decoded message
//! - [`FrameDecoder`] turns arbitrary socket chunks into [`AmiMessage`]s
//!
//! Each action carries an `ActionID`; the response with the same ID completes
//! the action's callback, or the callback fails after the configured TTL.
//!
//! # Examples
//!
//! ## Request / Response
//!
//! ```rust,no_run
//! use asterisk_ami_tokio::{AmiAction, AmiAdapter, AmiConfig, ConnectionState};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let adapter = AmiAdapter::new(AmiConfig::new("localhost", 5038, "admin", "secret"))?;
//!     adapter.connect();
//!     adapter
//!         .state_changes()
//!         .wait_for(|s| *s == ConnectionState::Ready)
//!         .await?;
//!
//!     let reply = adapter.request(AmiAction::new("CoreStatus")).await?;
//!     println!("Calls: {}", reply.get("CoreCurrentCalls").unwrap_or("?"));
//!
//!     adapter.disconnect().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Events
//!
//! ```rust,no_run
//! use asterisk_ami_tokio::{AmiAdapter, AmiConfig, AmiEvent};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = AmiConfig {
//!         events: true,
//!         reconnect: true,
//!         ..AmiConfig::new("localhost", 5038, "admin", "secret")
//!     };
//!     let adapter = AmiAdapter::new(config)?;
//!     let mut events = adapter.subscribe();
//!     adapter.connect();
//!
//!     while let Some(Ok(event)) = events.recv().await {
//!         if let AmiEvent::Data(message) = event {
//!             println!("{:?}: {}", message.event(), message.to_json());
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Actions
//!
//! ```rust
//! use asterisk_ami_tokio::AmiAction;
//!
//! let originate = AmiAction::new("Originate")
//!     .set("Channel", "PJSIP/100")
//!     .set("Context", "default")
//!     .set("Exten", "200")
//!     .set("Priority", "1")
//!     .variable("CALLERID", "42")
//!     .with_action_id("call-1");
//!
//! let wire = originate.to_wire_format().unwrap();
//! assert!(wire.starts_with("Action: Originate\r\n"));
//! assert!(wire.contains("Variable: CALLERID=42\r\n"));
//! assert!(wire.ends_with("\r\n\r\n"));
//! ```

#[macro_use]
mod macros;

pub mod action;
pub mod config;
pub mod connection;
pub mod constants;
pub mod encoding;
pub mod error;
pub mod headers;
pub mod message;
pub mod notification;
pub mod protocol;
pub mod sink;

pub(crate) mod buffer;
pub(crate) mod correlation;

pub use action::{ActionValue, AmiAction};
pub use config::AmiConfig;
pub use connection::{AmiAdapter, ConnectionState};
pub use constants::DEFAULT_AMI_PORT;
pub use correlation::ActionCallback;
pub use encoding::{ParseEncodingError, TransportEncoding};
pub use error::{AmiError, AmiResult};
pub use headers::{AmiHeader, ParseAmiHeaderError};
pub use message::AmiMessage;
pub use notification::{AmiEvent, AmiEventKind, AmiEventStream, ParseEventKindError};
pub use protocol::FrameDecoder;
pub use sink::{LogLevel, LogSink, ParseLogLevelError};
