//! # Pushlet Client
//!
//! An asynchronous client for the Pushlet long-polling publish/subscribe
//! protocol.
//!
//! ## Overview
//!
//! A Pushlet server keeps one session per client. The client joins, starts
//! listening, subscribes to subjects, and receives events through a chain of
//! long polls that the server paces with `refresh` events. This crate
//! provides:
//! - A session state machine that parks commands until the session can take them
//! - Event routing to per-kind handlers with a catch-all
//! - Automatic long-poll renewal driven by the server's `p_wait`
//! - Query-string and XML helpers for the wire format
//!
//! ## Request/response shape
//!
//! ```text
//! GET pushlet.srv?p_event=join-listen&p_format=xml-strict&p_mode=pull&p_subject=/temperature
//!
//! <pushlet>
//!   <event p_event="join-listen-ack" p_id="S123"/>
//!   <event p_event="refresh" p_wait="3000"/>
//! </pushlet>
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pushlet_client::{ClientConfig, EventKind, PushletClient};
//!
//! # async fn run() -> pushlet_client::Result<()> {
//! let config = ClientConfig {
//!     origin: Some("http://localhost:8080/pushlet/".into()),
//!     ..ClientConfig::default()
//! };
//! let client = PushletClient::new(config)?;
//!
//! client.on(EventKind::Data, |event| {
//!     println!("{} -> {:?}", event.subject().unwrap_or_default(), event.field("value"));
//! });
//! client.initialize();
//!
//! // Parked until the join-listen ack arrives.
//! client.join_listen(Some("/temperature"), None);
//! client.subscribe("/stocks", Some("ticker"));
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod command;
pub mod config;
pub mod error;
pub mod event;
pub mod protocol;
pub mod query;
pub mod router;
pub mod scheduler;
pub mod session;
pub mod transport;

#[cfg(test)]
mod test_helpers;

pub use client::{PushletClient, WeakPushletClient};
pub use command::{Command, Precondition, Request};
pub use config::{ClientConfig, load_config};
pub use error::{PushletError, Result};
pub use event::Event;
pub use protocol::EventKind;
pub use query::{ParsedQuery, Query, parse_query};
pub use router::{Handler, Handlers};
pub use session::SessionState;
pub use transport::{HttpTransport, Transport};
