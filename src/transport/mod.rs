//! Message-oriented TCP transport
//!
//! A [`MessageServer`] accepts connections and a [`MessageClient`] connects
//! to one. Both sides exchange frames in the [`protocol`](crate::protocol)
//! format and report what happens through an event channel returned from
//! `start`/`connect`:
//!
//! ```no_run
//! use tcp_messaging_tester::transport::{ClientEvent, ClientSettings, MessageClient};
//! use tcp_messaging_tester::types::Endpoint;
//!
//! # async fn demo() -> tcp_messaging_tester::Result<()> {
//! let settings = ClientSettings::new(Endpoint::parse("127.0.0.1:9000")?);
//! let (client, mut events) = MessageClient::connect(settings).await?;
//! client.send(b"hello").await?;
//! while let Some(event) = events.recv().await {
//!     if let ClientEvent::MessageReceived(message) = event {
//!         println!("{} bytes", message.len());
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod connection;
pub mod events;
pub mod keepalive;
pub mod server;
pub mod settings;
pub mod stream;
pub mod sync;

pub use client::MessageClient;
pub use connection::{ConnectionStatistics, StatisticsSnapshot};
pub use events::{ClientEvent, ClientMetadata, DisconnectReason, ServerEvent};
pub use keepalive::KeepaliveSettings;
pub use server::MessageServer;
pub use settings::{ClientSettings, ServerSettings};
pub use stream::IncomingStream;
pub use sync::{EchoHandler, SyncRequest, SyncRequestHandler, SyncResponse};
