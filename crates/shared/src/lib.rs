//! ReelNexus Shared - wire protocol between the slot client and the game authority.
//!
//! Pure data types and serialization, no business logic:
//! - `requests` / `responses`: the three logical RPCs (spin, balance, game state)
//! - `envelope`: `{id, type, data}` request and `{id, success|error, data}` reply
//!   envelopes used by the correlated transports, plus server push events
//! - `messages`: websocket client/server messages, including the session handshake
//! - `poll`: HTTP event-poll page

pub mod envelope;
pub mod messages;
pub mod poll;
pub mod requests;
pub mod responses;

pub use envelope::{PushEvent, ReplyEnvelope, RequestEnvelope, WorkerInbound};
pub use messages::{ClientMessage, ServerFault, ServerMessage, SessionData};
pub use poll::EventsPage;
pub use requests::{PlayerQuery, RequestKind, RequestPayload, SpinContext, SpinRequest};
pub use responses::{BalanceResponse, GameStateResponse, SpinResponse, SpinResult};

/// Failure to move a payload in or out of an envelope.
#[derive(Debug, thiserror::Error)]
pub enum WireError {
    #[error("Failed to encode {kind}: {source}")]
    Encode {
        kind: &'static str,
        source: serde_json::Error,
    },
    #[error("Failed to decode {kind}: {source}")]
    Decode {
        kind: &'static str,
        source: serde_json::Error,
    },
}
