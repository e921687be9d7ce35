//! The protocol transaction layer (`spec.md` §4.7, §6).
//!
//! Grounded on `original_source/src/proto/` (`proto_ta.c`, `msg.c`,
//! `proto_conn.c`): a declarative transaction-type registry
//! ([`schema`]), a JSON wire message with framing
//! ([`message`]), and a per-request state machine ([`transaction`]).

pub mod fail_reason;
pub mod message;
pub mod schema;
pub mod transaction;

pub use fail_reason::FailReason;
pub use message::{Message, MessageStream, MsgType, PeerViolation};
pub use schema::{Command, FieldType, Interaction, TransactionType};
pub use transaction::{TaState, Transaction};

/// The sole protocol version this broker currently implements
/// (`spec.md` §6). Modeled as the lower/upper bound of a range in
/// [`crate::config::Config`] rather than a bare constant, so the hello
/// negotiation logic is written generally (`SPEC_FULL.md` §B.4).
pub const PROTOCOL_VERSION: i64 = 2;
