//! The wire message: a self-delimited JSON object per `spec.md` §4.7.
//!
//! Grounded on `original_source/src/proto/msg.c` (frame boundaries) and
//! `proto_ta.c`'s `get_json_*` family (per-field type validation). The
//! reference frames messages with a length-prefixed `jansson` blob over
//! a raw socket; this crate frames with newline-delimited JSON over
//! whatever `AsyncRead + AsyncWrite` the transport hands it, since the
//! core's transport is an abstract capability (`spec.md` §6) and
//! newline-delimited JSON is the framing the teacher's own
//! `PacketStream`/`Connection` buffering style (length-prefixed instead
//! of newline-prefixed, but the same read-buffer-then-parse shape)
//! generalizes to for a textual, rather than binary, protocol.

use crate::props::Props;
use crate::proto::schema::{self, FieldType, TransactionType};
use bytes::BytesMut;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Which phase of a transaction a message represents (`spec.md` §4.7).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MsgType {
	Request,
	Accept,
	Notify,
	Complete,
	Fail,
}

/// A parsed or to-be-serialized wire message.
///
/// Command- and phase-specific fields live in `fields`, a flat JSON
/// object merged with the three mandatory keys at (de)serialization
/// time via `#[serde(flatten)]`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Message {
	#[serde(rename = "ta-cmd")]
	pub cmd: String,
	#[serde(rename = "ta-id")]
	pub id: i64,
	#[serde(rename = "msg-type")]
	pub msg_type: MsgType,
	#[serde(flatten)]
	pub fields: Map<String, Json>,
}

impl Message {
	pub fn request(cmd: impl Into<String>, id: i64, fields: Map<String, Json>) -> Self {
		Self {
			cmd: cmd.into(),
			id,
			msg_type: MsgType::Request,
			fields,
		}
	}

	pub fn accept(cmd: impl Into<String>, id: i64) -> Self {
		Self {
			cmd: cmd.into(),
			id,
			msg_type: MsgType::Accept,
			fields: Map::new(),
		}
	}

	pub fn notify(cmd: impl Into<String>, id: i64, fields: Map<String, Json>) -> Self {
		Self {
			cmd: cmd.into(),
			id,
			msg_type: MsgType::Notify,
			fields,
		}
	}

	pub fn complete(cmd: impl Into<String>, id: i64, fields: Map<String, Json>) -> Self {
		Self {
			cmd: cmd.into(),
			id,
			msg_type: MsgType::Complete,
			fields,
		}
	}

	pub fn fail(cmd: impl Into<String>, id: i64, reason: crate::proto::FailReason) -> Self {
		let mut fields = Map::new();
		fields.insert("fail-reason".into(), Json::String(reason.as_str().into()));
		Self {
			cmd: cmd.into(),
			id,
			msg_type: MsgType::Fail,
			fields,
		}
	}

	pub fn field(&self, name: &str) -> Option<&Json> {
		self.fields.get(name)
	}
}

/// A violation of the framing or field contract: malformed JSON, a
/// missing mandatory field, a field of the wrong type, a negative
/// value in a declared non-negative field, or an unknown field beyond
/// what the command declares (`spec.md` §4.7). These are stratum-2
/// errors: the connection is torn down silently, with no `fail`
/// response (`spec.md` §7).
#[derive(Debug, thiserror::Error)]
pub enum PeerViolation {
	#[error("malformed message: {0}")]
	MalformedJson(#[from] serde_json::Error),
	#[error("unknown command {0:?}")]
	UnknownCommand(String),
	#[error("missing required field {0:?}")]
	MissingField(&'static str),
	#[error("field {0:?} has the wrong type")]
	WrongFieldType(&'static str),
	#[error("negative value in non-negative field {0:?}")]
	NegativeField(&'static str),
	#[error("unknown field {0:?}")]
	UnknownField(String),
	#[error("command received before the handshake completed")]
	HandshakeRequired,
	#[error("connection reset by peer")]
	ConnectionReset,
	#[error("i/o error: {0}")]
	Io(#[from] std::io::Error),
}

fn field_type_ok(ty: FieldType, value: &Json) -> bool {
	match ty {
		FieldType::Uint63 => value.as_i64().is_some_and(|v| v >= 0),
		FieldType::Number => value.is_number(),
		FieldType::Str => value.is_string(),
		FieldType::MatchType => value
			.as_str()
			.map(|s| matches!(s, "appeared" | "modified" | "disappeared"))
			.unwrap_or(false),
		FieldType::Props => Props::deserialize(value).is_ok(),
	}
}

/// Validates a request's fields against its declared schema, per
/// `spec.md` §4.7: every mandatory field present and correctly typed,
/// every optional field (if present) correctly typed, and no fields
/// beyond the declared set.
pub fn validate_request(ty: &TransactionType, msg: &Message) -> Result<(), PeerViolation> {
	for spec in ty.req_fields {
		let value = msg.fields.get(spec.name).ok_or(PeerViolation::MissingField(spec.name))?;
		if !field_type_ok(spec.ty, value) {
			return if spec.ty == FieldType::Uint63 && value.as_i64().is_some() {
				Err(PeerViolation::NegativeField(spec.name))
			} else {
				Err(PeerViolation::WrongFieldType(spec.name))
			};
		}
	}

	for spec in ty.opt_req_fields {
		if let Some(value) = msg.fields.get(spec.name) {
			if !field_type_ok(spec.ty, value) {
				return if spec.ty == FieldType::Uint63 && value.as_i64().is_some() {
					Err(PeerViolation::NegativeField(spec.name))
				} else {
					Err(PeerViolation::WrongFieldType(spec.name))
				};
			}
		}
	}

	let known: std::collections::HashSet<&str> =
		ty.req_fields.iter().chain(ty.opt_req_fields).map(|s| s.name).collect();
	for name in msg.fields.keys() {
		if !known.contains(name.as_str()) {
			return Err(PeerViolation::UnknownField(name.clone()));
		}
	}

	Ok(())
}

/// Parses a command name into the declarative schema row for it,
/// returning a peer violation for commands the broker doesn't know.
pub fn lookup_schema(cmd: &str) -> Result<&'static TransactionType, PeerViolation> {
	schema::lookup(cmd).ok_or_else(|| PeerViolation::UnknownCommand(cmd.to_owned()))
}

/// Newline-delimited JSON framing over an arbitrary duplex stream.
///
/// Mirrors the read-buffer-then-parse shape of the teacher's
/// `PacketStream`/`Connection` (`async_client/packetstream.rs`,
/// `async_client/connection.rs`), generalized from a length-prefixed
/// binary frame to a newline-terminated JSON object.
#[derive(Debug)]
pub struct MessageStream<T> {
	stream: T,
	buffer: BytesMut,
}

impl<T> MessageStream<T> {
	pub fn new(stream: T, len: usize) -> Self {
		Self {
			stream,
			buffer: BytesMut::with_capacity(len),
		}
	}

	fn parse_message(&mut self) -> Result<Option<Message>, PeerViolation> {
		let Some(newline_at) = self.buffer.iter().position(|b| *b == b'\n') else {
			return Ok(None);
		};

		let line = self.buffer.split_to(newline_at + 1);
		let line = &line[..line.len() - 1];

		if line.iter().all(u8::is_ascii_whitespace) {
			return self.parse_message();
		}

		let message: Message = serde_json::from_slice(line)?;
		Ok(Some(message))
	}
}

impl<T> MessageStream<T> {
	/// Parses a message already sitting in the internal buffer, without
	/// touching the underlying stream. Lets `scheduler.rs` drain a
	/// batch of requests that arrived in one socket read without an
	/// `.await` per message (`spec.md` §4.8's `MAX_RECEIVE_BATCH`).
	pub fn try_read_buffered(&mut self) -> Result<Option<Message>, PeerViolation> {
		self.parse_message()
	}
}

impl<T: AsyncRead + Unpin> MessageStream<T> {
	/// Reads a single framed [`Message`] from the underlying stream.
	/// Returns `Ok(None)` on a clean peer shutdown.
	pub async fn read_message(&mut self) -> Result<Option<Message>, PeerViolation> {
		loop {
			if let Some(message) = self.parse_message()? {
				return Ok(Some(message));
			}

			if 0 == self.stream.read_buf(&mut self.buffer).await? {
				if self.buffer.is_empty() {
					return Ok(None);
				}
				return Err(PeerViolation::ConnectionReset);
			}
		}
	}
}

impl<T: AsyncWrite + Unpin> MessageStream<T> {
	pub async fn write_message(&mut self, message: &Message) -> std::io::Result<()> {
		let mut line = serde_json::to_vec(message).expect("Message always serializes");
		line.push(b'\n');
		self.stream.write_all(&line).await?;
		self.stream.flush().await
	}
}
