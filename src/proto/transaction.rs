//! The per-request transaction state machine (`spec.md` §4.7).
//!
//! Grounded on the phase sequencing implicit in
//! `original_source/src/proto/proto_ta.c`'s completion/failure
//! helpers. There, a request is represented as a live `json_t`/callback
//! pair for the duration of the call that handles it; this crate makes
//! the state explicit as a small enum so the scheduler can hold
//! multi-response transactions open across many reactor ticks (one per
//! `notify`) between `accept` and the eventual `complete`.

use crate::proto::message::Message;
use crate::proto::schema::{Interaction, TransactionType};
use serde_json::Map;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TaState {
	Requested,
	Accepted,
	Completed,
	Failed,
}

/// One in-flight request on a connection.
///
/// `id` and `cmd` are carried from the request so every response
/// (`accept`/`notify`/`complete`/`fail`) names the same `ta-cmd`/`ta-id`
/// pair, per `spec.md` §4.7.
#[derive(Debug)]
pub struct Transaction {
	id: i64,
	cmd: &'static str,
	ty: &'static TransactionType,
	state: TaState,
}

impl Transaction {
	pub fn new(id: i64, ty: &'static TransactionType) -> Self {
		Self {
			id,
			cmd: ty.cmd.as_str(),
			ty,
			state: TaState::Requested,
		}
	}

	pub fn id(&self) -> i64 {
		self.id
	}

	pub fn state(&self) -> TaState {
		self.state
	}

	pub fn is_terminal(&self) -> bool {
		matches!(self.state, TaState::Completed | TaState::Failed)
	}

	pub fn interaction(&self) -> Interaction {
		self.ty.interaction
	}

	/// Emits `accept`, opening the notify stream of a multi-response
	/// transaction. Panics if called on a single-response transaction
	/// or outside the `Requested` state — these are internal-invariant
	/// violations (`spec.md` §7 stratum 3), not runtime conditions.
	pub fn accept(&mut self) -> Message {
		assert_eq!(self.ty.interaction, Interaction::MultiResponse);
		assert_eq!(self.state, TaState::Requested);
		self.state = TaState::Accepted;
		Message::accept(self.cmd, self.id)
	}

	/// Emits one `notify`. Only valid once `accept` has fired.
	pub fn notify(&mut self, fields: Map<String, serde_json::Value>) -> Message {
		assert_eq!(self.state, TaState::Accepted);
		Message::notify(self.cmd, self.id, fields)
	}

	/// Emits `complete`, terminating the transaction.
	pub fn complete(&mut self, fields: Map<String, serde_json::Value>) -> Message {
		assert!(matches!(self.state, TaState::Requested | TaState::Accepted));
		self.state = TaState::Completed;
		Message::complete(self.cmd, self.id, fields)
	}

	/// Emits `fail`, terminating the transaction. Valid from
	/// `Requested` (a single-response failure) or `Accepted` (a
	/// multi-response transaction that fails after activation, which
	/// the reference does not exercise but the state machine in
	/// `spec.md` §4.7 allows).
	pub fn fail(&mut self, reason: crate::proto::FailReason) -> Message {
		assert!(matches!(self.state, TaState::Requested | TaState::Accepted));
		self.state = TaState::Failed;
		Message::fail(self.cmd, self.id, reason)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::proto::schema;

	#[test]
	fn single_response_transaction_completes_directly() {
		let ty = schema::lookup("ping").unwrap();
		let mut ta = Transaction::new(1, ty);
		assert_eq!(ta.state(), TaState::Requested);
		let msg = ta.complete(Map::new());
		assert_eq!(msg.msg_type, crate::proto::message::MsgType::Complete);
		assert!(ta.is_terminal());
	}

	#[test]
	fn multi_response_transaction_streams_then_completes() {
		let ty = schema::lookup("subscribe").unwrap();
		let mut ta = Transaction::new(1, ty);
		ta.accept();
		assert_eq!(ta.state(), TaState::Accepted);
		ta.notify(Map::new());
		assert!(!ta.is_terminal());
		ta.complete(Map::new());
		assert!(ta.is_terminal());
	}

	#[test]
	#[should_panic]
	fn single_response_transaction_cannot_accept() {
		let ty = schema::lookup("ping").unwrap();
		let mut ta = Transaction::new(1, ty);
		ta.accept();
	}
}
