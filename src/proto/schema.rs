//! The declarative transaction-type registry.
//!
//! Grounded on `original_source/src/proto/proto_ta.c`'s static
//! `proto_ta_type` table (`hello_ta`, `publish_ta`, ... `clients_ta`)
//! and its `lookup_type` linear scan. `spec.md` §9 calls this table
//! "the right abstraction boundary": one record per command listing
//! required and optional fields, validated by iteration rather than
//! nine hand-written parsers. `services`/`subscriptions`/`clients` are
//! carried here per `SPEC_FULL.md` §B.1 even though `spec.md` §4 gives
//! them no component description beyond the field table in §6.

use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Command {
	Hello,
	Publish,
	Unpublish,
	Subscribe,
	Unsubscribe,
	Ping,
	Services,
	Subscriptions,
	Clients,
}

impl Command {
	pub fn as_str(&self) -> &'static str {
		match self {
			Self::Hello => "hello",
			Self::Publish => "publish",
			Self::Unpublish => "unpublish",
			Self::Subscribe => "subscribe",
			Self::Unsubscribe => "unsubscribe",
			Self::Ping => "ping",
			Self::Services => "services",
			Self::Subscriptions => "subscriptions",
			Self::Clients => "clients",
		}
	}

	pub fn from_str(s: &str) -> Option<Self> {
		Some(match s {
			"hello" => Self::Hello,
			"publish" => Self::Publish,
			"unpublish" => Self::Unpublish,
			"subscribe" => Self::Subscribe,
			"unsubscribe" => Self::Unsubscribe,
			"ping" => Self::Ping,
			"services" => Self::Services,
			"subscriptions" => Self::Subscriptions,
			"clients" => Self::Clients,
			_ => return None,
		})
	}
}

impl fmt::Display for Command {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Whether a transaction completes with a single response or streams
/// zero or more `notify` messages before completing (`spec.md` §4.7).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Interaction {
	SingleResponse,
	MultiResponse,
}

/// The wire type a field is declared to carry.
///
/// `Uint63` rejects negative integers at validation time (`spec.md`
/// §4.7); `Number` is an unrestricted floating-point field (used only
/// by `orphan-since`, which is a monotonic-seconds timestamp, not an
/// identifier).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldType {
	Uint63,
	Number,
	Str,
	MatchType,
	Props,
}

#[derive(Clone, Copy, Debug)]
pub struct FieldSpec {
	pub name: &'static str,
	pub ty: FieldType,
}

const fn f(name: &'static str, ty: FieldType) -> FieldSpec {
	FieldSpec { name, ty }
}

/// One declarative row of the transaction-type table.
#[derive(Debug)]
pub struct TransactionType {
	pub cmd: Command,
	pub interaction: Interaction,
	pub req_fields: &'static [FieldSpec],
	pub opt_req_fields: &'static [FieldSpec],
	pub notify_fields: &'static [FieldSpec],
	pub opt_notify_fields: &'static [FieldSpec],
	pub complete_fields: &'static [FieldSpec],
	pub opt_fail_fields: &'static [FieldSpec],
}

const HELLO: TransactionType = TransactionType {
	cmd: Command::Hello,
	interaction: Interaction::SingleResponse,
	req_fields: &[
		f("client-id", FieldType::Uint63),
		f("protocol-minimum-version", FieldType::Uint63),
		f("protocol-maximum-version", FieldType::Uint63),
	],
	opt_req_fields: &[],
	notify_fields: &[],
	opt_notify_fields: &[],
	complete_fields: &[f("protocol-version", FieldType::Uint63)],
	opt_fail_fields: &[f("fail-reason", FieldType::Str)],
};

const PUBLISH: TransactionType = TransactionType {
	cmd: Command::Publish,
	interaction: Interaction::SingleResponse,
	req_fields: &[
		f("service-id", FieldType::Uint63),
		f("generation", FieldType::Uint63),
		f("service-props", FieldType::Props),
		f("ttl", FieldType::Uint63),
	],
	opt_req_fields: &[],
	notify_fields: &[],
	opt_notify_fields: &[],
	complete_fields: &[],
	opt_fail_fields: &[f("fail-reason", FieldType::Str)],
};

const UNPUBLISH: TransactionType = TransactionType {
	cmd: Command::Unpublish,
	interaction: Interaction::SingleResponse,
	req_fields: &[f("service-id", FieldType::Uint63)],
	opt_req_fields: &[],
	notify_fields: &[],
	opt_notify_fields: &[],
	complete_fields: &[],
	opt_fail_fields: &[f("fail-reason", FieldType::Str)],
};

const SUBSCRIBE: TransactionType = TransactionType {
	cmd: Command::Subscribe,
	interaction: Interaction::MultiResponse,
	req_fields: &[f("subscription-id", FieldType::Uint63)],
	opt_req_fields: &[f("filter", FieldType::Str)],
	notify_fields: &[f("match-type", FieldType::MatchType), f("service-id", FieldType::Uint63)],
	opt_notify_fields: &[
		f("generation", FieldType::Uint63),
		f("service-props", FieldType::Props),
		f("ttl", FieldType::Uint63),
		f("client-id", FieldType::Uint63),
		f("orphan-since", FieldType::Number),
	],
	complete_fields: &[],
	opt_fail_fields: &[f("fail-reason", FieldType::Str)],
};

const UNSUBSCRIBE: TransactionType = TransactionType {
	cmd: Command::Unsubscribe,
	interaction: Interaction::SingleResponse,
	req_fields: &[f("subscription-id", FieldType::Uint63)],
	opt_req_fields: &[],
	notify_fields: &[],
	opt_notify_fields: &[],
	complete_fields: &[],
	opt_fail_fields: &[f("fail-reason", FieldType::Str)],
};

const PING: TransactionType = TransactionType {
	cmd: Command::Ping,
	interaction: Interaction::SingleResponse,
	req_fields: &[],
	opt_req_fields: &[],
	notify_fields: &[],
	opt_notify_fields: &[],
	complete_fields: &[],
	opt_fail_fields: &[f("fail-reason", FieldType::Str)],
};

const SERVICES: TransactionType = TransactionType {
	cmd: Command::Services,
	interaction: Interaction::MultiResponse,
	req_fields: &[],
	opt_req_fields: &[f("filter", FieldType::Str)],
	notify_fields: &[
		f("service-id", FieldType::Uint63),
		f("generation", FieldType::Uint63),
		f("service-props", FieldType::Props),
		f("ttl", FieldType::Uint63),
		f("client-id", FieldType::Uint63),
	],
	opt_notify_fields: &[f("orphan-since", FieldType::Number)],
	complete_fields: &[],
	opt_fail_fields: &[f("fail-reason", FieldType::Str)],
};

const SUBSCRIPTIONS: TransactionType = TransactionType {
	cmd: Command::Subscriptions,
	interaction: Interaction::MultiResponse,
	req_fields: &[],
	opt_req_fields: &[],
	notify_fields: &[f("subscription-id", FieldType::Uint63), f("client-id", FieldType::Uint63)],
	opt_notify_fields: &[f("filter", FieldType::Str)],
	complete_fields: &[],
	opt_fail_fields: &[],
};

const CLIENTS: TransactionType = TransactionType {
	cmd: Command::Clients,
	interaction: Interaction::MultiResponse,
	req_fields: &[],
	opt_req_fields: &[],
	notify_fields: &[
		f("client-id", FieldType::Uint63),
		f("client-address", FieldType::Str),
		f("time", FieldType::Uint63),
	],
	opt_notify_fields: &[],
	complete_fields: &[],
	opt_fail_fields: &[f("fail-reason", FieldType::Str)],
};

const TRANSACTION_TYPES: &[&TransactionType] = &[
	&HELLO,
	&PUBLISH,
	&UNPUBLISH,
	&SUBSCRIBE,
	&UNSUBSCRIBE,
	&PING,
	&SERVICES,
	&SUBSCRIPTIONS,
	&CLIENTS,
];

/// Looks up the declarative schema row for a command name received on
/// the wire. `None` means the peer named a command this broker does
/// not understand, which is a stratum-2 peer violation (`spec.md` §7).
pub fn lookup(cmd_name: &str) -> Option<&'static TransactionType> {
	TRANSACTION_TYPES.iter().find(|ty| ty.cmd.as_str() == cmd_name).copied()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn every_command_has_a_schema_row() {
		for cmd in [
			Command::Hello,
			Command::Publish,
			Command::Unpublish,
			Command::Subscribe,
			Command::Unsubscribe,
			Command::Ping,
			Command::Services,
			Command::Subscriptions,
			Command::Clients,
		] {
			let ty = lookup(cmd.as_str()).expect("schema row");
			assert_eq!(ty.cmd, cmd);
		}
	}

	#[test]
	fn unknown_command_is_not_found() {
		assert!(lookup("frobnicate").is_none());
	}

	#[test]
	fn subscribe_and_services_are_multi_response() {
		assert_eq!(lookup("subscribe").unwrap().interaction, Interaction::MultiResponse);
		assert_eq!(lookup("services").unwrap().interaction, Interaction::MultiResponse);
		assert_eq!(lookup("publish").unwrap().interaction, Interaction::SingleResponse);
	}
}
