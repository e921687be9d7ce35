//! Subscription entity and differential match-kind computation.
//!
//! Grounded on `original_source/src/sd/sub.c`. `sub_notify` there calls
//! a stored function pointer directly; here `notify` is a pure
//! function returning the [`MatchKind`] (or nothing, when both sides
//! of a modification fail to match), and the caller dispatches it onto
//! the subscription's transaction — same reasoning as `service.rs`.

use crate::filter::Filter;
use crate::props::Props;
use crate::service::{ChangeKind, Service};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MatchKind {
	Appeared,
	Modified,
	Disappeared,
}

impl MatchKind {
	pub fn as_str(&self) -> &'static str {
		match self {
			Self::Appeared => "appeared",
			Self::Modified => "modified",
			Self::Disappeared => "disappeared",
		}
	}
}

#[derive(Debug)]
pub struct Subscription {
	id: i64,
	filter: Option<Filter>,
	owner_client_id: i64,
}

impl Subscription {
	pub fn new(id: i64, filter: Option<Filter>, owner_client_id: i64) -> Self {
		Self { id, filter, owner_client_id }
	}

	pub fn id(&self) -> i64 {
		self.id
	}

	pub fn filter(&self) -> Option<&Filter> {
		self.filter.as_ref()
	}

	pub fn owner_client_id(&self) -> i64 {
		self.owner_client_id
	}

	fn matches(&self, props: &Props) -> bool {
		self.filter.as_ref().map_or(true, |f| f.matches(props))
	}

	/// Computes the match-kind table in `spec.md` §4.5 for one service
	/// change. Returns `None` when a modification leaves the
	/// subscription's match state unchanged (no notify is emitted).
	pub fn notify(&self, change: ChangeKind, service: &Service) -> Option<MatchKind> {
		match change {
			ChangeKind::Added => self.matches(service.props()).then_some(MatchKind::Appeared),
			ChangeKind::Modified => {
				let before = self.matches(service.prev_props());
				let after = self.matches(service.props());
				match (before, after) {
					(false, false) => None,
					(true, true) => Some(MatchKind::Modified),
					(false, true) => Some(MatchKind::Appeared),
					(true, false) => Some(MatchKind::Disappeared),
				}
			}
			ChangeKind::Removed => self.matches(service.prev_props()).then_some(MatchKind::Disappeared),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::value::Value;

	fn service_with(props: Props, ttl: i64, owner: i64) -> Service {
		let mut s = Service::new(1);
		s.add_begin();
		s.set_generation(1);
		s.set_props(props);
		s.set_ttl(ttl);
		s.set_non_orphan();
		s.set_owner_client_id(owner);
		s.commit();
		s
	}

	fn modify(service: &mut Service, props: Props) {
		service.modify_begin();
		service.set_props(props);
		service.commit();
	}

	fn bag(pairs: &[(&str, Value)]) -> Props {
		let mut p = Props::new();
		for (name, value) in pairs {
			p.add(*name, value.clone());
		}
		p
	}

	#[test]
	fn added_service_matching_filter_appears() {
		let sub = Subscription::new(1, Some(Filter::parse("(x=*)").unwrap()), 1);
		let service = service_with(bag(&[("x", Value::Int(1))]), 60, 1);
		assert_eq!(sub.notify(ChangeKind::Added, &service), Some(MatchKind::Appeared));
	}

	#[test]
	fn added_service_not_matching_filter_is_silent() {
		let sub = Subscription::new(1, Some(Filter::parse("(x=*)").unwrap()), 1);
		let service = service_with(bag(&[("y", Value::Int(1))]), 60, 1);
		assert_eq!(sub.notify(ChangeKind::Added, &service), None);
	}

	#[test]
	fn modification_within_match_is_modified() {
		let sub = Subscription::new(1, Some(Filter::parse("(x=*)").unwrap()), 1);
		let mut service = service_with(bag(&[("x", Value::Int(1))]), 60, 1);
		modify(&mut service, bag(&[("x", Value::Int(2))]));
		assert_eq!(sub.notify(ChangeKind::Modified, &service), Some(MatchKind::Modified));
	}

	#[test]
	fn modification_into_match_appears() {
		let sub = Subscription::new(1, Some(Filter::parse("(x=*)").unwrap()), 1);
		let mut service = service_with(bag(&[("y", Value::Int(1))]), 60, 1);
		modify(&mut service, bag(&[("x", Value::Int(1))]));
		assert_eq!(sub.notify(ChangeKind::Modified, &service), Some(MatchKind::Appeared));
	}

	#[test]
	fn modification_out_of_match_disappears() {
		let sub = Subscription::new(1, Some(Filter::parse("(x=*)").unwrap()), 1);
		let mut service = service_with(bag(&[("x", Value::Int(1))]), 60, 1);
		modify(&mut service, bag(&[("y", Value::Int(1))]));
		assert_eq!(sub.notify(ChangeKind::Modified, &service), Some(MatchKind::Disappeared));
	}

	#[test]
	fn modification_outside_match_on_both_sides_is_suppressed() {
		let sub = Subscription::new(1, Some(Filter::parse("(x=*)").unwrap()), 1);
		let mut service = service_with(bag(&[("y", Value::Int(1))]), 60, 1);
		modify(&mut service, bag(&[("z", Value::Int(1))]));
		assert_eq!(sub.notify(ChangeKind::Modified, &service), None);
	}

	#[test]
	fn removed_matching_service_disappears() {
		let sub = Subscription::new(1, Some(Filter::parse("(x=*)").unwrap()), 1);
		let mut service = service_with(bag(&[("x", Value::Int(1))]), 60, 1);
		service.remove();
		assert_eq!(sub.notify(ChangeKind::Removed, &service), Some(MatchKind::Disappeared));
	}

	#[test]
	fn absent_filter_matches_everything() {
		let sub = Subscription::new(1, None, 1);
		let service = service_with(Props::new(), 60, 1);
		assert_eq!(sub.notify(ChangeKind::Added, &service), Some(MatchKind::Appeared));
	}
}
