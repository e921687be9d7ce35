//! Facade-level integration tests for the literal end-to-end scenarios
//! in `spec.md` §8, driving `Sde` directly rather than through the wire
//! protocol (scenarios 1, 2 and 6 already have wire-level coverage in
//! `scheduler.rs`'s own test module; these three are easier to express
//! against the bare facade because they turn on timing and repeated
//! publishes rather than connection framing).

use sdbroker::{Clock, Filter, MatchKind, Props, Sde, Value};
use std::time::Duration;

fn bag(pairs: &[(&str, Value)]) -> Props {
	let mut p = Props::new();
	for (name, value) in pairs {
		p.add(*name, value.clone());
	}
	p
}

/// Scenario 3: "Orphan after disconnect then timeout."
#[tokio::test(start_paused = true)]
async fn orphan_after_disconnect_then_timeout() {
	let mut sde = Sde::new(Clock::new());

	sde.connect(99, "a".into()).unwrap();
	sde.publish(99, 4444, 44, bag(&[("x", Value::Int(17))]), 1).unwrap();

	sde.connect(100, "b".into()).unwrap();
	sde.subscribe(100, 1234, Some(Filter::parse("(x=17)").unwrap())).unwrap();
	let appeared = sde.activate_sub(1234);
	assert_eq!(appeared.len(), 1);
	assert_eq!(appeared[0].match_kind, MatchKind::Appeared);
	assert_eq!(appeared[0].service.borrow().id(), 4444);

	let modified = sde.disconnect(99);
	assert_eq!(modified.len(), 1);
	assert_eq!(modified[0].sub_id, 1234);
	assert_eq!(modified[0].match_kind, MatchKind::Modified);
	assert!(modified[0].service.borrow().orphan_since().is_some());

	// Sweeping before the ttl elapses must not reap the service.
	assert!(sde.sweep_orphans().is_empty());

	tokio::time::advance(Duration::from_millis(1100)).await;

	let disappeared = sde.sweep_orphans();
	assert_eq!(disappeared.len(), 1);
	assert_eq!(disappeared[0].sub_id, 1234);
	assert_eq!(disappeared[0].match_kind, MatchKind::Disappeared);
	assert_eq!(disappeared[0].service.borrow().id(), 4444);
}

/// Scenario 4: "Ownership transfer."
#[test]
fn ownership_transfer_clears_orphan_and_reassigns_owner() {
	let mut sde = Sde::new(Clock::new());

	sde.connect(1, "a".into()).unwrap();
	sde.publish(1, 1, 1, bag(&[("k", "v".into())]), 60).unwrap();
	sde.disconnect(1);
	assert!(sde.next_orphan_deadline().is_some());

	sde.connect(2, "b".into()).unwrap();
	sde.subscribe(2, 1, Some(Filter::parse("(k=v)").unwrap())).unwrap();

	sde.connect(77, "c".into()).unwrap();
	let events = sde.publish(77, 1, 1, bag(&[("k", "v".into())]), 60).unwrap();

	assert_eq!(events.len(), 1);
	assert_eq!(events[0].match_kind, MatchKind::Modified);
	let service = events[0].service.borrow();
	assert_eq!(service.owner_client_id(), 77);
	assert!(service.orphan_since().is_none());
	assert!(sde.next_orphan_deadline().is_none());
}

/// Scenario 5: "Same-generation-different-data."
#[test]
fn same_generation_different_data_fails_and_leaves_service_unaffected() {
	let mut sde = Sde::new(Clock::new());

	sde.connect(1, "a".into()).unwrap();
	sde.publish(1, 2, 5, bag(&[("a", Value::Int(1))]), 10).unwrap();

	let err = sde.publish(1, 2, 5, bag(&[("a", Value::Int(2))]), 10).unwrap_err();
	assert_eq!(err, sdbroker::FailReason::SameGenerationButDifferent);

	let snapshot = sde.services(None);
	assert_eq!(snapshot.len(), 1);
	assert_eq!(snapshot[0].generation, 5);
	assert_eq!(snapshot[0].props.get_one("a"), Some(&Value::Int(1)));
}
