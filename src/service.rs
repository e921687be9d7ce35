//! Service entity: triple-buffered generations with change notification.
//!
//! Grounded on `original_source/src/sd/service.c`. The reference stores
//! a `change_cb` function pointer invoked synchronously from
//! `service_commit`/`service_remove`. This crate instead has `commit`/
//! `remove` *return* the [`ChangeKind`] and lets the caller (in
//! `client.rs`/`sde.rs`) drive subscription fan-out and orphan-timer
//! maintenance — an outbound-notification shape `spec.md` §9 calls out
//! as an acceptable equivalent to the callback design, and one that
//! avoids a `Service` needing a back-reference to the database.

use crate::generation::Generation;
use crate::props::Props;
use std::cell::RefCell;
use std::rc::Rc;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChangeKind {
	Added,
	Modified,
	Removed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum InProgress {
	None,
	Added,
	Modified,
}

#[derive(Debug)]
pub struct Service {
	id: i64,
	current: Option<Generation>,
	previous: Option<Generation>,
	pending: Option<Generation>,
	in_progress: InProgress,
}

pub type ServiceHandle = Rc<RefCell<Service>>;

impl Service {
	pub fn new(id: i64) -> Self {
		Self {
			id,
			current: None,
			previous: None,
			pending: None,
			in_progress: InProgress::None,
		}
	}

	pub fn id(&self) -> i64 {
		self.id
	}

	fn has_ongoing_change(&self) -> bool {
		match self.in_progress {
			InProgress::Added | InProgress::Modified => {
				debug_assert!(self.pending.is_some());
				true
			}
			InProgress::None => {
				debug_assert!(self.pending.is_none());
				false
			}
		}
	}

	/// Opens a pending generation for a brand-new service.
	pub fn add_begin(&mut self) {
		assert!(!self.has_ongoing_change());
		self.in_progress = InProgress::Added;
		self.pending = Some(Generation::new());
	}

	/// Opens a pending generation cloned from `current`.
	pub fn modify_begin(&mut self) {
		assert!(!self.has_ongoing_change());
		self.in_progress = InProgress::Modified;
		self.pending = Some(self.current.clone().expect("modify_begin on unadded service"));
	}

	/// Rotates `previous <- current <- pending` and returns the change
	/// kind to report to subscribers.
	pub fn commit(&mut self) -> ChangeKind {
		assert!(self.has_ongoing_change());
		let pending = self.pending.take().expect("commit without pending generation");
		assert!(pending.is_consistent());

		self.previous = self.current.take();
		self.current = Some(pending);

		let kind = match self.in_progress {
			InProgress::Added => ChangeKind::Added,
			InProgress::Modified => ChangeKind::Modified,
			InProgress::None => unreachable!(),
		};
		self.in_progress = InProgress::None;
		kind
	}

	/// Clears `current`, recording it as `previous`, and returns
	/// `ChangeKind::Removed`.
	pub fn remove(&mut self) -> ChangeKind {
		assert!(!self.has_ongoing_change());
		self.previous = self.current.take();
		ChangeKind::Removed
	}

	/// Discards a pending change without committing it.
	pub fn abort(&mut self) {
		assert!(self.has_ongoing_change());
		self.in_progress = InProgress::None;
		self.pending = None;
	}

	fn pending_mut(&mut self) -> &mut Generation {
		assert!(self.has_ongoing_change());
		self.pending.as_mut().unwrap()
	}

	pub fn set_generation(&mut self, generation: i64) {
		self.pending_mut().generation = Some(generation);
	}

	pub fn set_props(&mut self, props: Props) {
		self.pending_mut().props = Some(props);
	}

	pub fn set_ttl(&mut self, ttl: i64) {
		self.pending_mut().ttl = Some(ttl);
	}

	pub fn set_owner_client_id(&mut self, client_id: i64) {
		self.pending_mut().owner_client_id = Some(client_id);
	}

	pub fn set_orphan_since(&mut self, since: f64) {
		self.pending_mut().orphan_since = Some(since);
	}

	pub fn set_non_orphan(&mut self) {
		self.pending_mut().orphan_since = None;
	}

	fn current(&self) -> &Generation {
		self.current.as_ref().expect("service has no current generation")
	}

	pub fn generation(&self) -> i64 {
		self.current().generation.unwrap()
	}

	pub fn props(&self) -> &Props {
		self.current().props.as_ref().unwrap()
	}

	pub fn prev_props(&self) -> &Props {
		self.previous.as_ref().and_then(|g| g.props.as_ref()).expect("no previous generation")
	}

	pub fn ttl(&self) -> i64 {
		self.current().ttl.unwrap()
	}

	pub fn owner_client_id(&self) -> i64 {
		self.current().owner_client_id.unwrap()
	}

	pub fn is_orphan(&self) -> bool {
		self.current().orphan_since.is_some()
	}

	pub fn was_orphan(&self) -> bool {
		self.previous.as_ref().map(|g| g.orphan_since.is_some()).unwrap_or(false)
	}

	pub fn orphan_since(&self) -> Option<f64> {
		self.current().orphan_since
	}

	/// `max(0, ttl - (now - orphan_since))`. Panics if not orphan.
	pub fn orphan_time_left(&self, now: f64) -> f64 {
		let since = self.is_orphan().then(|| self.orphan_since().unwrap()).expect("service is not orphan");
		let elapsed = now - since;
		let left = self.ttl() as f64 - elapsed;
		left.max(0.0)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn publish(service: &mut Service, generation: i64, ttl: i64, owner: i64) {
		service.add_begin();
		service.set_generation(generation);
		service.set_props(Props::new());
		service.set_ttl(ttl);
		service.set_non_orphan();
		service.set_owner_client_id(owner);
		assert_eq!(service.commit(), ChangeKind::Added);
	}

	#[test]
	fn add_begin_then_commit_yields_added() {
		let mut s = Service::new(1);
		publish(&mut s, 1, 60, 99);
		assert_eq!(s.generation(), 1);
		assert_eq!(s.ttl(), 60);
		assert_eq!(s.owner_client_id(), 99);
		assert!(!s.is_orphan());
	}

	#[test]
	fn modify_begin_clones_current_into_pending() {
		let mut s = Service::new(1);
		publish(&mut s, 1, 60, 99);

		s.modify_begin();
		s.set_orphan_since(5.0);
		assert_eq!(s.commit(), ChangeKind::Modified);

		assert!(s.is_orphan());
		assert!(!s.was_orphan());
		// generation carried over from the clone, untouched by this change
		assert_eq!(s.generation(), 1);
	}

	#[test]
	fn was_orphan_reads_previous_generation() {
		let mut s = Service::new(1);
		publish(&mut s, 1, 60, 99);
		s.modify_begin();
		s.set_orphan_since(5.0);
		s.commit();

		s.modify_begin();
		s.set_non_orphan();
		s.commit();

		assert!(s.was_orphan());
		assert!(!s.is_orphan());
	}

	#[test]
	fn abort_discards_pending_without_mutating_current() {
		let mut s = Service::new(1);
		publish(&mut s, 1, 60, 99);

		s.modify_begin();
		s.set_ttl(999);
		s.abort();

		assert_eq!(s.ttl(), 60);
		assert!(!s.has_ongoing_change());
	}

	#[test]
	fn remove_records_previous_and_clears_current() {
		let mut s = Service::new(1);
		publish(&mut s, 1, 60, 99);
		assert_eq!(s.remove(), ChangeKind::Removed);
		assert_eq!(s.prev_props().len(), 0);
	}

	#[test]
	fn orphan_time_left_floors_at_zero() {
		let mut s = Service::new(1);
		publish(&mut s, 1, 10, 99);
		s.modify_begin();
		s.set_orphan_since(0.0);
		s.commit();

		assert_eq!(s.orphan_time_left(5.0), 5.0);
		assert_eq!(s.orphan_time_left(50.0), 0.0);
	}
}
