//! SDE-side connection record: one transport session's registered
//! services and subscriptions.
//!
//! Grounded on the `conn_*` calls threaded through
//! `original_source/src/sd/client.c` (the reference keeps `struct conn`
//! in a sibling file not present in the retrieved sources, but its
//! shape is fully inferable from its call sites).

use crate::db::SubHandle;
use crate::service::ServiceHandle;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

pub type ConnHandle = Rc<RefCell<Conn>>;

#[derive(Debug)]
pub struct Conn {
	remote_addr: String,
	connected_at: f64,
	disconnected_at: Option<f64>,
	services: HashMap<i64, ServiceHandle>,
	subs: HashMap<i64, SubHandle>,
}

impl Conn {
	pub fn new(remote_addr: String, now: f64) -> Self {
		Self {
			remote_addr,
			connected_at: now,
			disconnected_at: None,
			services: HashMap::new(),
			subs: HashMap::new(),
		}
	}

	pub fn remote_addr(&self) -> &str {
		&self.remote_addr
	}

	pub fn connected_at(&self) -> f64 {
		self.connected_at
	}

	pub fn disconnected_at(&self) -> Option<f64> {
		self.disconnected_at
	}

	pub fn mark_disconnected(&mut self, now: f64) {
		self.disconnected_at = Some(now);
	}

	/// A connection is stale once disconnected and it no longer
	/// anchors any service (subscriptions don't count: they are
	/// dropped outright on disconnect, not kept around).
	pub fn is_stale(&self) -> bool {
		self.disconnected_at.is_some() && self.services.is_empty()
	}

	pub fn has_service(&self, id: i64) -> bool {
		self.services.contains_key(&id)
	}

	pub fn add_service(&mut self, id: i64, service: ServiceHandle) {
		self.services.insert(id, service);
	}

	pub fn del_service(&mut self, id: i64) {
		self.services.remove(&id);
	}

	pub fn foreach_service(&self, mut f: impl FnMut(i64, &ServiceHandle)) {
		for (id, service) in self.services.iter() {
			f(*id, service);
		}
	}

	pub fn has_sub(&self, id: i64) -> bool {
		self.subs.contains_key(&id)
	}

	pub fn add_sub(&mut self, id: i64, sub: SubHandle) {
		self.subs.insert(id, sub);
	}

	pub fn del_sub(&mut self, id: i64) {
		self.subs.remove(&id);
	}

	pub fn foreach_sub(&self, mut f: impl FnMut(i64, &SubHandle)) {
		for (id, sub) in self.subs.iter() {
			f(*id, sub);
		}
	}

	pub fn clear_subs(&mut self) {
		self.subs.clear();
	}
}
