//! In-memory database: three maps keyed by 63-bit identifier.
//!
//! Grounded on `original_source/src/sd/db.c`, which is a thin relay
//! over three generated map wrappers. Entries are shared (`Rc`) rather
//! than exclusively owned because connections and subscriptions keep
//! their own references into the same services/subs alongside the
//! database (`spec.md` §3, §9).

use crate::client::ClientHandle;
use crate::service::ServiceHandle;
use crate::sub::Subscription;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

pub type SubHandle = Rc<RefCell<Subscription>>;

#[derive(Default)]
pub struct Db {
	clients: HashMap<i64, ClientHandle>,
	services: HashMap<i64, ServiceHandle>,
	subs: HashMap<i64, SubHandle>,
}

impl Db {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn has_client(&self, id: i64) -> bool {
		self.clients.contains_key(&id)
	}

	pub fn get_client(&self, id: i64) -> Option<ClientHandle> {
		self.clients.get(&id).cloned()
	}

	pub fn add_client(&mut self, id: i64, client: ClientHandle) {
		self.clients.insert(id, client);
	}

	pub fn del_client(&mut self, id: i64) {
		self.clients.remove(&id);
	}

	pub fn foreach_client(&self, mut f: impl FnMut(i64, &ClientHandle)) {
		for (id, client) in self.clients.iter() {
			f(*id, client);
		}
	}

	pub fn has_service(&self, id: i64) -> bool {
		self.services.contains_key(&id)
	}

	pub fn get_service(&self, id: i64) -> Option<ServiceHandle> {
		self.services.get(&id).cloned()
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

	pub fn get_sub(&self, id: i64) -> Option<SubHandle> {
		self.subs.get(&id).cloned()
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
}
