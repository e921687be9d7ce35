//! Client entity: logical client identity, its connections, and the
//! publish/unpublish/subscribe dispatch described in `spec.md` §4.4.
//!
//! Grounded on `original_source/src/sd/client.c`. The reference stores
//! a raw `struct db *` back-pointer so `client_publish` can look up
//! sibling clients during ownership transfer; this crate uses a
//! `Weak<RefCell<Db>>` for the same purpose, which is the cycle-safe
//! equivalent `spec.md` §9 calls for ("Cyclic ownership"). Unlike the
//! reference, which drives subscriber fan-out through a `change_cb`
//! invoked inside `service_commit`, every method here returns enough
//! information (a [`ChangeKind`], or a small outcome struct) for the
//! caller (`sde.rs`) to perform fan-out and orphan-timer maintenance
//! itself — see the equivalent design note in `service.rs`.

use crate::conn::{Conn, ConnHandle};
use crate::db::{Db, SubHandle};
use crate::filter::Filter;
use crate::proto::FailReason;
use crate::props::Props;
use crate::service::{ChangeKind, Service, ServiceHandle};
use crate::sub::Subscription;
use std::cell::RefCell;
use std::rc::{Rc, Weak};

#[derive(Debug)]
pub struct Client {
	client_id: i64,
	db: Weak<RefCell<Db>>,
	active_conn: Option<ConnHandle>,
	inactive_conns: Vec<ConnHandle>,
}

pub type ClientHandle = Rc<RefCell<Client>>;

/// Outcome of [`Client::unpublish`]: an unpublish of a non-owned or
/// orphan service first republishes (so the subscriber sees a clean
/// appeared/modified), then removes (`spec.md` §4.4).
pub struct UnpublishOutcome {
	pub service: ServiceHandle,
	pub republish_kind: Option<ChangeKind>,
	pub removed_kind: ChangeKind,
}

impl Client {
	pub fn new(client_id: i64, db: Weak<RefCell<Db>>) -> Self {
		Self {
			client_id,
			db,
			active_conn: None,
			inactive_conns: Vec::new(),
		}
	}

	pub fn client_id(&self) -> i64 {
		self.client_id
	}

	pub fn is_connected(&self) -> bool {
		self.active_conn.is_some()
	}

	pub fn is_stale(&self) -> bool {
		self.active_conn.is_none() && self.inactive_conns.iter().all(|c| c.borrow().is_stale())
	}

	pub fn active_remote_addr(&self) -> Option<String> {
		self.active_conn.as_ref().map(|c| c.borrow().remote_addr().to_owned())
	}

	pub fn active_connected_at(&self) -> Option<f64> {
		self.active_conn.as_ref().map(|c| c.borrow().connected_at())
	}

	fn db(&self) -> Rc<RefCell<Db>> {
		self.db.upgrade().expect("db dropped while a client referencing it is alive")
	}

	/// Installs a brand-new connection as active. Used both for the
	/// first-ever `hello` from a client id and, after validating no
	/// active connection already exists, for reconnection.
	pub fn connect(&mut self, remote_addr: String, now: f64) -> ConnHandle {
		assert!(self.active_conn.is_none());
		let conn = Rc::new(RefCell::new(Conn::new(remote_addr, now)));
		self.active_conn = Some(Rc::clone(&conn));
		conn
	}

	/// `hello` with an existing client id over a fresh transport
	/// session (`spec.md` §4.4 RECONNECT).
	pub fn reconnect(&mut self, remote_addr: String, now: f64) -> Result<ConnHandle, FailReason> {
		if self.is_connected() {
			return Err(FailReason::ClientIdExists);
		}
		Ok(self.connect(remote_addr, now))
	}

	/// Finds whichever of this client's connections (active or
	/// inactive) currently holds `service_id` and drops the
	/// registration, pruning any inactive connection this leaves
	/// stale.
	fn del_service_from_any_conn(&mut self, service_id: i64) {
		if let Some(conn) = &self.active_conn {
			if conn.borrow().has_service(service_id) {
				conn.borrow_mut().del_service(service_id);
			}
		}
		for conn in &self.inactive_conns {
			if conn.borrow().has_service(service_id) {
				conn.borrow_mut().del_service(service_id);
				break;
			}
		}
		self.inactive_conns.retain(|c| !c.borrow().is_stale());
	}

	/// Detaches `service` from whichever client currently owns it and
	/// attaches it to this client's active connection. Mirrors
	/// `capture_service` in `client.c` exactly, including its omission
	/// of any staleness sweep of the victim (the victim's connection
	/// or client may linger stale until its own next operation checks
	/// it — see `DESIGN.md`).
	fn capture_service(&mut self, service_id: i64, service: &ServiceHandle) {
		let db = self.db();
		let victim_client_id = service.borrow().owner_client_id();
		if let Some(victim) = db.borrow().get_client(victim_client_id) {
			victim.borrow_mut().del_service_from_any_conn(service_id);
		}
		self
			.active_conn
			.as_ref()
			.expect("capture_service on unconnected client")
			.borrow_mut()
			.add_service(service_id, Rc::clone(service));
	}

	/// `spec.md` §4.4 PUBLISH. `Ok(None)` is the re-publish-identity
	/// no-op; `Ok(Some((service, kind)))` carries the change to report
	/// to subscribers.
	pub fn publish(
		&mut self,
		service_id: i64,
		generation: i64,
		props: Props,
		ttl: i64,
	) -> Result<Option<(ServiceHandle, ChangeKind)>, FailReason> {
		assert!(self.is_connected());
		let db = self.db();
		let existing = db.borrow().get_service(service_id);

		match existing {
			Some(service) => {
				let (cur_generation, changed_owner, same_props, same_ttl, was_orphan) = {
					let s = service.borrow();
					(
						s.generation(),
						s.owner_client_id() != self.client_id,
						s.props() == &props,
						s.ttl() == ttl,
						s.is_orphan(),
					)
				};

				if generation == cur_generation {
					if !same_props || !same_ttl {
						return Err(FailReason::SameGenerationButDifferent);
					}

					if changed_owner {
						self.capture_service(service_id, &service);
						let mut s = service.borrow_mut();
						s.modify_begin();
						s.set_non_orphan();
						s.set_owner_client_id(self.client_id);
						let kind = s.commit();
						Ok(Some((Rc::clone(&service), kind)))
					} else if was_orphan {
						let mut s = service.borrow_mut();
						s.modify_begin();
						s.set_non_orphan();
						let kind = s.commit();
						Ok(Some((Rc::clone(&service), kind)))
					} else {
						Ok(None)
					}
				} else if generation > cur_generation {
					if changed_owner {
						self.capture_service(service_id, &service);
					}
					let mut s = service.borrow_mut();
					s.modify_begin();
					s.set_generation(generation);
					s.set_props(props);
					s.set_ttl(ttl);
					s.set_non_orphan();
					s.set_owner_client_id(self.client_id);
					let kind = s.commit();
					Ok(Some((Rc::clone(&service), kind)))
				} else {
					Err(FailReason::OldGeneration)
				}
			}
			None => {
				let service = Rc::new(RefCell::new(Service::new(service_id)));
				let kind = {
					let mut s = service.borrow_mut();
					s.add_begin();
					s.set_generation(generation);
					s.set_props(props);
					s.set_ttl(ttl);
					s.set_non_orphan();
					s.set_owner_client_id(self.client_id);
					s.commit()
				};

				db.borrow_mut().add_service(service_id, Rc::clone(&service));
				self
					.active_conn
					.as_ref()
					.unwrap()
					.borrow_mut()
					.add_service(service_id, Rc::clone(&service));

				Ok(Some((service, kind)))
			}
		}
	}

	/// `spec.md` §4.4 UNPUBLISH.
	pub fn unpublish(&mut self, service_id: i64) -> Result<UnpublishOutcome, FailReason> {
		assert!(self.is_connected());
		let db = self.db();
		let service = db.borrow().get_service(service_id).ok_or(FailReason::NonExistentServiceId)?;

		let (owner_id, is_orphan) = {
			let s = service.borrow();
			(s.owner_client_id(), s.is_orphan())
		};
		let changed_owner = owner_id != self.client_id;

		let republish_kind = if changed_owner || is_orphan {
			if changed_owner {
				self.capture_service(service_id, &service);
			}
			let mut s = service.borrow_mut();
			s.modify_begin();
			s.set_non_orphan();
			if changed_owner {
				s.set_owner_client_id(self.client_id);
			}
			Some(s.commit())
		} else {
			None
		};

		self.del_service_from_any_conn(service_id);
		db.borrow_mut().del_service(service_id);
		let removed_kind = service.borrow_mut().remove();

		Ok(UnpublishOutcome {
			service,
			republish_kind,
			removed_kind,
		})
	}

	/// Reaps a service this (disconnected) client still owns after its
	/// orphan TTL expires (`spec.md` §4.6). Returns the change kind to
	/// report and whether this client became stale as a result.
	pub fn purge_orphan(&mut self, service_id: i64) -> (ServiceHandle, ChangeKind, bool) {
		// The owner may have reconnected without re-publishing
		// (`spec.md` §4.4 RECONNECT): the service stays orphan, the
		// timer stays armed, and the reap at T+tau must still happen
		// (`spec.md` §8 "Orphan is resolvable"). `is_stale()` below
		// correctly reports `false` for a now-connected owner either way.
		let db = self.db();
		let service = db.borrow().get_service(service_id).expect("purge_orphan on unknown service");
		debug_assert_eq!(service.borrow().owner_client_id(), self.client_id);

		self.del_service_from_any_conn(service_id);
		db.borrow_mut().del_service(service_id);
		let kind = service.borrow_mut().remove();

		(service, kind, self.is_stale())
	}

	/// `spec.md` §4.4 DISCONNECT, steps 1-3; step 4 (destroying the
	/// connection / removing the client) is driven by the caller
	/// reading [`DisconnectOutcome`].
	pub fn disconnect(&mut self, now: f64) -> DisconnectOutcome {
		let conn = self.active_conn.take().expect("disconnect on unconnected client");
		conn.borrow_mut().mark_disconnected(now);

		let db = self.db();
		let sub_ids: Vec<i64> = {
			let mut ids = Vec::new();
			conn.borrow().foreach_sub(|id, _| ids.push(id));
			ids
		};
		{
			let mut db = db.borrow_mut();
			for sub_id in &sub_ids {
				db.del_sub(*sub_id);
			}
		}
		conn.borrow_mut().clear_subs();

		let services: Vec<ServiceHandle> = {
			let mut out = Vec::new();
			conn.borrow().foreach_service(|_, service| out.push(Rc::clone(service)));
			out
		};

		let mut orphaned = Vec::with_capacity(services.len());
		for service in services {
			let mut s = service.borrow_mut();
			s.modify_begin();
			s.set_orphan_since(now);
			s.commit();
			drop(s);
			orphaned.push(service);
		}

		if !conn.borrow().is_stale() {
			self.inactive_conns.push(conn);
		}

		DisconnectOutcome {
			orphaned,
			client_became_stale: self.is_stale(),
		}
	}

	/// `spec.md` §4.4 SUBSCRIBE (subscription creation half; activation
	/// replay is driven by `sde.rs` against the whole database).
	pub fn create_sub(&mut self, sub_id: i64, filter: Option<Filter>) -> Result<SubHandle, FailReason> {
		assert!(self.is_connected());
		let db = self.db();
		if db.borrow().has_sub(sub_id) {
			return Err(FailReason::SubscriptionIdExists);
		}

		let sub = Rc::new(RefCell::new(Subscription::new(sub_id, filter, self.client_id)));
		self.active_conn.as_ref().unwrap().borrow_mut().add_sub(sub_id, Rc::clone(&sub));
		db.borrow_mut().add_sub(sub_id, Rc::clone(&sub));
		Ok(sub)
	}

	pub fn unsubscribe(&mut self, sub_id: i64) -> Result<(), FailReason> {
		assert!(self.is_connected());
		let db = self.db();
		if !db.borrow().has_sub(sub_id) {
			return Err(FailReason::NonExistentSubscriptionId);
		}
		let owns_it = self.active_conn.as_ref().unwrap().borrow().has_sub(sub_id);
		if !owns_it {
			return Err(FailReason::PermissionDenied);
		}

		self.active_conn.as_ref().unwrap().borrow_mut().del_sub(sub_id);
		db.borrow_mut().del_sub(sub_id);
		Ok(())
	}
}

pub struct DisconnectOutcome {
	pub orphaned: Vec<ServiceHandle>,
	pub client_became_stale: bool,
}
