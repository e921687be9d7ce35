//! The service-discovery engine facade: the single entry point
//! `scheduler.rs`/`server.rs` drive, and the orphan timer manager
//! (`spec.md` §4.6).
//!
//! Grounded on `original_source/src/sd/sd.c`, which plays the same
//! role over the reference's `struct db`/`struct client` — a thin
//! dispatch layer plus the orphan-timeout bookkeeping. There, fan-out
//! happens synchronously inside `service_commit` via a stored
//! callback; here every operation returns the [`SubEvent`]s it
//! produced so the caller can route each one to the connection that
//! owns its subscription without this module needing to know
//! anything about connections, transactions or sockets (that
//! separation is what lets `tests/` drive this facade directly per
//! `spec.md` §8).

use crate::client::{Client, ClientHandle};
use crate::clock::Clock;
use crate::conn::ConnHandle;
use crate::db::Db;
use crate::filter::Filter;
use crate::proto::FailReason;
use crate::props::Props;
use crate::service::{ChangeKind, ServiceHandle};
use crate::sub::MatchKind;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use tokio::sync::Notify;

/// `original_source/src/sd/sd.c`'s `EPOLL_ROUNDING_ERROR_MARGIN`: a
/// small fudge added to every orphan deadline so the timer fires
/// strictly after, never strictly at, the nominal TTL boundary.
const EPOLL_ROUNDING_ERROR_MARGIN: f64 = 1e-3;

/// One subscription's reaction to a service change, ready to be
/// turned into a `notify` message by whichever connection owns
/// `sub_id`.
#[derive(Clone)]
pub struct SubEvent {
	pub sub_id: i64,
	pub match_kind: MatchKind,
	pub service: ServiceHandle,
}

pub struct ServiceSnapshot {
	pub service_id: i64,
	pub generation: i64,
	pub props: Props,
	pub ttl: i64,
	pub owner_client_id: i64,
	pub orphan_since: Option<f64>,
}

pub struct SubscriptionSnapshot {
	pub subscription_id: i64,
	pub client_id: i64,
	pub filter: Option<Filter>,
}

pub struct ClientSnapshot {
	pub client_id: i64,
	pub client_address: String,
	pub time: f64,
}

/// The service-discovery engine: owns the database and the orphan
/// timer manager. Cheap to wrap in `Rc<RefCell<_>>` for sharing with
/// per-connection scheduler tasks on the same reactor thread.
pub struct Sde {
	db: Rc<RefCell<Db>>,
	clock: Clock,
	orphan_deadlines: HashMap<i64, f64>,
	wake: Rc<Notify>,
}

impl Sde {
	pub fn new(clock: Clock) -> Self {
		Self {
			db: Rc::new(RefCell::new(Db::new())),
			clock,
			orphan_deadlines: HashMap::new(),
			wake: Rc::new(Notify::new()),
		}
	}

	pub fn clock(&self) -> &Clock {
		&self.clock
	}

	/// A clone of the `Notify` the orphan sweep loop in `server.rs`
	/// awaits alongside its deadline sleep, so newly-installed timers
	/// that are nearer than the currently-scheduled wakeup take effect
	/// immediately instead of waiting for the stale one to fire first.
	pub fn orphan_wake(&self) -> Rc<Notify> {
		Rc::clone(&self.wake)
	}

	/// The nearest pending orphan deadline, if any. `server.rs` sleeps
	/// until this (or is woken early by [`Sde::orphan_wake`]) and then
	/// calls [`Sde::sweep_orphans`].
	pub fn next_orphan_deadline(&self) -> Option<f64> {
		self.orphan_deadlines.values().copied().reduce(f64::min)
	}

	fn get_or_create_client(&mut self, client_id: i64) -> ClientHandle {
		if let Some(client) = self.db.borrow().get_client(client_id) {
			return client;
		}
		let client = Rc::new(RefCell::new(Client::new(client_id, Rc::downgrade(&self.db))));
		self.db.borrow_mut().add_client(client_id, Rc::clone(&client));
		client
	}

	fn client(&self, client_id: i64) -> ClientHandle {
		self.db.borrow().get_client(client_id).expect("operation on a client with no handshake record")
	}

	fn fan_out(&self, change: ChangeKind, service: &ServiceHandle) -> Vec<SubEvent> {
		let mut events = Vec::new();
		let s = service.borrow();
		self.db.borrow().foreach_sub(|sub_id, sub| {
			if let Some(match_kind) = sub.borrow().notify(change, &s) {
				events.push(SubEvent {
					sub_id,
					match_kind,
					service: Rc::clone(service),
				});
			}
		});
		events
	}

	/// Installs, resets, or cancels the orphan timer for `service`
	/// following the table in `spec.md` §4.6, given the change that was
	/// just committed.
	fn sync_orphan_timer(&mut self, change: ChangeKind, service: &ServiceHandle) {
		let (service_id, was_orphan, is_orphan) = {
			let s = service.borrow();
			(s.id(), s.was_orphan(), s.is_orphan())
		};

		let should_install = match change {
			ChangeKind::Added => is_orphan,
			ChangeKind::Modified => is_orphan,
			ChangeKind::Removed => false,
		};
		let should_cancel = match change {
			ChangeKind::Added => false,
			ChangeKind::Modified => was_orphan && !is_orphan,
			ChangeKind::Removed => was_orphan,
		};

		if should_install {
			let deadline = {
				let s = service.borrow();
				s.orphan_since().unwrap() + s.ttl() as f64 + EPOLL_ROUNDING_ERROR_MARGIN
			};
			self.orphan_deadlines.insert(service_id, deadline);
			self.wake.notify_one();
		} else if should_cancel {
			self.orphan_deadlines.remove(&service_id);
		}
	}

	/// `HELLO`/`RECONNECT` (`spec.md` §4.4): installs a fresh active
	/// connection for `client_id`, creating the client record on first
	/// contact.
	#[tracing::instrument(skip(self), err)]
	pub fn connect(&mut self, client_id: i64, remote_addr: String) -> Result<ConnHandle, FailReason> {
		let now = self.clock.now();
		let client = self.get_or_create_client(client_id);
		client.borrow_mut().reconnect(remote_addr, now)
	}

	/// `DISCONNECT` (`spec.md` §4.4): tears down the active connection
	/// of `client_id`, orphaning every service it anchored.
	#[tracing::instrument(skip(self))]
	pub fn disconnect(&mut self, client_id: i64) -> Vec<SubEvent> {
		let now = self.clock.now();
		let client = self.client(client_id);
		let outcome = client.borrow_mut().disconnect(now);

		let mut events = Vec::new();
		for service in &outcome.orphaned {
			self.sync_orphan_timer(ChangeKind::Modified, service);
			events.extend(self.fan_out(ChangeKind::Modified, service));
		}

		if outcome.client_became_stale {
			self.db.borrow_mut().del_client(client_id);
		}

		events
	}

	/// `PUBLISH` (`spec.md` §4.4).
	#[tracing::instrument(skip(self, props), err)]
	pub fn publish(
		&mut self,
		client_id: i64,
		service_id: i64,
		generation: i64,
		props: Props,
		ttl: i64,
	) -> Result<Vec<SubEvent>, FailReason> {
		let client = self.client(client_id);
		let changed = client.borrow_mut().publish(service_id, generation, props, ttl)?;

		let Some((service, kind)) = changed else {
			return Ok(Vec::new());
		};
		self.sync_orphan_timer(kind, &service);
		Ok(self.fan_out(kind, &service))
	}

	/// `UNPUBLISH` (`spec.md` §4.4).
	#[tracing::instrument(skip(self), err)]
	pub fn unpublish(&mut self, client_id: i64, service_id: i64) -> Result<Vec<SubEvent>, FailReason> {
		let client = self.client(client_id);
		let outcome = client.borrow_mut().unpublish(service_id)?;

		let mut events = Vec::new();
		if let Some(kind) = outcome.republish_kind {
			self.sync_orphan_timer(kind, &outcome.service);
			events.extend(self.fan_out(kind, &outcome.service));
		}
		self.sync_orphan_timer(outcome.removed_kind, &outcome.service);
		events.extend(self.fan_out(outcome.removed_kind, &outcome.service));
		Ok(events)
	}

	/// `SUBSCRIBE`, creation half. Activation (the database replay) is
	/// a distinct step — see [`Sde::activate_sub`] — because the wire
	/// protocol only replays after the `accept` has been sent
	/// (`spec.md` §4.5).
	#[tracing::instrument(skip(self, filter), err)]
	pub fn subscribe(&mut self, client_id: i64, sub_id: i64, filter: Option<Filter>) -> Result<(), FailReason> {
		let client = self.client(client_id);
		client.borrow_mut().create_sub(sub_id, filter)?;
		Ok(())
	}

	/// Replays every existing service through a just-activated
	/// subscription as though it had just been *added*, filtering as
	/// usual (`spec.md` §4.5).
	pub fn activate_sub(&self, sub_id: i64) -> Vec<SubEvent> {
		let db = self.db.borrow();
		let sub = db.get_sub(sub_id).expect("activate_sub on unknown subscription");

		let mut events = Vec::new();
		db.foreach_service(|_, service| {
			let s = service.borrow();
			if let Some(match_kind) = sub.borrow().notify(ChangeKind::Added, &s) {
				events.push(SubEvent {
					sub_id,
					match_kind,
					service: Rc::clone(service),
				});
			}
		});
		events
	}

	/// `UNSUBSCRIBE` (`spec.md` §4.4, §5 "Cancellation"). The caller is
	/// responsible for emitting the subscription's final `complete`
	/// before calling this, per the ordering spec §5 requires.
	#[tracing::instrument(skip(self), err)]
	pub fn unsubscribe(&mut self, client_id: i64, sub_id: i64) -> Result<(), FailReason> {
		let client = self.client(client_id);
		client.borrow_mut().unsubscribe(sub_id)
	}

	/// One-shot `services` enumeration (`spec.md` §6, supplemented per
	/// `SPEC_FULL.md` §B.1).
	pub fn services(&self, filter: Option<&Filter>) -> Vec<ServiceSnapshot> {
		let mut out = Vec::new();
		self.db.borrow().foreach_service(|_, service| {
			let s = service.borrow();
			if filter.map_or(true, |f| f.matches(s.props())) {
				out.push(ServiceSnapshot {
					service_id: s.id(),
					generation: s.generation(),
					props: s.props().clone(),
					ttl: s.ttl(),
					owner_client_id: s.owner_client_id(),
					orphan_since: s.orphan_since(),
				});
			}
		});
		out
	}

	/// One-shot `subscriptions` enumeration.
	pub fn subscriptions(&self) -> Vec<SubscriptionSnapshot> {
		let mut out = Vec::new();
		self.db.borrow().foreach_sub(|_, sub| {
			let s = sub.borrow();
			out.push(SubscriptionSnapshot {
				subscription_id: s.id(),
				client_id: s.owner_client_id(),
				filter: s.filter().cloned(),
			});
		});
		out
	}

	/// One-shot `clients` enumeration. Unlike the reference's
	/// `sd_foreach_client`, which reads `conn_get_remote_addr`/
	/// `conn_get_connected_at` off a client unconditionally (and so
	/// would read through a null connection pointer for a client that
	/// has disconnected but not yet gone stale), this only reports
	/// clients with a live active connection — a disconnected client
	/// that still owns orphaned services has no `client-address`/`time`
	/// to report until it reconnects or is reaped.
	pub fn clients(&self) -> Vec<ClientSnapshot> {
		let mut out = Vec::new();
		self.db.borrow().foreach_client(|client_id, client| {
			let c = client.borrow();
			if let (Some(client_address), Some(time)) = (c.active_remote_addr(), c.active_connected_at()) {
				out.push(ClientSnapshot {
					client_id,
					client_address,
					time,
				});
			}
		});
		out
	}

	/// Reaps every service whose orphan deadline has passed, treating
	/// each as an `UNPUBLISH` by its recorded owner (`spec.md` §4.6).
	/// Called by `server.rs`'s orphan sweep loop after waking at
	/// [`Sde::next_orphan_deadline`].
	pub fn sweep_orphans(&mut self) -> Vec<SubEvent> {
		let now = self.clock.now();
		let due: Vec<i64> = self
			.orphan_deadlines
			.iter()
			.filter(|(_, &deadline)| deadline <= now)
			.map(|(&service_id, _)| service_id)
			.collect();

		let mut events = Vec::new();
		for service_id in due {
			self.orphan_deadlines.remove(&service_id);
			let Some(service) = self.db.borrow().get_service(service_id) else {
				continue;
			};
			let owner_id = service.borrow().owner_client_id();
			let owner = self.client(owner_id);
			let (purged, kind, became_stale) = owner.borrow_mut().purge_orphan(service_id);
			events.extend(self.fan_out(kind, &purged));
			if became_stale {
				self.db.borrow_mut().del_client(owner_id);
			}
		}
		events
	}
}
