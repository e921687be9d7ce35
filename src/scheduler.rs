//! The per-connection scheduler (`spec.md` §4.8): request dispatch,
//! the outbound queue, handshake gating, and the registry that routes
//! a subscription's notify stream back to the connection that owns it.
//!
//! Grounded on `original_source/src/proto/proto_conn.c`: `try_receive`/
//! `try_send`/`await_update` there drive a raw, non-blocking socket and
//! an epoll-style readiness condition per `MAX_RECEIVE_BATCH`/
//! `MAX_SEND_BATCH`/`SOFT_OUT_WIRE_LIMIT`; this crate's transport is
//! already `async`, so the readiness condition becomes a `tokio::select!`
//! gate and the two batch loops become bounded `for` loops around
//! `.await` points, in the style of the teacher's own reactor loop in
//! `async_client/task/mod.rs`.

use crate::filter::Filter;
use crate::props::Props;
use crate::proto::schema::{Command, TransactionType};
use crate::proto::{self, FailReason, Message, MessageStream, PeerViolation, Transaction};
use crate::sde::{ClientSnapshot, Sde, ServiceSnapshot, SubEvent, SubscriptionSnapshot};
use crate::service::ServiceHandle;
use crate::sub::MatchKind;
use serde::Deserialize;
use serde_json::{Map, Value as Json};
use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::Notify;

pub const MAX_RECEIVE_BATCH: usize = 4;
pub const MAX_SEND_BATCH: usize = 64;
pub const SOFT_OUT_WIRE_LIMIT: usize = 128;

/// A connection's outbound FIFO, shared between the connection task
/// that drains it and whichever code (this connection's own dispatch,
/// or another connection's fan-out via [`Router`]) enqueues onto it.
#[derive(Clone)]
pub struct Outbox(Rc<OutboxState>);

struct OutboxState {
	queue: RefCell<VecDeque<Message>>,
	wake: Notify,
}

impl Outbox {
	pub fn new() -> Self {
		Self(Rc::new(OutboxState {
			queue: RefCell::new(VecDeque::new()),
			wake: Notify::new(),
		}))
	}

	pub fn push(&self, message: Message) {
		self.0.queue.borrow_mut().push_back(message);
		self.0.wake.notify_one();
	}

	pub fn pop(&self) -> Option<Message> {
		self.0.queue.borrow_mut().pop_front()
	}

	pub fn len(&self) -> usize {
		self.0.queue.borrow().len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	pub async fn notified(&self) {
		self.0.wake.notified().await
	}
}

impl Default for Outbox {
	fn default() -> Self {
		Self::new()
	}
}

/// A live `subscribe` transaction: the per-request state machine plus
/// the outbox of whichever connection created it. Stored both in that
/// connection's own `sub_tas` (for cleanup on unsubscribe/disconnect)
/// and in the shared [`Router`] (so another connection's `publish` can
/// reach it).
pub struct SubTransaction {
	pub transaction: Transaction,
	pub outbox: Outbox,
}

pub type SubTransactionHandle = Rc<RefCell<SubTransaction>>;

/// Maps subscription-id to the connection that owns it, independent
/// of that connection's transport type — `spec.md` §9's note that
/// subscription fan-out must reach across connections without the
/// core depending on socket details.
#[derive(Default)]
pub struct Router {
	subs: HashMap<i64, SubTransactionHandle>,
}

pub type RouterHandle = Rc<RefCell<Router>>;

impl Router {
	pub fn register(&mut self, sub_id: i64, sub_ta: SubTransactionHandle) {
		self.subs.insert(sub_id, sub_ta);
	}

	pub fn unregister(&mut self, sub_id: i64) {
		self.subs.remove(&sub_id);
	}

	/// Turns each [`SubEvent`] into a `notify` message on its owning
	/// subscription's transaction and enqueues it on that connection's
	/// outbox. Events for a subscription this router no longer knows
	/// about (already unsubscribed, or owned by a connection that has
	/// since disconnected) are silently dropped.
	pub fn deliver(&self, events: Vec<SubEvent>) {
		for event in events {
			let Some(sub_ta) = self.subs.get(&event.sub_id) else {
				continue;
			};
			let fields = notify_fields_for_event(event.match_kind, &event.service);
			let message = sub_ta.borrow_mut().transaction.notify(fields);
			sub_ta.borrow().outbox.push(message);
		}
	}
}

fn notify_fields_for_event(match_kind: MatchKind, service: &ServiceHandle) -> Map<String, Json> {
	let mut fields = Map::new();
	let s = service.borrow();
	fields.insert("match-type".into(), Json::String(match_kind.as_str().into()));
	fields.insert("service-id".into(), Json::from(s.id()));
	if match_kind != MatchKind::Disappeared {
		fields.insert("generation".into(), Json::from(s.generation()));
		fields.insert("service-props".into(), serde_json::to_value(s.props()).expect("Props always serializes"));
		fields.insert("ttl".into(), Json::from(s.ttl()));
		fields.insert("client-id".into(), Json::from(s.owner_client_id()));
		if let Some(since) = s.orphan_since() {
			fields.insert("orphan-since".into(), serde_json::json!(since));
		}
	}
	fields
}

fn service_snapshot_fields(s: &ServiceSnapshot) -> Map<String, Json> {
	let mut fields = Map::new();
	fields.insert("service-id".into(), Json::from(s.service_id));
	fields.insert("generation".into(), Json::from(s.generation));
	fields.insert("service-props".into(), serde_json::to_value(&s.props).expect("Props always serializes"));
	fields.insert("ttl".into(), Json::from(s.ttl));
	fields.insert("client-id".into(), Json::from(s.owner_client_id));
	if let Some(since) = s.orphan_since {
		fields.insert("orphan-since".into(), serde_json::json!(since));
	}
	fields
}

fn subscription_snapshot_fields(s: &SubscriptionSnapshot) -> Map<String, Json> {
	let mut fields = Map::new();
	fields.insert("subscription-id".into(), Json::from(s.subscription_id));
	fields.insert("client-id".into(), Json::from(s.client_id));
	if let Some(filter) = &s.filter {
		fields.insert("filter".into(), Json::String(filter.to_string()));
	}
	fields
}

fn client_snapshot_fields(s: &ClientSnapshot) -> Map<String, Json> {
	let mut fields = Map::new();
	fields.insert("client-id".into(), Json::from(s.client_id));
	fields.insert("client-address".into(), Json::String(s.client_address.clone()));
	fields.insert("time".into(), Json::from(s.time as i64));
	fields
}

/// Shared with the handshake-deadline sweep in `server.rs`: lets it
/// inspect a connection's age and force a teardown without holding a
/// reference to the connection's transport type.
#[derive(Clone)]
pub struct ConnectionMeta {
	pub established_at: f64,
	handshaken: Rc<Cell<bool>>,
	kill: Rc<Notify>,
}

impl ConnectionMeta {
	fn new(established_at: f64) -> Self {
		Self {
			established_at,
			handshaken: Rc::new(Cell::new(false)),
			kill: Rc::new(Notify::new()),
		}
	}

	pub fn is_handshaken(&self) -> bool {
		self.handshaken.get()
	}

	/// Forces the connection's run loop to exit at its next await
	/// point. Used by the handshake sweep (`spec.md` §5) to drop
	/// connections that never completed their `hello`.
	pub fn kill(&self) {
		self.kill.notify_one();
	}
}

/// One connection's scheduler state (`spec.md` §4.8): the framed
/// stream, its outbound queue, the client-id bound at handshake, and
/// the subscriptions it owns.
pub struct Connection<T> {
	stream: MessageStream<T>,
	outbox: Outbox,
	meta: ConnectionMeta,
	remote_addr: String,
	client_id: Option<i64>,
	sub_tas: HashMap<i64, SubTransactionHandle>,
}

impl<T> Connection<T> {
	pub fn new(stream: T, remote_addr: String, established_at: f64) -> Self {
		Self {
			stream: MessageStream::new(stream, 4096),
			outbox: Outbox::new(),
			meta: ConnectionMeta::new(established_at),
			remote_addr,
			client_id: None,
			sub_tas: HashMap::new(),
		}
	}

	pub fn meta(&self) -> ConnectionMeta {
		self.meta.clone()
	}

	fn receivable(&self) -> bool {
		self.outbox.len() < SOFT_OUT_WIRE_LIMIT
	}
}

impl<T: AsyncRead + AsyncWrite + Unpin> Connection<T> {
	/// Drives this connection to completion: dispatch requests,
	/// deliver queued responses, until the peer disconnects, commits a
	/// protocol violation, or the handshake sweep kills it.
	///
	/// On return the caller must remove `self.meta()` from its
	/// registry and, if the handshake completed, call
	/// [`Sde::disconnect`] and [`Router::unregister`] for every
	/// subscription this connection owned.
	#[tracing::instrument(skip_all, fields(client_id = ?self.client_id))]
	pub async fn run(&mut self, sde: &Rc<RefCell<Sde>>, router: &RouterHandle) {
		loop {
			if let Err(violation) = self.try_send_batch().await {
				tracing::warn!(%violation, "connection write failed");
				break;
			}

			if !self.outbox.is_empty() {
				// A full send batch didn't drain it; keep flushing
				// before going back to read.
				continue;
			}

			tokio::select! {
				biased;

				_ = self.meta.kill.notified() => {
					tracing::warn!("connection killed (handshake deadline exceeded)");
					break;
				}

				_ = self.outbox.notified() => continue,

				result = self.stream.read_message(), if self.receivable() => {
					match result {
						Ok(Some(message)) => {
							if let Err(violation) = self.handle_request(message, sde, router) {
								tracing::warn!(%violation, "tearing down connection");
								break;
							}
							if !self.drain_buffered_batch(sde, router) {
								break;
							}
						}
						Ok(None) => {
							tracing::debug!("peer closed connection");
							break;
						}
						Err(violation) => {
							tracing::warn!(%violation, "tearing down connection");
							break;
						}
					}
				}
			}
		}

		self.teardown(sde, router);
	}

	/// Drains up to `MAX_RECEIVE_BATCH - 1` further requests already
	/// sitting in the read buffer before yielding back to `select!`,
	/// matching the bounded-batch shape of `try_receive` in
	/// `proto_conn.c` without an extra socket read per message.
	fn drain_buffered_batch(&mut self, sde: &Rc<RefCell<Sde>>, router: &RouterHandle) -> bool {
		for _ in 1..MAX_RECEIVE_BATCH {
			match self.stream.try_read_buffered() {
				Ok(Some(message)) => {
					if let Err(violation) = self.handle_request(message, sde, router) {
						tracing::warn!(%violation, "tearing down connection");
						return false;
					}
				}
				Ok(None) => break,
				Err(violation) => {
					tracing::warn!(%violation, "tearing down connection");
					return false;
				}
			}
		}
		true
	}

	async fn try_send_batch(&mut self) -> std::io::Result<()> {
		for _ in 0..MAX_SEND_BATCH {
			let Some(message) = self.outbox.pop() else {
				break;
			};
			self.stream.write_message(&message).await?;
		}
		Ok(())
	}

	fn handle_request(&mut self, message: Message, sde: &Rc<RefCell<Sde>>, router: &RouterHandle) -> Result<(), PeerViolation> {
		let ty = proto::message::lookup_schema(&message.cmd)?;

		if self.client_id.is_none() && ty.cmd != Command::Hello {
			return Err(PeerViolation::HandshakeRequired);
		}

		proto::message::validate_request(ty, &message)?;

		match ty.cmd {
			Command::Hello => self.handle_hello(&message, ty, sde),
			Command::Publish => self.handle_publish(&message, ty, sde, router),
			Command::Unpublish => self.handle_unpublish(&message, ty, sde, router),
			Command::Subscribe => self.handle_subscribe(&message, ty, sde, router),
			Command::Unsubscribe => self.handle_unsubscribe(&message, ty, sde, router),
			Command::Ping => self.handle_ping(&message, ty),
			Command::Services => self.handle_services(&message, ty, sde),
			Command::Subscriptions => self.handle_subscriptions(&message, ty, sde),
			Command::Clients => self.handle_clients(&message, ty, sde),
		}
		Ok(())
	}

	fn handle_hello(&mut self, message: &Message, ty: &'static TransactionType, sde: &Rc<RefCell<Sde>>) {
		let mut ta = Transaction::new(message.id, ty);
		let client_id = message.field("client-id").unwrap().as_i64().unwrap();
		let min_version = message.field("protocol-minimum-version").unwrap().as_i64().unwrap();
		let max_version = message.field("protocol-maximum-version").unwrap().as_i64().unwrap();

		if let Some(existing) = self.client_id {
			let response = if existing == client_id {
				let mut fields = Map::new();
				fields.insert("protocol-version".into(), Json::from(proto::PROTOCOL_VERSION));
				ta.complete(fields)
			} else {
				ta.fail(FailReason::PermissionDenied)
			};
			self.outbox.push(response);
			return;
		}

		if min_version > proto::PROTOCOL_VERSION || max_version < proto::PROTOCOL_VERSION {
			self.outbox.push(ta.fail(FailReason::UnsupportedProtocolVersion));
			// The broker does not re-handshake after a failed hello on
			// the same connection (`spec.md` §8 scenario 1); the peer
			// must reconnect.
			self.meta.kill();
			return;
		}

		match sde.borrow_mut().connect(client_id, self.remote_addr.clone()) {
			Ok(_conn) => {
				self.client_id = Some(client_id);
				self.meta.handshaken.set(true);
				let mut fields = Map::new();
				fields.insert("protocol-version".into(), Json::from(proto::PROTOCOL_VERSION));
				self.outbox.push(ta.complete(fields));
			}
			Err(reason) => {
				self.outbox.push(ta.fail(reason));
				self.meta.kill();
			}
		}
	}

	fn handle_publish(&mut self, message: &Message, ty: &'static TransactionType, sde: &Rc<RefCell<Sde>>, router: &RouterHandle) {
		let mut ta = Transaction::new(message.id, ty);
		let service_id = message.field("service-id").unwrap().as_i64().unwrap();
		let generation = message.field("generation").unwrap().as_i64().unwrap();
		let ttl = message.field("ttl").unwrap().as_i64().unwrap();
		let props = Props::deserialize(message.field("service-props").unwrap()).expect("service-props already validated");

		match sde.borrow_mut().publish(self.client_id.unwrap(), service_id, generation, props, ttl) {
			Ok(events) => {
				// Subscribers must observe the change before this
				// request completes on its own connection (`spec.md`
				// §5 Ordering guarantees), so notify before complete.
				router.borrow().deliver(events);
				self.outbox.push(ta.complete(Map::new()));
			}
			Err(reason) => self.outbox.push(ta.fail(reason)),
		}
	}

	fn handle_unpublish(&mut self, message: &Message, ty: &'static TransactionType, sde: &Rc<RefCell<Sde>>, router: &RouterHandle) {
		let mut ta = Transaction::new(message.id, ty);
		let service_id = message.field("service-id").unwrap().as_i64().unwrap();

		match sde.borrow_mut().unpublish(self.client_id.unwrap(), service_id) {
			Ok(events) => {
				// Same ordering requirement as `handle_publish`: notify
				// subscribers before completing this request.
				router.borrow().deliver(events);
				self.outbox.push(ta.complete(Map::new()));
			}
			Err(reason) => self.outbox.push(ta.fail(reason)),
		}
	}

	fn handle_subscribe(&mut self, message: &Message, ty: &'static TransactionType, sde: &Rc<RefCell<Sde>>, router: &RouterHandle) {
		let mut ta = Transaction::new(message.id, ty);
		let sub_id = message.field("subscription-id").unwrap().as_i64().unwrap();
		let filter = match message.field("filter").and_then(Json::as_str) {
			Some(raw) => match Filter::parse(raw) {
				Ok(f) => Some(f),
				Err(_) => {
					self.outbox.push(ta.fail(FailReason::InvalidFilterSyntax));
					return;
				}
			},
			None => None,
		};

		if let Err(reason) = sde.borrow_mut().subscribe(self.client_id.unwrap(), sub_id, filter) {
			self.outbox.push(ta.fail(reason));
			return;
		}

		self.outbox.push(ta.accept());
		let sub_ta = Rc::new(RefCell::new(SubTransaction {
			transaction: ta,
			outbox: self.outbox.clone(),
		}));
		self.sub_tas.insert(sub_id, Rc::clone(&sub_ta));
		router.borrow_mut().register(sub_id, sub_ta);

		let events = sde.borrow().activate_sub(sub_id);
		router.borrow().deliver(events);
	}

	fn handle_unsubscribe(&mut self, message: &Message, ty: &'static TransactionType, sde: &Rc<RefCell<Sde>>, router: &RouterHandle) {
		let mut ta = Transaction::new(message.id, ty);
		let sub_id = message.field("subscription-id").unwrap().as_i64().unwrap();

		// `Sde::unsubscribe` requires the subscribe transaction's own
		// `complete` to have already been sent. A subscription this
		// connection didn't register locally can't be completed here
		// regardless of how `Sde::unsubscribe` rules on it below.
		if let Some(sub_ta) = self.sub_tas.get(&sub_id) {
			let completion = sub_ta.borrow_mut().transaction.complete(Map::new());
			self.outbox.push(completion);
		}

		match sde.borrow_mut().unsubscribe(self.client_id.unwrap(), sub_id) {
			Ok(()) => {
				self.sub_tas.remove(&sub_id);
				router.borrow_mut().unregister(sub_id);
				self.outbox.push(ta.complete(Map::new()));
			}
			Err(reason) => self.outbox.push(ta.fail(reason)),
		}
	}

	fn handle_ping(&mut self, message: &Message, ty: &'static TransactionType) {
		let mut ta = Transaction::new(message.id, ty);
		self.outbox.push(ta.complete(Map::new()));
	}

	fn handle_services(&mut self, message: &Message, ty: &'static TransactionType, sde: &Rc<RefCell<Sde>>) {
		let mut ta = Transaction::new(message.id, ty);
		let filter = match message.field("filter").and_then(Json::as_str) {
			Some(raw) => match Filter::parse(raw) {
				Ok(f) => Some(f),
				Err(_) => {
					self.outbox.push(ta.fail(FailReason::InvalidFilterSyntax));
					return;
				}
			},
			None => None,
		};

		self.outbox.push(ta.accept());
		for snapshot in sde.borrow().services(filter.as_ref()) {
			self.outbox.push(ta.notify(service_snapshot_fields(&snapshot)));
		}
		self.outbox.push(ta.complete(Map::new()));
	}

	fn handle_subscriptions(&mut self, message: &Message, ty: &'static TransactionType, sde: &Rc<RefCell<Sde>>) {
		let mut ta = Transaction::new(message.id, ty);
		self.outbox.push(ta.accept());
		for snapshot in sde.borrow().subscriptions() {
			self.outbox.push(ta.notify(subscription_snapshot_fields(&snapshot)));
		}
		self.outbox.push(ta.complete(Map::new()));
	}

	fn handle_clients(&mut self, message: &Message, ty: &'static TransactionType, sde: &Rc<RefCell<Sde>>) {
		let mut ta = Transaction::new(message.id, ty);
		self.outbox.push(ta.accept());
		for snapshot in sde.borrow().clients() {
			self.outbox.push(ta.notify(client_snapshot_fields(&snapshot)));
		}
		self.outbox.push(ta.complete(Map::new()));
	}

	/// Releases everything this connection owned: every subscription
	/// it registered (removed from both the router and the SDE) and,
	/// if the handshake completed, the client's active connection
	/// (`spec.md` §4.4 DISCONNECT).
	fn teardown(&mut self, sde: &Rc<RefCell<Sde>>, router: &RouterHandle) {
		for sub_id in self.sub_tas.keys() {
			router.borrow_mut().unregister(*sub_id);
		}
		self.sub_tas.clear();

		if let Some(client_id) = self.client_id {
			let events = sde.borrow_mut().disconnect(client_id);
			router.borrow().deliver(events);
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::clock::Clock;
	use crate::proto::MsgType;
	use tokio::io::DuplexStream;

	fn harness() -> (Rc<RefCell<Sde>>, RouterHandle) {
		(Rc::new(RefCell::new(Sde::new(Clock::new()))), Rc::new(RefCell::new(Router::default())))
	}

	/// Drives a server-side `Connection` over one half of an in-memory
	/// duplex pipe and hands the test the other half as a raw
	/// `MessageStream`, matching `SPEC_FULL.md` §A.4's "no real socket
	/// needed" approach to exercising the scheduler.
	fn spawn_connection(sde: Rc<RefCell<Sde>>, router: RouterHandle) -> (tokio::task::JoinHandle<()>, MessageStream<DuplexStream>) {
		let (server_half, client_half) = tokio::io::duplex(64 * 1024);
		let mut connection = Connection::new(server_half, "test-peer".into(), 0.0);
		let handle = tokio::task::spawn_local(async move {
			connection.run(&sde, &router).await;
		});
		(handle, MessageStream::new(client_half, 4096))
	}

	fn hello(id: i64, client_id: i64, min: i64, max: i64) -> Message {
		let mut fields = Map::new();
		fields.insert("client-id".into(), Json::from(client_id));
		fields.insert("protocol-minimum-version".into(), Json::from(min));
		fields.insert("protocol-maximum-version".into(), Json::from(max));
		Message::request("hello", id, fields)
	}

	#[tokio::test]
	async fn hello_version_mismatch_fails_and_closes_connection() {
		let local = tokio::task::LocalSet::new();
		local
			.run_until(async {
				let (sde, router) = harness();
				let (handle, mut stream) = spawn_connection(sde, router);

				stream.write_message(&hello(1, 5, 3, 4)).await.unwrap();

				let response = stream.read_message().await.unwrap().unwrap();
				assert_eq!(response.msg_type, MsgType::Fail);
				assert_eq!(response.field("fail-reason").unwrap().as_str(), Some("unsupported-protocol-version"));

				// The broker tears the connection down rather than
				// accepting a second hello (`spec.md` §8 scenario 1).
				assert!(stream.read_message().await.unwrap().is_none());
				handle.await.unwrap();
			})
			.await;
	}

	#[tokio::test]
	async fn publish_then_subscribe_replays_appeared_across_connections() {
		let local = tokio::task::LocalSet::new();
		local
			.run_until(async {
				let (sde, router) = harness();

				let (a_handle, mut a) = spawn_connection(Rc::clone(&sde), Rc::clone(&router));
				a.write_message(&hello(1, 99, 2, 2)).await.unwrap();
				assert_eq!(a.read_message().await.unwrap().unwrap().msg_type, MsgType::Complete);

				let mut fields = Map::new();
				fields.insert("service-id".into(), Json::from(4444));
				fields.insert("generation".into(), Json::from(44));
				fields.insert("service-props".into(), serde_json::json!([["x", 17]]));
				fields.insert("ttl".into(), Json::from(1));
				a.write_message(&Message::request("publish", 2, fields)).await.unwrap();
				assert_eq!(a.read_message().await.unwrap().unwrap().msg_type, MsgType::Complete);

				let (b_handle, mut b) = spawn_connection(Rc::clone(&sde), Rc::clone(&router));
				b.write_message(&hello(1, 100, 2, 2)).await.unwrap();
				assert_eq!(b.read_message().await.unwrap().unwrap().msg_type, MsgType::Complete);

				let mut fields = Map::new();
				fields.insert("subscription-id".into(), Json::from(1234));
				fields.insert("filter".into(), Json::String("(x=17)".into()));
				b.write_message(&Message::request("subscribe", 2, fields)).await.unwrap();

				assert_eq!(b.read_message().await.unwrap().unwrap().msg_type, MsgType::Accept);
				let notify = b.read_message().await.unwrap().unwrap();
				assert_eq!(notify.msg_type, MsgType::Notify);
				assert_eq!(notify.field("match-type").unwrap().as_str(), Some("appeared"));
				assert_eq!(notify.field("service-id").unwrap().as_i64(), Some(4444));
				assert_eq!(notify.field("client-id").unwrap().as_i64(), Some(99));

				drop(a);
				a_handle.await.unwrap();
				drop(b);
				b_handle.await.unwrap();
			})
			.await;
	}

	#[tokio::test]
	async fn unsubscribe_completes_both_transactions_and_stops_notifications() {
		let local = tokio::task::LocalSet::new();
		local
			.run_until(async {
				let (sde, router) = harness();
				let (handle, mut conn) = spawn_connection(Rc::clone(&sde), Rc::clone(&router));

				conn.write_message(&hello(1, 1, 2, 2)).await.unwrap();
				assert_eq!(conn.read_message().await.unwrap().unwrap().msg_type, MsgType::Complete);

				let mut fields = Map::new();
				fields.insert("subscription-id".into(), Json::from(1));
				fields.insert("filter".into(), Json::String("(k=*)".into()));
				conn.write_message(&Message::request("subscribe", 2, fields)).await.unwrap();
				assert_eq!(conn.read_message().await.unwrap().unwrap().msg_type, MsgType::Accept);

				let mut fields = Map::new();
				fields.insert("subscription-id".into(), Json::from(1));
				conn.write_message(&Message::request("unsubscribe", 3, fields)).await.unwrap();

				let mut saw_unsubscribe_complete = false;
				let mut saw_subscribe_complete = false;
				for _ in 0..2 {
					let msg = conn.read_message().await.unwrap().unwrap();
					assert_eq!(msg.msg_type, MsgType::Complete);
					match msg.id {
						3 => saw_unsubscribe_complete = true,
						2 => saw_subscribe_complete = true,
						other => panic!("unexpected transaction id {other}"),
					}
				}
				assert!(saw_unsubscribe_complete && saw_subscribe_complete);

				drop(conn);
				handle.await.unwrap();
			})
			.await;
	}
}
