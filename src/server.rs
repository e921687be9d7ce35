//! Listening socket, accept loop, and handshake-deadline sweep
//! (`spec.md` §5, §6).
//!
//! The core's transport is an abstract capability (`spec.md` §6); this
//! module is the binary-level choice of transport (plain TCP) layered
//! over the transport-agnostic `scheduler::Connection<T>`, in the same
//! spirit as the teacher's `bin/mqtt.rs` picking a concrete socket type
//! for its otherwise transport-generic client.

use crate::clock::Clock;
use crate::config::Config;
use crate::scheduler::{Connection, ConnectionMeta, Router, RouterHandle};
use crate::sde::Sde;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::LocalSet;

type ConnectionId = u64;

#[derive(Default)]
struct Registry {
	next_id: ConnectionId,
	connections: HashMap<ConnectionId, ConnectionMeta>,
}

impl Registry {
	fn insert(&mut self, meta: ConnectionMeta) -> ConnectionId {
		let id = self.next_id;
		self.next_id += 1;
		self.connections.insert(id, meta);
		id
	}

	fn remove(&mut self, id: ConnectionId) {
		self.connections.remove(&id);
	}
}

/// The broker server: owns the SDE, the subscription router, and the
/// set of live connections.
#[derive(Clone)]
pub struct Server {
	config: Config,
	sde: Rc<RefCell<Sde>>,
	router: RouterHandle,
	registry: Rc<RefCell<Registry>>,
}

impl Server {
	pub fn new(config: Config) -> Self {
		Self {
			config,
			sde: Rc::new(RefCell::new(Sde::new(Clock::new()))),
			router: Rc::new(RefCell::new(Router::default())),
			registry: Rc::new(RefCell::new(Registry::default())),
		}
	}

	/// Binds every configured listen address and runs the reactor
	/// until `shutdown` resolves, at which point in-flight requests are
	/// allowed to drain up to the next multiplexer block before
	/// returning (`spec.md` §6).
	pub async fn run(self, shutdown: impl std::future::Future<Output = ()>) -> crate::Result<()> {
		let local = LocalSet::new();
		let mut listeners = Vec::with_capacity(self.config.listen_addrs.len());
		for addr in &self.config.listen_addrs {
			let listener = TcpListener::bind(addr).await?;
			tracing::info!(%addr, "listening");
			listeners.push(listener);
		}

		for listener in listeners {
			local.spawn_local(self.clone().accept_loop(listener));
		}
		local.spawn_local(self.clone().handshake_sweep());
		local.spawn_local(self.clone().orphan_sweep());

		tokio::select! {
			_ = local.run_until(std::future::pending::<()>()) => {}
			_ = shutdown => {
				tracing::info!("shutdown signal received, draining");
			}
		}

		Ok(())
	}

	async fn accept_loop(self, listener: TcpListener) {
		loop {
			let (stream, remote_addr) = match listener.accept().await {
				Ok(pair) => pair,
				Err(error) => {
					tracing::warn!(%error, "accept failed");
					continue;
				}
			};
			if let Err(error) = stream.set_nodelay(true) {
				tracing::debug!(%error, "failed to set TCP_NODELAY");
			}
			tokio::task::spawn_local(self.clone().serve(stream, remote_addr.to_string()));
		}
	}

	#[tracing::instrument(skip_all, fields(%remote_addr))]
	async fn serve(self, stream: TcpStream, remote_addr: String) {
		let established_at = self.sde.borrow().clock().now();
		let mut connection = Connection::new(stream, remote_addr, established_at);
		let id = self.registry.borrow_mut().insert(connection.meta());

		connection.run(&self.sde, &self.router).await;

		self.registry.borrow_mut().remove(id);
	}

	/// `spec.md` §5: every `handshake_sweep_interval`, drop any
	/// connection older than `max_handshake_time` that hasn't
	/// completed its `hello`.
	async fn handshake_sweep(self) {
		let mut interval = tokio::time::interval(self.config.handshake_sweep_interval);
		loop {
			interval.tick().await;
			let now = self.sde.borrow().clock().now();
			let max_age = self.config.max_handshake_time.as_secs_f64();
			for meta in self.registry.borrow().connections.values() {
				if !meta.is_handshaken() && now - meta.established_at > max_age {
					tracing::warn!(established_at = meta.established_at, "handshake deadline exceeded");
					meta.kill();
				}
			}
		}
	}

	/// `spec.md` §4.6: sleeps until the nearest orphan deadline (or is
	/// woken early by a fresher one being installed), then reaps every
	/// service whose deadline has passed.
	async fn orphan_sweep(self) {
		let wake = self.sde.borrow().orphan_wake();
		loop {
			let deadline = self.sde.borrow().next_orphan_deadline();
			match deadline {
				Some(at) => {
					let instant = self.sde.borrow().clock().instant_at(at);
					tokio::select! {
						_ = tokio::time::sleep_until(instant) => {}
						_ = wake.notified() => continue,
					}
				}
				None => {
					wake.notified().await;
					continue;
				}
			}

			let events = self.sde.borrow_mut().sweep_orphans();
			self.router.borrow().deliver(events);
		}
	}
}
