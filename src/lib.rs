//! # sdbroker
//!
//! An in-memory, single-threaded service-discovery broker (`spec.md`
//! §1). Clients connect over a message-framed transport, publish
//! records describing services, and install standing subscriptions
//! expressed as filter expressions over those records' properties.
//! The broker notifies subscribers as the matching set changes and
//! reaps records whose owner has disconnected once their TTL elapses.

pub mod config;

mod client;
mod conn;
mod db;
mod error;
mod filter;
mod generation;
mod proto;
mod props;
mod scheduler;
mod sde;
mod server;
mod service;
mod sub;
mod value;

pub mod clock;

pub use clock::Clock;
pub use config::Config;
pub use error::{Error, Result};
pub use filter::{Filter, FilterError};
pub use proto::{FailReason, PROTOCOL_VERSION};
pub use props::Props;
pub use sde::{ClientSnapshot, Sde, ServiceSnapshot, SubEvent, SubscriptionSnapshot};
pub use server::Server;
pub use sub::MatchKind;
pub use value::Value;
