//! # Message Bus
//!
//! A synchronous, type-safe, hierarchical message bus for in-process
//! notifications.
//!
//! ## Overview
//!
//! Buses form a tree (application bus → module buses → session buses). A producer
//! asks any node for the [`Publisher`] of a [`Topic`] and calls it exactly like it
//! would call a subscriber; the call is fanned out to every subscriber registered
//! for that topic on the nodes selected by the topic's [`BroadcastDirection`].
//!
//! ```text
//!                 ┌───────────┐
//!                 │  app bus  │ ◄── TO_PARENT walks up to here
//!                 └─────┬─────┘
//!            ┌──────────┴──────────┐
//!      ┌─────┴─────┐         ┌─────┴─────┐
//!      │ module A  │ origin  │ module B  │
//!      └─────┬─────┘         └───────────┘
//!      ┌─────┴─────┐
//!      │ session 1 │ ◄── TO_CHILDREN / TO_DIRECT_CHILDREN reach down to here
//!      └───────────┘
//! ```
//!
//! ## Features
//!
//! * **Typed topics**: a topic binds a name, a capability trait and a direction.
//! * **Call-like publishing**: [`capability!`] makes the publisher implement the
//!   capability trait itself.
//! * **Failure isolation**: a subscriber returning an error or panicking never stops
//!   the fan-out; failures are batched to the node's [`ExceptionHandler`].
//! * **Thread-safe**: `FxHashMap` + `parking_lot::RwLock`, no lock held while
//!   subscribers run.
//!
//! # Example
//!
//! ```rust
//! use canopy_bus::{capability, Delivery, MessageBus, Topic};
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//!
//! capability! {
//!     /// Receives session lifecycle notifications.
//!     pub trait SessionListener {
//!         fn opened(&self, session: u64) -> Delivery;
//!     }
//! }
//!
//! static SESSIONS: Topic<dyn SessionListener> = Topic::new("sessions");
//!
//! struct Counter(AtomicUsize);
//!
//! impl SessionListener for Counter {
//!     fn opened(&self, _session: u64) -> Delivery {
//!         self.0.fetch_add(1, Ordering::Relaxed);
//!         Ok(())
//!     }
//! }
//!
//! let app = MessageBus::new();
//! let module = app.child();
//!
//! let counter = Arc::new(Counter(AtomicUsize::new(0)));
//! module.subscribe(&SESSIONS, counter.clone());
//!
//! // TO_CHILDREN is the default direction: publishing on the app reaches the module.
//! app.publisher(&SESSIONS).opened(7).unwrap();
//! assert_eq!(counter.0.load(Ordering::Relaxed), 1);
//! ```

mod bus;
mod capability;
mod error;
mod failure;
mod publisher;
mod topic;

pub use bus::{BusBuilder, MessageBus};
pub use error::{BoxError, Delivery, DeliveryError, DeliveryErrorExt};
pub use failure::ExceptionHandler;
pub use publisher::{Operation, Publisher};
pub use topic::{BroadcastDirection, Topic, TopicId};
