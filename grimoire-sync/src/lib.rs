//! # grimoire-sync
//!
//! Live synchronization engine: the push path and the viewer fan-out.
//!
//! Call [`LiveSync::push`] to authenticate, validate and commit a figure, and
//! [`LiveSync::subscribe`] to follow changes under a path prefix.

pub mod auth;
pub mod coordinator;
pub mod engine;
pub mod error;
pub mod hub;
pub mod read;

pub use auth::{AuthFailure, SecretGate, SECRET_HEADER};
pub use coordinator::{PushOutcome, UpdateCoordinator};
pub use engine::LiveSync;
pub use error::SyncError;
pub use hub::{ChangeEvent, HubEvent, Subscription, SubscriptionHub, DEFAULT_QUEUE_CAPACITY};
pub use read::{PollOutcome, ReadApi};
