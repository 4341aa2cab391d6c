pub mod cache;
pub mod commands;
pub mod corrections;
pub mod events;
pub mod ids;
pub mod inbound;
pub mod interaction;
pub mod notification;
pub mod spawn;
pub mod species;
pub mod subscriptions;

pub use ids::{CorrelationId, MessageRef, ScopeId, SubscriberId};
