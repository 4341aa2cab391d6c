mod store;

pub use store::{SubscriptionStats, SubscriptionStore};
