pub mod traffic;

pub use traffic::{TopicMessage, TopicSubscription, TrafficNotifier, TrafficUpdate};
