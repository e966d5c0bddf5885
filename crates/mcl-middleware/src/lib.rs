//! `mcl-middleware` – in-process transport for the localization node.
//!
//! # Modules
//!
//! - [`bus`] – typed, topic-based publish/subscribe event bus built on Tokio
//!   broadcast channels.  Sensor drivers publish scans and odometry to it;
//!   the node publishes particle clouds, pose estimates and frame
//!   corrections back.

pub mod bus;

pub use bus::{EventBus, Topic, TopicReceiver};
