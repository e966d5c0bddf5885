//! Typed, topic-based publish/subscribe event bus.
//!
//! Uses [`tokio::sync::broadcast`] channels under the hood so that every
//! subscriber receives every message without any single subscriber blocking
//! the others.
//!
//! # Topics
//!
//! | Topic | Traffic | Direction |
//! |---|---|---|
//! | [`Topic::Scans`] | laser scans | into the node |
//! | [`Topic::Odometry`] | odom ← base samples | into the node |
//! | [`Topic::InitialPose`] | re-initialization requests | into the node |
//! | [`Topic::ParticleCloud`] | population snapshots | out of the node |
//! | [`Topic::PoseEstimate`] | map-frame pose estimates | out of the node |
//! | [`Topic::FrameCorrection`] | map ← odom transform, at a fixed rate | out of the node |
//! | [`Topic::Diagnostics`] | skipped cycles, rejected parameters | out of the node |

use mcl_types::{Event, EventPayload, LocError};
use tokio::sync::broadcast;
use tracing::warn;

/// Default channel capacity (number of buffered events before old ones are
/// dropped for slow subscribers).
const DEFAULT_CAPACITY: usize = 256;

/// Every routing lane on the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    Scans,
    Odometry,
    InitialPose,
    ParticleCloud,
    PoseEstimate,
    FrameCorrection,
    Diagnostics,
}

impl Topic {
    pub const ALL: [Topic; 7] = [
        Topic::Scans,
        Topic::Odometry,
        Topic::InitialPose,
        Topic::ParticleCloud,
        Topic::PoseEstimate,
        Topic::FrameCorrection,
        Topic::Diagnostics,
    ];

    /// The lane a payload travels on.
    pub fn of(payload: &EventPayload) -> Self {
        match payload {
            EventPayload::Scan(_) => Topic::Scans,
            EventPayload::Odometry(_) => Topic::Odometry,
            EventPayload::InitialPose(_) => Topic::InitialPose,
            EventPayload::ParticleCloud(_) => Topic::ParticleCloud,
            EventPayload::PoseEstimate(_) => Topic::PoseEstimate,
            EventPayload::FrameCorrection(_) => Topic::FrameCorrection,
            EventPayload::Diagnostic { .. } => Topic::Diagnostics,
        }
    }
}

/// Shared event bus.  Clone it cheaply – all clones share the same
/// underlying broadcast channels.
#[derive(Clone, Debug)]
pub struct EventBus {
    scans: broadcast::Sender<Event>,
    odometry: broadcast::Sender<Event>,
    initial_pose: broadcast::Sender<Event>,
    particle_cloud: broadcast::Sender<Event>,
    pose_estimate: broadcast::Sender<Event>,
    frame_correction: broadcast::Sender<Event>,
    diagnostics: broadcast::Sender<Event>,
}

impl EventBus {
    /// Create a new bus; `capacity` applies to every topic independently.
    pub fn new(capacity: usize) -> Self {
        Self {
            scans: broadcast::channel(capacity).0,
            odometry: broadcast::channel(capacity).0,
            initial_pose: broadcast::channel(capacity).0,
            particle_cloud: broadcast::channel(capacity).0,
            pose_estimate: broadcast::channel(capacity).0,
            frame_correction: broadcast::channel(capacity).0,
            diagnostics: broadcast::channel(capacity).0,
        }
    }

    /// Publish `event` to `topic`.
    ///
    /// Returns the number of receivers handed the event.
    ///
    /// # Errors
    ///
    /// [`LocError::Channel`] when nobody is subscribed to `topic`.
    pub fn publish_to(&self, topic: Topic, event: Event) -> Result<usize, LocError> {
        self.topic_sender(topic)
            .send(event)
            .map_err(|_| LocError::Channel(format!("no subscribers for topic {topic:?}")))
    }

    /// Publish `event` on the lane its payload belongs to.
    pub fn publish(&self, event: Event) -> Result<usize, LocError> {
        let topic = Topic::of(&event.payload);
        self.publish_to(topic, event)
    }

    /// Publish, treating "no subscribers" as a normal condition.
    pub fn broadcast(&self, event: Event) -> usize {
        self.publish(event).unwrap_or(0)
    }

    /// Subscribe to a single topic.
    pub fn subscribe_to(&self, topic: Topic) -> TopicReceiver {
        TopicReceiver {
            topic,
            receiver: self.topic_sender(topic).subscribe(),
        }
    }

    /// Number of live subscribers on `topic`.
    pub fn subscriber_count(&self, topic: Topic) -> usize {
        self.topic_sender(topic).receiver_count()
    }

    fn topic_sender(&self, topic: Topic) -> &broadcast::Sender<Event> {
        match topic {
            Topic::Scans => &self.scans,
            Topic::Odometry => &self.odometry,
            Topic::InitialPose => &self.initial_pose,
            Topic::ParticleCloud => &self.particle_cloud,
            Topic::PoseEstimate => &self.pose_estimate,
            Topic::FrameCorrection => &self.frame_correction,
            Topic::Diagnostics => &self.diagnostics,
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Topic receiver
// ---------------------------------------------------------------------------

/// An async receiver bound to a single [`Topic`] channel.
///
/// Obtained via [`EventBus::subscribe_to`].
pub struct TopicReceiver {
    topic: Topic,
    receiver: broadcast::Receiver<Event>,
}

impl TopicReceiver {
    /// Wait for the next event on this topic.
    ///
    /// Returns:
    /// * `Ok(event)` – a successfully received event.
    /// * `Err(RecvError::Lagged(n))` – the subscriber fell behind and `n`
    ///   messages were dropped.
    /// * `Err(RecvError::Closed)` – every sender is gone.
    pub async fn recv(&mut self) -> Result<Event, broadcast::error::RecvError> {
        self.receiver.recv().await
    }

    /// Wait for the next event, skipping over lag.  `None` once the bus is
    /// closed.
    pub async fn next(&mut self) -> Option<Event> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(topic = ?self.topic, lagged_by = n, "subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// The [`Topic`] this receiver is bound to.
    pub fn topic(&self) -> Topic {
        self.topic
    }
}
