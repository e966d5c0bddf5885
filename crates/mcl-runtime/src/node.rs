//! Event-driven localizer node.
//!
//! ```text
//!  Topic::Odometry ──▶ SharedTf (odom ← base history)
//!  Topic::InitialPose ─▶ Localizer::set_initial_pose
//!  Topic::Scans ──▶ [busy?] ─drop
//!                     │
//!                     ▼ spawn_blocking
//!              Localizer::process_scan ──▶ Topic::ParticleCloud
//!                     │                    Topic::PoseEstimate
//!                     ▼
//!          watch<Option<FrameCorrection>> ──(fixed rate)──▶ Topic::FrameCorrection
//! ```
//!
//! Parameters arrive on a [`watch`] channel and are picked up at the start
//! of the next cycle; an in-flight cycle always finishes with the parameters
//! it started with.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use mcl_filter::{FilterParams, FrameCorrection, Frames, Localizer, UpdateOutcome};
use mcl_middleware::{EventBus, Topic};
use mcl_perception::{DistanceField, SharedTf, Transform3D};
use mcl_types::{Event, EventPayload, LaserScan, LocError, OdometrySample, Pose2D, PoseStamped2D};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// `source` stamped on every event the node publishes.
pub const SOURCE: &str = "mcl-runtime::node";

/// Static wiring of a node.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeConfig {
    pub frames: Frames,
    /// Rate of the map ← odom rebroadcast.
    pub broadcast_hz: f64,
    /// Upper bound on waiting for odometry when computing a correction.
    pub transform_timeout: Duration,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            frames: Frames::default(),
            broadcast_hz: 5.0,
            transform_timeout: Duration::from_secs(1),
        }
    }
}

impl NodeConfig {
    pub fn validate(&self) -> Result<(), LocError> {
        if !(self.broadcast_hz > 0.0 && self.broadcast_hz.is_finite()) {
            return Err(LocError::InvalidConfig(format!(
                "broadcast_hz must be positive, got {}",
                self.broadcast_hz
            )));
        }
        Ok(())
    }
}

/// Filter state guarded by the cycle lock.
struct CycleState {
    localizer: Localizer,
    /// Last parameter set that failed validation, so it is reported once.
    rejected: Option<FilterParams>,
}

/// Cheaply cloneable handle; every clone drives the same filter.
#[derive(Clone)]
pub struct LocalizerNode {
    config: Arc<NodeConfig>,
    bus: EventBus,
    tf: SharedTf,
    field: Arc<dyn DistanceField + Send + Sync>,
    state: Arc<Mutex<CycleState>>,
    busy: Arc<AtomicBool>,
    params: watch::Receiver<FilterParams>,
    correction: Arc<watch::Sender<Option<FrameCorrection>>>,
    latest_odom_stamp: Arc<AtomicU64>,
}

impl LocalizerNode {
    /// Build a node.  The initial parameters are whatever `params` currently
    /// holds.
    ///
    /// # Errors
    ///
    /// [`LocError::InvalidConfig`] when the node or filter configuration is
    /// unusable.
    pub fn new(
        config: NodeConfig,
        params: watch::Receiver<FilterParams>,
        field: Arc<dyn DistanceField + Send + Sync>,
        bus: EventBus,
    ) -> Result<Self, LocError> {
        config.validate()?;
        let initial = params.borrow().clone();
        let localizer = Localizer::new(initial, config.frames.clone(), config.transform_timeout)?;
        let (correction, _) = watch::channel(None);
        Ok(Self {
            config: Arc::new(config),
            bus,
            tf: SharedTf::new(),
            field,
            state: Arc::new(Mutex::new(CycleState {
                localizer,
                rejected: None,
            })),
            busy: Arc::new(AtomicBool::new(false)),
            params,
            correction: Arc::new(correction),
            latest_odom_stamp: Arc::new(AtomicU64::new(0f64.to_bits())),
        })
    }

    /// Transform buffer the node reads from; register static mounts here.
    pub fn transforms(&self) -> &SharedTf {
        &self.tf
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    /// Follow the latest frame correction.
    pub fn corrections(&self) -> watch::Receiver<Option<FrameCorrection>> {
        self.correction.subscribe()
    }

    /// Current pose estimate in the map frame.
    pub fn estimate(&self) -> Option<PoseStamped2D> {
        self.lock_state().localizer.pose_stamped()
    }

    /// Parameters the filter is currently running with.
    pub fn active_params(&self) -> FilterParams {
        self.lock_state().localizer.params().clone()
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, CycleState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Newest odometry stamp seen, `LATEST` (0.0) before any arrives.
    fn latest_odom_stamp(&self) -> f64 {
        f64::from_bits(self.latest_odom_stamp.load(Ordering::Acquire))
    }

    // ── Inputs ──────────────────────────────────────────────────────────────

    /// Record an odom ← base sample in the transform buffer.
    pub fn ingest_odometry(&self, sample: &OdometrySample) {
        let frames = &self.config.frames;
        self.tf.set_transform(
            &frames.odom,
            &frames.base_link,
            Transform3D::from_pose2d(sample.pose),
            sample.stamp,
        );
        // Positive f64s order like their bit patterns.
        if sample.stamp > 0.0 {
            self.latest_odom_stamp
                .fetch_max(sample.stamp.to_bits(), Ordering::AcqRel);
        }
    }

    /// Reseed the filter around `pose`, waiting for any in-flight cycle.
    ///
    /// The estimate and correction are stamped with the newest odometry.
    pub async fn set_initial_pose(&self, pose: Pose2D) -> Result<UpdateOutcome, LocError> {
        let node = self.clone();
        tokio::task::spawn_blocking(move || -> Result<UpdateOutcome, LocError> {
            let mut state = node.lock_state();
            let stamp = node.latest_odom_stamp();
            let outcome = state.localizer.set_initial_pose(pose, &node.tf, stamp)?;
            node.publish_outputs(&state.localizer, outcome);
            Ok(outcome)
        })
        .await
        .map_err(|e| LocError::Channel(format!("initial pose task failed: {e}")))?
    }

    /// Run one cycle for `scan` and wait for it to finish.
    pub async fn process_scan(&self, scan: LaserScan) -> Result<UpdateOutcome, LocError> {
        let node = self.clone();
        tokio::task::spawn_blocking(move || node.run_cycle(&scan))
            .await
            .map_err(|e| LocError::Channel(format!("update cycle task failed: {e}")))?
    }

    /// Start a cycle for `scan` unless one is already running.
    ///
    /// Returns `false` when the scan was dropped.
    pub fn dispatch_scan(&self, scan: LaserScan) -> bool {
        if self.busy.swap(true, Ordering::AcqRel) {
            debug!(stamp = scan.stamp, "update cycle in flight; scan dropped");
            return false;
        }
        let node = self.clone();
        tokio::task::spawn_blocking(move || {
            let result = node.run_cycle(&scan);
            node.busy.store(false, Ordering::Release);
            if let Err(e) = result {
                error!(error = %e, "update cycle failed");
            }
        });
        true
    }

    /// Route one inbound event, waiting for any work it triggers.
    pub async fn handle_event(&self, event: Event) -> Result<(), LocError> {
        match event.payload {
            EventPayload::Odometry(sample) => self.ingest_odometry(&sample),
            EventPayload::InitialPose(request) => {
                self.set_initial_pose(request.pose).await?;
            }
            EventPayload::Scan(scan) => {
                self.process_scan(scan).await?;
            }
            other => debug!(?other, "ignoring outbound payload"),
        }
        Ok(())
    }

    // ── Cycle ───────────────────────────────────────────────────────────────

    fn run_cycle(&self, scan: &LaserScan) -> Result<UpdateOutcome, LocError> {
        let mut state = self.lock_state();
        self.apply_latest_params(&mut state);
        let outcome = state
            .localizer
            .process_scan(scan, &self.tf, self.field.as_ref())?;
        self.publish_outputs(&state.localizer, outcome);
        Ok(outcome)
    }

    /// Snapshot the parameter channel at a cycle boundary.
    fn apply_latest_params(&self, state: &mut CycleState) {
        let latest = self.params.borrow().clone();
        if &latest == state.localizer.params() || state.rejected.as_ref() == Some(&latest) {
            return;
        }
        match state.localizer.update_params(latest.clone()) {
            Ok(()) => state.rejected = None,
            Err(e) => {
                self.diagnostic(format!("parameter update rejected: {e}"));
                state.rejected = Some(latest);
            }
        }
    }

    fn publish_outputs(&self, localizer: &Localizer, outcome: UpdateOutcome) {
        match outcome {
            UpdateOutcome::FramesUnavailable => {
                self.diagnostic("required transforms unavailable; cycle skipped".to_string());
                return;
            }
            UpdateOutcome::Initialized { correction_updated }
            | UpdateOutcome::Updated { correction_updated } => {
                if !correction_updated {
                    self.diagnostic("frame correction timed out; previous kept".to_string());
                }
            }
            UpdateOutcome::BelowThreshold => return,
        }

        self.bus.broadcast(Event::new(
            SOURCE,
            EventPayload::ParticleCloud(localizer.particle_cloud()),
        ));
        if let Some(pose) = localizer.pose_stamped() {
            debug!(x = pose.pose.x, y = pose.pose.y, heading = pose.pose.heading, "pose estimate");
            self.bus
                .broadcast(Event::new(SOURCE, EventPayload::PoseEstimate(pose)));
        }
        self.correction.send_replace(localizer.correction());
    }

    fn diagnostic(&self, message: String) {
        warn!(%message, "localizer diagnostic");
        self.bus.broadcast(Event::new(
            SOURCE,
            EventPayload::Diagnostic {
                component: SOURCE.to_string(),
                message,
            },
        ));
    }

    // ── Loops ───────────────────────────────────────────────────────────────

    /// Publish the current correction once.  Returns `false` before the
    /// first correction exists.
    pub fn broadcast_correction(&self) -> bool {
        let Some(correction) = *self.correction.borrow() else {
            return false;
        };
        let stamp = self.latest_odom_stamp().max(correction.stamp);
        let msg = correction.to_stamped_at(stamp, &self.config.frames);
        self.bus
            .broadcast(Event::new(SOURCE, EventPayload::FrameCorrection(msg)));
        true
    }

    /// Rebroadcast the correction at `broadcast_hz` until `shutdown` flips.
    pub fn spawn_broadcaster(&self, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        let node = self.clone();
        let period = Duration::from_secs_f64(1.0 / self.config.broadcast_hz);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        node.broadcast_correction();
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
        })
    }

    /// Serve the bus until `shutdown` becomes `true`.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> Result<(), LocError> {
        let mut odometry = self.bus.subscribe_to(Topic::Odometry);
        let mut initial_pose = self.bus.subscribe_to(Topic::InitialPose);
        let mut scans = self.bus.subscribe_to(Topic::Scans);
        let broadcaster = self.spawn_broadcaster(shutdown.clone());
        info!(
            broadcast_hz = self.config.broadcast_hz,
            map = %self.config.frames.map,
            "localizer node running"
        );

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                Some(event) = odometry.next() => {
                    if let EventPayload::Odometry(sample) = event.payload {
                        self.ingest_odometry(&sample);
                    }
                }
                Some(event) = initial_pose.next() => {
                    if let EventPayload::InitialPose(request) = event.payload
                        && let Err(e) = self.set_initial_pose(request.pose).await
                    {
                        error!(error = %e, "initial pose failed");
                    }
                }
                Some(event) = scans.next() => {
                    if let EventPayload::Scan(scan) = event.payload {
                        self.dispatch_scan(scan);
                    }
                }
            }
        }

        if let Err(e) = broadcaster.await {
            warn!(error = %e, "correction broadcaster ended abnormally");
        }
        info!("localizer node stopped");
        Ok(())
    }
}
