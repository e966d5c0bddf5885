//! `mcl replay` – drive the localizer node from a recorded session.
//!
//! A session is a JSON-lines file, one record per line, in time order:
//!
//! ```text
//! {"type":"odometry","stamp":1.0,"pose":{"x":0.0,"y":0.0,"heading":0.0}}
//! {"type":"scan","stamp":1.0,"angle_min":-1.57,"angle_increment":0.01,"range_min":0.1,"range_max":8.0,"ranges":[2.0,null,1.9]}
//! {"type":"initial_pose","pose":{"x":1.0,"y":2.0,"heading":0.0}}
//! {"type":"params","particle_count":500}
//! ```
//!
//! `null` ranges mean "no return".  A `params` record only changes the fields
//! it names; everything else keeps its current value.  Odometry and scan
//! stamps must be positive, since a zero stamp means "newest" to the
//! transform buffer.  Blank lines and lines starting with `#` are skipped.  Every record is processed to completion before the next is
//! read, so a replay is deterministic for a seeded filter.

use std::io::{BufRead, Write};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use colored::Colorize;
use mcl_filter::{FilterParams, UpdateOutcome};
use mcl_middleware::EventBus;
use mcl_perception::{LikelihoodField, OccupancyGrid, Transform3D};
use mcl_runtime::LocalizerNode;
use mcl_types::{Event, EventPayload, InitialPose, LaserScan, OdometrySample};
use serde::Deserialize;
use serde_json::{Map, Value};
use tokio::sync::watch;
use tracing::info;

use crate::config::Config;

const SOURCE: &str = "mcl-cli::replay";

fn default_laser_frame() -> String {
    String::new()
}

/// A scan as recorded; `None` ranges are missing returns.
#[derive(Debug, Clone, Deserialize)]
pub struct ScanRecord {
    pub stamp: f64,
    #[serde(default = "default_laser_frame")]
    pub frame_id: String,
    pub angle_min: f64,
    pub angle_increment: f64,
    pub range_min: f64,
    pub range_max: f64,
    pub ranges: Vec<Option<f64>>,
}

impl ScanRecord {
    fn into_scan(self) -> LaserScan {
        LaserScan {
            stamp: self.stamp,
            frame_id: self.frame_id,
            angle_min: self.angle_min,
            angle_increment: self.angle_increment,
            range_min: self.range_min,
            range_max: self.range_max,
            ranges: self
                .ranges
                .into_iter()
                .map(|r| r.unwrap_or(f64::NAN))
                .collect(),
        }
    }
}

/// One line of a session file.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionRecord {
    Odometry(OdometrySample),
    Scan(ScanRecord),
    InitialPose(InitialPose),
    /// Partial parameter update, overlaid on the parameters in force.
    Params(Map<String, Value>),
}

/// Counters reported at the end of a replay.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplaySummary {
    pub records: usize,
    pub scans: usize,
    pub updates: usize,
    pub skipped: usize,
    pub interrupted: bool,
}

/// Parse one session line; `Ok(None)` for blank and comment lines.
pub fn parse_line(line: &str) -> Result<Option<SessionRecord>, serde_json::Error> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return Ok(None);
    }
    serde_json::from_str(trimmed).map(Some)
}

/// Overlay the fields present in `patch` on `current`.
///
/// Unknown field names are an error rather than being silently dropped.
pub fn apply_params_patch(
    current: &FilterParams,
    patch: Map<String, Value>,
) -> Result<FilterParams, String> {
    let mut merged = match serde_json::to_value(current) {
        Ok(Value::Object(fields)) => fields,
        Ok(other) => return Err(format!("parameters serialized as {other}")),
        Err(e) => return Err(format!("Failed to serialize parameters: {}", e)),
    };
    for (key, value) in patch {
        if !merged.contains_key(&key) {
            return Err(format!("unknown parameter `{key}`"));
        }
        merged.insert(key, value);
    }
    serde_json::from_value(Value::Object(merged)).map_err(|e| format!("invalid parameters: {}", e))
}

fn check_stamp(stamp: f64) -> Result<(), String> {
    if stamp > 0.0 && stamp.is_finite() {
        Ok(())
    } else {
        Err(format!("stamp must be positive, got {stamp}"))
    }
}

/// Build the likelihood field for the configured map.
pub fn load_field(cfg: &Config) -> Result<LikelihoodField, String> {
    let path = cfg
        .map
        .path
        .as_ref()
        .ok_or("no map configured; set [map].path or MCL_MAP")?;
    let text = std::fs::read_to_string(path)
        .map_err(|e| format!("Failed to read map at {}: {}", path.display(), e))?;
    let [ox, oy] = cfg.map.origin;
    let grid = OccupancyGrid::parse_ascii(&text, cfg.map.resolution, (ox, oy))
        .map_err(|e| format!("Invalid map {}: {}", path.display(), e))?;
    LikelihoodField::from_grid(grid).map_err(|e| format!("Invalid map {}: {}", path.display(), e))
}

/// Replay the session file at `session`, printing estimates to stdout.
pub async fn run(cfg: &Config, session: &Path, stop: Arc<AtomicBool>) -> Result<ReplaySummary, String> {
    let file = std::fs::File::open(session)
        .map_err(|e| format!("Failed to open session {}: {}", session.display(), e))?;
    let field = load_field(cfg)?;
    let stdout = std::io::stdout();
    replay(
        cfg,
        Arc::new(field),
        std::io::BufReader::new(file),
        &mut stdout.lock(),
        &stop,
    )
    .await
}

/// Feed every record from `input` through a fresh node.
pub async fn replay<R, W>(
    cfg: &Config,
    field: Arc<LikelihoodField>,
    input: R,
    out: &mut W,
    stop: &AtomicBool,
) -> Result<ReplaySummary, String>
where
    R: BufRead,
    W: Write,
{
    let (params_tx, params_rx) = watch::channel(cfg.filter.clone());
    let node = LocalizerNode::new(cfg.node_config(), params_rx, field, EventBus::default())
        .map_err(|e| e.to_string())?;
    node.transforms().set_static_transform(
        &cfg.frames.base_link,
        &cfg.frames.laser,
        Transform3D::from_pose2d(cfg.laser_mount),
    );

    let mut summary = ReplaySummary::default();
    for (index, line) in input.lines().enumerate() {
        if stop.load(Ordering::SeqCst) {
            summary.interrupted = true;
            break;
        }
        let line = line.map_err(|e| format!("Failed to read session: {}", e))?;
        let at_line = |e: String| format!("line {}: {}", index + 1, e);
        let record = parse_line(&line).map_err(|e| at_line(e.to_string()))?;
        let Some(record) = record else { continue };
        summary.records += 1;

        match record {
            SessionRecord::Odometry(sample) => {
                check_stamp(sample.stamp).map_err(at_line)?;
                node.handle_event(Event::new(SOURCE, EventPayload::Odometry(sample)))
                    .await
                    .map_err(|e| e.to_string())?;
            }
            SessionRecord::InitialPose(request) => {
                node.set_initial_pose(request.pose)
                    .await
                    .map_err(|e| e.to_string())?;
                writeln!(out, "{} initial pose {:?}", "↺".cyan(), request.pose)
                    .map_err(|e| e.to_string())?;
            }
            SessionRecord::Params(patch) => {
                let params = apply_params_patch(&params_tx.borrow(), patch).map_err(at_line)?;
                params_tx.send_replace(params);
            }
            SessionRecord::Scan(scan) => {
                check_stamp(scan.stamp).map_err(at_line)?;
                summary.scans += 1;
                let outcome = node
                    .process_scan(scan.into_scan())
                    .await
                    .map_err(|e| e.to_string())?;
                match outcome {
                    UpdateOutcome::FramesUnavailable => summary.skipped += 1,
                    o if o.population_changed() => {
                        summary.updates += 1;
                        if let Some(est) = node.estimate() {
                            writeln!(
                                out,
                                "{} t={:.3} x={:.3} y={:.3} heading={:.3}",
                                "●".green(),
                                est.stamp,
                                est.pose.x,
                                est.pose.y,
                                est.pose.heading
                            )
                            .map_err(|e| e.to_string())?;
                        }
                    }
                    _ => {}
                }
            }
        }
    }

    if let Some(correction) = *node.corrections().borrow() {
        let pose = correction.transform.to_pose2d();
        writeln!(
            out,
            "{} map←odom x={:.3} y={:.3} heading={:.3}",
            "⇄".bold(),
            pose.x,
            pose.y,
            pose.heading
        )
        .map_err(|e| e.to_string())?;
    }
    info!(
        records = summary.records,
        scans = summary.scans,
        updates = summary.updates,
        skipped = summary.skipped,
        "replay finished"
    );
    Ok(summary)
}
