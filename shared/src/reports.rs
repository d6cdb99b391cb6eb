use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::layer::{FrameContext, MapLayer, OverlaySurface};

/// How long a positioned report stays on the map.
pub const REPORT_LIFETIME_SECS: i64 = 600;
const MARKER_RADIUS: f64 = 7.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportKind {
    EnemyDetected,
    VehicleDetected,
    VehicleDestroyed,
    EnemiesCleared,
    VehicleLost,
    StartMission,
    Unknown,
}

impl ReportKind {
    pub fn label(self) -> &'static str {
        match self {
            ReportKind::EnemyDetected => "Enemy detected",
            ReportKind::VehicleDetected => "Vehicle detected",
            ReportKind::VehicleDestroyed => "Vehicle destroyed",
            ReportKind::EnemiesCleared => "Enemies cleared",
            ReportKind::VehicleLost => "Vehicle lost",
            ReportKind::StartMission => "Mission started",
            ReportKind::Unknown => "Report",
        }
    }

    fn color(self) -> &'static str {
        match self {
            ReportKind::EnemyDetected | ReportKind::VehicleDetected => "#e53935",
            ReportKind::VehicleDestroyed => "#212121",
            ReportKind::EnemiesCleared => "#43a047",
            ReportKind::VehicleLost => "#fb8c00",
            ReportKind::StartMission | ReportKind::Unknown => "#757575",
        }
    }
}

/// One record from `/reports_stream`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    #[serde(default)]
    pub t: Option<String>,
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default, alias = "position")]
    pub p: Option<Vec<f64>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Report {
    pub fn kind(&self) -> ReportKind {
        if self
            .command
            .as_deref()
            .is_some_and(|c| c.eq_ignore_ascii_case("start_mission"))
        {
            return ReportKind::StartMission;
        }
        match self.t.as_deref().map(str::to_ascii_lowercase).as_deref() {
            Some("enemy_detected") => ReportKind::EnemyDetected,
            Some("vehicle_detected") => ReportKind::VehicleDetected,
            Some("vehicle_destroyed") => ReportKind::VehicleDestroyed,
            Some("enemies_cleared") => ReportKind::EnemiesCleared,
            Some("vehicle_lost") => ReportKind::VehicleLost,
            _ => ReportKind::Unknown,
        }
    }

    pub fn position(&self) -> Option<(f64, f64)> {
        match self.p.as_deref()? {
            [x, y, ..] if x.is_finite() && y.is_finite() => Some((*x, *y)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReportEntry {
    pub report: Report,
    pub kind: ReportKind,
    pub received_at: DateTime<Utc>,
}

impl ReportEntry {
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.received_at + Duration::seconds(REPORT_LIFETIME_SECS)
    }
}

/// Received reports, newest last.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReportLog {
    entries: Vec<ReportEntry>,
}

impl ReportLog {
    /// Record a report. `start_mission` wipes the log instead of being stored.
    /// Returns the kind that was handled.
    pub fn push(&mut self, report: Report, now: DateTime<Utc>) -> ReportKind {
        let kind = report.kind();
        if kind == ReportKind::StartMission {
            self.entries.clear();
            return kind;
        }
        self.entries.push(ReportEntry {
            report,
            kind,
            received_at: now,
        });
        kind
    }

    /// Drop expired entries. Returns how many were removed.
    pub fn prune(&mut self, now: DateTime<Utc>) -> usize {
        let before = self.entries.len();
        self.entries.retain(|entry| entry.expires_at() > now);
        before - self.entries.len()
    }

    pub fn entries(&self) -> &[ReportEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Transient markers for positioned reports.
#[derive(Debug, Default)]
pub struct ReportsLayer {
    log: ReportLog,
    detached: bool,
}

impl ReportsLayer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_log(&mut self, log: ReportLog) {
        self.log = log;
    }
}

impl MapLayer for ReportsLayer {
    fn name(&self) -> &'static str {
        "reports"
    }

    fn attached(&self) -> bool {
        !self.detached
    }

    fn attach(&mut self) {
        self.detached = false;
    }

    fn detach(&mut self) {
        self.detached = true;
    }

    fn render(&mut self, surface: &mut dyn OverlaySurface, frame: &FrameContext<'_>) {
        surface.set_font("bold 11px sans-serif");
        for entry in self.log.entries() {
            let Some((x, y)) = entry.report.position() else {
                continue;
            };
            let (sx, sy) = frame.game_to_screen(x, y);
            if !frame.on_screen(sx, sy, 60.0) {
                continue;
            }
            surface.set_fill_style(entry.kind.color());
            surface.fill_circle(sx, sy, MARKER_RADIUS);
            surface.fill_text(entry.kind.label(), sx, sy - MARKER_RADIUS - 8.0);
        }
    }
}
