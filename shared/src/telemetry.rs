use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::colors::{rgba_css, side_color};
use crate::layer::{FrameContext, MapLayer, OverlaySurface};
use crate::spatial::PointIndex;

const MARKER_W: f64 = 22.0;
const MARKER_H: f64 = 16.0;
const WAYPOINT_RADIUS: f64 = 5.0;
const HIT_HALF_PX: f64 = 12.0;
const LABEL_FONT: &str = "11px sans-serif";
const LABEL_COLOR: &str = "#111111";
const SELECTED_STROKE: &str = "#ffd400";

/// One SSE message from `/arma_data_stream`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamMessage {
    pub status: String,
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default)]
    pub message: Option<String>,
}

impl StreamMessage {
    pub fn is_success(&self) -> bool {
        self.status == "success"
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct VehicleRef {
    #[serde(default)]
    pub id: Value,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Unit {
    #[serde(default)]
    pub n: Option<String>,
    #[serde(default)]
    pub t: Option<String>,
    #[serde(default)]
    pub pw: Option<String>,
    #[serde(default)]
    pub sw: Option<String>,
    #[serde(default)]
    pub v: Option<VehicleRef>,
}

impl Unit {
    pub fn in_vehicle(&self) -> bool {
        self.v.as_ref().is_some_and(|v| !v.id.is_null())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vehicle {
    #[serde(rename = "vn", default)]
    pub name: String,
    #[serde(default)]
    pub id: Value,
    #[serde(rename = "c", default)]
    pub crew: Value,
    #[serde(rename = "f", default)]
    pub fuel: Option<f64>,
    #[serde(rename = "h", default)]
    pub health: Option<f64>,
    #[serde(rename = "p", default)]
    pub position: Vec<f64>,
}

/// Waypoints arrive either as bare `[x, y, z]` or as `{p, t}` records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Waypoint {
    Position(Vec<f64>),
    Record {
        #[serde(default)]
        p: Vec<f64>,
        #[serde(default)]
        t: Option<String>,
    },
}

impl Waypoint {
    pub fn position(&self) -> &[f64] {
        match self {
            Waypoint::Position(p) => p,
            Waypoint::Record { p, .. } => p,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
    #[serde(rename = "n")]
    pub name: String,
    #[serde(rename = "c", default)]
    pub commander: Option<String>,
    #[serde(rename = "p", default)]
    pub position: Vec<f64>,
    #[serde(rename = "co", default)]
    pub strength: Value,
    #[serde(rename = "b", default)]
    pub behaviour: Option<String>,
    #[serde(rename = "u", default)]
    pub units: Vec<Unit>,
    #[serde(rename = "v", default)]
    pub vehicles: Vec<Vehicle>,
    #[serde(rename = "w", default)]
    pub waypoints: Vec<Waypoint>,
}

impl Group {
    /// The unit named as the group's commander, if it is listed.
    pub fn leader(&self) -> Option<&Unit> {
        let commander = self.commander.as_deref()?;
        self.units.iter().find(|u| u.n.as_deref() == Some(commander))
    }

    /// A leader riding a vehicle is shown by the vehicle marker instead of a
    /// group marker.
    pub fn leader_in_vehicle(&self) -> bool {
        self.leader().is_some_and(Unit::in_vehicle)
    }
}

fn xy(position: &[f64]) -> Option<(f64, f64)> {
    match position {
        [x, y, ..] if x.is_finite() && y.is_finite() => Some((*x, *y)),
        _ => None,
    }
}

/// Compact text for loosely-typed wire values.
pub fn value_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Parsed telemetry: groups per side. Malformed groups are dropped.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TelemetrySnapshot {
    pub sides: BTreeMap<String, Vec<Group>>,
    pub skipped_groups: usize,
}

impl TelemetrySnapshot {
    pub fn from_data(data: &Value) -> Self {
        let mut snapshot = Self::default();
        let Some(sides) = data.get("sides").and_then(Value::as_object) else {
            return snapshot;
        };
        for (side, groups) in sides {
            let Some(groups) = groups.as_array() else {
                continue;
            };
            let parsed: Vec<Group> = groups
                .iter()
                .filter_map(|g| serde_json::from_value(g.clone()).ok())
                .collect();
            snapshot.skipped_groups += groups.len() - parsed.len();
            snapshot.sides.insert(side.clone(), parsed);
        }
        snapshot
    }

    pub fn side_names(&self) -> impl Iterator<Item = &str> {
        self.sides.keys().map(String::as_str)
    }

    pub fn group(&self, side: &str, name: &str) -> Option<&Group> {
        self.sides.get(side)?.iter().find(|g| g.name == name)
    }
}

/// Side + group name identifying a group across updates.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupKey {
    pub side: String,
    pub group: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MarkerKind {
    Group,
    Vehicle { id: String },
    Waypoint { number: usize },
}

#[derive(Debug, Clone, PartialEq)]
pub struct UnitMarker {
    pub key: GroupKey,
    pub kind: MarkerKind,
    pub x: f64,
    pub y: f64,
    pub label: String,
}

/// Whether `side` passes the display filter. Empty or `ALL` shows everything.
pub fn side_visible(side: &str, display_side: Option<&str>) -> bool {
    match display_side.map(str::trim) {
        None | Some("") => true,
        Some(filter) if filter.eq_ignore_ascii_case("all") => true,
        Some(filter) => filter.eq_ignore_ascii_case(side),
    }
}

/// Derive drawable markers from a snapshot.
pub fn derive_markers(snapshot: &TelemetrySnapshot, display_side: Option<&str>) -> Vec<UnitMarker> {
    let mut markers = Vec::new();
    for (side, groups) in &snapshot.sides {
        if !side_visible(side, display_side) {
            continue;
        }
        for group in groups {
            let key = GroupKey {
                side: side.clone(),
                group: group.name.clone(),
            };
            if !group.leader_in_vehicle()
                && let Some((x, y)) = xy(&group.position)
            {
                markers.push(UnitMarker {
                    key: key.clone(),
                    kind: MarkerKind::Group,
                    x,
                    y,
                    label: group.name.clone(),
                });
            }
            for vehicle in &group.vehicles {
                let Some((x, y)) = xy(&vehicle.position) else {
                    continue;
                };
                let id = value_text(&vehicle.id);
                let label = if vehicle.name.is_empty() {
                    format!("{} #{id}", group.name)
                } else {
                    format!("{} {} #{id}", group.name, vehicle.name)
                };
                markers.push(UnitMarker {
                    key: key.clone(),
                    kind: MarkerKind::Vehicle { id },
                    x,
                    y,
                    label,
                });
            }
            for (i, waypoint) in group.waypoints.iter().enumerate() {
                let Some((x, y)) = xy(waypoint.position()) else {
                    continue;
                };
                markers.push(UnitMarker {
                    key: key.clone(),
                    kind: MarkerKind::Waypoint { number: i + 1 },
                    x,
                    y,
                    label: format!("{} {}", group.name, i + 1),
                });
            }
        }
    }
    markers
}

/// Latest telemetry payload with whole-payload change detection.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TelemetryState {
    last: Option<Value>,
    snapshot: TelemetrySnapshot,
    updates: u64,
}

impl TelemetryState {
    pub fn differs(&self, data: &Value) -> bool {
        self.last.as_ref() != Some(data)
    }

    /// Store a new payload. Returns `false` if it equals the previous one.
    pub fn apply(&mut self, data: Value) -> bool {
        if !self.differs(&data) {
            return false;
        }
        self.snapshot = TelemetrySnapshot::from_data(&data);
        self.last = Some(data);
        self.updates += 1;
        true
    }

    /// Forget everything, e.g. when a new mission starts.
    pub fn clear(&mut self) {
        self.last = None;
        self.snapshot = TelemetrySnapshot::default();
        self.updates += 1;
    }

    pub fn snapshot(&self) -> &TelemetrySnapshot {
        &self.snapshot
    }

    pub fn updates(&self) -> u64 {
        self.updates
    }
}

/// Group, vehicle and waypoint markers.
#[derive(Debug, Default)]
pub struct UnitsLayer {
    markers: Vec<UnitMarker>,
    index: PointIndex,
    selected: Option<GroupKey>,
    detached: bool,
}

impl UnitsLayer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_markers(&mut self, markers: Vec<UnitMarker>) {
        self.index = PointIndex::build(markers.iter().map(|m| (m.x, m.y)));
        self.markers = markers;
    }

    pub fn markers(&self) -> &[UnitMarker] {
        &self.markers
    }

    pub fn select(&mut self, key: Option<GroupKey>) {
        self.selected = key;
    }

    pub fn selected(&self) -> Option<&GroupKey> {
        self.selected.as_ref()
    }

    /// Marker under a screen point.
    pub fn hit_test(&self, frame: &FrameContext<'_>, sx: f64, sy: f64) -> Option<&UnitMarker> {
        let (x, y) = frame.screen_to_game(sx, sy);
        let px_per_meter = frame.projection().meters_to_screen(frame.viewport, 1.0);
        if px_per_meter <= 0.0 {
            return None;
        }
        let half = HIT_HALF_PX / px_per_meter;
        self.index
            .find_at(x, y, half, half)
            .and_then(|idx| self.markers.get(idx))
    }
}

impl MapLayer for UnitsLayer {
    fn name(&self) -> &'static str {
        "units"
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
        surface.set_font(LABEL_FONT);
        surface.set_line_width(1.0);
        for marker in &self.markers {
            let (sx, sy) = frame.game_to_screen(marker.x, marker.y);
            if !frame.on_screen(sx, sy, MARKER_W) {
                continue;
            }
            let (r, g, b) = side_color(&marker.key.side);
            let fill = rgba_css(r, g, b, 0.85);
            let selected = self.selected.as_ref() == Some(&marker.key);

            surface.set_fill_style(&fill);
            surface.set_stroke_style(if selected { SELECTED_STROKE } else { "#000000" });
            match &marker.kind {
                MarkerKind::Group => {
                    let (x0, y0) = (sx - MARKER_W / 2.0, sy - MARKER_H / 2.0);
                    surface.fill_rect(x0, y0, MARKER_W, MARKER_H);
                    surface.stroke_rect(x0, y0, MARKER_W, MARKER_H);
                    // infantry cross
                    surface.line(x0, y0, x0 + MARKER_W, y0 + MARKER_H);
                    surface.line(x0, y0 + MARKER_H, x0 + MARKER_W, y0);
                }
                MarkerKind::Vehicle { .. } => {
                    let (x0, y0) = (sx - MARKER_W / 2.0, sy - MARKER_H / 2.0);
                    surface.fill_rect(x0, y0, MARKER_W, MARKER_H);
                    surface.stroke_rect(x0, y0, MARKER_W, MARKER_H);
                    surface.set_fill_style("#ffffff");
                    surface.fill_circle(sx, sy, MARKER_H / 4.0);
                }
                MarkerKind::Waypoint { number } => {
                    surface.fill_circle(sx, sy, WAYPOINT_RADIUS);
                    surface.set_fill_style(LABEL_COLOR);
                    surface.fill_text(&number.to_string(), sx, sy - WAYPOINT_RADIUS - 7.0);
                    continue;
                }
            }
            surface.set_fill_style(LABEL_COLOR);
            surface.fill_text(&marker.label, sx, sy + MARKER_H / 2.0 + 8.0);
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{
        MarkerKind, TelemetrySnapshot, TelemetryState, UnitsLayer, derive_markers, side_visible,
    };
    use crate::config::MapConfig;
    use crate::layer::FrameContext;
    use crate::viewport::Viewport;

    fn payload() -> serde_json::Value {
        json!({
            "sides": {
                "OPFOR": [
                    {
                        "n": "Alpha 1-1", "c": "Sgt. Petrov", "p": [1200.0, 3400.0, 0.0],
                        "co": 8, "b": "AWARE",
                        "u": [{ "n": "Petrov", "t": "rifleman" }],
                        "v": [],
                        "w": [[1500.0, 3500.0, 0.0], { "p": [1600.0, 3600.0, 0.0], "t": "MOVE" }]
                    },
                    {
                        "n": "Tank 1", "c": "Ivanov", "p": [500.0, 500.0, 0.0],
                        "u": [{ "n": "Ivanov", "v": { "id": 17 } }],
                        "v": [{ "vn": "T-72", "id": 17, "c": 3, "f": 0.9, "h": 1.0, "p": [510.0, 505.0, 0.0] }]
                    },
                    { "c": "no name, dropped" }
                ],
                "BLUFOR": [
                    { "n": "Bravo", "p": [9000.0, 9000.0] }
                ]
            }
        })
    }

    #[test]
    fn malformed_groups_are_skipped() {
        let snapshot = TelemetrySnapshot::from_data(&payload());
        assert_eq!(snapshot.skipped_groups, 1);
        assert_eq!(snapshot.sides["OPFOR"].len(), 2);
        assert_eq!(snapshot.side_names().collect::<Vec<_>>(), vec!["BLUFOR", "OPFOR"]);
    }

    #[test]
    fn leader_in_vehicle_hides_group_marker() {
        let snapshot = TelemetrySnapshot::from_data(&payload());
        let markers = derive_markers(&snapshot, Some("OPFOR"));

        let tank: Vec<_> = markers.iter().filter(|m| m.key.group == "Tank 1").collect();
        assert_eq!(tank.len(), 1);
        assert_eq!(tank[0].kind, MarkerKind::Vehicle { id: "17".to_string() });
        assert_eq!(tank[0].label, "Tank 1 T-72 #17");

        let alpha: Vec<_> = markers.iter().filter(|m| m.key.group == "Alpha 1-1").collect();
        assert_eq!(alpha.len(), 3);
        assert_eq!(alpha[0].kind, MarkerKind::Group);
        assert_eq!(alpha[2].kind, MarkerKind::Waypoint { number: 2 });
        assert!(markers.iter().all(|m| m.key.side == "OPFOR"));
    }

    #[test]
    fn leader_is_matched_by_commander_name() {
        let data = json!({
            "sides": {
                "OPFOR": [
                    {
                        "n": "Mech 2", "c": "Petrov", "p": [100.0, 100.0, 0.0],
                        "u": [{ "n": "Ivanov", "v": { "id": 7 } }, { "n": "Petrov" }]
                    },
                    {
                        "n": "Crew 3", "p": [200.0, 200.0, 0.0],
                        "u": [{ "n": "Sidorov", "v": { "id": 9 } }]
                    }
                ]
            }
        });
        let snapshot = TelemetrySnapshot::from_data(&data);
        let markers = derive_markers(&snapshot, Some("OPFOR"));

        let mech: Vec<_> = markers.iter().filter(|m| m.key.group == "Mech 2").collect();
        assert_eq!(mech.len(), 1);
        assert_eq!(mech[0].kind, MarkerKind::Group);

        // No commander listed: the group marker stays
        let crew: Vec<_> = markers.iter().filter(|m| m.key.group == "Crew 3").collect();
        assert_eq!(crew.len(), 1);
        assert_eq!(crew[0].kind, MarkerKind::Group);
    }

    #[test]
    fn display_side_filter() {
        assert!(side_visible("OPFOR", None));
        assert!(side_visible("OPFOR", Some("")));
        assert!(side_visible("OPFOR", Some("all")));
        assert!(side_visible("OPFOR", Some("opfor")));
        assert!(!side_visible("BLUFOR", Some("OPFOR")));

        let snapshot = TelemetrySnapshot::from_data(&payload());
        assert_eq!(derive_markers(&snapshot, None).len(), 5);
    }

    #[test]
    fn identical_payload_short_circuits() {
        let mut state = TelemetryState::default();
        assert!(state.apply(payload()));
        assert!(!state.differs(&payload()));
        assert!(!state.apply(payload()));
        assert_eq!(state.updates(), 1);

        let mut changed = payload();
        changed["sides"]["BLUFOR"][0]["p"] = json!([9100.0, 9000.0]);
        assert!(state.apply(changed));
        assert_eq!(state.updates(), 2);
    }

    #[test]
    fn missing_sides_yields_empty_snapshot() {
        let snapshot = TelemetrySnapshot::from_data(&json!({ "status": "idle" }));
        assert!(snapshot.sides.is_empty());
    }

    #[test]
    fn hit_test_finds_marker_under_pointer() {
        let config = MapConfig::default();
        let mut vp = Viewport::new(7, 9);
        vp.offset_y = 600.0 - 32768.0;
        let frame = FrameContext::new(&config, &vp, 800.0, 600.0);

        let snapshot = TelemetrySnapshot::from_data(&payload());
        let mut layer = UnitsLayer::new();
        layer.set_markers(derive_markers(&snapshot, None));

        let (sx, sy) = frame.game_to_screen(510.0, 505.0);
        let hit = layer.hit_test(&frame, sx + 3.0, sy - 2.0).unwrap();
        assert_eq!(hit.key.group, "Tank 1");
        assert!(layer.hit_test(&frame, sx + 200.0, sy).is_none());
    }
}
