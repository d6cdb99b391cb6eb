use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::colors::hex_to_rgba;
use crate::layer::{FrameContext, MapLayer, OverlaySurface};
use crate::spatial::PointIndex;

/// Screen size of a label's grab box.
pub const LABEL_BOX_W: f64 = 100.0;
pub const LABEL_BOX_H: f64 = 30.0;
const EDIT_BOX_STROKE: &str = "rgba(0, 0, 0, 0.6)";
const DRAG_BOX_STROKE: &str = "#ff8800";

/// A place name in game meters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NameEntity {
    #[serde(default)]
    pub id: Option<i64>,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub x: f64,
    pub y: f64,
}

/// Parse a `/names` response, skipping malformed entries.
/// Returns the parsed names and how many entries were dropped.
pub fn parse_names(body: &str) -> Result<(Vec<NameEntity>, usize), serde_json::Error> {
    let raw: Vec<Value> = serde_json::from_str(body)?;
    let total = raw.len();
    let names: Vec<NameEntity> = raw
        .into_iter()
        .filter_map(|value| serde_json::from_value(value).ok())
        .collect();
    let dropped = total - names.len();
    Ok((names, dropped))
}

/// `POST /update_label` body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelUpdate {
    pub id: i64,
    pub x: f64,
    pub y: f64,
}

/// `POST /add_label` body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewLabel {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub x: f64,
    pub y: f64,
}

/// Label edits to send when edit mode ends.
#[derive(Debug, Clone, PartialEq)]
pub enum LabelChange {
    Update(LabelUpdate),
    Add(NewLabel),
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Drag {
    target: usize,
    grab_dx: f64,
    grab_dy: f64,
}

/// Place-name labels with drag-and-drop editing.
///
/// Entries are the fetched names followed by labels created in the current
/// edit session; indices returned by hit-testing span both.
#[derive(Debug)]
pub struct NamesLayer {
    names: Vec<NameEntity>,
    created: Vec<NewLabel>,
    moved: BTreeMap<usize, (f64, f64)>,
    index: PointIndex,
    editing: bool,
    drag: Option<Drag>,
    attached: bool,
    drawn: usize,
    unstyled: usize,
}

impl Default for NamesLayer {
    fn default() -> Self {
        Self::new()
    }
}

impl NamesLayer {
    pub fn new() -> Self {
        Self {
            names: Vec::new(),
            created: Vec::new(),
            moved: BTreeMap::new(),
            index: PointIndex::default(),
            editing: false,
            drag: None,
            attached: true,
            drawn: 0,
            unstyled: 0,
        }
    }

    /// Replace fetched names. Pending moves refer to old indices and are dropped.
    pub fn set_names(&mut self, names: Vec<NameEntity>) {
        self.names = names;
        self.moved.clear();
        self.drag = None;
        self.rebuild_index();
    }

    pub fn names(&self) -> &[NameEntity] {
        &self.names
    }

    /// Distinct type keys of the fetched names, in first-seen order.
    pub fn kinds(&self) -> Vec<&str> {
        let mut seen = Vec::new();
        for name in &self.names {
            if !seen.contains(&name.kind.as_str()) {
                seen.push(name.kind.as_str());
            }
        }
        seen
    }

    pub fn is_editing(&self) -> bool {
        self.editing
    }

    pub fn is_dragging(&self) -> bool {
        self.drag.is_some()
    }

    /// Labels drawn by the last pass, and labels skipped for lack of a style.
    pub fn last_counts(&self) -> (usize, usize) {
        (self.drawn, self.unstyled)
    }

    pub fn begin_edit(&mut self) {
        self.editing = true;
    }

    /// Leave edit mode and collect the edits made during the session:
    /// moved fetched labels first, then created labels.
    pub fn finish_edit(&mut self) -> Vec<LabelChange> {
        self.editing = false;
        self.drag = None;

        let mut changes = Vec::new();
        for (&idx, &(x, y)) in &self.moved {
            if let Some(id) = self.names.get(idx).and_then(|n| n.id) {
                changes.push(LabelChange::Update(LabelUpdate { id, x, y }));
            }
        }
        changes.extend(self.created.drain(..).map(LabelChange::Add));
        self.moved.clear();
        self.rebuild_index();
        changes
    }

    pub fn add_label(&mut self, name: &str, kind: &str, x: f64, y: f64) {
        self.created.push(NewLabel {
            name: name.to_string(),
            kind: kind.to_string(),
            x,
            y,
        });
        self.rebuild_index();
    }

    fn entry_count(&self) -> usize {
        self.names.len() + self.created.len()
    }

    /// Current game position of entry `idx`, including unsaved moves.
    fn position(&self, idx: usize) -> Option<(f64, f64)> {
        if let Some(&pos) = self.moved.get(&idx) {
            return Some(pos);
        }
        match self.names.get(idx) {
            Some(name) => Some((name.x, name.y)),
            None => self
                .created
                .get(idx - self.names.len())
                .map(|label| (label.x, label.y)),
        }
    }

    fn entry(&self, idx: usize) -> Option<(&str, &str)> {
        match self.names.get(idx) {
            Some(name) => Some((name.name.as_str(), name.kind.as_str())),
            None => self
                .created
                .get(idx - self.names.len())
                .map(|label| (label.name.as_str(), label.kind.as_str())),
        }
    }

    fn rebuild_index(&mut self) {
        let points: Vec<(f64, f64)> = (0..self.entry_count())
            .filter_map(|idx| self.position(idx))
            .collect();
        self.index = PointIndex::build(points);
    }

    /// Entry whose label box covers the screen point.
    pub fn hit_test(&self, frame: &FrameContext<'_>, sx: f64, sy: f64) -> Option<usize> {
        let (x, y) = frame.screen_to_game(sx, sy);
        let px_per_meter = frame.projection().meters_to_screen(frame.viewport, 1.0);
        if px_per_meter <= 0.0 {
            return None;
        }
        self.index.find_at(
            x,
            y,
            LABEL_BOX_W / 2.0 / px_per_meter,
            LABEL_BOX_H / 2.0 / px_per_meter,
        )
    }

    /// Start dragging the label under the pointer. Only in edit mode; labels
    /// fetched without an id cannot be moved.
    pub fn start_drag(&mut self, frame: &FrameContext<'_>, sx: f64, sy: f64) -> bool {
        if !self.editing {
            return false;
        }
        let Some(target) = self.hit_test(frame, sx, sy) else {
            return false;
        };
        if self.names.get(target).is_some_and(|n| n.id.is_none()) {
            return false;
        }
        let Some((x, y)) = self.position(target) else {
            return false;
        };
        let (gx, gy) = frame.screen_to_game(sx, sy);
        self.drag = Some(Drag {
            target,
            grab_dx: x - gx,
            grab_dy: y - gy,
        });
        true
    }

    pub fn drag_to(&mut self, frame: &FrameContext<'_>, sx: f64, sy: f64) {
        let Some(drag) = self.drag else {
            return;
        };
        let (gx, gy) = frame.screen_to_game(sx, sy);
        let pos = (gx + drag.grab_dx, gy + drag.grab_dy);
        if drag.target < self.names.len() {
            self.moved.insert(drag.target, pos);
        } else if let Some(label) = self.created.get_mut(drag.target - self.names.len()) {
            label.x = pos.0;
            label.y = pos.1;
        }
    }

    /// Finish a drag. Returns the final game position of the dragged label.
    pub fn end_drag(&mut self) -> Option<(f64, f64)> {
        let drag = self.drag.take()?;
        self.rebuild_index();
        self.position(drag.target)
    }
}

impl MapLayer for NamesLayer {
    fn name(&self) -> &'static str {
        "names"
    }

    fn attached(&self) -> bool {
        self.attached
    }

    fn attach(&mut self) {
        self.attached = true;
    }

    fn detach(&mut self) {
        self.attached = false;
    }

    fn render(&mut self, surface: &mut dyn OverlaySurface, frame: &FrameContext<'_>) {
        let zoom = frame.viewport.zoom;
        let dragged = self.drag.map(|d| d.target);
        let mut drawn = 0;
        let mut unstyled = 0;

        for idx in 0..self.entry_count() {
            let (Some((name, kind)), Some((x, y))) = (self.entry(idx), self.position(idx)) else {
                continue;
            };
            let Some(style) = frame.config.name_settings.get(kind) else {
                unstyled += 1;
                continue;
            };
            // Edit mode shows every label regardless of its zoom gate
            if !self.editing && zoom < style.min_zoom {
                continue;
            }
            let (sx, sy) = frame.game_to_screen(x, y);
            if !frame.on_screen(sx, sy, LABEL_BOX_W) {
                continue;
            }

            if self.editing {
                surface.set_line_width(1.0);
                surface.set_stroke_style(if dragged == Some(idx) {
                    DRAG_BOX_STROKE
                } else {
                    EDIT_BOX_STROKE
                });
                surface.stroke_rect(
                    sx - LABEL_BOX_W / 2.0,
                    sy - LABEL_BOX_H / 2.0,
                    LABEL_BOX_W,
                    LABEL_BOX_H,
                );
            }
            surface.set_font(&format!("{}px {}", style.font_size, style.font_family));
            surface.set_fill_style(&hex_to_rgba(&style.color, style.opacity));
            surface.fill_text(name, sx, sy);
            drawn += 1;
        }

        self.drawn = drawn;
        self.unstyled = unstyled;
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{LabelChange, LabelUpdate, NameEntity, NamesLayer, NewLabel, parse_names};
    use crate::config::MapConfig;
    use crate::layer::recording::RecordingSurface;
    use crate::layer::{FrameContext, MapLayer};
    use crate::viewport::Viewport;

    fn name(id: i64, label: &str, kind: &str, x: f64, y: f64) -> NameEntity {
        NameEntity {
            id: Some(id),
            name: label.to_string(),
            kind: kind.to_string(),
            x,
            y,
        }
    }

    /// Zoom-7 viewport with the island's bottom-left corner at screen (0, 600).
    fn bottom_left_viewport(zoom: i32) -> Viewport {
        let mut vp = Viewport::new(zoom, 9);
        let image_h = 32768.0 * vp.scale();
        vp.offset_y = 600.0 - image_h;
        vp
    }

    #[test]
    fn parse_names_skips_malformed_entries() {
        let body = json!([
            { "id": 1, "name": "Chernogorsk", "type": "NameCity", "x": 6700.0, "y": 2500.0 },
            { "id": 2, "name": "broken" },
            { "name": "Hill 301", "type": "Hill", "x": 10.0, "y": 20.0 }
        ])
        .to_string();
        let (names, dropped) = parse_names(&body).unwrap();
        assert_eq!(names.len(), 2);
        assert_eq!(dropped, 1);
        assert_eq!(names[1].id, None);
    }

    #[test]
    fn kinds_are_distinct() {
        let mut layer = NamesLayer::new();
        layer.set_names(vec![
            name(1, "A", "NameCity", 0.0, 0.0),
            name(2, "B", "Airfield", 0.0, 0.0),
            name(3, "C", "NameCity", 0.0, 0.0),
        ]);
        assert_eq!(layer.kinds(), vec!["NameCity", "Airfield"]);
    }

    #[test]
    fn min_zoom_gates_labels_outside_edit_mode() {
        let config = MapConfig::default();
        let mut layer = NamesLayer::new();
        layer.set_names(vec![
            name(1, "Village", "NameVillage", 100.0, 100.0),
            name(2, "Mystery", "Unknown", 120.0, 100.0),
        ]);

        let vp = bottom_left_viewport(3);
        let frame = FrameContext::new(&config, &vp, 800.0, 600.0);
        let mut surface = RecordingSurface::default();
        layer.render(&mut surface, &frame);
        assert_eq!(layer.last_counts(), (0, 1));

        layer.begin_edit();
        let mut surface = RecordingSurface::default();
        layer.render(&mut surface, &frame);
        assert_eq!(layer.last_counts(), (1, 1));
        assert_eq!(surface.texts(), vec!["Village"]);
    }

    #[test]
    fn drag_records_move_and_finish_emits_changes() {
        let config = MapConfig::default();
        let vp = bottom_left_viewport(7);
        let frame = FrameContext::new(&config, &vp, 800.0, 600.0);
        let mut layer = NamesLayer::new();
        layer.set_names(vec![name(7, "Pusta", "NameVillage", 100.0, 100.0)]);

        let (sx, sy) = frame.game_to_screen(100.0, 100.0);
        assert!(!layer.start_drag(&frame, sx, sy), "drag needs edit mode");

        layer.begin_edit();
        assert!(layer.start_drag(&frame, sx + 5.0, sy));
        layer.drag_to(&frame, sx + 5.0 + 64.0, sy);
        let (x, y) = layer.end_drag().unwrap();
        assert!((x - 130.0).abs() < 1e-6);
        assert!((y - 100.0).abs() < 1e-6);

        let (ax, ay) = frame.game_to_screen(2000.0, 150.0);
        let (gx, gy) = frame.screen_to_game(ax, ay);
        layer.add_label("Camp", "NameLocal", gx, gy);

        let changes = layer.finish_edit();
        assert!(!layer.is_editing());
        assert_eq!(changes.len(), 2);
        match &changes[0] {
            LabelChange::Update(LabelUpdate { id, x, .. }) => {
                assert_eq!(*id, 7);
                assert!((x - 130.0).abs() < 1e-6);
            }
            other => panic!("expected update, got {other:?}"),
        }
        assert!(matches!(&changes[1], LabelChange::Add(NewLabel { name, .. }) if name == "Camp"));
        assert!(layer.finish_edit().is_empty());
    }

    #[test]
    fn labels_without_id_cannot_be_dragged() {
        let config = MapConfig::default();
        let vp = bottom_left_viewport(7);
        let frame = FrameContext::new(&config, &vp, 800.0, 600.0);
        let mut layer = NamesLayer::new();
        let mut orphan = name(0, "Orphan", "NameCity", 100.0, 100.0);
        orphan.id = None;
        layer.set_names(vec![orphan]);
        layer.begin_edit();
        let (sx, sy) = frame.game_to_screen(100.0, 100.0);
        assert!(!layer.start_drag(&frame, sx, sy));
    }
}
