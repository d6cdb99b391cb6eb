use serde::{Deserialize, Serialize};

use crate::config::MapConfig;
use crate::viewport::{MIN_ZOOM, Viewport, zoom_scale};

/// Side of a snapshot cell in meters.
pub const CELL_SIZE_M: f64 = 100.0;
/// Largest area edge, in pixels, a capture may render at.
pub const MAX_CAPTURE_PX: f64 = 1572.0;
pub const BORDER_PX: f64 = 50.0;

/// Game-meter bounding box used by area queries.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AreaQuery {
    #[serde(rename = "minX")]
    pub min_x: f64,
    #[serde(rename = "maxX")]
    pub max_x: f64,
    #[serde(rename = "minY")]
    pub min_y: f64,
    #[serde(rename = "maxY")]
    pub max_y: f64,
}

impl AreaQuery {
    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.min_x && x <= self.max_x && y >= self.min_y && y <= self.max_y
    }
}

/// A building returned by `/get_buildings`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Building {
    pub id: Option<i64>,
    pub name: String,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// `POST /save_snapshot` body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotUpload {
    pub image: String,
    pub filename: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureRequest {
    pub cell_x: i64,
    pub cell_y: i64,
    /// Half-extent of the area in cells.
    pub radius: u32,
    pub with_cell_numbers: bool,
}

/// Where and how to render a capture.
#[derive(Debug, Clone, PartialEq)]
pub struct CapturePlan {
    pub area: AreaQuery,
    pub zoom: i32,
    pub width_px: u32,
    pub height_px: u32,
    /// Viewport placing the area's top-left corner at `(BORDER_PX, BORDER_PX)`.
    pub viewport: Viewport,
    pub filename: String,
}

pub fn capture_filename(request: &CaptureRequest, zoom: i32) -> String {
    format!(
        "snapshot_{}_{}_m{}_z{}.png",
        request.cell_x, request.cell_y, request.radius, zoom
    )
}

/// Compute capture geometry: the highest zoom not above `maxZoom` whose area
/// edge fits `MAX_CAPTURE_PX`, never below the minimum zoom.
pub fn plan_capture(request: &CaptureRequest, config: &MapConfig) -> CapturePlan {
    let cx = request.cell_x as f64 * CELL_SIZE_M;
    let cy = request.cell_y as f64 * CELL_SIZE_M;
    let half = f64::from(request.radius) * CELL_SIZE_M;
    let area = AreaQuery {
        min_x: cx - half,
        max_x: cx + half,
        min_y: cy - half,
        max_y: cy + half,
    };

    let projection = config.projection();
    let (left, top) = projection.game_to_raster(area.min_x, area.max_y);
    let (right, bottom) = projection.game_to_raster(area.max_x, area.min_y);
    let raster_w = right - left;
    let raster_h = bottom - top;

    let max_zoom = config.max_zoom.max(MIN_ZOOM);
    let mut zoom = max_zoom;
    while zoom > MIN_ZOOM && raster_w.max(raster_h) * zoom_scale(zoom) > MAX_CAPTURE_PX {
        zoom -= 1;
    }
    let scale = zoom_scale(zoom);

    let mut viewport = Viewport::new(zoom, max_zoom);
    viewport.offset_x = BORDER_PX - left * scale;
    viewport.offset_y = BORDER_PX - top * scale;

    CapturePlan {
        area,
        zoom,
        width_px: (raster_w * scale + 2.0 * BORDER_PX).round() as u32,
        height_px: (raster_h * scale + 2.0 * BORDER_PX).round() as u32,
        viewport,
        filename: capture_filename(request, zoom),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{AreaQuery, BORDER_PX, CaptureRequest, MAX_CAPTURE_PX, plan_capture};
    use crate::config::MapConfig;

    fn request(radius: u32) -> CaptureRequest {
        CaptureRequest {
            cell_x: 65,
            cell_y: 25,
            radius,
            with_cell_numbers: true,
        }
    }

    #[test]
    fn area_is_centered_on_cell() {
        let plan = plan_capture(&request(3), &MapConfig::default());
        assert_eq!(
            plan.area,
            AreaQuery {
                min_x: 6200.0,
                max_x: 6800.0,
                min_y: 2200.0,
                max_y: 2800.0
            }
        );
    }

    #[test]
    fn zoom_is_highest_that_fits() {
        let config = MapConfig::default();
        // 600 m = 1280 raster px: fits at zoom 7, 2560 at zoom 8 does not
        let plan = plan_capture(&request(3), &config);
        assert_eq!(plan.zoom, 7);
        assert_eq!(plan.width_px, 1280 + 2 * BORDER_PX as u32);
        assert_eq!(plan.filename, "snapshot_65_25_m3_z7.png");

        // 200 m = 426.7 raster px: fits at zoom 8 (853) and zoom 9 (1707) does not
        let plan = plan_capture(&request(1), &config);
        assert_eq!(plan.zoom, 8);
        assert!(plan.width_px as f64 - 2.0 * BORDER_PX <= MAX_CAPTURE_PX);
    }

    #[test]
    fn huge_area_stops_at_min_zoom() {
        let plan = plan_capture(&request(200), &MapConfig::default());
        assert_eq!(plan.zoom, 2);
    }

    #[test]
    fn area_top_left_lands_inside_border() {
        let config = MapConfig::default();
        let plan = plan_capture(&request(2), &config);
        let projection = config.projection();
        let (sx, sy) = projection.game_to_screen(&plan.viewport, plan.area.min_x, plan.area.max_y);
        assert!((sx - BORDER_PX).abs() < 1e-6);
        assert!((sy - BORDER_PX).abs() < 1e-6);
    }

    #[test]
    fn area_query_wire_keys() {
        let area = AreaQuery {
            min_x: 1.0,
            max_x: 2.0,
            min_y: 3.0,
            max_y: 4.0,
        };
        assert_eq!(
            serde_json::to_value(area).unwrap(),
            json!({ "minX": 1.0, "maxX": 2.0, "minY": 3.0, "maxY": 4.0 })
        );
    }
}
