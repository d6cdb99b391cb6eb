/// Zoom level at which one raster pixel of the source map image equals one
/// screen pixel. All raster coordinates are expressed at this level.
pub const REFERENCE_ZOOM: i32 = 7;
pub const MIN_ZOOM: i32 = 2;
pub const DEFAULT_MAX_ZOOM: i32 = 9;

/// Viewport manages the pan/zoom transformation from raster pixels to screen
/// (container) pixels.
///
/// Zoom is kept on integer levels; each level doubles the on-screen size of a
/// raster pixel. `offset_*` is the screen position of raster origin.
#[derive(Debug, Clone, PartialEq)]
pub struct Viewport {
    pub offset_x: f64,
    pub offset_y: f64,
    pub zoom: i32,
    pub min_zoom: i32,
    pub max_zoom: i32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            offset_x: 0.0,
            offset_y: 0.0,
            zoom: 3,
            min_zoom: MIN_ZOOM,
            max_zoom: DEFAULT_MAX_ZOOM,
        }
    }
}

/// Screen pixels per raster pixel at `zoom`.
pub fn zoom_scale(zoom: i32) -> f64 {
    ((zoom - REFERENCE_ZOOM) as f64).exp2()
}

impl Viewport {
    pub fn new(zoom: i32, max_zoom: i32) -> Self {
        let max_zoom = max_zoom.max(MIN_ZOOM);
        Self {
            zoom: zoom.clamp(MIN_ZOOM, max_zoom),
            max_zoom,
            ..Self::default()
        }
    }

    pub fn scale(&self) -> f64 {
        zoom_scale(self.zoom)
    }

    /// Convert raster coordinates to screen coordinates.
    pub fn raster_to_screen(&self, px: f64, py: f64) -> (f64, f64) {
        let scale = self.scale();
        (px * scale + self.offset_x, py * scale + self.offset_y)
    }

    /// Convert screen coordinates to raster coordinates.
    pub fn screen_to_raster(&self, sx: f64, sy: f64) -> (f64, f64) {
        let scale = self.scale();
        ((sx - self.offset_x) / scale, (sy - self.offset_y) / scale)
    }

    /// Zoom by whole levels toward a focus point (screen coordinates).
    /// Returns `true` if the zoom level changed.
    pub fn zoom_at(&mut self, levels: i32, screen_x: f64, screen_y: f64) -> bool {
        let new_zoom = (self.zoom + levels).clamp(self.min_zoom, self.max_zoom);
        if new_zoom == self.zoom {
            return false;
        }
        let ratio = zoom_scale(new_zoom) / self.scale();

        // Keep the raster point under the cursor fixed
        self.offset_x = screen_x - (screen_x - self.offset_x) * ratio;
        self.offset_y = screen_y - (screen_y - self.offset_y) * ratio;
        self.zoom = new_zoom;
        true
    }

    /// Pan by screen-space delta.
    pub fn pan(&mut self, dx: f64, dy: f64) {
        self.offset_x += dx;
        self.offset_y += dy;
    }

    /// Place raster point `(px, py)` at the centre of a `canvas_w × canvas_h` container.
    pub fn center_on(&mut self, px: f64, py: f64, canvas_w: f64, canvas_h: f64) {
        let scale = self.scale();
        self.offset_x = canvas_w / 2.0 - px * scale;
        self.offset_y = canvas_h / 2.0 - py * scale;
    }

    /// Fit the viewport to show the given raster bounds: the highest zoom level at
    /// which the bounds fit the container, centred.
    pub fn fit_bounds(
        &mut self,
        min_x: f64,
        min_y: f64,
        max_x: f64,
        max_y: f64,
        canvas_w: f64,
        canvas_h: f64,
    ) {
        let raster_w = max_x - min_x;
        let raster_h = max_y - min_y;

        if raster_w <= 0.0 || raster_h <= 0.0 || canvas_w <= 0.0 || canvas_h <= 0.0 {
            return;
        }

        let mut zoom = self.max_zoom;
        while zoom > self.min_zoom {
            let scale = zoom_scale(zoom);
            if raster_w * scale <= canvas_w && raster_h * scale <= canvas_h {
                break;
            }
            zoom -= 1;
        }
        self.zoom = zoom;
        self.center_on(
            (min_x + max_x) / 2.0,
            (min_y + max_y) / 2.0,
            canvas_w,
            canvas_h,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::{REFERENCE_ZOOM, Viewport, zoom_scale};

    #[test]
    fn reference_zoom_is_identity_scale() {
        assert_eq!(zoom_scale(REFERENCE_ZOOM), 1.0);
        assert_eq!(zoom_scale(REFERENCE_ZOOM + 2), 4.0);
        assert_eq!(zoom_scale(REFERENCE_ZOOM - 3), 0.125);
    }

    #[test]
    fn zoom_at_keeps_focus_point_fixed() {
        let mut vp = Viewport::new(4, 9);
        vp.pan(37.0, -12.0);
        let focus = (400.0, 300.0);
        let before = vp.screen_to_raster(focus.0, focus.1);
        assert!(vp.zoom_at(2, focus.0, focus.1));
        let after = vp.raster_to_screen(before.0, before.1);
        assert!((after.0 - focus.0).abs() < 1e-9);
        assert!((after.1 - focus.1).abs() < 1e-9);
    }

    #[test]
    fn zoom_at_clamps_to_limits() {
        let mut vp = Viewport::new(9, 9);
        assert!(!vp.zoom_at(1, 0.0, 0.0));
        assert_eq!(vp.zoom, 9);
        assert!(vp.zoom_at(-20, 0.0, 0.0));
        assert_eq!(vp.zoom, vp.min_zoom);
    }

    #[test]
    fn fit_bounds_picks_highest_fitting_zoom() {
        let mut vp = Viewport::new(5, 9);
        // 4096 * 2^-3 = 512 fits 800, 4096 * 2^-2 = 1024 does not
        vp.fit_bounds(0.0, 0.0, 4096.0, 4096.0, 1200.0, 800.0);
        assert_eq!(vp.zoom, 4);
        let (cx, cy) = vp.raster_to_screen(2048.0, 2048.0);
        assert!((cx - 600.0).abs() < 1e-9);
        assert!((cy - 400.0).abs() < 1e-9);
    }

    #[test]
    fn fit_bounds_stops_at_min_zoom() {
        let mut vp = Viewport::new(5, 9);
        vp.fit_bounds(0.0, 0.0, 32768.0, 32768.0, 1200.0, 800.0);
        assert_eq!(vp.zoom, vp.min_zoom);
    }
}
