use crate::colors::hex_to_rgba;
use crate::config::{LineStyle, MapConfig};
use crate::grid::{AxisLabels, CacheBuilds, CellLabels, GridGeometryCache, cell_index};
use crate::layer::{FrameContext, MapLayer, OverlaySurface};

pub const TOP_GUTTER: f64 = 25.0;
pub const LEFT_GUTTER: f64 = 30.0;
const GUTTER_FILL: &str = "white";
const GUTTER_ALPHA: f64 = 0.9;
/// Distance of each cell label line from the cell center at reference zoom.
const CELL_LINE_OFFSET: f64 = 24.0;

/// On-screen rectangle covered by the island, clamped to the frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VisibleRect {
    pub left: f64,
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
}

impl VisibleRect {
    pub fn of_island(frame: &FrameContext<'_>) -> Self {
        let config = frame.config;
        let (sw_x, sw_y) = frame.game_to_screen(0.0, 0.0);
        let (ne_x, ne_y) = frame.game_to_screen(config.island_width, config.island_height);
        Self {
            left: sw_x.max(0.0),
            top: ne_y.max(0.0),
            right: ne_x.min(frame.width),
            bottom: sw_y.min(frame.height),
        }
    }

    pub fn is_degenerate(&self) -> bool {
        self.right <= self.left || self.bottom <= self.top
    }
}

/// Label gutter placement for a visible rectangle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Gutters {
    pub top_y: f64,
    pub left_x: f64,
    /// Left edge of the line area, right of the left gutter.
    pub interior_left: f64,
    /// Top edge of the line area, below the top gutter.
    pub interior_top: f64,
}

impl Gutters {
    /// Gutters sit just outside an island edge that is on screen, otherwise at
    /// the frame edge over the island.
    pub fn around(rect: &VisibleRect) -> Self {
        let top_y = if rect.top > 0.0 {
            rect.top - TOP_GUTTER
        } else {
            0.0
        };
        let left_x = if rect.left > 0.0 {
            rect.left - LEFT_GUTTER
        } else {
            0.0
        };
        Self {
            top_y,
            left_x,
            interior_left: rect.left.max(left_x + LEFT_GUTTER),
            interior_top: rect.top.max(top_y + TOP_GUTTER),
        }
    }
}

/// What a grid pass drew.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OverlayStats {
    pub skipped: bool,
    pub fine_active: bool,
    pub coarse_lines: usize,
    pub fine_lines: usize,
    pub axis_labels: usize,
    pub cell_labels: usize,
}

/// Coordinate grid with axis gutters and optional per-cell labels.
#[derive(Debug)]
pub struct GridOverlay {
    cache: GridGeometryCache,
    attached: bool,
    last_stats: OverlayStats,
}

impl Default for GridOverlay {
    fn default() -> Self {
        Self::new()
    }
}

impl GridOverlay {
    pub fn new() -> Self {
        Self {
            cache: GridGeometryCache::new(),
            attached: true,
            last_stats: OverlayStats::default(),
        }
    }

    pub fn last_stats(&self) -> OverlayStats {
        self.last_stats
    }

    pub fn builds(&self) -> CacheBuilds {
        self.cache.builds()
    }

    /// Run one render pass. The surface is not cleared here.
    pub fn draw(&mut self, surface: &mut dyn OverlaySurface, frame: &FrameContext<'_>) -> OverlayStats {
        let rect = VisibleRect::of_island(frame);
        if rect.is_degenerate() {
            return OverlayStats {
                skipped: true,
                ..OverlayStats::default()
            };
        }
        let gutters = Gutters::around(&rect);

        surface.set_fill_style(GUTTER_FILL);
        surface.set_global_alpha(GUTTER_ALPHA);
        surface.fill_rect(rect.left, gutters.top_y, rect.right - rect.left, TOP_GUTTER);
        surface.fill_rect(gutters.left_x, rect.top, LEFT_GUTTER, rect.bottom - rect.top);
        surface.set_global_alpha(1.0);

        let config = frame.config;
        let fine_active = frame.viewport.zoom >= config.zoom_threshold;
        let geometry = self.cache.prepare(config, fine_active);
        let mut stats = OverlayStats {
            fine_active,
            ..OverlayStats::default()
        };

        stats.coarse_lines = stroke_lines(
            surface,
            frame,
            &rect,
            &gutters,
            &config.km_line_style,
            &geometry.lines.x.coarse,
            &geometry.lines.y.coarse,
        );
        surface.set_global_alpha(1.0);

        if fine_active {
            stats.fine_lines = stroke_lines(
                surface,
                frame,
                &rect,
                &gutters,
                &config.hm_line_style,
                &geometry.lines.x.fine,
                &geometry.lines.y.fine,
            );
            surface.set_global_alpha(1.0);
        }

        stats.axis_labels = draw_axis_labels(surface, frame, &rect, &gutters, geometry.axis_labels);

        if fine_active && config.cell_coord_style.show {
            stats.cell_labels = draw_cell_labels(surface, frame, &rect, &gutters, geometry.cell_labels);
        }

        stats
    }
}

impl MapLayer for GridOverlay {
    fn name(&self) -> &'static str {
        "grid"
    }

    fn attached(&self) -> bool {
        self.attached
    }

    fn attach(&mut self) {
        self.attached = true;
    }

    fn detach(&mut self) {
        self.attached = false;
        self.cache.invalidate();
    }

    fn render(&mut self, surface: &mut dyn OverlaySurface, frame: &FrameContext<'_>) {
        self.last_stats = self.draw(surface, frame);
    }
}

fn stroke_lines(
    surface: &mut dyn OverlaySurface,
    frame: &FrameContext<'_>,
    rect: &VisibleRect,
    gutters: &Gutters,
    style: &LineStyle,
    xs: &[f64],
    ys: &[f64],
) -> usize {
    surface.set_stroke_style(&style.color);
    surface.set_line_width(style.weight);
    surface.set_global_alpha(style.opacity);

    let mut drawn = 0;
    for &x in xs {
        let (sx, _) = frame.game_to_screen(x, 0.0);
        if sx < gutters.interior_left || sx > rect.right {
            continue;
        }
        surface.line(sx, gutters.interior_top, sx, rect.bottom);
        drawn += 1;
    }
    for &y in ys {
        let (_, sy) = frame.game_to_screen(0.0, y);
        if sy < gutters.interior_top || sy > rect.bottom {
            continue;
        }
        surface.line(gutters.interior_left, sy, rect.right, sy);
        drawn += 1;
    }
    drawn
}

fn draw_axis_labels(
    surface: &mut dyn OverlaySurface,
    frame: &FrameContext<'_>,
    rect: &VisibleRect,
    gutters: &Gutters,
    labels: &AxisLabels,
) -> usize {
    let style = &frame.config.label_style;
    surface.set_font(&style.css_font());
    surface.set_fill_style(&style.color);
    surface.set_global_alpha(style.opacity);

    let mut drawn = 0;
    let label_y = gutters.top_y + TOP_GUTTER / 2.0;
    for label in &labels.x {
        let (sx, _) = frame.game_to_screen(label.position, 0.0);
        if sx < gutters.interior_left || sx > rect.right {
            continue;
        }
        surface.fill_text(&label.text, sx, label_y);
        drawn += 1;
    }
    let label_x = gutters.left_x + LEFT_GUTTER / 2.0;
    for label in &labels.y {
        let (_, sy) = frame.game_to_screen(0.0, label.position);
        if sy < gutters.interior_top || sy > rect.bottom {
            continue;
        }
        surface.fill_text(&label.text, label_x, sy);
        drawn += 1;
    }
    surface.set_global_alpha(1.0);
    drawn
}

/// Inclusive index range of cells overlapping `[lo, hi]` meters, clamped to `count`.
fn cell_range(lo: f64, hi: f64, step: f64, count: usize) -> Option<(usize, usize)> {
    if count == 0 {
        return None;
    }
    let first = cell_index(lo, step).max(0);
    let last = cell_index(hi, step).min(count as i64 - 1);
    if last < first {
        return None;
    }
    Some((first as usize, last as usize))
}

fn draw_cell_labels(
    surface: &mut dyn OverlaySurface,
    frame: &FrameContext<'_>,
    rect: &VisibleRect,
    gutters: &Gutters,
    cells: &CellLabels,
) -> usize {
    let config: &MapConfig = frame.config;
    let style = &config.cell_coord_style;

    let reference_px = cells.step * config.scale_factor();
    let current_px = frame.projection().meters_to_screen(frame.viewport, cells.step);
    let scale = current_px / reference_px;
    let font_px = (style.font_size * scale).round().max(1.0);
    let line_offset = (CELL_LINE_OFFSET * scale).round();

    surface.set_font(&format!("{font_px}px {}", style.font_family));
    surface.set_fill_style(&hex_to_rgba(&style.color, style.opacity));

    // Game-space extent of the interior; screen y grows opposite to game y
    let (min_x, max_y) = frame.screen_to_game(gutters.interior_left, gutters.interior_top);
    let (max_x, min_y) = frame.screen_to_game(rect.right, rect.bottom);
    let Some((col_first, col_last)) = cell_range(min_x, max_x, cells.step, cells.column_count())
    else {
        return 0;
    };
    let Some((row_first, row_last)) = cell_range(min_y, max_y, cells.step, cells.row_count())
    else {
        return 0;
    };

    let mut drawn = 0;
    for row in row_first..=row_last {
        let Some(row_text) = cells.row_text(row) else {
            continue;
        };
        for column in col_first..=col_last {
            let Some(column_text) = cells.column_text(column) else {
                continue;
            };
            let (cx, cy) = cells.center(column, row);
            let (sx, sy) = frame.game_to_screen(cx, cy);
            if sx < gutters.interior_left
                || sy < gutters.interior_top
                || sx > rect.right
                || sy > rect.bottom
            {
                continue;
            }
            surface.fill_text(column_text, sx, sy - line_offset);
            surface.fill_text(row_text, sx, sy + line_offset);
            drawn += 1;
        }
    }
    drawn
}

#[cfg(test)]
mod tests {
    use super::{GridOverlay, Gutters, LEFT_GUTTER, TOP_GUTTER, VisibleRect};
    use crate::config::MapConfig;
    use crate::layer::recording::{Op, RecordingSurface};
    use crate::layer::{FrameContext, MapLayer};
    use crate::viewport::Viewport;

    fn viewport(zoom: i32, offset_x: f64, offset_y: f64) -> Viewport {
        let mut vp = Viewport::new(zoom, 9);
        vp.offset_x = offset_x;
        vp.offset_y = offset_y;
        vp
    }

    #[test]
    fn coarse_only_below_threshold() {
        let config = MapConfig::default();
        let vp = viewport(3, 100.0, 100.0);
        let frame = FrameContext::new(&config, &vp, 800.0, 600.0);
        let mut overlay = GridOverlay::new();
        let mut surface = RecordingSurface::default();

        let stats = overlay.draw(&mut surface, &frame);

        assert!(!stats.fine_active);
        assert_eq!(stats.fine_lines, 0);
        // x = 0..=5000 and y = 12000..=15000
        assert_eq!(stats.coarse_lines, 10);
        assert_eq!(surface.strokes(), vec!["#ff0000"]);
        assert_eq!(surface.lines(), 10);
    }

    #[test]
    fn fine_lines_appear_at_threshold() {
        let config = MapConfig::default();
        let vp = viewport(4, 100.0, 100.0);
        let frame = FrameContext::new(&config, &vp, 800.0, 600.0);
        let mut overlay = GridOverlay::new();
        let mut surface = RecordingSurface::default();

        let stats = overlay.draw(&mut surface, &frame);

        assert!(stats.fine_active);
        assert!(stats.fine_lines > 0);
        assert_eq!(surface.strokes(), vec!["#ff0000", "#0000ff"]);
        assert_eq!(surface.lines(), stats.coarse_lines + stats.fine_lines);
    }

    #[test]
    fn alpha_resets_between_line_groups() {
        let config = MapConfig::default();
        let vp = viewport(4, 100.0, 100.0);
        let frame = FrameContext::new(&config, &vp, 800.0, 600.0);
        let mut surface = RecordingSurface::default();
        GridOverlay::new().draw(&mut surface, &frame);

        let hm_stroke = surface
            .ops
            .iter()
            .position(|op| *op == Op::Stroke("#0000ff".to_string()))
            .unwrap();
        assert_eq!(surface.ops[hm_stroke - 1], Op::Alpha(1.0));
        // gutters are filled before any line
        let first_rect = surface.ops.iter().position(|op| matches!(op, Op::FillRect(..)));
        let first_line = surface.ops.iter().position(|op| matches!(op, Op::Line(..)));
        assert!(first_rect < first_line);
    }

    #[test]
    fn gutters_hug_visible_island_edges() {
        let rect = VisibleRect {
            left: 100.0,
            top: 80.0,
            right: 800.0,
            bottom: 600.0,
        };
        let gutters = Gutters::around(&rect);
        assert_eq!(gutters.top_y, 80.0 - TOP_GUTTER);
        assert_eq!(gutters.left_x, 100.0 - LEFT_GUTTER);
        assert_eq!(gutters.interior_left, 100.0);

        let clipped = VisibleRect {
            left: 0.0,
            top: 0.0,
            right: 800.0,
            bottom: 600.0,
        };
        let gutters = Gutters::around(&clipped);
        assert_eq!((gutters.top_y, gutters.left_x), (0.0, 0.0));
        assert_eq!(gutters.interior_left, LEFT_GUTTER);
        assert_eq!(gutters.interior_top, TOP_GUTTER);
    }

    #[test]
    fn offscreen_island_is_silent_noop() {
        let config = MapConfig::default();
        let vp = viewport(3, 5000.0, 0.0);
        let frame = FrameContext::new(&config, &vp, 800.0, 600.0);
        let mut surface = RecordingSurface::default();
        let stats = GridOverlay::new().draw(&mut surface, &frame);
        assert!(stats.skipped);
        assert!(surface.ops.is_empty());
    }

    #[test]
    fn cell_labels_scale_with_zoom_and_skip_gutters() {
        let mut config = MapConfig::default();
        config.cell_coord_style.show = true;
        // island bottom-left corner at (50, 600)
        let vp = viewport(7, 50.0, 600.0 - 32768.0);
        let frame = FrameContext::new(&config, &vp, 800.0, 600.0);
        let mut surface = RecordingSurface::default();

        let stats = GridOverlay::new().draw(&mut surface, &frame);

        assert_eq!(stats.cell_labels, 12);
        assert!(surface.ops.contains(&Op::Font("12px sans-serif".to_string())));
        let texts = surface.texts();
        assert!(texts.contains(&"002"));
        assert!(texts.contains(&"000"));

        let vp = viewport(8, 50.0, 600.0 - 65536.0);
        let frame = FrameContext::new(&config, &vp, 800.0, 600.0);
        let mut surface = RecordingSurface::default();
        GridOverlay::new().draw(&mut surface, &frame);
        assert!(surface.ops.contains(&Op::Font("24px sans-serif".to_string())));
    }

    #[test]
    fn cell_label_lines_sit_one_offset_from_center() {
        let mut config = MapConfig::default();
        config.cell_coord_style.show = true;
        for (zoom, offset) in [(7, 24.0), (8, 48.0)] {
            let raster_h = 32768.0 * 2f64.powi(zoom - 7);
            let vp = viewport(zoom, 50.0, 600.0 - raster_h);
            let frame = FrameContext::new(&config, &vp, 800.0, 600.0);
            let mut surface = RecordingSurface::default();
            GridOverlay::new().draw(&mut surface, &frame);

            let (cx, cy) = frame.game_to_screen(150.0, 50.0);
            let drawn_at = |text: &str, y: f64| {
                surface.ops.iter().any(|op| {
                    matches!(op, Op::Text(t, x, ty)
                        if t == text && (x - cx).abs() < 1e-6 && (ty - y).abs() < 1e-6)
                })
            };
            assert!(drawn_at("001", cy - offset), "column line at zoom {zoom}");
            assert!(drawn_at("000", cy + offset), "row line at zoom {zoom}");
        }
    }

    #[test]
    fn axis_labels_switch_step_at_threshold() {
        let config = MapConfig::default();
        let mut overlay = GridOverlay::new();

        let vp = viewport(config.zoom_threshold - 1, 100.0, 100.0);
        let frame = FrameContext::new(&config, &vp, 800.0, 600.0);
        let mut surface = RecordingSurface::default();
        let coarse = overlay.draw(&mut surface, &frame);
        let texts = surface.texts();
        assert!(texts.contains(&"010"));
        assert!(!texts.contains(&"001"));

        let vp = viewport(config.zoom_threshold, 100.0, 100.0);
        let frame = FrameContext::new(&config, &vp, 800.0, 600.0);
        let mut surface = RecordingSurface::default();
        let fine = overlay.draw(&mut surface, &frame);
        let texts = surface.texts();
        assert!(texts.contains(&"001"));
        assert!(texts.contains(&"002"));
        assert!(fine.axis_labels > coarse.axis_labels);
    }

    #[test]
    fn cell_labels_hidden_below_threshold() {
        let mut config = MapConfig::default();
        config.cell_coord_style.show = true;
        let vp = viewport(3, 100.0, 100.0);
        let frame = FrameContext::new(&config, &vp, 800.0, 600.0);
        let mut surface = RecordingSurface::default();
        let stats = GridOverlay::new().draw(&mut surface, &frame);
        assert_eq!(stats.cell_labels, 0);
    }

    #[test]
    fn panning_reuses_cached_geometry() {
        let config = MapConfig::default();
        let mut overlay = GridOverlay::new();
        let mut surface = RecordingSurface::default();
        for dx in [0.0, 40.0, 80.0] {
            let vp = viewport(4, 100.0 + dx, 100.0);
            let frame = FrameContext::new(&config, &vp, 800.0, 600.0);
            overlay.render(&mut surface, &frame);
        }
        assert_eq!(overlay.builds().lines, 1);
        assert!(overlay.last_stats().fine_active);
    }
}
