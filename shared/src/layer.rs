use crate::config::MapConfig;
use crate::transform::MapProjection;
use crate::viewport::Viewport;

/// 2D drawing target for overlay layers.
///
/// Mirrors the subset of the Canvas 2D API the layers use. Text is drawn
/// centered horizontally and vertically on the given point.
pub trait OverlaySurface {
    fn clear(&mut self, width: f64, height: f64);
    fn set_global_alpha(&mut self, alpha: f64);
    fn set_fill_style(&mut self, style: &str);
    fn set_stroke_style(&mut self, style: &str);
    fn set_line_width(&mut self, width: f64);
    fn set_font(&mut self, font: &str);
    fn fill_rect(&mut self, x: f64, y: f64, w: f64, h: f64);
    fn stroke_rect(&mut self, x: f64, y: f64, w: f64, h: f64);
    fn line(&mut self, x0: f64, y0: f64, x1: f64, y1: f64);
    fn fill_circle(&mut self, x: f64, y: f64, radius: f64);
    fn fill_text(&mut self, text: &str, x: f64, y: f64);
}

/// Everything a layer needs to draw one frame.
#[derive(Debug, Clone, Copy)]
pub struct FrameContext<'a> {
    pub config: &'a MapConfig,
    pub viewport: &'a Viewport,
    pub width: f64,
    pub height: f64,
}

impl<'a> FrameContext<'a> {
    pub fn new(config: &'a MapConfig, viewport: &'a Viewport, width: f64, height: f64) -> Self {
        Self {
            config,
            viewport,
            width,
            height,
        }
    }

    pub fn projection(&self) -> MapProjection {
        self.config.projection()
    }

    pub fn game_to_screen(&self, x: f64, y: f64) -> (f64, f64) {
        self.projection().game_to_screen(self.viewport, x, y)
    }

    pub fn screen_to_game(&self, sx: f64, sy: f64) -> (f64, f64) {
        self.projection().screen_to_game(self.viewport, sx, sy)
    }

    /// Whether a screen point falls inside the frame, with `margin` pixels of slack.
    pub fn on_screen(&self, sx: f64, sy: f64, margin: f64) -> bool {
        sx >= -margin && sy >= -margin && sx <= self.width + margin && sy <= self.height + margin
    }
}

/// A drawable map layer with an explicit attach/detach lifecycle.
pub trait MapLayer {
    fn name(&self) -> &'static str;
    fn attached(&self) -> bool;
    fn attach(&mut self);
    fn detach(&mut self);
    fn render(&mut self, surface: &mut dyn OverlaySurface, frame: &FrameContext<'_>);
}

/// Render attached layers bottom-up. Returns how many layers drew.
pub fn render_layers(
    layers: &mut [&mut dyn MapLayer],
    surface: &mut dyn OverlaySurface,
    frame: &FrameContext<'_>,
) -> usize {
    let mut drawn = 0;
    for layer in layers.iter_mut() {
        if layer.attached() {
            layer.render(surface, frame);
            drawn += 1;
        }
    }
    drawn
}

#[cfg(test)]
pub(crate) mod recording {
    use super::OverlaySurface;

    #[derive(Debug, Clone, PartialEq)]
    pub enum Op {
        Clear,
        Alpha(f64),
        Fill(String),
        Stroke(String),
        LineWidth(f64),
        Font(String),
        FillRect(f64, f64, f64, f64),
        StrokeRect(f64, f64, f64, f64),
        Line(f64, f64, f64, f64),
        Circle(f64, f64, f64),
        Text(String, f64, f64),
    }

    /// Surface that records every call for inspection.
    #[derive(Debug, Default)]
    pub struct RecordingSurface {
        pub ops: Vec<Op>,
    }

    impl RecordingSurface {
        pub fn lines(&self) -> usize {
            self.ops.iter().filter(|op| matches!(op, Op::Line(..))).count()
        }

        pub fn texts(&self) -> Vec<&str> {
            self.ops
                .iter()
                .filter_map(|op| match op {
                    Op::Text(text, _, _) => Some(text.as_str()),
                    _ => None,
                })
                .collect()
        }

        pub fn strokes(&self) -> Vec<&str> {
            self.ops
                .iter()
                .filter_map(|op| match op {
                    Op::Stroke(style) => Some(style.as_str()),
                    _ => None,
                })
                .collect()
        }
    }

    impl OverlaySurface for RecordingSurface {
        fn clear(&mut self, _width: f64, _height: f64) {
            self.ops.push(Op::Clear);
        }
        fn set_global_alpha(&mut self, alpha: f64) {
            self.ops.push(Op::Alpha(alpha));
        }
        fn set_fill_style(&mut self, style: &str) {
            self.ops.push(Op::Fill(style.to_string()));
        }
        fn set_stroke_style(&mut self, style: &str) {
            self.ops.push(Op::Stroke(style.to_string()));
        }
        fn set_line_width(&mut self, width: f64) {
            self.ops.push(Op::LineWidth(width));
        }
        fn set_font(&mut self, font: &str) {
            self.ops.push(Op::Font(font.to_string()));
        }
        fn fill_rect(&mut self, x: f64, y: f64, w: f64, h: f64) {
            self.ops.push(Op::FillRect(x, y, w, h));
        }
        fn stroke_rect(&mut self, x: f64, y: f64, w: f64, h: f64) {
            self.ops.push(Op::StrokeRect(x, y, w, h));
        }
        fn line(&mut self, x0: f64, y0: f64, x1: f64, y1: f64) {
            self.ops.push(Op::Line(x0, y0, x1, y1));
        }
        fn fill_circle(&mut self, x: f64, y: f64, radius: f64) {
            self.ops.push(Op::Circle(x, y, radius));
        }
        fn fill_text(&mut self, text: &str, x: f64, y: f64) {
            self.ops.push(Op::Text(text.to_string(), x, y));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::recording::RecordingSurface;
    use super::{FrameContext, MapLayer, OverlaySurface, render_layers};
    use crate::config::MapConfig;
    use crate::viewport::Viewport;

    struct Marker {
        attached: bool,
        renders: usize,
    }

    impl MapLayer for Marker {
        fn name(&self) -> &'static str {
            "marker"
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
        fn render(&mut self, surface: &mut dyn OverlaySurface, _frame: &FrameContext<'_>) {
            self.renders += 1;
            surface.fill_circle(0.0, 0.0, 1.0);
        }
    }

    #[test]
    fn detached_layers_are_skipped() {
        let config = MapConfig::default();
        let viewport = Viewport::default();
        let frame = FrameContext::new(&config, &viewport, 800.0, 600.0);
        let mut a = Marker {
            attached: true,
            renders: 0,
        };
        let mut b = Marker {
            attached: true,
            renders: 0,
        };
        b.detach();
        let mut surface = RecordingSurface::default();

        let mut layers: [&mut dyn MapLayer; 2] = [&mut a, &mut b];
        let drawn = render_layers(&mut layers, &mut surface, &frame);
        assert_eq!(drawn, 1);
        assert_eq!((a.renders, b.renders), (1, 0));
    }
}
