use crate::viewport::Viewport;

/// Fixed mapping between game meters and raster pixels of the map image.
///
/// Game origin is the bottom-left corner of the island with y growing north;
/// raster origin is the top-left corner of the image with y growing down.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MapProjection {
    pub island_width: f64,
    pub island_height: f64,
    pub image_width: f64,
    pub image_height: f64,
}

impl MapProjection {
    pub fn new(island_width: f64, island_height: f64, image_width: f64, image_height: f64) -> Self {
        Self {
            island_width,
            island_height,
            image_width,
            image_height,
        }
    }

    fn x_scale(&self) -> f64 {
        self.image_width / self.island_width
    }

    fn y_scale(&self) -> f64 {
        self.image_height / self.island_height
    }

    pub fn game_to_raster(&self, x: f64, y: f64) -> (f64, f64) {
        (x * self.x_scale(), self.image_height - y * self.y_scale())
    }

    pub fn raster_to_game(&self, px: f64, py: f64) -> (f64, f64) {
        (px / self.x_scale(), (self.image_height - py) / self.y_scale())
    }

    pub fn game_to_screen(&self, viewport: &Viewport, x: f64, y: f64) -> (f64, f64) {
        let (px, py) = self.game_to_raster(x, y);
        viewport.raster_to_screen(px, py)
    }

    pub fn screen_to_game(&self, viewport: &Viewport, sx: f64, sy: f64) -> (f64, f64) {
        let (px, py) = viewport.screen_to_raster(sx, sy);
        self.raster_to_game(px, py)
    }

    /// Screen pixels covered by `meters` along the x axis at the current zoom.
    pub fn meters_to_screen(&self, viewport: &Viewport, meters: f64) -> f64 {
        meters * self.x_scale() * viewport.scale()
    }

    /// Raster bounds of the whole image, `(min_x, min_y, max_x, max_y)`.
    pub fn raster_bounds(&self) -> (f64, f64, f64, f64) {
        (0.0, 0.0, self.image_width, self.image_height)
    }
}
