use crate::viewport::{REFERENCE_ZOOM, Viewport, zoom_scale};

pub const TILE_SIZE: f64 = 256.0;
pub const MIN_NATIVE_ZOOM: i32 = 2;
/// Deeper display zooms upscale tiles of this level.
pub const MAX_NATIVE_ZOOM: i32 = REFERENCE_ZOOM;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileCoord {
    pub z: i32,
    pub x: u32,
    pub y: u32,
}

impl TileCoord {
    pub fn url(&self) -> String {
        format!("/tiles/{}/{}/{}.png", self.z, self.x, self.y)
    }

    /// Screen rectangle `(x, y, size)` of this tile under `viewport`.
    pub fn screen_rect(&self, viewport: &Viewport) -> (f64, f64, f64) {
        // Tile edge in raster pixels at the reference zoom
        let raster_size = TILE_SIZE / zoom_scale(self.z);
        let (sx, sy) = viewport.raster_to_screen(self.x as f64 * raster_size, self.y as f64 * raster_size);
        (sx, sy, raster_size * viewport.scale())
    }
}

/// Tile level used to display `zoom`.
pub fn native_zoom(zoom: i32) -> i32 {
    zoom.clamp(MIN_NATIVE_ZOOM, MAX_NATIVE_ZOOM)
}

/// Tiles covering the visible part of an `image_w × image_h` raster, never
/// including negative or past-the-edge indices.
pub fn visible_tiles(
    viewport: &Viewport,
    width: f64,
    height: f64,
    image_w: f64,
    image_h: f64,
) -> Vec<TileCoord> {
    let z = native_zoom(viewport.zoom);
    let raster_size = TILE_SIZE / zoom_scale(z);

    let (left, top) = viewport.screen_to_raster(0.0, 0.0);
    let (right, bottom) = viewport.screen_to_raster(width, height);
    let left = left.max(0.0);
    let top = top.max(0.0);
    let right = right.min(image_w);
    let bottom = bottom.min(image_h);
    if right <= left || bottom <= top {
        return Vec::new();
    }

    let x0 = (left / raster_size).floor() as u32;
    let y0 = (top / raster_size).floor() as u32;
    let x1 = ((right / raster_size).ceil() as u32).max(x0 + 1);
    let y1 = ((bottom / raster_size).ceil() as u32).max(y0 + 1);

    let mut tiles = Vec::with_capacity(((x1 - x0) * (y1 - y0)) as usize);
    for y in y0..y1 {
        for x in x0..x1 {
            tiles.push(TileCoord { z, x, y });
        }
    }
    tiles
}

#[cfg(test)]
mod tests {
    use super::{TileCoord, native_zoom, visible_tiles};
    use crate::viewport::Viewport;

    #[test]
    fn display_zoom_above_seven_uses_level_seven() {
        assert_eq!(native_zoom(9), 7);
        assert_eq!(native_zoom(7), 7);
        assert_eq!(native_zoom(3), 3);
    }

    #[test]
    fn url_format() {
        assert_eq!(TileCoord { z: 5, x: 3, y: 12 }.url(), "/tiles/5/3/12.png");
    }

    #[test]
    fn no_negative_tiles_when_panned_past_origin() {
        let mut vp = Viewport::new(7, 9);
        vp.pan(300.0, 300.0);
        let tiles = visible_tiles(&vp, 800.0, 600.0, 32768.0, 32768.0);
        assert_eq!(tiles.first(), Some(&TileCoord { z: 7, x: 0, y: 0 }));
        // 500 x 300 raster px visible: 2 columns, 2 rows
        assert_eq!(tiles.len(), 4);
    }

    #[test]
    fn upscaled_tiles_cover_more_screen() {
        let vp = Viewport::new(9, 9);
        let (_, _, size) = TileCoord { z: 7, x: 1, y: 0 }.screen_rect(&vp);
        assert_eq!(size, 1024.0);
        let tiles = visible_tiles(&vp, 800.0, 600.0, 32768.0, 32768.0);
        assert_eq!(tiles.len(), 1);
    }

    #[test]
    fn offscreen_image_yields_nothing() {
        let mut vp = Viewport::new(3, 9);
        vp.pan(5000.0, 0.0);
        assert!(visible_tiles(&vp, 800.0, 600.0, 32768.0, 32768.0).is_empty());
    }
}
