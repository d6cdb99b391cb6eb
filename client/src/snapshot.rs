use wasm_bindgen::JsCast;
use wasm_bindgen_futures::JsFuture;
use web_sys::{CanvasRenderingContext2d, HtmlCanvasElement, HtmlImageElement};

use tactical_shared::names::NamesLayer;
use tactical_shared::overlay::GridOverlay;
use tactical_shared::snapshot::{CaptureRequest, SnapshotUpload, plan_capture};
use tactical_shared::tiles::{TileCoord, visible_tiles};
use tactical_shared::{FrameContext, MapConfig, MapLayer, OverlaySurface};

use crate::api;
use crate::surface::CanvasSurface;
use crate::tiles::SharedTileCache;

const BUILDING_FILL: &str = "rgba(40, 40, 40, 0.85)";
const BUILDING_SIZE_PX: f64 = 4.0;

async fn load_image(url: &str) -> Result<HtmlImageElement, String> {
    let img = HtmlImageElement::new().map_err(|e| format!("image error: {e:?}"))?;
    img.set_src(url);
    JsFuture::from(img.decode())
        .await
        .map_err(|e| format!("decode error for {url}: {e:?}"))?;
    Ok(img)
}

async fn tile_image(cache: &SharedTileCache, coord: &TileCoord) -> Option<HtmlImageElement> {
    let cached = cache.borrow().get(coord).cloned();
    match cached {
        Some(img) => Some(img),
        None => load_image(&coord.url()).await.ok(),
    }
}

fn offscreen_canvas(width: u32, height: u32) -> Result<(HtmlCanvasElement, CanvasRenderingContext2d), String> {
    let document = web_sys::window()
        .and_then(|w| w.document())
        .ok_or("no document")?;
    let canvas = document
        .create_element("canvas")
        .map_err(|e| format!("canvas error: {e:?}"))?
        .dyn_into::<HtmlCanvasElement>()
        .map_err(|_| "canvas element has unexpected type".to_string())?;
    canvas.set_width(width);
    canvas.set_height(height);
    let ctx = canvas
        .get_context("2d")
        .ok()
        .flatten()
        .and_then(|ctx| ctx.dyn_into::<CanvasRenderingContext2d>().ok())
        .ok_or("2d context unavailable")?;
    Ok((canvas, ctx))
}

/// Render the requested area offscreen and upload it as a PNG. Returns the
/// saved filename.
pub async fn capture(
    request: CaptureRequest,
    mut config: MapConfig,
    cache: SharedTileCache,
) -> Result<String, String> {
    // Local copy only; the stored configuration is never touched
    if request.with_cell_numbers {
        config.cell_coord_style.show = true;
    }
    let plan = plan_capture(&request, &config);
    let width = f64::from(plan.width_px);
    let height = f64::from(plan.height_px);
    let (canvas, ctx) = offscreen_canvas(plan.width_px, plan.height_px)?;

    ctx.set_fill_style_str("#ffffff");
    ctx.fill_rect(0.0, 0.0, width, height);
    ctx.set_image_smoothing_enabled(false);

    let coords = visible_tiles(
        &plan.viewport,
        width,
        height,
        config.map_image_width,
        config.map_image_height,
    );
    let mut missing = 0;
    for coord in &coords {
        let Some(img) = tile_image(&cache, coord).await else {
            missing += 1;
            continue;
        };
        let (x, y, size) = coord.screen_rect(&plan.viewport);
        ctx.draw_image_with_html_image_element_and_dw_and_dh(&img, x, y, size, size)
            .ok();
    }
    if missing > 0 {
        web_sys::console::warn_1(
            &format!("Snapshot {}: {missing} of {} tiles unavailable", plan.filename, coords.len())
                .into(),
        );
    }

    let buildings = api::fetch_buildings(&plan.area).await.unwrap_or_else(|e| {
        web_sys::console::warn_1(&format!("Building query failed: {e}").into());
        Vec::new()
    });
    let names = api::fetch_names_in_area(&plan.area).await.unwrap_or_else(|e| {
        web_sys::console::warn_1(&format!("Name query failed: {e}").into());
        Vec::new()
    });

    {
        let frame = FrameContext::new(&config, &plan.viewport, width, height);
        let mut surface = CanvasSurface::new(&ctx);

        GridOverlay::new().draw(&mut surface, &frame);

        surface.set_global_alpha(1.0);
        surface.set_fill_style(BUILDING_FILL);
        let half = BUILDING_SIZE_PX / 2.0;
        for building in buildings.iter().filter(|b| plan.area.contains(b.x, b.y)) {
            let (sx, sy) = frame.game_to_screen(building.x, building.y);
            surface.fill_rect(sx - half, sy - half, BUILDING_SIZE_PX, BUILDING_SIZE_PX);
        }

        let mut names_layer = NamesLayer::new();
        names_layer.set_names(names);
        names_layer.render(&mut surface, &frame);
    }

    let image = canvas
        .to_data_url_with_type("image/png")
        .map_err(|e| format!("encode error: {e:?}"))?;
    let upload = SnapshotUpload {
        image,
        filename: plan.filename.clone(),
    };
    api::save_snapshot(&upload).await?;
    web_sys::console::info_1(
        &format!(
            "Saved {} ({}x{} px, zoom {}, {} buildings)",
            plan.filename,
            plan.width_px,
            plan.height_px,
            plan.zoom,
            buildings.len()
        )
        .into(),
    );
    Ok(plan.filename)
}
