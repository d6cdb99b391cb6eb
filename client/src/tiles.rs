use std::cell::RefCell;
use std::collections::{HashMap, HashSet, VecDeque};
use std::rc::Rc;

use js_sys::Reflect;
use wasm_bindgen::JsCast;
use wasm_bindgen::JsValue;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::JsFuture;
use web_sys::{CanvasRenderingContext2d, HtmlImageElement};

use tactical_shared::Viewport;
use tactical_shared::tiles::{TileCoord, visible_tiles};

const MAX_CONCURRENCY: usize = 6;
const MAX_CACHED_TILES: usize = 768;
const ONLOAD_HANDLE_KEY: &str = "__tacticalTileOnload";
const ONERROR_HANDLE_KEY: &str = "__tacticalTileOnerror";

type LoadedCallback = Rc<dyn Fn()>;

/// Decoded tile images keyed by `(z, x, y)`, oldest evicted first.
#[derive(Default)]
pub struct TileCache {
    images: HashMap<TileCoord, HtmlImageElement>,
    order: VecDeque<TileCoord>,
    failed: HashSet<TileCoord>,
    in_flight: HashSet<TileCoord>,
    queue: VecDeque<TileCoord>,
}

impl TileCache {
    pub fn get(&self, coord: &TileCoord) -> Option<&HtmlImageElement> {
        self.images.get(coord)
    }

    fn insert(&mut self, coord: TileCoord, image: HtmlImageElement) {
        if self.images.insert(coord, image).is_none() {
            self.order.push_back(coord);
        }
        while self.order.len() > MAX_CACHED_TILES {
            if let Some(oldest) = self.order.pop_front() {
                self.images.remove(&oldest);
            }
        }
    }

    fn wanted(&self, coord: &TileCoord) -> bool {
        !self.images.contains_key(coord)
            && !self.failed.contains(coord)
            && !self.in_flight.contains(coord)
            && !self.queue.contains(coord)
    }
}

pub type SharedTileCache = Rc<RefCell<TileCache>>;

/// Queue every visible tile not yet cached. The most recent view wins: tiles
/// queued for an earlier view but not started are dropped.
pub fn request_visible(
    cache: &SharedTileCache,
    viewport: &Viewport,
    width: f64,
    height: f64,
    image_w: f64,
    image_h: f64,
    on_loaded: LoadedCallback,
) {
    let coords = visible_tiles(viewport, width, height, image_w, image_h);
    {
        let mut c = cache.borrow_mut();
        c.queue.clear();
        for coord in coords {
            if c.wanted(&coord) {
                c.queue.push_back(coord);
            }
        }
    }
    pump_queue(cache.clone(), on_loaded);
}

fn pump_queue(cache: SharedTileCache, on_loaded: LoadedCallback) {
    loop {
        let job = {
            let mut c = cache.borrow_mut();
            if c.in_flight.len() >= MAX_CONCURRENCY {
                None
            } else {
                let next = c.queue.pop_front();
                if let Some(coord) = next {
                    c.in_flight.insert(coord);
                }
                next
            }
        };
        let Some(coord) = job else {
            break;
        };
        load_tile(cache.clone(), coord, on_loaded.clone());
    }
}

fn finish(cache: &SharedTileCache, coord: TileCoord, image: Option<HtmlImageElement>) {
    let mut c = cache.borrow_mut();
    c.in_flight.remove(&coord);
    match image {
        Some(image) => c.insert(coord, image),
        None => {
            c.failed.insert(coord);
        }
    }
}

fn load_tile(cache: SharedTileCache, coord: TileCoord, on_loaded: LoadedCallback) {
    let img = match HtmlImageElement::new() {
        Ok(img) => img,
        Err(_) => {
            finish(&cache, coord, None);
            return;
        }
    };

    let img_for_load = img.clone();
    let cache_load = cache.clone();
    let on_loaded_load = on_loaded.clone();
    let onload = Closure::<dyn FnMut()>::new(move || {
        clear_image_handlers(&img_for_load);

        let img_for_decode = img_for_load.clone();
        let cache_load = cache_load.clone();
        let on_loaded_load = on_loaded_load.clone();
        wasm_bindgen_futures::spawn_local(async move {
            let _ = JsFuture::from(img_for_decode.decode()).await;
            finish(&cache_load, coord, Some(img_for_decode));
            on_loaded_load();
            pump_queue(cache_load, on_loaded_load);
        });
    });

    let img_for_error = img.clone();
    let cache_error = cache.clone();
    let onerror = Closure::<dyn FnMut()>::new(move || {
        clear_image_handlers(&img_for_error);
        // Missing tiles stay blank
        finish(&cache_error, coord, None);
        pump_queue(cache_error.clone(), on_loaded.clone());
    });

    let onload_js = onload.into_js_value();
    let onerror_js = onerror.into_js_value();
    img.set_onload(Some(onload_js.unchecked_ref()));
    img.set_onerror(Some(onerror_js.unchecked_ref()));
    let _ = Reflect::set(
        img.as_ref(),
        &JsValue::from_str(ONLOAD_HANDLE_KEY),
        &onload_js,
    );
    let _ = Reflect::set(
        img.as_ref(),
        &JsValue::from_str(ONERROR_HANDLE_KEY),
        &onerror_js,
    );
    img.set_src(&coord.url());
}

fn clear_image_handlers(img: &HtmlImageElement) {
    img.set_onload(None);
    img.set_onerror(None);
    let _ = Reflect::delete_property(img.as_ref(), &JsValue::from_str(ONLOAD_HANDLE_KEY));
    let _ = Reflect::delete_property(img.as_ref(), &JsValue::from_str(ONERROR_HANDLE_KEY));
}

/// Draw the cached tiles covering the view. Returns how many were drawn.
pub fn draw_tiles(
    ctx: &CanvasRenderingContext2d,
    cache: &TileCache,
    viewport: &Viewport,
    width: f64,
    height: f64,
    image_w: f64,
    image_h: f64,
) -> usize {
    // Upscaled tiles stay crisp
    ctx.set_image_smoothing_enabled(false);
    let mut drawn = 0;
    for coord in visible_tiles(viewport, width, height, image_w, image_h) {
        let Some(img) = cache.get(&coord) else {
            continue;
        };
        let (x, y, size) = coord.screen_rect(viewport);
        if ctx
            .draw_image_with_html_image_element_and_dw_and_dh(img, x, y, size, size)
            .is_ok()
        {
            drawn += 1;
        }
    }
    drawn
}
