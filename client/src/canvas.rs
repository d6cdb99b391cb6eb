use std::cell::{Cell, RefCell};
use std::rc::Rc;

use leptos::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;
use web_sys::{CanvasRenderingContext2d, HtmlCanvasElement, MouseEvent, PointerEvent, WheelEvent};

use tactical_shared::commands::{WaypointParams, add_waypoint, delete_waypoint, edit_waypoint};
use tactical_shared::grid::cell_reference;
use tactical_shared::mission::MissionSettings;
use tactical_shared::names::NamesLayer;
use tactical_shared::overlay::GridOverlay;
use tactical_shared::reports::{ReportLog, ReportsLayer};
use tactical_shared::telemetry::{MarkerKind, TelemetryState, UnitMarker, UnitsLayer, derive_markers};
use tactical_shared::{FrameContext, MapLayer, OverlaySurface, ViewEvent, Viewport, render_layers};

use crate::api;
use crate::app::{
    CursorPosition, CursorReadout, EditLabels, LayerVisibility, MapConfigStore, NamesFetchNonce,
    PlaceNames, SelectedGroup, TileStore, WaypointMode,
};
use crate::render_loop::RenderScheduler;
use crate::storage::BrowserStorage;
use crate::surface::CanvasSurface;
use crate::tiles;

const CLICK_SLOP_PX: f64 = 5.0;
const MAP_BACKGROUND: &str = "#c8d6c0";

/// Overlay layers in draw order.
struct MapLayers {
    grid: GridOverlay,
    names: NamesLayer,
    reports: ReportsLayer,
    units: UnitsLayer,
}

impl MapLayers {
    fn new() -> Self {
        Self {
            grid: GridOverlay::new(),
            names: NamesLayer::new(),
            reports: ReportsLayer::new(),
            units: UnitsLayer::new(),
        }
    }

    fn render(&mut self, surface: &mut dyn OverlaySurface, frame: &FrameContext<'_>) -> usize {
        let MapLayers {
            grid,
            names,
            reports,
            units,
        } = self;
        let mut layers: [&mut dyn MapLayer; 4] = [grid, names, reports, units];
        render_layers(&mut layers, surface, frame)
    }
}

fn set_attached(layer: &mut dyn MapLayer, visible: bool) {
    match (visible, layer.attached()) {
        (true, false) => layer.attach(),
        (false, true) => layer.detach(),
        _ => {}
    }
}

struct ResizeBinding {
    window: web_sys::Window,
    handler: Closure<dyn Fn()>,
}

thread_local! {
    static RESIZE_BINDING: RefCell<Option<ResizeBinding>> = const { RefCell::new(None) };
}

fn unbind_resize() {
    RESIZE_BINDING.with(|slot| {
        if let Some(old) = slot.borrow_mut().take() {
            let _ = old
                .window
                .remove_event_listener_with_callback("resize", old.handler.as_ref().unchecked_ref());
        }
    });
}

fn context_2d(canvas: &HtmlCanvasElement) -> Option<CanvasRenderingContext2d> {
    canvas
        .get_context("2d")
        .ok()
        .flatten()
        .and_then(|ctx| ctx.dyn_into::<CanvasRenderingContext2d>().ok())
}

/// Pointer position relative to `canvas`.
fn local_point(canvas: Option<HtmlCanvasElement>, client_x: i32, client_y: i32) -> (f64, f64) {
    match canvas {
        Some(el) => {
            let rect = el.get_bounding_client_rect();
            (client_x as f64 - rect.left(), client_y as f64 - rect.top())
        }
        None => (client_x as f64, client_y as f64),
    }
}

fn prompt(message: &str, default: &str) -> Option<String> {
    web_sys::window()?
        .prompt_with_message_and_default(message, default)
        .ok()
        .flatten()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Base tile canvas plus the overlay canvas all map layers draw into.
#[component]
pub fn MapCanvas() -> impl IntoView {
    let MapConfigStore(config) = expect_context();
    let viewport: RwSignal<Viewport> = expect_context();
    let PlaceNames(names) = expect_context();
    let NamesFetchNonce(names_nonce) = expect_context();
    let telemetry: RwSignal<TelemetryState> = expect_context();
    let reports: RwSignal<ReportLog> = expect_context();
    let mission: RwSignal<MissionSettings> = expect_context();
    let EditLabels(edit_labels) = expect_context();
    let WaypointMode(waypoint_mode) = expect_context();
    let SelectedGroup(selected_group) = expect_context();
    let CursorReadout(cursor) = expect_context();
    let LayerVisibility(visibility) = expect_context();
    let TileStore(tile_store) = expect_context();

    let base_canvas_ref = NodeRef::<leptos::html::Canvas>::new();
    let overlay_canvas_ref = NodeRef::<leptos::html::Canvas>::new();

    let layers = Rc::new(RefCell::new(MapLayers::new()));
    // CSS size of the map at the last frame, for hit-testing
    let frame_size = Rc::new(Cell::new((0.0f64, 0.0f64)));
    let fitted = Rc::new(Cell::new(false));
    let tile_epoch: RwSignal<u64> = RwSignal::new(0);

    // Drag state
    let panning = Rc::new(Cell::new(false));
    let dragging_label = Rc::new(Cell::new(false));
    let drag_start = Rc::new(Cell::new((0.0f64, 0.0f64)));
    let last_pos = Rc::new(Cell::new((0.0f64, 0.0f64)));
    let selected_waypoint: Rc<Cell<Option<usize>>> = Rc::new(Cell::new(None));

    let layers_render = layers.clone();
    let frame_size_render = frame_size.clone();
    let fitted_render = fitted.clone();
    let scheduler = RenderScheduler::new(move || {
        let (Some(base_canvas), Some(overlay_canvas)) = (
            base_canvas_ref.get_untracked(),
            overlay_canvas_ref.get_untracked(),
        ) else {
            return;
        };
        let base_canvas: &HtmlCanvasElement = &base_canvas;
        let overlay_canvas: &HtmlCanvasElement = &overlay_canvas;

        let Some(parent) = base_canvas.parent_element() else {
            return;
        };
        let w = parent.client_width() as f64;
        let h = parent.client_height() as f64;
        if w <= 0.0 || h <= 0.0 {
            return;
        }
        let dpr = web_sys::window()
            .map(|win| win.device_pixel_ratio())
            .unwrap_or(1.0)
            .max(1.0);
        let pw = (w * dpr).round() as u32;
        let ph = (h * dpr).round() as u32;
        for canvas in [base_canvas, overlay_canvas] {
            if canvas.width() != pw || canvas.height() != ph {
                canvas.set_width(pw);
                canvas.set_height(ph);
            }
        }
        frame_size_render.set((w, h));

        if !fitted_render.get() {
            fitted_render.set(true);
            let (min_x, min_y, max_x, max_y) =
                config.with_untracked(|store| store.get().projection().raster_bounds());
            viewport.update(|vp| vp.fit_bounds(min_x, min_y, max_x, max_y, w, h));
            return;
        }

        let vp = viewport.get_untracked();
        let (image_w, image_h) = config.with_untracked(|store| {
            let cfg = store.get();
            (cfg.map_image_width, cfg.map_image_height)
        });

        if let Some(ctx) = context_2d(base_canvas) {
            ctx.set_transform(dpr, 0.0, 0.0, dpr, 0.0, 0.0).ok();
            ctx.set_fill_style_str(MAP_BACKGROUND);
            ctx.fill_rect(0.0, 0.0, w, h);
            tile_store.with_value(|cache| {
                tiles::draw_tiles(&ctx, &cache.borrow(), &vp, w, h, image_w, image_h);
            });
        }

        if let Some(ctx) = context_2d(overlay_canvas) {
            ctx.set_transform(dpr, 0.0, 0.0, dpr, 0.0, 0.0).ok();
            let mut surface = CanvasSurface::new(&ctx);
            surface.clear(w, h);
            config.with_untracked(|store| {
                let frame = FrameContext::new(store.get(), &vp, w, h);
                layers_render.borrow_mut().render(&mut surface, &frame);
            });
        }

        let on_loaded: Rc<dyn Fn()> = Rc::new(move || {
            tile_epoch.update(|n| *n = n.wrapping_add(1));
        });
        tile_store.with_value(|cache| {
            tiles::request_visible(cache, &vp, w, h, image_w, image_h, on_loaded);
        });
    });
    let scheduler = Rc::new(scheduler);

    // Viewport moves: zoom changes vs pans
    let sched_vp = scheduler.clone();
    Effect::new(move |prev_zoom: Option<i32>| {
        let zoom = viewport.with(|vp| vp.zoom);
        let event = match prev_zoom {
            Some(prev) if prev != zoom => ViewEvent::Zoom,
            _ => ViewEvent::Pan,
        };
        sched_vp.request(event);
        zoom
    });

    // Config apply: zoom limits follow maxZoom, the grid cache rekeys itself
    let sched_cfg = scheduler.clone();
    Effect::new(move || {
        let max_zoom = config.with(|store| store.get().max_zoom);
        if viewport.with_untracked(|vp| vp.max_zoom != max_zoom) {
            viewport.update(|vp| {
                vp.max_zoom = max_zoom.max(vp.min_zoom);
                vp.zoom = vp.zoom.min(vp.max_zoom);
            });
        }
        sched_cfg.request(ViewEvent::ConfigApplied);
    });

    let sched_names = scheduler.clone();
    let layers_names = layers.clone();
    Effect::new(move || {
        let fetched = names.get();
        layers_names.borrow_mut().names.set_names(fetched);
        sched_names.request(ViewEvent::DataChanged);
    });

    let sched_units = scheduler.clone();
    let layers_units = layers.clone();
    Effect::new(move || {
        let filter = mission.with(|m| m.display_filter().map(str::to_string));
        let markers = telemetry.with(|t| derive_markers(t.snapshot(), filter.as_deref()));
        layers_units.borrow_mut().units.set_markers(markers);
        sched_units.request(ViewEvent::DataChanged);
    });

    let sched_select = scheduler.clone();
    let layers_select = layers.clone();
    Effect::new(move || {
        let key = selected_group.get();
        layers_select.borrow_mut().units.select(key);
        sched_select.request(ViewEvent::DataChanged);
    });

    let sched_reports = scheduler.clone();
    let layers_reports = layers.clone();
    Effect::new(move || {
        let log = reports.get();
        layers_reports.borrow_mut().reports.set_log(log);
        sched_reports.request(ViewEvent::DataChanged);
    });

    let sched_visibility = scheduler.clone();
    let layers_visibility = layers.clone();
    Effect::new(move || {
        let visible = visibility.get();
        {
            let mut l = layers_visibility.borrow_mut();
            set_attached(&mut l.grid, visible.grid);
            set_attached(&mut l.names, visible.names);
            set_attached(&mut l.reports, visible.reports);
            set_attached(&mut l.units, visible.units);
        }
        sched_visibility.request(ViewEvent::ConfigApplied);
    });

    // Edit session: leaving edit mode flushes the collected label changes
    let sched_edit = scheduler.clone();
    let layers_edit = layers.clone();
    Effect::new(move || {
        let editing = edit_labels.get();
        let changes = {
            let mut l = layers_edit.borrow_mut();
            match (editing, l.names.is_editing()) {
                (true, false) => {
                    l.names.begin_edit();
                    Vec::new()
                }
                (false, true) => l.names.finish_edit(),
                _ => Vec::new(),
            }
        };
        if !changes.is_empty() {
            api::submit_label_changes(changes, names, names_nonce);
        }
        sched_edit.request(ViewEvent::DataChanged);
    });

    let sched_tiles = scheduler.clone();
    Effect::new(move || {
        tile_epoch.track();
        sched_tiles.request(ViewEvent::DataChanged);
    });

    let sched_resize = scheduler.clone();
    Effect::new(move || {
        let Some(window) = web_sys::window() else {
            return;
        };
        unbind_resize();
        let sched = sched_resize.clone();
        let handler = Closure::<dyn Fn()>::new(move || sched.request(ViewEvent::Resize));
        if window
            .add_event_listener_with_callback("resize", handler.as_ref().unchecked_ref())
            .is_ok()
        {
            RESIZE_BINDING.with(|slot| {
                *slot.borrow_mut() = Some(ResizeBinding {
                    window: window.clone(),
                    handler,
                });
            });
        }
        on_cleanup(unbind_resize);
    });

    // --- Input handlers ---

    let marker_at = {
        let layers = layers.clone();
        let frame_size = frame_size.clone();
        move |x: f64, y: f64| -> Option<UnitMarker> {
            let (w, h) = frame_size.get();
            let vp = viewport.get_untracked();
            config.with_untracked(|store| {
                let frame = FrameContext::new(store.get(), &vp, w, h);
                layers.borrow().units.hit_test(&frame, x, y).cloned()
            })
        }
    };

    let on_wheel = move |e: WheelEvent| {
        e.prevent_default();
        let (x, y) = local_point(base_canvas_ref.get_untracked(), e.client_x(), e.client_y());
        let levels = if e.delta_y() < 0.0 { 1 } else { -1 };
        let mut next = viewport.get_untracked();
        if next.zoom_at(levels, x, y) {
            viewport.set(next);
        }
    };

    let on_pointer_down = {
        let layers = layers.clone();
        let frame_size = frame_size.clone();
        let panning = panning.clone();
        let dragging_label = dragging_label.clone();
        let drag_start = drag_start.clone();
        let last_pos = last_pos.clone();
        move |e: PointerEvent| {
            if e.button() != 0 {
                return;
            }
            let client = (e.client_x() as f64, e.client_y() as f64);
            drag_start.set(client);
            last_pos.set(client);

            let (x, y) = local_point(base_canvas_ref.get_untracked(), e.client_x(), e.client_y());
            let grabbed = edit_labels.get_untracked() && {
                let (w, h) = frame_size.get();
                let vp = viewport.get_untracked();
                config.with_untracked(|store| {
                    let frame = FrameContext::new(store.get(), &vp, w, h);
                    layers.borrow_mut().names.start_drag(&frame, x, y)
                })
            };
            dragging_label.set(grabbed);
            panning.set(!grabbed);

            if let Some(target) = e.target()
                && let Ok(el) = target.dyn_into::<web_sys::HtmlElement>()
            {
                el.set_pointer_capture(e.pointer_id()).ok();
                el.style()
                    .set_property("cursor", if grabbed { "move" } else { "grabbing" })
                    .ok();
            }
        }
    };

    let on_pointer_move = {
        let layers = layers.clone();
        let frame_size = frame_size.clone();
        let panning = panning.clone();
        let dragging_label = dragging_label.clone();
        let last_pos = last_pos.clone();
        let scheduler = scheduler.clone();
        move |e: PointerEvent| {
            let (x, y) = local_point(base_canvas_ref.get_untracked(), e.client_x(), e.client_y());
            let (w, h) = frame_size.get();
            let vp = viewport.get_untracked();

            let position = config.with_untracked(|store| {
                let cfg = store.get();
                let frame = FrameContext::new(cfg, &vp, w, h);
                if dragging_label.get() {
                    layers.borrow_mut().names.drag_to(&frame, x, y);
                }
                let (gx, gy) = frame.screen_to_game(x, y);
                CursorPosition {
                    cell: cell_reference(gx, gy, cfg.hm_step),
                    x: gx.round() as i64,
                    y: gy.round() as i64,
                }
            });
            cursor.set(Some(position));

            if dragging_label.get() {
                scheduler.request(ViewEvent::DataChanged);
            } else if panning.get() {
                let (lx, ly) = last_pos.get();
                let client = (e.client_x() as f64, e.client_y() as f64);
                last_pos.set(client);
                viewport.update(|vp| vp.pan(client.0 - lx, client.1 - ly));
            }
        }
    };

    let on_pointer_up = {
        let layers = layers.clone();
        let panning = panning.clone();
        let dragging_label = dragging_label.clone();
        let scheduler = scheduler.clone();
        move |e: PointerEvent| {
            panning.set(false);
            if dragging_label.replace(false) {
                if let Some((x, y)) = layers.borrow_mut().names.end_drag() {
                    web_sys::console::info_1(
                        &format!("Label moved to X={} Y={}", x.round(), y.round()).into(),
                    );
                }
                scheduler.request(ViewEvent::DataChanged);
            }
            if let Some(target) = e.target()
                && let Ok(el) = target.dyn_into::<web_sys::HtmlElement>()
            {
                el.style().set_property("cursor", "grab").ok();
            }
        }
    };

    let on_pointer_leave = {
        let panning = panning.clone();
        move |_: PointerEvent| {
            panning.set(false);
            cursor.set(None);
        }
    };

    let on_click = {
        let drag_start = drag_start.clone();
        let selected_waypoint = selected_waypoint.clone();
        let marker_at = marker_at.clone();
        move |e: MouseEvent| {
            let (sx, sy) = drag_start.get();
            let dx = (e.client_x() as f64 - sx).abs();
            let dy = (e.client_y() as f64 - sy).abs();
            if dx >= CLICK_SLOP_PX || dy >= CLICK_SLOP_PX || edit_labels.get_untracked() {
                return;
            }
            let (x, y) = local_point(base_canvas_ref.get_untracked(), e.client_x(), e.client_y());
            match marker_at(x, y) {
                Some(marker) => {
                    selected_waypoint.set(match marker.kind {
                        MarkerKind::Waypoint { number } => Some(number),
                        _ => None,
                    });
                    if selected_group.get_untracked().as_ref() != Some(&marker.key) {
                        selected_group.set(Some(marker.key));
                    }
                }
                None if !waypoint_mode.get_untracked() => {
                    selected_waypoint.set(None);
                    if selected_group.get_untracked().is_some() {
                        selected_group.set(None);
                    }
                }
                None => {}
            }
        }
    };

    let on_double_click = {
        let layers = layers.clone();
        let frame_size = frame_size.clone();
        let selected_waypoint = selected_waypoint.clone();
        let scheduler = scheduler.clone();
        move |e: MouseEvent| {
            e.prevent_default();
            let (x, y) = local_point(base_canvas_ref.get_untracked(), e.client_x(), e.client_y());
            let (w, h) = frame_size.get();
            let vp = viewport.get_untracked();
            let (gx, gy) = config.with_untracked(|store| {
                FrameContext::new(store.get(), &vp, w, h).screen_to_game(x, y)
            });

            if edit_labels.get_untracked() {
                let Some(name) = prompt("Label name", "") else {
                    return;
                };
                let Some(kind) = prompt("Label type", "NameLocal") else {
                    return;
                };
                layers.borrow_mut().names.add_label(&name, &kind, gx, gy);
                scheduler.request(ViewEvent::DataChanged);
            } else if waypoint_mode.get_untracked() {
                let Some(key) = selected_group.get_untracked() else {
                    web_sys::console::warn_1(&"Select a group before placing waypoints".into());
                    return;
                };
                let params = WaypointParams::load(&BrowserStorage::open());
                let envelope = match selected_waypoint.take() {
                    Some(number) => edit_waypoint(&key.side, &key.group, number, &params, gx, gy),
                    None => add_waypoint(&key.side, &key.group, &params, gx, gy),
                };
                api::dispatch_command(envelope);
            } else {
                let mut next = vp;
                if next.zoom_at(1, x, y) {
                    viewport.set(next);
                }
            }
        }
    };

    let on_context_menu = move |e: MouseEvent| {
        if !waypoint_mode.get_untracked() {
            return;
        }
        let (x, y) = local_point(base_canvas_ref.get_untracked(), e.client_x(), e.client_y());
        let Some(marker) = marker_at(x, y) else {
            return;
        };
        if let MarkerKind::Waypoint { number } = marker.kind {
            e.prevent_default();
            selected_waypoint.set(None);
            api::dispatch_command(delete_waypoint(&marker.key.side, &marker.key.group, number));
        }
    };

    view! {
        <div
            style="position: relative; width: 100%; height: 100%; overflow: hidden;"
            on:wheel=on_wheel
            on:pointerdown=on_pointer_down
            on:pointermove=on_pointer_move
            on:pointerup=on_pointer_up
            on:pointerleave=on_pointer_leave
            on:click=on_click
            on:dblclick=on_double_click
            on:contextmenu=on_context_menu
        >
            <canvas
                node_ref=base_canvas_ref
                style="position: absolute; inset: 0; width: 100%; height: 100%; touch-action: none; image-rendering: pixelated; cursor: grab;"
            />
            <canvas
                node_ref=overlay_canvas_ref
                style="position: absolute; inset: 0; width: 100%; height: 100%; pointer-events: none;"
            />
        </div>
    }
}
