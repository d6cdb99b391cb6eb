use std::cell::RefCell;
use std::rc::Rc;

use gloo_timers::callback::Interval;
use leptos::prelude::*;
use wasm_bindgen_futures::spawn_local;

use tactical_shared::commands::{AiCommand, UpdateInterval, WaypointParams};
use tactical_shared::mission::MissionSettings;
use tactical_shared::names::NameEntity;
use tactical_shared::reports::ReportLog;
use tactical_shared::snapshot::CaptureRequest;
use tactical_shared::telemetry::{GroupKey, TelemetryState};
use tactical_shared::{ConfigStore, LoadOutcome, MapConfig, Viewport};

use crate::api;
use crate::canvas::MapCanvas;
use crate::snapshot;
use crate::sse::{self, ConnectionStatus};
use crate::storage::BrowserStorage;
use crate::tiles::{SharedTileCache, TileCache};

const REPORT_PRUNE_MS: u32 = 5_000;

const PANEL_STYLE: &str = "background: rgba(19,22,31,0.92); border: 1px solid #282c3e; border-radius: 6px; padding: 8px 10px; color: #e2e0d8; font-family: 'Inter', system-ui, sans-serif; font-size: 0.78rem; display: flex; flex-direction: column; gap: 6px; min-width: 220px;";
const TITLE_STYLE: &str = "font-size: 0.7rem; letter-spacing: 0.06em; text-transform: uppercase; color: #9a9590;";
const ROW_STYLE: &str = "display: flex; align-items: center; justify-content: space-between; gap: 8px;";
const INPUT_STYLE: &str = "width: 84px; background: #1a1d2a; border: 1px solid #282c3e; border-radius: 4px; color: #e2e0d8; font-family: 'JetBrains Mono', monospace; font-size: 0.7rem; padding: 3px 5px; outline: none;";
const BUTTON_STYLE: &str = "background: #1a1d2a; border: 1px solid #282c3e; border-radius: 4px; color: #e2e0d8; font-size: 0.72rem; padding: 4px 8px; cursor: pointer;";

const SIDES: &[&str] = &["ALL", "BLUFOR", "OPFOR", "INDEPENDENT"];
const AI_SIDES: &[&str] = &["BLUFOR", "OPFOR", "INDEPENDENT"];
const WAYPOINT_TYPES: &[&str] = &[
    "MOVE", "DESTROY", "GETIN", "SAD", "JOIN", "LEADER", "GETOUT", "CYCLE", "LOAD", "UNLOAD",
    "TR UNLOAD", "HOLD", "SENTRY", "GUARD", "TALK", "SCRIPTED", "SUPPORT", "GETIN NEAREST",
    "DISMISS", "LOITER",
];
const BEHAVIOURS: &[&str] = &["CARELESS", "SAFE", "AWARE", "COMBAT", "STEALTH"];
const COMBAT_MODES: &[&str] = &["BLUE", "GREEN", "YELLOW", "RED"];
const SPEEDS: &[&str] = &["LIMITED", "NORMAL", "FULL"];
const WAYPOINT_FORMATIONS: &[&str] = &["COLUMN", "WEDGE", "LINE", "DIAMOND"];
const FORMATIONS: &[&str] = &[
    "COLUMN", "STAG COLUMN", "WEDGE", "ECH LEFT", "ECH RIGHT", "VEE", "LINE", "FILE", "DIAMOND",
];
const AI_COMMANDS: &[(&str, &str, &[&str])] = &[
    ("set_behaviour", "Behaviour", BEHAVIOURS),
    ("set_combat_mode", "Combat mode", COMBAT_MODES),
    ("set_formation", "Formation", FORMATIONS),
    ("set_speed_mode", "Speed", SPEEDS),
    ("enable_attack", "Open fire", &["true", "false"]),
];

thread_local! {
    static PRUNE_INTERVAL: RefCell<Option<Interval>> = const { RefCell::new(None) };
}

#[derive(Clone, Copy)]
pub(crate) struct MapConfigStore(pub RwSignal<ConfigStore>);
#[derive(Clone, Copy)]
pub(crate) struct PlaceNames(pub RwSignal<Vec<NameEntity>>);
#[derive(Clone, Copy)]
pub(crate) struct NamesFetchNonce(pub RwSignal<u64>);
#[derive(Clone, Copy)]
pub(crate) struct EditLabels(pub RwSignal<bool>);
#[derive(Clone, Copy)]
pub(crate) struct WaypointMode(pub RwSignal<bool>);
#[derive(Clone, Copy)]
pub(crate) struct SelectedGroup(pub RwSignal<Option<GroupKey>>);
#[derive(Clone, Copy)]
pub(crate) struct CursorReadout(pub RwSignal<Option<CursorPosition>>);
#[derive(Clone, Copy)]
pub(crate) struct LayerVisibility(pub RwSignal<VisibleLayers>);
#[derive(Clone, Copy)]
pub(crate) struct TileStore(pub StoredValue<SharedTileCache, LocalStorage>);

/// Pointer position under the cursor: cell reference and rounded meters.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct CursorPosition {
    pub cell: String,
    pub x: i64,
    pub y: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct VisibleLayers {
    pub grid: bool,
    pub names: bool,
    pub units: bool,
    pub reports: bool,
}

impl Default for VisibleLayers {
    fn default() -> Self {
        Self {
            grid: true,
            names: true,
            units: true,
            reports: true,
        }
    }
}

fn load_config() -> ConfigStore {
    let (store, outcome) = ConfigStore::load(&BrowserStorage::open());
    match outcome {
        LoadOutcome::Defaults => {
            web_sys::console::info_1(&"No stored map settings; using defaults".into());
        }
        LoadOutcome::Restored { backfilled } if backfilled.is_empty() => {
            web_sys::console::info_1(&"Map settings restored".into());
        }
        LoadOutcome::Restored { backfilled } => {
            web_sys::console::info_1(
                &format!("Map settings restored; filled in {}", backfilled.join(", ")).into(),
            );
        }
        LoadOutcome::Recovered { reason } => {
            web_sys::console::warn_1(
                &format!("Stored map settings unusable ({reason}); using defaults").into(),
            );
        }
    }
    store
}

/// Apply an edit to the active configuration. Changes show immediately and
/// are persisted only by `save_config`.
fn update_config(config: RwSignal<ConfigStore>, edit: impl FnOnce(&mut MapConfig)) {
    let mut next = config.with_untracked(|store| store.clone());
    match next.update(edit) {
        Ok(revision) => {
            config.set(next);
            web_sys::console::info_1(&format!("Map settings applied (revision {revision})").into());
        }
        Err(e) => web_sys::console::warn_1(&format!("Rejected map settings: {e}").into()),
    }
}

fn save_config(config: RwSignal<ConfigStore>) {
    let result = config.with_untracked(|store| store.save(&mut BrowserStorage::open()));
    match result {
        Ok(()) => web_sys::console::info_1(&"Map settings saved".into()),
        Err(e) => web_sys::console::warn_1(&format!("Saving map settings failed: {e}").into()),
    }
}

fn option_list(
    options: &'static [&'static str],
    current: impl Fn() -> String + Clone + Send + Sync + 'static,
) -> impl IntoView {
    options
        .iter()
        .map(|&opt| {
            let current = current.clone();
            view! { <option value=opt selected=move || current() == opt>{opt}</option> }
        })
        .collect_view()
}

fn toggle_row(
    label: &'static str,
    checked: impl Fn() -> bool + Send + Sync + 'static,
    on_change: impl Fn(bool) + 'static,
) -> impl IntoView {
    view! {
        <label style=ROW_STYLE>
            <span>{label}</span>
            <input
                type="checkbox"
                prop:checked=checked
                on:change=move |e| on_change(event_target_checked(&e))
            />
        </label>
    }
}

#[component]
pub fn App() -> impl IntoView {
    let config: RwSignal<ConfigStore> = RwSignal::new(load_config());
    let viewport: RwSignal<Viewport> = RwSignal::new(
        config.with_untracked(|store| Viewport::new(3, store.get().max_zoom)),
    );
    let names: RwSignal<Vec<NameEntity>> = RwSignal::new(Vec::new());
    let names_nonce: RwSignal<u64> = RwSignal::new(0);
    let telemetry: RwSignal<TelemetryState> = RwSignal::new(TelemetryState::default());
    let reports: RwSignal<ReportLog> = RwSignal::new(ReportLog::default());
    let mission: RwSignal<MissionSettings> =
        RwSignal::new(MissionSettings::load(&BrowserStorage::open()));
    let connection: RwSignal<ConnectionStatus> = RwSignal::new(ConnectionStatus::Connecting);
    let edit_labels: RwSignal<bool> = RwSignal::new(false);
    let waypoint_mode: RwSignal<bool> = RwSignal::new(false);
    let selected_group: RwSignal<Option<GroupKey>> = RwSignal::new(None);
    let cursor: RwSignal<Option<CursorPosition>> = RwSignal::new(None);
    let visibility: RwSignal<VisibleLayers> = RwSignal::new(VisibleLayers::default());
    let tile_cache: SharedTileCache = Rc::new(RefCell::new(TileCache::default()));
    let tile_store = StoredValue::new_local(tile_cache);

    provide_context(MapConfigStore(config));
    provide_context(viewport);
    provide_context(PlaceNames(names));
    provide_context(NamesFetchNonce(names_nonce));
    provide_context(telemetry);
    provide_context(reports);
    provide_context(mission);
    provide_context(connection);
    provide_context(EditLabels(edit_labels));
    provide_context(WaypointMode(waypoint_mode));
    provide_context(SelectedGroup(selected_group));
    provide_context(CursorReadout(cursor));
    provide_context(LayerVisibility(visibility));
    provide_context(TileStore(tile_store));

    // Names on mount
    Effect::new(move || {
        api::refresh_names(names, names_nonce);
    });

    // Unseen place-name types get a default style
    Effect::new(move || {
        let mut kinds: Vec<String> = names.with(|list| list.iter().map(|n| n.kind.clone()).collect());
        kinds.sort();
        kinds.dedup();
        let unseen = config.with_untracked(|store| kinds.iter().any(|k| store.name_style(k).is_none()));
        if !unseen {
            return;
        }
        let mut storage = BrowserStorage::open();
        config.update(|store| {
            let result = store.register_name_types(kinds.iter().map(String::as_str), &mut storage);
            store.apply();
            match result {
                Ok(inserted) => web_sys::console::info_1(
                    &format!("Registered {inserted} new place-name types").into(),
                ),
                Err(e) => web_sys::console::warn_1(
                    &format!("Saving new place-name types failed: {e}").into(),
                ),
            }
        });
    });

    // Persist mission settings on any change
    Effect::new(move || {
        let settings = mission.get();
        if let Err(e) = settings.save(&mut BrowserStorage::open()) {
            web_sys::console::warn_1(&format!("Saving mission settings failed: {e}").into());
        }
    });

    // Modes are exclusive
    Effect::new(move || {
        if edit_labels.get() && waypoint_mode.get_untracked() {
            waypoint_mode.set(false);
        }
    });
    Effect::new(move || {
        if waypoint_mode.get() && edit_labels.get_untracked() {
            edit_labels.set(false);
        }
    });

    // Connect to SSE on mount
    Effect::new(move || {
        sse::connect(telemetry, reports, connection);
        on_cleanup(|| {
            sse::disconnect();
        });
    });

    // Expire old reports
    Effect::new(move || {
        let interval = Interval::new(REPORT_PRUNE_MS, move || {
            let now = chrono::Utc::now();
            let stale = reports.with_untracked(|log| {
                log.entries().iter().any(|entry| entry.expires_at() <= now)
            });
            if stale {
                reports.update(|log| {
                    log.prune(now);
                });
            }
        });
        PRUNE_INTERVAL.with(|slot| {
            // Dropping the old handle cancels it
            *slot.borrow_mut() = Some(interval);
        });
        on_cleanup(|| PRUNE_INTERVAL.with(|slot| drop(slot.borrow_mut().take())));
    });

    view! {
        <div style="position: fixed; inset: 0; background: #0f1118;">
            <MapCanvas />
            <div style="position: absolute; top: 12px; left: 12px; z-index: 10; display: flex; flex-direction: column; gap: 8px; max-height: calc(100% - 24px); overflow-y: auto;">
                <MapControls />
                {move || waypoint_mode.get().then(|| view! { <WaypointPanel /> })}
                <MissionPanel />
                <GridSettingsPanel />
                <SnapshotPanel />
            </div>
            <CoordinateReadout />
        </div>
    }
}

#[component]
fn MapControls() -> impl IntoView {
    let MapConfigStore(config) = expect_context();
    let EditLabels(edit_labels) = expect_context();
    let WaypointMode(waypoint_mode) = expect_context();
    let SelectedGroup(selected_group) = expect_context();
    let LayerVisibility(visibility) = expect_context();
    let connection: RwSignal<ConnectionStatus> = expect_context();
    let reports: RwSignal<ReportLog> = expect_context();

    let status = move || match connection.get() {
        ConnectionStatus::Connecting => ("Connecting", "#f5c542"),
        ConnectionStatus::Live => ("Live", "#4caf50"),
        ConnectionStatus::Reconnecting => ("Reconnecting", "#e53935"),
    };

    view! {
        <div style=PANEL_STYLE>
            <div style=ROW_STYLE>
                <span style=TITLE_STYLE>"Map"</span>
                <span style=move || format!("font-size: 0.7rem; color: {};", status().1)>
                    {move || status().0}
                </span>
            </div>
            {toggle_row("Grid", move || visibility.get().grid, move |v| visibility.update(|l| l.grid = v))}
            {toggle_row("Place names", move || visibility.get().names, move |v| visibility.update(|l| l.names = v))}
            {toggle_row("Units", move || visibility.get().units, move |v| visibility.update(|l| l.units = v))}
            {toggle_row("Reports", move || visibility.get().reports, move |v| visibility.update(|l| l.reports = v))}
            {toggle_row(
                "Cell numbers",
                move || config.with(|store| store.get().cell_coord_style.show),
                move |v| update_config(config, |cfg| cfg.cell_coord_style.show = v),
            )}
            {toggle_row("Edit labels", move || edit_labels.get(), move |v| edit_labels.set(v))}
            {toggle_row("Waypoint mode", move || waypoint_mode.get(), move |v| waypoint_mode.set(v))}
            <div style="font-size: 0.7rem; color: #9a9590;">
                {move || match selected_group.get() {
                    Some(key) => format!("Selected: {} / {}", key.side, key.group),
                    None => "No group selected".to_string(),
                }}
            </div>
            <div style="font-size: 0.7rem; color: #9a9590;">
                {move || format!("Active reports: {}", reports.with(ReportLog::len))}
            </div>
        </div>
    }
}

#[component]
fn WaypointPanel() -> impl IntoView {
    let params: RwSignal<WaypointParams> = RwSignal::new(WaypointParams::load(&BrowserStorage::open()));

    Effect::new(move || {
        let current = params.get();
        if let Err(e) = current.save(&mut BrowserStorage::open()) {
            web_sys::console::warn_1(&format!("Saving waypoint values failed: {e}").into());
        }
    });

    let field = move |label: &'static str,
                      options: &'static [&'static str],
                      get: fn(&WaypointParams) -> &String,
                      set: fn(&mut WaypointParams, String)| {
        view! {
            <label style=ROW_STYLE>
                <span>{label}</span>
                <select
                    style=INPUT_STYLE
                    on:change=move |e| {
                        let value = event_target_value(&e);
                        params.update(|p| set(p, value));
                    }
                >
                    <option value="" selected=move || params.with(|p| get(p).is_empty())>"-"</option>
                    {option_list(options, move || params.with(|p| get(p).clone()))}
                </select>
            </label>
        }
    };

    view! {
        <div style=PANEL_STYLE>
            <span style=TITLE_STYLE>"Waypoint"</span>
            <span style="font-size: 0.68rem; color: #9a9590;">
                "Click a marker to select its group; double-click the map to place. Right-click a waypoint to delete it."
            </span>
            <label style=ROW_STYLE>
                <span>"Type"</span>
                <select
                    style=INPUT_STYLE
                    on:change=move |e| {
                        let value = event_target_value(&e);
                        params.update(|p| p.kind = value);
                    }
                >
                    {option_list(WAYPOINT_TYPES, move || params.with(|p| p.kind.clone()))}
                </select>
            </label>
            {field("Behaviour", BEHAVIOURS, |p| &p.behaviour, |p, v| p.behaviour = v)}
            {field("Combat mode", COMBAT_MODES, |p| &p.combat_mode, |p, v| p.combat_mode = v)}
            {field("Speed", SPEEDS, |p| &p.speed, |p, v| p.speed = v)}
            {field("Formation", WAYPOINT_FORMATIONS, |p| &p.formation, |p, v| p.formation = v)}
        </div>
    }
}

#[component]
fn MissionPanel() -> impl IntoView {
    let mission: RwSignal<MissionSettings> = expect_context();
    let SelectedGroup(selected_group) = expect_context();
    let form_dir: RwSignal<u16> = RwSignal::new(0);

    let on_interval = move |e: leptos::ev::Event| {
        let Ok(seconds) = event_target_value(&e).trim().parse::<u32>() else {
            return;
        };
        let interval = UpdateInterval::clamped(seconds);
        mission.update(|m| m.update_interval = interval.interval);
        spawn_local(async move {
            match api::set_update_interval(interval).await {
                Ok(_) => web_sys::console::info_1(
                    &format!("Update interval set to {}s", interval.interval).into(),
                ),
                Err(e) => {
                    web_sys::console::warn_1(&format!("Setting update interval failed: {e}").into())
                }
            }
        });
    };

    // Preset wins; otherwise the group selected on the map
    let send = move |command: AiCommand| {
        let target = mission.with_untracked(|m| {
            m.preset_target()
                .map(|(side, group)| (side.to_string(), group.map(str::to_string)))
        });
        let target = target.or_else(|| {
            selected_group
                .get_untracked()
                .map(|key| (key.side, Some(key.group)))
        });
        let Some((side, group)) = target else {
            web_sys::console::warn_1(&"Choose a preset or select a group first".into());
            return;
        };
        api::dispatch_command(command.envelope(&side, group.as_deref()));
    };

    let command_rows = AI_COMMANDS
        .iter()
        .map(|&(name, label, options)| {
            let choice: RwSignal<String> = RwSignal::new(options[0].to_string());
            view! {
                <div style=ROW_STYLE>
                    <span>{label}</span>
                    <select
                        style=INPUT_STYLE
                        on:change=move |e| choice.set(event_target_value(&e))
                    >
                        {option_list(options, move || choice.get())}
                    </select>
                    <button
                        style=BUTTON_STYLE
                        on:click=move |_| {
                            match AiCommand::from_parts(name, &choice.get_untracked()) {
                                Some(command) => send(command),
                                None => web_sys::console::warn_1(
                                    &format!("Invalid value for {name}").into(),
                                ),
                            }
                        }
                    >
                        "Send"
                    </button>
                </div>
            }
        })
        .collect_view();

    view! {
        <div style=PANEL_STYLE>
            <span style=TITLE_STYLE>"Mission"</span>
            <label style=ROW_STYLE>
                <span>"Update interval (s)"</span>
                <input
                    type="number"
                    min="1"
                    max="60"
                    style=INPUT_STYLE
                    prop:value=move || mission.with(|m| m.update_interval.to_string())
                    on:change=on_interval
                />
            </label>
            <label style=ROW_STYLE>
                <span>"Show side"</span>
                <select
                    style=INPUT_STYLE
                    on:change=move |e| {
                        let value = event_target_value(&e);
                        mission.update(|m| {
                            m.display_side = if value == "ALL" { String::new() } else { value }
                        });
                    }
                >
                    {option_list(SIDES, move || {
                        mission.with(|m| m.display_filter().unwrap_or("ALL").to_string())
                    })}
                </select>
            </label>
            <label style=ROW_STYLE>
                <span>"Preset"</span>
                <input
                    type="text"
                    placeholder="SIDE or SIDE:group"
                    style=INPUT_STYLE
                    prop:value=move || mission.with(|m| m.preset.clone())
                    on:change=move |e| {
                        let value = event_target_value(&e);
                        mission.update(|m| m.preset = value.trim().to_string());
                    }
                />
            </label>
            <label style=ROW_STYLE>
                <span>"AI side"</span>
                <select
                    style=INPUT_STYLE
                    on:change=move |e| {
                        let value = event_target_value(&e);
                        mission.update(|m| m.llm_side = value);
                    }
                >
                    {option_list(AI_SIDES, move || mission.with(|m| m.llm_side.clone()))}
                </select>
            </label>
            {command_rows}
            <div style=ROW_STYLE>
                <span>"Direction"</span>
                <input
                    type="number"
                    min="0"
                    max="359"
                    style=INPUT_STYLE
                    prop:value=move || form_dir.get().to_string()
                    on:change=move |e| {
                        if let Ok(deg) = event_target_value(&e).trim().parse::<u16>() {
                            form_dir.set(deg % 360);
                        }
                    }
                />
                <button
                    style=BUTTON_STYLE
                    on:click=move |_| send(AiCommand::SetFormDir(form_dir.get_untracked()))
                >
                    "Send"
                </button>
            </div>
        </div>
    }
}

#[component]
fn GridSettingsPanel() -> impl IntoView {
    let MapConfigStore(config) = expect_context();
    let current = config.with_untracked(|store| store.get().clone());
    let km_step: RwSignal<String> = RwSignal::new(current.km_step.to_string());
    let hm_step: RwSignal<String> = RwSignal::new(current.hm_step.to_string());
    let threshold: RwSignal<String> = RwSignal::new(current.zoom_threshold.to_string());
    let island: RwSignal<String> = RwSignal::new(current.island_width.to_string());

    let number_input = move |label: &'static str, value: RwSignal<String>| {
        view! {
            <label style=ROW_STYLE>
                <span>{label}</span>
                <input
                    type="number"
                    style=INPUT_STYLE
                    prop:value=move || value.get()
                    on:input=move |e| value.set(event_target_value(&e))
                />
            </label>
        }
    };

    let on_apply = move |_: leptos::ev::MouseEvent| {
        let parse = |value: RwSignal<String>| value.get_untracked().trim().parse::<f64>().ok();
        let (Some(km), Some(hm), Some(zoom), Some(size)) =
            (parse(km_step), parse(hm_step), parse(threshold), parse(island))
        else {
            web_sys::console::warn_1(&"Grid settings must be numbers".into());
            return;
        };
        update_config(config, |cfg| {
            cfg.km_step = km;
            cfg.hm_step = hm;
            cfg.zoom_threshold = zoom.round() as i32;
            cfg.island_width = size;
            cfg.island_height = size;
        });
    };

    view! {
        <div style=PANEL_STYLE>
            <span style=TITLE_STYLE>"Map settings"</span>
            {number_input("Coarse step (m)", km_step)}
            {number_input("Fine step (m)", hm_step)}
            {number_input("Fine from zoom", threshold)}
            {number_input("Island size (m)", island)}
            <div style=ROW_STYLE>
                <button style=BUTTON_STYLE on:click=on_apply>"Apply"</button>
                <button style=BUTTON_STYLE on:click=move |_| save_config(config)>"Save"</button>
            </div>
        </div>
    }
}

#[component]
fn SnapshotPanel() -> impl IntoView {
    let MapConfigStore(config) = expect_context();
    let TileStore(tile_store) = expect_context();
    let cell_x: RwSignal<String> = RwSignal::new("0".to_string());
    let cell_y: RwSignal<String> = RwSignal::new("0".to_string());
    let radius: RwSignal<String> = RwSignal::new("3".to_string());
    let with_numbers: RwSignal<bool> = RwSignal::new(true);
    let busy: RwSignal<bool> = RwSignal::new(false);
    let last_result: RwSignal<Option<String>> = RwSignal::new(None);

    let text_input = move |label: &'static str, value: RwSignal<String>| {
        view! {
            <label style=ROW_STYLE>
                <span>{label}</span>
                <input
                    type="number"
                    style=INPUT_STYLE
                    prop:value=move || value.get()
                    on:input=move |e| value.set(event_target_value(&e))
                />
            </label>
        }
    };

    let on_capture = move |_: leptos::ev::MouseEvent| {
        if busy.get_untracked() {
            return;
        }
        let parsed = (
            cell_x.get_untracked().trim().parse::<i64>(),
            cell_y.get_untracked().trim().parse::<i64>(),
            radius.get_untracked().trim().parse::<u32>(),
        );
        let (Ok(cx), Ok(cy), Ok(m)) = parsed else {
            last_result.set(Some("Cell and radius must be whole numbers".to_string()));
            return;
        };
        let request = CaptureRequest {
            cell_x: cx,
            cell_y: cy,
            radius: m,
            with_cell_numbers: with_numbers.get_untracked(),
        };
        let map_config = config.with_untracked(|store| store.get().clone());
        let cache = tile_store.get_value();
        busy.set(true);
        spawn_local(async move {
            let message = match snapshot::capture(request, map_config, cache).await {
                Ok(filename) => format!("Saved {filename}"),
                Err(e) => {
                    web_sys::console::warn_1(&format!("Snapshot failed: {e}").into());
                    format!("Failed: {e}")
                }
            };
            last_result.set(Some(message));
            busy.set(false);
        });
    };

    view! {
        <div style=PANEL_STYLE>
            <span style=TITLE_STYLE>"Snapshot"</span>
            {text_input("Cell X", cell_x)}
            {text_input("Cell Y", cell_y)}
            {text_input("Radius (cells)", radius)}
            {toggle_row("Cell numbers", move || with_numbers.get(), move |v| with_numbers.set(v))}
            <button style=BUTTON_STYLE on:click=on_capture prop:disabled=move || busy.get()>
                {move || if busy.get() { "Capturing..." } else { "Capture" }}
            </button>
            {move || last_result.get().map(|msg| view! {
                <span style="font-size: 0.68rem; color: #9a9590;">{msg}</span>
            })}
        </div>
    }
}

#[component]
fn CoordinateReadout() -> impl IntoView {
    let CursorReadout(cursor) = expect_context();

    view! {
        <div style="position: absolute; left: 12px; bottom: 12px; z-index: 10; background: rgba(19,22,31,0.92); border: 1px solid #282c3e; border-radius: 4px; padding: 4px 8px; color: #e2e0d8; font-family: 'JetBrains Mono', monospace; font-size: 0.72rem; font-variant-numeric: tabular-nums; pointer-events: none;">
            {move || match cursor.get() {
                Some(pos) => format!("{}   X={} Y={}", pos.cell, pos.x, pos.y),
                None => "--- ---".to_string(),
            }}
        </div>
    }
}
