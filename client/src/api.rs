use leptos::prelude::*;
use serde::Serialize;
use serde::de::DeserializeOwned;
use wasm_bindgen_futures::spawn_local;

use tactical_shared::commands::{CommandEnvelope, CommandResponse, UpdateInterval};
use tactical_shared::names::{LabelChange, LabelUpdate, NameEntity, NewLabel, parse_names};
use tactical_shared::snapshot::{AreaQuery, Building, SnapshotUpload};

async fn post_json<B: Serialize, R: DeserializeOwned>(url: &str, body: &B) -> Result<R, String> {
    let resp = gloo_net::http::Request::post(url)
        .json(body)
        .map_err(|e| format!("encode error: {e}"))?
        .send()
        .await
        .map_err(|e| format!("fetch error: {e}"))?;

    if !resp.ok() {
        // Proxy errors still carry a `{status, message}` body
        let detail = resp
            .json::<CommandResponse>()
            .await
            .ok()
            .and_then(|r| r.message)
            .unwrap_or_default();
        return Err(format!("HTTP {} {detail}", resp.status()).trim_end().to_string());
    }

    resp.json::<R>()
        .await
        .map_err(|e| format!("parse error: {e}"))
}

async fn post_command<B: Serialize>(url: &str, body: &B) -> Result<CommandResponse, String> {
    let response: CommandResponse = post_json(url, body).await?;
    if response.is_success() {
        Ok(response)
    } else {
        Err(response
            .message
            .unwrap_or_else(|| format!("status {}", response.status)))
    }
}

/// Fetch all place names.
pub async fn fetch_names() -> Result<Vec<NameEntity>, String> {
    let resp = gloo_net::http::Request::get("/names")
        .send()
        .await
        .map_err(|e| format!("fetch error: {e}"))?;

    if !resp.ok() {
        return Err(format!("HTTP {}", resp.status()));
    }

    let body = resp.text().await.map_err(|e| format!("read error: {e}"))?;
    let (names, dropped) = parse_names(&body).map_err(|e| format!("parse error: {e}"))?;
    if dropped > 0 {
        web_sys::console::warn_1(&format!("Skipped {dropped} malformed name entries").into());
    }
    Ok(names)
}

/// Fetch names and publish them, ignoring responses superseded by a newer request.
pub fn refresh_names(names: RwSignal<Vec<NameEntity>>, fetch_nonce: RwSignal<u64>) {
    let request_nonce = fetch_nonce.get_untracked().wrapping_add(1);
    fetch_nonce.set(request_nonce);

    spawn_local(async move {
        match fetch_names().await {
            Ok(fetched) => {
                if fetch_nonce.get_untracked() != request_nonce {
                    return;
                }
                web_sys::console::info_1(&format!("Loaded {} place names", fetched.len()).into());
                names.set(fetched);
            }
            Err(e) => {
                web_sys::console::warn_1(&format!("Name fetch failed: {e}").into());
            }
        }
    });
}

pub async fn send_command(envelope: &CommandEnvelope) -> Result<CommandResponse, String> {
    post_command("/send_callback", envelope).await
}

/// Fire-and-forget command with logged outcome.
pub fn dispatch_command(envelope: CommandEnvelope) {
    spawn_local(async move {
        match send_command(&envelope).await {
            Ok(_) => web_sys::console::info_1(
                &format!("Command {} sent to {}", envelope.command, envelope.side).into(),
            ),
            Err(e) => web_sys::console::warn_1(
                &format!("Command {} failed: {e}", envelope.command).into(),
            ),
        }
    });
}

pub async fn set_update_interval(interval: UpdateInterval) -> Result<CommandResponse, String> {
    post_command("/set_update_interval", &interval).await
}

pub async fn update_label(update: &LabelUpdate) -> Result<CommandResponse, String> {
    post_command("/update_label", update).await
}

pub async fn add_label(label: &NewLabel) -> Result<CommandResponse, String> {
    post_command("/add_label", label).await
}

/// Send the edits of a finished label session in order, then refetch names
/// so server-assigned ids and positions replace local state.
pub fn submit_label_changes(
    changes: Vec<LabelChange>,
    names: RwSignal<Vec<NameEntity>>,
    fetch_nonce: RwSignal<u64>,
) {
    spawn_local(async move {
        let total = changes.len();
        let mut failed = 0;
        for change in &changes {
            let result = match change {
                LabelChange::Update(update) => update_label(update).await,
                LabelChange::Add(label) => add_label(label).await,
            };
            if let Err(e) = result {
                failed += 1;
                web_sys::console::warn_1(&format!("Label change {change:?} failed: {e}").into());
            }
        }
        web_sys::console::info_1(
            &format!("Saved {} of {total} label changes", total - failed).into(),
        );
        refresh_names(names, fetch_nonce);
    });
}

pub async fn save_snapshot(upload: &SnapshotUpload) -> Result<CommandResponse, String> {
    post_command("/save_snapshot", upload).await
}

pub async fn fetch_buildings(area: &AreaQuery) -> Result<Vec<Building>, String> {
    post_json("/get_buildings", area).await
}

pub async fn fetch_names_in_area(area: &AreaQuery) -> Result<Vec<NameEntity>, String> {
    post_json("/get_names_in_area", area).await
}
