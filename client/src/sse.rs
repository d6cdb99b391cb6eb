use std::cell::RefCell;
use std::rc::Rc;

use gloo_timers::callback::Timeout;
use leptos::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;
use web_sys::{EventSource, MessageEvent};

use tactical_shared::reports::{Report, ReportKind, ReportLog};
use tactical_shared::telemetry::{StreamMessage, TelemetryState};

const RECONNECT_BASE_MS: u32 = 500;
const RECONNECT_MAX_MS: u32 = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Connecting,
    Live,
    Reconnecting,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stream {
    Telemetry,
    Reports,
}

impl Stream {
    fn url(self) -> &'static str {
        match self {
            Stream::Telemetry => "/arma_data_stream",
            Stream::Reports => "/reports_stream",
        }
    }
}

type MessageHandler = Rc<dyn Fn(String)>;

struct SseConnection {
    es: EventSource,
    on_open: Closure<dyn Fn()>,
    on_error: Closure<dyn Fn()>,
    on_message: Closure<dyn Fn(MessageEvent)>,
}

impl SseConnection {
    fn close(self) {
        let _ = self.on_open.as_ref();
        let _ = self.on_error.as_ref();
        let _ = self.on_message.as_ref();
        self.es.set_onopen(None);
        self.es.set_onerror(None);
        self.es.set_onmessage(None);
        self.es.close();
    }
}

#[derive(Default)]
struct StreamSlot {
    connection: Option<SseConnection>,
    consecutive_failures: u32,
    retry: Option<Timeout>,
}

thread_local! {
    static TELEMETRY_SLOT: RefCell<StreamSlot> = RefCell::new(StreamSlot::default());
    static REPORTS_SLOT: RefCell<StreamSlot> = RefCell::new(StreamSlot::default());
}

fn with_slot<R>(stream: Stream, f: impl FnOnce(&mut StreamSlot) -> R) -> R {
    match stream {
        Stream::Telemetry => TELEMETRY_SLOT.with(|slot| f(&mut slot.borrow_mut())),
        Stream::Reports => REPORTS_SLOT.with(|slot| f(&mut slot.borrow_mut())),
    }
}

pub(crate) fn reconnect_backoff_ms(consecutive_failures: u32) -> u32 {
    let exponent = consecutive_failures.saturating_sub(1).min(6);
    (RECONNECT_BASE_MS << exponent).min(RECONNECT_MAX_MS)
}

pub fn disconnect() {
    for stream in [Stream::Telemetry, Stream::Reports] {
        with_slot(stream, |slot| {
            slot.retry.take();
            slot.consecutive_failures = 0;
            if let Some(connection) = slot.connection.take() {
                connection.close();
            }
        });
    }
}

fn open(stream: Stream, handler: MessageHandler, status: RwSignal<ConnectionStatus>) {
    let es = match EventSource::new(stream.url()) {
        Ok(es) => es,
        Err(_) => {
            schedule_reconnect(stream, handler, status);
            return;
        }
    };

    let on_open = Closure::<dyn Fn()>::new(move || {
        status.set(ConnectionStatus::Live);
    });
    es.set_onopen(Some(on_open.as_ref().unchecked_ref()));

    let message_handler = handler.clone();
    let on_message = Closure::<dyn Fn(MessageEvent)>::new(move |e: MessageEvent| {
        let Some(data) = e.data().as_string() else {
            return;
        };
        with_slot(stream, |slot| slot.consecutive_failures = 0);
        message_handler(data);
    });
    es.set_onmessage(Some(on_message.as_ref().unchecked_ref()));

    let error_handler = handler.clone();
    let on_error = Closure::<dyn Fn()>::new(move || {
        status.set(ConnectionStatus::Reconnecting);
        schedule_reconnect(stream, error_handler.clone(), status);
    });
    es.set_onerror(Some(on_error.as_ref().unchecked_ref()));

    // Replace any existing connection, ensuring handlers are unregistered cleanly.
    with_slot(stream, |slot| {
        if let Some(old) = slot.connection.take() {
            old.close();
        }
        slot.connection = Some(SseConnection {
            es,
            on_open,
            on_error,
            on_message,
        });
    });
}

/// Close the stream and reopen it after the backoff delay. Last received
/// state stays on screen meanwhile.
fn schedule_reconnect(stream: Stream, handler: MessageHandler, status: RwSignal<ConnectionStatus>) {
    let (attempt, delay_ms) = with_slot(stream, |slot| {
        slot.consecutive_failures = slot.consecutive_failures.saturating_add(1);
        (
            slot.consecutive_failures,
            reconnect_backoff_ms(slot.consecutive_failures),
        )
    });
    web_sys::console::warn_1(
        &format!(
            "{} stream error (attempt {attempt}); reconnecting in {delay_ms}ms",
            stream.url()
        )
        .into(),
    );

    // Close outside the slot borrow: closing drops the closure running this call
    let old = with_slot(stream, |slot| slot.connection.take());
    if let Some(old) = old {
        // The running onerror closure lives in `old`; defer its drop
        let es = old.es.clone();
        es.close();
        Timeout::new(0, move || old.close()).forget();
    }

    let timeout = Timeout::new(delay_ms, move || {
        with_slot(stream, |slot| slot.retry = None);
        status.set(ConnectionStatus::Connecting);
        open(stream, handler, status);
    });
    with_slot(stream, |slot| slot.retry = Some(timeout));
}

fn handle_telemetry(data: &str, telemetry: RwSignal<TelemetryState>) {
    let message = match serde_json::from_str::<StreamMessage>(data) {
        Ok(message) => message,
        Err(e) => {
            web_sys::console::warn_1(&format!("Ignoring malformed telemetry: {e}").into());
            return;
        }
    };
    if !message.is_success() {
        web_sys::console::warn_1(
            &format!(
                "Telemetry stream reported {}: {}",
                message.status,
                message.message.unwrap_or_default()
            )
            .into(),
        );
        return;
    }
    let Some(payload) = message.data else {
        return;
    };
    // Identical payloads leave the signal untouched, so nothing redraws
    if telemetry.with_untracked(|state| state.differs(&payload)) {
        telemetry.update(|state| {
            state.apply(payload);
        });
    }
}

fn handle_report(
    data: &str,
    reports: RwSignal<ReportLog>,
    telemetry: RwSignal<TelemetryState>,
) {
    let report = match serde_json::from_str::<Report>(data) {
        Ok(report) => report,
        Err(e) => {
            web_sys::console::warn_1(&format!("Ignoring malformed report: {e}").into());
            return;
        }
    };
    let mut kind = ReportKind::Unknown;
    reports.update(|log| kind = log.push(report, chrono::Utc::now()));
    if kind == ReportKind::StartMission {
        web_sys::console::info_1(&"Mission started; clearing reports and telemetry".into());
        telemetry.update(TelemetryState::clear);
    }
}

/// Open both streams and feed them into the given signals.
pub fn connect(
    telemetry: RwSignal<TelemetryState>,
    reports: RwSignal<ReportLog>,
    connection: RwSignal<ConnectionStatus>,
) {
    connection.set(ConnectionStatus::Connecting);

    let telemetry_handler: MessageHandler = Rc::new(move |data| handle_telemetry(&data, telemetry));
    open(Stream::Telemetry, telemetry_handler, connection);

    // Report stream state does not drive the status indicator
    let reports_status = RwSignal::new(ConnectionStatus::Connecting);
    let reports_handler: MessageHandler =
        Rc::new(move |data| handle_report(&data, reports, telemetry));
    open(Stream::Reports, reports_handler, reports_status);
}

#[cfg(test)]
mod tests {
    use super::reconnect_backoff_ms;

    #[test]
    fn backoff_doubles_then_caps() {
        assert_eq!(reconnect_backoff_ms(1), 500);
        assert_eq!(reconnect_backoff_ms(2), 1000);
        assert_eq!(reconnect_backoff_ms(5), 8000);
        assert_eq!(reconnect_backoff_ms(6), 10_000);
        assert_eq!(reconnect_backoff_ms(40), 10_000);
    }
}
