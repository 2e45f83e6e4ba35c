#![forbid(unsafe_code)]

//! `wasm-bindgen` exports for the content script.
//!
//! This module supplies the browser implementations of the controller's
//! host traits and drives [`super::runner_core::ScriptCore`] from browser
//! callbacks. Only compiled on `wasm32` targets.
//!
//! Every callback holds a `Weak` reference to the shared state, so dropping
//! the [`ContentScript`] (or calling `disable`) stops all further work.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::io::{self, Write};
use std::rc::{Rc, Weak};

use js_sys::{Array, Function, JSON, Promise, Reflect};
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::{JsFuture, spawn_local};
use web_sys::{
    HtmlElement, MediaQueryList, MediaQueryListEvent, MutationObserver, MutationObserverInit,
    Node, NodeList, Window,
};
use web_time::Instant;

use spotlite_core::prefs::STORE_KEYS;
use spotlite_core::{
    ColorSchemeSource, ControllerConfig, Document, DomError, MutationRecord, SubscriptionId,
    WatchId,
};
use spotlite_theme::css::BACKGROUND_IMAGE_SELECTOR;

use super::runner_core::{ScriptCore, load_config, parse_level};

const DARK_SCHEME_QUERY: &str = "(prefers-color-scheme: dark)";
const FILTER_PROPERTY: &str = "filter";
const BACKGROUND_IMAGE_PROPERTY: &str = "background-image";

// ---------------------------------------------------------------------------
// Console plumbing
// ---------------------------------------------------------------------------

fn console_call(method: &str, msg: &str) {
    let global = js_sys::global();
    let Ok(console) = Reflect::get(&global, &"console".into()) else {
        return;
    };
    let Ok(func) = Reflect::get(&console, &method.into()) else {
        return;
    };
    let Ok(func) = func.dyn_into::<Function>() else {
        return;
    };
    let _ = func.call1(&console, &JsValue::from_str(msg));
}

fn install_panic_hook() {
    use std::sync::Once;

    static ONCE: Once = Once::new();
    ONCE.call_once(|| {
        std::panic::set_hook(Box::new(|info| {
            let msg = if let Some(loc) = info.location() {
                format!(
                    "spotlite panic at {}:{}:{}: {info}",
                    loc.file(),
                    loc.line(),
                    loc.column()
                )
            } else {
                format!("spotlite panic: {info}")
            };
            console_call("error", &msg);
        }));
    });
}

/// `io::Write` sink that emits one console line per formatted event.
#[derive(Default)]
struct ConsoleWriter {
    buf: Vec<u8>,
}

impl ConsoleWriter {
    fn emit(&mut self) {
        if self.buf.is_empty() {
            return;
        }
        let text = String::from_utf8_lossy(&self.buf);
        let line = text.trim_end();
        let method = if line.starts_with("ERROR") {
            "error"
        } else if line.starts_with(" WARN") || line.starts_with("WARN") {
            "warn"
        } else {
            "log"
        };
        console_call(method, line);
        self.buf.clear();
    }
}

impl Write for ConsoleWriter {
    fn write(&mut self, bytes: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(bytes);
        Ok(bytes.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.emit();
        Ok(())
    }
}

impl Drop for ConsoleWriter {
    fn drop(&mut self) {
        self.emit();
    }
}

fn init_logging(level: &str) {
    let result = tracing_subscriber::fmt()
        .with_writer(ConsoleWriter::default)
        .with_max_level(parse_level(level))
        .without_time()
        .with_ansi(false)
        .with_target(false)
        .try_init();
    if result.is_err() {
        tracing::debug!("log subscriber already installed");
    }
}

fn js_error_text(err: &JsValue) -> String {
    err.as_string().unwrap_or_else(|| {
        Reflect::get(err, &"message".into())
            .ok()
            .and_then(|message| message.as_string())
            .unwrap_or_else(|| format!("{err:?}"))
    })
}

fn host_error(err: JsValue) -> DomError {
    DomError::Host(js_error_text(&err))
}

// ---------------------------------------------------------------------------
// Extension API access
// ---------------------------------------------------------------------------

fn js_path(path: &[&str]) -> Result<JsValue, String> {
    let mut value: JsValue = js_sys::global().into();
    for key in path {
        value = Reflect::get(&value, &JsValue::from_str(key)).map_err(|err| js_error_text(&err))?;
        if value.is_undefined() || value.is_null() {
            return Err(format!("`{}` is not available", path.join(".")));
        }
    }
    Ok(value)
}

fn call_method(target: &JsValue, name: &str, args: &Array) -> Result<JsValue, String> {
    let func = Reflect::get(target, &JsValue::from_str(name))
        .map_err(|err| js_error_text(&err))?
        .dyn_into::<Function>()
        .map_err(|_| format!("`{name}` is not a function"))?;
    func.apply(target, args).map_err(|err| js_error_text(&err))
}

fn add_listener(path: &[&str], callback: &Function) -> Result<(), String> {
    let event = js_path(path)?;
    call_method(&event, "addListener", &Array::of1(callback)).map(|_| ())
}

fn remove_listener(path: &[&str], callback: &Function) {
    if let Ok(event) = js_path(path) {
        let _ = call_method(&event, "removeListener", &Array::of1(callback));
    }
}

/// Read the preference keys from sync storage as JSON text.
async fn read_store() -> Result<String, String> {
    let sync = js_path(&["chrome", "storage", "sync"])?;
    let keys: Array = STORE_KEYS.iter().map(|key| JsValue::from_str(key)).collect();
    let promise = call_method(&sync, "get", &Array::of1(&keys))?
        .dyn_into::<Promise>()
        .map_err(|_| "storage.sync.get did not return a promise".to_owned())?;
    let value = JsFuture::from(promise)
        .await
        .map_err(|err| js_error_text(&err))?;
    JSON::stringify(&value)
        .map_err(|err| js_error_text(&err))?
        .as_string()
        .ok_or_else(|| "stored preferences are not serializable".to_owned())
}

fn stringify(value: &JsValue) -> Option<String> {
    JSON::stringify(value).ok().and_then(|text| text.as_string())
}

// ---------------------------------------------------------------------------
// DOM backend
// ---------------------------------------------------------------------------

type MutationCallback = Closure<dyn FnMut(Array, MutationObserver)>;

/// [`Document`] over the live page.
struct WebDocument {
    document: web_sys::Document,
    on_mutations: MutationCallback,
    observers: BTreeMap<u64, MutationObserver>,
    next_watch: u64,
}

impl WebDocument {
    fn select(&self, selector: &str) -> Vec<HtmlElement> {
        match self.document.query_selector_all(selector) {
            Ok(nodes) => html_elements(&nodes),
            Err(err) => {
                tracing::warn!(selector, err = %js_error_text(&err), "selector rejected");
                Vec::new()
            }
        }
    }
}

fn html_elements(nodes: &NodeList) -> Vec<HtmlElement> {
    (0..nodes.length())
        .filter_map(|idx| nodes.item(idx))
        .filter_map(|node| node.dyn_into::<HtmlElement>().ok())
        .collect()
}

fn style_value(element: &HtmlElement, property: &str) -> String {
    element
        .style()
        .get_property_value(property)
        .unwrap_or_default()
}

impl Document for WebDocument {
    type Element = HtmlElement;

    fn has_head(&self) -> bool {
        self.document.head().is_some()
    }

    fn has_body(&self) -> bool {
        self.document.body().is_some()
    }

    fn style_element_exists(&self, id: &str) -> bool {
        self.document.get_element_by_id(id).is_some()
    }

    fn upsert_style_element(&mut self, id: &str, css: &str) -> Result<(), DomError> {
        if let Some(existing) = self.document.get_element_by_id(id) {
            existing.set_text_content(Some(css));
            return Ok(());
        }
        let head = self.document.head().ok_or(DomError::HeadUnavailable)?;
        let style = self.document.create_element("style").map_err(host_error)?;
        style.set_id(id);
        style.set_text_content(Some(css));
        head.append_child(&style).map_err(host_error)?;
        Ok(())
    }

    fn remove_style_element(&mut self, id: &str) -> bool {
        match self.document.get_element_by_id(id) {
            Some(element) => {
                element.remove();
                true
            }
            None => false,
        }
    }

    fn background_image_elements(&self, excluding_marker: &str) -> Vec<HtmlElement> {
        self.select(&format!(
            "{BACKGROUND_IMAGE_SELECTOR}:not(.{excluding_marker})"
        ))
    }

    fn marked_elements(&self, marker: &str) -> Vec<HtmlElement> {
        self.select(&format!(".{marker}"))
    }

    fn has_background_image(&self, element: &HtmlElement) -> bool {
        let value = style_value(element, BACKGROUND_IMAGE_PROPERTY);
        !value.is_empty() && value != "none"
    }

    fn has_marker(&self, element: &HtmlElement, marker: &str) -> bool {
        element.class_list().contains(marker)
    }

    fn add_marker(&mut self, element: &HtmlElement, marker: &str) {
        let _ = element.class_list().add_1(marker);
    }

    fn remove_marker(&mut self, element: &HtmlElement, marker: &str) {
        let _ = element.class_list().remove_1(marker);
    }

    fn inline_filter(&self, element: &HtmlElement) -> String {
        style_value(element, FILTER_PROPERTY)
    }

    fn set_inline_filter(&mut self, element: &HtmlElement, value: &str) {
        if let Err(err) = element.style().set_property(FILTER_PROPERTY, value) {
            tracing::debug!(err = %js_error_text(&err), "inline filter rejected");
        }
    }

    fn remove_inline_filter(&mut self, element: &HtmlElement) {
        let _ = element.style().remove_property(FILTER_PROPERTY);
    }

    fn observe_body(&mut self) -> Result<WatchId, DomError> {
        let body = self.document.body().ok_or(DomError::BodyUnavailable)?;
        let observer =
            MutationObserver::new(self.on_mutations.as_ref().unchecked_ref()).map_err(host_error)?;
        let options = MutationObserverInit::new();
        options.set_child_list(true);
        options.set_subtree(true);
        options.set_attributes(true);
        options.set_attribute_filter(&Array::of1(&JsValue::from_str("style")));
        observer
            .observe_with_options(&body, &options)
            .map_err(host_error)?;
        let id = self.next_watch;
        self.next_watch += 1;
        self.observers.insert(id, observer);
        Ok(WatchId(id))
    }

    fn disconnect(&mut self, id: WatchId) {
        if let Some(observer) = self.observers.remove(&id.0) {
            observer.disconnect();
        }
    }
}

fn convert_records(records: &Array) -> Vec<MutationRecord<HtmlElement>> {
    records
        .iter()
        .filter_map(|record| record.dyn_into::<web_sys::MutationRecord>().ok())
        .map(|record| match record.type_().as_str() {
            "childList" => MutationRecord::ChildList {
                added: html_elements(&record.added_nodes()),
            },
            "attributes" => match record
                .target()
                .and_then(|node: Node| node.dyn_into::<HtmlElement>().ok())
            {
                Some(target) => MutationRecord::Attributes {
                    target,
                    attribute: record.attribute_name().unwrap_or_default(),
                },
                None => MutationRecord::CharacterData,
            },
            _ => MutationRecord::CharacterData,
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Color scheme
// ---------------------------------------------------------------------------

/// [`ColorSchemeSource`] over `matchMedia("(prefers-color-scheme: dark)")`.
struct MediaQueryScheme {
    query: Option<MediaQueryList>,
    on_change: Closure<dyn FnMut(MediaQueryListEvent)>,
    live: BTreeMap<u64, ()>,
    next_id: u64,
}

impl ColorSchemeSource for MediaQueryScheme {
    fn prefers_dark(&self) -> bool {
        self.query.as_ref().is_some_and(MediaQueryList::matches)
    }

    fn subscribe(&mut self) -> Result<SubscriptionId, DomError> {
        let query = self
            .query
            .as_ref()
            .ok_or_else(|| DomError::Host("matchMedia is not supported".to_owned()))?;
        if self.live.is_empty() {
            query
                .add_event_listener_with_callback("change", self.on_change.as_ref().unchecked_ref())
                .map_err(host_error)?;
        }
        let id = self.next_id;
        self.next_id += 1;
        self.live.insert(id, ());
        Ok(SubscriptionId(id))
    }

    fn unsubscribe(&mut self, id: SubscriptionId) {
        if self.live.remove(&id.0).is_none() || !self.live.is_empty() {
            return;
        }
        if let Some(query) = &self.query {
            let _ = query.remove_event_listener_with_callback(
                "change",
                self.on_change.as_ref().unchecked_ref(),
            );
        }
    }
}

// ---------------------------------------------------------------------------
// Shared state and scheduling
// ---------------------------------------------------------------------------

type Core = ScriptCore<WebDocument, MediaQueryScheme>;

struct Shared {
    window: Window,
    core: RefCell<Core>,
    origin: Instant,
    timer: Cell<Option<i32>>,
    frame: Cell<Option<i32>>,
    timer_cb: Closure<dyn FnMut()>,
    frame_cb: Closure<dyn FnMut(f64)>,
    message_cb: Closure<dyn FnMut(JsValue, JsValue, JsValue) -> bool>,
    store_cb: Closure<dyn FnMut(JsValue, JsValue)>,
    listening: Cell<bool>,
}

const MESSAGE_EVENT: &[&str] = &["chrome", "runtime", "onMessage"];
const STORE_EVENT: &[&str] = &["chrome", "storage", "onChanged"];

impl Shared {
    /// Re-arm the browser timer and frame callbacks from controller state.
    fn arm(&self) {
        let (wait_ms, needs_frame) = {
            let core = self.core.borrow();
            (core.next_wakeup_ms(), core.needs_frame())
        };

        if let Some(handle) = self.timer.take() {
            self.window.clear_timeout_with_handle(handle);
        }
        if let Some(wait_ms) = wait_ms {
            let delay = i32::try_from(wait_ms).unwrap_or(i32::MAX);
            match self
                .window
                .set_timeout_with_callback_and_timeout_and_arguments_0(
                    self.timer_cb.as_ref().unchecked_ref(),
                    delay,
                ) {
                Ok(handle) => self.timer.set(Some(handle)),
                Err(err) => tracing::warn!(err = %js_error_text(&err), "timer not armed"),
            }
        }

        if needs_frame && self.frame.get().is_none() {
            match self
                .window
                .request_animation_frame(self.frame_cb.as_ref().unchecked_ref())
            {
                Ok(handle) => self.frame.set(Some(handle)),
                Err(err) => tracing::warn!(err = %js_error_text(&err), "frame not requested"),
            }
        } else if !needs_frame && let Some(handle) = self.frame.take() {
            let _ = self.window.cancel_animation_frame(handle);
        }
    }

    fn on_timer(&self) {
        self.timer.set(None);
        self.core.borrow_mut().tick(self.origin.elapsed());
        self.arm();
    }

    fn on_frame(&self) {
        self.frame.set(None);
        self.core.borrow_mut().animation_frame();
        self.arm();
    }

    fn on_mutations(&self, records: &Array) {
        let records = convert_records(records);
        if records.is_empty() {
            return;
        }
        {
            let mut core = self.core.borrow_mut();
            core.tick(self.origin.elapsed());
            core.controller_mut().on_mutations(&records);
        }
        self.arm();
    }

    fn on_scheme_change(&self, prefers_dark: bool) {
        {
            let mut core = self.core.borrow_mut();
            core.tick(self.origin.elapsed());
            core.controller_mut().on_system_scheme_changed(prefers_dark);
        }
        self.arm();
    }

    fn on_message(self: &Rc<Self>, message: &JsValue, send_response: &JsValue) -> bool {
        let Some(json) = stringify(message) else {
            return false;
        };
        let outcome = self
            .core
            .borrow_mut()
            .handle_message_json(self.origin.elapsed(), &json);
        self.arm();
        let Some(outcome) = outcome else {
            return false;
        };
        if outcome.reload_manual_theme {
            self.reload_manual_theme();
        }
        let reply = JSON::parse(&outcome.reply_json).unwrap_or(JsValue::NULL);
        if let Some(send) = send_response.dyn_ref::<Function>()
            && let Err(err) = send.call1(&JsValue::NULL, &reply)
        {
            tracing::warn!(err = %js_error_text(&err), "reply not delivered");
        }
        false
    }

    fn on_store_changed(self: &Rc<Self>, changes: &JsValue, area: &JsValue) {
        let (Some(json), Some(area)) = (stringify(changes), area.as_string()) else {
            return;
        };
        let reload = {
            let mut core = self.core.borrow_mut();
            core.tick(self.origin.elapsed());
            core.store_changed_json(&json, &area)
        };
        self.arm();
        if reload {
            self.reload_manual_theme();
        }
    }

    fn reload_manual_theme(self: &Rc<Self>) {
        let weak = Rc::downgrade(self);
        spawn_local(async move {
            let stored = read_store().await;
            if let Some(shared) = weak.upgrade() {
                shared.core.borrow_mut().restore(stored);
                shared.arm();
            }
        });
    }

    fn start_listening(&self) {
        if self.listening.replace(true) {
            return;
        }
        if let Err(err) = add_listener(
            MESSAGE_EVENT,
            self.message_cb.as_ref().unchecked_ref(),
        ) {
            tracing::warn!(%err, "command listener not installed");
        }
        if let Err(err) = add_listener(
            STORE_EVENT,
            self.store_cb.as_ref().unchecked_ref(),
        ) {
            tracing::warn!(%err, "store listener not installed");
        }
    }

    fn stop_listening(&self) {
        if !self.listening.replace(false) {
            return;
        }
        remove_listener(
            MESSAGE_EVENT,
            self.message_cb.as_ref().unchecked_ref(),
        );
        remove_listener(
            STORE_EVENT,
            self.store_cb.as_ref().unchecked_ref(),
        );
    }

    fn cancel_callbacks(&self) {
        if let Some(handle) = self.timer.take() {
            self.window.clear_timeout_with_handle(handle);
        }
        if let Some(handle) = self.frame.take() {
            let _ = self.window.cancel_animation_frame(handle);
        }
    }
}

fn build_shared(window: Window, document: web_sys::Document, config: ControllerConfig) -> Rc<Shared> {
    let query = match window.match_media(DARK_SCHEME_QUERY) {
        Ok(query) => query,
        Err(err) => {
            tracing::warn!(err = %js_error_text(&err), "color-scheme query unavailable");
            None
        }
    };

    Rc::new_cyclic(|weak: &Weak<Shared>| {
        let w = weak.clone();
        let on_mutations: MutationCallback =
            Closure::new(move |records: Array, _observer: MutationObserver| {
                if let Some(shared) = w.upgrade() {
                    shared.on_mutations(&records);
                }
            });
        let w = weak.clone();
        let on_change = Closure::new(move |event: MediaQueryListEvent| {
            if let Some(shared) = w.upgrade() {
                shared.on_scheme_change(event.matches());
            }
        });
        let w = weak.clone();
        let timer_cb = Closure::new(move || {
            if let Some(shared) = w.upgrade() {
                shared.on_timer();
            }
        });
        let w = weak.clone();
        let frame_cb = Closure::new(move |_timestamp: f64| {
            if let Some(shared) = w.upgrade() {
                shared.on_frame();
            }
        });
        let w = weak.clone();
        let message_cb = Closure::new(
            move |message: JsValue, _sender: JsValue, send_response: JsValue| {
                w.upgrade()
                    .is_some_and(|shared| shared.on_message(&message, &send_response))
            },
        );
        let w = weak.clone();
        let store_cb = Closure::new(move |changes: JsValue, area: JsValue| {
            if let Some(shared) = w.upgrade() {
                shared.on_store_changed(&changes, &area);
            }
        });

        let document = WebDocument {
            document,
            on_mutations,
            observers: BTreeMap::new(),
            next_watch: 1,
        };
        let scheme = MediaQueryScheme {
            query,
            on_change,
            live: BTreeMap::new(),
            next_id: 1,
        };
        Shared {
            window,
            core: RefCell::new(ScriptCore::new(document, scheme, config)),
            origin: Instant::now(),
            timer: Cell::new(None),
            frame: Cell::new(None),
            timer_cb,
            frame_cb,
            message_cb,
            store_cb,
            listening: Cell::new(false),
        }
    })
}

// ---------------------------------------------------------------------------
// Exports
// ---------------------------------------------------------------------------

/// One page's theme controller, bound to the live document.
#[wasm_bindgen]
pub struct ContentScript {
    shared: Rc<Shared>,
}

#[wasm_bindgen(start)]
pub fn wasm_start() {
    install_panic_hook();
}

#[wasm_bindgen]
impl ContentScript {
    /// Create the controller. `config_json` carries optional overrides
    /// such as `{"debounceMs": 100, "logLevel": "debug"}`.
    #[wasm_bindgen(constructor)]
    pub fn new(config_json: Option<String>) -> Result<ContentScript, JsValue> {
        install_panic_hook();
        let config = load_config(config_json.as_deref());
        init_logging(&config.log_level);

        let window = web_sys::window().ok_or_else(|| JsValue::from_str("no window"))?;
        let document = window
            .document()
            .ok_or_else(|| JsValue::from_str("no document"))?;
        Ok(Self {
            shared: build_shared(window, document, config),
        })
    }

    /// Install the extension listeners and apply the stored preferences.
    pub fn start(&self) {
        self.shared.start_listening();
        let weak = Rc::downgrade(&self.shared);
        spawn_local(async move {
            let stored = read_store().await;
            if let Some(shared) = weak.upgrade() {
                {
                    let mut core = shared.core.borrow_mut();
                    core.tick(shared.origin.elapsed());
                    core.startup(stored);
                }
                shared.arm();
            }
        });
    }

    /// Apply a theme directly, bypassing the store.
    #[wasm_bindgen(js_name = applyTheme)]
    pub fn apply_theme(&self, name: &str) -> Result<(), JsValue> {
        let now = self.shared.origin.elapsed();
        let result = self.shared.core.borrow_mut().apply_theme(now, name);
        self.shared.arm();
        result.map_err(|err| JsValue::from_str(&err.to_string()))
    }

    /// Handle a command message given as JSON; returns the reply JSON, or
    /// `undefined` for unrecognised commands.
    #[wasm_bindgen(js_name = handleMessage)]
    pub fn handle_message(&self, message_json: &str) -> Option<String> {
        let now = self.shared.origin.elapsed();
        let outcome = self
            .shared
            .core
            .borrow_mut()
            .handle_message_json(now, message_json);
        self.shared.arm();
        let outcome = outcome?;
        if outcome.reload_manual_theme {
            self.shared.reload_manual_theme();
        }
        Some(outcome.reply_json)
    }

    /// Name of the active theme.
    #[wasm_bindgen(js_name = currentTheme)]
    pub fn current_theme(&self) -> String {
        self.shared.core.borrow().controller().current_theme().to_owned()
    }

    /// Controller state and counters as JSON.
    pub fn snapshot(&self) -> String {
        self.shared.core.borrow().snapshot_json()
    }

    /// Tear everything down, leaving the page in its native state.
    pub fn disable(&self) {
        self.shared.stop_listening();
        self.shared.cancel_callbacks();
        self.shared.core.borrow_mut().disable();
    }
}

impl Drop for ContentScript {
    fn drop(&mut self) {
        self.disable();
    }
}
