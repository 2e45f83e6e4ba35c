#![forbid(unsafe_code)]

//! Browser content script for spotlite.
//!
//! This crate provides [`ContentScript`], a `wasm-bindgen`-exported struct
//! that wires `spotlite_core::Controller` to the live page: a `web_sys`
//! DOM backend, a `prefers-color-scheme` media query, `setTimeout` and
//! `requestAnimationFrame` for the controller's timers, and the extension
//! storage and messaging APIs.
//!
//! The JSON boundary lives in `runner_core` so it can be tested natively.

#[cfg(target_arch = "wasm32")]
mod wasm;

#[cfg(target_arch = "wasm32")]
pub use wasm::ContentScript;

// Runner core is used by the wasm module and by native tests.
#[cfg(any(target_arch = "wasm32", test))]
mod runner_core;

#[cfg(test)]
mod tests {
    use core::time::Duration;

    use crate::runner_core::{ScriptCore, load_config, parse_level};
    use pretty_assertions::assert_eq;
    use serde_json::{Value, json};
    use spotlite_core::ControllerConfig;
    use spotlite_core::memory::{MemoryColorScheme, MemoryDocument};

    const STYLE_ID: &str = "spotify-light-mode-styles";

    type TestCore = ScriptCore<MemoryDocument, MemoryColorScheme>;

    fn core(prefers_dark: bool) -> TestCore {
        ScriptCore::new(
            MemoryDocument::new(),
            MemoryColorScheme::new(prefers_dark),
            ControllerConfig::default(),
        )
    }

    fn reply(core: &mut TestCore, message: Value) -> Option<(Value, bool)> {
        core.handle_message_json(Duration::ZERO, &message.to_string()).map(|outcome| {
            let reply: Value = serde_json::from_str(&outcome.reply_json).expect("reply is JSON");
            (reply, outcome.reload_manual_theme)
        })
    }

    #[test]
    fn startup_with_empty_store_applies_light() {
        let mut core = core(false);
        core.startup(Ok("{}".into()));
        assert_eq!(core.controller().current_theme(), "light");
        assert!(core.controller().document().style_css(STYLE_ID).is_some());
    }

    #[test]
    fn startup_read_failure_falls_back_to_light() {
        let mut core = core(false);
        core.startup(Err("Extension context invalidated.".into()));
        assert_eq!(core.controller().current_theme(), "light");
    }

    #[test]
    fn startup_malformed_store_falls_back_to_light() {
        let mut core = core(false);
        core.startup(Ok(r#"{"selectedTheme": 7}"#.into()));
        assert_eq!(core.controller().current_theme(), "light");
    }

    #[test]
    fn change_theme_replies_success() {
        let mut core = core(false);
        core.startup(Ok("{}".into()));
        let (reply, reload) = reply(&mut core, json!({"action": "changeTheme", "theme": "vintage"}))
            .expect("recognised command");
        assert_eq!(reply, json!({"success": true}));
        assert!(!reload);
        assert_eq!(core.controller().current_theme(), "vintage");
    }

    #[test]
    fn unknown_theme_replies_failure() {
        let mut core = core(false);
        let (reply, _) = reply(&mut core, json!({"action": "changeTheme", "theme": "neon"}))
            .expect("recognised command");
        assert_eq!(reply, json!({"success": false, "error": "unknown theme `neon`"}));
    }

    #[test]
    fn malformed_known_command_replies_failure() {
        let mut core = core(false);
        let (reply, _) = reply(&mut core, json!({"action": "toggleLightMode", "enabled": "yes"}))
            .expect("recognised command");
        assert_eq!(reply["success"], json!(false));
        assert!(reply["error"].as_str().unwrap().contains("toggleLightMode"));
    }

    #[test]
    fn unrecognised_messages_get_no_reply() {
        let mut core = core(false);
        assert_eq!(reply(&mut core, json!({"action": "getVersion"})), None);
        assert_eq!(core.handle_message_json(Duration::ZERO, "not json"), None);
    }

    #[test]
    fn leaving_system_mode_requests_reload() {
        let mut core = core(true);
        core.startup(Ok(r#"{"useSystemTheme": true}"#.into()));
        assert_eq!(core.controller().current_theme(), "dark");

        let (_, reload) = reply(
            &mut core,
            json!({"action": "updateSystemThemePreference", "useSystemTheme": false}),
        )
        .expect("recognised command");
        assert!(reload);
        core.restore(Ok(r#"{"selectedTheme": "highContrast"}"#.into()));
        assert_eq!(core.controller().current_theme(), "highContrast");
    }

    #[test]
    fn store_changes_outside_sync_area_are_ignored() {
        let mut core = core(false);
        core.startup(Ok("{}".into()));
        let changes = r#"{"selectedTheme": {"newValue": "sepia"}}"#;
        assert!(!core.store_changed_json(changes, "local"));
        assert_eq!(core.controller().current_theme(), "light");
        assert!(!core.store_changed_json(changes, "sync"));
        assert_eq!(core.controller().current_theme(), "sepia");
    }

    #[test]
    fn store_change_leaving_system_mode_requests_reload() {
        let mut core = core(false);
        core.startup(Ok(r#"{"useSystemTheme": true}"#.into()));
        assert!(core.store_changed_json(r#"{"useSystemTheme": {"newValue": false}}"#, "sync"));
    }

    #[test]
    fn wakeups_are_rounded_up_to_whole_ms() {
        let mut core = core(false);
        core.startup(Ok("{}".into()));
        assert_eq!(core.next_wakeup_ms(), None);
        core.controller_mut().apply_theme("dark").unwrap();
        assert_eq!(core.next_wakeup_ms(), Some(250));
        core.tick(Duration::from_micros(100_500));
        assert_eq!(core.next_wakeup_ms(), Some(150));
        core.tick(Duration::from_millis(250));
        assert_eq!(core.next_wakeup_ms(), None);
        assert!(core.controller().document().style_ids().is_empty());
    }

    #[test]
    fn direct_apply_measures_settle_from_call_time() {
        let mut core = core(false);
        core.startup(Ok("{}".into()));
        core.apply_theme(Duration::from_millis(1_000), "dark").unwrap();
        assert_eq!(core.next_wakeup_ms(), Some(250));

        core.tick(Duration::from_millis(1_001));
        assert!(core.controller().document().style_css(STYLE_ID).is_some());
        core.tick(Duration::from_millis(1_250));
        assert!(core.controller().document().style_ids().is_empty());
    }

    #[test]
    fn commands_measure_settle_from_arrival_time() {
        let mut core = core(false);
        core.startup(Ok("{}".into()));
        let outcome = core
            .handle_message_json(
                Duration::from_millis(2_000),
                r#"{"action": "toggleLightMode", "enabled": false}"#,
            )
            .expect("recognised command");
        assert_eq!(outcome.reply_json, r#"{"success":true}"#);

        core.tick(Duration::from_millis(2_100));
        assert!(core.controller().document().style_css(STYLE_ID).is_some());
        assert_eq!(core.next_wakeup_ms(), Some(150));
    }

    #[test]
    fn frames_run_pending_corrections() {
        let mut core = core(false);
        let el = core
            .controller_mut()
            .document_mut()
            .insert_background_element("cover.jpg");
        core.startup(Ok("{}".into()));
        assert!(core.needs_frame());
        core.animation_frame();
        assert!(!core.needs_frame());
        assert_eq!(
            core.controller().document().filter_of(el),
            Some("invert(1) hue-rotate(180deg)")
        );
    }

    #[test]
    fn snapshot_reports_state_and_stats() {
        let mut core = core(false);
        core.startup(Ok(r#"{"selectedTheme": "sepia"}"#.into()));
        let snapshot: Value = serde_json::from_str(&core.snapshot_json()).unwrap();
        assert_eq!(snapshot["currentTheme"], json!("sepia"));
        assert_eq!(snapshot["observing"], json!(true));
        assert_eq!(snapshot["stats"]["styleRemovals"], json!(0));
    }

    #[test]
    fn disable_leaves_page_native() {
        let mut core = core(false);
        core.startup(Ok("{}".into()));
        core.disable();
        assert!(core.controller().document().style_ids().is_empty());
        assert!(!core.controller().is_observing());
    }

    #[test]
    fn config_overrides_and_fallbacks() {
        assert_eq!(load_config(None), ControllerConfig::default());
        assert_eq!(load_config(Some("  ")), ControllerConfig::default());
        assert_eq!(load_config(Some(r#"{"bogus": 1}"#)), ControllerConfig::default());
        let config = load_config(Some(r#"{"debounceMs": 40, "logLevel": "debug"}"#));
        assert_eq!(config.debounce, Duration::from_millis(40));
        assert_eq!(parse_level(&config.log_level), tracing::Level::DEBUG);
    }

    #[test]
    fn log_levels_parse_leniently() {
        assert_eq!(parse_level("WARN"), tracing::Level::WARN);
        assert_eq!(parse_level(" trace "), tracing::Level::TRACE);
        assert_eq!(parse_level("verbose"), tracing::Level::INFO);
    }
}
