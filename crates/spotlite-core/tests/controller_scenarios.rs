#![forbid(unsafe_code)]

//! End-to-end controller scenarios against the in-memory host.

use core::time::Duration;

use pretty_assertions::assert_eq;
use proptest::prelude::*;
use serde_json::json;
use spotlite_core::memory::{MemoryColorScheme, MemoryDocument, NodeId};
use spotlite_core::{
    Controller, FollowUp, InboundMessage, MutationRecord, Preferences, StoreChanges, TaskKind,
};
use spotlite_theme::css::theme_stylesheet;
use spotlite_theme::{DARK, HIGH_CONTRAST, LIGHT, SEPIA, ThemeRegistry, VINTAGE};

const STYLE_ID: &str = "spotify-light-mode-styles";
const TRANSITION_ID: &str = "spotify-light-mode-transitions";
const MARKER: &str = "spotify-lm-corrected";
const FILTERED: [&str; 4] = [LIGHT, SEPIA, HIGH_CONTRAST, VINTAGE];

type TestController = Controller<MemoryDocument, MemoryColorScheme>;

fn ms(value: u64) -> Duration {
    Duration::from_millis(value)
}

fn controller_with(prefers_dark: bool) -> TestController {
    Controller::new(MemoryDocument::new(), MemoryColorScheme::new(prefers_dark))
}

fn message(value: serde_json::Value) -> InboundMessage {
    InboundMessage::parse(&value)
        .expect("valid command")
        .expect("recognised command")
}

fn theme_css(name: &str) -> String {
    theme_stylesheet(ThemeRegistry::builtin().get(name).expect("builtin theme"))
}

fn insert_added(c: &mut TestController, url: &str) -> NodeId {
    let el = c.document_mut().insert_background_element(url);
    c.on_mutations(&[MutationRecord::ChildList { added: vec![el] }]);
    el
}

#[test]
fn empty_store_loads_light() {
    let mut c = controller_with(false);
    let prefs = Preferences::from_value(json!({})).unwrap();
    c.startup(Ok(prefs));

    assert_eq!(c.current_theme(), LIGHT);
    let css = c.document().style_css(STYLE_ID).expect("theme style injected");
    assert!(css.contains("filter: invert(1) hue-rotate(180deg);"));
    assert!(c.document().style_css(TRANSITION_ID).is_some());
    assert!(c.is_observing());
}

#[test]
fn change_theme_sepia_from_dark() {
    let mut c = controller_with(false);
    c.startup(Ok(Preferences {
        selected_theme: DARK.into(),
        use_system_theme: false,
    }));
    assert!(!c.is_observing());

    let dispatch = c
        .handle_message(message(json!({"action": "changeTheme", "theme": "sepia"})))
        .expect("reply");
    assert!(dispatch.reply.success);
    assert_eq!(c.document().style_css(STYLE_ID), Some(theme_css(SEPIA).as_str()));
    assert!(c.is_observing());
}

#[test]
fn system_dark_removes_styles_after_settle() {
    let mut c = controller_with(true);
    c.startup(Ok(Preferences::default()));
    assert_eq!(c.current_theme(), LIGHT);

    let dispatch = c
        .handle_message(message(
            json!({"action": "updateSystemThemePreference", "useSystemTheme": true}),
        ))
        .expect("reply");
    assert!(dispatch.reply.success);
    assert_eq!(dispatch.follow_up, None);
    assert_eq!(c.current_theme(), DARK);
    assert!(!c.is_observing());

    c.advance_time(ms(249));
    assert!(c.document().style_css(STYLE_ID).is_some());
    c.advance_time(ms(1));
    assert!(c.document().style_ids().is_empty());
    assert_eq!(c.stats().style_removals, 1);
}

#[test]
fn every_theme_round_trips_to_identity() {
    for theme in FILTERED {
        let mut c = controller_with(false);
        c.document_mut().insert_background_element("cover.jpg");
        let styled = c.document_mut().insert_background_element("art.jpg");
        c.document_mut().set_page_filter(styled, "blur(2px)");

        c.apply_theme(theme).unwrap();
        c.on_animation_frame();
        assert_eq!(c.document().marker_count(MARKER), 2, "{theme}");

        c.apply_theme(DARK).unwrap();
        c.advance_time(ms(250));
        assert!(c.document().style_ids().is_empty(), "{theme}");
        assert_eq!(c.document().marker_count(MARKER), 0, "{theme}");
        assert_eq!(c.document().filter_of(styled), Some("blur(2px)"), "{theme}");
        assert_eq!(c.document().live_watchers(), 0, "{theme}");
    }
}

#[test]
fn applying_twice_is_idempotent() {
    let mut c = controller_with(false);
    let el = c.document_mut().insert_background_element("cover.jpg");
    c.apply_theme(VINTAGE).unwrap();
    c.on_animation_frame();
    let once = c.document().filter_of(el).map(str::to_owned);

    c.apply_theme(VINTAGE).unwrap();
    c.on_animation_frame();
    assert_eq!(c.document().filter_of(el).map(str::to_owned), once);
    assert_eq!(c.document().style_ids(), vec![TRANSITION_ID, STYLE_ID]);
    assert_eq!(c.document().marker_count(MARKER), 1);
    assert_eq!(c.document().live_watchers(), 1);
}

#[test]
fn repeated_correction_passes_do_not_stack() {
    let mut c = controller_with(false);
    let el = c.document_mut().insert_background_element("cover.jpg");
    c.apply_theme(LIGHT).unwrap();
    assert_eq!(c.correct_background_images(), 1);
    assert_eq!(c.correct_background_images(), 0);
    assert_eq!(c.correct_background_images(), 0);
    assert_eq!(c.document().filter_of(el), Some("invert(1) hue-rotate(180deg)"));
}

#[test]
fn mutation_burst_coalesces_into_one_pass() {
    let mut c = controller_with(false);
    c.apply_theme(LIGHT).unwrap();
    let before = c.stats().correction_passes;

    let mut added = Vec::new();
    for i in 0..5 {
        added.push(insert_added(&mut c, &format!("track{i}.jpg")));
        c.advance_time(ms(100));
    }
    assert!(!c.needs_frame());
    c.advance_time(ms(50));
    assert!(c.needs_frame());
    c.on_animation_frame();

    assert_eq!(c.stats().correction_passes, before + 1);
    assert_eq!(c.stats().relevant_batches, 5);
    for el in added {
        assert_eq!(c.document().filter_of(el), Some("invert(1) hue-rotate(180deg)"));
    }
}

#[test]
fn pass_uses_theme_active_when_it_runs() {
    let mut c = controller_with(false);
    c.apply_theme(LIGHT).unwrap();
    let el = insert_added(&mut c, "cover.jpg");

    c.apply_theme(HIGH_CONTRAST).unwrap();
    c.advance_time(ms(150));
    c.on_animation_frame();
    assert_eq!(
        c.document().filter_of(el),
        Some("invert(1) hue-rotate(180deg) contrast(0.8)")
    );
}

#[test]
fn irrelevant_mutations_schedule_nothing() {
    let mut c = controller_with(false);
    c.apply_theme(LIGHT).unwrap();
    let plain = c.document_mut().insert_element();
    c.on_mutations(&[
        MutationRecord::CharacterData,
        MutationRecord::Attributes {
            target: plain,
            attribute: "style".into(),
        },
    ]);
    assert_eq!(c.stats().mutation_batches, 1);
    assert_eq!(c.stats().relevant_batches, 0);
    assert!(!c.is_pending(TaskKind::CorrectionDebounce));
}

#[test]
fn style_change_adding_background_is_corrected() {
    let mut c = controller_with(false);
    c.apply_theme(SEPIA).unwrap();
    let el = c.document_mut().insert_element();
    c.document_mut().set_background_image(el, Some("lazy.jpg"));
    c.on_mutations(&[MutationRecord::Attributes {
        target: el,
        attribute: "style".into(),
    }]);
    c.advance_time(ms(150));
    c.on_animation_frame();
    assert_eq!(c.document().filter_of(el), Some("invert(1) hue-rotate(180deg)"));
}

#[test]
fn leaving_system_mode_restores_stored_theme() {
    let mut c = controller_with(true);
    c.startup(Ok(Preferences {
        selected_theme: VINTAGE.into(),
        use_system_theme: true,
    }));
    assert_eq!(c.current_theme(), DARK);
    assert!(c.is_following_system());

    let dispatch = c
        .handle_message(message(
            json!({"action": "updateSystemThemePreference", "useSystemTheme": false}),
        ))
        .expect("reply");
    assert_eq!(dispatch.follow_up, Some(FollowUp::ReloadManualTheme));
    assert!(!c.is_following_system());
    assert_eq!(c.color_scheme().live_subscriptions(), 0);

    // The user picked sepia while system mode was on.
    c.restore_manual_theme(Preferences::from_json(r#"{"selectedTheme": "sepia"}"#));
    assert_eq!(c.current_theme(), SEPIA);
}

#[test]
fn system_preference_changes_are_followed() {
    let mut c = controller_with(false);
    c.set_use_system_theme(true).unwrap();
    assert_eq!(c.current_theme(), LIGHT);

    c.color_scheme_mut().set_prefers_dark(true);
    c.on_system_scheme_changed(true);
    assert_eq!(c.current_theme(), DARK);

    c.set_use_system_theme(true).unwrap();
    assert_eq!(c.color_scheme().live_subscriptions(), 1);
}

#[test]
fn unsupported_color_scheme_keeps_manual_commands_working() {
    let mut c = controller_with(true);
    c.startup(Ok(Preferences::default()));
    c.color_scheme_mut().set_fail_subscribe(true);

    let dispatch = c
        .handle_message(message(
            json!({"action": "updateSystemThemePreference", "useSystemTheme": true}),
        ))
        .expect("reply");
    assert!(!dispatch.reply.success);
    assert!(!c.use_system_theme());

    let dispatch = c
        .handle_message(message(json!({"action": "changeTheme", "theme": "sepia"})))
        .expect("reply");
    assert!(dispatch.reply.success);
    assert_eq!(c.current_theme(), SEPIA);
    assert_eq!(c.document().style_css(STYLE_ID), Some(theme_css(SEPIA).as_str()));

    // Scheme changes are not followed outside system mode.
    c.on_system_scheme_changed(true);
    assert_eq!(c.current_theme(), SEPIA);
}

#[test]
fn dark_without_head_reports_failure_and_schedules_nothing() {
    let mut c = controller_with(false);
    c.startup(Ok(Preferences::default()));
    c.document_mut().set_head_ready(false);

    let dispatch = c
        .handle_message(message(json!({"action": "toggleLightMode", "enabled": false})))
        .expect("reply");
    assert!(!dispatch.reply.success);
    assert_eq!(c.current_theme(), DARK);
    assert!(!c.is_pending(TaskKind::StyleSettle));

    c.document_mut().set_head_ready(true);
    c.apply_theme(VINTAGE).unwrap();
    assert_eq!(c.document().style_css(STYLE_ID), Some(theme_css(VINTAGE).as_str()));
}

#[test]
fn unknown_theme_command_fails_without_state_change() {
    let mut c = controller_with(false);
    c.apply_theme(SEPIA).unwrap();
    let dispatch = c
        .handle_message(message(json!({"action": "changeTheme", "theme": "neon"})))
        .expect("reply");
    assert!(!dispatch.reply.success);
    assert_eq!(dispatch.reply.error.as_deref(), Some("unknown theme `neon`"));
    assert_eq!(c.current_theme(), SEPIA);
}

#[test]
fn store_change_notification_applies_theme() {
    let mut c = controller_with(false);
    c.startup(Ok(Preferences::default()));
    let changes = StoreChanges::from_json(
        r#"{"selectedTheme": {"oldValue": "light", "newValue": "highContrast"}}"#,
    )
    .unwrap();
    assert_eq!(c.on_store_changed(&changes), None);
    assert_eq!(c.current_theme(), HIGH_CONTRAST);
}

#[test]
fn stale_markers_are_cleaned_on_dark() {
    let mut c = controller_with(false);
    let el = c.document_mut().insert_background_element("cover.jpg");
    // Left behind by an earlier content-script instance.
    c.document_mut().set_page_filter(el, "blur(1px) invert(1) hue-rotate(180deg) sepia(0.2)");
    c.document_mut().add_page_class(el, MARKER);

    c.apply_theme(VINTAGE).unwrap();
    c.apply_theme(DARK).unwrap();
    assert_eq!(c.document().filter_of(el), Some("blur(1px)"));
    assert_eq!(c.document().classes_of(el), Vec::<&str>::new());
}

#[test]
fn disable_then_reuse() {
    let mut c = controller_with(false);
    c.startup(Ok(Preferences::default()));
    insert_added(&mut c, "cover.jpg");
    c.disable();
    assert_eq!(c.next_wakeup(), None);
    assert_eq!(c.current_theme(), DARK);

    c.apply_theme(SEPIA).unwrap();
    assert!(c.is_observing());
    assert_eq!(c.document().live_watchers(), 1);
}

fn theme_strategy() -> impl Strategy<Value = &'static str> {
    prop::sample::select(vec![LIGHT, DARK, SEPIA, HIGH_CONTRAST, VINTAGE])
}

proptest! {
    #[test]
    fn any_switch_sequence_returns_to_identity(
        themes in prop::collection::vec(theme_strategy(), 1..12),
        gaps in prop::collection::vec(0u64..400, 12),
        frames in prop::collection::vec(any::<bool>(), 12),
    ) {
        let mut c = controller_with(false);
        let el = c.document_mut().insert_background_element("cover.jpg");
        c.document_mut().set_page_filter(el, "saturate(2)");

        for (i, theme) in themes.iter().enumerate() {
            c.apply_theme(theme).unwrap();
            c.advance_time(ms(gaps[i]));
            if frames[i] {
                c.on_animation_frame();
            }
            prop_assert!(c.document().style_ids().len() <= 2);
            prop_assert!(c.document().live_watchers() <= 1);
        }

        c.apply_theme(DARK).unwrap();
        c.advance_time(ms(250));
        prop_assert!(c.document().style_ids().is_empty());
        prop_assert_eq!(c.document().marker_count(MARKER), 0);
        prop_assert_eq!(c.document().filter_of(el), Some("saturate(2)"));
        prop_assert_eq!(c.document().live_watchers(), 0);
    }
}
