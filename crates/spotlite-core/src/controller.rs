#![forbid(unsafe_code)]

//! The theme controller.
//!
//! One [`Controller`] exists per page. It owns the current theme, the two
//! injected style elements, the background-image watcher, the system
//! color-scheme subscription and the pending timers, and it is the only
//! thing that mutates the page.
//!
//! # Lifecycle
//!
//! ```text
//!   startup(prefs) ──► apply_theme(name) ──► filtered theme installed
//!                            │                  │  watcher live
//!                            │                  │  correction on next frame
//!                            ▼                  ▼
//!                      apply_theme("dark") ─► neutral styles, watcher off,
//!                                             corrections stripped,
//!                                             styles deleted after settle
//!   disable() ─► everything released immediately
//! ```
//!
//! # Host duties
//!
//! The host pushes events in (`on_mutations`, `on_system_scheme_changed`,
//! `on_store_changed`, `handle_message`), drives time with `advance_time`
//! (or `advance_to`), and calls `on_animation_frame` when
//! [`Controller::needs_frame`] is set. Nothing here blocks.

use core::time::Duration;

use spotlite_theme::css::{theme_stylesheet, neutral_stylesheet, transition_stylesheet};
use spotlite_theme::filter::{compose_filter, strip_fragments};
use spotlite_theme::{DARK, LIGHT, ThemeDefinition, ThemeRegistry};

use crate::config::ControllerConfig;
use crate::document::{ColorSchemeSource, Document, MutationRecord};
use crate::error::{ApplyError, DomError, StoreError};
use crate::prefs::{Preferences, StoreChanges};
use crate::protocol::{Dispatch, FollowUp, InboundMessage, Reply};
use crate::scheduler::{TaskKind, TaskScheduler};
use crate::system_theme::{SystemThemeSync, theme_for_system};
use crate::watcher::{BackgroundWatcher, is_relevant_batch};

/// Counters for host instrumentation and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ControllerStats {
    /// Correction passes that found work.
    pub correction_passes: u64,
    /// Elements corrected across all passes.
    pub elements_corrected: u64,
    /// Mutation batches delivered while observing.
    pub mutation_batches: u64,
    /// Batches that scheduled a debounced correction.
    pub relevant_batches: u64,
    /// Times the settle delay deleted the styles.
    pub style_removals: u64,
}

/// Theme controller for one page.
#[derive(Debug)]
pub struct Controller<D: Document, C: ColorSchemeSource> {
    document: D,
    color_scheme: C,
    registry: ThemeRegistry,
    config: ControllerConfig,
    current_theme: String,
    use_system_theme: bool,
    /// Theme whose media filter the currently marked elements carry.
    corrected_with: Option<String>,
    watcher: BackgroundWatcher,
    system: SystemThemeSync,
    scheduler: TaskScheduler,
    stats: ControllerStats,
}

impl<D: Document, C: ColorSchemeSource> Controller<D, C> {
    /// Controller with the built-in themes and default config.
    pub fn new(document: D, color_scheme: C) -> Self {
        Self::with_parts(
            document,
            color_scheme,
            ThemeRegistry::builtin(),
            ControllerConfig::default(),
        )
    }

    /// Controller with an explicit registry and config.
    ///
    /// The page starts in its native state, which is the identity theme.
    pub fn with_parts(
        document: D,
        color_scheme: C,
        registry: ThemeRegistry,
        config: ControllerConfig,
    ) -> Self {
        Self {
            document,
            color_scheme,
            registry,
            config: config.validated(),
            current_theme: DARK.to_owned(),
            use_system_theme: false,
            corrected_with: None,
            watcher: BackgroundWatcher::new(),
            system: SystemThemeSync::new(),
            scheduler: TaskScheduler::new(),
            stats: ControllerStats::default(),
        }
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    /// Name of the active theme.
    #[must_use]
    pub fn current_theme(&self) -> &str {
        &self.current_theme
    }

    /// Whether system theme mode is on.
    #[must_use]
    pub fn use_system_theme(&self) -> bool {
        self.use_system_theme
    }

    /// Whether the background watcher is live.
    #[must_use]
    pub fn is_observing(&self) -> bool {
        self.watcher.is_observing()
    }

    /// Whether the system color-scheme subscription is live.
    #[must_use]
    pub fn is_following_system(&self) -> bool {
        self.system.is_subscribed()
    }

    /// Instrumentation counters.
    #[must_use]
    pub fn stats(&self) -> ControllerStats {
        self.stats
    }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    /// Theme registry.
    #[must_use]
    pub fn registry(&self) -> &ThemeRegistry {
        &self.registry
    }

    /// Host document.
    #[must_use]
    pub fn document(&self) -> &D {
        &self.document
    }

    /// Host document, mutably (hosts simulating page activity).
    pub fn document_mut(&mut self) -> &mut D {
        &mut self.document
    }

    /// Color-scheme source.
    #[must_use]
    pub fn color_scheme(&self) -> &C {
        &self.color_scheme
    }

    /// Color-scheme source, mutably.
    pub fn color_scheme_mut(&mut self) -> &mut C {
        &mut self.color_scheme
    }

    /// Whether work is waiting for the next animation frame.
    #[must_use]
    pub fn needs_frame(&self) -> bool {
        self.scheduler.is_paint_pending()
    }

    /// Time until the next timer fires, if any is pending.
    #[must_use]
    pub fn next_wakeup(&self) -> Option<Duration> {
        self.scheduler.time_until_next()
    }

    /// Whether a timer of `kind` is pending.
    #[must_use]
    pub fn is_pending(&self, kind: TaskKind) -> bool {
        self.scheduler.is_pending(kind)
    }

    // ------------------------------------------------------------------
    // Startup and preferences
    // ------------------------------------------------------------------

    /// Apply the stored preferences on content-script attachment.
    ///
    /// A failed read falls back to the default preferences rather than
    /// leaving the page unthemed.
    pub fn startup(&mut self, prefs: Result<Preferences, StoreError>) {
        let prefs = resolve_prefs(prefs);
        tracing::info!(
            theme = %prefs.selected_theme,
            use_system_theme = prefs.use_system_theme,
            "content script attached"
        );
        if prefs.use_system_theme {
            if let Err(err) = self.set_use_system_theme(true) {
                tracing::warn!(%err, "system theme mode could not start");
                if !self.use_system_theme {
                    self.apply_preferred_theme(&prefs.selected_theme);
                }
            }
        } else {
            self.apply_preferred_theme(&prefs.selected_theme);
        }
    }

    /// Finish leaving system mode with freshly read preferences.
    ///
    /// Ignored if system mode was re-entered while the read was in flight.
    pub fn restore_manual_theme(&mut self, prefs: Result<Preferences, StoreError>) {
        if self.use_system_theme {
            tracing::debug!("system theme re-enabled before restore completed, skipping");
            return;
        }
        let prefs = resolve_prefs(prefs);
        tracing::info!(theme = %prefs.selected_theme, "restoring manual theme");
        self.apply_preferred_theme(&prefs.selected_theme);
    }

    /// React to a store change notification.
    pub fn on_store_changed(&mut self, changes: &StoreChanges) -> Option<FollowUp> {
        if let Some(enabled) = changes.use_system_theme
            && enabled != self.use_system_theme
        {
            return match self.set_use_system_theme(enabled) {
                Ok(Some(FollowUp::ReloadManualTheme)) => match &changes.selected_theme {
                    Some(theme) => {
                        self.apply_preferred_theme(theme);
                        None
                    }
                    None => Some(FollowUp::ReloadManualTheme),
                },
                Ok(follow_up) => follow_up,
                Err(err) => {
                    tracing::warn!(%err, "store change could not toggle system theme mode");
                    None
                }
            };
        }
        if self.use_system_theme {
            return None;
        }
        let requested = match (&changes.selected_theme, changes.light_mode_enabled) {
            (Some(theme), _) => theme.as_str(),
            (None, Some(true)) => LIGHT,
            (None, Some(false)) => DARK,
            (None, None) => return None,
        };
        if requested != self.current_theme {
            if let Err(err) = self.apply_theme(requested) {
                tracing::warn!(%err, theme = requested, "store change not applied");
            }
        }
        None
    }

    fn apply_preferred_theme(&mut self, name: &str) {
        let name = if self.registry.contains(name) {
            name
        } else {
            tracing::warn!(theme = name, fallback = LIGHT, "stored theme is unknown");
            LIGHT
        };
        if let Err(err) = self.apply_theme(name) {
            tracing::warn!(%err, theme = name, "preferred theme not applied");
        }
    }

    // ------------------------------------------------------------------
    // Theme application
    // ------------------------------------------------------------------

    /// Apply a theme by name.
    ///
    /// Unknown names change nothing. When the head is missing the theme is
    /// still recorded as current but the DOM write is skipped.
    pub fn apply_theme(&mut self, name: &str) -> Result<(), ApplyError> {
        let Some(theme) = self.registry.get(name).cloned() else {
            tracing::warn!(theme = name, "unknown theme, ignoring");
            return Err(ApplyError::UnknownTheme(name.to_owned()));
        };

        // A settle delay from an earlier switch must never delete styles
        // that belong to this application.
        if self.scheduler.cancel(TaskKind::StyleSettle) {
            tracing::debug!("pending style removal cancelled");
        }

        let previous = std::mem::replace(&mut self.current_theme, theme.name().to_owned());
        tracing::info!(theme = theme.name(), %previous, "applying theme");

        if !self.document.has_head() {
            tracing::warn!(theme = theme.name(), "document head not ready, styles not injected");
            return Err(DomError::HeadUnavailable.into());
        }

        if theme.is_identity() {
            self.remove_theme_styles()
        } else {
            self.install_theme_styles(&theme)
        }
    }

    fn install_theme_styles(&mut self, theme: &ThemeDefinition) -> Result<(), ApplyError> {
        let transition_css = transition_stylesheet(self.config.transition);
        if !self.document.style_element_exists(&self.config.transition_style_id) {
            self.document
                .upsert_style_element(&self.config.transition_style_id, &transition_css)?;
        }
        self.document
            .upsert_style_element(&self.config.style_id, &theme_stylesheet(theme))?;

        if self
            .corrected_with
            .as_deref()
            .is_some_and(|corrected| corrected != theme.name())
        {
            self.remove_background_corrections();
        }
        self.request_correction();

        match self.watcher.ensure(&mut self.document) {
            Ok(true) => tracing::debug!(theme = theme.name(), "observing background images"),
            Ok(false) => {}
            Err(err) => tracing::warn!(%err, "background watcher not started"),
        }
        Ok(())
    }

    fn remove_theme_styles(&mut self) -> Result<(), ApplyError> {
        self.watcher.stop(&mut self.document);
        self.scheduler.cancel(TaskKind::CorrectionDebounce);
        self.scheduler.cancel_paint();
        self.remove_background_corrections();

        let has_theme = self.document.style_element_exists(&self.config.style_id);
        let has_transition = self
            .document
            .style_element_exists(&self.config.transition_style_id);
        if has_theme {
            self.document
                .upsert_style_element(&self.config.style_id, &neutral_stylesheet())?;
        }
        if has_theme || has_transition {
            self.scheduler
                .schedule(TaskKind::StyleSettle, self.config.settle_delay);
        }
        Ok(())
    }

    fn delete_styles(&mut self) {
        let theme = self.document.remove_style_element(&self.config.style_id);
        let transition = self
            .document
            .remove_style_element(&self.config.transition_style_id);
        if theme || transition {
            self.stats.style_removals += 1;
            tracing::info!("theme styles removed");
        }
    }

    // ------------------------------------------------------------------
    // Background-image correction
    // ------------------------------------------------------------------

    /// Queue a correction pass for the next frame if anything needs one.
    fn request_correction(&mut self) -> bool {
        let pending = self
            .document
            .background_image_elements(&self.config.marker_class);
        if pending.is_empty() {
            return false;
        }
        if self.scheduler.request_paint() {
            tracing::debug!(candidates = pending.len(), "correction pass requested");
        }
        true
    }

    /// Layer the current theme's media filter onto every unmarked
    /// background-image element and mark it. Returns the number corrected.
    ///
    /// Reads the theme at run time, so a pass scheduled under one theme and
    /// run under another corrects for the latter.
    pub fn correct_background_images(&mut self) -> usize {
        let Some(theme) = self.registry.get(&self.current_theme).cloned() else {
            return 0;
        };
        if theme.is_identity() {
            return 0;
        }
        let marker = self.config.marker_class.clone();
        let elements = self.document.background_image_elements(&marker);
        if elements.is_empty() {
            return 0;
        }
        for element in &elements {
            let existing = self.document.inline_filter(element);
            let composed = compose_filter(&existing, theme.media_filter());
            self.document.set_inline_filter(element, &composed);
            self.document.add_marker(element, &marker);
        }
        self.corrected_with = Some(theme.name().to_owned());
        self.stats.correction_passes += 1;
        self.stats.elements_corrected += elements.len() as u64;
        tracing::debug!(theme = theme.name(), corrected = elements.len(), "correction pass");
        elements.len()
    }

    /// Strip the fragments this controller added from every marked element
    /// and unmark it. Returns the number of elements restored.
    pub fn remove_background_corrections(&mut self) -> usize {
        let marker = self.config.marker_class.clone();
        let elements = self.document.marked_elements(&marker);
        let known = self
            .corrected_with
            .take()
            .and_then(|name| self.registry.get(&name))
            .map(|theme| theme.media_filter().to_owned());
        // Without a record of what was added (markers left by an earlier
        // instance), any registered media filter may be ours.
        let fragments: Vec<String> = match known {
            Some(fragment) => vec![fragment],
            None => self
                .registry
                .media_fragments()
                .into_iter()
                .map(str::to_owned)
                .collect(),
        };
        for element in &elements {
            self.document.remove_marker(element, &marker);
            let existing = self.document.inline_filter(element);
            let remaining = strip_fragments(&existing, fragments.iter().map(String::as_str));
            if remaining.is_empty() {
                self.document.remove_inline_filter(element);
            } else {
                self.document.set_inline_filter(element, &remaining);
            }
        }
        if !elements.is_empty() {
            tracing::debug!(restored = elements.len(), "background corrections removed");
        }
        elements.len()
    }

    /// Feed one mutation batch from the body observer.
    pub fn on_mutations(&mut self, records: &[MutationRecord<D::Element>]) {
        if !self.watcher.is_observing() {
            tracing::trace!("mutation batch after disconnect, ignoring");
            return;
        }
        self.stats.mutation_batches += 1;
        if !is_relevant_batch(&self.document, &self.config.marker_class, records) {
            return;
        }
        self.stats.relevant_batches += 1;
        self.scheduler
            .schedule(TaskKind::CorrectionDebounce, self.config.debounce);
    }

    // ------------------------------------------------------------------
    // System theme mode
    // ------------------------------------------------------------------

    /// Enter or leave system theme mode.
    ///
    /// Entering subscribes (replacing any live subscription) and applies
    /// the theme for the current preference. Leaving unsubscribes and asks
    /// the host to re-read the manual theme from the store.
    pub fn set_use_system_theme(&mut self, enabled: bool) -> Result<Option<FollowUp>, ApplyError> {
        if enabled {
            // A failed install has already dropped any previous subscription.
            if let Err(err) = self.system.install(&mut self.color_scheme) {
                self.use_system_theme = false;
                return Err(err.into());
            }
            self.use_system_theme = true;
            let prefers_dark = self.color_scheme.prefers_dark();
            tracing::info!(prefers_dark, "system theme mode on");
            self.apply_theme(theme_for_system(prefers_dark))?;
            return Ok(None);
        }
        let was_enabled = std::mem::replace(&mut self.use_system_theme, false);
        self.system.remove(&mut self.color_scheme);
        if was_enabled {
            tracing::info!("system theme mode off");
            Ok(Some(FollowUp::ReloadManualTheme))
        } else {
            Ok(None)
        }
    }

    /// React to a system color-scheme change.
    pub fn on_system_scheme_changed(&mut self, prefers_dark: bool) {
        if !self.use_system_theme || !self.system.is_subscribed() {
            tracing::debug!(prefers_dark, "system scheme change outside system mode, ignoring");
            return;
        }
        let theme = theme_for_system(prefers_dark);
        if let Err(err) = self.apply_theme(theme) {
            tracing::warn!(%err, theme, "system theme not applied");
        }
    }

    // ------------------------------------------------------------------
    // Messages
    // ------------------------------------------------------------------

    /// Handle a command from the settings UI.
    ///
    /// Returns `None` for unrecognised commands, which get no reply.
    pub fn handle_message(&mut self, message: InboundMessage) -> Option<Dispatch> {
        let dispatch = match message {
            InboundMessage::ToggleLightMode { enabled } => {
                let result = self.apply_theme(if enabled { LIGHT } else { DARK });
                Dispatch::reply(Reply::from_result(&result))
            }
            InboundMessage::ChangeTheme { theme } => {
                if !self.registry.contains(&theme) {
                    tracing::warn!(theme = %theme, "changeTheme with unknown theme");
                    Dispatch::reply(Reply::failure(ApplyError::UnknownTheme(theme)))
                } else if self.use_system_theme {
                    tracing::debug!(theme = %theme, "system theme mode active, manual theme stored only");
                    Dispatch::reply(Reply::ok())
                } else {
                    let result = self.apply_theme(&theme);
                    Dispatch::reply(Reply::from_result(&result))
                }
            }
            InboundMessage::UpdateSystemThemePreference { use_system_theme } => {
                match self.set_use_system_theme(use_system_theme) {
                    Ok(follow_up) => Dispatch {
                        reply: Reply::ok(),
                        follow_up,
                    },
                    Err(err) => Dispatch::reply(Reply::failure(err)),
                }
            }
            InboundMessage::Unrecognized => return None,
        };
        if let Some(error) = &dispatch.reply.error {
            tracing::warn!(%error, "command failed");
        }
        Some(dispatch)
    }

    // ------------------------------------------------------------------
    // Time
    // ------------------------------------------------------------------

    /// Advance host time by `dt` and run due timers.
    pub fn advance_time(&mut self, dt: Duration) {
        let due = self.scheduler.advance(dt);
        self.run_due(due);
    }

    /// Move host time to `now` and run due timers.
    pub fn advance_to(&mut self, now: Duration) {
        let due = self.scheduler.advance_to(now);
        self.run_due(due);
    }

    /// Run work deferred to the next paint.
    pub fn on_animation_frame(&mut self) {
        if self.scheduler.take_paint() {
            self.correct_background_images();
        }
    }

    fn run_due(&mut self, due: Vec<TaskKind>) {
        for kind in due {
            match kind {
                TaskKind::CorrectionDebounce => {
                    if self.watcher.is_observing() {
                        self.request_correction();
                    }
                }
                TaskKind::StyleSettle => self.delete_styles(),
            }
        }
    }

    // ------------------------------------------------------------------
    // Teardown
    // ------------------------------------------------------------------

    /// Release the watcher, the system subscription, all timers, all
    /// corrections and both style elements, leaving the page native.
    ///
    /// The controller stays usable; a later `apply_theme` starts fresh.
    pub fn disable(&mut self) {
        self.watcher.stop(&mut self.document);
        self.system.remove(&mut self.color_scheme);
        self.scheduler.cancel_all();
        self.remove_background_corrections();
        self.delete_styles();
        self.use_system_theme = false;
        self.current_theme = DARK.to_owned();
        tracing::info!("theme controller disabled");
    }
}

fn resolve_prefs(prefs: Result<Preferences, StoreError>) -> Preferences {
    prefs.unwrap_or_else(|err| {
        tracing::warn!(%err, fallback = LIGHT, "preference read failed, using defaults");
        Preferences::default()
    })
}
