#![forbid(unsafe_code)]

//! Host-driven theme controller for spotlite.
//!
//! # Role in spotlite
//! `spotlite-core` is the page-side state machine. It decides which styles
//! are injected, which elements get an inline filter correction, when the
//! body observer runs and when system color-scheme changes are followed.
//! It never reaches the DOM, timers or the extension APIs directly: a host
//! (the browser shim in `spotlite-web`, or [`memory`] in tests) implements
//! [`Document`] and [`ColorSchemeSource`], pushes events in, and drives time.
//!
//! # Primary responsibilities
//! - **Controller**: [`Controller`] owns theme state and every live resource.
//! - **Scheduling**: [`scheduler`] holds the debounce/settle timers and the
//!   next-frame flag on a deterministic clock.
//! - **Protocol**: [`protocol`] and [`prefs`] decode settings commands, store
//!   reads and store change notifications.
//! - **Settings helpers**: [`broadcast`] and [`icon`] cover the settings
//!   side of a change.
//!
//! # Example
//! ```
//! use spotlite_core::memory::{MemoryColorScheme, MemoryDocument};
//! use spotlite_core::{Controller, Preferences};
//!
//! let mut controller = Controller::new(MemoryDocument::new(), MemoryColorScheme::new(false));
//! controller.startup(Ok(Preferences::default()));
//! assert_eq!(controller.current_theme(), "light");
//! assert!(controller.is_observing());
//! ```

pub mod broadcast;
pub mod config;
pub mod controller;
pub mod document;
pub mod error;
pub mod icon;
pub mod memory;
pub mod prefs;
pub mod protocol;
pub mod scheduler;
pub mod system_theme;
pub mod watcher;

pub use config::ControllerConfig;
pub use controller::{Controller, ControllerStats};
pub use document::{ColorSchemeSource, Document, MutationRecord, SubscriptionId, WatchId};
pub use error::{ApplyError, DomError, ProtocolError, StoreError};
pub use prefs::{Preferences, StoreChanges};
pub use protocol::{Dispatch, FollowUp, InboundMessage, Reply};
pub use scheduler::TaskKind;

pub use spotlite_theme::{ThemeDefinition, ThemeRegistry};
