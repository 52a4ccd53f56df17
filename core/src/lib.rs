//! imebridge-core
//!
//! Bridges a host window's Input Method Editor protocol into typed state and
//! discrete events for applications that draw their own text UI.
//!
//! The bridge consumes the output of the OS input method; it does no
//! dictionary lookup, shaping or rendering of its own.
//!
//! Public API:
//! - `ImeBridge` - Classifies raw window messages, queries the backend and
//!   updates state; owns the enable switch and disposal
//! - `ImeBackend` - Narrow query interface to the host input context
//! - `CompositionState` - Uncommitted text, reading, caret, attributes, clauses
//! - `CandidateListState` - Candidates with host-supplied paging
//! - `ResultEvent` - Committed chars and control signals
//! - `ImeSnapshot` / `Changes` - What a per-frame poller reads
//! - `CommitBuffer` - Application-side accumulation of committed text
//! - `BridgeConfig` - Configuration (TOML)
//! - `SyntheticBackend` - Scripted backend for tests and replays
//!
//! ```
//! use imebridge_core::native::{RawMessage, GCS_COMPOSITION_ALL};
//! use imebridge_core::{BridgeConfig, CompositionAttribute, ImeBridge, SyntheticBackend};
//!
//! let mut bridge = ImeBridge::new(SyntheticBackend::new(), BridgeConfig::default()).unwrap();
//! bridge.backend_mut().set_composition(
//!     "你h",
//!     &[CompositionAttribute::Converted, CompositionAttribute::Input],
//!     &[0, 1, 2],
//!     2,
//! );
//! bridge.handle_message(RawMessage::composition(GCS_COMPOSITION_ALL));
//! assert_eq!(bridge.composition().text(), "你h");
//! assert_eq!(bridge.attribute_at(1).unwrap(), CompositionAttribute::Input);
//! ```

pub mod attributes;
pub use attributes::{decode_attribute, CompositionAttribute};

pub mod composition;
pub use composition::{CompositionState, RawComposition};

pub mod candidate;
pub use candidate::{page_range, CandidateListState, RawCandidateList};

pub mod result;
pub use result::{ControlSignal, GlyphPolicy, ResultEmitter, ResultEvent, ResultSnapshot};

pub mod commit_buffer;
pub use commit_buffer::CommitBuffer;

pub mod native;
pub use native::{ImeBackend, MessageKind, RawMessage};

pub mod listeners;
pub use listeners::{ListenerId, Listeners, Subscription};

pub mod context;
pub use context::{Changes, ImeSnapshot};

pub mod bridge;
pub use bridge::{dispatch_shared, BridgeState, Dispatch, ImeBridge, ImeEvent};

pub mod config;
pub use config::BridgeConfig;

pub mod error;
pub use error::{ImeError, Result};

pub mod synthetic;
pub use synthetic::SyntheticBackend;

#[cfg(windows)]
pub mod win32;
