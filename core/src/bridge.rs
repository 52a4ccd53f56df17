//! The protocol bridge.
//!
//! `ImeBridge` sits in the host window's message path. Each raw message is
//! classified, the data it announces is pulled from the [`ImeBackend`], and
//! the composition, candidate and result holders are updated. Subscribers
//! are told about every update; pollers read [`ImeBridge::snapshot`] and
//! [`ImeBridge::take_changes`] once per frame instead.
//!
//! A failed native query never clears state: the previous snapshot stays in
//! place until the next notification supersedes it.

use std::cell::RefCell;
use std::rc::Rc;

use crossbeam_channel::Receiver;

use crate::attributes::CompositionAttribute;
use crate::candidate::CandidateListState;
use crate::composition::{CompositionState, RawComposition};
use crate::config::BridgeConfig;
use crate::context::{Changes, ImeSnapshot};
use crate::error::{ImeError, Result};
use crate::listeners::{ListenerId, Listeners, Subscription};
use crate::native::{
    self, AttributeField, ClauseField, ImeBackend, MessageKind, RawMessage, StringField,
    GCS_COMPSTR,
};
use crate::result::{CharDisposition, RawResult, ResultEmitter, ResultEvent, ResultSnapshot};

/// Enable switch of the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeState {
    Disabled,
    Enabled,
}

/// Notification delivered to subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImeEvent {
    CompositionChanged,
    CandidatesChanged,
    Result(ResultEvent),
    EnabledChanged(bool),
}

/// What the window procedure should do with a message after the bridge saw it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// Consumed; return this value.
    Handled(isize),
    /// Pass this message, possibly rewritten, to the previous handler.
    Forward(RawMessage),
}

/// Bridge between a host window's IME messages and a polled state model.
pub struct ImeBridge<B: ImeBackend> {
    backend: B,
    config: BridgeConfig,
    state: BridgeState,
    composition: CompositionState,
    candidates: CandidateListState,
    emitter: ResultEmitter,
    listeners: Listeners<ImeEvent>,
    changes: Changes,
    disposed: bool,
}

impl<B: ImeBackend> ImeBridge<B> {
    /// Take over `backend` and put the input context in the configured state.
    pub fn new(backend: B, config: BridgeConfig) -> Result<Self> {
        let mut bridge = Self {
            backend,
            emitter: ResultEmitter::new(config.glyphs.clone()),
            config,
            state: BridgeState::Enabled,
            composition: CompositionState::new(),
            candidates: CandidateListState::new(),
            listeners: Listeners::new(),
            changes: Changes::empty(),
            disposed: false,
        };
        if bridge.config.start_enabled {
            bridge.backend.associate_context()?;
        } else {
            bridge.backend.disassociate_context()?;
            bridge.state = BridgeState::Disabled;
        }
        tracing::debug!(state = ?bridge.state, "ime bridge created");
        Ok(bridge)
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn state(&self) -> BridgeState {
        self.state
    }

    pub fn is_enabled(&self) -> bool {
        self.state == BridgeState::Enabled
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// Associate or detach the input context. Setting the current state again
    /// does nothing.
    ///
    /// Composition and candidate state survive a disable but should be
    /// treated as stale until the next update.
    pub fn set_enabled(&mut self, enabled: bool) -> Result<()> {
        if self.disposed {
            return Err(ImeError::Disposed);
        }
        let target = if enabled {
            BridgeState::Enabled
        } else {
            BridgeState::Disabled
        };
        if self.state == target {
            return Ok(());
        }
        if enabled {
            self.backend.associate_context()?;
        } else {
            self.backend.disassociate_context()?;
        }
        self.state = target;
        tracing::debug!(state = ?target, "ime bridge toggled");
        self.notify(ImeEvent::EnabledChanged(enabled));
        Ok(())
    }

    /// Flip the enable switch, returning the new state.
    pub fn toggle_enabled(&mut self) -> Result<bool> {
        let enabled = !self.is_enabled();
        self.set_enabled(enabled)?;
        Ok(enabled)
    }

    pub fn composition(&self) -> &CompositionState {
        &self.composition
    }

    pub fn candidates(&self) -> &CandidateListState {
        &self.candidates
    }

    /// Last committed result string with its reading and clauses.
    pub fn last_result(&self) -> &ResultSnapshot {
        self.emitter.last_result()
    }

    /// Attribute of the composition char at `index`.
    pub fn attribute_at(&self, index: usize) -> Result<CompositionAttribute> {
        self.composition.attribute_at(index)
    }

    /// Attribute of the reading char at `index`.
    pub fn reading_attribute_at(&self, index: usize) -> Result<CompositionAttribute> {
        self.composition.reading_attribute_at(index)
    }

    /// Copy of the current state for the presentation layer.
    pub fn snapshot(&self) -> ImeSnapshot {
        ImeSnapshot {
            enabled: self.is_enabled(),
            composition: self.composition.clone(),
            candidates: self.candidates.clone(),
            last_result: self.emitter.last_result().clone(),
        }
    }

    /// What changed since the previous call.
    pub fn take_changes(&mut self) -> Changes {
        std::mem::take(&mut self.changes)
    }

    /// Register a callback for every [`ImeEvent`].
    pub fn subscribe<F>(&self, callback: F) -> Subscription<ImeEvent>
    where
        F: FnMut(&ImeEvent) + 'static,
    {
        self.listeners.subscribe(callback)
    }

    pub fn unsubscribe(&self, id: ListenerId) {
        self.listeners.unsubscribe(id);
    }

    /// Receive events through a channel instead of a callback.
    ///
    /// The subscription removes itself once the receiver is dropped.
    pub fn subscribe_channel(&self) -> Receiver<ImeEvent> {
        let (tx, rx) = crossbeam_channel::unbounded();
        let handle: Rc<RefCell<Option<Subscription<ImeEvent>>>> = Rc::default();
        let own = handle.clone();
        let subscription = self.listeners.subscribe(move |event: &ImeEvent| {
            if tx.send(*event).is_err() {
                if let Some(subscription) = own.borrow_mut().take() {
                    subscription.cancel();
                }
            }
        });
        *handle.borrow_mut() = Some(subscription);
        rx
    }

    /// Handle one window message and return the value the window procedure
    /// should return. Forwarded messages go to [`ImeBackend::default_handler`].
    pub fn handle_message(&mut self, message: RawMessage) -> isize {
        match self.dispatch(message) {
            Dispatch::Handled(result) => result,
            Dispatch::Forward(message) => self.backend.default_handler(&message),
        }
    }

    /// Update state for one window message and decide what the window
    /// procedure does with it, without calling the previous handler.
    ///
    /// Hosts that share the bridge with their own window procedure use this
    /// (or [`dispatch_shared`]) so the bridge is not borrowed while the
    /// previous handler runs.
    pub fn dispatch(&mut self, message: RawMessage) -> Dispatch {
        let kind = native::classify(&message);
        if self.disposed {
            return Dispatch::Forward(message);
        }
        if kind.is_ime() && !self.is_enabled() {
            tracing::trace!(msg = message.msg, ?kind, "ime disabled, passing through");
            return Dispatch::Forward(message);
        }
        tracing::debug!(msg = message.msg, ?kind, "dispatch");

        match kind {
            MessageKind::Unrecognized => Dispatch::Forward(message),
            MessageKind::WindowClosing => {
                let _ = self.dispose();
                Dispatch::Forward(message)
            }
            MessageKind::SetContext => Dispatch::Forward(
                message.without_default_ui(self.config.show_default_ime_window),
            ),
            MessageKind::CompositionStarted => self.finish(message),
            MessageKind::CompositionChanged => {
                self.refresh_composition();
                self.finish(message)
            }
            MessageKind::CompositionEnded => {
                self.end_composition();
                self.finish(message)
            }
            MessageKind::CandidatesChanged => {
                self.refresh_candidates();
                self.finish(message)
            }
            MessageKind::CandidatesEnded => {
                self.candidates.clear();
                self.notify(ImeEvent::CandidatesChanged);
                self.finish(message)
            }
            MessageKind::ResultReceived => {
                // Consumed here; forwarding would replay the text as char messages
                self.receive_result(message.lparam);
                Dispatch::Handled(0)
            }
            MessageKind::Char(code) => match self.emitter.on_char(code) {
                CharDisposition::Emit(event) => {
                    self.notify(ImeEvent::Result(event));
                    Dispatch::Handled(0)
                }
                CharDisposition::Pending => Dispatch::Handled(0),
                CharDisposition::Ignored => Dispatch::Forward(message),
            },
        }
    }

    /// Restore the window's original handling and release the input context.
    ///
    /// Runs once; later calls return `Ok(())`. A release failure is logged and
    /// returned, but the bridge is considered disposed either way.
    pub fn dispose(&mut self) -> Result<()> {
        if self.disposed {
            return Ok(());
        }
        self.disposed = true;
        self.listeners.clear();
        match self.backend.release() {
            Ok(()) => {
                tracing::debug!("ime bridge disposed");
                Ok(())
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to release input context");
                Err(err)
            }
        }
    }

    fn finish(&self, message: RawMessage) -> Dispatch {
        if self.config.show_default_ime_window {
            Dispatch::Forward(message)
        } else {
            Dispatch::Handled(0)
        }
    }

    fn notify(&mut self, event: ImeEvent) {
        self.changes |= match event {
            ImeEvent::CompositionChanged => Changes::COMPOSITION,
            ImeEvent::CandidatesChanged => Changes::CANDIDATES,
            ImeEvent::Result(_) => Changes::RESULT,
            ImeEvent::EnabledChanged(_) => Changes::ENABLED,
        };
        self.listeners.emit(&event);
    }

    fn refresh_composition(&mut self) {
        match self.query_composition() {
            Ok(raw) => {
                self.composition.on_composition_changed(&raw);
                self.notify(ImeEvent::CompositionChanged);
            }
            Err(err) => tracing::warn!(error = %err, "keeping previous composition"),
        }
    }

    fn query_composition(&mut self) -> Result<RawComposition> {
        let backend = &mut self.backend;
        Ok(RawComposition {
            text: backend.query_composition_buffer(StringField::Composition)?,
            attributes: backend.query_attributes(AttributeField::Composition)?,
            clauses: backend.query_clauses(ClauseField::Composition)?,
            reading: backend.query_composition_buffer(StringField::CompositionReading)?,
            reading_attributes: backend.query_attributes(AttributeField::CompositionReading)?,
            reading_clauses: backend.query_clauses(ClauseField::CompositionReading)?,
            cursor: backend.query_cursor_position()?,
        })
    }

    fn end_composition(&mut self) {
        self.composition.on_composition_ended();
        self.notify(ImeEvent::CompositionChanged);
        self.candidates.clear();
        self.notify(ImeEvent::CandidatesChanged);
    }

    fn refresh_candidates(&mut self) {
        let decoded = self
            .backend
            .query_candidates()
            .and_then(|blob| native::decode_candidate_list(&blob));
        match decoded {
            Ok(raw) if raw.items.is_empty() => {
                self.candidates.clear();
                self.notify(ImeEvent::CandidatesChanged);
            }
            Ok(raw) => {
                self.candidates.on_candidates_changed(&raw);
                self.notify(ImeEvent::CandidatesChanged);
            }
            Err(err) => tracing::warn!(error = %err, "keeping previous candidate list"),
        }
    }

    fn receive_result(&mut self, flags: isize) {
        let raw = match self.query_result() {
            Ok(raw) => raw,
            Err(err) => {
                tracing::warn!(error = %err, "dropping result notification");
                return;
            }
        };

        self.composition.on_composition_ended();
        self.notify(ImeEvent::CompositionChanged);

        for event in self.emitter.on_result_received(&raw) {
            self.notify(ImeEvent::Result(event));
        }

        if flags & GCS_COMPSTR != 0 {
            self.refresh_composition();
        }
    }

    fn query_result(&mut self) -> Result<RawResult> {
        let backend = &mut self.backend;
        Ok(RawResult {
            text: backend.query_result()?,
            reading: backend.query_composition_buffer(StringField::ResultReading)?,
            clauses: backend.query_clauses(ClauseField::Result)?,
            reading_clauses: backend.query_clauses(ClauseField::ResultReading)?,
        })
    }
}

/// Route a message through a bridge shared with the host window procedure.
///
/// The bridge is borrowed only while it decides; `forward` (the previous
/// handler) runs after the borrow is released, so the application's own
/// handlers may read or toggle the bridge. A message that arrives while the
/// bridge is already borrowed, e.g. the `WM_IME_SETCONTEXT` sent from inside
/// [`ImeBridge::set_enabled`], skips the bridge but still has the default IME
/// window bits cleared according to `show_default_ime_window`.
pub fn dispatch_shared<B, F>(
    bridge: &RefCell<ImeBridge<B>>,
    message: RawMessage,
    show_default_ime_window: bool,
    forward: F,
) -> isize
where
    B: ImeBackend,
    F: FnOnce(&RawMessage) -> isize,
{
    let decision = match bridge.try_borrow_mut() {
        Ok(mut bridge) => bridge.dispatch(message),
        Err(_) => {
            tracing::trace!(msg = message.msg, "bridge busy, forwarding");
            Dispatch::Forward(message.without_default_ui(show_default_ime_window))
        }
    };
    match decision {
        Dispatch::Handled(result) => result,
        Dispatch::Forward(message) => forward(&message),
    }
}

impl<B: ImeBackend> Drop for ImeBridge<B> {
    fn drop(&mut self) {
        let _ = self.dispose();
    }
}

impl<B: ImeBackend> std::fmt::Debug for ImeBridge<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImeBridge")
            .field("state", &self.state)
            .field("composition", &self.composition)
            .field("candidates", &self.candidates)
            .field("disposed", &self.disposed)
            .finish()
    }
}
