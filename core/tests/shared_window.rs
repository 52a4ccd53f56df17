// core/tests/shared_window.rs
//
// Integration tests for a bridge shared with the host window procedure.
//
// Tests cover:
// - Application handlers reading the bridge while a message is forwarded
// - Toggling the bridge from a forwarded key message (hotkey)
// - Context messages sent while the bridge is busy keep the OS IME window hidden
// - Window close through the shared path

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use imebridge_core::native::{
    AttributeField, ClauseField, RawMessage, StringField, GCS_COMPOSITION_ALL, ISC_SHOWUIALL,
    WM_IME_SETCONTEXT,
};
use imebridge_core::{dispatch_shared, BridgeConfig, Dispatch, ImeBackend, ImeBridge};

const WM_PAINT: u32 = 0x000F;
const WM_KEYDOWN: u32 = 0x0100;
const VK_F1: usize = 0x70;

type SharedBridge = Rc<RefCell<ImeBridge<HostWindow>>>;
type Log = Rc<RefCell<Vec<RawMessage>>>;

/// Window whose procedure the bridge wraps. Associating the input context
/// sends `WM_IME_SETCONTEXT` back through the bridge synchronously.
#[derive(Default)]
struct HostWindow {
    bridge: Weak<RefCell<ImeBridge<HostWindow>>>,
    show_default_ime_window: bool,
    forwarded: Log,
}

impl ImeBackend for HostWindow {
    fn query_composition_buffer(&mut self, _field: StringField) -> imebridge_core::Result<Vec<u16>> {
        Ok(Vec::new())
    }

    fn query_attributes(&mut self, _field: AttributeField) -> imebridge_core::Result<Vec<u8>> {
        Ok(Vec::new())
    }

    fn query_clauses(&mut self, _field: ClauseField) -> imebridge_core::Result<Vec<u32>> {
        Ok(Vec::new())
    }

    fn query_cursor_position(&mut self) -> imebridge_core::Result<u32> {
        Ok(0)
    }

    fn query_candidates(&mut self) -> imebridge_core::Result<Vec<u8>> {
        Ok(Vec::new())
    }

    fn associate_context(&mut self) -> imebridge_core::Result<()> {
        if let Some(bridge) = self.bridge.upgrade() {
            let forwarded = self.forwarded.clone();
            dispatch_shared(
                &bridge,
                RawMessage::set_context(true, ISC_SHOWUIALL),
                self.show_default_ime_window,
                |message| {
                    forwarded.borrow_mut().push(*message);
                    0
                },
            );
        }
        Ok(())
    }

    fn disassociate_context(&mut self) -> imebridge_core::Result<()> {
        Ok(())
    }

    fn default_handler(&mut self, message: &RawMessage) -> isize {
        self.forwarded.borrow_mut().push(*message);
        0
    }

    fn release(&mut self) -> imebridge_core::Result<()> {
        Ok(())
    }
}

fn attach(config: BridgeConfig) -> (SharedBridge, Log) {
    let forwarded = Log::default();
    let window = HostWindow {
        show_default_ime_window: config.show_default_ime_window,
        forwarded: forwarded.clone(),
        ..HostWindow::default()
    };
    let bridge = Rc::new(RefCell::new(ImeBridge::new(window, config).unwrap()));
    bridge.borrow_mut().backend_mut().bridge = Rc::downgrade(&bridge);
    (bridge, forwarded)
}

/// Deliver a message the way the window subclass does; `app` is the
/// application's own window procedure.
fn send<F>(bridge: &SharedBridge, message: RawMessage, app: F) -> isize
where
    F: FnOnce(&RawMessage) -> isize,
{
    let show_default = bridge.borrow().config().show_default_ime_window;
    dispatch_shared(bridge, message, show_default, app)
}

fn press_f1(bridge: &SharedBridge) {
    send(bridge, RawMessage::new(WM_KEYDOWN, VK_F1, 0), |message| {
        if message.msg == WM_KEYDOWN && message.wparam == VK_F1 {
            bridge.borrow_mut().toggle_enabled().unwrap();
        }
        0
    });
}

#[test]
fn test_app_reads_bridge_while_painting() {
    let (bridge, _) = attach(BridgeConfig::default());

    let mut painted = None;
    let result = send(&bridge, RawMessage::new(WM_PAINT, 0, 0), |_| {
        painted = bridge.try_borrow().ok().map(|b| b.snapshot().enabled);
        7
    });

    assert_eq!(painted, Some(true));
    assert_eq!(result, 7);
}

#[test]
fn test_hotkey_toggle_from_app_handler() {
    let (bridge, forwarded) = attach(BridgeConfig::default());

    press_f1(&bridge);
    assert!(!bridge.borrow().is_enabled());

    press_f1(&bridge);
    assert!(bridge.borrow().is_enabled());

    // Re-association sent a context message while the bridge was busy
    let contexts: Vec<RawMessage> = forwarded
        .borrow()
        .iter()
        .filter(|m| m.msg == WM_IME_SETCONTEXT)
        .copied()
        .collect();
    assert_eq!(contexts.len(), 1);
    assert_eq!(contexts[0].lparam & ISC_SHOWUIALL, 0);
}

#[test]
fn test_busy_context_message_keeps_flags_when_os_window_shown() {
    let config = BridgeConfig {
        show_default_ime_window: true,
        start_enabled: false,
        ..BridgeConfig::default()
    };
    let (bridge, forwarded) = attach(config);

    press_f1(&bridge);
    assert!(bridge.borrow().is_enabled());
    assert_eq!(forwarded.borrow()[0].lparam, ISC_SHOWUIALL);
}

#[test]
fn test_idle_context_message_is_stripped() {
    let (bridge, _) = attach(BridgeConfig::default());

    let mut seen = None;
    send(&bridge, RawMessage::set_context(true, ISC_SHOWUIALL | 0x10), |message| {
        seen = Some(message.lparam);
        0
    });
    assert_eq!(seen, Some(0x10));
}

#[test]
fn test_ime_messages_are_not_forwarded_when_handled() {
    let (bridge, _) = attach(BridgeConfig::default());

    let mut called = false;
    let result = send(&bridge, RawMessage::composition(GCS_COMPOSITION_ALL), |_| {
        called = true;
        1
    });
    assert_eq!(result, 0);
    assert!(!called);

    assert_eq!(
        bridge.borrow_mut().dispatch(RawMessage::new(WM_PAINT, 0, 0)),
        Dispatch::Forward(RawMessage::new(WM_PAINT, 0, 0))
    );
}

#[test]
fn test_window_close_through_shared_path() {
    let (bridge, _) = attach(BridgeConfig::default());

    let mut disposed_before_app = None;
    send(&bridge, RawMessage::destroy(), |_| {
        disposed_before_app = bridge.try_borrow().ok().map(|b| b.is_disposed());
        0
    });
    assert_eq!(disposed_before_app, Some(true));
}
