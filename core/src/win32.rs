//! IMM32 backend.
//!
//! [`attach`] subclasses a window so its IME messages reach an
//! [`ImeBridge`]. Queries go through `ImmGetCompositionStringW` and
//! `ImmGetCandidateListW`; enabling and disabling swap the window's input
//! context with `ImmAssociateContext`. Releasing the bridge removes the
//! subclass and re-associates the original context.

use std::cell::RefCell;
use std::ffi::c_void;
use std::rc::{Rc, Weak};

use windows::Win32::Foundation::{HWND, LPARAM, LRESULT, WPARAM};
use windows::Win32::Globalization::HIMC;
use windows::Win32::UI::Input::Ime::{
    ImmAssociateContext, ImmGetCandidateListW, ImmGetCompositionStringW, ImmGetContext,
    ImmReleaseContext, CANDIDATELIST, IME_COMPOSITION_STRING,
};
use windows::Win32::UI::Shell::{DefSubclassProc, RemoveWindowSubclass, SetWindowSubclass};

use crate::bridge::{dispatch_shared, ImeBridge};
use crate::candidate::RawCandidateList;
use crate::config::BridgeConfig;
use crate::error::{ImeError, Result};
use crate::native::{self, AttributeField, ClauseField, ImeBackend, RawMessage, StringField};
use crate::native::GCS_CURSORPOS;

const SUBCLASS_ID: usize = 0x494D_4542;
const IMM_ERROR_NODATA: i32 = -1;

/// Shared handle to a bridge installed on a window.
pub type Win32Bridge = Rc<RefCell<ImeBridge<Imm32Backend>>>;

/// Per-window data handed to the subclass procedure.
///
/// `show_default_ime_window` is copied out of the config so messages that
/// arrive while the bridge is borrowed can still be filtered.
struct SubclassData {
    bridge: Weak<RefCell<ImeBridge<Imm32Backend>>>,
    show_default_ime_window: bool,
}

/// Backend bound to one window.
pub struct Imm32Backend {
    hwnd: HWND,
    original: HIMC,
    subclass: *mut SubclassData,
}

/// Input context borrowed for the duration of one query.
struct ContextGuard {
    hwnd: HWND,
    himc: HIMC,
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        unsafe {
            let _ = ImmReleaseContext(self.hwnd, self.himc);
        }
    }
}

impl Imm32Backend {
    fn context(&self, query: &'static str) -> Result<ContextGuard> {
        let himc = unsafe { ImmGetContext(self.hwnd) };
        if himc.is_invalid() {
            return Err(ImeError::query(query, "window has no input context"));
        }
        Ok(ContextGuard {
            hwnd: self.hwnd,
            himc,
        })
    }

    fn read_bytes(&self, query: &'static str, index: isize) -> Result<Vec<u8>> {
        let ctx = self.context(query)?;
        let index = IME_COMPOSITION_STRING(index as u32);
        let len = unsafe { ImmGetCompositionStringW(ctx.himc, index, None, 0) };
        if len == IMM_ERROR_NODATA || len == 0 {
            return Ok(Vec::new());
        }
        if len < 0 {
            return Err(ImeError::query(query, format!("ImmGetCompositionStringW returned {}", len)));
        }
        let mut buf = vec![0u8; len as usize];
        let read = unsafe {
            ImmGetCompositionStringW(ctx.himc, index, Some(buf.as_mut_ptr().cast::<c_void>()), len as u32)
        };
        if read < 0 {
            return Err(ImeError::query(query, format!("ImmGetCompositionStringW returned {}", read)));
        }
        buf.truncate(read as usize);
        Ok(buf)
    }
}

impl ImeBackend for Imm32Backend {
    fn query_composition_buffer(&mut self, field: StringField) -> Result<Vec<u16>> {
        let bytes = self.read_bytes("composition buffer", field.gcs())?;
        Ok(bytes
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .collect())
    }

    fn query_attributes(&mut self, field: AttributeField) -> Result<Vec<u8>> {
        self.read_bytes("attributes", field.gcs())
    }

    fn query_clauses(&mut self, field: ClauseField) -> Result<Vec<u32>> {
        let bytes = self.read_bytes("clauses", field.gcs())?;
        Ok(bytes
            .chunks_exact(4)
            .map(|w| u32::from_le_bytes([w[0], w[1], w[2], w[3]]))
            .collect())
    }

    fn query_cursor_position(&mut self) -> Result<u32> {
        let ctx = self.context("cursor position")?;
        let pos = unsafe {
            ImmGetCompositionStringW(ctx.himc, IME_COMPOSITION_STRING(GCS_CURSORPOS as u32), None, 0)
        };
        if pos == IMM_ERROR_NODATA {
            return Ok(0);
        }
        u32::try_from(pos).map_err(|_| {
            ImeError::query("cursor position", format!("ImmGetCompositionStringW returned {}", pos))
        })
    }

    fn query_candidates(&mut self) -> Result<Vec<u8>> {
        let ctx = self.context("candidates")?;
        let size = unsafe { ImmGetCandidateListW(ctx.himc, 0, None, 0) } as usize;
        if size == 0 {
            return Ok(native::encode_candidate_list(&RawCandidateList::default()));
        }
        // u32 backing keeps the CANDIDATELIST header aligned
        let mut buf = vec![0u32; size.div_ceil(4)];
        let written = unsafe {
            ImmGetCandidateListW(
                ctx.himc,
                0,
                Some(buf.as_mut_ptr().cast::<CANDIDATELIST>()),
                size as u32,
            )
        } as usize;
        if written == 0 {
            return Err(ImeError::query("candidates", "ImmGetCandidateListW returned 0"));
        }
        let mut bytes: Vec<u8> = buf.iter().flat_map(|w| w.to_le_bytes()).collect();
        bytes.truncate(written);
        Ok(bytes)
    }

    fn associate_context(&mut self) -> Result<()> {
        unsafe {
            ImmAssociateContext(self.hwnd, self.original);
        }
        Ok(())
    }

    fn disassociate_context(&mut self) -> Result<()> {
        unsafe {
            ImmAssociateContext(self.hwnd, HIMC::default());
        }
        Ok(())
    }

    fn default_handler(&mut self, message: &RawMessage) -> isize {
        unsafe {
            DefSubclassProc(
                self.hwnd,
                message.msg,
                WPARAM(message.wparam),
                LPARAM(message.lparam),
            )
            .0
        }
    }

    fn release(&mut self) -> Result<()> {
        unsafe {
            ImmAssociateContext(self.hwnd, self.original);
        }
        if self.subclass.is_null() {
            return Ok(());
        }
        let removed = unsafe { RemoveWindowSubclass(self.hwnd, Some(subclass_proc), SUBCLASS_ID) };
        let data = std::mem::replace(&mut self.subclass, std::ptr::null_mut());
        drop(unsafe { Box::from_raw(data) });
        if removed.as_bool() {
            Ok(())
        } else {
            Err(ImeError::ContextRelease("RemoveWindowSubclass failed".into()))
        }
    }
}

/// Install a bridge on `hwnd`.
///
/// The returned handle owns the bridge. It disposes itself when the window
/// is destroyed or when the last handle is dropped, whichever comes first.
pub fn attach(hwnd: HWND, config: BridgeConfig) -> Result<Win32Bridge> {
    let original = unsafe { ImmGetContext(hwnd) };
    if !original.is_invalid() {
        unsafe {
            let _ = ImmReleaseContext(hwnd, original);
        }
    }

    let show_default_ime_window = config.show_default_ime_window;
    let backend = Imm32Backend {
        hwnd,
        original,
        subclass: std::ptr::null_mut(),
    };
    let bridge = Rc::new(RefCell::new(ImeBridge::new(backend, config)?));
    let data = Box::into_raw(Box::new(SubclassData {
        bridge: Rc::downgrade(&bridge),
        show_default_ime_window,
    }));

    let installed =
        unsafe { SetWindowSubclass(hwnd, Some(subclass_proc), SUBCLASS_ID, data as usize) };
    if !installed.as_bool() {
        drop(unsafe { Box::from_raw(data) });
        return Err(ImeError::query("subclass", "SetWindowSubclass failed"));
    }
    bridge.borrow_mut().backend_mut().subclass = data;
    tracing::debug!(hwnd = ?hwnd.0, "ime bridge attached");
    Ok(bridge)
}

unsafe extern "system" fn subclass_proc(
    hwnd: HWND,
    msg: u32,
    wparam: WPARAM,
    lparam: LPARAM,
    _id: usize,
    refdata: usize,
) -> LRESULT {
    // Copy out before dispatch: disposal frees the data
    let (bridge, show_default_ime_window) = {
        let data = &*(refdata as *const SubclassData);
        (data.bridge.upgrade(), data.show_default_ime_window)
    };
    let Some(bridge) = bridge else {
        return DefSubclassProc(hwnd, msg, wparam, lparam);
    };
    let result = dispatch_shared(
        &bridge,
        RawMessage::new(msg, wparam.0, lparam.0),
        show_default_ime_window,
        |message| unsafe {
            DefSubclassProc(hwnd, message.msg, WPARAM(message.wparam), LPARAM(message.lparam)).0
        },
    );
    LRESULT(result)
}
