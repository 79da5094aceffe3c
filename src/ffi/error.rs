// Copyright 2024-2026 llm-bridge Contributors
// SPDX-License-Identifier: Apache-2.0

//! Error codes and thread-local last-error message for the C ABI.

use std::cell::RefCell;
use std::ffi::{c_char, CString};

use crate::session::{ErrorKind, SessionError};

thread_local! {
    static LAST_ERROR: RefCell<Option<CString>> = const { RefCell::new(None) };
}

/// Result codes returned across the C ABI.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeErrorCode {
    Ok = 0,
    NullPointer = -1,
    InvalidUtf8 = -2,
    FileNotFound = -3,
    FormatError = -4,
    OutOfMemory = -5,
    InvalidModel = -6,
    InvalidWindowSize = -7,
    ContextOverflow = -8,
    Busy = -9,
    Cancelled = -10,
    TimedOut = -11,
    NotLoaded = -12,
    InvalidRequest = -13,
    Panic = -99,
}

impl From<ErrorKind> for BridgeErrorCode {
    fn from(kind: ErrorKind) -> Self {
        match kind {
            ErrorKind::FileNotFound => Self::FileNotFound,
            ErrorKind::FormatError => Self::FormatError,
            ErrorKind::OutOfMemory => Self::OutOfMemory,
            ErrorKind::InvalidModel => Self::InvalidModel,
            ErrorKind::InvalidWindowSize => Self::InvalidWindowSize,
            ErrorKind::ContextOverflow => Self::ContextOverflow,
            ErrorKind::Busy => Self::Busy,
            ErrorKind::Cancelled => Self::Cancelled,
            ErrorKind::TimedOut => Self::TimedOut,
            ErrorKind::NotLoaded => Self::NotLoaded,
            ErrorKind::InvalidRequest => Self::InvalidRequest,
        }
    }
}

impl From<&SessionError> for BridgeErrorCode {
    fn from(e: &SessionError) -> Self {
        set_last_error(e.to_string());
        e.kind().into()
    }
}

pub(crate) fn set_last_error(msg: impl Into<String>) {
    let msg = msg.into().replace('\0', " ");
    LAST_ERROR.with(|slot| *slot.borrow_mut() = CString::new(msg).ok());
}

/// Last error message on this thread, or null. Valid until the next call
/// that sets or clears it on the same thread.
#[no_mangle]
pub extern "C" fn llm_bridge_last_error() -> *const c_char {
    LAST_ERROR.with(|slot| match slot.borrow().as_ref() {
        Some(msg) => msg.as_ptr(),
        None => std::ptr::null(),
    })
}

#[no_mangle]
pub extern "C" fn llm_bridge_clear_last_error() {
    LAST_ERROR.with(|slot| *slot.borrow_mut() = None);
}
