// Copyright 2024-2026 llm-bridge Contributors
// SPDX-License-Identifier: Apache-2.0

//! Bridge lifecycle, model and generation entry points.

use std::ffi::{c_char, CStr, CString};
use std::panic::{catch_unwind, AssertUnwindSafe};

use super::error::{set_last_error, BridgeErrorCode};
use crate::bridge::Bridge;
use crate::config;

/// Run `f`, converting a panic into `fallback` plus a last-error message.
fn guarded<T>(fallback: T, f: impl FnOnce() -> T) -> T {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(v) => v,
        Err(_) => {
            set_last_error("internal panic");
            fallback
        }
    }
}

unsafe fn read_str<'a>(ptr: *const c_char) -> Result<&'a str, BridgeErrorCode> {
    if ptr.is_null() {
        set_last_error("null pointer argument");
        return Err(BridgeErrorCode::NullPointer);
    }
    CStr::from_ptr(ptr).to_str().map_err(|_| {
        set_last_error("invalid UTF-8 in string argument");
        BridgeErrorCode::InvalidUtf8
    })
}

fn into_c_string(s: String) -> *mut c_char {
    match CString::new(s.replace('\0', " ")) {
        Ok(c) => c.into_raw(),
        Err(_) => std::ptr::null_mut(),
    }
}

/// Create a bridge configured from `LLM_BRIDGE_*` settings.
///
/// Falls back to defaults if the configuration cannot be read.
#[no_mangle]
pub extern "C" fn llm_bridge_create() -> *mut Bridge {
    guarded(std::ptr::null_mut(), || {
        let cfg = config::load(None).unwrap_or_else(|e| {
            set_last_error(format!("config: {e}"));
            config::BridgeConfig::default()
        });
        Box::into_raw(Box::new(Bridge::new(cfg)))
    })
}

/// # Safety
/// `bridge` must come from `llm_bridge_create` and not be used afterwards.
#[no_mangle]
pub unsafe extern "C" fn llm_bridge_destroy(bridge: *mut Bridge) {
    if bridge.is_null() {
        return;
    }
    guarded((), || {
        let bridge = Box::from_raw(bridge);
        bridge.cleanup();
    });
}

/// # Safety
/// `bridge` must be a live bridge pointer; `path` a NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn llm_bridge_load_model(
    bridge: *const Bridge,
    path: *const c_char,
) -> BridgeErrorCode {
    if bridge.is_null() {
        set_last_error("null pointer argument");
        return BridgeErrorCode::NullPointer;
    }
    let path = match read_str(path) {
        Ok(p) => p,
        Err(code) => return code,
    };
    guarded(BridgeErrorCode::Panic, || {
        match (*bridge).session().load_model(std::path::Path::new(path)) {
            Ok(_) => BridgeErrorCode::Ok,
            Err(e) => BridgeErrorCode::from(&e),
        }
    })
}

/// Returns an owned string (free with `llm_bridge_free_string`), or null on
/// invalid arguments.
///
/// # Safety
/// `bridge` must be a live bridge pointer; `prompt` a NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn llm_bridge_generate_response(
    bridge: *const Bridge,
    prompt: *const c_char,
    max_tokens: i32,
) -> *mut c_char {
    if bridge.is_null() {
        set_last_error("null pointer argument");
        return std::ptr::null_mut();
    }
    let Ok(prompt) = read_str(prompt) else {
        return std::ptr::null_mut();
    };
    guarded(std::ptr::null_mut(), || {
        into_c_string((*bridge).generate_response(prompt, max_tokens))
    })
}

/// # Safety
/// `s` must come from this library and not have been freed.
#[no_mangle]
pub unsafe extern "C" fn llm_bridge_free_string(s: *mut c_char) {
    if !s.is_null() {
        drop(CString::from_raw(s));
    }
}

/// # Safety
/// `bridge` must be null or a live bridge pointer.
#[no_mangle]
pub unsafe extern "C" fn llm_bridge_is_model_loaded(bridge: *const Bridge) -> bool {
    if bridge.is_null() {
        return false;
    }
    guarded(false, || (*bridge).is_model_loaded())
}

/// # Safety
/// `bridge` must be a live bridge pointer.
#[no_mangle]
pub unsafe extern "C" fn llm_bridge_get_model_info(bridge: *const Bridge) -> *mut c_char {
    if bridge.is_null() {
        set_last_error("null pointer argument");
        return std::ptr::null_mut();
    }
    guarded(std::ptr::null_mut(), || into_c_string((*bridge).get_model_info()))
}

/// Cancel the running generation. Safe to call from another thread.
///
/// # Safety
/// `bridge` must be null or a live bridge pointer.
#[no_mangle]
pub unsafe extern "C" fn llm_bridge_cancel(bridge: *const Bridge) -> bool {
    if bridge.is_null() {
        return false;
    }
    guarded(false, || (*bridge).cancel())
}

/// Unload the model. `false` means a generation kept the session busy;
/// the model is still loaded and the last error says why.
///
/// # Safety
/// `bridge` must be null or a live bridge pointer.
#[no_mangle]
pub unsafe extern "C" fn llm_bridge_cleanup(bridge: *const Bridge) -> bool {
    if bridge.is_null() {
        return false;
    }
    guarded(false, || {
        let done = (*bridge).cleanup();
        if !done {
            set_last_error("cleanup: session busy");
        }
        done
    })
}
