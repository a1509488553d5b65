//! FFI layer - the C-compatible boundary.
//!
//! Every function returns exactly one of three wire shapes:
//!
//! - an opaque handle (`u64` registry token, 0 = failure)
//! - an owned C string or boxed integer (null = failure, caller frees
//!   with the matching `ferrite_*_free` function, exactly once)
//! - a fixed-width numeric sentinel (no ownership, nothing to free)
//!
//! Null/zero always means "operation failed", never "legitimately
//! empty". Native errors never escape: they are logged and converted to
//! the failure sentinel of the function's shape. A null or stale handle
//! is rejected by the registry's generation check instead of touching
//! freed memory.

use crate::connection::{Connection, OpenMode};
use crate::registry::{self, RawHandle, Resource};
use crate::replica::Replica;
use crate::transaction::Behavior;
use libsql::Value;
use std::ffi::{c_char, c_int, CStr, CString};
use std::ptr;

/// Convert a Rust string to a C string pointer.
/// Caller must free with `ferrite_string_free`.
fn to_c_string(s: String) -> *mut c_char {
    match CString::new(s) {
        Ok(cs) => cs.into_raw(),
        Err(_) => {
            // interior null byte; nothing sensible to hand across
            tracing::warn!("result string contained a null byte");
            ptr::null_mut()
        }
    }
}

/// Convert a C string pointer to a Rust string.
/// Returns None if the pointer is null or not valid UTF-8.
unsafe fn from_c_string(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    CStr::from_ptr(ptr).to_str().ok().map(|s| s.to_string())
}

/// Convert a C string array into positional parameters.
///
/// A null element binds SQL NULL, preserving positions. Returns None
/// when an element is not valid UTF-8.
unsafe fn params_from_raw(params: *const *const c_char, len: usize) -> Option<Vec<Value>> {
    if params.is_null() || len == 0 {
        return Some(Vec::new());
    }
    std::slice::from_raw_parts(params, len)
        .iter()
        .map(|&param| {
            if param.is_null() {
                Some(Value::Null)
            } else {
                CStr::from_ptr(param)
                    .to_str()
                    .ok()
                    .map(|s| Value::Text(s.to_string()))
            }
        })
        .collect()
}

// ============================================================================
// Connect
// ============================================================================

/// Open or create a local database file.
///
/// # Arguments
/// - `path`: database file path
/// - `flags`: `"FERRITE_OPEN_READONLY"`, `"FERRITE_OPEN_READWRITE"`, or
///   null for the read-write-create default
/// - `encryption_key`: at-rest encryption key; null or empty means
///   unencrypted
///
/// # Returns
/// Connection handle, or 0 on failure.
///
/// # Safety
/// - all arguments must be valid null-terminated C strings or null
#[no_mangle]
pub unsafe extern "C" fn ferrite_connect_local(
    path: *const c_char,
    flags: *const c_char,
    encryption_key: *const c_char,
) -> RawHandle {
    let path = match from_c_string(path) {
        Some(p) => p,
        None => return 0,
    };
    let mode = OpenMode::parse(from_c_string(flags).as_deref());
    let key = from_c_string(encryption_key);

    match Connection::open_local(&path, mode, key.as_deref()) {
        Ok(conn) => registry::insert(Resource::Connection(conn)),
        Err(e) => {
            tracing::warn!(error = %e, path, "connect_local failed");
            0
        }
    }
}

/// Establish a local replica of a remote primary.
///
/// # Arguments
/// - `path`: local replica file path
/// - `url`: remote primary endpoint
/// - `token`: auth token for the primary
/// - `sync_interval_secs`: background sync cadence; 0 disables
///   background sync (manual `ferrite_sync` only)
/// - `read_your_writes`: non-zero routes reads through the replica's
///   own-write consistency marker
///
/// # Returns
/// Pair handle serving both query and sync calls, or 0 on failure.
///
/// # Safety
/// - `path`, `url` and `token` must be valid null-terminated C strings
#[no_mangle]
pub unsafe extern "C" fn ferrite_connect_new_remote_replica(
    path: *const c_char,
    url: *const c_char,
    token: *const c_char,
    sync_interval_secs: u64,
    read_your_writes: c_int,
) -> RawHandle {
    let (path, url, token) = match (
        from_c_string(path),
        from_c_string(url),
        from_c_string(token),
    ) {
        (Some(p), Some(u), Some(t)) => (p, u, t),
        _ => return 0,
    };

    match Replica::connect(
        &path,
        &url,
        &token,
        sync_interval_secs,
        read_your_writes != 0,
    ) {
        Ok(replica) => registry::insert(Resource::Replica(replica)),
        Err(e) => {
            tracing::warn!(error = %e, path, url, "connect_new_remote_replica failed");
            0
        }
    }
}

// ============================================================================
// Query / Exec
// ============================================================================

/// Execute a read statement and return the result set as JSON.
///
/// # Returns
/// Owned JSON payload `{"columns":[...],"rows":[...]}`, or null on
/// failure. An empty result is a payload with zero rows, never null.
///
/// # Safety
/// - `sql` must be a valid null-terminated C string or null
/// - `params` must point to `params_len` valid C strings (or nulls)
/// - Caller must free the returned string with `ferrite_string_free`
#[no_mangle]
pub unsafe extern "C" fn ferrite_query(
    handle: RawHandle,
    sql: *const c_char,
    params: *const *const c_char,
    params_len: usize,
) -> *mut c_char {
    let resource = match registry::get(handle) {
        Some(r) => r,
        None => return ptr::null_mut(),
    };
    let conn = match resource.connection() {
        Some(c) => c,
        None => return ptr::null_mut(),
    };
    let sql = match from_c_string(sql) {
        Some(s) => s,
        None => return ptr::null_mut(),
    };
    let params = match params_from_raw(params, params_len) {
        Some(p) => p,
        None => return ptr::null_mut(),
    };

    match conn.query(&sql, params).and_then(|set| set.to_json()) {
        Ok(json) => to_c_string(json),
        Err(e) => {
            tracing::warn!(error = %e, "query failed");
            ptr::null_mut()
        }
    }
}

/// Execute a mutating statement.
///
/// # Returns
/// Boxed affected-row count (zero is a legitimate count), or null on
/// failure.
///
/// # Safety
/// - `sql` must be a valid null-terminated C string or null
/// - `params` must point to `params_len` valid C strings (or nulls)
/// - Caller must free the returned pointer with `ferrite_int64_free`
#[no_mangle]
pub unsafe extern "C" fn ferrite_exec(
    handle: RawHandle,
    sql: *const c_char,
    params: *const *const c_char,
    params_len: usize,
) -> *mut i64 {
    let resource = match registry::get(handle) {
        Some(r) => r,
        None => return ptr::null_mut(),
    };
    let conn = match resource.connection() {
        Some(c) => c,
        None => return ptr::null_mut(),
    };
    let sql = match from_c_string(sql) {
        Some(s) => s,
        None => return ptr::null_mut(),
    };
    let params = match params_from_raw(params, params_len) {
        Some(p) => p,
        None => return ptr::null_mut(),
    };

    match conn.exec(&sql, params) {
        Ok(affected) => Box::into_raw(Box::new(affected as i64)),
        Err(e) => {
            tracing::warn!(error = %e, "exec failed");
            ptr::null_mut()
        }
    }
}

/// Execute a semicolon-separated batch of statements as one unit.
///
/// # Returns
/// 1 on success, 0 on failure. No partial-result reporting.
///
/// # Safety
/// - `sql` must be a valid null-terminated C string or null
#[no_mangle]
pub unsafe extern "C" fn ferrite_execute_batch(handle: RawHandle, sql: *const c_char) -> c_int {
    let resource = match registry::get(handle) {
        Some(r) => r,
        None => return 0,
    };
    let conn = match resource.connection() {
        Some(c) => c,
        None => return 0,
    };
    let sql = match from_c_string(sql) {
        Some(s) => s,
        None => return 0,
    };

    match conn.execute_batch(&sql) {
        Ok(()) => 1,
        Err(e) => {
            tracing::warn!(error = %e, "execute_batch failed");
            0
        }
    }
}

/// Clear pending statement state without closing the connection.
///
/// # Returns
/// 1 on success, 0 on an invalid handle.
#[no_mangle]
pub extern "C" fn ferrite_reset(handle: RawHandle) -> c_int {
    let resource = match registry::get(handle) {
        Some(r) => r,
        None => return 0,
    };
    match resource.connection() {
        Some(conn) => {
            conn.reset();
            1
        }
        None => 0,
    }
}

// ============================================================================
// Transactions
// ============================================================================

/// Begin a transaction on a connection.
///
/// # Arguments
/// - `behavior`: `"DEFERRED"`, `"WRITE"`, `"READ"`, or null for the
///   engine default
///
/// # Returns
/// Transaction handle, or 0 on failure (including an already-open
/// transaction on this connection).
///
/// # Safety
/// - `behavior` must be a valid null-terminated C string or null
#[no_mangle]
pub unsafe extern "C" fn ferrite_begin(handle: RawHandle, behavior: *const c_char) -> RawHandle {
    let resource = match registry::get(handle) {
        Some(r) => r,
        None => return 0,
    };
    let conn = match resource.connection() {
        Some(c) => c,
        None => return 0,
    };
    let behavior = Behavior::parse(from_c_string(behavior).as_deref());

    match conn.begin(behavior) {
        Ok(trx) => registry::insert(Resource::Transaction(trx)),
        Err(e) => {
            tracing::warn!(error = %e, "begin failed");
            0
        }
    }
}

/// Execute a mutating statement inside a transaction.
///
/// # Returns
/// The same transaction handle on success (for chaining), 0 on failure.
/// A statement error leaves the transaction open.
///
/// # Safety
/// - `sql` must be a valid null-terminated C string or null
/// - `params` must point to `params_len` valid C strings (or nulls)
#[no_mangle]
pub unsafe extern "C" fn ferrite_trx_exec(
    handle: RawHandle,
    sql: *const c_char,
    params: *const *const c_char,
    params_len: usize,
) -> RawHandle {
    let resource = match registry::get(handle) {
        Some(r) => r,
        None => return 0,
    };
    let trx = match resource.transaction() {
        Some(t) => t,
        None => return 0,
    };
    let sql = match from_c_string(sql) {
        Some(s) => s,
        None => return 0,
    };
    let params = match params_from_raw(params, params_len) {
        Some(p) => p,
        None => return 0,
    };

    match trx.exec(&sql, params) {
        Ok(_) => handle,
        Err(e) => {
            tracing::warn!(error = %e, "trx_exec failed");
            0
        }
    }
}

/// Commit a transaction.
///
/// # Returns
/// 1 on success, 0 on failure (invalid handle or terminal state).
#[no_mangle]
pub extern "C" fn ferrite_commit(handle: RawHandle) -> i64 {
    let resource = match registry::get(handle) {
        Some(r) => r,
        None => return 0,
    };
    let trx = match resource.transaction() {
        Some(t) => t,
        None => return 0,
    };

    match trx.commit() {
        Ok(()) => 1,
        Err(e) => {
            tracing::warn!(error = %e, "commit failed");
            0
        }
    }
}

/// Roll back a transaction.
///
/// # Returns
/// 1 on success, 0 on failure (invalid handle or terminal state).
#[no_mangle]
pub extern "C" fn ferrite_rollback(handle: RawHandle) -> i64 {
    let resource = match registry::get(handle) {
        Some(r) => r,
        None => return 0,
    };
    let trx = match resource.transaction() {
        Some(t) => t,
        None => return 0,
    };

    match trx.rollback() {
        Ok(()) => 1,
        Err(e) => {
            tracing::warn!(error = %e, "rollback failed");
            0
        }
    }
}

// ============================================================================
// Introspection
// ============================================================================

/// Rowid of the most recent successful insert.
///
/// # Returns
/// The rowid, or 0 when unavailable (including invalid handles); never
/// an error.
#[no_mangle]
pub extern "C" fn ferrite_last_insert_rowid(handle: RawHandle) -> i64 {
    match registry::get(handle) {
        Some(resource) => resource
            .connection()
            .map(|conn| conn.last_insert_rowid())
            .unwrap_or(0),
        None => 0,
    }
}

/// Whether the connection auto-commits each statement.
///
/// # Returns
/// 1 when auto-committing, 0 inside a transaction or on an invalid
/// handle.
#[no_mangle]
pub extern "C" fn ferrite_is_autocommit(handle: RawHandle) -> c_int {
    match registry::get(handle) {
        Some(resource) => match resource.connection() {
            Some(conn) if conn.is_autocommit() => 1,
            _ => 0,
        },
        None => 0,
    }
}

/// Rows changed by the most recent mutating statement.
///
/// # Returns
/// Boxed count, or null on an invalid handle. Caller must free the
/// returned pointer with `ferrite_uint64_free`.
#[no_mangle]
pub extern "C" fn ferrite_affected_rows(handle: RawHandle) -> *mut u64 {
    let resource = match registry::get(handle) {
        Some(r) => r,
        None => return ptr::null_mut(),
    };
    match resource.connection() {
        Some(conn) => Box::into_raw(Box::new(conn.affected_rows())),
        None => ptr::null_mut(),
    }
}

/// Engine and kernel version string.
///
/// # Returns
/// Owned string; caller must free it with `ferrite_string_free`.
#[no_mangle]
pub extern "C" fn ferrite_version() -> *mut c_char {
    to_c_string(format!(
        "ferrite {} (libsql {}-{})",
        env!("CARGO_PKG_VERSION"),
        libsql::version(),
        libsql::version_number()
    ))
}

// ============================================================================
// Replication
// ============================================================================

/// Pull and apply the latest changes from the remote primary.
///
/// # Returns
/// 0 on success, -1 when the handle is not a live replica pair, -2 on a
/// synchronization failure. Safe to retry; sync is idempotent.
#[no_mangle]
pub extern "C" fn ferrite_sync(handle: RawHandle) -> c_int {
    let resource = match registry::get(handle) {
        Some(r) => r,
        None => return -1,
    };
    let replica = match resource.replica() {
        Some(r) => r,
        None => return -1,
    };

    match replica.sync() {
        Ok(()) => 0,
        Err(e) => {
            tracing::warn!(error = %e, "sync failed");
            -2
        }
    }
}

// ============================================================================
// Lifecycle
// ============================================================================

/// Close any handle: connection, replica pair, or transaction.
///
/// Closing a replica pair releases both members together. Closing an
/// open transaction rolls it back. Stale, zero and already-closed
/// handles are ignored.
#[no_mangle]
pub extern "C" fn ferrite_close(handle: RawHandle) {
    if registry::remove(handle).is_none() {
        tracing::debug!(handle, "close on a dead handle ignored");
    }
}

/// Free a string allocated by the engine.
///
/// # Safety
/// - `s` must be a pointer from a `ferrite_*` function
/// - Must not be called twice on the same pointer
#[no_mangle]
pub unsafe extern "C" fn ferrite_string_free(s: *mut c_char) {
    if !s.is_null() {
        drop(CString::from_raw(s));
    }
}

/// Free a boxed signed count allocated by the engine.
///
/// # Safety
/// - `n` must be a pointer from `ferrite_exec`
/// - Must not be called twice on the same pointer
#[no_mangle]
pub unsafe extern "C" fn ferrite_int64_free(n: *mut i64) {
    if !n.is_null() {
        drop(Box::from_raw(n));
    }
}

/// Free a boxed unsigned count allocated by the engine.
///
/// # Safety
/// - `n` must be a pointer from `ferrite_affected_rows`
/// - Must not be called twice on the same pointer
#[no_mangle]
pub unsafe extern "C" fn ferrite_uint64_free(n: *mut u64) {
    if !n.is_null() {
        drop(Box::from_raw(n));
    }
}
