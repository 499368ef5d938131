//! Engine entry points that libsqlite3-sys does not export, resolved against the linked sqlite library

use libsqlite3_sys::{sqlite3, sqlite3_destructor_type, sqlite3_stmt};
use std::ffi::{c_int, c_void};

unsafe extern "C" {
    /// Unlike `sqlite3_close` this leaves the handle allocated as a zombie until the last statement is finalized
    pub fn sqlite3_close_v2(db: *mut sqlite3) -> c_int;

    pub fn sqlite3_bind_text16(
        stmt: *mut sqlite3_stmt,
        index: c_int,
        value: *const c_void,
        size: c_int,
        destructor: sqlite3_destructor_type,
    ) -> c_int;

    pub fn sqlite3_column_text16(stmt: *mut sqlite3_stmt, index: c_int) -> *const c_void;
    pub fn sqlite3_column_bytes16(stmt: *mut sqlite3_stmt, index: c_int) -> c_int;
}
