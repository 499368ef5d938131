use crate::ffi;
use std::{
    ffi::{CStr, c_char, c_double, c_int, c_void},
    fmt,
    marker::PhantomData,
    slice,
};

/// What a compiled statement does when stepped
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum StatementKind {
    /// Default constructed or cleared statement, no compiled handle
    #[default]
    Undefined,
    /// Read-only statement that produces result rows
    Select,
    /// Any other statement (inserts, updates, schema changes, transaction control)
    NonSelect,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ColumnType {
    Integer,
    Float,
    Blob,
    Null,
    Text,
}

/// A compiled sql statement, only created by [`crate::Connection::prepare`].
///
/// The lifetime `'b` bounds the data bound through the zero-copy binders ([`Statement::bind_blob`],
/// [`Statement::bind_text`], [`Statement::bind_text16`]): the engine keeps a pointer to that data, so it has to
/// outlive the statement. The `*_copy` binders hand the engine a private copy instead.
///
/// Slices returned by the zero-copy column getters borrow the statement and are invalidated by the next
/// [`Statement::next`], [`Statement::execute`], [`Statement::reset`] or [`Statement::clear`] which all need `&mut self`.
///
/// Parameter indices are 1-based, column indices 0-based. Index and kind preconditions are checked with debug assertions.
///
/// ```
/// use sqlite::{CacheMode, Connection, OpenMode};
///
/// let mut conn = Connection::new("", OpenMode::InMemory, CacheMode::Private);
/// assert!(conn.open());
/// assert!(conn.execute("CREATE TABLE T (data BLOB)"));
///
/// let data = vec![0xaa_u8; 64];
/// let mut insert = conn.prepare("INSERT INTO T VALUES(?)");
/// assert!(insert.bind_blob(1, &data));
/// assert!(insert.execute());
/// ```
///
/// A buffer bound without copying can not be dropped while the statement is still in use:
///
/// ```compile_fail
/// use sqlite::{CacheMode, Connection, OpenMode};
///
/// let mut conn = Connection::new("", OpenMode::InMemory, CacheMode::Private);
/// assert!(conn.open());
/// assert!(conn.execute("CREATE TABLE T (data BLOB)"));
///
/// let mut insert = conn.prepare("INSERT INTO T VALUES(?)");
/// {
///     let data = vec![0xaa_u8; 64];
///     assert!(insert.bind_blob(1, &data));
/// }
/// assert!(insert.execute());
/// ```
pub struct Statement<'b> {
    stmt: *mut libsqlite3_sys::sqlite3_stmt,
    column_count: c_int,
    kind: StatementKind,
    exhausted: bool,
    // invariant so a `&Statement<'long>` can not be shortened to accept shorter lived bindings
    bound: PhantomData<fn(&'b ()) -> &'b ()>,
}

impl<'b> Statement<'b> {
    pub(crate) fn new(stmt: *mut libsqlite3_sys::sqlite3_stmt) -> Self {
        if stmt.is_null() {
            return Statement::default();
        }

        let column_count = unsafe { libsqlite3_sys::sqlite3_column_count(stmt) };
        let read_only = unsafe { libsqlite3_sys::sqlite3_stmt_readonly(stmt) } != 0;
        let kind = if read_only && column_count > 0 {
            StatementKind::Select
        } else {
            StatementKind::NonSelect
        };

        Self {
            stmt,
            column_count,
            kind,
            exhausted: false,
            bound: PhantomData,
        }
    }

    pub fn is_valid(&self) -> bool {
        !self.stmt.is_null()
    }

    pub fn kind(&self) -> StatementKind {
        self.kind
    }

    pub fn column_count(&self) -> c_int {
        self.column_count
    }

    pub fn parameter_count(&self) -> c_int {
        unsafe { libsqlite3_sys::sqlite3_bind_parameter_count(self.stmt) }
    }

    /// Binds a blob without copying it, the engine reads `value` when the statement is stepped
    pub fn bind_blob(&self, index: c_int, value: &'b [u8]) -> bool {
        self.bind_blob_with(index, value, libsqlite3_sys::SQLITE_STATIC())
    }

    pub fn bind_blob_copy(&self, index: c_int, value: &[u8]) -> bool {
        self.bind_blob_with(index, value, libsqlite3_sys::SQLITE_TRANSIENT())
    }

    pub fn bind_bool(&self, index: c_int, value: bool) -> bool {
        self.bind_int(index, c_int::from(value))
    }

    /// Binds utf-8 text without copying it
    pub fn bind_text(&self, index: c_int, value: &'b str) -> bool {
        self.bind_text_with(index, value, libsqlite3_sys::SQLITE_STATIC())
    }

    pub fn bind_text_copy(&self, index: c_int, value: &str) -> bool {
        self.bind_text_with(index, value, libsqlite3_sys::SQLITE_TRANSIENT())
    }

    /// Binds native endian utf-16 text without copying it
    pub fn bind_text16(&self, index: c_int, value: &'b [u16]) -> bool {
        self.bind_text16_with(index, value, libsqlite3_sys::SQLITE_STATIC())
    }

    pub fn bind_text16_copy(&self, index: c_int, value: &[u16]) -> bool {
        self.bind_text16_with(index, value, libsqlite3_sys::SQLITE_TRANSIENT())
    }

    pub fn bind_double(&self, index: c_int, value: c_double) -> bool {
        self.check_parameter(index);
        unsafe { libsqlite3_sys::sqlite3_bind_double(self.stmt, index, value) == libsqlite3_sys::SQLITE_OK }
    }

    pub fn bind_int(&self, index: c_int, value: c_int) -> bool {
        self.check_parameter(index);
        unsafe { libsqlite3_sys::sqlite3_bind_int(self.stmt, index, value) == libsqlite3_sys::SQLITE_OK }
    }

    pub fn bind_int64(&self, index: c_int, value: i64) -> bool {
        self.check_parameter(index);
        unsafe { libsqlite3_sys::sqlite3_bind_int64(self.stmt, index, value) == libsqlite3_sys::SQLITE_OK }
    }

    pub fn bind_null(&self, index: c_int) -> bool {
        self.check_parameter(index);
        unsafe { libsqlite3_sys::sqlite3_bind_null(self.stmt, index) == libsqlite3_sys::SQLITE_OK }
    }

    /// Resets all parameters to NULL
    pub fn clear_bindings(&self) {
        debug_assert!(self.is_valid(), "clear_bindings on an invalid statement");
        unsafe { libsqlite3_sys::sqlite3_clear_bindings(self.stmt) };
    }

    /// Runs a non-select statement to completion.
    /// On success the statement is reset so it can be bound and executed again.
    pub fn execute(&mut self) -> bool {
        debug_assert!(self.is_valid(), "execute on an invalid statement");
        debug_assert_eq!(self.kind, StatementKind::NonSelect, "execute on a row producing statement");

        let done = self.step() == libsqlite3_sys::SQLITE_DONE;
        if done {
            unsafe { libsqlite3_sys::sqlite3_reset(self.stmt) };
        }

        done
    }

    /// Advances a select statement to the next row, returns false once the rows are exhausted
    /// and keeps returning false until the statement is reset.
    pub fn next(&mut self) -> bool {
        debug_assert!(self.is_valid(), "next on an invalid statement");
        debug_assert_eq!(self.kind, StatementKind::Select, "next on a statement that produces no rows");

        if self.exhausted {
            return false;
        }

        if self.step() == libsqlite3_sys::SQLITE_ROW {
            true
        } else {
            self.exhausted = true;
            false
        }
    }

    /// Rewinds the statement, bindings are kept
    pub fn reset(&mut self) -> bool {
        debug_assert!(self.is_valid(), "reset on an invalid statement");
        self.exhausted = false;
        unsafe { libsqlite3_sys::sqlite3_reset(self.stmt) == libsqlite3_sys::SQLITE_OK }
    }

    pub(crate) fn step(&mut self) -> c_int {
        let mut rc = unsafe { libsqlite3_sys::sqlite3_step(self.stmt) };
        while rc == libsqlite3_sys::SQLITE_BUSY {
            std::thread::sleep(std::time::Duration::from_micros(1));
            rc = unsafe { libsqlite3_sys::sqlite3_step(self.stmt) };
        }
        rc
    }

    pub fn column_type(&self, index: c_int) -> ColumnType {
        self.check_column(index);
        column_type(self.stmt, index)
    }

    pub fn is_null(&self, index: c_int) -> bool {
        self.column_type(index) == ColumnType::Null
    }

    /// Size in bytes of the utf-8 (or blob) representation of the value
    pub fn byte_length(&self, index: c_int) -> c_int {
        self.check_column(index);
        unsafe { libsqlite3_sys::sqlite3_column_bytes(self.stmt, index) }
    }

    /// Size in bytes of the utf-16 representation of the value.
    /// Takes `&mut self` because the engine may convert the stored text in place.
    pub fn byte_length16(&mut self, index: c_int) -> c_int {
        self.check_column(index);
        unsafe { ffi::sqlite3_column_bytes16(self.stmt, index) }
    }

    pub fn column_int(&self, index: c_int) -> c_int {
        self.check_column(index);
        unsafe { libsqlite3_sys::sqlite3_column_int(self.stmt, index) }
    }

    pub fn column_int64(&self, index: c_int) -> i64 {
        self.check_column(index);
        unsafe { libsqlite3_sys::sqlite3_column_int64(self.stmt, index) }
    }

    pub fn column_double(&self, index: c_int) -> c_double {
        self.check_column(index);
        unsafe { libsqlite3_sys::sqlite3_column_double(self.stmt, index) }
    }

    pub fn column_float(&self, index: c_int) -> f32 {
        self.column_double(index) as f32
    }

    pub fn column_bool(&self, index: c_int) -> bool {
        self.column_int(index) != 0
    }

    /// Blob content of the current row, `None` unless the value is a blob.
    /// An empty blob yields an empty slice.
    pub fn column_blob(&self, index: c_int) -> Option<&[u8]> {
        if self.column_type(index) != ColumnType::Blob {
            return None;
        }

        let data = unsafe { libsqlite3_sys::sqlite3_column_blob(self.stmt, index) };
        let size = unsafe { libsqlite3_sys::sqlite3_column_bytes(self.stmt, index) };
        if data.is_null() || size <= 0 {
            return Some(&[]);
        }

        Some(unsafe { slice::from_raw_parts(data.cast::<u8>(), size as usize) })
    }

    pub fn column_blob_copy(&self, index: c_int) -> Option<Vec<u8>> {
        self.column_blob(index).map(<[u8]>::to_vec)
    }

    /// Text of the current row as utf-8, `None` for NULL and blob values or when the text is not valid utf-8
    pub fn column_text(&self, index: c_int) -> Option<&str> {
        self.text_bytes(index).and_then(|bytes| std::str::from_utf8(bytes).ok())
    }

    /// Owned copy of the text, invalid utf-8 sequences are replaced
    pub fn column_text_copy(&self, index: c_int) -> Option<String> {
        self.text_bytes(index)
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
    }

    /// Owned text, empty for NULL values
    pub fn column_string(&self, index: c_int) -> String {
        self.column_text_copy(index).unwrap_or_default()
    }

    /// Text of the current row as native endian utf-16.
    /// Takes `&mut self` because the engine may convert the stored text in place.
    pub fn column_text16(&mut self, index: c_int) -> Option<&[u16]> {
        if self.column_type(index) == ColumnType::Null {
            return None;
        }

        let data = unsafe { ffi::sqlite3_column_text16(self.stmt, index) };
        if data.is_null() {
            return None;
        }

        let size = unsafe { ffi::sqlite3_column_bytes16(self.stmt, index) };
        Some(unsafe { slice::from_raw_parts(data.cast::<u16>(), size.max(0) as usize / 2) })
    }

    pub fn column_text16_copy(&mut self, index: c_int) -> Option<Vec<u16>> {
        self.column_text16(index).map(<[u16]>::to_vec)
    }

    /// Finalizes the statement, it becomes invalid
    pub fn clear(&mut self) {
        if !self.stmt.is_null() {
            unsafe { libsqlite3_sys::sqlite3_finalize(self.stmt) };
            self.stmt = std::ptr::null_mut();
            self.column_count = 0;
            self.kind = StatementKind::Undefined;
            self.exhausted = false;
        }
    }

    /// Error message of the connection that prepared the statement.
    /// Meaningless once that connection is closed.
    pub fn last_error(&self) -> String {
        if self.stmt.is_null() {
            return String::new();
        }

        let error_message = unsafe { libsqlite3_sys::sqlite3_errmsg(self.db_handle()) };
        if error_message.is_null() {
            return String::new();
        }

        let c_str = unsafe { CStr::from_ptr(error_message) };
        c_str.to_string_lossy().into_owned()
    }

    pub fn last_error_code(&self) -> c_int {
        debug_assert!(self.is_valid(), "last_error_code on an invalid statement");
        unsafe { libsqlite3_sys::sqlite3_errcode(self.db_handle()) }
    }

    pub fn last_insert_row_id(&self) -> i64 {
        debug_assert!(self.is_valid(), "last_insert_row_id on an invalid statement");
        unsafe { libsqlite3_sys::sqlite3_last_insert_rowid(self.db_handle()) }
    }

    /// The sql text the statement was compiled from
    pub fn query(&self) -> String {
        if self.stmt.is_null() {
            return String::new();
        }

        let sql = unsafe { libsqlite3_sys::sqlite3_sql(self.stmt) };
        if sql.is_null() {
            return String::new();
        }

        unsafe { CStr::from_ptr(sql) }.to_string_lossy().into_owned()
    }

    /// The sql text with the currently bound parameters substituted
    pub fn expanded_query(&self) -> String {
        if self.stmt.is_null() {
            return String::new();
        }

        let sql = unsafe { libsqlite3_sys::sqlite3_expanded_sql(self.stmt) };
        if sql.is_null() {
            return String::new();
        }

        let result = unsafe { CStr::from_ptr(sql) }.to_string_lossy().into_owned();
        unsafe { libsqlite3_sys::sqlite3_free(sql.cast::<c_void>()) };
        result
    }

    // The connection handle stays allocated while statements are alive because connections close with `sqlite3_close_v2`
    fn db_handle(&self) -> *mut libsqlite3_sys::sqlite3 {
        unsafe { libsqlite3_sys::sqlite3_db_handle(self.stmt) }
    }

    fn text_bytes(&self, index: c_int) -> Option<&[u8]> {
        match self.column_type(index) {
            ColumnType::Null | ColumnType::Blob => return None,
            ColumnType::Integer | ColumnType::Float | ColumnType::Text => {}
        }

        let data = unsafe { libsqlite3_sys::sqlite3_column_text(self.stmt, index) };
        if data.is_null() {
            return None;
        }

        let size = unsafe { libsqlite3_sys::sqlite3_column_bytes(self.stmt, index) };
        Some(unsafe { slice::from_raw_parts(data.cast::<u8>(), size.max(0) as usize) })
    }

    fn bind_blob_with(&self, index: c_int, value: &[u8], lifetime: libsqlite3_sys::sqlite3_destructor_type) -> bool {
        self.check_parameter(index);
        let Ok(size) = c_int::try_from(value.len()) else {
            return false;
        };

        unsafe {
            libsqlite3_sys::sqlite3_bind_blob(self.stmt, index, value.as_ptr().cast::<c_void>(), size, lifetime)
                == libsqlite3_sys::SQLITE_OK
        }
    }

    fn bind_text_with(&self, index: c_int, value: &str, lifetime: libsqlite3_sys::sqlite3_destructor_type) -> bool {
        self.check_parameter(index);
        let Ok(size) = c_int::try_from(value.len()) else {
            return false;
        };

        unsafe {
            libsqlite3_sys::sqlite3_bind_text(self.stmt, index, value.as_ptr().cast::<c_char>(), size, lifetime)
                == libsqlite3_sys::SQLITE_OK
        }
    }

    fn bind_text16_with(&self, index: c_int, value: &[u16], lifetime: libsqlite3_sys::sqlite3_destructor_type) -> bool {
        self.check_parameter(index);
        let Some(size) = value.len().checked_mul(2).and_then(|bytes| c_int::try_from(bytes).ok()) else {
            return false;
        };

        unsafe {
            ffi::sqlite3_bind_text16(self.stmt, index, value.as_ptr().cast::<c_void>(), size, lifetime)
                == libsqlite3_sys::SQLITE_OK
        }
    }

    fn check_parameter(&self, index: c_int) {
        debug_assert!(self.is_valid(), "binding on an invalid statement");
        debug_assert!(
            index >= 1 && index <= self.parameter_count(),
            "parameter index {index} out of range 1..={}",
            self.parameter_count()
        );
    }

    fn check_column(&self, index: c_int) {
        debug_assert!(self.is_valid(), "column access on an invalid statement");
        debug_assert_eq!(self.kind, StatementKind::Select, "column access on a statement that produces no rows");
        debug_assert!(
            index >= 0 && index < self.column_count,
            "column index {index} out of range 0..{}",
            self.column_count
        );
    }
}

pub(crate) fn column_type(stmt: *mut libsqlite3_sys::sqlite3_stmt, index: c_int) -> ColumnType {
    match unsafe { libsqlite3_sys::sqlite3_column_type(stmt, index) } {
        libsqlite3_sys::SQLITE_INTEGER => ColumnType::Integer,
        libsqlite3_sys::SQLITE_FLOAT => ColumnType::Float,
        libsqlite3_sys::SQLITE_BLOB => ColumnType::Blob,
        libsqlite3_sys::SQLITE_NULL => ColumnType::Null,
        libsqlite3_sys::SQLITE_TEXT => ColumnType::Text,
        other => unreachable!("Invalid column type {other}"),
    }
}

impl Default for Statement<'_> {
    fn default() -> Self {
        Self {
            stmt: std::ptr::null_mut(),
            column_count: 0,
            kind: StatementKind::Undefined,
            exhausted: false,
            bound: PhantomData,
        }
    }
}

impl Drop for Statement<'_> {
    fn drop(&mut self) {
        self.clear();
    }
}

impl fmt::Debug for Statement<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Statement")
            .field("query", &self.query())
            .field("kind", &self.kind)
            .field("column_count", &self.column_count)
            .finish()
    }
}
