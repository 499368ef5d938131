use crate::ffi;
use crate::statement::column_type;
use crate::{CacheMode, ColumnType, Error, OpenMode, Result, Runtime, Statement, ThreadMode};
use std::ffi::{CStr, CString, c_char, c_int};
use std::fmt;
use std::path::Path;
use std::slice;
use std::sync::Arc;
use std::thread::sleep;
use std::time::Duration;

/// Outcome of the single value readers ([`Connection::read_int64`] and friends).
///
/// The sentinel codes of this layer (0 and below) never overlap with the engine result codes,
/// which are all positive.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ReadStatus {
    /// The first column of the first row was read
    Success,
    /// The query does not produce result columns
    NoData,
    /// The query produced no rows
    EmptyData,
    /// The value is NULL, the returned value is the type default
    NullValue,
    /// The query could not be prepared (or failed while stepping), holds the engine result code
    Engine(c_int),
}

impl ReadStatus {
    pub const SUCCESS_CODE: c_int = 0;
    pub const NO_DATA_CODE: c_int = -1;
    pub const EMPTY_DATA_CODE: c_int = -2;
    pub const NULL_VALUE_CODE: c_int = -3;

    pub fn code(self) -> c_int {
        match self {
            ReadStatus::Success => Self::SUCCESS_CODE,
            ReadStatus::NoData => Self::NO_DATA_CODE,
            ReadStatus::EmptyData => Self::EMPTY_DATA_CODE,
            ReadStatus::NullValue => Self::NULL_VALUE_CODE,
            ReadStatus::Engine(rc) => rc,
        }
    }

    pub fn is_success(self) -> bool {
        self == ReadStatus::Success
    }
}

/// How the backing store is located, resolved once per open
enum OpenTarget {
    Regular,
    Temporary,
    InMemory,
}

impl From<OpenMode> for OpenTarget {
    fn from(mode: OpenMode) -> Self {
        match mode {
            OpenMode::ReadWriteCreate | OpenMode::ReadWrite | OpenMode::ReadOnly => OpenTarget::Regular,
            OpenMode::Temporary => OpenTarget::Temporary,
            OpenMode::InMemory => OpenTarget::InMemory,
        }
    }
}

/// A single database connection, constructed closed.
///
/// The connection exclusively owns its engine handle: the handle exists iff [`Connection::is_open`],
/// and it is released on [`Connection::close`] or drop.
/// All opens go through the [`Runtime`] the connection belongs to, which serializes them against thread mode changes
/// and keeps the count of open connections.
pub struct Connection {
    db: *mut libsqlite3_sys::sqlite3,
    name: String,
    open_mode: OpenMode,
    cache_mode: CacheMode,
    last_result_code: Option<c_int>,
    open_error: String,
    runtime: Arc<Runtime>,
}

impl Connection {
    pub fn new(name: impl Into<String>, open_mode: OpenMode, cache_mode: CacheMode) -> Self {
        Connection::with_runtime(Runtime::global(), name, open_mode, cache_mode)
    }

    pub fn with_runtime(runtime: Arc<Runtime>, name: impl Into<String>, open_mode: OpenMode, cache_mode: CacheMode) -> Self {
        Connection {
            db: std::ptr::null_mut(),
            name: name.into(),
            open_mode,
            cache_mode,
            last_result_code: None,
            open_error: String::new(),
            runtime,
        }
    }

    /// Opens the connection, a no-op when it is already open
    pub fn open(&mut self) -> bool {
        let runtime = self.runtime.clone();
        let _guard = runtime.lock_open();

        if self.is_open() {
            return true;
        }

        let thread_mode = runtime.default_thread_mode();
        let (location, flags) = match OpenTarget::from(self.open_mode) {
            OpenTarget::Regular => (self.name.clone(), open_flags(thread_mode, self.cache_mode, self.open_mode)),
            OpenTarget::Temporary => {
                // an empty name gives a private on-disk database that is deleted on close
                self.name.clear();
                (String::new(), open_flags(thread_mode, self.cache_mode, self.open_mode))
            }
            OpenTarget::InMemory => {
                // the cache visibility is part of the uri
                let flags = libsqlite3_sys::SQLITE_OPEN_URI
                    | libsqlite3_sys::SQLITE_OPEN_READWRITE
                    | libsqlite3_sys::SQLITE_OPEN_CREATE
                    | thread_mode.open_flag();
                (memory_uri(&self.name, self.cache_mode), flags)
            }
        };

        let c_location = match CString::new(location) {
            Ok(location) => location,
            Err(e) => {
                self.last_result_code = Some(libsqlite3_sys::SQLITE_MISUSE);
                self.open_error = format!("Invalid database name: {e}");
                log::warn!("Failed to open database '{}': {}", self.name, self.open_error);
                return false;
            }
        };

        let mut db: *mut libsqlite3_sys::sqlite3 = std::ptr::null_mut();
        let rc = unsafe { libsqlite3_sys::sqlite3_open_v2(c_location.as_ptr(), &mut db, flags, std::ptr::null()) };
        self.last_result_code = Some(rc);

        if rc != libsqlite3_sys::SQLITE_OK {
            self.open_error = if db.is_null() {
                error_string(rc)
            } else {
                Connection::last_sqlite_error(db)
            };
            unsafe { ffi::sqlite3_close_v2(db) };

            log::warn!("Failed to open database '{}': {}", self.name, self.open_error);
            return false;
        }

        self.db = db;
        self.open_error.clear();
        runtime.connection_opened();
        log::debug!("Opened database '{}' ({:?}, {:?}, {:?})", self.name, self.open_mode, self.cache_mode, thread_mode);
        true
    }

    /// Releases the engine handle, a no-op on a closed connection
    pub fn close(&mut self) {
        if self.db.is_null() {
            return;
        }

        // statements that are still alive keep the handle allocated until they are finalized
        unsafe { ffi::sqlite3_close_v2(self.db) };
        self.db = std::ptr::null_mut();
        self.last_result_code = None;
        self.open_error.clear();
        self.runtime.connection_closed();
        log::debug!("Closed database '{}'", self.name);
    }

    pub fn is_open(&self) -> bool {
        !self.db.is_null()
    }

    /// Runs one or more sql statements without parameters, no implicit transaction is started
    pub fn execute(&mut self, query: &str) -> bool {
        match CString::new(query) {
            Ok(sql) => self.execute_sql(&sql),
            Err(e) => {
                log::warn!("Refusing to execute query: {e}");
                self.last_result_code = Some(libsqlite3_sys::SQLITE_MISUSE);
                false
            }
        }
    }

    /// Reads a sql file and runs its content like [`Connection::execute`]
    pub fn execute_script_file(&mut self, sql_path: &Path) -> Result<()> {
        let sql_contents =
            std::fs::read_to_string(sql_path).map_err(|e| Error::Runtime(format!("Failed to open sql file: {}", e)))?;
        let sql = CString::new(sql_contents)?;
        if self.execute_sql(&sql) {
            Ok(())
        } else {
            Err(Error::DatabaseError(self.last_error()))
        }
    }

    fn execute_sql(&mut self, sql: &CStr) -> bool {
        if self.db.is_null() {
            self.last_result_code = Some(libsqlite3_sys::SQLITE_MISUSE);
            return false;
        }

        let rc = unsafe {
            libsqlite3_sys::sqlite3_exec(self.db, sql.as_ptr(), None, std::ptr::null_mut(), std::ptr::null_mut())
        };
        self.last_result_code = Some(rc);
        rc == libsqlite3_sys::SQLITE_OK
    }

    pub fn transaction(&mut self) -> bool {
        self.execute("BEGIN")
    }

    pub fn commit(&mut self) -> bool {
        self.execute("COMMIT")
    }

    pub fn rollback(&mut self) -> bool {
        self.execute("ROLLBACK")
    }

    /// Compiles the query, an invalid statement is returned on failure and the engine code is kept
    /// in [`Connection::last_result_code`]
    pub fn prepare<'b>(&mut self, query: &str) -> Statement<'b> {
        self.prepare_with_length(query, query.len())
    }

    /// Compiles the first `length` bytes of the query
    pub fn prepare_with_length<'b>(&mut self, query: &str, length: usize) -> Statement<'b> {
        debug_assert!(length <= query.len(), "prepare length {length} exceeds the query length");

        if self.db.is_null() {
            self.last_result_code = Some(libsqlite3_sys::SQLITE_MISUSE);
            return Statement::default();
        }

        let Ok(length) = c_int::try_from(length.min(query.len())) else {
            self.last_result_code = Some(libsqlite3_sys::SQLITE_TOOBIG);
            return Statement::default();
        };

        let mut stmt: *mut libsqlite3_sys::sqlite3_stmt = std::ptr::null_mut();
        let sql = query.as_ptr().cast::<c_char>();
        let mut rc = unsafe { libsqlite3_sys::sqlite3_prepare_v2(self.db, sql, length, &mut stmt, std::ptr::null_mut()) };
        while rc == libsqlite3_sys::SQLITE_BUSY {
            sleep(Duration::from_micros(1));
            rc = unsafe { libsqlite3_sys::sqlite3_prepare_v2(self.db, sql, length, &mut stmt, std::ptr::null_mut()) };
        }

        self.last_result_code = Some(rc);
        if rc != libsqlite3_sys::SQLITE_OK {
            return Statement::default();
        }

        Statement::new(stmt)
    }

    pub fn read_double(&mut self, query: &str) -> (f64, ReadStatus) {
        self.read_value(query, |stmt| unsafe { libsqlite3_sys::sqlite3_column_double(stmt, 0) })
    }

    pub fn read_int64(&mut self, query: &str) -> (i64, ReadStatus) {
        self.read_value(query, |stmt| unsafe { libsqlite3_sys::sqlite3_column_int64(stmt, 0) })
    }

    pub fn read_string(&mut self, query: &str) -> (String, ReadStatus) {
        self.read_value(query, |stmt| {
            let data = unsafe { libsqlite3_sys::sqlite3_column_text(stmt, 0) };
            if data.is_null() {
                return String::new();
            }

            let size = unsafe { libsqlite3_sys::sqlite3_column_bytes(stmt, 0) };
            let bytes = unsafe { slice::from_raw_parts(data.cast::<u8>(), size.max(0) as usize) };
            String::from_utf8_lossy(bytes).into_owned()
        })
    }

    /// Reads the value as native endian utf-16
    pub fn read_string16(&mut self, query: &str) -> (Vec<u16>, ReadStatus) {
        self.read_value(query, |stmt| {
            let data = unsafe { ffi::sqlite3_column_text16(stmt, 0) };
            if data.is_null() {
                return Vec::new();
            }

            let size = unsafe { ffi::sqlite3_column_bytes16(stmt, 0) };
            unsafe { slice::from_raw_parts(data.cast::<u16>(), size.max(0) as usize / 2) }.to_vec()
        })
    }

    pub fn database_name(&self) -> &str {
        &self.name
    }

    /// Changes the database name, ignored while the connection is open
    pub fn set_db_name(&mut self, name: impl Into<String>) {
        if self.is_open() {
            log::debug!("Ignoring database name change of open connection '{}'", self.name);
            return;
        }

        self.name = name.into();
    }

    pub fn open_mode(&self) -> OpenMode {
        self.open_mode
    }

    pub fn cache_mode(&self) -> CacheMode {
        self.cache_mode
    }

    /// Filename of the main database as reported by the engine, `None` for closed, temporary and in-memory databases
    pub fn file_path(&self) -> Option<String> {
        if self.db.is_null() {
            return None;
        }

        let filename = unsafe { libsqlite3_sys::sqlite3_db_filename(self.db, c"main".as_ptr()) };
        if filename.is_null() {
            return None;
        }

        let c_str = unsafe { CStr::from_ptr(filename) };
        let path = c_str.to_string_lossy().to_string();
        if path.is_empty() { None } else { Some(path) }
    }

    /// Error message of the last failed operation: the engine message while open, the open failure otherwise
    pub fn last_error(&self) -> String {
        if self.db.is_null() {
            self.open_error.clone()
        } else {
            Connection::last_sqlite_error(self.db)
        }
    }

    /// Engine result code of the most recently attempted operation, `None` when nothing was attempted since
    /// construction or the last close
    pub fn last_result_code(&self) -> Option<c_int> {
        self.last_result_code
    }

    pub fn last_insert_row_id(&self) -> i64 {
        if self.db.is_null() {
            return 0;
        }

        unsafe { libsqlite3_sys::sqlite3_last_insert_rowid(self.db) }
    }

    /// Reconfigures the engine thread mode, see [`Runtime::set_default_thread_mode`]
    pub fn set_default_thread_mode(mode: ThreadMode) -> Result<()> {
        Runtime::global().set_default_thread_mode(mode)
    }

    pub fn default_thread_mode() -> ThreadMode {
        Runtime::global().default_thread_mode()
    }

    /// Connections open in the process, see [`Runtime::engine_connection_count`]
    pub fn opened_connection_count() -> usize {
        Runtime::engine_connection_count()
    }

    fn read_value<T: Default>(
        &mut self,
        query: &str,
        read: impl FnOnce(*mut libsqlite3_sys::sqlite3_stmt) -> T,
    ) -> (T, ReadStatus) {
        if self.db.is_null() {
            self.last_result_code = Some(libsqlite3_sys::SQLITE_MISUSE);
            return (T::default(), ReadStatus::Engine(libsqlite3_sys::SQLITE_MISUSE));
        }

        let Ok(length) = c_int::try_from(query.len()) else {
            self.last_result_code = Some(libsqlite3_sys::SQLITE_TOOBIG);
            return (T::default(), ReadStatus::Engine(libsqlite3_sys::SQLITE_TOOBIG));
        };

        let mut stmt: *mut libsqlite3_sys::sqlite3_stmt = std::ptr::null_mut();
        let rc = unsafe {
            libsqlite3_sys::sqlite3_prepare_v2(self.db, query.as_ptr().cast::<c_char>(), length, &mut stmt, std::ptr::null_mut())
        };
        self.last_result_code = Some(rc);
        if rc != libsqlite3_sys::SQLITE_OK {
            return (T::default(), ReadStatus::Engine(rc));
        }

        let mut value = T::default();
        let status = if unsafe { libsqlite3_sys::sqlite3_column_count(stmt) } == 0 {
            ReadStatus::NoData
        } else {
            match unsafe { libsqlite3_sys::sqlite3_step(stmt) } {
                libsqlite3_sys::SQLITE_ROW => {
                    if column_type(stmt, 0) == ColumnType::Null {
                        ReadStatus::NullValue
                    } else {
                        value = read(stmt);
                        ReadStatus::Success
                    }
                }
                libsqlite3_sys::SQLITE_DONE => ReadStatus::EmptyData,
                step_rc => {
                    self.last_result_code = Some(step_rc);
                    ReadStatus::Engine(step_rc)
                }
            }
        };

        unsafe { libsqlite3_sys::sqlite3_finalize(stmt) };
        (value, status)
    }

    fn last_sqlite_error(db: *mut libsqlite3_sys::sqlite3) -> String {
        let error_message = unsafe { libsqlite3_sys::sqlite3_errmsg(db) };
        if error_message.is_null() {
            return String::new();
        }

        let c_str = unsafe { CStr::from_ptr(error_message) };
        c_str.to_string_lossy().into_owned()
    }
}

// SAFETY: the handle is owned exclusively and `Connection` is not `Sync`, so it is used by one thread at a time.
// The engine allows that in the serialized and multi-thread modes. Single-thread mode disables the engine
// mutexes altogether and is only meant for processes that use sqlite from a single thread.
unsafe impl Send for Connection {}

impl Default for Connection {
    fn default() -> Self {
        Connection::new(String::new(), OpenMode::default(), CacheMode::default())
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("name", &self.name)
            .field("open_mode", &self.open_mode)
            .field("cache_mode", &self.cache_mode)
            .field("open", &self.is_open())
            .finish()
    }
}

fn open_flags(thread_mode: ThreadMode, cache_mode: CacheMode, open_mode: OpenMode) -> c_int {
    let cache_flag = match cache_mode {
        CacheMode::Private => libsqlite3_sys::SQLITE_OPEN_PRIVATECACHE,
        CacheMode::Shared => libsqlite3_sys::SQLITE_OPEN_SHAREDCACHE,
    };

    let access_flags = match open_mode {
        OpenMode::ReadOnly => libsqlite3_sys::SQLITE_OPEN_READONLY,
        OpenMode::ReadWrite => libsqlite3_sys::SQLITE_OPEN_READWRITE,
        OpenMode::ReadWriteCreate | OpenMode::Temporary | OpenMode::InMemory => {
            libsqlite3_sys::SQLITE_OPEN_READWRITE | libsqlite3_sys::SQLITE_OPEN_CREATE
        }
    };

    thread_mode.open_flag() | cache_flag | access_flags
}

/// Uri of an in-memory database, a non empty name makes the database addressable by other connections
/// that use the shared cache
fn memory_uri(name: &str, cache_mode: CacheMode) -> String {
    let cache = match cache_mode {
        CacheMode::Private => "private",
        CacheMode::Shared => "shared",
    };

    if name.is_empty() {
        format!("file::memory:?cache={cache}")
    } else {
        format!("file:{}?mode=memory&cache={cache}", escape_uri_path(name))
    }
}

fn escape_uri_path(name: &str) -> String {
    let mut escaped = String::with_capacity(name.len());
    for c in name.chars() {
        match c {
            '%' => escaped.push_str("%25"),
            '?' => escaped.push_str("%3f"),
            '#' => escaped.push_str("%23"),
            _ => escaped.push(c),
        }
    }
    escaped
}

fn error_string(rc: c_int) -> String {
    let message = unsafe { libsqlite3_sys::sqlite3_errstr(rc) };
    if message.is_null() {
        return format!("sqlite error {rc}");
    }

    unsafe { CStr::from_ptr(message) }.to_string_lossy().into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn memory_connection() -> Connection {
        let mut conn = Connection::new("", OpenMode::InMemory, CacheMode::Private);
        assert!(conn.open());
        conn
    }

    #[test]
    fn read_status_codes() {
        assert_eq!(ReadStatus::Success.code(), 0);
        assert_eq!(ReadStatus::NoData.code(), -1);
        assert_eq!(ReadStatus::EmptyData.code(), -2);
        assert_eq!(ReadStatus::NullValue.code(), -3);
        assert_eq!(ReadStatus::Engine(libsqlite3_sys::SQLITE_ERROR).code(), libsqlite3_sys::SQLITE_ERROR);
    }

    #[test]
    fn in_memory_uris() {
        assert_eq!(memory_uri("", CacheMode::Private), "file::memory:?cache=private");
        assert_eq!(memory_uri("", CacheMode::Shared), "file::memory:?cache=shared");
        assert_eq!(memory_uri("db", CacheMode::Shared), "file:db?mode=memory&cache=shared");
        assert_eq!(memory_uri("a?b#c%", CacheMode::Private), "file:a%3fb%23c%25?mode=memory&cache=private");
    }

    #[test]
    fn regular_open_flags() {
        let flags = open_flags(ThreadMode::Serialized, CacheMode::Shared, OpenMode::ReadOnly);
        assert_eq!(
            flags,
            libsqlite3_sys::SQLITE_OPEN_FULLMUTEX | libsqlite3_sys::SQLITE_OPEN_SHAREDCACHE | libsqlite3_sys::SQLITE_OPEN_READONLY
        );

        let flags = open_flags(ThreadMode::MultiThread, CacheMode::Private, OpenMode::ReadWriteCreate);
        assert_eq!(
            flags,
            libsqlite3_sys::SQLITE_OPEN_NOMUTEX
                | libsqlite3_sys::SQLITE_OPEN_PRIVATECACHE
                | libsqlite3_sys::SQLITE_OPEN_READWRITE
                | libsqlite3_sys::SQLITE_OPEN_CREATE
        );
    }

    #[test_log::test]
    fn open_and_close_are_idempotent() {
        let mut conn = Connection::new("", OpenMode::InMemory, CacheMode::Private);
        assert!(!conn.is_open());
        assert_eq!(conn.last_result_code(), None);

        assert!(conn.open());
        assert!(conn.is_open());
        assert_eq!(conn.last_result_code(), Some(libsqlite3_sys::SQLITE_OK));
        assert!(conn.open());

        conn.close();
        assert!(!conn.is_open());
        assert_eq!(conn.last_result_code(), None);
        conn.close();
        assert!(!conn.is_open());
    }

    #[test]
    fn read_single_values() {
        let mut conn = memory_connection();

        assert_eq!(conn.read_int64("SELECT 1"), (1, ReadStatus::Success));
        assert_eq!(conn.read_double("SELECT 2.5"), (2.5, ReadStatus::Success));
        assert_eq!(conn.read_string("SELECT 'abc'"), ("abc".to_string(), ReadStatus::Success));
        assert_eq!(
            conn.read_string16("SELECT 'abc'"),
            ("abc".encode_utf16().collect::<Vec<u16>>(), ReadStatus::Success)
        );
    }

    #[test]
    fn read_classification() {
        let mut conn = memory_connection();
        assert!(conn.execute("CREATE TABLE T (id INTEGER PRIMARY KEY, value TEXT)"));
        assert!(conn.execute("INSERT INTO T(id, value) VALUES (1, NULL)"));

        assert_eq!(conn.read_int64("SELECT id FROM T WHERE 1=0"), (0, ReadStatus::EmptyData));
        assert_eq!(conn.read_string("SELECT value FROM T WHERE id = 1"), (String::new(), ReadStatus::NullValue));
        assert_eq!(conn.read_int64("SELECT value FROM T"), (0, ReadStatus::NullValue));
        assert_eq!(conn.read_int64("DELETE FROM T WHERE id = 5"), (0, ReadStatus::NoData));

        let (value, status) = conn.read_int64("SELEKT garbage");
        assert_eq!(value, 0);
        assert!(matches!(status, ReadStatus::Engine(rc) if rc > 0));
        assert_eq!(status.code(), libsqlite3_sys::SQLITE_ERROR);
        assert_eq!(conn.last_result_code(), Some(libsqlite3_sys::SQLITE_ERROR));
        assert!(conn.last_error().contains("syntax error"));
    }

    #[test]
    fn read_failing_while_stepping() {
        let mut conn = memory_connection();

        // compiles fine, the overflow is only detected when the row is computed
        let (value, status) = conn.read_int64("SELECT abs(-9223372036854775807 - 1)");
        assert_eq!(value, 0);
        assert_eq!(status, ReadStatus::Engine(libsqlite3_sys::SQLITE_ERROR));
        assert_eq!(conn.last_result_code(), Some(libsqlite3_sys::SQLITE_ERROR));
        assert!(conn.last_error().contains("integer overflow"));

        // the statement was finalized, the connection stays usable
        assert_eq!(conn.read_int64("SELECT 3"), (3, ReadStatus::Success));
    }

    #[test]
    fn read_on_closed_connection() {
        let mut conn = Connection::new("", OpenMode::InMemory, CacheMode::Private);
        assert_eq!(conn.read_int64("SELECT 1"), (0, ReadStatus::Engine(libsqlite3_sys::SQLITE_MISUSE)));
        assert!(!conn.execute("SELECT 1"));
        assert!(!conn.prepare("SELECT 1").is_valid());
        assert_eq!(conn.last_insert_row_id(), 0);
    }

    #[test]
    fn execute_updates_last_result_code() {
        let mut conn = memory_connection();
        assert!(conn.execute("CREATE TABLE T (id INTEGER PRIMARY KEY); INSERT INTO T VALUES (1); INSERT INTO T VALUES (2)"));
        assert_eq!(conn.last_result_code(), Some(libsqlite3_sys::SQLITE_OK));
        assert_eq!(conn.last_insert_row_id(), 2);

        assert!(!conn.execute("INSERT INTO T VALUES (1)"));
        assert_eq!(conn.last_result_code(), Some(libsqlite3_sys::SQLITE_CONSTRAINT));

        assert!(!conn.execute("INSERT INTO Missing VALUES (1)"));
        assert_eq!(conn.last_result_code(), Some(libsqlite3_sys::SQLITE_ERROR));
        assert!(conn.last_error().contains("no such table"));
    }

    #[test]
    fn transaction_rollback_and_commit() {
        let mut conn = memory_connection();
        assert!(conn.execute("CREATE TABLE T (id INTEGER PRIMARY KEY)"));

        assert!(conn.transaction());
        assert!(conn.execute("INSERT INTO T VALUES (1)"));
        assert!(conn.rollback());
        assert_eq!(conn.read_int64("SELECT count(*) FROM T").0, 0);

        assert!(conn.transaction());
        assert!(conn.execute("INSERT INTO T VALUES (1)"));
        assert!(conn.commit());
        assert_eq!(conn.read_int64("SELECT count(*) FROM T").0, 1);

        assert!(!conn.commit());
    }

    #[test]
    fn prepare_failure_records_code() {
        let mut conn = memory_connection();
        let stmt = conn.prepare("SELECT * FROM Missing");
        assert!(!stmt.is_valid());
        assert_eq!(conn.last_result_code(), Some(libsqlite3_sys::SQLITE_ERROR));
    }

    #[test]
    fn prepare_prefix_of_query() {
        let mut conn = memory_connection();
        let query = "SELECT 42; this part is never compiled";
        let mut stmt = conn.prepare_with_length(query, "SELECT 42".len());
        assert!(stmt.is_valid());
        assert!(stmt.next());
        assert_eq!(stmt.column_int(0), 42);
    }

    #[test_log::test]
    fn shared_cache_memory_databases_see_each_others_writes() {
        let mut writer = Connection::new("shared_cache_memory_test", OpenMode::InMemory, CacheMode::Shared);
        let mut reader = Connection::new("shared_cache_memory_test", OpenMode::InMemory, CacheMode::Shared);
        assert!(writer.open());
        assert!(reader.open());

        assert!(writer.execute("CREATE TABLE T (id INTEGER); INSERT INTO T VALUES (7)"));
        assert_eq!(reader.read_int64("SELECT id FROM T"), (7, ReadStatus::Success));
    }

    #[test]
    fn private_cache_memory_databases_are_isolated() {
        let mut first = Connection::new("private_cache_memory_test", OpenMode::InMemory, CacheMode::Private);
        let mut second = Connection::new("private_cache_memory_test", OpenMode::InMemory, CacheMode::Private);
        assert!(first.open());
        assert!(second.open());

        assert!(first.execute("CREATE TABLE T (id INTEGER); INSERT INTO T VALUES (7)"));
        let (_, status) = second.read_int64("SELECT id FROM T");
        assert_eq!(status, ReadStatus::Engine(libsqlite3_sys::SQLITE_ERROR));
    }

    #[test]
    fn set_db_name_only_while_closed() -> Result<()> {
        let tmp = TempDir::new()?;
        let first = tmp.path().join("first.db").to_string_lossy().to_string();
        let second = tmp.path().join("second.db").to_string_lossy().to_string();

        for mode in [OpenMode::ReadWriteCreate, OpenMode::ReadWrite, OpenMode::ReadOnly] {
            let mut conn = Connection::new("", mode, CacheMode::Private);
            conn.set_db_name(&first);
            assert_eq!(conn.database_name(), first);

            if mode == OpenMode::ReadWriteCreate {
                assert!(conn.open());
                conn.set_db_name(&second);
                assert_eq!(conn.database_name(), first);
                assert!(conn.file_path().is_some_and(|p| p.ends_with("first.db")));
            }
        }

        // the database exists now, so the other modes can open it as well
        for mode in [OpenMode::ReadWrite, OpenMode::ReadOnly] {
            let mut conn = Connection::new(first.as_str(), mode, CacheMode::Private);
            assert!(conn.open());
            conn.set_db_name(&second);
            assert_eq!(conn.database_name(), first);
        }

        assert!(!tmp.path().join("second.db").exists());
        Ok(())
    }

    #[test]
    fn temporary_database_discards_name() {
        let mut conn = Connection::new("ignored.db", OpenMode::Temporary, CacheMode::Private);
        assert!(conn.open());
        assert_eq!(conn.database_name(), "");
        assert!(conn.execute("CREATE TABLE T (id INTEGER)"));
        assert!(conn.file_path().is_none());
        assert!(!std::path::Path::new("ignored.db").exists());
    }

    #[test]
    fn read_only_database_rejects_writes() -> Result<()> {
        let tmp = TempDir::new()?;
        let path = tmp.path().join("ro.db");
        {
            let mut conn = Connection::new(path.to_string_lossy(), OpenMode::ReadWriteCreate, CacheMode::Private);
            assert!(conn.open());
            assert!(conn.execute("CREATE TABLE T (id INTEGER)"));
        }

        let mut conn = Connection::new(path.to_string_lossy(), OpenMode::ReadOnly, CacheMode::Private);
        assert!(conn.open());
        assert!(!conn.execute("INSERT INTO T VALUES (1)"));
        assert_eq!(conn.last_result_code(), Some(libsqlite3_sys::SQLITE_READONLY));
        Ok(())
    }

    #[test]
    fn open_failure_keeps_message() -> Result<()> {
        let tmp = TempDir::new()?;
        let path = tmp.path().join("missing.db");

        let mut conn = Connection::new(path.to_string_lossy(), OpenMode::ReadWrite, CacheMode::Private);
        assert!(!conn.open());
        assert!(!conn.is_open());
        assert_eq!(conn.last_result_code(), Some(libsqlite3_sys::SQLITE_CANTOPEN));
        assert!(!conn.last_error().is_empty());
        assert!(!path.exists());
        Ok(())
    }

    #[test]
    fn execute_script_file() -> Result<()> {
        let tmp = TempDir::new()?;
        let script = tmp.path().join("schema.sql");
        std::fs::write(&script, "CREATE TABLE T (id INTEGER);\nINSERT INTO T VALUES (1);\nINSERT INTO T VALUES (2);\n")?;

        let mut conn = memory_connection();
        conn.execute_script_file(&script)?;
        assert_eq!(conn.read_int64("SELECT count(*) FROM T"), (2, ReadStatus::Success));

        assert!(matches!(
            conn.execute_script_file(&tmp.path().join("missing.sql")),
            Err(Error::Runtime(_))
        ));

        std::fs::write(&script, "CREATE TABLE T (id INTEGER);")?;
        assert!(matches!(conn.execute_script_file(&script), Err(Error::DatabaseError(msg)) if msg.contains("already exists")));

        // nothing of a script with an embedded nul byte is executed
        std::fs::write(&script, "CREATE TABLE N (id INTEGER);\0CREATE TABLE M (id INTEGER);")?;
        assert!(matches!(conn.execute_script_file(&script), Err(Error::InvalidString(_))));
        assert_eq!(
            conn.read_int64("SELECT count(*) FROM sqlite_master WHERE name IN ('N', 'M')"),
            (0, ReadStatus::Success)
        );
        Ok(())
    }

    #[test]
    fn moving_transfers_the_handle() {
        let mut source = memory_connection();
        assert!(source.execute("CREATE TABLE T (id INTEGER); INSERT INTO T VALUES (3)"));

        let mut target = Connection::new("", OpenMode::InMemory, CacheMode::Private);
        assert!(target.open());

        // the previous handle of the target is closed when it is overwritten
        target = std::mem::take(&mut source);
        assert!(!source.is_open());
        assert_eq!(source.database_name(), "");
        assert_eq!(target.read_int64("SELECT id FROM T"), (3, ReadStatus::Success));
    }

    #[test]
    fn statement_outlives_closed_connection() {
        let mut conn = memory_connection();
        let stmt = conn.prepare("SELECT 1");
        conn.close();
        assert!(stmt.is_valid());
        drop(stmt);
    }

    #[test_log::test]
    fn connection_moves_to_worker_thread() {
        let mut conn = memory_connection();
        assert!(conn.execute("CREATE TABLE T (id INTEGER); INSERT INTO T VALUES (11)"));

        let worker = std::thread::spawn(move || {
            let value = conn.read_int64("SELECT id FROM T");
            (conn, value)
        });

        let (mut conn, value) = worker.join().expect("worker thread panicked");
        assert_eq!(value, (11, ReadStatus::Success));
        assert!(conn.execute("INSERT INTO T VALUES (12)"));
        assert_eq!(conn.read_int64("SELECT count(*) FROM T"), (2, ReadStatus::Success));
    }
}
