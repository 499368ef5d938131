use crate::{Error, Result};
use parking_lot::{Mutex, MutexGuard};
use std::ffi::c_int;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

/// Engine-wide concurrency level, applied through `sqlite3_config`
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum ThreadMode {
    Serialized = 0,
    MultiThread = 1,
    SingleThread = 2,
}

impl ThreadMode {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => ThreadMode::Serialized,
            1 => ThreadMode::MultiThread,
            _ => ThreadMode::SingleThread,
        }
    }

    fn config_option(self) -> c_int {
        match self {
            ThreadMode::Serialized => libsqlite3_sys::SQLITE_CONFIG_SERIALIZED,
            ThreadMode::MultiThread => libsqlite3_sys::SQLITE_CONFIG_MULTITHREAD,
            ThreadMode::SingleThread => libsqlite3_sys::SQLITE_CONFIG_SINGLETHREAD,
        }
    }

    /// The mutex class flag passed to `sqlite3_open_v2`
    pub(crate) fn open_flag(self) -> c_int {
        match self {
            ThreadMode::Serialized => libsqlite3_sys::SQLITE_OPEN_FULLMUTEX,
            ThreadMode::MultiThread => libsqlite3_sys::SQLITE_OPEN_NOMUTEX,
            ThreadMode::SingleThread => 0,
        }
    }
}

/// Engine configuration and the open connections of every [`Runtime`], the engine itself is process wide
struct Engine {
    thread_mode: AtomicU8,
    open_connections: AtomicUsize,
    open_lock: Mutex<()>,
}

fn engine() -> &'static Engine {
    static ENGINE: OnceLock<Engine> = OnceLock::new();
    ENGINE.get_or_init(|| {
        let mode = if unsafe { libsqlite3_sys::sqlite3_threadsafe() } != 0 {
            ThreadMode::Serialized
        } else {
            ThreadMode::SingleThread
        };

        Engine {
            thread_mode: AtomicU8::new(mode as u8),
            open_connections: AtomicUsize::new(0),
            open_lock: Mutex::new(()),
        }
    })
}

/// Bookkeeping of the connections opened through it, on top of the process wide engine state.
///
/// The process normally uses a single instance obtained through [`Runtime::global`].
/// Separate instances (see [`Runtime::new`]) only isolate the connection count: the thread mode, the open lock
/// and the guard against reconfiguring the engine under live connections are shared by all of them.
pub struct Runtime {
    open_connections: AtomicUsize,
}

impl Runtime {
    pub fn new() -> Self {
        Runtime {
            open_connections: AtomicUsize::new(0),
        }
    }

    pub fn global() -> Arc<Runtime> {
        static GLOBAL: OnceLock<Arc<Runtime>> = OnceLock::new();
        GLOBAL.get_or_init(|| Arc::new(Runtime::new())).clone()
    }

    /// Engine thread mode used for new connections, initially derived from the engine's compile-time threading capability
    pub fn default_thread_mode(&self) -> ThreadMode {
        ThreadMode::from_u8(engine().thread_mode.load(Ordering::Acquire))
    }

    /// Connections of this runtime that are currently open
    pub fn opened_connection_count(&self) -> usize {
        self.open_connections.load(Ordering::Acquire)
    }

    /// Connections open in the process, across all runtimes
    pub fn engine_connection_count() -> usize {
        engine().open_connections.load(Ordering::Acquire)
    }

    /// Reconfigures the engine thread mode.
    /// Refused while any connection is open, whichever runtime opened it. The new mode only applies to connections opened afterwards.
    pub fn set_default_thread_mode(&self, mode: ThreadMode) -> Result<()> {
        let engine = engine();
        let _guard = engine.open_lock.lock();

        let open = engine.open_connections.load(Ordering::Acquire);
        if open > 0 {
            return Err(Error::ThreadModeLocked(open));
        }

        let option = mode.config_option();
        let mut rc = unsafe { libsqlite3_sys::sqlite3_config(option) };
        if rc == libsqlite3_sys::SQLITE_MISUSE {
            // the library is already initialized, it has to be shut down before it accepts configuration
            rc = unsafe { libsqlite3_sys::sqlite3_shutdown() };
            if rc == libsqlite3_sys::SQLITE_OK {
                rc = unsafe { libsqlite3_sys::sqlite3_config(option) };
            }
        }

        if rc != libsqlite3_sys::SQLITE_OK {
            log::warn!("Failed to configure sqlite thread mode {mode:?} (rc {rc})");
            return Err(Error::ThreadModeConfig(rc));
        }

        engine.thread_mode.store(mode as u8, Ordering::Release);
        log::debug!("Sqlite thread mode set to {mode:?}");
        Ok(())
    }

    /// Held for the duration of a connection open so the thread mode cannot change halfway
    pub(crate) fn lock_open(&self) -> MutexGuard<'static, ()> {
        engine().open_lock.lock()
    }

    pub(crate) fn connection_opened(&self) {
        engine().open_connections.fetch_add(1, Ordering::AcqRel);
        self.open_connections.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn connection_closed(&self) {
        engine().open_connections.fetch_sub(1, Ordering::AcqRel);
        self.open_connections.fetch_sub(1, Ordering::AcqRel);
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Runtime::new()
    }
}
