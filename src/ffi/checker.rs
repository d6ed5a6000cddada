//! Result Checking
//!
//! Turns the integer code of a checked call into success or a
//! [`RemoteOperationError`]. This is the only error-translation path: no
//! retries and no partial success.

use std::mem;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use libc::{c_char, c_int};

use super::loader::{NativeEntry, SymbolSource};
use super::types::string_at;
use super::{BindError, RemoteOperationError};

/// Message used when the library cannot describe an error code
pub const UNKNOWN_MESSAGE: &str = "Unknown";

/// Maps a library error code to a human-readable message
pub trait MessageLookup: Send + Sync {
    /// `None` when the code has no message
    fn message(&self, code: i32) -> Option<String>;
}

impl<F> MessageLookup for F
where
    F: Fn(i32) -> Option<String> + Send + Sync,
{
    fn message(&self, code: i32) -> Option<String> {
        self(code)
    }
}

/// The library's own `lc_strerror` entry point.
///
/// Called directly rather than through a bound function so that checking and
/// tracing never recurse into themselves.
pub struct LibraryMessages {
    entry: NativeEntry,
    _source: Arc<dyn SymbolSource>,
}

impl LibraryMessages {
    pub const SYMBOL: &'static str = "lc_strerror";

    pub fn resolve(source: Arc<dyn SymbolSource>) -> Result<Self, BindError> {
        let entry = source.resolve(Self::SYMBOL)?;
        Ok(Self {
            entry,
            _source: source,
        })
    }
}

impl MessageLookup for LibraryMessages {
    fn message(&self, code: i32) -> Option<String> {
        type StrError = unsafe extern "C" fn(c_int) -> *const c_char;
        // Safety: `lc_strerror` is declared `const char *lc_strerror(int)` and
        // returns either NULL or a static string.
        unsafe {
            let f: StrError = mem::transmute::<usize, StrError>(self.entry.addr());
            string_at(f(code as c_int) as usize)
        }
    }
}

/// Post-call policy for checked return codes
pub trait ResultChecker: Send + Sync {
    /// Pass `raw` through on success, or describe the failure
    fn check(&self, function: &str, raw: i32) -> Result<i32, RemoteOperationError>;
}

/// Zero is success; anything else becomes a [`RemoteOperationError`]
pub struct ReturnCodeChecker {
    lookup: Arc<dyn MessageLookup>,
}

impl ReturnCodeChecker {
    pub fn new(lookup: Arc<dyn MessageLookup>) -> Self {
        Self { lookup }
    }

    /// Message for `code`; never fails, even if the lookup panics
    pub fn describe(&self, code: i32) -> String {
        let lookup = &self.lookup;
        match panic::catch_unwind(AssertUnwindSafe(|| lookup.message(code))) {
            Ok(Some(message)) => message,
            Ok(None) | Err(_) => {
                log::warn!("no message for libconcord error code {}", code);
                UNKNOWN_MESSAGE.to_string()
            }
        }
    }
}

impl ResultChecker for ReturnCodeChecker {
    fn check(&self, function: &str, raw: i32) -> Result<i32, RemoteOperationError> {
        if raw == 0 {
            return Ok(raw);
        }
        Err(RemoteOperationError {
            function: function.to_string(),
            code: raw,
            message: self.describe(raw),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn checker(lookup: impl Fn(i32) -> Option<String> + Send + Sync + 'static) -> ReturnCodeChecker {
        ReturnCodeChecker::new(Arc::new(lookup))
    }

    #[test]
    fn test_zero_passes_through() {
        let c = checker(|_| Some("never".to_string()));
        assert_eq!(c.check("init_concord", 0), Ok(0));
    }

    #[test]
    fn test_nonzero_fails_with_message() {
        let c = checker(|code| (code == 11).then(|| "Error connecting".to_string()));
        let err = c.check("init_concord", 11).unwrap_err();
        assert_eq!(err.function, "init_concord");
        assert_eq!(err.code, 11);
        assert_eq!(err.message, "Error connecting");
        assert_eq!(
            err.to_string(),
            "libconcord function 'init_concord' failed with error code 11 (Error connecting)"
        );
    }

    #[test]
    fn test_missing_message_is_unknown() {
        let c = checker(|_| None);
        assert_eq!(c.check("get_time", 9).unwrap_err().message, UNKNOWN_MESSAGE);
    }

    #[test]
    fn test_panicking_lookup_is_unknown() {
        let c = checker(|_| panic!("lookup exploded"));
        let err = c.check("set_time", 10).unwrap_err();
        assert_eq!(err.code, 10);
        assert_eq!(err.message, UNKNOWN_MESSAGE);
    }
}
