//! libconcord bindings
//!
//! The ABI constants, the record types and the signature table for the
//! libconcord shared library, plus the process-wide [`bindings`] built from
//! them.
//!
//! ```ignore
//! use concord_ffi::concord;
//! use concord_ffi::ffi::{Arg, OpaqueHandle, OutSlot};
//!
//! let lc = concord::bindings()?;
//! lc.call("init_concord", &[])?;
//! let size = OutSlot::scalar();
//! let none = Arg::Handle(OpaqueHandle::NULL);
//! lc.call("erase_config", &[Arg::Out(&size), none, none])?;
//! ```

pub mod records;
mod signatures;

use std::sync::Arc;

use libc::c_void;
use once_cell::sync::OnceCell;

use crate::config;
use crate::ffi::{loader, BindError, Bindings, FormatterTable, SymbolSource, Synthesizer};

pub use signatures::signatures;

/// Library ABI this table describes
pub const ABI_VERSION: u32 = 6;

// Return codes of checked functions (0 is success)
pub const LC_ERROR: i32 = 1;
pub const LC_ERROR_INVALID_DATA_FROM_REMOTE: i32 = 2;
pub const LC_ERROR_READ: i32 = 3;
pub const LC_ERROR_WRITE: i32 = 4;
pub const LC_ERROR_INVALIDATE: i32 = 5;
pub const LC_ERROR_ERASE: i32 = 6;
pub const LC_ERROR_VERIFY: i32 = 7;
pub const LC_ERROR_POST: i32 = 8;
pub const LC_ERROR_GET_TIME: i32 = 9;
pub const LC_ERROR_SET_TIME: i32 = 10;
pub const LC_ERROR_CONNECT: i32 = 11;
pub const LC_ERROR_OS: i32 = 12;
pub const LC_ERROR_OS_NET: i32 = 13;
pub const LC_ERROR_OS_FILE: i32 = 14;
pub const LC_ERROR_UNSUPP: i32 = 15;
pub const LC_ERROR_INVALID_CONFIG: i32 = 16;
pub const LC_ERROR_IR_OVERFLOW: i32 = 17;

// identify_file results
pub const LC_FILE_TYPE_CONNECTIVITY: i32 = 0;
pub const LC_FILE_TYPE_CONFIGURATION: i32 = 1;
pub const LC_FILE_TYPE_FIRMWARE: i32 = 2;
pub const LC_FILE_TYPE_LEARN_IR: i32 = 3;

// get_serial selectors
pub const SERIAL_COMPONENT_1: i32 = 1;
pub const SERIAL_COMPONENT_2: i32 = 2;
pub const SERIAL_COMPONENT_3: i32 = 3;

/// Progress callback: `(count, current, total, cb_arg)`
pub type LcCallback = extern "C" fn(u32, u32, u32, *mut c_void);

/// Trace formatters for every libconcord parameter type
pub fn formatters() -> FormatterTable {
    FormatterTable::standard().with_records(&records::layouts())
}

static BINDINGS: OnceCell<Result<Bindings, BindError>> = OnceCell::new();

/// The libconcord bindings, created on first use.
///
/// Loads the library, binds every declared function and applies the trace
/// setting once. A failure is cached: later calls report the same error.
pub fn bindings() -> Result<&'static Bindings, BindError> {
    BINDINGS
        .get_or_init(|| {
            let config = config::global()?;
            let library: Arc<dyn SymbolSource> = loader::library()?;
            let synth = Synthesizer::for_library(library)?.configured(config, formatters());
            signatures()?.bind(&synth)
        })
        .as_ref()
        .map_err(Clone::clone)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_are_contiguous() {
        let codes = [
            LC_ERROR,
            LC_ERROR_INVALID_DATA_FROM_REMOTE,
            LC_ERROR_READ,
            LC_ERROR_WRITE,
            LC_ERROR_INVALIDATE,
            LC_ERROR_ERASE,
            LC_ERROR_VERIFY,
            LC_ERROR_POST,
            LC_ERROR_GET_TIME,
            LC_ERROR_SET_TIME,
            LC_ERROR_CONNECT,
            LC_ERROR_OS,
            LC_ERROR_OS_NET,
            LC_ERROR_OS_FILE,
            LC_ERROR_UNSUPP,
            LC_ERROR_INVALID_CONFIG,
            LC_ERROR_IR_OVERFLOW,
        ];
        for (i, code) in codes.iter().enumerate() {
            assert_eq!(*code, i as i32 + 1);
        }
    }

    #[test]
    fn test_formatters_cover_records() {
        let table = formatters();
        for layout in records::layouts() {
            let rendered = table.render(
                &crate::ffi::FfiType::Struct(layout),
                &crate::ffi::Value::Handle(crate::ffi::OpaqueHandle::from_addr(0x1000)),
            );
            assert_ne!(rendered, crate::ffi::UNRENDERABLE);
        }
    }
}
