//! concord-ffi - declarative bindings for libconcord
//!
//! libconcord drives Logitech Harmony remotes over USB. This crate binds its C
//! entry points from a table of declarations instead of hand-written wrappers:
//! every function gets the same argument marshaling, the same return-code
//! checking and, when enabled, the same call tracing.
//!
//! # Layers
//!
//! - **Type descriptors** ([`ffi::FfiType`], [`ffi::FfiSignature`]): what each
//!   native function takes and returns, including OUT parameters
//! - **Signature registry** ([`ffi::SignatureRegistry`]): the declaration table
//! - **Synthesizer** ([`ffi::Synthesizer`]): binds a signature to a symbol and
//!   yields a [`ffi::BoundFunction`]
//! - **Result checker** ([`ffi::ReturnCodeChecker`]): turns non-zero return
//!   codes into [`ffi::RemoteOperationError`]
//! - **Trace interceptor** ([`ffi::Tracer`]): logs arguments, results, OUT
//!   values and failures of every call
//! - **Library loader** ([`ffi::loader`]): finds and loads the platform's
//!   libconcord once per process
//!
//! # Example
//!
//! ```ignore
//! use concord_ffi::concord;
//! use concord_ffi::ffi::{Arg, OpaqueHandle};
//!
//! let lc = concord::bindings()?;
//! lc.call("init_concord", &[])?;
//! let none = Arg::Handle(OpaqueHandle::NULL);
//! lc.call("get_identity", &[none, none])?;
//! let mfg = lc.call("get_mfg", &[])?;
//! ```
//!
//! # Tracing
//!
//! Set `LIBCONCORD_TRACE=1` (or `trace.enabled = true` in the config file) to
//! print every libconcord call and its outcome to standard output.

#![allow(missing_docs)]
#![warn(clippy::all)]

pub mod concord;
pub mod config;
pub mod ffi;

pub use config::{BindingConfig, ConfigError};
pub use ffi::{
    Arg, BindError, Bindings, BoundFunction, CallError, FfiSignature, FfiType, OpaqueHandle,
    OutSlot, RemoteOperationError, SignatureRegistry, Synthesizer, Value,
};
