//! Declarative FFI binding layer
//!
//! Describes native call signatures, binds them to library symbols and layers
//! result checking and optional tracing over every call.
//!
//! # Architecture
//!
//! ```text
//! SignatureRegistry (FfiSignature per symbol)
//!       │
//!       ▼
//! Synthesizer ── SymbolSource (NativeLibrary via libloading, StaticSymbols)
//!       │
//!       ▼
//! BoundFunction = [Traced] ∘ RawFunction ── ResultChecker (checked returns)
//!       │
//!       ▼
//! Native Function Call
//! ```
//!
//! # Example
//!
//! ```ignore
//! let library = loader::library()?;
//! let synth = Synthesizer::for_library(library)?;
//! let get_serial = synth.synthesize(FfiSignature::parse("char* get_serial(int p)")?)?;
//! let serial = get_serial.call(&[Arg::Int(1)])?;
//! ```

mod checker;
mod error;
pub mod loader;
mod registry;
mod synth;
mod trace;
mod types;

pub use checker::{
    LibraryMessages, MessageLookup, ResultChecker, ReturnCodeChecker, UNKNOWN_MESSAGE,
};
pub use error::{BindError, CallError, MalformedHandle, RemoteOperationError};
pub use loader::{NativeEntry, NativeLibrary, Platform, StaticSymbols, SymbolSource};
pub use registry::{Bindings, SignatureRegistry};
pub use synth::{BoundFunction, Callable, RawFunction, Synthesizer, MAX_PARAMS};
pub use trace::{
    Formatter, FormatterTable, MemoryTrace, TraceSink, Traced, Tracer, BACKTRACE_HEADER,
    OUT_PLACEHOLDER, UNRENDERABLE,
};
pub use types::{
    describe_record, Arg, Direction, FfiSignature, FfiType, NativeRecord, NativeType,
    OpaqueHandle, OutSlot, ParamDescriptor, RecordLayout, ReturnKind, Value,
};
