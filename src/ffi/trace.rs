//! Call Tracing
//!
//! [`Traced`] wraps any [`Callable`] and writes each call, its return value,
//! its output parameters and any failure to a [`TraceSink`]. It never changes
//! the outcome of the call.
//!
//! ```text
//! libconcord.erase_config(size=<<out>>, cb=<<function @0x55d0c1a0>>, cb_arg=<<data @0x00000000>>)
//!     Threw:
//!         libconcord function 'erase_config' failed with error code 6 (Error while erasing flash)
//! ```
//!
//! With `RUST_BACKTRACE` set, a `Threw:` block ends with a backtrace taken at
//! the interceptor, not at the point the failure was raised.

use std::any::Any;
use std::backtrace::{Backtrace, BacktraceStatus};
use std::collections::HashMap;
use std::error::Error;
use std::io::{self, Write};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::Mutex;

use super::synth::Callable;
use super::types::{Arg, FfiSignature, FfiType, RecordLayout, ReturnKind, Value};
use super::CallError;

/// Placeholder for anything that cannot be rendered
pub const UNRENDERABLE: &str = "???";

/// Placeholder for an output parameter before the call
pub const OUT_PLACEHOLDER: &str = "<<out>>";

/// First line of a backtrace in a `Threw:` block
pub const BACKTRACE_HEADER: &str = "stack backtrace (at the trace point):";

/// Renders one value of a given type; `None` means "cannot render"
pub type Formatter = fn(&FfiType, &Value) -> Option<String>;

/// Formatters keyed by parameter type
#[derive(Clone)]
pub struct FormatterTable {
    entries: HashMap<FfiType, Formatter>,
}

impl FormatterTable {
    /// A table with no formatters; everything renders as `???`
    pub fn empty() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Formatters for every built-in type
    pub fn standard() -> Self {
        let mut table = Self::empty();
        for ty in [
            FfiType::I8,
            FfiType::U8,
            FfiType::I16,
            FfiType::U16,
            FfiType::I32,
            FfiType::U32,
            FfiType::I64,
            FfiType::U64,
            FfiType::CStr,
        ] {
            table.register(ty, format_simple);
        }
        for ty in [FfiType::Bytes, FfiType::Words, FfiType::StrArray] {
            table.register(ty, format_buffer);
        }
        table.register(FfiType::Callback, format_function);
        table.register(FfiType::UserData, format_data);
        table
    }

    /// Add formatters for record types
    pub fn with_records(mut self, layouts: &[&'static RecordLayout]) -> Self {
        for layout in layouts {
            self.register(FfiType::Struct(*layout), format_record);
        }
        self
    }

    pub fn register(&mut self, ty: FfiType, formatter: Formatter) {
        self.entries.insert(ty, formatter);
    }

    pub fn remove(&mut self, ty: &FfiType) -> Option<Formatter> {
        self.entries.remove(ty)
    }

    /// Render `value`, degrading to `???` on any failure
    pub fn render(&self, ty: &FfiType, value: &Value) -> String {
        let Some(formatter) = self.entries.get(ty) else {
            return UNRENDERABLE.to_string();
        };
        match panic::catch_unwind(AssertUnwindSafe(|| formatter(ty, value))) {
            Ok(Some(text)) => text,
            Ok(None) | Err(_) => UNRENDERABLE.to_string(),
        }
    }
}

impl Default for FormatterTable {
    fn default() -> Self {
        Self::standard()
    }
}

fn format_simple(_: &FfiType, value: &Value) -> Option<String> {
    match value {
        Value::Int(_) | Value::UInt(_) | Value::Str(_) => Some(value.to_string()),
        _ => None,
    }
}

fn format_pointer(tag: &str, value: &Value) -> Option<String> {
    let handle = value.as_handle()?;
    Some(format!("<<{} @{:#010x}>>", tag, handle.addr()))
}

fn format_buffer(_: &FfiType, value: &Value) -> Option<String> {
    format_pointer("buffer", value)
}

fn format_function(_: &FfiType, value: &Value) -> Option<String> {
    format_pointer("function", value)
}

fn format_data(_: &FfiType, value: &Value) -> Option<String> {
    format_pointer("data", value)
}

fn format_record(ty: &FfiType, value: &Value) -> Option<String> {
    match (ty, value) {
        (FfiType::Struct(layout), Value::Handle(_)) => {
            format_pointer(&format!("struct {}", layout.name), value)
        }
        (_, Value::Record(_)) => Some(value.to_string()),
        _ => None,
    }
}

/// Where trace lines go
#[derive(Clone)]
pub struct TraceSink {
    inner: Arc<Mutex<Box<dyn Write + Send>>>,
}

impl TraceSink {
    pub fn stdout() -> Self {
        Self::from_writer(io::stdout())
    }

    pub fn from_writer(writer: impl Write + Send + 'static) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Box::new(writer))),
        }
    }

    /// Sink writing to memory, plus a handle to read it back
    pub fn memory() -> (Self, MemoryTrace) {
        let memory = MemoryTrace::default();
        (Self::from_writer(memory.clone()), memory)
    }

    fn write_line(&self, line: &str) {
        let mut out = self.inner.lock();
        // Trace output is best effort.
        let _ = writeln!(out, "{}", line);
        let _ = out.flush();
    }
}

/// In-memory trace output
#[derive(Clone, Default)]
pub struct MemoryTrace(Arc<Mutex<Vec<u8>>>);

impl MemoryTrace {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock()).into_owned()
    }

    pub fn lines(&self) -> Vec<String> {
        self.contents().lines().map(str::to_string).collect()
    }

    pub fn clear(&self) {
        self.0.lock().clear();
    }
}

impl Write for MemoryTrace {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Shared tracing state: sink, formatters and the printed library name
#[derive(Clone)]
pub struct Tracer {
    sink: TraceSink,
    formatters: Arc<FormatterTable>,
    prefix: String,
}

impl Tracer {
    pub fn new(sink: TraceSink, formatters: FormatterTable) -> Self {
        Self {
            sink,
            formatters: Arc::new(formatters),
            prefix: "libconcord".to_string(),
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    fn call_line(&self, sig: &FfiSignature, args: &[Arg<'_>]) -> String {
        let rendered: Vec<String> = args
            .iter()
            .zip(&sig.params)
            .map(|(arg, param)| {
                let value = if param.is_out() {
                    OUT_PLACEHOLDER.to_string()
                } else {
                    match arg.value() {
                        Some(v) => self.formatters.render(&param.ty, &v),
                        None => UNRENDERABLE.to_string(),
                    }
                };
                format!("{}={}", param.name, value)
            })
            .collect();
        format!("{}.{}({})", self.prefix, sig.name, rendered.join(", "))
    }

    fn return_lines(&self, sig: &FfiSignature, value: &Value, args: &[Arg<'_>]) -> Vec<String> {
        let returned = match sig.ret {
            ReturnKind::Void => "void".to_string(),
            ReturnKind::Checked | ReturnKind::Raw(_) => value.to_string(),
        };
        let mut lines = vec![format!("    Returned: {}", returned)];
        for (arg, param) in args.iter().zip(&sig.params) {
            if !param.is_out() {
                continue;
            }
            let text = match arg.read_out(&param.ty) {
                Ok(Some(v)) => self.formatters.render(&param.ty, &v),
                Ok(None) | Err(_) => UNRENDERABLE.to_string(),
            };
            lines.push(format!("    {} {}={}", OUT_PLACEHOLDER, param.name, text));
        }
        lines
    }

    fn write_failure(&self, rendered: &[String]) {
        self.sink.write_line("    Threw: ");
        for line in rendered {
            self.sink.write_line(&format!("        {}", line));
        }
    }
}

/// Render an error, its causes and, when captured, the tracer's backtrace
fn render_error(err: &dyn Error, backtrace: &Backtrace) -> Vec<String> {
    let mut lines = vec![err.to_string()];
    let mut source = err.source();
    while let Some(cause) = source {
        lines.push(format!("Caused by: {}", cause));
        source = cause.source();
    }
    lines.extend(render_backtrace(backtrace));
    lines
}

fn render_panic(payload: &(dyn Any + Send), backtrace: &Backtrace) -> Vec<String> {
    let message = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "Box<dyn Any>".to_string());
    let mut lines = vec![format!("panicked: {}", message)];
    lines.extend(render_backtrace(backtrace));
    lines
}

/// Backtrace lines for a failure.
///
/// Neither a `CallError` nor a panic payload carries a backtrace, so the one
/// rendered here is captured by [`Traced`] when it observes the failure. Its
/// innermost frames are the tracer's own; the frames below `Traced::invoke`
/// are the caller's. The frame that raised the error is not included.
fn render_backtrace(backtrace: &Backtrace) -> Vec<String> {
    if backtrace.status() != BacktraceStatus::Captured {
        return Vec::new();
    }
    let mut lines = vec![BACKTRACE_HEADER.to_string()];
    lines.extend(backtrace.to_string().lines().map(str::to_string));
    lines
}

/// Decorator that traces every call to `C`
pub struct Traced<C> {
    inner: C,
    tracer: Tracer,
}

impl<C: Callable> Traced<C> {
    pub fn new(inner: C, tracer: Tracer) -> Self {
        Self { inner, tracer }
    }
}

impl<C: Callable> Callable for Traced<C> {
    fn signature(&self) -> &FfiSignature {
        self.inner.signature()
    }

    fn invoke(&self, args: &[Arg<'_>]) -> Result<Value, CallError> {
        let sig = self.inner.signature();
        self.tracer.sink.write_line(&self.tracer.call_line(sig, args));

        match panic::catch_unwind(AssertUnwindSafe(|| self.inner.invoke(args))) {
            Ok(Ok(value)) => {
                for line in self.tracer.return_lines(sig, &value, args) {
                    self.tracer.sink.write_line(&line);
                }
                Ok(value)
            }
            Ok(Err(err)) => {
                self.tracer
                    .write_failure(&render_error(&err, &Backtrace::capture()));
                Err(err)
            }
            Err(payload) => {
                self.tracer
                    .write_failure(&render_panic(payload.as_ref(), &Backtrace::capture()));
                panic::resume_unwind(payload)
            }
        }
    }

    fn is_traced(&self) -> bool {
        true
    }
}
