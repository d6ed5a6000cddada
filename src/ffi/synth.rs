//! Wrapper Synthesis
//!
//! Turns an [`FfiSignature`] into a [`BoundFunction`]: the symbol is resolved
//! eagerly, the checker is attached to checked functions, and the tracer wraps
//! the result when tracing is enabled.

use std::fmt;
use std::mem;
use std::sync::Arc;

use super::checker::{LibraryMessages, ResultChecker, ReturnCodeChecker};
use super::loader::{NativeEntry, SymbolSource};
use super::trace::{FormatterTable, TraceSink, Traced, Tracer};
use super::types::{string_at, Arg, Direction, FfiSignature, FfiType, OpaqueHandle, ParamDescriptor, ReturnKind, Value};
use super::{BindError, CallError};
use crate::config::BindingConfig;

/// Largest supported parameter count
pub const MAX_PARAMS: usize = 8;

/// Something that can be called with a signature's arguments.
///
/// Cross-cutting behaviour (tracing today) is layered by wrapping one
/// `Callable` in another.
pub trait Callable: Send + Sync {
    /// Descriptors of the wrapped function
    fn signature(&self) -> &FfiSignature;

    /// Perform the call
    fn invoke(&self, args: &[Arg<'_>]) -> Result<Value, CallError>;

    /// Whether a trace interceptor sits in this chain
    fn is_traced(&self) -> bool {
        false
    }
}

impl Callable for Box<dyn Callable> {
    fn signature(&self) -> &FfiSignature {
        (**self).signature()
    }

    fn invoke(&self, args: &[Arg<'_>]) -> Result<Value, CallError> {
        (**self).invoke(args)
    }

    fn is_traced(&self) -> bool {
        (**self).is_traced()
    }
}

/// The undecorated binding: marshal, call once, narrow, check
pub struct RawFunction {
    signature: FfiSignature,
    entry: NativeEntry,
    checker: Option<Arc<dyn ResultChecker>>,
    // Keeps the library mapped for as long as the entry point is reachable.
    _source: Arc<dyn SymbolSource>,
}

impl RawFunction {
    fn marshal(&self, args: &[Arg<'_>]) -> Result<Vec<usize>, CallError> {
        let sig = &self.signature;
        if args.len() != sig.params.len() {
            return Err(CallError::InvalidArgCount {
                function: sig.name.clone(),
                expected: sig.params.len(),
                got: args.len(),
            });
        }

        sig.params
            .iter()
            .zip(args)
            .map(|(param, arg)| match (param.direction, arg) {
                (Direction::Out, Arg::Out(slot)) if slot.capacity() >= param.ty.size() => {
                    Ok(slot.as_mut_ptr() as usize)
                }
                (Direction::Out, _) => Err(CallError::MalformedHandle {
                    function: sig.name.clone(),
                    param: param.name.clone(),
                }),
                (Direction::In, arg) => self.in_word(param, arg),
            })
            .collect()
    }

    fn in_word(&self, param: &ParamDescriptor, arg: &Arg<'_>) -> Result<usize, CallError> {
        match (param.ty, arg) {
            // Sign-extended to the full word; the callee reads its own width.
            (ty, Arg::Int(v)) if ty.is_integer() => Ok(*v as usize),
            (FfiType::CStr, Arg::Str(s)) => Ok(s.as_ptr() as usize),
            (ty, Arg::Handle(h)) if ty.is_pointer() => Ok(h.addr()),
            _ => Err(CallError::InvalidArgType {
                function: self.signature.name.clone(),
                param: param.name.clone(),
                expected: param.ty,
            }),
        }
    }

    fn convert_result(&self, word: usize) -> Result<Value, CallError> {
        match self.signature.ret {
            ReturnKind::Void => Ok(Value::Void),
            ReturnKind::Checked => {
                let code = word as u32 as i32;
                match &self.checker {
                    Some(checker) => Ok(Value::Int(checker.check(&self.signature.name, code)? as i64)),
                    None => Ok(Value::Int(code as i64)),
                }
            }
            ReturnKind::Raw(ty) => Ok(narrow(word, ty)),
        }
    }
}

impl Callable for RawFunction {
    fn signature(&self) -> &FfiSignature {
        &self.signature
    }

    fn invoke(&self, args: &[Arg<'_>]) -> Result<Value, CallError> {
        let words = self.marshal(args)?;
        // Safety: the entry point was resolved for this signature and every
        // word was produced from an argument of the declared type; the borrows
        // in `args` keep strings and out slots alive across the call.
        let word = unsafe { call_native(self.entry, &words)? };
        self.convert_result(word)
    }
}

/// Narrow a return word to its declared type
fn narrow(word: usize, ty: FfiType) -> Value {
    match ty {
        FfiType::I8 => Value::Int(word as u8 as i8 as i64),
        FfiType::U8 => Value::Int(word as u8 as i64),
        FfiType::I16 => Value::Int(word as u16 as i16 as i64),
        FfiType::U16 => Value::Int(word as u16 as i64),
        FfiType::I32 => Value::Int(word as u32 as i32 as i64),
        FfiType::U32 => Value::Int(word as u32 as i64),
        FfiType::I64 => Value::Int(word as u64 as i64),
        FfiType::U64 => Value::UInt(word as u64),
        // Safety: a `char*` return is NULL or a library-owned string.
        FfiType::CStr => Value::Str(unsafe { string_at(word) }),
        _ => Value::Handle(OpaqueHandle::from_addr(word)),
    }
}

// Native calls are dispatched by arity. Every argument travels as one
// pointer-width word, which matches the C calling convention for the integer
// and pointer types libconcord uses on the supported targets.

unsafe fn call_native(entry: NativeEntry, w: &[usize]) -> Result<usize, CallError> {
    type Fn0 = unsafe extern "C" fn() -> usize;
    type Fn1 = unsafe extern "C" fn(usize) -> usize;
    type Fn2 = unsafe extern "C" fn(usize, usize) -> usize;
    type Fn3 = unsafe extern "C" fn(usize, usize, usize) -> usize;
    type Fn4 = unsafe extern "C" fn(usize, usize, usize, usize) -> usize;
    type Fn5 = unsafe extern "C" fn(usize, usize, usize, usize, usize) -> usize;
    type Fn6 = unsafe extern "C" fn(usize, usize, usize, usize, usize, usize) -> usize;
    type Fn7 = unsafe extern "C" fn(usize, usize, usize, usize, usize, usize, usize) -> usize;
    type Fn8 = unsafe extern "C" fn(usize, usize, usize, usize, usize, usize, usize, usize) -> usize;

    let addr = entry.addr();
    let result = match w.len() {
        0 => mem::transmute::<usize, Fn0>(addr)(),
        1 => mem::transmute::<usize, Fn1>(addr)(w[0]),
        2 => mem::transmute::<usize, Fn2>(addr)(w[0], w[1]),
        3 => mem::transmute::<usize, Fn3>(addr)(w[0], w[1], w[2]),
        4 => mem::transmute::<usize, Fn4>(addr)(w[0], w[1], w[2], w[3]),
        5 => mem::transmute::<usize, Fn5>(addr)(w[0], w[1], w[2], w[3], w[4]),
        6 => mem::transmute::<usize, Fn6>(addr)(w[0], w[1], w[2], w[3], w[4], w[5]),
        7 => mem::transmute::<usize, Fn7>(addr)(w[0], w[1], w[2], w[3], w[4], w[5], w[6]),
        8 => mem::transmute::<usize, Fn8>(addr)(w[0], w[1], w[2], w[3], w[4], w[5], w[6], w[7]),
        n => return Err(CallError::TooManyArgs(n)),
    };
    Ok(result)
}

/// A synthesized, callable binding to one native symbol.
///
/// Immutable once created; cheap to share behind a reference.
pub struct BoundFunction {
    inner: Box<dyn Callable>,
}

impl BoundFunction {
    /// Wrap an arbitrary callable, e.g. to add another interceptor
    pub fn from_callable(inner: Box<dyn Callable>) -> Self {
        Self { inner }
    }

    /// Layer a decorator over this binding
    pub fn wrap(self, decorate: impl FnOnce(Box<dyn Callable>) -> Box<dyn Callable>) -> Self {
        Self {
            inner: decorate(self.inner),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.signature().name
    }

    pub fn signature(&self) -> &FfiSignature {
        self.inner.signature()
    }

    pub fn params(&self) -> &[ParamDescriptor] {
        &self.inner.signature().params
    }

    pub fn return_kind(&self) -> ReturnKind {
        self.inner.signature().ret
    }

    pub fn is_traced(&self) -> bool {
        self.inner.is_traced()
    }

    /// Perform exactly one native call
    pub fn call(&self, args: &[Arg<'_>]) -> Result<Value, CallError> {
        self.inner.invoke(args)
    }
}

impl fmt::Debug for BoundFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundFunction")
            .field("signature", &self.signature().to_string())
            .field("traced", &self.is_traced())
            .finish()
    }
}

/// Produces [`BoundFunction`]s from signatures against one symbol source
pub struct Synthesizer {
    source: Arc<dyn SymbolSource>,
    checker: Arc<dyn ResultChecker>,
    tracer: Option<Tracer>,
}

impl Synthesizer {
    pub fn new(source: Arc<dyn SymbolSource>, checker: Arc<dyn ResultChecker>) -> Self {
        Self {
            source,
            checker,
            tracer: None,
        }
    }

    /// Synthesizer whose checker uses the library's own `lc_strerror`
    pub fn for_library(source: Arc<dyn SymbolSource>) -> Result<Self, BindError> {
        let messages = LibraryMessages::resolve(Arc::clone(&source))?;
        let checker = ReturnCodeChecker::new(Arc::new(messages));
        Ok(Self::new(source, Arc::new(checker)))
    }

    /// Trace every function synthesized from now on
    pub fn with_tracer(mut self, tracer: Tracer) -> Self {
        self.tracer = Some(tracer);
        self
    }

    /// Apply the trace switch of `config`, tracing to stdout
    pub fn configured(self, config: &BindingConfig, formatters: FormatterTable) -> Self {
        if config.trace.enabled {
            let tracer = Tracer::new(TraceSink::stdout(), formatters).with_prefix(&config.trace.prefix);
            self.with_tracer(tracer)
        } else {
            self
        }
    }

    pub fn is_tracing(&self) -> bool {
        self.tracer.is_some()
    }

    /// Bind `signature`; fails immediately if the symbol is absent
    pub fn synthesize(&self, signature: FfiSignature) -> Result<BoundFunction, BindError> {
        signature.validate(MAX_PARAMS)?;
        let entry = self.source.resolve(&signature.name)?;
        log::trace!(
            "bound {} ({}) from {}",
            signature,
            signature
                .native_params()
                .iter()
                .map(|p| p.to_string())
                .collect::<Vec<_>>()
                .join(", "),
            self.source.describe()
        );

        let checker = match signature.ret {
            ReturnKind::Checked => Some(Arc::clone(&self.checker)),
            ReturnKind::Void | ReturnKind::Raw(_) => None,
        };
        let raw = RawFunction {
            signature,
            entry,
            checker,
            _source: Arc::clone(&self.source),
        };

        let inner: Box<dyn Callable> = match &self.tracer {
            Some(tracer) => Box::new(Traced::new(raw, tracer.clone())),
            None => Box::new(raw),
        };
        Ok(BoundFunction { inner })
    }
}
