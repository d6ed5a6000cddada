//! FFI Type System
//!
//! Descriptors for libconcord call signatures and the values that cross the
//! native boundary.

use std::cell::Cell;
use std::ffi::CStr;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::mem;
use std::ptr;
use std::slice;

use libc::{c_char, c_void};

use super::error::{BindError, MalformedHandle};

/// Native type of a parameter or raw return value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FfiType {
    /// 8-bit signed integer
    I8,
    /// 8-bit unsigned integer
    U8,
    /// 16-bit signed integer
    I16,
    /// 16-bit unsigned integer
    U16,
    /// 32-bit signed integer (C `int`)
    I32,
    /// 32-bit unsigned integer
    U32,
    /// 64-bit signed integer
    I64,
    /// 64-bit unsigned integer
    U64,
    /// Null-terminated C string (char*)
    CStr,
    /// Byte buffer (uint8_t*)
    Bytes,
    /// 32-bit word buffer (uint32_t*)
    Words,
    /// Array of C strings (char**)
    StrArray,
    /// Progress callback function pointer
    Callback,
    /// Opaque context handed back to a callback (void*)
    UserData,
    /// Pointer to a fixed-layout record
    Struct(&'static RecordLayout),
}

impl FfiType {
    /// Size in bytes of a value of this type in caller storage
    pub fn size(&self) -> usize {
        match self {
            FfiType::I8 | FfiType::U8 => 1,
            FfiType::I16 | FfiType::U16 => 2,
            FfiType::I32 | FfiType::U32 => 4,
            FfiType::I64 | FfiType::U64 => 8,
            FfiType::Struct(layout) => layout.size,
            _ => mem::size_of::<usize>(),
        }
    }

    /// Check if this type is an integer type
    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            FfiType::I8
                | FfiType::U8
                | FfiType::I16
                | FfiType::U16
                | FfiType::I32
                | FfiType::U32
                | FfiType::I64
                | FfiType::U64
        )
    }

    /// Check if this type travels as a pointer
    pub fn is_pointer(&self) -> bool {
        !self.is_integer()
    }

    /// Parse a C type name (`const` and `struct` qualifiers are ignored)
    pub fn parse(s: &str) -> Option<Self> {
        let normalized = normalize_c_type(s);
        match normalized.as_str() {
            "i8" | "int8_t" | "signed char" => Some(FfiType::I8),
            "u8" | "uint8_t" | "unsigned char" => Some(FfiType::U8),
            "i16" | "int16_t" | "short" => Some(FfiType::I16),
            "u16" | "uint16_t" | "unsigned short" => Some(FfiType::U16),
            "i32" | "int32_t" | "int" => Some(FfiType::I32),
            "u32" | "uint32_t" | "unsigned int" | "unsigned" => Some(FfiType::U32),
            "i64" | "int64_t" | "long long" => Some(FfiType::I64),
            "u64" | "uint64_t" | "unsigned long long" => Some(FfiType::U64),
            "cstr" | "char*" => Some(FfiType::CStr),
            "uint8_t*" | "unsigned char*" => Some(FfiType::Bytes),
            "uint32_t*" | "unsigned int*" => Some(FfiType::Words),
            "char**" => Some(FfiType::StrArray),
            "lc_callback" => Some(FfiType::Callback),
            "void*" => Some(FfiType::UserData),
            _ => None,
        }
    }
}

fn normalize_c_type(s: &str) -> String {
    let words: Vec<&str> = s
        .split_whitespace()
        .filter(|w| *w != "const" && *w != "struct")
        .collect();
    words.join(" ").replace(" *", "*")
}

impl fmt::Display for FfiType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FfiType::I8 => write!(f, "i8"),
            FfiType::U8 => write!(f, "u8"),
            FfiType::I16 => write!(f, "i16"),
            FfiType::U16 => write!(f, "u16"),
            FfiType::I32 => write!(f, "i32"),
            FfiType::U32 => write!(f, "u32"),
            FfiType::I64 => write!(f, "i64"),
            FfiType::U64 => write!(f, "u64"),
            FfiType::CStr => write!(f, "cstr"),
            FfiType::Bytes => write!(f, "buffer<u8>"),
            FfiType::Words => write!(f, "buffer<u32>"),
            FfiType::StrArray => write!(f, "buffer<cstr>"),
            FfiType::Callback => write!(f, "callback"),
            FfiType::UserData => write!(f, "data"),
            FfiType::Struct(layout) => write!(f, "struct {}", layout.name),
        }
    }
}

/// Shape of a `#[repr(C)]` record that crosses the boundary by pointer
pub struct RecordLayout {
    /// C struct name
    pub name: &'static str,
    /// Exact size shared with the native side
    pub size: usize,
    /// Decodes raw record bytes into named text fields
    pub describe: fn(&[u8]) -> Option<Vec<(String, String)>>,
}

impl fmt::Debug for RecordLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordLayout")
            .field("name", &self.name)
            .field("size", &self.size)
            .finish()
    }
}

impl PartialEq for RecordLayout {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.size == other.size
    }
}

impl Eq for RecordLayout {}

impl Hash for RecordLayout {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
        self.size.hash(state);
    }
}

/// A fixed-layout record shared with native code.
///
/// # Safety
///
/// Implementors must be `#[repr(C)]`, match the native layout exactly and be
/// valid for every bit pattern (plain byte arrays and integers only).
pub unsafe trait NativeRecord: Copy + 'static {
    /// Layout descriptor used in signatures
    fn layout() -> &'static RecordLayout;

    /// Named text fields for tracing
    fn fields(&self) -> Vec<(String, String)>;
}

/// Decode a record from raw bytes, for use as [`RecordLayout::describe`]
pub fn describe_record<R: NativeRecord>(bytes: &[u8]) -> Option<Vec<(String, String)>> {
    if bytes.len() < mem::size_of::<R>() {
        return None;
    }
    // SAFETY: length checked above and NativeRecord types accept any bytes.
    let record: R = unsafe { ptr::read_unaligned(bytes.as_ptr() as *const R) };
    Some(record.fields())
}

/// Direction of a parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Passed by value as its native representation
    In,
    /// Caller storage the native call fills in; always passed as a pointer
    Out,
}

/// One named parameter of a signature
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamDescriptor {
    pub name: String,
    pub direction: Direction,
    pub ty: FfiType,
}

impl ParamDescriptor {
    pub fn input(name: impl Into<String>, ty: FfiType) -> Self {
        Self {
            name: name.into(),
            direction: Direction::In,
            ty,
        }
    }

    pub fn output(name: impl Into<String>, ty: FfiType) -> Self {
        Self {
            name: name.into(),
            direction: Direction::Out,
            ty,
        }
    }

    pub fn is_out(&self) -> bool {
        self.direction == Direction::Out
    }

    /// Representation at the native boundary
    pub fn native_type(&self) -> NativeType {
        match self.direction {
            Direction::In => NativeType::Value(self.ty),
            Direction::Out => NativeType::PointerTo(self.ty),
        }
    }
}

/// Transport type of a parameter at the native boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NativeType {
    Value(FfiType),
    PointerTo(FfiType),
}

impl fmt::Display for NativeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NativeType::Value(ty) => write!(f, "{}", ty),
            NativeType::PointerTo(ty) => write!(f, "*{}", ty),
        }
    }
}

/// How the return value of a function is treated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnKind {
    /// No value; transported as a native int and discarded
    Void,
    /// Plain value with no error semantics
    Raw(FfiType),
    /// Native int where zero is success and anything else a library error code
    Checked,
}

impl ReturnKind {
    /// Native return type; `Checked` and `Void` are always a signed int
    pub fn native_type(&self) -> FfiType {
        match self {
            ReturnKind::Void | ReturnKind::Checked => FfiType::I32,
            ReturnKind::Raw(ty) => *ty,
        }
    }
}

impl fmt::Display for ReturnKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReturnKind::Void => write!(f, "void"),
            ReturnKind::Raw(ty) => write!(f, "{}", ty),
            ReturnKind::Checked => write!(f, "checked"),
        }
    }
}

/// Function signature for a libconcord entry point
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FfiSignature {
    /// Symbol name in the native library
    pub name: String,
    /// Return descriptor
    pub ret: ReturnKind,
    /// Ordered parameters
    pub params: Vec<ParamDescriptor>,
}

impl FfiSignature {
    /// Create a new function signature
    pub fn new(name: impl Into<String>, ret: ReturnKind) -> Self {
        Self {
            name: name.into(),
            ret,
            params: Vec::new(),
        }
    }

    pub fn checked(name: impl Into<String>) -> Self {
        Self::new(name, ReturnKind::Checked)
    }

    pub fn raw(name: impl Into<String>, ty: FfiType) -> Self {
        Self::new(name, ReturnKind::Raw(ty))
    }

    pub fn void(name: impl Into<String>) -> Self {
        Self::new(name, ReturnKind::Void)
    }

    /// Append an input parameter
    pub fn input(mut self, name: impl Into<String>, ty: FfiType) -> Self {
        self.params.push(ParamDescriptor::input(name, ty));
        self
    }

    /// Append an output parameter
    pub fn output(mut self, name: impl Into<String>, ty: FfiType) -> Self {
        self.params.push(ParamDescriptor::output(name, ty));
        self
    }

    /// Native parameter transport types, in order
    pub fn native_params(&self) -> Vec<NativeType> {
        self.params.iter().map(ParamDescriptor::native_type).collect()
    }

    /// Check the invariants every bound signature must hold
    pub fn validate(&self, max_params: usize) -> Result<(), BindError> {
        if self.params.len() > max_params {
            return Err(BindError::TooManyParams {
                function: self.name.clone(),
                count: self.params.len(),
                max: max_params,
            });
        }
        for (i, param) in self.params.iter().enumerate() {
            if self.params[..i].iter().any(|p| p.name == param.name) {
                return Err(BindError::DuplicateParam {
                    function: self.name.clone(),
                    param: param.name.clone(),
                });
            }
        }
        Ok(())
    }

    /// Parse a C-style declaration with built-in types only
    pub fn parse(signature: &str) -> Result<Self, BindError> {
        Self::parse_with(signature, &[])
    }

    /// Parse a C-style declaration.
    ///
    /// Format: `ret name([in|out] type name, ...)` where `ret` is `void`,
    /// `checked` or a type. Record types are looked up in `records` by their
    /// C name and always travel by pointer.
    pub fn parse_with(signature: &str, records: &[&'static RecordLayout]) -> Result<Self, BindError> {
        let invalid = |reason: &str| BindError::InvalidSignature {
            signature: signature.to_string(),
            reason: reason.to_string(),
        };

        let signature = signature.trim();
        let paren_pos = signature.find('(').ok_or_else(|| invalid("missing '('"))?;
        let before_paren = signature[..paren_pos].trim();
        let after_paren = signature[paren_pos + 1..]
            .trim()
            .strip_suffix(')')
            .ok_or_else(|| invalid("missing ')'"))?;

        let (ret_str, name) = split_trailing_ident(before_paren);
        if name.is_empty() || ret_str.is_empty() {
            return Err(invalid("expected '<return> <name>'"));
        }
        let ret = match ret_str {
            "void" => ReturnKind::Void,
            "checked" => ReturnKind::Checked,
            other => ReturnKind::Raw(
                parse_type(other, records).ok_or_else(|| invalid("unknown return type"))?,
            ),
        };

        let mut sig = Self::new(name, ret);
        for param in after_paren.split(',') {
            let param = param.trim();
            if param.is_empty() || param == "void" {
                continue;
            }
            let (ty_str, param_name) = split_trailing_ident(param);
            if param_name.is_empty() {
                return Err(invalid("parameter without a name"));
            }
            let (direction, ty_str) = if let Some(rest) = ty_str.strip_prefix("out ") {
                (Direction::Out, rest)
            } else if let Some(rest) = ty_str.strip_prefix("in ") {
                (Direction::In, rest)
            } else {
                (Direction::In, ty_str)
            };
            let ty = parse_type(ty_str, records)
                .ok_or_else(|| invalid(&format!("unknown type '{}'", ty_str.trim())))?;
            sig.params.push(ParamDescriptor {
                name: param_name.to_string(),
                direction,
                ty,
            });
        }

        Ok(sig)
    }
}

fn split_trailing_ident(s: &str) -> (&str, &str) {
    let s = s.trim();
    let start = s
        .char_indices()
        .rev()
        .take_while(|(_, c)| c.is_ascii_alphanumeric() || *c == '_')
        .last()
        .map(|(i, _)| i)
        .unwrap_or(s.len());
    (s[..start].trim(), &s[start..])
}

fn parse_type(s: &str, records: &[&'static RecordLayout]) -> Option<FfiType> {
    if let Some(ty) = FfiType::parse(s) {
        return Some(ty);
    }
    let normalized = normalize_c_type(s);
    let base = normalized.trim_end_matches('*');
    records
        .iter()
        .find(|layout| layout.name == base)
        .map(|layout| FfiType::Struct(*layout))
}

impl fmt::Display for FfiSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}(", self.ret, self.name)?;
        for (i, param) in self.params.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            if param.is_out() {
                write!(f, "out ")?;
            }
            write!(f, "{} {}", param.ty, param.name)?;
        }
        write!(f, ")")
    }
}

/// A native pointer this layer passes through without dereferencing.
///
/// Owns nothing; the memory behind it stays the caller's responsibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OpaqueHandle(usize);

impl OpaqueHandle {
    pub const NULL: OpaqueHandle = OpaqueHandle(0);

    pub fn from_addr(addr: usize) -> Self {
        Self(addr)
    }

    pub fn from_ptr<T>(ptr: *const T) -> Self {
        Self(ptr as usize)
    }

    pub fn from_mut<T>(ptr: *mut T) -> Self {
        Self(ptr as usize)
    }

    /// Handle to a slice's first element, e.g. a config blob
    pub fn from_slice<T>(data: &[T]) -> Self {
        Self(data.as_ptr() as usize)
    }

    pub fn addr(self) -> usize {
        self.0
    }

    pub fn is_null(self) -> bool {
        self.0 == 0
    }

    pub fn as_ptr(self) -> *mut c_void {
        self.0 as *mut c_void
    }
}

/// Caller-owned storage for an output parameter.
///
/// Zero-initialised, 8-byte aligned and sized for its type. The native call
/// writes through [`OutSlot::as_mut_ptr`].
pub struct OutSlot {
    words: Box<[Cell<u64>]>,
}

impl OutSlot {
    /// Storage for any integer or pointer output
    pub fn scalar() -> Self {
        Self::with_size(mem::size_of::<u64>())
    }

    /// Storage sized for `ty`
    pub fn for_type(ty: &FfiType) -> Self {
        Self::with_size(ty.size())
    }

    /// Storage for a record output
    pub fn record<R: NativeRecord>() -> Self {
        Self::with_size(mem::size_of::<R>())
    }

    fn with_size(bytes: usize) -> Self {
        let count = bytes.div_ceil(mem::size_of::<u64>()).max(1);
        Self {
            words: (0..count).map(|_| Cell::new(0)).collect(),
        }
    }

    /// Usable size in bytes
    pub fn capacity(&self) -> usize {
        self.words.len() * mem::size_of::<u64>()
    }

    /// Address handed to native code
    pub fn as_mut_ptr(&self) -> *mut c_void {
        self.words.as_ptr() as *mut c_void
    }

    fn read<T: Copy>(&self) -> Option<T> {
        if mem::size_of::<T>() > self.capacity() {
            return None;
        }
        // SAFETY: in bounds, initialised, and only integer/pointer types are read.
        Some(unsafe { ptr::read_unaligned(self.as_mut_ptr() as *const T) })
    }

    fn bytes(&self) -> &[u8] {
        // SAFETY: the slot owns `capacity()` initialised bytes; Cell is !Sync so
        // nothing writes them while this borrow lives.
        unsafe { slice::from_raw_parts(self.as_mut_ptr() as *const u8, self.capacity()) }
    }

    pub fn get_u8(&self) -> u8 {
        self.read::<u8>().unwrap_or_default()
    }

    pub fn get_i32(&self) -> i32 {
        self.read::<i32>().unwrap_or_default()
    }

    pub fn get_u32(&self) -> u32 {
        self.read::<u32>().unwrap_or_default()
    }

    pub fn get_i64(&self) -> i64 {
        self.read::<i64>().unwrap_or_default()
    }

    pub fn get_u64(&self) -> u64 {
        self.read::<u64>().unwrap_or_default()
    }

    /// Pointer written by the native call (e.g. an allocated blob)
    pub fn get_handle(&self) -> OpaqueHandle {
        OpaqueHandle::from_addr(self.read::<usize>().unwrap_or_default())
    }

    /// Copy of a record written by the native call
    pub fn get_record<R: NativeRecord>(&self) -> Option<R> {
        self.read::<R>()
    }

    /// Decode the slot as a value of `ty`.
    ///
    /// `CStr` outputs are followed: the written pointer must be null or point
    /// at a null-terminated string, as the native contract guarantees.
    pub fn value(&self, ty: &FfiType) -> Option<Value> {
        let value = match ty {
            FfiType::I8 => Value::Int(self.read::<i8>()? as i64),
            FfiType::U8 => Value::Int(self.read::<u8>()? as i64),
            FfiType::I16 => Value::Int(self.read::<i16>()? as i64),
            FfiType::U16 => Value::Int(self.read::<u16>()? as i64),
            FfiType::I32 => Value::Int(self.read::<i32>()? as i64),
            FfiType::U32 => Value::Int(self.read::<u32>()? as i64),
            FfiType::I64 => Value::Int(self.read::<i64>()?),
            FfiType::U64 => Value::UInt(self.read::<u64>()?),
            // SAFETY: see the contract above.
            FfiType::CStr => Value::Str(unsafe { string_at(self.read::<usize>()?) }),
            FfiType::Struct(layout) => {
                if self.capacity() < layout.size {
                    return None;
                }
                Value::Record((layout.describe)(&self.bytes()[..layout.size])?)
            }
            _ => Value::Handle(self.get_handle()),
        };
        Some(value)
    }
}

impl fmt::Debug for OutSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutSlot")
            .field("addr", &self.as_mut_ptr())
            .field("capacity", &self.capacity())
            .finish()
    }
}

/// Read a library-owned C string.
///
/// # Safety
///
/// `addr` must be zero or point to a null-terminated string that stays valid
/// for the duration of the call.
pub(crate) unsafe fn string_at(addr: usize) -> Option<String> {
    if addr == 0 {
        return None;
    }
    Some(
        CStr::from_ptr(addr as *const c_char)
            .to_string_lossy()
            .into_owned(),
    )
}

/// An argument passed to a bound function
#[derive(Debug, Clone, Copy)]
pub enum Arg<'a> {
    /// Any integer type
    Int(i64),
    /// A string for a `CStr` input
    Str(&'a CStr),
    /// A buffer, callback, user-data or record pointer
    Handle(OpaqueHandle),
    /// Storage for an output parameter
    Out(&'a OutSlot),
}

impl<'a> Arg<'a> {
    /// Value of an input argument for display
    pub fn value(&self) -> Option<Value> {
        match self {
            Arg::Int(v) => Some(Value::Int(*v)),
            Arg::Str(s) => Some(Value::Str(Some(s.to_string_lossy().into_owned()))),
            Arg::Handle(h) => Some(Value::Handle(*h)),
            Arg::Out(_) => None,
        }
    }

    /// Read back an output argument after the call
    pub fn read_out(&self, ty: &FfiType) -> Result<Option<Value>, MalformedHandle> {
        match self {
            Arg::Out(slot) => Ok(slot.value(ty)),
            _ => Err(MalformedHandle),
        }
    }
}

impl From<i32> for Arg<'_> {
    fn from(v: i32) -> Self {
        Arg::Int(v as i64)
    }
}

impl From<u32> for Arg<'_> {
    fn from(v: u32) -> Self {
        Arg::Int(v as i64)
    }
}

impl From<i64> for Arg<'_> {
    fn from(v: i64) -> Self {
        Arg::Int(v)
    }
}

impl<'a> From<&'a CStr> for Arg<'a> {
    fn from(s: &'a CStr) -> Self {
        Arg::Str(s)
    }
}

impl From<OpaqueHandle> for Arg<'_> {
    fn from(h: OpaqueHandle) -> Self {
        Arg::Handle(h)
    }
}

impl<'a> From<&'a OutSlot> for Arg<'a> {
    fn from(slot: &'a OutSlot) -> Self {
        Arg::Out(slot)
    }
}

/// A value returned from, or read back after, a native call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// No value
    Void,
    /// Any integer type up to 32 bits, and `i64`, sign- or zero-extended
    Int(i64),
    /// `u64`, kept unsigned so values above `i64::MAX` stay intact
    UInt(u64),
    /// Copied C string (`None` for NULL)
    Str(Option<String>),
    /// Pointer value
    Handle(OpaqueHandle),
    /// Decoded record fields
    Record(Vec<(String, String)>),
}

impl Value {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            Value::UInt(v) => i64::try_from(*v).ok(),
            _ => None,
        }
    }

    pub fn as_uint(&self) -> Option<u64> {
        match self {
            Value::UInt(v) => Some(*v),
            Value::Int(v) => u64::try_from(*v).ok(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(Some(s)) => Some(s),
            _ => None,
        }
    }

    pub fn as_handle(&self) -> Option<OpaqueHandle> {
        match self {
            Value::Handle(h) => Some(*h),
            _ => None,
        }
    }

    pub fn is_void(&self) -> bool {
        matches!(self, Value::Void)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Void => write!(f, "void"),
            Value::Int(v) => write!(f, "{}", v),
            Value::UInt(v) => write!(f, "{}", v),
            Value::Str(Some(s)) => write!(f, "{:?}", s),
            Value::Str(None) => write!(f, "NULL"),
            Value::Handle(h) => write!(f, "{:#010x}", h.addr()),
            Value::Record(fields) => {
                write!(f, "{{")?;
                for (i, (name, value)) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}={:?}", name, value)?;
                }
                write!(f, "}}")
            }
        }
    }
}
