//! Dynamic Library Loader
//!
//! Resolves the platform's libconcord artifact once per process and hands out
//! symbol addresses through [`SymbolSource`].

use std::collections::HashMap;
use std::ffi::CString;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use libloading::{Library, Symbol};
use once_cell::sync::OnceCell;

use super::BindError;
use crate::config::{self, LibraryConfig};

/// Address of a resolved native entry point
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NativeEntry(usize);

impl NativeEntry {
    pub fn from_addr(addr: usize) -> Self {
        Self(addr)
    }

    pub fn addr(self) -> usize {
        self.0
    }
}

/// Anything symbols can be bound against
pub trait SymbolSource: Send + Sync {
    /// Resolve `symbol` to its entry point
    fn resolve(&self, symbol: &str) -> Result<NativeEntry, BindError>;

    /// Name used in diagnostics
    fn describe(&self) -> String;
}

/// A dynamically loaded libconcord
pub struct NativeLibrary {
    /// Path the library was loaded from
    path: PathBuf,
    /// The loaded library handle
    library: Library,
}

impl NativeLibrary {
    /// Load a library from the given path
    pub fn load(path: impl AsRef<Path>) -> Result<Self, BindError> {
        let path = path.as_ref().to_path_buf();

        // Safety: loading runs the library's initialisers; the path is the
        // configured libconcord artifact.
        let library = unsafe {
            Library::new(&path).map_err(|e| BindError::LibraryLoad {
                path: path.display().to_string(),
                message: e.to_string(),
            })?
        };

        log::debug!("loaded native library {}", path.display());
        Ok(Self { path, library })
    }

    /// Get the path to this library
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SymbolSource for NativeLibrary {
    fn resolve(&self, symbol: &str) -> Result<NativeEntry, BindError> {
        let c_name = CString::new(symbol)
            .map_err(|_| BindError::InvalidSymbol(symbol.to_string()))?;

        // Safety: only the address is taken here; the call site casts it to
        // the arity described by the bound signature.
        let sym: Symbol<*const ()> = unsafe {
            self.library
                .get(c_name.as_bytes_with_nul())
                .map_err(|_| BindError::SymbolNotFound {
                    symbol: symbol.to_string(),
                    library: self.path.display().to_string(),
                })?
        };

        Ok(NativeEntry(*sym as usize))
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// A fixed table of entry points, for statically linked or stubbed libraries
#[derive(Debug, Default)]
pub struct StaticSymbols {
    name: String,
    table: HashMap<String, NativeEntry>,
}

impl StaticSymbols {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table: HashMap::new(),
        }
    }

    /// Add an entry point; `addr` is usually `some_extern_fn as usize`
    pub fn insert(&mut self, symbol: impl Into<String>, addr: usize) {
        self.table.insert(symbol.into(), NativeEntry(addr));
    }

    /// Builder form of [`StaticSymbols::insert`]
    pub fn with(mut self, symbol: impl Into<String>, addr: usize) -> Self {
        self.insert(symbol, addr);
        self
    }
}

impl SymbolSource for StaticSymbols {
    fn resolve(&self, symbol: &str) -> Result<NativeEntry, BindError> {
        self.table
            .get(symbol)
            .copied()
            .ok_or_else(|| BindError::SymbolNotFound {
                symbol: symbol.to_string(),
                library: self.name.clone(),
            })
    }

    fn describe(&self) -> String {
        self.name.clone()
    }
}

/// Library naming convention of a host platform
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Windows,
    MacOs,
    Elf,
}

impl Platform {
    /// The platform this crate was built for
    pub fn current() -> Self {
        if cfg!(target_os = "windows") {
            Platform::Windows
        } else if cfg!(target_os = "macos") {
            Platform::MacOs
        } else {
            Platform::Elf
        }
    }

    /// Artifact file name for an ABI version
    pub fn library_filename(self, abi_version: u32) -> String {
        match self {
            Platform::Windows => "libconcord.dll".to_string(),
            Platform::MacOs => format!("libconcord.{}.dylib", abi_version),
            Platform::Elf => format!("libconcord.so.{}", abi_version),
        }
    }
}

/// Construct the platform-specific library filename
pub fn library_filename(abi_version: u32) -> String {
    Platform::current().library_filename(abi_version)
}

/// Paths tried in order: explicit path, search paths, then the bare file name
/// for the system loader's own search.
pub fn candidate_paths(config: &LibraryConfig) -> Vec<PathBuf> {
    let file_name = library_filename(config.abi_version);
    let mut paths = Vec::new();

    if let Some(path) = &config.path {
        paths.push(path.clone());
    }
    for search_path in &config.search_paths {
        let full_path = search_path.join(&file_name);
        if full_path.exists() {
            paths.push(full_path);
        }
    }
    paths.push(PathBuf::from(file_name));
    paths
}

/// Load libconcord as described by `config`.
///
/// Candidates are tried in order. If none loads, the error names the first
/// candidate and its message lists every attempt.
pub fn load_configured(config: &LibraryConfig) -> Result<NativeLibrary, BindError> {
    let mut attempts = Vec::new();
    for path in candidate_paths(config) {
        match NativeLibrary::load(&path) {
            Ok(library) => return Ok(library),
            Err(err) => {
                log::debug!("{}", err);
                let message = match err {
                    BindError::LibraryLoad { message, .. } => message,
                    other => other.to_string(),
                };
                attempts.push((path, message));
            }
        }
    }

    let path = attempts
        .first()
        .map(|(path, _)| path.display().to_string())
        .unwrap_or_else(|| library_filename(config.abi_version));
    let message = if attempts.is_empty() {
        "no candidate paths".to_string()
    } else {
        attempts
            .iter()
            .map(|(path, message)| format!("{}: {}", path.display(), message))
            .collect::<Vec<_>>()
            .join("; ")
    };
    Err(BindError::LibraryLoad { path, message })
}

static LIBRARY: OnceCell<Result<Arc<NativeLibrary>, BindError>> = OnceCell::new();

/// The process-wide libconcord handle.
///
/// The load is attempted exactly once; a failure is kept and returned to
/// every later caller. The handle is never unloaded.
pub fn library() -> Result<Arc<NativeLibrary>, BindError> {
    LIBRARY
        .get_or_init(|| {
            let config = config::global()?;
            load_configured(&config.library).map(Arc::new)
        })
        .clone()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_filenames() {
        assert_eq!(Platform::Windows.library_filename(6), "libconcord.dll");
        assert_eq!(Platform::MacOs.library_filename(6), "libconcord.6.dylib");
        assert_eq!(Platform::Elf.library_filename(6), "libconcord.so.6");
        assert_eq!(Platform::Elf.library_filename(1), "libconcord.so.1");
    }

    #[test]
    fn test_candidate_order() {
        let config = LibraryConfig {
            path: Some(PathBuf::from("/opt/concord/custom.so")),
            ..LibraryConfig::default()
        };
        let paths = candidate_paths(&config);
        assert_eq!(paths[0], PathBuf::from("/opt/concord/custom.so"));
        assert_eq!(
            paths.last().unwrap(),
            &PathBuf::from(library_filename(config.abi_version))
        );
    }

    #[test]
    fn test_missing_library() {
        let err = NativeLibrary::load("/nonexistent/libconcord.so.6")
            .err()
            .unwrap();
        assert!(matches!(err, BindError::LibraryLoad { .. }));
    }

    #[test]
    fn test_configured_load_reports_every_candidate() {
        let dir = tempfile::tempdir().unwrap();
        let config = LibraryConfig {
            path: Some(dir.path().join("missing-libconcord.so")),
            abi_version: 999,
            search_paths: Vec::new(),
        };
        let explicit = dir.path().join("missing-libconcord.so").display().to_string();
        let fallback = library_filename(999);

        match load_configured(&config) {
            Err(BindError::LibraryLoad { path, message }) => {
                assert_eq!(path, explicit);
                assert!(message.starts_with(&format!("{}: ", explicit)));
                assert!(message.contains(&format!("; {}: ", fallback)));
            }
            Err(other) => panic!("unexpected error: {}", other),
            Ok(library) => panic!("loaded {}", library.path().display()),
        }
    }

    #[test]
    fn test_static_symbols() {
        let symbols = StaticSymbols::new("stub").with("present", 0x1000);
        assert_eq!(symbols.resolve("present").unwrap().addr(), 0x1000);
        let err = symbols.resolve("absent").unwrap_err();
        assert!(matches!(err, BindError::SymbolNotFound { .. }));
    }
}
