//! End-to-end tests of the libconcord binding table
//!
//! The full signature table is bound against a stub symbol table, so the
//! tests exercise the same path `concord::bindings()` takes with the real
//! library.

use std::ptr;
use std::sync::Arc;

use libc::{c_char, c_int, c_void};

use concord_ffi::concord::records::{MhCfgProperties, MhWifiNetworks};
use concord_ffi::concord::{self, LcCallback};
use concord_ffi::config::{BindingConfig, LibraryConfig, PATH_ENV, TRACE_ENV};
use concord_ffi::ffi::loader::{self, Platform};
use concord_ffi::ffi::{
    Arg, BindError, Bindings, OpaqueHandle, OutSlot, StaticSymbols, Synthesizer, TraceSink,
    Tracer, Value,
};

extern "C" fn lc_strerror(code: c_int) -> *const c_char {
    let message: &'static [u8] = match code {
        11 => b"Error connecting or finding the remote\0",
        15 => b"Action not supported on this remote\0",
        _ => return ptr::null(),
    };
    message.as_ptr() as *const c_char
}

extern "C" fn returns_zero() -> c_int {
    0
}

extern "C" fn init_concord_disconnected() -> c_int {
    11
}

extern "C" fn get_model() -> *const c_char {
    b"Harmony 700\0".as_ptr() as *const c_char
}

extern "C" fn get_serial(p: c_int) -> *const c_char {
    match p {
        1 => b"S1-0001\0".as_ptr() as *const c_char,
        _ => ptr::null(),
    }
}

extern "C" fn get_config_bytes_total() -> c_int {
    0x7e000
}

unsafe extern "C" fn erase_config(size: *mut u32, _cb: Option<LcCallback>, _arg: *mut c_void) -> c_int {
    *size = 0x7e000;
    0
}

unsafe extern "C" fn mh_get_cfg_properties(properties: *mut MhCfgProperties) -> c_int {
    let mut value = MhCfgProperties::default();
    if value.set_host_name("harmony").is_err() {
        return 1;
    }
    properties.write(value);
    0
}

unsafe extern "C" fn mh_get_wifi_networks(networks: *mut MhWifiNetworks) -> c_int {
    let mut value = MhWifiNetworks::default();
    if value.network[0].set_ssid("home").is_err() || value.network[1].set_ssid("guest").is_err()
    {
        return 1;
    }
    networks.write(value);
    0
}

extern "C" fn mh_set_wifi_config(_config: *const c_void) -> c_int {
    15
}

/// Every declared symbol, with a harmless default for the ones the tests
/// don't look at.
fn stub_library() -> StaticSymbols {
    let registry = concord::signatures().unwrap();
    let mut symbols = StaticSymbols::new("libconcord-stub");
    for signature in registry.iter() {
        symbols.insert(signature.name.clone(), returns_zero as usize);
    }
    symbols
        .with("lc_strerror", lc_strerror as usize)
        .with("get_model", get_model as usize)
        .with("get_serial", get_serial as usize)
        .with("get_config_bytes_total", get_config_bytes_total as usize)
        .with("erase_config", erase_config as usize)
        .with("mh_get_cfg_properties", mh_get_cfg_properties as usize)
        .with("mh_get_wifi_networks", mh_get_wifi_networks as usize)
        .with("mh_set_wifi_config", mh_set_wifi_config as usize)
}

fn bind_all(symbols: StaticSymbols) -> Bindings {
    let synth = Synthesizer::for_library(Arc::new(symbols)).unwrap();
    concord::signatures().unwrap().bind(&synth).unwrap()
}

#[test]
fn test_full_table_binds() {
    let bindings = bind_all(stub_library());
    let registry = concord::signatures().unwrap();
    assert_eq!(bindings.len(), registry.len());
    assert!(bindings.get("lc_strerror").is_none());
    assert!(bindings.iter().all(|f| !f.is_traced()));
}

#[test]
fn test_missing_symbol_aborts_binding() {
    let mut symbols = StaticSymbols::new("old-libconcord");
    for signature in concord::signatures().unwrap().iter() {
        if !signature.name.starts_with("mh_") {
            symbols.insert(signature.name.clone(), returns_zero as usize);
        }
    }
    symbols.insert("lc_strerror", lc_strerror as usize);

    let synth = Synthesizer::for_library(Arc::new(symbols)).unwrap();
    let err = concord::signatures().unwrap().bind(&synth).unwrap_err();
    match err {
        BindError::SymbolNotFound { symbol, library } => {
            assert_eq!(symbol, "mh_get_cfg_properties");
            assert_eq!(library, "old-libconcord");
        }
        other => panic!("unexpected error: {}", other),
    }
}

#[test]
fn test_session_calls() {
    let lc = bind_all(stub_library());
    let none = Arg::Handle(OpaqueHandle::NULL);

    assert_eq!(lc.call("init_concord", &[]).unwrap(), Value::Int(0));
    assert_eq!(lc.call("get_identity", &[none, none]).unwrap(), Value::Int(0));
    assert_eq!(lc.call("get_model", &[]).unwrap().as_str(), Some("Harmony 700"));
    assert_eq!(
        lc.call("get_serial", &[Arg::from(concord::SERIAL_COMPONENT_1)])
            .unwrap()
            .as_str(),
        Some("S1-0001")
    );
    assert_eq!(
        lc.call("get_config_bytes_total", &[]).unwrap().as_int(),
        Some(0x7e000)
    );

    let size = OutSlot::scalar();
    lc.call("erase_config", &[Arg::Out(&size), none, none]).unwrap();
    assert_eq!(size.get_u32(), 0x7e000);

    assert!(lc.call("deinit_concord", &[]).unwrap().as_int() == Some(0));
}

#[test]
fn test_connection_failure() {
    let lc = bind_all(stub_library().with("init_concord", init_concord_disconnected as usize));
    let err = lc.call("init_concord", &[]).unwrap_err();
    let remote = err.as_remote().unwrap();
    assert_eq!(remote.code, concord::LC_ERROR_CONNECT);
    assert_eq!(
        remote.to_string(),
        "libconcord function 'init_concord' failed with error code 11 \
         (Error connecting or finding the remote)"
    );
}

#[test]
fn test_records_round_trip() {
    let lc = bind_all(stub_library());

    let properties = OutSlot::record::<MhCfgProperties>();
    lc.call("mh_get_cfg_properties", &[Arg::Out(&properties)])
        .unwrap();
    let properties = properties.get_record::<MhCfgProperties>().unwrap();
    assert_eq!(properties.host_name(), "harmony");
    assert_eq!(properties.user(), "");

    let networks = OutSlot::record::<MhWifiNetworks>();
    lc.call("mh_get_wifi_networks", &[Arg::Out(&networks)])
        .unwrap();
    let networks = networks.get_record::<MhWifiNetworks>().unwrap();
    let ssids: Vec<String> = networks.present().map(|n| n.ssid()).collect();
    assert_eq!(ssids, vec!["home", "guest"]);

    let config = concord::records::MhWifiConfig::default();
    let err = lc
        .call("mh_set_wifi_config", &[Arg::Handle(OpaqueHandle::from_ptr(&config as *const _))])
        .unwrap_err();
    assert_eq!(err.as_remote().unwrap().code, concord::LC_ERROR_UNSUPP);
}

#[test]
fn test_traced_table() {
    let (sink, memory) = TraceSink::memory();
    let tracer = Tracer::new(sink, concord::formatters()).with_prefix("lc");
    let synth = Synthesizer::for_library(Arc::new(stub_library()))
        .unwrap()
        .with_tracer(tracer);
    let lc = concord::signatures().unwrap().bind(&synth).unwrap();
    assert!(lc.iter().all(|f| f.is_traced()));

    lc.call("get_serial", &[Arg::Int(1)]).unwrap();
    let properties = OutSlot::record::<MhCfgProperties>();
    lc.call("mh_get_cfg_properties", &[Arg::Out(&properties)])
        .unwrap();

    assert_eq!(
        memory.lines(),
        vec![
            "lc.get_serial(p=1)",
            "    Returned: \"S1-0001\"",
            "lc.mh_get_cfg_properties(properties=<<out>>)",
            "    Returned: 0",
            "    <<out>> properties={user=\"\", service_link=\"\", \
             host_name=\"harmony\", discovery_server=\"\"}",
        ]
    );
}

#[test]
fn test_configured_tracing() {
    let mut config = BindingConfig::default();
    config.apply_overrides(|key| (key == TRACE_ENV).then(|| "1".to_string()));
    let synth = Synthesizer::for_library(Arc::new(stub_library()))
        .unwrap()
        .configured(&config, concord::formatters());
    assert!(synth.is_tracing());

    let mut config = BindingConfig::default();
    config.apply_overrides(|key| (key == TRACE_ENV).then(|| "true".to_string()));
    let synth = Synthesizer::for_library(Arc::new(stub_library()))
        .unwrap()
        .configured(&config, concord::formatters());
    assert!(!synth.is_tracing());
}

#[test]
fn test_config_file_and_overrides() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("concord.toml");
    std::fs::write(
        &path,
        "[library]\nsearch_paths = [\"/opt/concord/lib\"]\n\n[trace]\nprefix = \"concord\"\n",
    )
    .unwrap();

    let mut config = BindingConfig::load(&path).unwrap();
    assert_eq!(config.library.abi_version, concord::ABI_VERSION);
    assert_eq!(config.trace.prefix, "concord");
    assert!(!config.trace.enabled);

    config.apply_overrides(|key| match key {
        k if k == PATH_ENV => Some("/tmp/libconcord.so.6".to_string()),
        k if k == TRACE_ENV => Some("1".to_string()),
        _ => None,
    });
    assert!(config.trace.enabled);
    assert_eq!(
        loader::candidate_paths(&config.library)[0],
        std::path::PathBuf::from("/tmp/libconcord.so.6")
    );
}

#[test]
fn test_library_naming() {
    let config = LibraryConfig::default();
    let expected = match Platform::current() {
        Platform::Windows => "libconcord.dll".to_string(),
        Platform::MacOs => format!("libconcord.{}.dylib", concord::ABI_VERSION),
        Platform::Elf => format!("libconcord.so.{}", concord::ABI_VERSION),
    };
    assert_eq!(loader::library_filename(config.abi_version), expected);
    assert_eq!(
        loader::candidate_paths(&config),
        vec![std::path::PathBuf::from(expected)]
    );
}

#[test]
fn test_missing_library_reported() {
    let config = LibraryConfig {
        path: Some("/nonexistent/libconcord.so.6".into()),
        abi_version: 999,
        search_paths: Vec::new(),
    };
    assert!(matches!(
        loader::load_configured(&config),
        Err(BindError::LibraryLoad { .. })
    ));
}
