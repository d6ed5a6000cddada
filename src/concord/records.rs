//! Harmony configuration records
//!
//! Fixed-layout structs exchanged with the `mh_*` entry points. Every text
//! field is a null-padded buffer of [`MH_STRING_LENGTH`] bytes; both sides of
//! the boundary must agree on these sizes exactly.

use std::mem;

use thiserror::Error;

use crate::ffi::{describe_record, NativeRecord, RecordLayout};

/// Size of every text field, including the terminating NUL
pub const MH_STRING_LENGTH: usize = 35;

/// Capacity of the discovered network array
pub const MH_MAX_WIFI_NETWORKS: usize = 30;

type Text = [u8; MH_STRING_LENGTH];

const EMPTY: Text = [0; MH_STRING_LENGTH];

/// Errors setting a text field
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordError {
    #[error("Value for '{field}' is too long: {len} bytes (max {max})")]
    TooLong {
        field: &'static str,
        len: usize,
        max: usize,
    },

    #[error("Value for '{field}' contains a NUL byte")]
    InteriorNul { field: &'static str },
}

fn read_text(buf: &Text) -> String {
    let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    String::from_utf8_lossy(&buf[..end]).into_owned()
}

fn write_text(buf: &mut Text, field: &'static str, value: &str) -> Result<(), RecordError> {
    let bytes = value.as_bytes();
    if bytes.contains(&0) {
        return Err(RecordError::InteriorNul { field });
    }
    if bytes.len() >= MH_STRING_LENGTH {
        return Err(RecordError::TooLong {
            field,
            len: bytes.len(),
            max: MH_STRING_LENGTH - 1,
        });
    }
    buf.fill(0);
    buf[..bytes.len()].copy_from_slice(bytes);
    Ok(())
}

macro_rules! text_fields {
    ($record:ty { $($field:ident => $set:ident),* $(,)? }) => {
        impl $record {
            $(
                pub fn $field(&self) -> String {
                    read_text(&self.$field)
                }

                pub fn $set(&mut self, value: &str) -> Result<(), RecordError> {
                    write_text(&mut self.$field, stringify!($field), value)
                }
            )*

            fn text_fields(&self) -> Vec<(String, String)> {
                vec![$((stringify!($field).to_string(), read_text(&self.$field))),*]
            }
        }
    };
}

/// General service properties (`struct mh_cfg_properties`)
#[repr(C)]
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct MhCfgProperties {
    user: Text,
    pass: Text,
    service_link: Text,
    host_name: Text,
    discovery_server: Text,
}

text_fields!(MhCfgProperties {
    user => set_user,
    pass => set_pass,
    service_link => set_service_link,
    host_name => set_host_name,
    discovery_server => set_discovery_server,
});

impl Default for MhCfgProperties {
    fn default() -> Self {
        Self {
            user: EMPTY,
            pass: EMPTY,
            service_link: EMPTY,
            host_name: EMPTY,
            discovery_server: EMPTY,
        }
    }
}

static CFG_PROPERTIES_LAYOUT: RecordLayout = RecordLayout {
    name: "mh_cfg_properties",
    size: mem::size_of::<MhCfgProperties>(),
    describe: describe_record::<MhCfgProperties>,
};

// SAFETY: repr(C) byte arrays only.
unsafe impl NativeRecord for MhCfgProperties {
    fn layout() -> &'static RecordLayout {
        &CFG_PROPERTIES_LAYOUT
    }

    fn fields(&self) -> Vec<(String, String)> {
        // The service password is never traced.
        self.text_fields()
            .into_iter()
            .filter(|(name, _)| name != "pass")
            .collect()
    }
}

/// Wi-Fi credentials and connection state (`struct mh_wifi_config`)
#[repr(C)]
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct MhWifiConfig {
    ssid: Text,
    encryption: Text,
    password: Text,
    connect_status: Text,
    error_code: Text,
}

text_fields!(MhWifiConfig {
    ssid => set_ssid,
    encryption => set_encryption,
    password => set_password,
    connect_status => set_connect_status,
    error_code => set_error_code,
});

impl Default for MhWifiConfig {
    fn default() -> Self {
        Self {
            ssid: EMPTY,
            encryption: EMPTY,
            password: EMPTY,
            connect_status: EMPTY,
            error_code: EMPTY,
        }
    }
}

static WIFI_CONFIG_LAYOUT: RecordLayout = RecordLayout {
    name: "mh_wifi_config",
    size: mem::size_of::<MhWifiConfig>(),
    describe: describe_record::<MhWifiConfig>,
};

// SAFETY: repr(C) byte arrays only.
unsafe impl NativeRecord for MhWifiConfig {
    fn layout() -> &'static RecordLayout {
        &WIFI_CONFIG_LAYOUT
    }

    fn fields(&self) -> Vec<(String, String)> {
        // The password is never traced.
        self.text_fields()
            .into_iter()
            .filter(|(name, _)| name != "password")
            .collect()
    }
}

/// One discovered network (`struct mh_wifi_network`)
#[repr(C)]
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct MhWifiNetwork {
    ssid: Text,
    signal_strength: Text,
    channel: Text,
    encryption: Text,
}

text_fields!(MhWifiNetwork {
    ssid => set_ssid,
    signal_strength => set_signal_strength,
    channel => set_channel,
    encryption => set_encryption,
});

impl Default for MhWifiNetwork {
    fn default() -> Self {
        Self {
            ssid: EMPTY,
            signal_strength: EMPTY,
            channel: EMPTY,
            encryption: EMPTY,
        }
    }
}

/// Discovered networks (`struct mh_wifi_networks`); unused entries have an
/// empty SSID
#[repr(C)]
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct MhWifiNetworks {
    pub network: [MhWifiNetwork; MH_MAX_WIFI_NETWORKS],
}

impl MhWifiNetworks {
    /// Entries with a non-empty SSID
    pub fn present(&self) -> impl Iterator<Item = &MhWifiNetwork> {
        self.network.iter().filter(|n| n.ssid[0] != 0)
    }
}

impl Default for MhWifiNetworks {
    fn default() -> Self {
        Self {
            network: [MhWifiNetwork::default(); MH_MAX_WIFI_NETWORKS],
        }
    }
}

static WIFI_NETWORKS_LAYOUT: RecordLayout = RecordLayout {
    name: "mh_wifi_networks",
    size: mem::size_of::<MhWifiNetworks>(),
    describe: describe_record::<MhWifiNetworks>,
};

// SAFETY: repr(C) array of byte-array records.
unsafe impl NativeRecord for MhWifiNetworks {
    fn layout() -> &'static RecordLayout {
        &WIFI_NETWORKS_LAYOUT
    }

    fn fields(&self) -> Vec<(String, String)> {
        self.network
            .iter()
            .enumerate()
            .filter(|(_, n)| n.ssid[0] != 0)
            .flat_map(|(i, n)| {
                n.text_fields()
                    .into_iter()
                    .map(move |(name, value)| (format!("network[{}].{}", i, name), value))
            })
            .collect()
    }
}

/// Layouts of every record in the libconcord ABI
pub fn layouts() -> [&'static RecordLayout; 3] {
    [
        MhCfgProperties::layout(),
        MhWifiConfig::layout(),
        MhWifiNetworks::layout(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_sizes() {
        assert_eq!(mem::size_of::<MhCfgProperties>(), 5 * MH_STRING_LENGTH);
        assert_eq!(mem::size_of::<MhWifiConfig>(), 5 * MH_STRING_LENGTH);
        assert_eq!(
            mem::size_of::<MhWifiNetworks>(),
            MH_MAX_WIFI_NETWORKS * 4 * MH_STRING_LENGTH
        );
        assert_eq!(MhWifiNetworks::layout().size, mem::size_of::<MhWifiNetworks>());
    }

    #[test]
    fn test_text_is_null_padded() {
        let mut config = MhWifiConfig::default();
        config.set_ssid("home-network").unwrap();
        assert_eq!(config.ssid(), "home-network");
        assert!(config.ssid[12..].iter().all(|&b| b == 0));

        config.set_ssid("lab").unwrap();
        assert_eq!(config.ssid(), "lab");
        assert!(config.ssid[3..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_text_limits() {
        let mut props = MhCfgProperties::default();
        let longest = "x".repeat(MH_STRING_LENGTH - 1);
        props.set_host_name(&longest).unwrap();
        assert_eq!(props.host_name(), longest);

        let err = props.set_host_name(&"x".repeat(MH_STRING_LENGTH)).unwrap_err();
        assert_eq!(
            err,
            RecordError::TooLong {
                field: "host_name",
                len: MH_STRING_LENGTH,
                max: MH_STRING_LENGTH - 1
            }
        );
        assert_eq!(
            props.set_user("a\0b").unwrap_err(),
            RecordError::InteriorNul { field: "user" }
        );
    }

    #[test]
    fn test_fields_for_tracing() {
        let mut config = MhWifiConfig::default();
        config.set_ssid("lab").unwrap();
        config.set_password("secret").unwrap();
        let fields = config.fields();
        assert!(fields.contains(&("ssid".to_string(), "lab".to_string())));
        assert!(fields.iter().all(|(name, _)| name != "password"));

        let mut props = MhCfgProperties::default();
        props.set_user("owner").unwrap();
        props.set_pass("hunter2").unwrap();
        let fields = props.fields();
        assert!(fields.contains(&("user".to_string(), "owner".to_string())));
        assert!(fields.iter().all(|(name, value)| name != "pass" && value != "hunter2"));
        assert_eq!(fields.len(), 4);
        assert_eq!(props.pass(), "hunter2");

        let mut networks = MhWifiNetworks::default();
        networks.network[2].set_ssid("cafe").unwrap();
        networks.network[2].set_channel("11").unwrap();
        assert_eq!(networks.present().count(), 1);
        let fields = networks.fields();
        assert!(fields.contains(&("network[2].channel".to_string(), "11".to_string())));
        assert_eq!(fields.len(), 4);
    }
}
