//! libconcord ABI 6 signature table
//!
//! Declarations only; every entry goes through the same synthesizer.
//! `lc_strerror` is not listed: the result checker calls it directly.

use super::records;
use crate::ffi::{BindError, FfiSignature, SignatureRegistry};

const DECLARATIONS: &[&str] = &[
    // Identity and version getters (valid after get_identity)
    "const char* get_mfg()",
    "const char* get_model()",
    "const char* get_codename()",
    "int get_skin()",
    "int get_fw_ver_maj()",
    "int get_fw_ver_min()",
    "int get_fw_type()",
    "int get_hw_ver_maj()",
    "int get_hw_ver_min()",
    "int get_hw_ver_mic()",
    "int get_flash_size()",
    "int get_flash_mfg()",
    "int get_flash_id()",
    "const char* get_flash_part_num()",
    "int get_arch()",
    "int get_proto()",
    "const char* get_hid_mfg_str()",
    "const char* get_hid_prod_str()",
    "int get_hid_irl()",
    "int get_hid_orl()",
    "int get_hid_frl()",
    "int get_usb_vid()",
    "int get_usb_pid()",
    "int get_usb_bcd()",
    "char* get_serial(int p)",
    "int get_config_bytes_used()",
    "int get_config_bytes_total()",
    // Remote clock (valid after get_time)
    "int get_time_second()",
    "int get_time_minute()",
    "int get_time_hour()",
    "int get_time_day()",
    "int get_time_dow()",
    "int get_time_month()",
    "int get_time_year()",
    "int get_time_utc_offset()",
    "const char* get_time_timezone()",
    // Memory handed out by the library
    "void delete_blob(uint8_t* ptr)",
    // Session
    "checked identify_file(uint8_t* in, uint32_t size, out int type)",
    "checked init_concord()",
    "checked deinit_concord()",
    "checked get_identity(lc_callback cb, void* cb_arg)",
    "checked reset_remote(lc_callback cb, void* cb_arg)",
    "checked get_time()",
    "checked set_time()",
    // Website posts
    "checked post_connect_test_success(uint8_t* data, uint32_t size)",
    "checked post_preconfig(uint8_t* data, uint32_t size)",
    "checked post_postconfig(uint8_t* data, uint32_t size)",
    "checked post_postfirmware(uint8_t* data, uint32_t size)",
    // Configuration
    "checked invalidate_flash()",
    "checked read_config_from_remote(out uint8_t* out, out uint32_t size, lc_callback cb, void* cb_arg)",
    "checked write_config_to_remote(uint8_t* in, uint32_t size, lc_callback cb, void* cb_arg)",
    "checked read_file(char* file_name, out uint8_t* out, out uint32_t size)",
    "checked write_config_to_file(uint8_t* in, uint32_t size, char* file_name, int binary)",
    "checked verify_remote_config(uint8_t* in, uint32_t size, lc_callback cb, void* cb_arg)",
    "checked prep_config()",
    "checked finish_config()",
    "checked erase_config(out uint32_t size, lc_callback cb, void* cb_arg)",
    "checked find_config_binary(uint8_t* config, uint32_t config_size, out uint8_t* binary_ptr, out uint32_t binary_size)",
    // Safemode firmware
    "checked erase_safemode(lc_callback cb, void* cb_arg)",
    "checked read_safemode_from_remote(out uint8_t* out, out uint32_t size, lc_callback cb, void* cb_arg)",
    "checked write_safemode_to_file(uint8_t* in, uint32_t size, char* file_name)",
    // Firmware
    "int is_fw_update_supported(int direct)",
    "int is_config_safe_after_fw()",
    "checked prep_firmware()",
    "checked finish_firmware()",
    "checked erase_firmware(int direct, lc_callback cb, void* cb_arg)",
    "checked read_firmware_from_remote(out uint8_t* out, out uint32_t size, lc_callback cb, void* cb_arg)",
    "checked write_firmware_to_remote(uint8_t* in, uint32_t size, int direct, lc_callback cb, void* cb_arg)",
    "checked write_firmware_to_file(uint8_t* in, uint32_t size, char* file_name, int binary)",
    "checked extract_firmware_binary(uint8_t* xml, uint32_t xml_size, out uint8_t* out, out uint32_t size)",
    // IR learning
    "checked get_key_names(uint8_t* xml, uint32_t xml_size, out char** key_names, out uint32_t key_names_length)",
    "void delete_key_names(char** key_names, uint32_t key_names_length)",
    "checked learn_from_remote(out uint32_t carrier_clock, out uint32_t* ir_signal, out uint32_t ir_signal_length, lc_callback cb, void* cb_arg)",
    "void delete_ir_signal(uint32_t* ir_signal)",
    "checked encode_for_posting(uint32_t carrier_clock, uint32_t* ir_signal, uint32_t ir_signal_length, out char* encoded_signal)",
    "void delete_encoded_signal(char* encoded_signal)",
    "checked post_new_code(uint8_t* xml, uint32_t xml_size, char* key_name, char* encoded_signal)",
    // Harmony service and Wi-Fi configuration
    "checked mh_get_cfg_properties(out mh_cfg_properties properties)",
    "checked mh_set_cfg_properties(const struct mh_cfg_properties* properties)",
    "checked mh_get_wifi_networks(out mh_wifi_networks networks)",
    "checked mh_get_wifi_config(out mh_wifi_config config)",
    "checked mh_set_wifi_config(const struct mh_wifi_config* config)",
];

/// Every libconcord entry point bound by this crate, in declaration order
pub fn signatures() -> Result<SignatureRegistry, BindError> {
    let layouts = records::layouts();
    let mut registry = SignatureRegistry::new();
    for declaration in DECLARATIONS {
        registry.register(FfiSignature::parse_with(declaration, &layouts)?)?;
    }
    Ok(registry)
}
