//! Resolve our own hotkey address from a wallet directory.
//!
//! Wallet layout: `{path}/{name}/hotkeys/{hotkey}` is a JSON file whose
//! `ss58Address` field is the public hotkey address. Only the public part is
//! read.
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::Result;

#[derive(Deserialize)]
struct HotkeyFile {
    #[serde(rename = "ss58Address")]
    ss58_address: String,
}

/// Expand a leading `~` to `$HOME`
pub fn expand_home(path: &str) -> PathBuf {
    match path.strip_prefix('~') {
        Some(rest) => match std::env::var_os("HOME") {
            Some(home) => {
                let mut p = PathBuf::from(home);
                p.push(rest.trim_start_matches('/'));
                p
            }
            None => PathBuf::from(path),
        },
        None => PathBuf::from(path),
    }
}

pub fn hotkey_file(wallet_path: &str, wallet_name: &str, wallet_hotkey: &str) -> PathBuf {
    expand_home(wallet_path)
        .join(wallet_name)
        .join("hotkeys")
        .join(wallet_hotkey)
}

pub fn read_hotkey_address(file: &Path) -> Result<String> {
    let raw = std::fs::read_to_string(file).map_err(|e| {
        crate::config_error!("cannot read hotkey file {}: {}", file.display(), e)
    })?;
    let parsed: HotkeyFile = serde_json::from_str(&raw).map_err(|e| {
        crate::config_error!("malformed hotkey file {}: {}", file.display(), e)
    })?;
    if parsed.ss58_address.trim().is_empty() {
        return Err(crate::config_error!(
            "hotkey file {} has an empty ss58Address",
            file.display()
        ));
    }
    Ok(parsed.ss58_address)
}

pub fn load_hotkey_address(
    wallet_path: &str,
    wallet_name: &str,
    wallet_hotkey: &str,
) -> Result<String> {
    read_hotkey_address(&hotkey_file(wallet_path, wallet_name, wallet_hotkey))
}
