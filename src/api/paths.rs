//! All Paths are recorded here for use throughout this codebase
pub mod base {
    pub const ROOT: &str = "/";
    pub const HEALTH: &str = "/health";
    pub const ABOUT: &str = "/about";
    pub const STATUS: &str = "/status";
}

/// The single request type served to callers
pub const TEXT_COMPRESS: &str = "/TextCompressProtocol";

/// Header carrying the caller hotkey, set by the authenticating transport
pub const CALLER_HOTKEY_HEADER: &str = "x-dendrite-hotkey";

pub mod rate_limits {
    pub const CHECK: &str = "/rl-check/{hotkey}";
    pub const RESET: &str = "/rl-reset";
}

pub fn check_path(hotkey: &str) -> String {
    rate_limits::CHECK.replace("{hotkey}", hotkey)
}
