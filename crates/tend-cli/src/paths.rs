use dirs::home_dir;
use std::path::PathBuf;

/// Returns the tend home directory, or None if the user's home cannot be resolved.
///
/// `TEND_HOME` overrides the default of `~/.tend`.
pub fn try_tend_home() -> Option<PathBuf> {
    if let Ok(val) = std::env::var("TEND_HOME") {
        return Some(PathBuf::from(val));
    }
    home_dir().map(|h| h.join(".tend"))
}

/// Default apply root: $TEND_HOME/root
pub fn default_root() -> Option<PathBuf> {
    try_tend_home().map(|home| home.join("root"))
}

/// Default manifest name, looked up in the working directory.
pub const MANIFEST_FILE: &str = "tend.toml";
