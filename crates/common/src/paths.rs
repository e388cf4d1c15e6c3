//! Location of the persisted configuration file
//!
//! Precedence: CLI arg > `OAUTHCTL_CONFIG` env var > `$HOME/.oauthctl`.

use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Environment variable overriding the configuration path.
pub const CONFIG_ENV: &str = "OAUTHCTL_CONFIG";

/// Base name of the dotfile in the user's home directory.
pub const DOTFILE_NAME: &str = "oauthctl";

/// Resolve the configuration path from an explicit CLI value or the environment,
/// falling back to the dotfile in the home directory.
pub fn resolve_config_path(cli_path: Option<&Path>) -> Result<PathBuf> {
    if let Some(p) = cli_path {
        return Ok(p.to_path_buf());
    }
    if let Some(p) = std::env::var_os(CONFIG_ENV).filter(|p| !p.is_empty()) {
        return Ok(PathBuf::from(p));
    }
    let home = dirs::home_dir()
        .ok_or_else(|| Error::Config("unable to determine the home directory".into()))?;
    Ok(dotfile_in(&home, DOTFILE_NAME))
}

/// `name` as a dotfile under `dir`. A leading dot is added if missing.
pub fn dotfile_in(dir: &Path, name: &str) -> PathBuf {
    if name.starts_with('.') {
        dir.join(name)
    } else {
        dir.join(format!(".{name}"))
    }
}
