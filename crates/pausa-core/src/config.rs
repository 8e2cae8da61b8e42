use anyhow::Result;
use std::path::PathBuf;

/// Get the configuration directory for pausa.
///
/// # Errors
///
/// Returns an error if the user configuration directory cannot be determined.
pub fn get_config_dir() -> Result<PathBuf> {
    let mut path = dirs::config_dir().ok_or_else(|| anyhow::anyhow!("Failed to get config dir"))?;
    path.push("pausa");
    Ok(path)
}

/// Get the local data directory for pausa (runtime artifacts such as the
/// daemon control socket).
///
/// # Errors
///
/// Returns an error if the local data directory cannot be determined.
pub fn get_data_dir() -> Result<PathBuf> {
    let mut path =
        dirs::data_local_dir().ok_or_else(|| anyhow::anyhow!("Failed to get local data dir"))?;
    path.push("pausa");
    Ok(path)
}

/// Path of the persisted settings file.
///
/// # Errors
///
/// Returns an error if the configuration directory cannot be determined.
pub fn settings_path() -> Result<PathBuf> {
    Ok(get_config_dir()?.join("settings.toml"))
}

/// Path of the daemon control socket.
///
/// # Errors
///
/// Returns an error if the local data directory cannot be determined.
pub fn socket_path() -> Result<PathBuf> {
    Ok(get_data_dir()?.join("pausa.sock"))
}
