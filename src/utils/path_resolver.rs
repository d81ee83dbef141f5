use anyhow::Result;
use std::path::PathBuf;

const APP_DIR: &str = "ipsv";

/// Resolve the data folder (absolute path): `<platform data dir>/ipsv`
pub fn resolve_data_folder() -> Result<PathBuf> {
    if let Some(dir) = dirs::data_dir() {
        return Ok(dir.join(APP_DIR));
    }

    // Fallback: next to the executable, then the working directory
    let base = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|p| p.to_path_buf()))
        .or_else(|| std::env::current_dir().ok())
        .ok_or_else(|| anyhow::anyhow!("Unable to determine a data folder"))?;
    Ok(base.join(APP_DIR))
}

/// Resolve log folder (absolute path), creating it if needed
pub fn resolve_log_folder() -> Result<PathBuf> {
    let log_dir = resolve_data_folder()?.join("logs");
    std::fs::create_dir_all(&log_dir)
        .map_err(|e| anyhow::anyhow!("Failed to create log folder: {}", e))?;
    Ok(log_dir)
}

/// Where downloaded release archives are cached
pub fn resolve_versions_folder() -> Result<PathBuf> {
    Ok(resolve_data_folder()?.join("versions").join("ips"))
}

/// Client-area cookie jar
pub fn resolve_session_file() -> Result<PathBuf> {
    Ok(resolve_data_folder()?.join("session.json"))
}
