use std::path::PathBuf;
use std::sync::OnceLock;

static EXE_DIR: OnceLock<PathBuf> = OnceLock::new();

/// Returns the directory containing the executable.
pub fn get_exe_dir() -> &'static PathBuf {
    EXE_DIR.get_or_init(|| {
        std::env::current_exe()
            .ok()
            .and_then(|p| p.parent().map(|p| p.to_path_buf()))
            .unwrap_or_else(|| PathBuf::from("."))
    })
}

/// Returns the logs directory: `<exe_dir>/logs/`
pub fn get_logs_dir() -> PathBuf {
    get_exe_dir().join("logs")
}

/// Returns the configuration directory: `<exe_dir>/configuration/`
pub fn get_configuration_dir() -> PathBuf {
    get_exe_dir().join("configuration")
}

/// Returns the timing profile path: `<exe_dir>/configuration/delays.json`
pub fn get_delays_path() -> PathBuf {
    get_configuration_dir().join("delays.json")
}

/// Returns the screen layout path: `<exe_dir>/configuration/layout.json`
pub fn get_layout_path() -> PathBuf {
    get_configuration_dir().join("layout.json")
}

/// Returns the swatch manifest path: `<exe_dir>/configuration/swatches.json`
pub fn get_swatch_manifest_path() -> PathBuf {
    get_configuration_dir().join("swatches.json")
}

/// Returns the swatch image directory: `<exe_dir>/assets/swatches/`
pub fn get_swatch_dir() -> PathBuf {
    get_exe_dir().join("assets").join("swatches")
}

/// Ensures the writable directories exist. Call at startup.
pub fn ensure_directories() -> std::io::Result<()> {
    std::fs::create_dir_all(get_logs_dir())?;
    std::fs::create_dir_all(get_configuration_dir())?;
    Ok(())
}
