use std::path::{Path, PathBuf};
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

/// Returns the recordings directory: `<exe_dir>/recordings/`
pub fn get_recordings_dir() -> PathBuf {
    get_exe_dir().join("recordings")
}

/// Resolves a configured path. Relative paths are taken from the exe directory.
pub fn resolve(path: impl AsRef<Path>) -> PathBuf {
    let path = path.as_ref();
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        get_exe_dir().join(path)
    }
}

/// Ensures all output directories exist. Call at startup.
pub fn ensure_directories() -> std::io::Result<()> {
    std::fs::create_dir_all(get_logs_dir())?;
    std::fs::create_dir_all(get_recordings_dir())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_relative_uses_exe_dir() {
        let resolved = resolve("resources/anchor.png");
        assert!(resolved.starts_with(get_exe_dir()));
        assert!(resolved.ends_with("resources/anchor.png"));
    }

    #[test]
    fn test_resolve_absolute_unchanged() {
        let abs = std::env::temp_dir().join("anchor.png");
        assert_eq!(resolve(&abs), abs);
    }
}
