use std::path::PathBuf;

/// Capability for resolving where the game keeps its save files
pub trait SaveLocationProvider {
    /// The save directory for this environment, if it can be determined
    fn save_directory(&self) -> Option<PathBuf>;
}

/// Locates the Geometry Dash save directory across platforms
pub struct SaveLocator;

impl SaveLocator {
    pub fn new() -> Self {
        Self
    }
}

impl SaveLocationProvider for SaveLocator {
    /// Get the platform-specific save directory
    ///
    /// Returns:
    /// - Windows: %LOCALAPPDATA%\GeometryDash
    /// - macOS: ~/Library/Application Support/GeometryDash
    /// - Linux: the Steam Play prefix of the Windows build (no native port)
    fn save_directory(&self) -> Option<PathBuf> {
        if cfg!(target_os = "windows") {
            let base = std::env::var("LOCALAPPDATA").ok()?;

            let mut path = PathBuf::from(base);
            path.push("GeometryDash");
            Some(path)
        } else if cfg!(target_os = "macos") {
            let home = std::env::var("HOME").ok()?;

            let mut path = PathBuf::from(home);
            path.push("Library");
            path.push("Application Support");
            path.push("GeometryDash");
            Some(path)
        } else if cfg!(target_os = "linux") {
            let home = std::env::var("HOME").ok()?;

            // Proton prefix for the game's Steam app id 322170
            let mut path = PathBuf::from(home);
            path.push(
                ".local/share/steam/steamapps/compatdata/322170/pfx/drive_c/Users/steamuser/AppData/Local/GeometryDash",
            );
            Some(path)
        } else {
            None
        }
    }
}

impl Default for SaveLocator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_directory_returns_some() {
        let locator = SaveLocator::new();
        let dir = locator.save_directory();
        // Should return Some on any supported platform
        assert!(
            dir.is_some()
                || cfg!(not(any(
                    target_os = "linux",
                    target_os = "windows",
                    target_os = "macos"
                )))
        );
    }

    #[test]
    fn test_save_directory_shape() {
        let locator = SaveLocator::new();
        if let Some(dir) = locator.save_directory() {
            assert!(dir.ends_with("GeometryDash"));
        }
    }

    #[test]
    fn test_linux_path_points_into_proton_prefix() {
        if !cfg!(target_os = "linux") {
            return;
        }
        if let Some(dir) = SaveLocator::new().save_directory() {
            let text = dir.to_string_lossy();
            assert!(text.contains("steamapps/compatdata/322170"));
            assert!(text.ends_with("AppData/Local/GeometryDash"));
        }
    }
}
