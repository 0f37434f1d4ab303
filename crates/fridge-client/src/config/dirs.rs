use directories::ProjectDirs;
use std::path::PathBuf;

use crate::{Error, Result};

/// Application directories following XDG conventions
#[derive(Debug, Clone)]
pub struct Directories {
    /// Config directory (~/.config/fridge-monitor)
    pub config: PathBuf,

    /// Config file path
    pub config_file: PathBuf,
}

impl Directories {
    /// Resolve the standard XDG paths.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if no home directory can be determined.
    pub fn new() -> Result<Self> {
        let project = ProjectDirs::from("", "", "fridge-monitor")
            .ok_or_else(|| Error::Config("cannot determine config directory".to_string()))?;
        Ok(Self::with_base(project.config_dir().to_path_buf()))
    }

    #[must_use]
    pub fn with_base(base: PathBuf) -> Self {
        Self {
            config_file: base.join("config.json"),
            config: base,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_base_sets_paths() {
        let base = PathBuf::from("/tmp/test-fridge");
        let dirs = Directories::with_base(base.clone());

        assert_eq!(dirs.config, base);
        assert_eq!(dirs.config_file, base.join("config.json"));
    }

    #[test]
    fn test_new_uses_project_name() {
        if let Ok(dirs) = Directories::new() {
            assert!(dirs.config.to_string_lossy().contains("fridge-monitor"));
            assert!(dirs.config_file.ends_with("config.json"));
        }
    }
}
