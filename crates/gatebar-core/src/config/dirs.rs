use directories::ProjectDirs;
use std::path::PathBuf;

/// Application directories following the XDG base directory layout
#[derive(Debug, Clone)]
pub struct Directories {
    /// Config directory (~/.config/gatebar)
    pub config: PathBuf,

    /// State directory for log files (~/.local/state/gatebar)
    pub state: PathBuf,

    /// Per-user runtime directory ($XDG_RUNTIME_DIR)
    pub runtime: PathBuf,

    /// Config file path
    pub config_file: PathBuf,
}

impl Directories {
    /// Create a new `Directories` instance with standard XDG paths.
    ///
    /// Falls back to the system temp directory when no home directory can be
    /// determined (e.g. a bare service account).
    #[must_use]
    pub fn new() -> Self {
        let runtime = runtime_dir();
        let Some(project) = ProjectDirs::from("", "", "gatebar") else {
            let fallback = std::env::temp_dir().join("gatebar");
            return Self::with_base_and_runtime(fallback, runtime);
        };

        let config = project.config_dir().to_path_buf();
        let state = project
            .state_dir()
            .unwrap_or_else(|| project.data_local_dir())
            .to_path_buf();

        Self {
            config_file: config.join("config.json"),
            config,
            state,
            runtime,
        }
    }

    #[must_use]
    pub fn with_base(base: PathBuf) -> Self {
        let runtime = base.join("run");
        Self::with_base_and_runtime(base, runtime)
    }

    fn with_base_and_runtime(base: PathBuf, runtime: PathBuf) -> Self {
        Self {
            config_file: base.join("config.json"),
            state: base.join("state"),
            config: base,
            runtime,
        }
    }
}

impl Default for Directories {
    fn default() -> Self {
        Self::new()
    }
}

fn runtime_dir() -> PathBuf {
    std::env::var("XDG_RUNTIME_DIR").map_or_else(|_| std::env::temp_dir(), PathBuf::from)
}
