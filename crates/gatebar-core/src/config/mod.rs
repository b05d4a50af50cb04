mod dirs;
mod settings;
mod validation;

pub use dirs::Directories;
pub use settings::{Config, DaemonConfig, LoginConfig, QueryConfig};
pub use validation::warn_unknown_fields;
