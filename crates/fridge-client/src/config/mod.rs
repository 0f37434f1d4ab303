mod dirs;
mod file;
mod validation;

pub use dirs::Directories;
pub use file::{ClientConfig, ParameterConfig};
pub use validation::warn_unknown_fields;
