pub mod app_config;
pub mod project;
pub mod sources;
pub mod validation;

pub use app_config::*;
pub use project::*;
pub use sources::*;
pub use validation::*;
