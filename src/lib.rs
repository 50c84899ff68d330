pub mod config;
pub mod error;
pub mod explain;
pub mod registry;

pub use config::{MappingConfig, CONFIG_FILE_NAME, ENV_PARAMETER_STYLE};
pub use error::{MappingError, MappingResult};
pub use explain::{explain, render_text, CollectionExplain, StatementExplain};
pub use registry::MappingRegistry;
