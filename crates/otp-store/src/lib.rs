pub mod config;
pub mod error;
pub mod json_bridge;
pub mod schema;
pub mod store;
pub mod time;
pub mod workspace;

pub use config::{Config, InferenceConfig};
pub use error::{Result, StoreError};
pub use store::{MessageRecord, Role, SessionRecord, Store};
pub use workspace::{DATA_DIR_ENV, TextExport, Workspace, default_base_dir};
