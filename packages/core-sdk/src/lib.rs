pub mod config;
pub mod db;
pub mod error;
pub mod fallback;
pub mod filter;
pub mod llm;
pub mod models;
pub mod normalize;
pub mod pipeline;
pub mod prompt;
pub mod registry;
pub mod server;
pub mod telemetry;

/**
 * \brief SDK 预导入集合，方便外部引用常用模块。
 */
pub mod prelude {
    pub use crate::config::FetchConfig;
    pub use crate::db;
    pub use crate::error::FetchError;
    pub use crate::models::{CanonicalItem, Dialect, McqRecord, Provider, StructureKind};
    pub use crate::pipeline;
    pub use crate::registry;
    pub use crate::server;
    pub use crate::telemetry;
}
