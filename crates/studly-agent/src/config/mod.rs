pub mod settings;

pub use settings::{
    ActivityLogConfig, EvictionKind, HistoryConfig, LlmConfig, RequestConfig, ServerConfig,
    Settings, StoreConfig,
};
