//! Shared-container persistence and change notification for the sieve
//! message filter, plus the extension entry point that ties them to
//! `sieve-core` classification.

pub mod config;
pub mod container;
pub mod error;
pub mod extension;
pub mod notify;
pub mod schema;
pub mod spam_log;

pub use config::{CONFIG_FILE, FilterConfig, ModelConfig, NotifyConfig, StoreConfig};
pub use container::{
    CONTAINER_DIR_ENV, SHARED_GROUP, SharedContainer, default_container_dir,
    resolve_container_dir,
};
pub use error::{Result, StoreError};
pub use extension::{FilterExtension, FilterOutcome};
pub use notify::{ChangeObserver, DEFAULT_CHANNEL, Notifier, channel_dir};
pub use spam_log::{AppendMode, SPAM_LOG_KEY, SpamLog, SpamRecord};
