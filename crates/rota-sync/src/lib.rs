//! One-shot synchronization of roster events into private chat channels.
//!
//! A run imports the roster and the chat directory into the store, computes the
//! active window and then lets the channel lifecycle engine create, refresh,
//! populate and archive channels.

pub mod channel_lifecycle;
pub mod directory_import;
pub mod roster_import;
pub mod sync_runtime;

#[cfg(test)]
mod test_support;

pub use channel_lifecycle::{
    ChannelLifecycleConfig, ChannelLifecycleEngine, LifecycleReport,
    DEFAULT_PROPAGATION_DELAY_SECONDS,
};
pub use directory_import::{import_directory, DirectoryImportReport};
pub use roster_import::{
    import_roster, RosterImportConfig, RosterImportReport, INCREMENTAL_PROBE_DAYS,
    INCREMENTAL_REFRESH_DAYS,
};
pub use sync_runtime::{SyncConfig, SyncRunReport, SyncRuntime};
