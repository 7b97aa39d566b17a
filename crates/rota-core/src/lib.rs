//! Domain model and pure scheduling logic for roster channel synchronization.
//!
//! Holds the records shared by importers, stores and the channel lifecycle
//! engine, together with identity matching, window computation, channel name
//! allocation, invitee tracking and the collaborator ports the sync runtime is
//! wired against.

pub mod channel_naming;
pub mod channel_topic;
pub mod identity_matcher;
pub mod invitee_tracker;
pub mod ports;
pub mod sync_window;
pub mod types;

pub use channel_naming::{
    allocate_channel_name, base_channel_name, candidate_channel_name, ChannelNameLookup,
    NameAllocationError, MAX_CHANNEL_NAME_PROBES,
};
pub use channel_topic::compose_channel_topic;
pub use identity_matcher::{
    best_match, name_distance, IdentityMatch, IdentityMatcher, LinkDecision,
    LINK_ACCEPTANCE_THRESHOLD,
};
pub use invitee_tracker::invitee_delta;
pub use ports::{ChatPlatform, DirectorySource, EventFilter, RosterSource};
pub use sync_window::{
    lookahead_from_hours, AnchorWeekday, SyncWindow, WindowConfigError, MAX_LOOKAHEAD_HOURS,
};
pub use types::{Channel, DirectoryAccount, Event, EventAssignment, RosterPerson, ServiceType};
