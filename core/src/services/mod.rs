//! Services module
//!
//! The synchronization core that sits between the command layer and the
//! document store: live queries, validated mutations and deletes.

pub mod cascade;
pub mod live_query;
pub mod mutator;

pub use cascade::CascadeDeleter;
pub use live_query::{
    subscribe, CancelHandle, FollowHandle, LiveView, QueryEvent, ViewState, ViewStatus,
};
pub use mutator::EntityMutator;
