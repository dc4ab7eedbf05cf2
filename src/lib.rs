//! tasklink — live-syncing client for a personal task/intent tracker.
//!
//! Users declare tasks (intents) and later record executions (facts of what
//! happened). The crate keeps a local task collection consistent across
//! three unordered mutation sources: the initial bulk fetch, the local
//! optimistic path, and push notifications broadcast by the server for
//! changes made by any client — including echoes of this client's own
//! changes, which are filtered out by a per-session identity tag.

pub mod actions;
pub mod api;
pub mod config;
pub mod model;
pub mod session;
pub mod store;
pub mod sync;

pub use actions::TaskActions;
pub use api::{ApiClient, ApiError};
pub use config::ClientConfig;
pub use session::SessionTag;
pub use store::TaskStore;
pub use sync::{ChannelState, SyncHandle};
