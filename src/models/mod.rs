//! Domain models shared by the scheduler, job runner and HTTP layer

pub mod guide;
pub mod playlist;
pub mod run_state;

pub use guide::{GuideCacheEntry, GuideSnapshot, GuideSummary};
pub use playlist::{GuideCredentials, PlaylistConfig, ProviderCredentials};
pub use run_state::{RunState, RunStatus};
