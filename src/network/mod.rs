pub mod quota;
pub mod snapshot;

pub use quota::QuotaPolicy;
pub use snapshot::{CallerRecord, NetworkSnapshot, NetworkSnapshotHandle, RefreshOutcome};
