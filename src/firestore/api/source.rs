/// Where a one-shot read is served from.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Source {
    /// Server when reachable, local cache otherwise.
    #[default]
    Default,
    /// Server only; fails when offline.
    Server,
    /// Local cache only; never touches the network.
    Cache,
}

/// Options applied when attaching a snapshot listener.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ListenOptions {
    /// Also deliver snapshots whose only change is metadata
    /// (`from_cache` or `has_pending_writes` flipping).
    pub include_metadata_changes: bool,
}

impl ListenOptions {
    pub fn with_metadata_changes() -> Self {
        Self {
            include_metadata_changes: true,
        }
    }
}
