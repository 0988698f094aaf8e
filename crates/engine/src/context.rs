//! Shared apply-side context

use dockv_storage::{DocStore, DocWriteBatch};

use dockv_core::{ReadHybridTime, RestartReadHt};

/// Everything a write operation needs while applying: the batch it stages
/// into, the snapshot it reads at, and the restart hint it folds into.
pub struct ApplyContext<'b, 'a, S: DocStore> {
    /// Batch collecting this operation's writes.
    pub batch: &'b mut DocWriteBatch<'a, S>,
    /// Snapshot read-modify-write lookups run at.
    pub read_time: ReadHybridTime,
    /// Restart hint folded across every lookup.
    pub restart: &'b mut RestartReadHt,
}
