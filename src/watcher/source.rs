//! Source trait feeding the fragment store.

use std::sync::Arc;

use async_trait::async_trait;

use super::WatchError;
use crate::store::FragmentStore;

/// Something that mirrors a source of truth into a [`FragmentStore`].
///
/// Implementations own reconnection and resync. They must keep per-identity
/// order: a later write for a fragment never reflects older state than an
/// earlier one.
#[async_trait]
pub trait FragmentSource: Send {
    /// Source name for logging.
    fn name(&self) -> &str;

    /// Keep `store` in sync until the watch can no longer continue.
    ///
    /// Returning at all, with or without an error, means the mirror is no
    /// longer being maintained.
    async fn run(self: Box<Self>, store: Arc<FragmentStore>) -> Result<(), WatchError>;
}
