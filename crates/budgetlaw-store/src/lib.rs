//! Storage layer: resumable-run checkpoints, per-document JSON snapshots,
//! chunked uploads and the LanceDB vector store.

mod atomic;
pub mod batch;
pub mod checkpoint;
mod error;
pub mod snapshot;
pub mod upload;

pub use batch::{SearchHit, from_batch, to_batch};
pub use checkpoint::CheckpointStore;
pub use error::StoreError;
pub use snapshot::SnapshotWriter;
pub use upload::{BatchUploader, RecordSink};

#[cfg(feature = "lancedb")]
mod lance;
#[cfg(feature = "lancedb")]
pub use lance::LanceStore;
