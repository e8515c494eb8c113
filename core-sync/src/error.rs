use bridge_traits::error::BridgeError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Bridge error: {0}")]
    Bridge(#[from] BridgeError),

    #[error("Sync task queue is closed")]
    QueueClosed,

    #[error("Sync task {task_id} was dropped before completing")]
    TaskDropped { task_id: String },

    #[error("Runtime error: {0}")]
    Runtime(#[from] core_runtime::Error),
}

pub type Result<T> = std::result::Result<T, SyncError>;
