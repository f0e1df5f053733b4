use thiserror::Error;

use clkmgr_core::ClkmgrError;

/// Client-facing outcomes layered over the shared wire/transport error
/// taxonomy, matching the `LostConnection`/`InvalidArgument` results
/// spec.md sections 4.8 and 7 require from the API facade.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("lost connection to proxy")]
    LostConnection,

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error(transparent)]
    Wire(#[from] ClkmgrError),
}
