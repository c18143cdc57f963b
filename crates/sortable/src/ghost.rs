//! Native drag-image plumbing. Every step here is best-effort: a host that
//! cannot attach a ghost still gets a working reorder.

use thiserror::Error;
use tracing::{debug, warn};

use crate::dom::NodeId;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransferError {
    #[error("operation is not supported by the host")]
    Unsupported,
    #[error("host rejected the operation: {0}")]
    Rejected(String),
}

/// The subset of a drag event's data-transfer object the engine touches.
pub trait DataTransfer {
    fn set_effect_allowed(&mut self, effect: &str);
    fn set_data(&mut self, format: &str, data: &str) -> Result<(), TransferError>;
    fn set_drag_image(&mut self, image: NodeId, x: i64, y: i64) -> Result<(), TransferError>;
}

/// Returns whether a drag image was attached.
pub(crate) fn attach(
    transfer: Option<&mut dyn DataTransfer>,
    item: NodeId,
    offset: (f64, f64),
) -> bool {
    let Some(transfer) = transfer else {
        debug!(?item, "no data transfer on drag start; skipping ghost");
        return false;
    };

    transfer.set_effect_allowed("move");
    // Some hosts refuse to start a drag with an empty payload.
    if let Err(error) = transfer.set_data("text", "arbitrary-content") {
        warn!(?item, %error, "failed to set drag payload");
    }

    let (x, y) = (offset.0.trunc() as i64, offset.1.trunc() as i64);
    match transfer.set_drag_image(item, x, y) {
        Ok(()) => true,
        Err(error) => {
            warn!(?item, %error, "drag image unavailable; continuing without ghost");
            false
        }
    }
}
