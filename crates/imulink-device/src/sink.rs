//! [`FrameSink`] – where formatted frames go.
//!
//! The session manager formats frames; transporting them is someone else's
//! concern.  The production sink is the hub producer client in
//! `imulink-hub`, the operator console wraps a sink to echo frames on
//! screen, and tests record frames in memory.

use async_trait::async_trait;
use imulink_types::LinkError;

/// Consumer of the per-tick text frames produced by the streaming loop.
#[async_trait]
pub trait FrameSink: Send {
    /// Deliver one formatted frame.
    ///
    /// # Errors
    ///
    /// Transport failures surface as [`LinkError::Transport`]; the streaming
    /// loop logs them and drops the tick's frame.
    async fn deliver(&mut self, frame: &str) -> Result<(), LinkError>;
}
