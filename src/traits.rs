use anyhow::Result;
use crate::frame::{Frame, RxFrame};

/// Link to the DMA/MAC layer.
#[cfg_attr(test, mockall::automock)]
pub trait FrameTransport {
    /// Hand a frame to the MAC. The frame is consumed; its buffer is released
    /// once it has been written out.
    fn transmit(&mut self, frame: Frame) -> Result<()>;

    /// Poll for a received frame. Returns Ok(None) if nothing is pending.
    fn recv_frame(&mut self) -> Result<Option<RxFrame>>;
}
