pub mod decoder;
pub mod frame;
pub mod source;
#[cfg(feature = "v4l2-capture")]
pub mod v4l2;

pub use frame::{CaptureFormat, Frame, FrameMetadata, PixelFormat};
pub use source::{FrameSource, SourceFactory, SyntheticSource};
#[cfg(feature = "v4l2-capture")]
pub use v4l2::V4l2Source;
