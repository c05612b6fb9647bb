//! Capture side of the pipeline: the subprocess supervisor, the frame
//! extractor turning its byte stream into JPEG frames, and the frame type
//! shared with every downstream consumer.

pub mod extractor;
pub mod frame;
pub mod supervisor;

pub use extractor::FrameExtractor;
pub use frame::Frame;
pub use supervisor::{CaptureEvent, CaptureSupervisor, Heartbeat};
