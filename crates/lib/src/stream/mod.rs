//! SSE-style stream handling: byte chunks → frames → events → message updates.

mod decoder;
mod event;

pub use decoder::{Frame, FrameDecoder};
pub use event::{apply_event, events_from_frame, Applied, StreamEvent};
