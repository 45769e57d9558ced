//! Live send-pipeline status over the server's per-postcard event stream.
//!
//! The server pushes `data: {"status": ...}` frames, double-newline
//! delimited, while the pipeline runs (translate, stylize, compose,
//! dispatch). [`FrameDecoder`] reassembles frames from arbitrarily chunked
//! bytes; [`StatusWatcher`] owns one connection per observed postcard and
//! publishes snapshots to the UI.

pub mod decoder;
pub mod watcher;

pub use decoder::FrameDecoder;
pub use watcher::{ByteStream, CloseReason, StatusSnapshot, StatusSource, StatusWatcher};
