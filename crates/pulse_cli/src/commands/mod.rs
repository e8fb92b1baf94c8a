//! CLI command implementations.

pub mod dump;
pub mod inspect;
pub mod sync;

use pulse_protocol::ServerEvent;
use pulse_server::read_frames;
use pulse_storage::{FileBackend, LogBackend};
use std::path::Path;

/// Frames read from a log file without modifying it.
pub struct LogContents {
    /// Committed events with their byte offsets.
    pub frames: Vec<(u64, ServerEvent)>,
    /// Offset of an incomplete trailing frame, if any.
    pub torn_at: Option<u64>,
    /// Log size in bytes.
    pub size: u64,
}

/// Reads every frame of the log at `path`.
///
/// A torn tail is reported, not repaired; the next `sync` against the
/// log cuts it off. Fails while another process holds the log open.
pub fn read_log(path: &Path) -> Result<LogContents, Box<dyn std::error::Error>> {
    if !path.exists() {
        return Err(format!("No event log found at {:?}", path).into());
    }

    let backend = FileBackend::open(path)?;
    let (frames, torn_at) = read_frames(&backend)?;
    Ok(LogContents {
        frames,
        torn_at,
        size: backend.size(),
    })
}
