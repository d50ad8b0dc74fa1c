//! Length + CRC32 framing shared by every append-only log Quire persists.
//!
//! On-disk format of one frame:
//! ```text
//! [4 bytes: payload length (little-endian u32)]
//! [4 bytes: CRC32 of payload (little-endian u32)]
//! [N bytes: payload]
//! ```

use std::fs::File;
use std::io::{self, BufReader, Read, Write};
use std::path::Path;

use tracing::{debug, warn};

/// Header size: 4 bytes length + 4 bytes CRC.
pub const FRAME_HEADER_LEN: u64 = 8;

/// A frame recovered from a log file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    /// Byte offset of the frame header within the file.
    pub offset: u64,
    pub payload: Vec<u8>,
}

/// Result of scanning a log file front to back.
#[derive(Debug, Default)]
pub struct FrameScan {
    pub frames: Vec<Frame>,
    /// Length of the well-formed prefix. Anything after it is a torn write.
    pub valid_len: u64,
    /// Frames skipped because their CRC did not match.
    pub corrupt: usize,
}

/// Write one frame. Returns the number of bytes written.
pub fn write_frame<W: Write>(writer: &mut W, payload: &[u8]) -> io::Result<u64> {
    let length = u32::try_from(payload.len())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "frame exceeds 4 GiB"))?;
    let crc = crc32fast::hash(payload);
    writer.write_all(&length.to_le_bytes())?;
    writer.write_all(&crc.to_le_bytes())?;
    writer.write_all(payload)?;
    Ok(FRAME_HEADER_LEN + payload.len() as u64)
}

/// Read every frame of the file at `path`.
///
/// A missing file scans as empty. Frames failing the CRC check are skipped
/// with a warning; a frame whose declared length runs past the end of the
/// file ends the scan.
pub fn scan_frames(path: &Path) -> io::Result<FrameScan> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(FrameScan::default()),
        Err(e) => return Err(e),
    };
    let file_len = file.metadata()?.len();
    let mut reader = BufReader::new(file);
    let mut scan = FrameScan::default();
    let mut offset: u64 = 0;

    while offset + FRAME_HEADER_LEN <= file_len {
        let mut header = [0u8; FRAME_HEADER_LEN as usize];
        reader.read_exact(&mut header)?;
        let length = u32::from_le_bytes([header[0], header[1], header[2], header[3]]) as u64;
        let expected_crc = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);

        if offset + FRAME_HEADER_LEN + length > file_len {
            warn!(
                path = %path.display(),
                offset,
                length,
                file_len,
                "torn frame at end of log; ignoring tail"
            );
            break;
        }

        let mut payload = vec![0u8; length as usize];
        reader.read_exact(&mut payload)?;
        let next = offset + FRAME_HEADER_LEN + length;

        let actual_crc = crc32fast::hash(&payload);
        if actual_crc != expected_crc {
            warn!(
                path = %path.display(),
                offset,
                expected = expected_crc,
                actual = actual_crc,
                "CRC mismatch; skipping frame"
            );
            scan.corrupt += 1;
        } else {
            scan.frames.push(Frame { offset, payload });
        }
        offset = next;
        scan.valid_len = offset;
    }

    debug!(path = %path.display(), frames = scan.frames.len(), "log scan complete");
    Ok(scan)
}
