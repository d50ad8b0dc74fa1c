//! Archive codec for exchanging repositories.
//!
//! An archive is a length-delimited header followed by length-delimited
//! frames:
//!
//! ```text
//! varint(len) header            bincode { version: 1, roots: [BlockId] }
//! varint(len) address ‖ bytes   one frame per block, len = 32 + bytes
//! ```
//!
//! Readers recompute every block's address and fail on the first mismatch.
//! Both blocking ([`CarReader`], [`CarWriter`]) and tokio
//! ([`AsyncCarReader`], [`AsyncCarWriter`]) variants are provided.

mod error;
mod header;
mod reader;
mod util;
mod writer;

pub use crate::error::{CarError, CarResult};
pub use crate::header::CarHeader;
pub use crate::reader::{AsyncCarReader, CarReader};
pub use crate::util::{MAX_BLOCK_LEN, MAX_FRAME};
pub use crate::writer::{AsyncCarWriter, CarWriter};
