use quire_types::BlockId;

/// Errors from reading or writing archives.
#[derive(Debug, thiserror::Error)]
pub enum CarError {
    #[error("failed to parse archive: {0}")]
    Parsing(String),

    #[error("unsupported archive version {0}")]
    UnsupportedVersion(u64),

    #[error("frame of {0} bytes exceeds the frame limit")]
    FrameTooLarge(usize),

    /// The writer was handed a section that no reader would accept.
    #[error("refusing to write a {0}-byte section past the frame limit")]
    SectionTooLarge(usize),

    /// A block's bytes do not hash to the address it was framed with.
    #[error("corrupt archive block: framed as {expected}, bytes hash to {computed}")]
    Corruption { expected: BlockId, computed: BlockId },

    #[error("archive truncated inside a frame")]
    Truncated,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CarError {
    /// Whether the archive bytes themselves are damaged.
    pub fn is_corruption(&self) -> bool {
        !matches!(self, Self::Io(_) | Self::SectionTooLarge(_))
    }
}

pub type CarResult<T> = Result<T, CarError>;
