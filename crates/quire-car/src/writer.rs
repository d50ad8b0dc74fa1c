use std::io::Write;

use quire_types::BlockId;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::error::CarResult;
use crate::header::CarHeader;
use crate::util::{ld_write, ld_write_async};

/// Blocking archive writer. The header is written with the first block, or
/// by [`CarWriter::finish`] when there are no blocks.
///
/// Addresses are written as given; the caller vouches that each matches its
/// bytes.
#[derive(Debug)]
pub struct CarWriter<W> {
    header: CarHeader,
    writer: W,
    is_header_written: bool,
    blocks: usize,
}

impl<W: Write> CarWriter<W> {
    pub fn new(header: CarHeader, writer: W) -> Self {
        Self {
            header,
            writer,
            is_header_written: false,
            blocks: 0,
        }
    }

    fn write_header(&mut self) -> CarResult<()> {
        if !self.is_header_written {
            let header_bytes = self.header.encode()?;
            ld_write(&mut self.writer, &[header_bytes.as_slice()])?;
            self.is_header_written = true;
        }
        Ok(())
    }

    pub fn write(&mut self, id: &BlockId, data: &[u8]) -> CarResult<()> {
        self.write_header()?;
        ld_write(&mut self.writer, &[id.as_bytes().as_slice(), data])?;
        self.blocks += 1;
        Ok(())
    }

    pub fn blocks_written(&self) -> usize {
        self.blocks
    }

    /// Write the header if still pending, flush and return the writer.
    pub fn finish(mut self) -> CarResult<W> {
        self.write_header()?;
        self.writer.flush()?;
        Ok(self.writer)
    }
}

/// Tokio archive writer.
#[derive(Debug)]
pub struct AsyncCarWriter<W> {
    header: CarHeader,
    writer: W,
    is_header_written: bool,
    blocks: usize,
}

impl<W> AsyncCarWriter<W>
where
    W: AsyncWrite + Send + Unpin,
{
    pub fn new(header: CarHeader, writer: W) -> Self {
        Self {
            header,
            writer,
            is_header_written: false,
            blocks: 0,
        }
    }

    async fn write_header(&mut self) -> CarResult<()> {
        if !self.is_header_written {
            let header_bytes = self.header.encode()?;
            ld_write_async(&mut self.writer, &[header_bytes.as_slice()]).await?;
            self.is_header_written = true;
        }
        Ok(())
    }

    pub async fn write(&mut self, id: &BlockId, data: &[u8]) -> CarResult<()> {
        self.write_header().await?;
        ld_write_async(&mut self.writer, &[id.as_bytes().as_slice(), data]).await?;
        self.blocks += 1;
        Ok(())
    }

    pub fn blocks_written(&self) -> usize {
        self.blocks
    }

    pub async fn finish(mut self) -> CarResult<W> {
        self.write_header().await?;
        self.writer.flush().await?;
        Ok(self.writer)
    }
}
