use std::io::Read;

use quire_types::BlockId;
use tokio::io::AsyncRead;
use tracing::trace;

use crate::error::{CarError, CarResult};
use crate::header::CarHeader;
use crate::util::{ld_read, ld_read_async, split_frame};

fn read_header(section: Option<&[u8]>) -> CarResult<CarHeader> {
    match section {
        Some(bytes) => CarHeader::decode(bytes),
        None => Err(CarError::Parsing("missing archive header".into())),
    }
}

/// Blocking archive reader; iterates over verified `(address, bytes)` frames.
pub struct CarReader<R> {
    reader: R,
    header: CarHeader,
    buffer: Vec<u8>,
    failed: bool,
}

impl<R: Read> CarReader<R> {
    /// Parse the header.
    pub fn new(mut reader: R) -> CarResult<Self> {
        let mut buffer = Vec::new();
        let header = read_header(ld_read(&mut reader, &mut buffer)?)?;
        trace!(roots = header.roots.len(), "archive header read");
        Ok(Self {
            reader,
            header,
            buffer,
            failed: false,
        })
    }

    pub fn header(&self) -> &CarHeader {
        &self.header
    }

    pub fn next_block(&mut self) -> CarResult<Option<(BlockId, Vec<u8>)>> {
        match ld_read(&mut self.reader, &mut self.buffer)? {
            Some(frame) => split_frame(frame).map(Some),
            None => Ok(None),
        }
    }
}

impl<R: Read> Iterator for CarReader<R> {
    type Item = CarResult<(BlockId, Vec<u8>)>;

    /// Stops after the first error.
    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let next = self.next_block();
        if next.is_err() {
            self.failed = true;
        }
        next.transpose()
    }
}

/// Tokio archive reader.
pub struct AsyncCarReader<R> {
    reader: R,
    header: CarHeader,
    buffer: Vec<u8>,
}

impl<R> AsyncCarReader<R>
where
    R: AsyncRead + Send + Unpin,
{
    pub async fn new(mut reader: R) -> CarResult<Self> {
        let mut buffer = Vec::new();
        let header = read_header(ld_read_async(&mut reader, &mut buffer).await?)?;
        Ok(Self {
            reader,
            header,
            buffer,
        })
    }

    pub fn header(&self) -> &CarHeader {
        &self.header
    }

    /// The next verified block, or `None` at the end of the archive.
    pub async fn next_block(&mut self) -> CarResult<Option<(BlockId, Vec<u8>)>> {
        match ld_read_async(&mut self.reader, &mut self.buffer).await? {
            Some(frame) => split_frame(frame).map(Some),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::{AsyncCarWriter, CarWriter};
    use quire_crypto::ContentHasher;
    use std::io::Cursor;

    fn block(data: &[u8]) -> (BlockId, Vec<u8>) {
        (ContentHasher::BLOCK.hash(data), data.to_vec())
    }

    #[test]
    fn car_write_read() {
        let test = block(b"test");
        let foo = block(b"foo");
        let mut writer = CarWriter::new(CarHeader::new(vec![foo.0]), Vec::new());
        writer.write(&test.0, &test.1).unwrap();
        writer.write(&foo.0, &foo.1).unwrap();
        let buffer = writer.finish().unwrap();

        let reader = CarReader::new(Cursor::new(buffer)).unwrap();
        assert_eq!(reader.header().roots(), &[foo.0]);
        let blocks: Vec<_> = reader.collect::<CarResult<_>>().unwrap();
        assert_eq!(blocks, vec![test, foo]);
    }

    #[test]
    fn empty_input_has_no_header() {
        assert!(matches!(
            CarReader::new(Cursor::new(Vec::new())),
            Err(CarError::Parsing(_))
        ));
    }

    #[test]
    fn iterator_stops_after_error() {
        let good = block(b"good");
        let mut writer = CarWriter::new(CarHeader::new(vec![good.0]), Vec::new());
        writer.write(&good.0, &good.1).unwrap();
        // Framed under the wrong address.
        writer.write(&good.0, b"evil").unwrap();
        writer.write(&good.0, &good.1).unwrap();
        let buffer = writer.finish().unwrap();

        let mut reader = CarReader::new(Cursor::new(buffer)).unwrap();
        assert!(reader.next().unwrap().is_ok());
        assert!(matches!(
            reader.next().unwrap(),
            Err(CarError::Corruption { .. })
        ));
        assert!(reader.next().is_none());
    }

    #[tokio::test]
    async fn async_write_read() {
        let a = block(b"alpha");
        let b = block(b"beta");
        let mut writer = AsyncCarWriter::new(CarHeader::new(vec![a.0]), Vec::new());
        writer.write(&a.0, &a.1).await.unwrap();
        writer.write(&b.0, &b.1).await.unwrap();
        let buffer = writer.finish().await.unwrap();

        let mut reader = AsyncCarReader::new(Cursor::new(buffer)).await.unwrap();
        assert_eq!(reader.header().roots(), &[a.0]);
        let mut blocks = Vec::new();
        while let Some(block) = reader.next_block().await.unwrap() {
            blocks.push(block);
        }
        assert_eq!(blocks, vec![a, b]);
    }
}
