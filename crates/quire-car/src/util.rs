use std::io::{self, Read, Write};

use integer_encoding::{VarInt, VarIntAsyncWriter, VarIntWriter};
use quire_crypto::ContentHasher;
use quire_types::BlockId;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{CarError, CarResult};

/// Largest header or frame a reader accepts.
pub const MAX_FRAME: usize = 4 * 1024 * 1024;

const ADDRESS_LEN: usize = 32;

/// Largest block that still fits in one frame next to its address.
pub const MAX_BLOCK_LEN: usize = MAX_FRAME - ADDRESS_LEN;

const MAX_PREFIX_LEN: usize = 10;

/// A length prefix collected one byte at a time, so that input ending inside
/// the prefix is told apart from a clean end of stream.
#[derive(Default)]
struct LengthPrefix {
    bytes: [u8; MAX_PREFIX_LEN],
    len: usize,
}

impl LengthPrefix {
    /// Returns `true` once the prefix is complete.
    fn push(&mut self, byte: u8) -> CarResult<bool> {
        if self.len == MAX_PREFIX_LEN {
            return Err(CarError::Parsing("unterminated length prefix".into()));
        }
        self.bytes[self.len] = byte;
        self.len += 1;
        Ok(byte & 0x80 == 0)
    }

    fn finish(&self) -> CarResult<Option<usize>> {
        let (length, _) = usize::decode_var(&self.bytes[..self.len])
            .ok_or_else(|| CarError::Parsing("malformed length prefix".into()))?;
        if length > MAX_FRAME {
            return Err(CarError::FrameTooLarge(length));
        }
        Ok(Some(length))
    }

    fn end_of_input(&self) -> CarResult<Option<usize>> {
        match self.len {
            0 => Ok(None),
            _ => Err(CarError::Truncated),
        }
    }
}

fn read_len<R: Read>(reader: &mut R) -> CarResult<Option<usize>> {
    let mut prefix = LengthPrefix::default();
    let mut byte = [0u8; 1];
    loop {
        match reader.read(&mut byte) {
            Ok(0) => return prefix.end_of_input(),
            Ok(_) => {
                if prefix.push(byte[0])? {
                    return prefix.finish();
                }
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(CarError::Io(e)),
        }
    }
}

async fn read_len_async<R>(reader: &mut R) -> CarResult<Option<usize>>
where
    R: AsyncRead + Send + Unpin,
{
    let mut prefix = LengthPrefix::default();
    let mut byte = [0u8; 1];
    loop {
        match reader.read(&mut byte).await {
            Ok(0) => return prefix.end_of_input(),
            Ok(_) => {
                if prefix.push(byte[0])? {
                    return prefix.finish();
                }
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(CarError::Io(e)),
        }
    }
}

fn read_error(e: io::Error) -> CarError {
    if e.kind() == io::ErrorKind::UnexpectedEof {
        CarError::Truncated
    } else {
        CarError::Io(e)
    }
}

/// Read one length-delimited section into `buf`. `None` at end of input.
pub(crate) fn ld_read<'a, R: Read>(reader: &mut R, buf: &'a mut Vec<u8>) -> CarResult<Option<&'a [u8]>> {
    let Some(length) = read_len(reader)? else {
        return Ok(None);
    };
    buf.resize(length, 0);
    reader.read_exact(&mut buf[..length]).map_err(read_error)?;
    Ok(Some(&buf[..length]))
}

pub(crate) async fn ld_read_async<'a, R>(reader: &mut R, buf: &'a mut Vec<u8>) -> CarResult<Option<&'a [u8]>>
where
    R: AsyncRead + Send + Unpin,
{
    let Some(length) = read_len_async(reader).await? else {
        return Ok(None);
    };
    buf.resize(length, 0);
    reader
        .read_exact(&mut buf[..length])
        .await
        .map_err(read_error)?;
    Ok(Some(&buf[..length]))
}

/// Split a frame into its address and bytes, checking that the bytes hash
/// to the address.
pub(crate) fn split_frame(frame: &[u8]) -> CarResult<(BlockId, Vec<u8>)> {
    if frame.len() < ADDRESS_LEN {
        return Err(CarError::Parsing(format!(
            "frame of {} bytes is shorter than an address",
            frame.len()
        )));
    }
    let (address, data) = frame.split_at(ADDRESS_LEN);
    let expected = BlockId::from_slice(address).map_err(|e| CarError::Parsing(e.to_string()))?;
    let computed = ContentHasher::BLOCK.hash(data);
    if computed != expected {
        return Err(CarError::Corruption { expected, computed });
    }
    Ok((expected, data.to_vec()))
}

fn checked_len(len: usize) -> CarResult<usize> {
    if len > MAX_FRAME {
        return Err(CarError::SectionTooLarge(len));
    }
    Ok(len)
}

pub(crate) fn ld_write<W: Write>(writer: &mut W, parts: &[&[u8]]) -> CarResult<()> {
    let len = checked_len(parts.iter().map(|p| p.len()).sum())?;
    writer.write_varint(len)?;
    for part in parts {
        writer.write_all(part)?;
    }
    Ok(())
}

pub(crate) async fn ld_write_async<W>(writer: &mut W, parts: &[&[u8]]) -> CarResult<()>
where
    W: AsyncWrite + Send + Unpin,
{
    let len = checked_len(parts.iter().map(|p| p.len()).sum())?;
    writer.write_varint_async(len).await?;
    for part in parts {
        writer.write_all(part).await?;
    }
    Ok(())
}
