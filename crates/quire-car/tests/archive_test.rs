use std::io::Cursor;

use quire_car::*;
use quire_crypto::ContentHasher;
use quire_types::BlockId;

fn blocks(n: usize) -> Vec<(BlockId, Vec<u8>)> {
    (0..n)
        .map(|i| {
            let data = format!("block number {i}").into_bytes();
            (ContentHasher::BLOCK.hash(&data), data)
        })
        .collect()
}

fn write_archive(roots: Vec<BlockId>, blocks: &[(BlockId, Vec<u8>)]) -> Vec<u8> {
    let mut writer = CarWriter::new(CarHeader::new(roots), Vec::new());
    for (id, data) in blocks {
        writer.write(id, data).unwrap();
    }
    writer.finish().unwrap()
}

#[test]
fn rewrite_reproduces_identical_bytes() {
    let input = blocks(35);
    let original = write_archive(vec![input[0].0], &input);

    let reader = CarReader::new(Cursor::new(&original)).unwrap();
    let header = reader.header().clone();
    let read: Vec<_> = reader.collect::<CarResult<_>>().unwrap();
    assert_eq!(read.len(), 35);

    let rewritten = write_archive(header.roots, &read);
    assert_eq!(rewritten, original);
}

#[test]
fn header_only_archive() {
    let marker = ContentHasher::empty_marker();
    let bytes = write_archive(vec![marker], &[]);
    let mut reader = CarReader::new(Cursor::new(bytes)).unwrap();
    assert_eq!(reader.header().roots(), &[marker]);
    assert!(reader.next_block().unwrap().is_none());
}

#[test]
fn flipped_byte_fails_closed() {
    let input = blocks(4);
    let mut bytes = write_archive(vec![input[0].0], &input);
    let last = bytes.len() - 1;
    bytes[last] ^= 0x01;

    let result: CarResult<Vec<_>> = CarReader::new(Cursor::new(bytes)).unwrap().collect();
    let err = result.unwrap_err();
    assert!(err.is_corruption());
    assert!(matches!(err, CarError::Corruption { .. }));
}

#[test]
fn truncated_archive_is_reported() {
    let input = blocks(3);
    let bytes = write_archive(vec![input[0].0], &input);
    let cut = bytes[..bytes.len() - 4].to_vec();
    let result: CarResult<Vec<_>> = CarReader::new(Cursor::new(cut)).unwrap().collect();
    assert!(matches!(result, Err(CarError::Truncated)));
}

#[tokio::test]
async fn async_and_blocking_formats_agree() {
    let input = blocks(10);
    let blocking = write_archive(vec![input[9].0], &input);

    let mut writer = AsyncCarWriter::new(CarHeader::new(vec![input[9].0]), Vec::new());
    for (id, data) in &input {
        writer.write(id, data).await.unwrap();
    }
    let asynchronous = writer.finish().await.unwrap();
    assert_eq!(asynchronous, blocking);

    let mut reader = AsyncCarReader::new(Cursor::new(blocking)).await.unwrap();
    let mut count = 0;
    while let Some((id, data)) = reader.next_block().await.unwrap() {
        assert_eq!(ContentHasher::BLOCK.hash(&data), id);
        count += 1;
    }
    assert_eq!(count, 10);
}
