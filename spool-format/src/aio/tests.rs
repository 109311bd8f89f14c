use std::path::Path;

use tokio::io::AsyncReadExt;

use crate::aio::{SpoolFileReader, SpoolFileWriter};
use crate::checksum::DefaultChecksum;
use crate::core::{
    ArchiveReader, ExtractOptions, ExtractStats, IntegrityPolicy, PackOptions, RecordEvent,
};
use crate::error::{ErrorKind, ExtractError, PackError};
use crate::sync::{Extractor, SpoolReader, SpoolWriter};
use crate::test_util::{binary_blob, build_tree, snapshot, temp_files};

async fn pack(root: &Path) -> Vec<u8> {
    let mut out = Vec::new();
    SpoolFileWriter::new(root)
        .await
        .unwrap()
        .write_to(&mut out)
        .await
        .unwrap();
    out
}

async fn extract(
    bytes: &[u8],
    out: &Path,
    options: ExtractOptions,
) -> Result<ExtractStats, ExtractError> {
    let mut reader = SpoolFileReader::new(out, &options)?;
    reader.extract_from(bytes).await
}

#[tokio::test]
async fn async_round_trip_preserves_tree() {
    let src = tempfile::tempdir().unwrap();
    let root = src.path().join("tree");
    build_tree(&root, 70_000);

    let bytes = pack(&root).await;
    let out = tempfile::tempdir().unwrap();
    let stats = extract(&bytes, out.path(), ExtractOptions::default())
        .await
        .unwrap();

    assert_eq!(snapshot(&out.path().join("tree")), snapshot(&root));
    assert_eq!(stats.directories, 8);
    assert_eq!(stats.files, 5);
    assert_eq!(stats.payload_bytes, 70_000 + 15 + 18 + 4);
    assert!(temp_files(out.path()).is_empty());
}

#[tokio::test]
async fn async_walk_writes_each_directory_before_its_contents() {
    let src = tempfile::tempdir().unwrap();
    let root = src.path().join("tree");
    build_tree(&root, 1_000);
    std::fs::create_dir_all(root.join("deep/a/side")).unwrap();
    std::fs::write(root.join("deep/after.txt"), b"after").unwrap();
    std::fs::write(root.join("deep/a/side/x.txt"), b"x").unwrap();

    let bytes = pack(&root).await;
    let mut core = ArchiveReader::<DefaultChecksum>::new(IntegrityPolicy::Abort);
    core.feed(&bytes).unwrap();

    let mut seen: Vec<String> = Vec::new();
    while let Some(event) = core.next_event().unwrap() {
        if let RecordEvent::Record(record) = event {
            let key = record.path.key();
            if let Some((parent, _)) = key.rsplit_once('/') {
                assert!(seen.iter().any(|p| p == parent), "{key} before {parent}");
            }
            seen.push(key);
        }
    }
    core.finish().unwrap();

    let mut expected: Vec<String> = snapshot(&root)
        .into_keys()
        .map(|k| if k.is_empty() { "tree".to_string() } else { format!("tree/{k}") })
        .collect();
    expected.sort();
    seen.sort();
    assert_eq!(seen, expected);
}

#[tokio::test]
async fn async_feed_accepts_single_bytes() {
    let src = tempfile::tempdir().unwrap();
    let root = src.path().join("tree");
    build_tree(&root, 600);
    let bytes = pack(&root).await;

    let out = tempfile::tempdir().unwrap();
    let options = ExtractOptions::default();
    let mut reader = SpoolFileReader::new(out.path(), &options).unwrap();
    for byte in bytes.chunks(1) {
        reader.feed(byte).await.unwrap();
    }
    reader.finish().await.unwrap();

    assert_eq!(snapshot(&out.path().join("tree")), snapshot(&root));
}

#[tokio::test]
async fn async_streaming_pipe_round_trip() {
    let src = tempfile::tempdir().unwrap();
    let root = src.path().join("tree");
    build_tree(&root, 200_000);

    let writer = SpoolFileWriter::with_options(&root, PackOptions::new().with_chunk_size(4096))
        .await
        .unwrap();
    let (stream, handle) = writer.into_reader();

    let out = tempfile::tempdir().unwrap();
    let options = ExtractOptions::new().with_chunk_size(1000);
    let mut reader = SpoolFileReader::new(out.path(), &options).unwrap();
    let extracted = reader.extract_from(stream).await.unwrap();
    let packed = handle.join().await.unwrap();

    assert_eq!(packed.files, extracted.files);
    assert_eq!(packed.directories, extracted.directories);
    assert_eq!(packed.payload_bytes, extracted.payload_bytes);
    assert_eq!(snapshot(&out.path().join("tree")), snapshot(&root));
}

#[tokio::test]
async fn async_abort_cancels_the_walk() {
    let src = tempfile::tempdir().unwrap();
    std::fs::write(src.path().join("big.bin"), binary_blob(100_000)).unwrap();

    let writer =
        SpoolFileWriter::with_options(src.path(), PackOptions::new().with_chunk_size(1000))
            .await
            .unwrap();
    let (mut stream, handle) = writer.into_reader();

    let mut buf = [0u8; 500];
    stream.read_exact(&mut buf).await.unwrap();
    handle.abort();

    let err = handle.join().await.unwrap_err();
    assert!(matches!(err, PackError::Cancelled));
    assert_eq!(err.kind(), ErrorKind::Cancelled);
}

#[tokio::test]
async fn async_dropped_consumer_fails_the_walk() {
    let src = tempfile::tempdir().unwrap();
    std::fs::write(src.path().join("big.bin"), binary_blob(100_000)).unwrap();

    let writer =
        SpoolFileWriter::with_options(src.path(), PackOptions::new().with_chunk_size(1000))
            .await
            .unwrap();
    let (mut stream, handle) = writer.into_reader();

    let mut buf = [0u8; 100];
    stream.read_exact(&mut buf).await.unwrap();
    drop(stream);

    let err = handle.join().await.unwrap_err();
    assert!(matches!(err, PackError::WriteFailed(_)));
    assert_eq!(err.kind(), ErrorKind::FilesystemFailure);
}

#[tokio::test]
async fn async_and_sync_frontends_interoperate() {
    let src = tempfile::tempdir().unwrap();
    let root = src.path().join("tree");
    build_tree(&root, 9_999);
    let expected = snapshot(&root);

    // sync writer, async reader
    let mut bytes = Vec::new();
    SpoolWriter::new(&root).unwrap().write_to(&mut bytes).unwrap();
    let out = tempfile::tempdir().unwrap();
    extract(&bytes, out.path(), ExtractOptions::default())
        .await
        .unwrap();
    assert_eq!(snapshot(&out.path().join("tree")), expected);

    // async writer, sync reader
    let bytes = pack(&root).await;
    let out = tempfile::tempdir().unwrap();
    let options = ExtractOptions::default();
    let mut reader = SpoolReader::new(Extractor::new(out.path(), &options), &options).unwrap();
    reader.feed(&bytes).unwrap();
    reader.finish().unwrap();
    assert_eq!(snapshot(&out.path().join("tree")), expected);
}

#[tokio::test]
async fn async_missing_root_fails_early() {
    let tmp = tempfile::tempdir().unwrap();
    let err = SpoolFileWriter::new(tmp.path().join("missing"))
        .await
        .err()
        .unwrap();
    assert!(matches!(err, PackError::MissingRoot(..)));

    std::fs::write(tmp.path().join("plain"), b"x").unwrap();
    let err = SpoolFileWriter::new(tmp.path().join("plain"))
        .await
        .err()
        .unwrap();
    assert!(matches!(err, PackError::RootNotDirectory(_)));
}

#[tokio::test]
async fn async_corruption_under_both_policies() {
    let src = tempfile::tempdir().unwrap();
    let root = src.path().join("tree");
    std::fs::create_dir(&root).unwrap();
    std::fs::write(root.join("a.bin"), [0x5a; 300]).unwrap();
    std::fs::write(root.join("b.txt"), b"untouched").unwrap();

    let mut bytes = pack(&root).await;
    let start = bytes
        .windows(300)
        .position(|w| w.iter().all(|&b| b == 0x5a))
        .unwrap();
    bytes[start + 150] = 0;

    let out = tempfile::tempdir().unwrap();
    let err = extract(&bytes, out.path(), ExtractOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::IntegrityFailure);
    assert!(!out.path().join("tree/a.bin").exists());
    assert!(temp_files(out.path()).is_empty());

    let out = tempfile::tempdir().unwrap();
    let options = ExtractOptions::new().with_integrity(IntegrityPolicy::Report);
    let stats = extract(&bytes, out.path(), options).await.unwrap();
    assert_eq!(stats.corrupt.len(), 1);
    assert_eq!(stats.corrupt[0].path.as_str(), "tree/a.bin");
    assert!(!out.path().join("tree/a.bin").exists());
    assert_eq!(
        std::fs::read(out.path().join("tree/b.txt")).unwrap(),
        b"untouched"
    );
    assert!(temp_files(out.path()).is_empty());
}

#[tokio::test]
async fn async_dropping_reader_removes_temp_file() {
    let src = tempfile::tempdir().unwrap();
    let root = src.path().join("tree");
    std::fs::create_dir(&root).unwrap();
    std::fs::write(root.join("half.bin"), binary_blob(4_000)).unwrap();
    let bytes = pack(&root).await;

    let out = tempfile::tempdir().unwrap();
    {
        let options = ExtractOptions::default();
        let mut reader = SpoolFileReader::new(out.path(), &options).unwrap();
        reader.feed(&bytes[..bytes.len() / 2]).await.unwrap();
        assert_eq!(temp_files(out.path()).len(), 1);
    }

    assert!(temp_files(out.path()).is_empty());
    assert!(!out.path().join("tree/half.bin").exists());
}

#[tokio::test]
async fn async_blake3_archives_need_a_blake3_reader() {
    let src = tempfile::tempdir().unwrap();
    let root = src.path().join("tree");
    build_tree(&root, 2_000);

    let mut bytes = Vec::new();
    SpoolFileWriter::<blake3::Hasher>::with_checksum(&root, PackOptions::default())
        .await
        .unwrap()
        .write_to(&mut bytes)
        .await
        .unwrap();

    let out = tempfile::tempdir().unwrap();
    let options = ExtractOptions::default();
    let mut reader: SpoolFileReader<blake3::Hasher> =
        SpoolFileReader::with_checksum(out.path(), &options).unwrap();
    reader.extract_from(bytes.as_slice()).await.unwrap();
    assert_eq!(snapshot(&out.path().join("tree")), snapshot(&root));

    let out = tempfile::tempdir().unwrap();
    let err = extract(&bytes, out.path(), options).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::IntegrityFailure);
}
