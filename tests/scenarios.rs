use cabforge::archive::{CabinetReader, ZcabCodec};
use cabforge::codec::NumberedContinuation;
use cabforge::sink::{MessageLevel, FILE_SIZE_MISMATCH};
use cabforge::{
    CabinetBuilder, CabinetError, CabinetWorkItem, CompressionLevel, ErrorKind, FileRecord, MessageSink, SinkOptions,
};
use rand::{thread_rng, RngCore};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::tempdir;

// ---------- helpers ----------
fn write_file(dir: &Path, name: &str, contents: &[u8]) -> PathBuf {
    let path = dir.join(name);
    let mut file = File::create(&path).unwrap();
    file.write_all(contents).unwrap();
    path
}

fn random_bytes(len: usize) -> Vec<u8> {
    let mut buf = vec![0u8; len];
    thread_rng().fill_bytes(&mut buf);
    buf
}

fn single_file_item(out: &Path, src: &Path, name: &str, contents: &[u8], level: CompressionLevel) -> CabinetWorkItem {
    let source = write_file(src, name, contents);
    CabinetWorkItem::new(
        out.join(format!("{name}.cab")),
        vec![FileRecord::new(name, source, contents.len() as u64, 1)],
        level,
        0,
    )
    .unwrap()
}

#[test]
fn five_cabinets_on_ten_threads() {
    let src = tempdir().unwrap();
    let out = tempdir().unwrap();
    let levels = [
        CompressionLevel::None,
        CompressionLevel::Low,
        CompressionLevel::Medium,
        CompressionLevel::High,
        CompressionLevel::Mszip,
    ];
    let mut builder = CabinetBuilder::new(10, Arc::new(NumberedContinuation), ZcabCodec).unwrap();
    let mut expected = Vec::new();
    for (n, level) in levels.into_iter().enumerate() {
        let name = format!("file{n}.txt");
        let contents = format!("payload {n} ").repeat(500).into_bytes();
        builder.enqueue(single_file_item(out.path(), src.path(), &name, &contents, level));
        expected.push((name, contents));
    }
    assert_eq!(builder.effective_workers(), 5);

    let sink = MessageSink::default();
    let summary = builder.run(&sink);
    assert_eq!(summary.workers, 5);
    assert_eq!(summary.built, 5);
    assert_eq!(sink.exit_code(), 0);

    for (name, contents) in expected {
        let reader = CabinetReader::open(&out.path().join(format!("{name}.cab")), &NumberedContinuation).unwrap();
        assert_eq!(reader.volumes().len(), 1);
        assert_eq!(reader.read_entry(&name).unwrap(), contents);
    }
}

#[test]
fn large_single_file_spans_volumes() {
    let src = tempdir().unwrap();
    let out = tempdir().unwrap();
    // Random data does not compress, so 2.5 MiB needs three 1 MiB volumes.
    let contents = random_bytes(5 * 512 * 1024);

    let mut builder = CabinetBuilder::new(2, Arc::new(NumberedContinuation), ZcabCodec).unwrap();
    builder.set_max_cabinet_size_for_large_file_splitting(1);
    builder.set_max_uncompressed_media_size(2);
    builder.enqueue(single_file_item(out.path(), src.path(), "disk", &contents, CompressionLevel::Low));

    let sink = MessageSink::default();
    assert_eq!(builder.run(&sink).built, 1);
    assert!(!sink.encountered_error());

    let primary = out.path().join("disk.cab");
    assert!(out.path().join("disk_2.cab").exists());
    assert!(out.path().join("disk_3.cab").exists());
    for volume in ["disk.cab", "disk_2.cab"] {
        assert!(fs::metadata(out.path().join(volume)).unwrap().len() <= 1024 * 1024);
    }

    let reader = CabinetReader::open(&primary, &NumberedContinuation).unwrap();
    assert_eq!(reader.volumes().len(), 3);
    assert_eq!(reader.read_entry("disk").unwrap(), contents);
}

#[test]
fn small_file_is_not_split() {
    let src = tempdir().unwrap();
    let out = tempdir().unwrap();
    let contents = random_bytes(3 * 512 * 1024);

    let mut builder = CabinetBuilder::new(1, Arc::new(NumberedContinuation), ZcabCodec).unwrap();
    builder.set_max_cabinet_size_for_large_file_splitting(1);
    // Below the threshold: the codec's own ceiling applies.
    builder.set_max_uncompressed_media_size(100);
    builder.enqueue(single_file_item(out.path(), src.path(), "disk", &contents, CompressionLevel::Low));
    builder.run(&MessageSink::default());

    assert!(!out.path().join("disk_2.cab").exists());
    let reader = CabinetReader::open(&out.path().join("disk.cab"), &NumberedContinuation).unwrap();
    assert_eq!(reader.volumes().len(), 1);
}

#[test]
fn zero_threads_is_rejected() {
    let err = CabinetBuilder::new(0, Arc::new(NumberedContinuation), ZcabCodec).err().unwrap();
    assert!(matches!(err, CabinetError::InvalidThreadCount(0)));
    assert_eq!(err.kind(), ErrorKind::Configuration);
}

#[test]
fn missing_source_fails_only_its_cabinet() {
    let src = tempdir().unwrap();
    let out = tempdir().unwrap();
    let mut builder = CabinetBuilder::new(3, Arc::new(NumberedContinuation), ZcabCodec).unwrap();
    builder.enqueue(single_file_item(out.path(), src.path(), "a.txt", b"first", CompressionLevel::Medium));
    builder.enqueue(
        CabinetWorkItem::new(
            out.path().join("missing.cab"),
            vec![FileRecord::new("gone.txt", src.path().join("gone.txt"), 10, 1)],
            CompressionLevel::Medium,
            0,
        )
        .unwrap(),
    );
    builder.enqueue(single_file_item(out.path(), src.path(), "b.txt", b"second", CompressionLevel::Medium));

    let sink = MessageSink::default();
    let summary = builder.run(&sink);

    assert_eq!(summary.built, 2);
    assert_eq!(summary.failed, 1);
    assert_eq!(sink.error_count(), 1);
    assert_eq!(sink.exit_code(), ErrorKind::Codec.message_number());
    assert!(out.path().join("a.txt.cab").exists());
    assert!(out.path().join("b.txt.cab").exists());
    assert!(!out.path().join("missing.cab").exists());

    // No staging files are left behind by the failed cabinet.
    let leftovers: Vec<_> = fs::read_dir(out.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .filter(|name| !name.ends_with(".cab"))
        .collect();
    assert!(leftovers.is_empty(), "{leftovers:?}");
}

#[test]
fn size_mismatch_can_be_elevated() {
    let src = tempdir().unwrap();
    let out = tempdir().unwrap();
    let source = write_file(src.path(), "grown.txt", b"longer than declared");
    let item = CabinetWorkItem::new(
        out.path().join("grown.cab"),
        vec![FileRecord::new("grown.txt", source, 4, 1)],
        CompressionLevel::None,
        0,
    )
    .unwrap();

    let mut options = SinkOptions::default();
    options.elevated_warnings.insert(FILE_SIZE_MISMATCH);
    let sink = MessageSink::new(options);
    let mut builder = CabinetBuilder::new(1, Arc::new(NumberedContinuation), ZcabCodec).unwrap();
    builder.enqueue(item);
    let summary = builder.run(&sink);

    // The cabinet itself is still written.
    assert_eq!(summary.built, 1);
    assert!(sink.encountered_error());
    assert_eq!(sink.exit_code(), FILE_SIZE_MISMATCH);
    assert!(sink.messages().iter().all(|m| m.level != MessageLevel::Warning));
}
