//! Integration tests for reading and writing I/Q capture files

mod helpers;

use std::fs;

use futures::StreamExt;
use iqfm::iqread::{IqAsyncRead, IqConfig, IqRead, read_iq_file};
use iqfm::iqwrite::write_iq_file;
use iqfm::{Error, IqAsyncSource, IqFormat, SampleSequence, SampleSource};

#[test]
fn test_read_cu8_tone_file() {
    let tone = helpers::tone(1_000.0, 96_000.0, 960);
    let path = helpers::temp_path("tone.cu8");
    fs::write(&path, helpers::to_cu8(&tone)).expect("Failed to write test file");

    let config = IqConfig::new(96_000.0, 100, IqFormat::Cu8).with_center_freq(162e6);
    let seq = read_iq_file(&path, config).expect("Failed to read capture");
    assert_eq!(seq.len(), 960);
    assert_eq!(seq.sample_rate(), 96_000.0);
    assert_eq!(seq.center_freq(), Some(162e6));
    for (a, b) in tone.iter().zip(seq.samples()) {
        assert!((a - b).norm() < 0.01, "{a} decoded as {b}");
    }

    fs::remove_file(&path).ok();
}

#[test]
fn test_iterate_cs16_blocks() {
    let tone = helpers::tone(-3_000.0, 48_000.0, 250);
    let path = helpers::temp_path("blocks.cs16");
    fs::write(&path, helpers::to_cs16(&tone)).expect("Failed to write test file");

    let reader = IqRead::from_file(&path, IqConfig::new(48_000.0, 100, IqFormat::Cs16))
        .expect("Failed to open capture");
    let lengths: Vec<usize> = reader.map(|block| block.unwrap().len()).collect();
    assert_eq!(lengths, vec![100, 100, 50]);

    fs::remove_file(&path).ok();
}

#[test]
fn test_header_and_sample_limit() {
    let tone = helpers::tone(500.0, 8_000.0, 64);
    let mut bytes = vec![0xEE; 12];
    bytes.extend(helpers::to_cf32(&tone));
    let path = helpers::temp_path("header.cf32");
    fs::write(&path, &bytes).expect("Failed to write test file");

    let config = IqConfig::new(8_000.0, 16, IqFormat::Cf32)
        .with_header_bytes(12)
        .with_max_samples(40);
    let mut reader = IqRead::from_file(&path, config).expect("Failed to open capture");
    let seq = reader.read_to_end(16).expect("Failed to read");
    assert_eq!(seq.len(), 40);
    assert!((seq[0] - tone[0]).norm() < 1e-6);
    assert!((seq[39] - tone[39]).norm() < 1e-6);
    assert!(reader.next_block(16).unwrap_err().is_end_of_stream());

    fs::remove_file(&path).ok();
}

#[test]
fn test_partial_sample_is_malformed() {
    let path = helpers::temp_path("partial.cs16");
    fs::write(&path, [0u8; 10]).expect("Failed to write test file");
    let err = read_iq_file(&path, IqConfig::new(48_000.0, 8, IqFormat::Cs16)).unwrap_err();
    assert!(matches!(err, Error::MalformedRecord(_)), "{err}");
    fs::remove_file(&path).ok();
}

#[test]
fn test_header_larger_than_file_is_malformed() {
    let path = helpers::temp_path("short.cu8");
    fs::write(&path, [127u8; 6]).expect("Failed to write test file");
    let config = IqConfig::new(48_000.0, 8, IqFormat::Cu8).with_header_bytes(100);
    assert!(matches!(
        IqRead::from_file(&path, config),
        Err(Error::MalformedRecord(_))
    ));
    fs::remove_file(&path).ok();
}

#[test]
fn test_missing_file_is_io_error() {
    let config = IqConfig::new(48_000.0, 8, IqFormat::Cu8);
    assert!(matches!(
        read_iq_file(helpers::temp_path("does-not-exist.cu8"), config),
        Err(Error::Io(_))
    ));
}

#[test]
fn test_write_then_read_back() {
    let tone = helpers::tone(2_000.0, 48_000.0, 300);
    let seq = SampleSequence::new(tone.clone(), 48_000.0).unwrap();
    let path = helpers::temp_path("written.cs16");

    let written = write_iq_file(&path, &seq, IqFormat::Cs16).expect("Failed to write");
    assert_eq!(written, 300);
    assert_eq!(fs::metadata(&path).unwrap().len(), 1_200);

    let back = read_iq_file(&path, IqConfig::new(48_000.0, 64, IqFormat::Cs16)).unwrap();
    for (a, b) in tone.iter().zip(back.samples()) {
        assert!((a - b).norm() < 1e-4);
    }

    fs::remove_file(&path).ok();
}

#[tokio::test]
async fn test_async_reader_matches_sync() {
    let tone = helpers::tone(7_000.0, 96_000.0, 1_000);
    let path = helpers::temp_path("async.cu8");
    fs::write(&path, helpers::to_cu8(&tone)).expect("Failed to write test file");

    let config = IqConfig::new(96_000.0, 300, IqFormat::Cu8);
    let expected = read_iq_file(&path, config.clone()).unwrap();

    let mut source = IqAsyncSource::from_file(&path, config)
        .await
        .expect("Failed to open capture");
    assert_eq!(source.sample_rate(), 96_000.0);
    let mut samples = Vec::new();
    let mut blocks = 0;
    while let Some(block) = source.next().await {
        samples.extend(block.unwrap());
        blocks += 1;
    }
    assert_eq!(blocks, 4);
    assert_eq!(samples, expected.samples());

    fs::remove_file(&path).ok();
}

#[tokio::test]
async fn test_async_reader_header_limit_and_trailing_bytes() {
    let tone = helpers::tone(1_000.0, 48_000.0, 20);
    let mut bytes = vec![0u8; 5];
    bytes.extend(helpers::to_cs16(&tone));

    let config = IqConfig::new(48_000.0, 8, IqFormat::Cs16)
        .with_header_bytes(5)
        .with_max_samples(12);
    let reader = IqAsyncRead::new(tokio::io::BufReader::new(&bytes[..]), config).unwrap();
    let blocks: Vec<_> = reader.collect().await;
    let lengths: Vec<usize> = blocks.into_iter().map(|b| b.unwrap().len()).collect();
    assert_eq!(lengths, vec![8, 4]);

    // one stray byte after the last whole sample
    let mut bytes = helpers::to_cs16(&tone[..3]);
    bytes.push(0);
    let config = IqConfig::new(48_000.0, 8, IqFormat::Cs16);
    let reader = IqAsyncRead::new(tokio::io::BufReader::new(&bytes[..]), config).unwrap();
    let blocks: Vec<_> = reader.collect().await;
    assert_eq!(blocks.len(), 1);
    assert!(matches!(blocks[0], Err(Error::MalformedRecord(_))));
}

#[tokio::test]
async fn test_async_readers_reject_zero_chunk_size() {
    let config = IqConfig::new(48_000.0, 0, IqFormat::Cu8);
    assert!(matches!(
        IqAsyncSource::from_stdin(config.clone()),
        Err(Error::InvalidArgument { stage: "iqread", .. })
    ));
    assert!(matches!(
        IqAsyncRead::new(tokio::io::BufReader::new(&[0u8; 4][..]), config),
        Err(Error::InvalidArgument { .. })
    ));
}
