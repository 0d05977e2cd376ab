//! End-to-end tests driving filter, deps and generate through the library.

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use bufproc::codec::SearchLimits;
use bufproc::config::{Manifest, Overrides, Settings};
use bufproc::{
    CodecEngine, CompressionSpec, Outcome, Pipeline, RawPayload, SchemeParams, Staleness,
    INCOMPLETE_MARKER,
};
use pretty_assertions::assert_eq;
use tempfile::tempdir;

const FEATURE_SOURCE: &str = "\
#include \"buffers.h\"

#ifdef FEATURE
BPDataBuffer(uint8_t, Foo, \"foo.bin\");
#endif
";

fn pipeline(defines: &[&str]) -> Pipeline {
    let overrides = Overrides {
        defines: defines.iter().map(|d| d.to_string()).collect(),
        threads: Some(4),
        ..Overrides::default()
    };
    Pipeline::new(Settings::resolve(Manifest::default(), &overrides).unwrap())
}

/// Inputs are backdated so a header written right away is strictly newer.
fn feature_project(dir: &Path) -> PathBuf {
    let input = dir.join("assets.h");
    let data = dir.join("foo.bin");
    fs::write(&input, FEATURE_SOURCE).unwrap();
    fs::write(&data, [0xDE, 0xAD, 0xBE, 0xEF]).unwrap();

    let past = SystemTime::now() - Duration::from_secs(3600);
    for path in [&input, &data] {
        File::options()
            .write(true)
            .open(path)
            .unwrap()
            .set_modified(past)
            .unwrap();
    }
    input
}

#[test]
fn test_feature_guarded_buffer() {
    let dir = tempdir().unwrap();
    let input = feature_project(dir.path());
    let output = dir.path().join("assets_buffers.h");

    pipeline(&["-DFEATURE"]).generate(&input, &output, false).unwrap();
    let text = fs::read_to_string(&output).unwrap();
    assert!(text.contains("constexpr std::size_t Foo_DataSize = 4;"));
    assert!(text.contains("constexpr uint8_t Foo_Data[Foo_DataSize] = {0xDE, 0xAD, 0xBE, 0xEF};"));

    pipeline(&[]).generate(&input, &output, false).unwrap();
    let text = fs::read_to_string(&output).unwrap();
    assert!(!text.contains("Foo_Data"));
    assert!(text.contains("#pragma once"));
}

#[test]
fn test_feature_guarded_deps() {
    let dir = tempdir().unwrap();
    let input = feature_project(dir.path());

    let with = pipeline(&["-DFEATURE"]).deps(&input).unwrap();
    assert_eq!(
        with.paths(),
        &[dir.path().join("foo.bin").canonicalize().unwrap()]
    );

    let without = pipeline(&[]).deps(&input).unwrap();
    assert!(without.is_empty());
}

#[test]
fn test_second_generate_is_a_noop() {
    let dir = tempdir().unwrap();
    let input = feature_project(dir.path());
    let output = dir.path().join("out").join("assets_buffers.h");
    let pipeline = pipeline(&["FEATURE"]);

    let first = pipeline.generate(&input, &output, false).unwrap();
    assert!(matches!(
        first,
        Outcome::Generated {
            reason: Some(Staleness::Missing),
            ..
        }
    ));
    let first_text = fs::read_to_string(&output).unwrap();

    assert_eq!(
        pipeline.generate(&input, &output, false).unwrap(),
        Outcome::UpToDate
    );
    assert_eq!(fs::read_to_string(&output).unwrap(), first_text);

    // Forced regeneration of unchanged inputs is byte-identical.
    pipeline.generate(&input, &output, true).unwrap();
    assert_eq!(fs::read_to_string(&output).unwrap(), first_text);
}

#[test]
fn test_marker_forces_regeneration() {
    let dir = tempdir().unwrap();
    let input = feature_project(dir.path());
    let output = dir.path().join("assets_buffers.h");
    let pipeline = pipeline(&["FEATURE"]);

    pipeline.generate(&input, &output, false).unwrap();
    let clean = fs::read_to_string(&output).unwrap();
    fs::write(&output, format!("{}{}\n", clean, INCOMPLETE_MARKER)).unwrap();

    match pipeline.generate(&input, &output, false).unwrap() {
        Outcome::Generated { reason, .. } => assert_eq!(reason, Some(Staleness::Incomplete)),
        other => panic!("Expected regeneration, got {:?}", other),
    }
    assert_eq!(fs::read_to_string(&output).unwrap(), clean);
}

#[test]
fn test_changed_defines_regenerate() {
    let dir = tempdir().unwrap();
    let input = feature_project(dir.path());
    let output = dir.path().join("assets_buffers.h");

    pipeline(&["FEATURE"]).generate(&input, &output, false).unwrap();
    match pipeline(&[]).generate(&input, &output, false).unwrap() {
        Outcome::Generated { reason, buffers } => {
            assert_eq!(reason, Some(Staleness::FingerprintChanged));
            assert!(buffers.is_empty());
        }
        other => panic!("Expected regeneration, got {:?}", other),
    }
}

#[test]
fn test_filter_is_order_independent() {
    let dir = tempdir().unwrap();
    let always = dir.path().join("always.h");
    let never = dir.path().join("never.h");
    let feature = dir.path().join("feature.h");
    let plain = dir.path().join("plain.h");
    fs::write(&always, "BPDataBuffer(uint8_t, A, \"a.bin\");\n").unwrap();
    fs::write(&never, "#if 0\nBPDataBuffer(uint8_t, B, \"b.bin\");\n#endif\n").unwrap();
    fs::write(&feature, FEATURE_SOURCE).unwrap();
    fs::write(&plain, "int main() { return 0; }\n").unwrap();

    let files = vec![always.clone(), never.clone(), feature.clone(), plain.clone()];
    let mut reversed = files.clone();
    reversed.reverse();

    let with_feature = pipeline(&["-DFEATURE"]);
    assert_eq!(
        with_feature.filter(&files).unwrap(),
        vec![always.clone(), feature.clone()]
    );
    assert_eq!(
        with_feature.filter(&reversed).unwrap(),
        vec![feature, always.clone()]
    );

    assert_eq!(pipeline(&[]).filter(&files).unwrap(), vec![always]);
}

/// 4 KB pseudo-random blocks, each a copy of the last with one byte changed.
fn repetitive_stream(len: usize) -> Vec<u8> {
    let mut state = 0x2545_F491u32;
    let mut block: Vec<u8> = (0..4096)
        .map(|_| {
            state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
            (state >> 24) as u8
        })
        .collect();

    let mut data = Vec::with_capacity(len);
    let mut k = 0usize;
    while data.len() < len {
        let pos = (k * 131) % block.len();
        block[pos] = block[pos].wrapping_add(k as u8 | 1);
        data.extend_from_slice(&block);
        k += 1;
    }
    data.truncate(len);
    data
}

#[test]
fn test_large_stream_compresses_below_three_percent() {
    let data = repetitive_stream(4_000_000);
    let raw = RawPayload::new(data.clone(), 1);
    let engine = CodecEngine::new(4);

    let payload = engine
        .encode("Bitstream", &raw, &CompressionSpec::Auto(SearchLimits::default()))
        .unwrap();
    assert!(matches!(payload.params, SchemeParams::Lzss(_)));
    assert!(
        payload.bytes.len() * 100 <= data.len() * 3,
        "{} bytes is more than 3% of {}",
        payload.bytes.len(),
        data.len()
    );
    assert_eq!(engine.decode(&payload).unwrap(), data);
}
