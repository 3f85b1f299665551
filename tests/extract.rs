use std::fs;
use std::io::Write;

use assert_matches::assert_matches;
use flate2::Compression;
use flate2::write::GzEncoder;
use tranche_dock::error::PipelineError;
use tranche_dock::extract::extract_directory;

fn gzip(content: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(content).unwrap();
    encoder.finish().unwrap()
}

#[test]
fn extracts_and_skips_on_rerun() {
    let temp = tempfile::tempdir().unwrap();
    let raw = temp.path().join("raw");
    let out = temp.path().join("pdbqt");
    fs::create_dir_all(&raw).unwrap();
    fs::write(raw.join("A.xaa.pdbqt.gz"), gzip(b"MODEL 1\nATOM\nENDMDL\n")).unwrap();
    fs::write(raw.join("A.xab.pdbqt.gz"), gzip(b"MODEL 1\nATOM\nENDMDL\n")).unwrap();
    fs::write(raw.join("broken.xac.pdbqt.gz"), b"plain text").unwrap();
    fs::write(raw.join("readme.txt"), b"ignored").unwrap();

    let first = extract_directory(&raw, &out, 2).unwrap();
    assert_eq!(first.extracted, 2);
    assert_eq!(first.failed, 1);
    assert_eq!(
        fs::read_to_string(out.join("A.xaa.pdbqt")).unwrap(),
        "MODEL 1\nATOM\nENDMDL\n"
    );
    assert!(!out.join("broken.xac.pdbqt").exists());

    let second = extract_directory(&raw, &out, 2).unwrap();
    assert_eq!(second.extracted, 0);
    assert_eq!(second.skipped, 2);
    assert_eq!(second.outputs, [out.join("A.xaa.pdbqt"), out.join("A.xab.pdbqt")]);
}

#[test]
fn missing_raw_directory() {
    let temp = tempfile::tempdir().unwrap();
    assert_matches!(
        extract_directory(&temp.path().join("raw"), &temp.path().join("out"), 1),
        Err(PipelineError::MissingInput(_))
    );
}
