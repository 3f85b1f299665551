use std::path::Path;

use assert_matches::assert_matches;
use tranche_dock::domain::{
    ScoringFunction, SearchMode, Tranche, UNKNOWN_TRANCHE, ligand_key, ligand_stem,
};
use tranche_dock::error::PipelineError;

#[test]
fn tranche_from_file_names() {
    assert_eq!(Tranche::from_file_name("ACAAML.xaa.pdbqt").as_str(), "ACAAML.xaa");
    assert_eq!(Tranche::from_file_name("ACAAML.xaa.pdbqt.gz").as_str(), "ACAAML.xaa");
    assert_eq!(Tranche::from_file_name("ligands.pdbqt").as_str(), UNKNOWN_TRANCHE);
    assert_eq!(Tranche::from_file_name("notes.txt").as_str(), UNKNOWN_TRANCHE);
}

#[test]
fn parse_engine_options() {
    assert_eq!("Vinardo".parse::<ScoringFunction>().unwrap(), ScoringFunction::Vinardo);
    assert_eq!("ad4".parse::<ScoringFunction>().unwrap(), ScoringFunction::Ad4);
    assert_eq!(" fast ".parse::<SearchMode>().unwrap(), SearchMode::Fast);
    assert_matches!(
        "exhaustive".parse::<SearchMode>(),
        Err(PipelineError::InvalidSearchMode(_))
    );
    assert_matches!(
        "dock6".parse::<ScoringFunction>(),
        Err(PipelineError::InvalidScoring(_))
    );
    assert_eq!(SearchMode::Balance.to_string(), "balance");
}

#[test]
fn ligand_identity_is_absolute() {
    let key = ligand_key(Path::new("split/X.xaa/ZINC001.pdbqt"));
    assert!(Path::new(&key).is_absolute());
    assert!(key.ends_with("ZINC001.pdbqt"));
    assert_eq!(ligand_key(Path::new(&key)), key);
    assert_eq!(ligand_stem(Path::new("split/X.xaa/ZINC001.pdbqt")), "ZINC001");
}
