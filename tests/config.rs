use std::fs;

use assert_matches::assert_matches;
use tranche_dock::config::{Config, ConfigLoader};
use tranche_dock::domain::{ScoringFunction, SearchMode};
use tranche_dock::error::PipelineError;

#[test]
fn parse_config_sections() {
    let config: Config = serde_json::from_str(
        r#"{
            "paths": { "receptor": "target/rec.pdbqt", "output_dir": "out" },
            "fetch": { "workers": 2, "max_retries": 1 },
            "monitor": { "max_failure_rate": 0.5, "debug": true },
            "docking": {
                "center": [1.0, 2.0, 3.0],
                "scoring": "vina",
                "search_mode": "detail",
                "num_modes": 9,
                "batch_size": 50
            }
        }"#,
    )
    .unwrap();

    let resolved = ConfigLoader::resolve_config(config).unwrap();
    assert_eq!(resolved.paths.receptor.as_str(), "target/rec.pdbqt");
    assert_eq!(resolved.paths.output_dir.as_str(), "out");
    assert_eq!(resolved.paths.split_dir.as_str(), "data/ligands_pdbqt_split");
    assert_eq!(resolved.fetch.workers, 2);
    assert_eq!(resolved.fetch.max_retries, 1);
    assert_eq!(resolved.monitor.max_failure_rate, 0.5);
    assert!(resolved.monitor.debug);
    assert_eq!(resolved.monitor.min_sample_size, 50);
    assert_eq!(resolved.docking.search_box.center, [1.0, 2.0, 3.0]);
    assert_eq!(resolved.docking.search_box.size, [30.0, 30.0, 30.0]);
    assert_eq!(resolved.docking.scoring, ScoringFunction::Vina);
    assert_eq!(resolved.docking.search_mode, SearchMode::Detail);
    assert_eq!(resolved.docking.num_modes, 9);
    assert_eq!(resolved.docking.receptor.to_str(), Some("target/rec.pdbqt"));
    assert_eq!(resolved.engine.batch_size, 50);
    assert_eq!(resolved.engine.executable, "unidock");
}

#[test]
fn rejects_out_of_range_values() {
    let config: Config = serde_json::from_str(r#"{"monitor": {"max_failure_rate": 1.5}}"#).unwrap();
    assert_matches!(
        ConfigLoader::resolve_config(config),
        Err(PipelineError::ConfigValue(_))
    );

    let config: Config = serde_json::from_str(r#"{"fetch": {"workers": 0}}"#).unwrap();
    assert_matches!(
        ConfigLoader::resolve_config(config),
        Err(PipelineError::ConfigValue(_))
    );

    let config: Config = serde_json::from_str(r#"{"docking": {"size": [20.0, 0.0, 20.0]}}"#).unwrap();
    assert_matches!(
        ConfigLoader::resolve_config(config),
        Err(PipelineError::ConfigValue(_))
    );
}

#[test]
fn unknown_scoring_is_a_parse_error() {
    let parsed = serde_json::from_str::<Config>(r#"{"docking": {"scoring": "gnina"}}"#);
    assert!(parsed.is_err());
}

#[test]
fn explicit_config_must_exist() {
    let temp = tempfile::tempdir().unwrap();
    let missing = temp.path().join("nope.json");
    let err = ConfigLoader::resolve(missing.to_str()).unwrap_err();
    assert_matches!(err, PipelineError::ConfigRead(_));

    let broken = temp.path().join("broken.json");
    fs::write(&broken, "{ not json").unwrap();
    let err = ConfigLoader::resolve(broken.to_str()).unwrap_err();
    assert_matches!(err, PipelineError::ConfigParse(_));
}
