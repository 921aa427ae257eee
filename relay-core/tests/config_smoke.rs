use relay_core::RelayConfig;
use std::fs;

#[test]
fn loads_a_config_file_written_to_disk() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("relay.toml");
    fs::write(
        &path,
        r#"
        listen = "0.0.0.0:1080"
        next = ["hop1:9000"]
        protocol = "variant"
        "#,
    )?;

    let cfg = RelayConfig::load(Some(&path))?;
    assert_eq!(cfg.listen, "0.0.0.0:1080");
    assert_eq!(cfg.next, vec!["hop1:9000".to_string()]);
    assert_eq!(cfg.protocol, "variant");
    assert!(!cfg.is_endpoint());
    Ok(())
}

#[test]
fn rejects_malformed_toml() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("relay.toml");
    fs::write(&path, "this is not = valid [[[ toml").unwrap();
    assert!(RelayConfig::load(Some(&path)).is_err());
}
