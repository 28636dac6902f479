//! Verify XML config is parsed without touching user state.

use std::fs;
use std::path::PathBuf;
use tempfile::tempdir;

use preserve_paths::{LogLevel, load_config_from_xml_path};

#[test]
fn reads_config_xml_and_applies_values() {
    let td = tempdir().expect("create tempdir");

    let cfg_path = td.path().join("config.xml");
    let cache_dir = td.path().join("cache");
    let log_file = td.path().join("preserve_paths.log");

    let xml = format!(
        r#"
<config>
  <cache_dir>{}</cache_dir>
  <log_level>info</log_level>
  <log_file>{}</log_file>
  <preserve_paths>
    <path>web/sites/default/settings.php</path>
    <path>/srv/app/files</path>
  </preserve_paths>
</config>
"#,
        cache_dir.display(),
        log_file.display()
    );
    fs::write(&cfg_path, xml).expect("write config.xml");

    let cfg = load_config_from_xml_path(&cfg_path).expect("load_config_from_xml_path");

    assert_eq!(cfg.cache_dir, cache_dir, "cache_dir mismatch");
    assert_eq!(cfg.log_file.as_deref(), Some(log_file.as_path()), "log_file mismatch");
    assert_eq!(cfg.log_level, LogLevel::Info, "log_level mismatch");
    assert_eq!(
        cfg.preserve_paths,
        vec![
            PathBuf::from("web/sites/default/settings.php"),
            PathBuf::from("/srv/app/files")
        ]
    );
    assert!(!cfg.dry_run);
}

#[test]
fn trims_whitespace_and_skips_empty_values() {
    let td = tempdir().unwrap();
    let cfg_path = td.path().join("config.xml");
    let cache = td.path().join("cache");

    let xml = format!(
        r#"<config>
  <cache_dir>
     {cache}
  </cache_dir>
  <log_level>  DEBUG  </log_level>
  <log_file>   </log_file>
  <preserve_paths>
    <path>  keep/me  </path>
    <path></path>
    <path>keep/me</path>
  </preserve_paths>
</config>"#,
        cache = cache.display()
    );
    fs::write(&cfg_path, xml).unwrap();

    let cfg = load_config_from_xml_path(&cfg_path).unwrap();
    assert_eq!(cfg.cache_dir, cache);
    assert_eq!(cfg.log_level, LogLevel::Debug);
    assert_eq!(cfg.log_file, None);
    assert_eq!(cfg.preserve_paths, vec![PathBuf::from("keep/me")]);
}

#[test]
fn missing_elements_fall_back_to_defaults() {
    let td = tempdir().unwrap();
    let cfg_path = td.path().join("config.xml");
    fs::write(&cfg_path, "<config></config>").unwrap();

    let cfg = load_config_from_xml_path(&cfg_path).unwrap();
    assert_eq!(cfg.cache_dir, preserve_paths::default_cache_dir());
    assert_eq!(cfg.log_level, LogLevel::Normal);
    assert!(cfg.preserve_paths.is_empty());
}

#[test]
fn malformed_xml_is_an_error() {
    let td = tempdir().unwrap();
    let cfg_path = td.path().join("config.xml");
    fs::write(&cfg_path, "<config><cache_dir>/x</config>").unwrap();
    let err = load_config_from_xml_path(&cfg_path).unwrap_err();
    assert!(format!("{err:#}").contains("config.xml"));
}
