// tests/config_load.rs
use aec_news_pipeline::config::{load_sources_from, PipelineConfig, ENV_CONFIG_PATH};
use aec_news_pipeline::model::Category;
use std::{env, fs};

#[test]
fn sources_load_from_toml_and_json() {
    let dir = tempfile::tempdir().unwrap();

    let p_toml = dir.path().join("sources.toml");
    fs::write(
        &p_toml,
        r#"
[[sources]]
source_id = " aecmag "
url = "https://aecmag.com/feed/"
category_hint = "bim_digital_twins"

[[sources]]
source_id = ""
url = "https://dropped.test/feed"
"#,
    )
    .unwrap();
    let v = load_sources_from(&p_toml).unwrap();
    assert_eq!(v.len(), 1);
    assert_eq!(v[0].source_id, "aecmag");
    assert_eq!(v[0].category_hint, Some(Category::BimDigitalTwins));

    let p_json = dir.path().join("sources.json");
    fs::write(
        &p_json,
        r#"[{"source_id":"enr","url":"https://enr.test/rss","credibility_weight":0.9,"min_request_interval_ms":5000}]"#,
    )
    .unwrap();
    let vj = load_sources_from(&p_json).unwrap();
    assert_eq!(vj[0].credibility_weight, Some(0.9));
    assert_eq!(vj[0].min_request_interval_ms, Some(5000));
}

#[test]
fn sources_path_resolves_next_to_config_file() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("feeds.json"),
        r#"[{"source_id":"archdaily","url":"https://archdaily.test/feed"}]"#,
    )
    .unwrap();
    let cfg_path = dir.path().join("pipeline.toml");
    fs::write(
        &cfg_path,
        r#"
sources_path = "feeds.json"
max_attempts = 5

[[sources]]
source_id = "aecmag"
url = "https://aecmag.com/feed/"
"#,
    )
    .unwrap();

    let cfg = PipelineConfig::load_from(&cfg_path).unwrap();
    assert_eq!(cfg.max_attempts, 5);
    let ids: Vec<&str> = cfg.sources.iter().map(|s| s.source_id.as_str()).collect();
    assert_eq!(ids, ["aecmag", "archdaily"]);
    cfg.validate().unwrap();
}

#[test]
fn invalid_values_fail_validation() {
    let cfg = PipelineConfig::from_toml_str("quality_threshold = 1.5").unwrap();
    assert!(cfg.validate().is_err());

    let cfg = PipelineConfig::from_toml_str("min_items_per_newsletter = 20\nmax_items_per_newsletter = 10").unwrap();
    assert!(cfg.validate().is_err());

    let dup = r#"
[[sources]]
source_id = "a"
url = "https://a.test/1"
[[sources]]
source_id = "a"
url = "https://a.test/2"
"#;
    assert!(PipelineConfig::from_toml_str(dup).unwrap().validate().is_err());
}

#[serial_test::serial]
#[test]
fn default_uses_env_then_fallbacks() {
    // Isolate CWD so the repo's own config/ is not picked up.
    let old = env::current_dir().unwrap();
    let tmp = tempfile::tempdir().unwrap();
    env::set_current_dir(tmp.path()).unwrap();
    env::remove_var(ENV_CONFIG_PATH);
    env::remove_var("QUALITY_THRESHOLD");

    // 1) Nothing on disk: defaults
    let cfg = PipelineConfig::load_default().unwrap();
    assert!(cfg.sources.is_empty());
    assert_eq!(cfg.max_attempts, 3);

    // 2) Fallback ./config/pipeline.toml
    let cfg_dir = tmp.path().join("config");
    fs::create_dir_all(&cfg_dir).unwrap();
    fs::write(cfg_dir.join("pipeline.toml"), "max_attempts = 4\n").unwrap();
    assert_eq!(PipelineConfig::load_default().unwrap().max_attempts, 4);

    // 3) Env path wins
    let p_env = tmp.path().join("other.toml");
    fs::write(&p_env, "max_attempts = 7\n").unwrap();
    env::set_var(ENV_CONFIG_PATH, p_env.display().to_string());
    assert_eq!(PipelineConfig::load_default().unwrap().max_attempts, 7);

    // 4) Env override, clamped
    env::set_var("QUALITY_THRESHOLD", "3.0");
    assert_eq!(PipelineConfig::load_default().unwrap().quality_threshold, 1.0);
    env::remove_var("QUALITY_THRESHOLD");

    // 5) Dangling env path is an error
    env::set_var(ENV_CONFIG_PATH, tmp.path().join("missing.toml").display().to_string());
    assert!(PipelineConfig::load_default().is_err());
    env::remove_var(ENV_CONFIG_PATH);

    env::set_current_dir(&old).unwrap();
}
