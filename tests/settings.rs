//! Translating `MONGO_*` environment variables into start options.

use std::time::Duration;

use camino::Utf8PathBuf;
use mongo_in_memory::{
    CleanupMode, DEFAULT_KEY_BASE, DEFAULT_STARTUP_TIMEOUT, DEFAULT_VERSION, MongoEnvCfg,
};
use rstest::rstest;
use serial_test::serial;
use temp_env::with_vars;

const VARIABLES: [&str; 7] = [
    "MONGO_VERSION",
    "MONGO_PORT",
    "MONGO_REPL_SET",
    "MONGO_DATA_DIR",
    "MONGO_BINARY_CACHE_DIR",
    "MONGO_DOWNLOAD_URL",
    "MONGO_STARTUP_TIMEOUT_SECS",
];

/// Runs `body` with every `MONGO_*` variable cleared except those in `set`.
fn with_mongo_env<R>(set: &[(&str, &str)], body: impl FnOnce() -> R) -> R {
    let vars: Vec<(&str, Option<&str>)> = VARIABLES
        .iter()
        .map(|name| {
            let value = set
                .iter()
                .find(|(key, _)| key == name)
                .map(|(_, value)| *value);
            (*name, value)
        })
        .collect();
    with_vars(vars, body)
}

#[test]
#[serial]
fn empty_environment_yields_defaults() {
    with_mongo_env(&[], || {
        let cfg = MongoEnvCfg::load().expect("load config");
        assert_eq!(cfg.version().expect("version"), DEFAULT_VERSION);

        let options = cfg.to_start_options().expect("options");
        assert_eq!(options.port(), 0);
        assert!(options.replica_set().is_none());
        assert!(options.data_dir().is_none());
        assert!(options.cache_root().is_none());
        assert_eq!(options.startup_timeout(), DEFAULT_STARTUP_TIMEOUT);
        assert_eq!(options.cleanup_mode(), CleanupMode::RemoveData);
    });
}

#[test]
#[serial]
fn every_variable_reaches_the_start_options() {
    with_mongo_env(
        &[
            ("MONGO_VERSION", "6.0.3"),
            ("MONGO_PORT", "27018"),
            ("MONGO_REPL_SET", "rs0"),
            ("MONGO_DATA_DIR", "/tmp/mongo-data"),
            ("MONGO_BINARY_CACHE_DIR", "/tmp/mongo-cache"),
            ("MONGO_DOWNLOAD_URL", "https://mirror.example/mongo"),
            ("MONGO_STARTUP_TIMEOUT_SECS", "12"),
        ],
        || {
            let cfg = MongoEnvCfg::load().expect("load config");
            assert_eq!(cfg.version().expect("version"), "6.0.3");

            let options = cfg.to_start_options().expect("options");
            assert_eq!(options.port(), 27018);
            assert_eq!(options.replica_set(), Some("rs0"));
            assert_eq!(
                options.data_dir(),
                Some(Utf8PathBuf::from("/tmp/mongo-data").as_path())
            );
            assert_eq!(
                options.cache_root(),
                Some(Utf8PathBuf::from("/tmp/mongo-cache").as_path())
            );
            assert_eq!(options.sources().download_base(), "https://mirror.example/mongo");
            assert_eq!(options.sources().key_base(), DEFAULT_KEY_BASE);
            assert_eq!(options.startup_timeout(), Duration::from_secs(12));
        },
    );
}

#[test]
#[serial]
fn zero_startup_timeout_is_rejected() {
    with_mongo_env(&[("MONGO_STARTUP_TIMEOUT_SECS", "0")], || {
        let cfg = MongoEnvCfg::load().expect("load config");
        let err = cfg.to_start_options().expect_err("zero timeout must fail");
        assert!(err.to_string().contains("MONGO_STARTUP_TIMEOUT_SECS"), "{err}");
    });
}

#[rstest]
#[case::replica_set(MongoEnvCfg { repl_set: Some("  ".to_owned()), ..MongoEnvCfg::default() }, "MONGO_REPL_SET")]
#[case::download_url(MongoEnvCfg { download_url: Some(String::new()), ..MongoEnvCfg::default() }, "MONGO_DOWNLOAD_URL")]
fn blank_strings_are_rejected(#[case] cfg: MongoEnvCfg, #[case] variable: &str) {
    let err = cfg.to_start_options().expect_err("blank value must fail");
    assert!(err.to_string().contains(variable), "{err}");
}

#[test]
fn blank_version_is_rejected() {
    let cfg = MongoEnvCfg {
        version: Some(" ".to_owned()),
        ..MongoEnvCfg::default()
    };
    let err = cfg.version().expect_err("blank version must fail");
    assert!(err.to_string().contains("MONGO_VERSION"), "{err}");
}

#[test]
#[serial]
fn unparsable_port_fails_to_load() {
    with_mongo_env(&[("MONGO_PORT", "not-a-port")], || {
        assert!(MongoEnvCfg::load().is_err());
    });
}
