//! Configuration Loading Tests

#[cfg(test)]
mod tests {
    use kanshi_uploadr::config::{Config, ConfigError, StrategyKind, RELAY_HARD_LIMIT_BYTES};
    use kanshi_uploadr::models::ContentKind;
    use serial_test::serial;
    use std::io::Write;
    use std::time::Duration;
    use tempfile::NamedTempFile;

    fn write_config(yaml: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(yaml.as_bytes()).unwrap();
        file
    }

    #[test]
    #[serial]
    fn test_load_full_config_from_file() {
        std::env::set_var("KANSHI_IT_TOKEN", "secret-token");
        let file = write_config(
            r#"
backend:
  base_url: https://platform.example.test/api
  token: ${KANSHI_IT_TOKEN}
  timeout_seconds: 30
upload:
  strategy: relay
  relay_file_field: video
  poll_interval_millis: 1500
storage:
  upload_base_url: ${KANSHI_IT_STORAGE:-https://storage.example.test/v1_1}
logging:
  level: debug
  json: true
"#,
        );

        let config = Config::load(file.path()).unwrap();
        std::env::remove_var("KANSHI_IT_TOKEN");

        assert_eq!(config.backend.base_url, "https://platform.example.test/api");
        assert_eq!(config.backend.token.as_deref(), Some("secret-token"));
        assert_eq!(config.backend.timeout(), Duration::from_secs(30));
        assert_eq!(config.upload.strategy, StrategyKind::Relay);
        assert_eq!(config.upload.relay_file_field, "video");
        assert_eq!(config.upload.poll_interval(), Duration::from_millis(1500));
        assert_eq!(
            config.storage.upload_base_url,
            "https://storage.example.test/v1_1"
        );
        assert!(config.logging.json);
    }

    #[test]
    fn test_ceilings_per_strategy() {
        let config = Config::default();
        let upload = &config.upload;
        assert_eq!(
            upload.ceiling(StrategyKind::Relay, ContentKind::Video),
            RELAY_HARD_LIMIT_BYTES
        );
        assert_eq!(
            upload.ceiling(StrategyKind::Relay, ContentKind::Photo),
            RELAY_HARD_LIMIT_BYTES
        );
        assert_eq!(
            upload.ceiling(StrategyKind::Direct, ContentKind::Video),
            500 * 1024 * 1024
        );
        assert_eq!(
            upload.ceiling(StrategyKind::Direct, ContentKind::Photo),
            50 * 1024 * 1024
        );
    }

    #[test]
    fn test_relay_ceiling_above_hard_limit_rejected() {
        let file = write_config("upload:\n  relay_max_bytes: 10485760\n");
        assert!(matches!(
            Config::load(file.path()),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn test_bad_base_url_rejected() {
        let file = write_config("backend:\n  base_url: ftp://nope\n");
        assert!(matches!(
            Config::load(file.path()),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        assert!(matches!(
            Config::load("/nonexistent/kanshi.yaml"),
            Err(ConfigError::IoError(_))
        ));
    }

    #[test]
    fn test_no_file_means_defaults() {
        let config = Config::load_or_default(None).unwrap();
        assert_eq!(config.upload.strategy, StrategyKind::Direct);
        assert!(config.backend.token.is_none());
    }
}
