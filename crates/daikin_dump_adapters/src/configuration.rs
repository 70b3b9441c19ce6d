use std::path::{Path, PathBuf};

use config::{Config, Environment, File};
use daikin_dump_core::config::{
    JeedomConf, Settings, DEFAULT_API_BASE_URL, DEFAULT_IDP_BASE_URL, DEFAULT_SCOPE,
};
use daikin_dump_core::schema;
use daikin_dump_core::Error;
use directories::ProjectDirs;

pub fn get_configuration_with_paths(
    current_dir_path: Option<PathBuf>,
    system_config_dir_path: Option<PathBuf>,
) -> Result<Settings, config::ConfigError> {
    let config_directory = current_dir_path.unwrap_or_else(|| {
        std::env::current_dir()
            .map(|p| p.join("config"))
            .unwrap_or_else(|_| PathBuf::from("config"))
    });

    let system_config_dir = if let Some(path) = system_config_dir_path {
        path
    } else {
        ProjectDirs::from("com", "daikin_dump", "daikin_dump")
            .map(|d| d.config_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("config"))
    };

    let settings = Config::builder()
        // Local login server
        .set_default("proxy.own_ip", "127.0.0.1")?
        .set_default("proxy.port", 8888)?
        .set_default("proxy.web_port", 8889)?
        .set_default("proxy.listen_bind", "0.0.0.0")?
        // Cloud access
        .set_default("cloud.client_id", "")?
        .set_default("cloud.client_secret", "")?
        .set_default("cloud.idp_base_url", DEFAULT_IDP_BASE_URL)?
        .set_default("cloud.api_base_url", DEFAULT_API_BASE_URL)?
        .set_default("cloud.scope", DEFAULT_SCOPE)?
        .set_default("cloud.communication_timeout_ms", 10_000)?
        .set_default("cloud.communication_retries", 3)?
        .set_default("data_dir", ".")?
        .set_default("log_level", "info")?
        .add_source(File::from(system_config_dir.join("config.toml")).required(false))
        .add_source(File::from(config_directory.join("config.toml")).required(false))
        .add_source(Environment::with_prefix("DAIKIN_DUMP").separator("__"))
        .build()?;

    settings.try_deserialize::<Settings>()
}

pub fn get_configuration() -> Result<Settings, config::ConfigError> {
    get_configuration_with_paths(None, None)
}

/// Read and validate the publisher's `conf.json`.
pub fn load_jeedom_conf(path: &Path) -> Result<JeedomConf, Error> {
    let conf_error =
        |reason: String| Error::Configuration(format!("error when reading file {}: {}", path.display(), reason));

    let content = std::fs::read_to_string(path).map_err(|e| conf_error(e.to_string()))?;
    let data: serde_json::Value =
        serde_json::from_str(&content).map_err(|e| conf_error(e.to_string()))?;
    schema::validate("root", &data, &JeedomConf::schema()).map_err(conf_error)?;

    serde_json::from_value(data).map_err(|e| conf_error(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use daikin_dump_core::config::CLIENT_ID_ENV_VAR;
    use serial_test::serial;
    use std::io::Write;
    use std::path::Path;
    use tempfile::tempdir;

    fn clear_env() {
        for (key, _) in std::env::vars() {
            if key.starts_with("DAIKIN_DUMP__") {
                std::env::remove_var(&key);
            }
        }
    }

    fn write_config(dir: &Path, content: &str) {
        let mut file = std::fs::File::create(dir.join("config.toml")).unwrap();
        file.write_all(content.as_bytes()).unwrap();
    }

    #[serial]
    #[test]
    fn test_get_configuration_defaults() {
        clear_env();
        let settings = get_configuration_with_paths(
            Some(PathBuf::from("/nonexistent")),
            Some(PathBuf::from("/nonexistent")),
        )
        .unwrap();

        assert_eq!(settings.proxy.own_ip, "127.0.0.1");
        assert_eq!(settings.proxy.port, 8888);
        assert_eq!(settings.proxy.web_port, 8889);
        assert_eq!(settings.proxy.listen_bind, "0.0.0.0");
        assert_eq!(settings.cloud.communication_timeout_ms, 10_000);
        assert_eq!(settings.cloud.communication_retries, 3);
        assert_eq!(settings.cloud.idp_base_url, DEFAULT_IDP_BASE_URL);
        assert_eq!(settings.data_dir, PathBuf::from("."));
        assert_eq!(settings.log_level, "info");
    }

    #[serial]
    #[test]
    fn test_get_configuration_file_override() {
        clear_env();

        let dir = tempdir().unwrap();
        write_config(
            dir.path(),
            r#"
            data_dir = "/var/lib/daikin"
            log_level = "debug"

            [proxy]
            own_ip = "192.168.1.20"

            [cloud]
            client_id = "my-client"
            communication_retries = 5
            "#,
        );

        let settings = get_configuration_with_paths(
            Some(dir.path().to_path_buf()),
            Some(PathBuf::from("/nonexistent")),
        )
        .unwrap();

        assert_eq!(settings.data_dir, PathBuf::from("/var/lib/daikin"));
        assert_eq!(settings.proxy.own_ip, "192.168.1.20");
        assert_eq!(settings.proxy.web_port, 8889);
        assert_eq!(settings.cloud.client_id, "my-client");
        assert_eq!(settings.cloud.communication_retries, 5);
        assert_eq!(settings.log_level, "debug");
    }

    #[serial]
    #[test]
    fn test_get_configuration_env_override() {
        clear_env();

        std::env::set_var("DAIKIN_DUMP__PROXY__WEB_PORT", "9000");
        std::env::set_var("DAIKIN_DUMP__LOG_LEVEL", "trace");

        let settings = get_configuration_with_paths(
            Some(PathBuf::from("/nonexistent")),
            Some(PathBuf::from("/nonexistent")),
        )
        .unwrap();

        assert_eq!(settings.proxy.web_port, 9000);
        assert_eq!(settings.log_level, "trace");

        std::env::remove_var("DAIKIN_DUMP__PROXY__WEB_PORT");
        std::env::remove_var("DAIKIN_DUMP__LOG_LEVEL");
    }

    #[serial]
    #[test]
    fn test_get_configuration_precedence_env_over_file() {
        clear_env();

        let dir = tempdir().unwrap();
        write_config(
            dir.path(),
            r#"
            log_level = "debug"

            [cloud]
            client_id = "from-file"
            "#,
        );

        std::env::set_var(CLIENT_ID_ENV_VAR, "from-env");

        let settings = get_configuration_with_paths(
            Some(dir.path().to_path_buf()),
            Some(PathBuf::from("/nonexistent")),
        )
        .unwrap();

        assert_eq!(settings.cloud.client_id, "from-env");
        assert_eq!(settings.log_level, "debug");

        std::env::remove_var(CLIENT_ID_ENV_VAR);
    }

    #[serial]
    #[test]
    fn test_get_configuration_rejects_malformed_port() {
        clear_env();

        std::env::set_var("DAIKIN_DUMP__PROXY__PORT", "not-a-port");

        let result = get_configuration_with_paths(
            Some(PathBuf::from("/nonexistent")),
            Some(PathBuf::from("/nonexistent")),
        );
        assert!(result.is_err());

        std::env::remove_var("DAIKIN_DUMP__PROXY__PORT");
    }

    const JEEDOM_CONF: &str = r#"{
        "jeedom": { "api_key": "key", "host": "http://jeedom.local" },
        "daikin": { "username": "user@example.com", "password": "secret" },
        "conf": { "data_dir": "data" }
    }"#;

    #[test]
    fn test_load_jeedom_conf() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("conf.json");
        std::fs::write(&path, JEEDOM_CONF).unwrap();

        let conf = load_jeedom_conf(&path).unwrap();

        assert_eq!(conf.jeedom.host, "http://jeedom.local");
        assert_eq!(conf.daikin.username, "user@example.com");
        assert_eq!(conf.conf.data_dir, PathBuf::from("data"));
    }

    #[test]
    fn test_load_jeedom_conf_rejects_invalid_files() {
        let dir = tempdir().unwrap();
        let empty_key = JEEDOM_CONF.replace("\"key\"", "\"\"");
        let cases = [
            ("missing.json", None, "No such file"),
            ("broken.json", Some("{"), "EOF"),
            (
                "no_daikin.json",
                Some(r#"{"jeedom": {"api_key": "k", "host": "h"}, "conf": {"data_dir": "d"}}"#),
                "root: field 'daikin' is required",
            ),
            (
                "empty_key.json",
                Some(empty_key.as_str()),
                "root/jeedom/api_key: string should not be empty",
            ),
        ];

        for (name, content, reason) in cases {
            let path = dir.path().join(name);
            if let Some(content) = content {
                std::fs::write(&path, content).unwrap();
            }

            let message = match load_jeedom_conf(&path) {
                Err(Error::Configuration(message)) => message,
                other => panic!("unexpected result for {}: {:?}", name, other),
            };
            assert!(message.contains(name), "{}", message);
            assert!(message.contains(reason), "{}", message);
        }
    }
}
