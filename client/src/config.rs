use std::{fs, path::PathBuf, time::Duration};

use anyhow::{Context, Result};
use clap::Args;
use directories::ProjectDirs;
use serde::Deserialize;
use url::Url;

/// Global options shared by every subcommand.
#[derive(Args, Debug, Default, Clone)]
pub struct ConfigArgs {
    /// Path to configuration file.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
    /// Override the REST API base URL.
    #[arg(long, global = true)]
    pub api_url: Option<String>,
    /// Override the real-time socket URL.
    #[arg(long, global = true)]
    pub socket_url: Option<String>,
    /// Enable or disable logging (true/false).
    #[arg(long, global = true)]
    pub logging: Option<bool>,
}

/// Runtime configuration resolved from file, env and CLI.
#[derive(Clone, Debug)]
pub struct Config {
    /// Base URL of the REST API, e.g. `https://host/api`.
    pub api_base_url: Url,
    /// Real-time endpoint; the user id is appended as a query parameter.
    pub socket_url: Url,
    pub geocode_url: Url,
    pub routing_url: Url,
    /// Image hosting endpoint receiving multipart uploads.
    pub upload_url: Url,
    pub upload_preset: String,
    /// Where persisted client state lives.
    pub data_dir: PathBuf,
    /// Quiet period before a search input hits the network.
    pub search_debounce: Duration,
    pub request_timeout: Duration,
    pub logging_enabled: bool,
}

#[derive(Deserialize, Default)]
struct FileConfig {
    #[serde(default)]
    api: FileApi,
    #[serde(default)]
    maps: FileMaps,
    #[serde(default)]
    upload: FileUpload,
    #[serde(default)]
    search: FileSearch,
    #[serde(default)]
    logging: FileLogging,
}

#[derive(Deserialize, Default)]
struct FileApi {
    base_url: Option<String>,
    socket_url: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Deserialize, Default)]
struct FileMaps {
    geocode_url: Option<String>,
    routing_url: Option<String>,
}

#[derive(Deserialize, Default)]
struct FileUpload {
    url: Option<String>,
    preset: Option<String>,
}

#[derive(Deserialize, Default)]
struct FileSearch {
    debounce_ms: Option<u64>,
}

#[derive(Deserialize)]
struct FileLogging {
    #[serde(default = "default_logging")]
    enabled: bool,
}

impl Default for FileLogging {
    fn default() -> Self {
        Self {
            enabled: default_logging(),
        }
    }
}

const DEFAULT_API_URL: &str = "http://localhost:5000/api";
const DEFAULT_SOCKET_URL: &str = "ws://localhost:5000/socket";
const DEFAULT_GEOCODE_URL: &str = "https://nominatim.openstreetmap.org";
const DEFAULT_ROUTING_URL: &str = "https://router.project-osrm.org";
const DEFAULT_UPLOAD_URL: &str = "https://api.cloudinary.com/v1_1/campusrides/image/upload";
const DEFAULT_UPLOAD_PRESET: &str = "campus_rides";
const DEFAULT_DEBOUNCE_MS: u64 = 400;
const DEFAULT_TIMEOUT_SECS: u64 = 20;

fn default_logging() -> bool {
    true
}

fn parse_url(raw: &str, what: &str) -> Result<Url> {
    Url::parse(raw).with_context(|| format!("invalid {what}: {raw}"))
}

impl Config {
    /// Built-in defaults rooted at `data_dir`.
    pub fn builtin(data_dir: PathBuf) -> Result<Self> {
        Ok(Self {
            api_base_url: parse_url(DEFAULT_API_URL, "api url")?,
            socket_url: parse_url(DEFAULT_SOCKET_URL, "socket url")?,
            geocode_url: parse_url(DEFAULT_GEOCODE_URL, "geocode url")?,
            routing_url: parse_url(DEFAULT_ROUTING_URL, "routing url")?,
            upload_url: parse_url(DEFAULT_UPLOAD_URL, "upload url")?,
            upload_preset: DEFAULT_UPLOAD_PRESET.into(),
            data_dir,
            search_debounce: Duration::from_millis(DEFAULT_DEBOUNCE_MS),
            request_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            logging_enabled: default_logging(),
        })
    }

    /// Resolve configuration from CLI, environment variables, config file and defaults.
    pub fn load(args: &ConfigArgs) -> Result<Self> {
        let mut api_url = DEFAULT_API_URL.to_string();
        let mut socket_url = DEFAULT_SOCKET_URL.to_string();
        let mut geocode_url = DEFAULT_GEOCODE_URL.to_string();
        let mut routing_url = DEFAULT_ROUTING_URL.to_string();
        let mut upload_url = DEFAULT_UPLOAD_URL.to_string();
        let mut upload_preset = DEFAULT_UPLOAD_PRESET.to_string();
        let mut debounce_ms = DEFAULT_DEBOUNCE_MS;
        let mut timeout_secs = DEFAULT_TIMEOUT_SECS;
        let mut logging = default_logging();

        // config file path precedence: CLI -> ENV -> default
        let config_path = args
            .config
            .clone()
            .or_else(|| std::env::var("CAMPUS_RIDES_CONFIG").ok().map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from("config/campus_rides.toml"));

        if let Ok(bytes) = fs::read(&config_path) {
            let contents = String::from_utf8_lossy(&bytes);
            let file_cfg: FileConfig = toml::from_str(&contents).context("invalid config file")?;
            if let Some(v) = file_cfg.api.base_url {
                api_url = v;
            }
            if let Some(v) = file_cfg.api.socket_url {
                socket_url = v;
            }
            if let Some(v) = file_cfg.api.timeout_secs {
                timeout_secs = v;
            }
            if let Some(v) = file_cfg.maps.geocode_url {
                geocode_url = v;
            }
            if let Some(v) = file_cfg.maps.routing_url {
                routing_url = v;
            }
            if let Some(v) = file_cfg.upload.url {
                upload_url = v;
            }
            if let Some(v) = file_cfg.upload.preset {
                upload_preset = v;
            }
            if let Some(v) = file_cfg.search.debounce_ms {
                debounce_ms = v;
            }
            logging = file_cfg.logging.enabled;
        }

        // environment overrides
        if let Ok(v) = std::env::var("CAMPUS_RIDES_API_URL") {
            api_url = v;
        }
        if let Ok(v) = std::env::var("CAMPUS_RIDES_SOCKET_URL") {
            socket_url = v;
        }
        if let Ok(l) = std::env::var("CAMPUS_RIDES_LOGGING") {
            if let Ok(l) = l.parse::<bool>() {
                logging = l;
            }
        }

        // CLI overrides
        if let Some(v) = &args.api_url {
            api_url = v.clone();
        }
        if let Some(v) = &args.socket_url {
            socket_url = v.clone();
        }
        if let Some(l) = args.logging {
            logging = l;
        }

        let socket_url = parse_url(&socket_url, "socket url")?;
        if !matches!(socket_url.scheme(), "ws" | "wss") {
            anyhow::bail!("invalid socket url scheme: {}", socket_url.scheme());
        }

        let data_dir = std::env::var("DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| default_data_dir());

        Ok(Self {
            api_base_url: parse_url(&api_url, "api url")?,
            socket_url,
            geocode_url: parse_url(&geocode_url, "geocode url")?,
            routing_url: parse_url(&routing_url, "routing url")?,
            upload_url: parse_url(&upload_url, "upload url")?,
            upload_preset,
            data_dir,
            search_debounce: Duration::from_millis(debounce_ms),
            request_timeout: Duration::from_secs(timeout_secs),
            logging_enabled: logging,
        })
    }
}

/// Determine the default data directory for persisted client state.
pub fn default_data_dir() -> PathBuf {
    match ProjectDirs::from("app", "campusrides", "campus_rides") {
        Some(proj) => proj.data_dir().to_path_buf(),
        None => PathBuf::from("./campus_rides_data"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::fs;

    fn clear_env() {
        std::env::remove_var("CAMPUS_RIDES_API_URL");
        std::env::remove_var("CAMPUS_RIDES_SOCKET_URL");
        std::env::remove_var("CAMPUS_RIDES_LOGGING");
    }

    #[test]
    #[serial]
    fn valid_config_parses() {
        clear_env();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cfg.toml");
        fs::write(
            &path,
            "[api]\nbase_url=\"https://rides.example.edu/api\"\n[search]\ndebounce_ms=250\n[logging]\nenabled=false\n",
        )
        .unwrap();
        let args = ConfigArgs {
            config: Some(path),
            ..Default::default()
        };
        let cfg = Config::load(&args).unwrap();
        assert_eq!(cfg.api_base_url.as_str(), "https://rides.example.edu/api");
        assert_eq!(cfg.search_debounce, Duration::from_millis(250));
        assert!(!cfg.logging_enabled);
    }

    #[test]
    #[serial]
    fn missing_keys_defaults() {
        clear_env();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cfg.toml");
        fs::write(&path, "").unwrap();
        let args = ConfigArgs {
            config: Some(path),
            ..Default::default()
        };
        let cfg = Config::load(&args).unwrap();
        assert_eq!(cfg.api_base_url.as_str(), DEFAULT_API_URL);
        assert_eq!(cfg.upload_preset, DEFAULT_UPLOAD_PRESET);
        assert!(cfg.logging_enabled);
    }

    #[test]
    #[serial]
    fn invalid_url_fails() {
        clear_env();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cfg.toml");
        fs::write(&path, "[api]\nbase_url=\"not a url\"\n").unwrap();
        let args = ConfigArgs {
            config: Some(path),
            ..Default::default()
        };
        assert!(Config::load(&args).is_err());
    }

    #[test]
    #[serial]
    fn socket_must_be_websocket() {
        clear_env();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cfg.toml");
        fs::write(&path, "[api]\nsocket_url=\"https://example.edu\"\n").unwrap();
        let args = ConfigArgs {
            config: Some(path),
            ..Default::default()
        };
        assert!(Config::load(&args).is_err());
    }

    #[test]
    #[serial]
    fn precedence_cli_env_file() {
        clear_env();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cfg.toml");
        fs::write(&path, "[api]\nbase_url=\"http://file.example/api\"\n").unwrap();
        std::env::set_var("CAMPUS_RIDES_API_URL", "http://env.example/api");
        let args = ConfigArgs {
            config: Some(path.clone()),
            ..Default::default()
        };
        let cfg = Config::load(&args).unwrap();
        assert_eq!(cfg.api_base_url.as_str(), "http://env.example/api");

        let args = ConfigArgs {
            config: Some(path),
            api_url: Some("http://cli.example/api".into()),
            ..Default::default()
        };
        let cfg = Config::load(&args).unwrap();
        assert_eq!(cfg.api_base_url.as_str(), "http://cli.example/api");
        std::env::remove_var("CAMPUS_RIDES_API_URL");
    }

    #[test]
    #[serial]
    fn logging_toggle() {
        clear_env();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cfg.toml");
        fs::write(&path, "[logging]\nenabled=false\n").unwrap();
        let args = ConfigArgs {
            config: Some(path),
            logging: Some(true),
            ..Default::default()
        };
        let cfg = Config::load(&args).unwrap();
        assert!(cfg.logging_enabled);
    }
}
