use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, ensure};
use config::{Config, ConfigError, File, FileFormat};
use serde::Deserialize;
use tracing::{info, warn};

use crate::zone::Zone;

const DEFAULT_CONFIG_PATH: &str = "config/hme.toml";

/// Longest accepted pause between batches, in hours.
pub const MAX_DELAY_HOURS: f64 = 24.0 * 7.0;
/// Longest accepted pause after an alias or before a retry, in seconds.
pub const MAX_PAUSE_SECS: f64 = 86_400.0;

/// Written on first start when no configuration file exists yet.
pub const DEFAULT_CONFIG: &str = r#"# hme-generator configuration

# Aliases per batch.
max_concurrent_tasks = 5
# Pause between batches, in hours.
delay_hours = 1.0
# Pause after every alias, in seconds.
time_between_accounts = 5.0
max_retries = 3
# Pause before a retry, in seconds.
retry_delay = 2.0
request_timeout_ms = 10000

cookie_file = "cookie.txt"
generated_emails_file = "generated_emails.txt"
backup_dir = "backups"
export_dir = "."

# Zone for timestamps: an IANA name such as "Europe/Moscow", or an offset like "+03:00".
timezone = "Europe/Moscow"
label = "hme-generator"

base_url_v1 = "https://p68-maildomainws.icloud.com/v1/hme"
base_url_v2 = "https://p68-maildomainws.icloud.com/v2/hme"
"#;

#[derive(Debug, Clone, Deserialize)]
pub struct GeneratorConfig {
    pub max_concurrent_tasks: usize,
    pub delay_hours: f64,
    pub time_between_accounts: f64,
    pub max_retries: u32,
    pub retry_delay: f64,
    #[serde(default = "GeneratorConfig::default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default)]
    pub stall_limit: Option<u32>,
    pub cookie_file: PathBuf,
    pub generated_emails_file: PathBuf,
    pub backup_dir: PathBuf,
    #[serde(default = "GeneratorConfig::default_export_dir")]
    pub export_dir: PathBuf,
    pub timezone: String,
    pub label: String,
    pub base_url_v1: String,
    pub base_url_v2: String,
}

impl GeneratorConfig {
    pub fn load() -> Result<Self> {
        let configured_path =
            std::env::var("HME_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        ensure!(
            !configured_path.is_empty(),
            "Configuration path must be non-empty"
        );
        let env_override = std::env::var("HME_ENV").ok().filter(|env| !env.is_empty());
        Self::load_from(Path::new(&configured_path), env_override.as_deref())
    }

    pub fn load_from(path: &Path, env_override: Option<&str>) -> Result<Self> {
        if !path.exists() {
            materialize_default(path)?;
        }

        let mut builder =
            Config::builder().add_source(File::from(path).format(FileFormat::Toml).required(true));

        if let Some(env) = env_override {
            let overlay = overlay_path(path, env);
            if overlay.exists() {
                builder = builder.add_source(File::from(overlay).format(FileFormat::Toml));
            }
        }

        let settings = builder
            .build()
            .map_err(|err| map_config_error(err, path))?;
        let config: Self = settings
            .try_deserialize()
            .context("Failed to deserialize generator configuration")?;

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        ensure!(
            self.max_concurrent_tasks > 0,
            "max_concurrent_tasks must be positive"
        );
        self.inter_item_delay()?;
        self.inter_batch_delay()?;
        self.retry_delay()?;
        ensure!(
            (100..=60_000).contains(&self.request_timeout_ms),
            "request_timeout_ms must be between 100 and 60000"
        );
        ensure!(
            self.stall_limit != Some(0),
            "stall_limit must be positive when set"
        );
        ensure!(
            !self.base_url_v1.is_empty() && !self.base_url_v2.is_empty(),
            "Vendor base URLs must be specified"
        );
        self.zone()?;
        Ok(())
    }

    pub fn inter_item_delay(&self) -> Result<Duration> {
        seconds_to_duration("time_between_accounts", self.time_between_accounts)
    }

    pub fn inter_batch_delay(&self) -> Result<Duration> {
        hours_to_duration(self.delay_hours).context("Invalid delay_hours")
    }

    pub fn retry_delay(&self) -> Result<Duration> {
        seconds_to_duration("retry_delay", self.retry_delay)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn zone(&self) -> Result<Zone> {
        Zone::parse(&self.timezone)
    }

    /// First non-comment line of the cookie file. A missing or empty file is not
    /// fatal: every vendor call will then be rejected as unauthorized.
    pub fn read_cookie(&self) -> Result<Option<String>> {
        if !self.cookie_file.exists() {
            warn!(
                "Cookie file {} not found; requests will not be authorized",
                self.cookie_file.display()
            );
            return Ok(None);
        }
        let contents = std::fs::read_to_string(&self.cookie_file)
            .with_context(|| format!("Failed to read {}", self.cookie_file.display()))?;
        let cookie = first_cookie_line(&contents);
        if cookie.is_none() {
            warn!(
                "Cookie file {} holds no cookie; requests will not be authorized",
                self.cookie_file.display()
            );
        }
        Ok(cookie)
    }

    const fn default_request_timeout_ms() -> u64 {
        10_000
    }

    fn default_export_dir() -> PathBuf {
        PathBuf::from(".")
    }
}

/// Pause between batches. Rejects negative, NaN and values above [`MAX_DELAY_HOURS`].
pub fn hours_to_duration(hours: f64) -> Result<Duration> {
    ensure!(
        (0.0..=MAX_DELAY_HOURS).contains(&hours),
        "delay must be between 0 and {MAX_DELAY_HOURS} hours, got {hours}"
    );
    Duration::try_from_secs_f64(hours * 3_600.0)
        .with_context(|| format!("delay of {hours} hours is not representable"))
}

fn seconds_to_duration(name: &str, seconds: f64) -> Result<Duration> {
    ensure!(
        (0.0..=MAX_PAUSE_SECS).contains(&seconds),
        "{name} must be between 0 and {MAX_PAUSE_SECS} seconds, got {seconds}"
    );
    Duration::try_from_secs_f64(seconds)
        .with_context(|| format!("{name} of {seconds} seconds is not representable"))
}

fn first_cookie_line(contents: &str) -> Option<String> {
    contents
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty() && !line.starts_with("//"))
        .map(str::to_string)
}

fn materialize_default(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    std::fs::write(path, DEFAULT_CONFIG)
        .with_context(|| format!("Failed to write default configuration {}", path.display()))?;
    info!("Wrote default configuration to {}", path.display());
    Ok(())
}

fn overlay_path(path: &Path, env: &str) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "hme".to_string());
    path.with_file_name(format!("{stem}.{env}.toml"))
}

fn map_config_error(err: ConfigError, path: &Path) -> ConfigError {
    match err {
        ConfigError::NotFound(_) => ConfigError::NotFound(path.display().to_string()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_is_materialized_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config").join("hme.toml");
        let config = GeneratorConfig::load_from(&path, None).unwrap();

        assert!(path.exists());
        assert_eq!(config.max_concurrent_tasks, 5);
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.inter_batch_delay().unwrap(), Duration::from_secs(3_600));
        assert_eq!(config.inter_item_delay().unwrap(), Duration::from_secs(5));
        assert_eq!(config.retry_delay().unwrap(), Duration::from_secs(2));
        assert_eq!(config.request_timeout(), Duration::from_secs(10));
        assert_eq!(
            config.zone().unwrap(),
            Zone::Named(chrono_tz::Europe::Moscow)
        );
        assert_eq!(config.stall_limit, None);
    }

    #[test]
    fn environment_overlay_overrides_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hme.toml");
        std::fs::write(&path, DEFAULT_CONFIG).unwrap();
        std::fs::write(
            dir.path().join("hme.fast.toml"),
            "delay_hours = 0.5\nmax_retries = 0\nstall_limit = 4\n",
        )
        .unwrap();

        let config = GeneratorConfig::load_from(&path, Some("fast")).unwrap();
        assert_eq!(config.inter_batch_delay().unwrap(), Duration::from_secs(1_800));
        assert_eq!(config.max_retries, 0);
        assert_eq!(config.stall_limit, Some(4));
    }

    #[test]
    fn negative_delay_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hme.toml");
        let broken = DEFAULT_CONFIG.replace("retry_delay = 2.0", "retry_delay = -1.0");
        std::fs::write(&path, broken).unwrap();
        assert!(GeneratorConfig::load_from(&path, None).is_err());
    }

    #[test]
    fn oversized_delays_are_rejected_without_panicking() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hme.toml");
        for (from, to) in [
            ("time_between_accounts = 5.0", "time_between_accounts = 1e30"),
            ("retry_delay = 2.0", "retry_delay = 86401.0"),
            ("delay_hours = 1.0", "delay_hours = 1e16"),
        ] {
            std::fs::write(&path, DEFAULT_CONFIG.replace(from, to)).unwrap();
            let err = GeneratorConfig::load_from(&path, None).unwrap_err();
            assert!(format!("{err:#}").contains("must be between"), "{to}: {err:#}");
        }

        assert!(hours_to_duration(f64::NAN).is_err());
        assert!(hours_to_duration(f64::INFINITY).is_err());
        assert_eq!(
            hours_to_duration(MAX_DELAY_HOURS).unwrap(),
            Duration::from_secs(7 * 24 * 3_600)
        );
    }

    #[test]
    fn timezone_accepts_names_and_offsets() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hme.toml");
        let fixed = DEFAULT_CONFIG.replace(
            "timezone = \"Europe/Moscow\"",
            "timezone = \"+03:00\"",
        );
        std::fs::write(&path, fixed).unwrap();
        let config = GeneratorConfig::load_from(&path, None).unwrap();
        assert!(matches!(config.zone().unwrap(), Zone::Fixed(_)));

        let unknown = DEFAULT_CONFIG.replace(
            "timezone = \"Europe/Moscow\"",
            "timezone = \"Atlantis/Lost\"",
        );
        std::fs::write(&path, unknown).unwrap();
        assert!(GeneratorConfig::load_from(&path, None).is_err());
    }

    #[test]
    fn cookie_skips_comment_lines() {
        let contents = "// exported from the browser\n\nX-APPLE-WEBAUTH-TOKEN=abc; other=1\n";
        assert_eq!(
            first_cookie_line(contents).as_deref(),
            Some("X-APPLE-WEBAUTH-TOKEN=abc; other=1")
        );
        assert_eq!(first_cookie_line("// only a comment\n"), None);
    }
}
