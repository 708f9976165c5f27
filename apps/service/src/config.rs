use std::collections::{BTreeMap, HashSet};
use std::time::Duration;
use std::{env, fmt, path};

use ini::{Ini, ParseOption, Properties};
use tracing::{debug, warn};

use crate::error::ConfigError;

/// Free-form per-target keys handed to the check and alert strategies.
pub type Options = BTreeMap<String, String>;

/// Section whose keys are inherited by every target section.
const DEFAULT_SECTION: &str = "DEFAULT";

const REQUIRED_KEYS: [&str; 3] = ["check", "host", "alert"];

/// Upper bound for the `timeout` setting and option.
pub const MAX_TIMEOUT_SECS: u64 = 300;

/// Upper bound for the `interval` setting.
pub const MAX_INTERVAL_SECS: u64 = 86400;

/// Values are taken literally: backslashes in Windows paths or expected
/// content must survive.
fn parse_option() -> ParseOption {
    ParseOption { enabled_escape: false, ..Default::default() }
}

/// A configured monitored entity, one per INI section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetDefinition {
    pub name: String,
    pub check_kind: String,
    pub host: String,
    pub alert_kind: String,
    pub options: Options,
}

/// Daemon-wide settings, read from the keys placed before the first section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub interval: Duration,
    pub state_file: path::PathBuf,
    pub timeout: Duration,
    pub recipient: String,
    pub mail_command: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            state_file: path::PathBuf::from(".watcher_state"),
            timeout: Duration::from_secs(5),
            recipient: "root".into(),
            mail_command: "mail".into(),
        }
    }
}

impl fmt::Display for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let write_indented = |f: &mut fmt::Formatter<'_>, label: &str, value: &dyn fmt::Display| {
            writeln!(f, "  {}: {}", label, value)
        };

        writeln!(f, "Current Watcher Settings:")?;
        write_indented(f, "Interval (s)", &self.interval.as_secs())?;
        write_indented(f, "State File", &self.state_file.display())?;
        write_indented(f, "Check Timeout (s)", &self.timeout.as_secs())?;
        write_indented(f, "Mail Recipient", &self.recipient)?;
        write_indented(f, "Mail Command", &self.mail_command)?;

        Ok(())
    }
}

impl Settings {
    fn from_properties(props: &Properties) -> Result<Self, ConfigError> {
        let mut settings = Self::default();

        for (key, value) in props.iter() {
            match key.to_ascii_lowercase().as_str() {
                "interval" => settings.interval = parse_secs(key, value, MAX_INTERVAL_SECS)?,
                "timeout" => settings.timeout = parse_secs(key, value, MAX_TIMEOUT_SECS)?,
                "state_file" => settings.state_file = path::PathBuf::from(value),
                "recipient" => settings.recipient = value.to_string(),
                "mail_command" => settings.mail_command = value.to_string(),
                other => warn!(key = other, "Ignoring unknown setting"),
            }
        }

        Ok(settings)
    }
}

fn parse_secs(key: &str, value: &str, max: u64) -> Result<Duration, ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidSetting {
        key: key.to_string(),
        value: value.to_string(),
        reason,
    };

    match value.parse::<u64>() {
        Ok(0) => Err(invalid("must be at least 1 second".into())),
        Ok(secs) if secs > max => Err(invalid(format!("must be at most {max} seconds"))),
        Ok(secs) => Ok(Duration::from_secs(secs)),
        Err(_) => Err(invalid("expected a whole number of seconds".into())),
    }
}

/// A fully loaded configuration file.
#[derive(Debug, Clone)]
pub struct WatcherConfig {
    pub settings: Settings,
    pub targets: Vec<TargetDefinition>,
}

impl WatcherConfig {
    /// Load and validate the configuration file at `path`.
    ///
    /// ```rust,ignore
    /// let cfg = WatcherConfig::load("config.ini")?;
    /// println!("{}", cfg.settings);
    /// ```
    pub fn load(path: impl AsRef<path::Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let ini = Ini::load_from_file_opt(path, parse_option())
            .map_err(|source| ConfigError::Read { path: path.to_path_buf(), source })?;
        debug!(path = %path.display(), "Loaded configuration file");
        Self::from_ini(&ini)
    }

    /// Same as [`WatcherConfig::load`] on an in-memory document.
    pub fn parse(contents: &str) -> Result<Self, ConfigError> {
        let ini = Ini::load_from_str_opt(contents, parse_option())?;
        Self::from_ini(&ini)
    }

    fn from_ini(ini: &Ini) -> Result<Self, ConfigError> {
        let settings = match ini.section(None::<String>) {
            Some(general) => Settings::from_properties(general)?,
            None => Settings::default(),
        };
        let defaults = ini.section(Some(DEFAULT_SECTION));

        let mut seen = HashSet::new();
        let mut targets = Vec::new();

        for (section, props) in ini.iter() {
            let Some(name) = section else { continue };
            if name == DEFAULT_SECTION {
                continue;
            }
            if !seen.insert(name) {
                return Err(ConfigError::DuplicateTarget(name.to_string()));
            }
            targets.push(target_from_section(name, defaults, props)?);
        }

        if targets.is_empty() {
            warn!("Configuration defines no targets, nothing will be monitored");
        }

        Ok(Self { settings, targets })
    }
}

fn target_from_section(
    name: &str,
    defaults: Option<&Properties>,
    props: &Properties,
) -> Result<TargetDefinition, ConfigError> {
    let mut options: Options = defaults
        .into_iter()
        .flat_map(|d| d.iter())
        .chain(props.iter())
        .map(|(k, v)| (k.to_ascii_lowercase(), v.to_string()))
        .collect();

    let mut take_required = |key: &'static str| match options.remove(key) {
        Some(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(ConfigError::MissingKey { section: name.to_string(), key }),
    };

    let check_kind = take_required(REQUIRED_KEYS[0])?;
    let host = take_required(REQUIRED_KEYS[1])?;
    let alert_kind = take_required(REQUIRED_KEYS[2])?;

    Ok(TargetDefinition { name: name.to_string(), check_kind, host, alert_kind, options })
}

/// Default configuration path: `./config.ini` when it exists, otherwise
/// `$XDG_CONFIG_HOME/watcher/config.ini` (or `$HOME/.config/...`).
pub fn default_config_path() -> path::PathBuf {
    let local = path::PathBuf::from("config.ini");
    if local.exists() {
        return local;
    }

    let config_home = if let Some(config_home) = env::var_os("XDG_CONFIG_HOME") {
        path::PathBuf::from(config_home)
    } else if let Some(home_dir) = env::var_os("HOME") {
        path::PathBuf::from(home_dir).join(".config")
    } else {
        return local;
    };

    config_home.join("watcher/config.ini")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = "\
interval = 30
state_file = /tmp/watcher.state

[DEFAULT]
alert = email
recipient = ops@example.com

[gateway]
check = ping
host = 10.0.0.1

[website]
check = http
host = example.com
content_check = ok
recipient = web@example.com

[backup]
check = ping
host = 10.0.0.9
alert = log
";

    #[test]
    fn test_sections_keep_file_order() {
        let config = WatcherConfig::parse(SAMPLE).unwrap();
        let names: Vec<_> = config.targets.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, ["gateway", "website", "backup"]);
    }

    #[test]
    fn test_required_keys_and_options() {
        let config = WatcherConfig::parse(SAMPLE).unwrap();
        let website = &config.targets[1];

        assert_eq!(website.check_kind, "http");
        assert_eq!(website.host, "example.com");
        assert_eq!(website.alert_kind, "email");
        assert_eq!(website.options.get("content_check").map(String::as_str), Some("ok"));
        assert!(!website.options.contains_key("check"));
        assert!(!website.options.contains_key("host"));
    }

    #[test]
    fn test_default_section_is_inherited_and_overridable() {
        let config = WatcherConfig::parse(SAMPLE).unwrap();

        let gateway = &config.targets[0];
        assert_eq!(gateway.alert_kind, "email");
        assert_eq!(gateway.options["recipient"], "ops@example.com");

        let website = &config.targets[1];
        assert_eq!(website.options["recipient"], "web@example.com");

        let backup = &config.targets[2];
        assert_eq!(backup.alert_kind, "log");
    }

    #[test]
    fn test_general_section_settings() {
        let config = WatcherConfig::parse(SAMPLE).unwrap();
        assert_eq!(config.settings.interval, Duration::from_secs(30));
        assert_eq!(config.settings.state_file, path::PathBuf::from("/tmp/watcher.state"));
        assert_eq!(config.settings.timeout, Settings::default().timeout);
        assert_eq!(config.settings.recipient, "root");
    }

    #[test]
    fn test_missing_host_is_rejected() {
        let err = WatcherConfig::parse("[a]\ncheck = ping\nalert = email\n").unwrap_err();
        assert!(matches!(err, ConfigError::MissingKey { ref section, key: "host" } if section == "a"));
    }

    #[test]
    fn test_empty_value_counts_as_missing() {
        let err = WatcherConfig::parse("[a]\ncheck = ping\nhost =\nalert = email\n").unwrap_err();
        assert!(matches!(err, ConfigError::MissingKey { key: "host", .. }));
    }

    #[test]
    fn test_invalid_interval_is_rejected() {
        let err = WatcherConfig::parse("interval = soon\n").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidSetting { ref key, .. } if key == "interval"));

        let err = WatcherConfig::parse("interval = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidSetting { .. }));
    }

    #[test]
    fn test_backslashes_are_kept_literally() {
        let config = WatcherConfig::parse(
            "state_file = C:\\watch\\state\n\n[a]\ncheck = http\nhost = h\nalert = log\ncontent_check = C:\\tmp\\x\n",
        )
        .unwrap();

        assert_eq!(config.settings.state_file, path::PathBuf::from(r"C:\watch\state"));
        assert_eq!(config.targets[0].options["content_check"], r"C:\tmp\x");
    }

    #[test]
    fn test_keys_are_case_insensitive() {
        let config = WatcherConfig::parse("Interval = 15\n\n[a]\nCheck = ping\nHOST = 10.0.0.1\nAlert = log\nTimeout = 3\n").unwrap();

        assert_eq!(config.settings.interval, Duration::from_secs(15));
        let target = &config.targets[0];
        assert_eq!(target.check_kind, "ping");
        assert_eq!(target.host, "10.0.0.1");
        assert_eq!(target.options["timeout"], "3");
    }

    #[test]
    fn test_oversized_durations_are_rejected() {
        let err = WatcherConfig::parse("timeout = 18446744073709551615\n").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidSetting { ref key, .. } if key == "timeout"));

        let err = WatcherConfig::parse("interval = 86401\n").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidSetting { ref key, .. } if key == "interval"));
    }

    #[test]
    fn test_no_targets_is_not_an_error() {
        let config = WatcherConfig::parse("interval = 10\n").unwrap();
        assert!(config.targets.is_empty());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let config = WatcherConfig::load(file.path()).unwrap();
        assert_eq!(config.targets.len(), 3);
    }

    #[test]
    fn test_missing_file_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = WatcherConfig::load(dir.path().join("absent.ini")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
