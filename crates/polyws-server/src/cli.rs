//! Command-line handling for the `polyws-server` binary.

use std::path::{Path, PathBuf};

use polyws_config::{ConfigLoader, LogFormat, PolywsConfig};
use polyws_telemetry::{LogConfig, MetricsConfig, TelemetryConfig};

use crate::error::ServerResult;

/// Environment prefix for configuration overrides.
pub const ENV_PREFIX: &str = "POLYWS";

/// Usage text printed by `--help`.
pub const USAGE: &str = "\
Usage: polyws-server [OPTIONS]

Options:
  -c, --config <PATH>  Load configuration from a .toml or .json file
  -h, --help           Print this help and exit
  -v, --version        Print the version and exit

Environment:
  POLYWS__<SECTION>__<KEY>  Override a configuration value, e.g.
                            POLYWS__SERVER__BIND_ADDR=127.0.0.1:9000
";

/// What the binary was asked to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Run the server, optionally with a configuration file.
    Run {
        /// Path given with `--config`.
        config: Option<PathBuf>,
    },
    /// Print usage.
    Help,
    /// Print the version.
    Version,
}

/// Parse arguments, excluding the program name.
///
/// # Errors
///
/// Returns a message describing the first unusable argument.
pub fn parse_args<I, S>(args: I) -> Result<Command, String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut config = None;
    let mut args = args.into_iter().map(Into::into);

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-h" | "--help" => return Ok(Command::Help),
            "-v" | "--version" => return Ok(Command::Version),
            "-c" | "--config" => {
                let path = args
                    .next()
                    .ok_or_else(|| format!("{arg} requires a path"))?;
                config = Some(PathBuf::from(path));
            }
            other => {
                if let Some(path) = other.strip_prefix("--config=") {
                    config = Some(PathBuf::from(path));
                } else {
                    return Err(format!("unexpected argument '{other}'"));
                }
            }
        }
    }

    Ok(Command::Run { config })
}

/// Load configuration: defaults, then the file, then `.env`, then
/// `POLYWS__*` variables.
///
/// # Errors
///
/// Returns an error if the file cannot be loaded or validation fails.
pub fn load_config(path: Option<&Path>) -> ServerResult<PolywsConfig> {
    let mut loader = ConfigLoader::new().with_defaults();
    if let Some(path) = path {
        loader = loader.with_file(path)?;
    }
    let config = loader.with_dotenv()?.with_env_prefix(ENV_PREFIX).load()?;
    Ok(config)
}

/// Map the file configuration onto the telemetry subsystems.
pub fn telemetry_config(config: &PolywsConfig) -> TelemetryConfig {
    let logging = LogConfig {
        enabled: config.logging.enabled,
        level: config.logging.level.clone(),
        json_format: config.logging.format == LogFormat::Json,
        file_line_info: config.logging.include_location,
        ..LogConfig::default()
    };

    TelemetryConfig::builder()
        .logging(logging)
        .metrics(MetricsConfig {
            enabled: config.metrics.enabled,
            addr: config.metrics.addr.clone(),
        })
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_no_args() {
        assert_eq!(
            parse_args(Vec::<String>::new()),
            Ok(Command::Run { config: None })
        );
    }

    #[test]
    fn test_parse_config_forms() {
        let expected = Ok(Command::Run {
            config: Some(PathBuf::from("polyws.toml")),
        });
        assert_eq!(parse_args(["-c", "polyws.toml"]), expected);
        assert_eq!(parse_args(["--config", "polyws.toml"]), expected);
        assert_eq!(parse_args(["--config=polyws.toml"]), expected);
    }

    #[test]
    fn test_parse_help_and_version() {
        assert_eq!(parse_args(["-h"]), Ok(Command::Help));
        assert_eq!(parse_args(["--version"]), Ok(Command::Version));
        assert_eq!(parse_args(["-c", "x.toml", "--help"]), Ok(Command::Help));
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse_args(["--config"]).unwrap_err().contains("requires a path"));
        assert!(parse_args(["--port", "80"]).unwrap_err().contains("--port"));
    }

    #[test]
    fn test_load_config_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
            [server]
            bind_addr = "127.0.0.1:7001"

            [flash]
            enabled = false
            "#
        )
        .unwrap();

        let config = load_config(Some(file.path())).unwrap();
        assert_eq!(config.server.bind_addr, "127.0.0.1:7001");
        assert!(!config.flash.enabled);
    }

    #[test]
    fn test_load_config_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_config(Some(&dir.path().join("absent.toml"))).is_err());
    }

    #[test]
    fn test_telemetry_config_mapping() {
        let config = PolywsConfig::development();
        let telemetry = telemetry_config(&config);

        assert_eq!(telemetry.logging.level, "debug");
        assert!(!telemetry.logging.json_format);
        assert!(telemetry.logging.file_line_info);
        assert!(!telemetry.metrics.enabled);
        assert_eq!(telemetry.service_name, "polyws");
    }
}
