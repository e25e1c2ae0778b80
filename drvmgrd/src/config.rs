//! Ambient configuration: a static TOML file describing the manager's
//! own construction-time options (spec §6.4), plus a `clap` CLI in the
//! style of the teacher's `config::from_cmdline`/`parse_config` split.

use drvmgr_api::{Error, Result};
use serde::Deserialize;
use std::path::PathBuf;
use tracing::Level;

fn def_log_level() -> String {
    String::from("warn")
}

fn def_status_interval_ms() -> u64 {
    1000
}

#[derive(Deserialize)]
pub struct Config {
    #[serde(default = "def_log_level")]
    log_level: String,
    /// Empty/absent disables status-file writes (spec §6.4).
    #[serde(default)]
    pub status_file_path: Option<PathBuf>,
    /// Chooses worker isolation: cooperative task vs. subprocess
    /// (spec §6.4 `use_processes`).
    #[serde(default)]
    pub use_processes: bool,
    #[serde(default = "def_status_interval_ms")]
    pub status_interval_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            log_level: def_log_level(),
            status_file_path: None,
            use_processes: false,
            status_interval_ms: def_status_interval_ms(),
        }
    }
}

impl Config {
    pub fn get_log_level(&self) -> Level {
        match self.log_level.as_str() {
            "info" => Level::INFO,
            "debug" => Level::DEBUG,
            "trace" => Level::TRACE,
            _ => Level::WARN,
        }
    }
}

/// Applies `-v`/`-c`/`--print-config` on top of a file-loaded (or
/// default) config. Returns the final config and whether the caller
/// should print it and exit.
fn from_cmdline(mut cfg: Config) -> (bool, Option<PathBuf>, Config) {
    use clap::{crate_version, Arg, ArgAction, Command};

    let matches = Command::new("Driver Manager")
        .version(crate_version!())
        .about("Supervises protocol drivers and mediates host access to them")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .action(ArgAction::Set)
                .value_name("FILE")
                .help("Specifies the configuration file"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(ArgAction::Count)
                .help("Sets verbosity of log; can be used more than once"),
        )
        .arg(
            Arg::new("print_cfg")
                .long("print-config")
                .action(ArgAction::SetTrue)
                .help("Displays the configuration and exits"),
        )
        .get_matches();

    match matches.get_count("verbose") {
        0 => (),
        1 => cfg.log_level = String::from("info"),
        2 => cfg.log_level = String::from("debug"),
        _ => cfg.log_level = String::from("trace"),
    }

    let config_path = matches.get_one::<String>("config").map(PathBuf::from);

    (matches.get_flag("print_cfg"), config_path, cfg)
}

fn parse_config(contents: &str) -> Result<Config> {
    toml::from_str(contents).map_err(|e| Error::BadConfig(e.to_string()))
}

async fn from_file(path: &std::path::Path) -> Option<Result<Config>> {
    match tokio::fs::read(path).await {
        Ok(contents) => {
            let contents = String::from_utf8_lossy(&contents);
            Some(parse_config(&contents))
        }
        Err(_) => None,
    }
}

fn dump_config(cfg: &Config) {
    println!("Configuration:");
    println!("    log level: {}", cfg.get_log_level());
    println!(
        "    status file: {}",
        cfg.status_file_path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(disabled)".to_owned())
    );
    println!("    use_processes: {}", cfg.use_processes);
    println!("    status interval: {}ms", cfg.status_interval_ms);
}

/// Loads the config file named by `-c`, falling back to `Config`
/// defaults if no path was given, then layers `-v`/`--print-config`.
/// A bad path or malformed TOML aborts the process before the manager
/// loop starts (SPEC_FULL §7).
pub async fn get() -> Result<Config> {
    let (print_cfg, config_path, base) = from_cmdline(Config::default());

    let cfg = match config_path {
        Some(path) => match from_file(&path).await {
            Some(result) => result?,
            None => {
                return Err(Error::BadConfig(format!(
                    "couldn't read config file {}",
                    path.display()
                )))
            }
        },
        None => base,
    };

    if print_cfg {
        dump_config(&cfg);
        std::process::exit(0);
    }

    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_disable_status_file_and_processes() {
        let cfg = Config::default();

        assert!(cfg.status_file_path.is_none());
        assert!(!cfg.use_processes);
        assert_eq!(cfg.status_interval_ms, 1000);
    }

    #[test]
    fn parses_minimal_toml() {
        let cfg = parse_config("use_processes = true\nstatus_file_path = \"/tmp/drvmgr.status\"\n")
            .unwrap();

        assert!(cfg.use_processes);
        assert_eq!(cfg.status_file_path, Some(PathBuf::from("/tmp/drvmgr.status")));
    }

    #[test]
    fn bad_toml_is_a_config_error() {
        let result = parse_config("this is not toml {{{");

        assert!(matches!(result, Err(Error::BadConfig(_))));
    }
}
