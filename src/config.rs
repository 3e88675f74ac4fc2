/*
 *  config.rs
 *
 *  Tablero - matrix status board
 *  (c) 2020-26 Stuart Hunter
 *
 *  Application configuration: YAML file, environment secrets, CLI overrides
 *
 *  This program is free software: you can redistribute it and/or modify
 *  it under the terms of the GNU General Public License as published by
 *  the Free Software Foundation, either version 3 of the License, or
 *  (at your option) any later version.
 *
 *  This program is distributed in the hope that it will be useful,
 *  but WITHOUT ANY WARRANTY; without even the implied warranty of
 *  MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 *  GNU General Public License for more details.
 *
 *  See <http://www.gnu.org/licenses/> to get a copy of the GNU General
 *  Public License.
 *
 */

use clap::{ArgAction, Parser, ValueHint};
use dirs_next::home_dir;
use serde::{Deserialize, Serialize};
use std::{fs, path::{Path, PathBuf}, time::Duration};
use thiserror::Error;

/// Error type for config loading/validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Top-level app configuration. Every leaf is optional so files and CLI layer cleanly.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    pub log_level: Option<String>,
    /// Whole hours east of UTC; unset uses the host zone
    pub timezone_offset: Option<i32>,
    /// Stop after this many cycles (0 or unset runs forever)
    pub max_cycles: Option<u64>,
    pub api: Option<ApiConfig>,
    pub remote: Option<RemoteConfig>,
    pub files: Option<FilesConfig>,
    pub timing: Option<TimingConfig>,
    pub stop_button_pin: Option<u8>,
}

/// Credentials, usually left out of the file and taken from the environment.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct ApiConfig {
    pub accuweather_key: Option<String>,
    pub accuweather_location: Option<String>,
    pub twelve_data_key: Option<String>,
    pub cta_train_key: Option<String>,
    pub cta_bus_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct RemoteConfig {
    pub settings_url: Option<String>,
    /// Directory holding `YYYY-MM-DD.csv` and `default.csv`
    pub schedules_url: Option<String>,
    pub stocks_url: Option<String>,
    pub transits_url: Option<String>,
    pub events_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct FilesConfig {
    pub data_dir: Option<PathBuf>,
    pub image_dir: Option<PathBuf>,
    pub stop_file: Option<PathBuf>,
    /// Write every frame as PPM here
    pub frame_dump: Option<PathBuf>,
}

/// Panel holds are seconds, intervals are cycles.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct TimingConfig {
    pub weather_secs: Option<u64>,
    pub forecast_secs: Option<u64>,
    pub stocks_secs: Option<u64>,
    pub transit_secs: Option<u64>,
    pub events_secs: Option<u64>,
    pub event_min_secs: Option<u64>,
    pub clock_secs: Option<u64>,
    pub message_secs: Option<u64>,
    pub schedule_segment_secs: Option<u64>,
    pub stock_fetch_interval_secs: Option<u64>,
    pub poll_ms: Option<u64>,
    pub reload_every_cycles: Option<u64>,
    pub memory_check_interval: Option<u64>,
    pub reconnect_attempts: Option<u32>,
}

/// Resolved timings with defaults filled in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    pub weather: Duration,
    pub forecast: Duration,
    pub stocks: Duration,
    pub transit: Duration,
    pub events: Duration,
    pub event_min: Duration,
    pub clock: Duration,
    pub message: Duration,
    pub schedule_segment: Duration,
    pub stock_fetch_interval: Duration,
    pub poll: Duration,
    pub reload_every_cycles: u64,
    pub memory_check_interval: u64,
    pub reconnect_attempts: u32,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            weather: Duration::from_secs(240),
            forecast: Duration::from_secs(60),
            stocks: Duration::from_secs(30),
            transit: Duration::from_secs(60),
            events: Duration::from_secs(60),
            event_min: Duration::from_secs(10),
            clock: Duration::from_secs(10),
            message: Duration::from_secs(3),
            schedule_segment: Duration::from_secs(300),
            stock_fetch_interval: Duration::from_secs(65),
            poll: Duration::from_millis(100),
            reload_every_cycles: 10,
            memory_check_interval: 5,
            reconnect_attempts: 1,
        }
    }
}

/// Resolved local file locations.
#[derive(Debug, Clone, PartialEq)]
pub struct Paths {
    pub settings: PathBuf,
    pub schedules: PathBuf,
    pub stocks: PathBuf,
    pub transits: PathBuf,
    pub events: PathBuf,
    pub dated_events: PathBuf,
    pub images: PathBuf,
    pub stop_file: PathBuf,
    pub frame_dump: Option<PathBuf>,
}

impl Config {
    pub fn timing(&self) -> Timing {
        let d = Timing::default();
        let Some(t) = self.timing.as_ref() else { return d };
        let secs = |v: Option<u64>, default: Duration| v.map_or(default, Duration::from_secs);
        Timing {
            weather: secs(t.weather_secs, d.weather),
            forecast: secs(t.forecast_secs, d.forecast),
            stocks: secs(t.stocks_secs, d.stocks),
            transit: secs(t.transit_secs, d.transit),
            events: secs(t.events_secs, d.events),
            event_min: secs(t.event_min_secs, d.event_min),
            clock: secs(t.clock_secs, d.clock),
            message: secs(t.message_secs, d.message),
            schedule_segment: secs(t.schedule_segment_secs, d.schedule_segment),
            stock_fetch_interval: secs(t.stock_fetch_interval_secs, d.stock_fetch_interval),
            poll: t.poll_ms.map_or(d.poll, Duration::from_millis),
            reload_every_cycles: t.reload_every_cycles.unwrap_or(d.reload_every_cycles),
            memory_check_interval: t.memory_check_interval.unwrap_or(d.memory_check_interval),
            reconnect_attempts: t.reconnect_attempts.unwrap_or(d.reconnect_attempts),
        }
    }

    pub fn paths(&self) -> Paths {
        let files = self.files.clone().unwrap_or_default();
        let data = files.data_dir.unwrap_or_else(|| PathBuf::from("."));
        Paths {
            settings: data.join("config.csv"),
            schedules: data.join("schedules.csv"),
            stocks: data.join("stocks.csv"),
            transits: data.join("transits.csv"),
            events: data.join("events.csv"),
            dated_events: data.join("ephemeral_events.csv"),
            images: files.image_dir.unwrap_or_else(|| data.join("img")),
            stop_file: files.stop_file.unwrap_or_else(|| PathBuf::from("/run/tablero.stop")),
            frame_dump: files.frame_dump,
        }
    }

    pub fn api(&self) -> ApiConfig {
        self.api.clone().unwrap_or_default()
    }

    pub fn remote(&self) -> RemoteConfig {
        self.remote.clone().unwrap_or_default()
    }
}

/// CLI overrides. All fields are Options so we can layer them over YAML.
#[derive(Debug, Parser, Clone, Default)]
#[command(name = "tablero", version, about = "Tablero - RGB matrix status board", disable_help_flag = false)]
pub struct Cli {
    /// Path to a YAML config file (overrides search)
    #[arg(long, value_hint = ValueHint::FilePath)]
    pub config: Option<PathBuf>,
    /// Enable debug log level
    #[arg(short = 'v', long = "debug", alias = "verbose", action = ArgAction::SetTrue)]
    pub debug: bool,
    #[arg(long)]
    pub log_level: Option<String>,
    /// Hours east of UTC, e.g. -6 for US Central standard time
    #[arg(long, allow_hyphen_values = true)]
    pub tz_offset: Option<i32>,
    /// Directory holding config.csv, schedules.csv and friends
    #[arg(long, value_hint = ValueHint::DirPath)]
    pub data_dir: Option<PathBuf>,
    #[arg(long, value_hint = ValueHint::DirPath)]
    pub image_dir: Option<PathBuf>,
    /// Write each rendered frame to this PPM file
    #[arg(long, value_hint = ValueHint::FilePath)]
    pub frame_dump: Option<PathBuf>,
    #[arg(long)]
    pub max_cycles: Option<u64>,
    /// dump fully merged config (after overrides) and exit
    #[arg(long, action = ArgAction::SetTrue)]
    pub dump_config: bool,
}

/// Public entry point: parse CLI, read YAML, merge, validate.
pub fn load() -> Result<Config, ConfigError> {
    let cli = Cli::parse();
    let cfg = load_with(&cli)?;

    if cli.dump_config {
        // Pretty YAML of effective config (nice for debugging)
        let s = serde_yaml::to_string(&cfg)?;
        println!("{s}");
        std::process::exit(0);
    }
    Ok(cfg)
}

/// Defaults, then YAML, then environment secrets, then CLI.
pub fn load_with(cli: &Cli) -> Result<Config, ConfigError> {
    let mut cfg = Config::default();

    if let Some(p) = cli.config.as_ref() {
        if p.exists() {
            merge(&mut cfg, read_yaml(p)?);
        } else {
            return Err(ConfigError::Validation(format!(
                "Config file not found: {}",
                p.display()
            )));
        }
    } else if let Some(p) = find_config_file() {
        merge(&mut cfg, read_yaml(&p)?);
    }

    apply_env(&mut cfg, |k| std::env::var(k).ok());
    apply_cli_overrides(&mut cfg, cli);
    validate(&cfg)?;
    Ok(cfg)
}

/// Try common locations in order (first hit wins).
fn find_config_file() -> Option<PathBuf> {
    // XDG-style: ~/.config/tablero/config.yaml
    if let Some(home) = home_dir() {
        let p = home.join(".config/tablero/config.yaml");
        if p.exists() { return Some(p) }
        let p = home.join(".config/tablero.yaml");
        if p.exists() { return Some(p) }
    }
    for candidate in &["tablero.yaml", "config.yaml"] {
        let p = PathBuf::from(candidate);
        if p.exists() { return Some(p) }
    }
    None
}

fn read_yaml(path: &Path) -> Result<Config, ConfigError> {
    let s = fs::read_to_string(path)?;
    let cfg: Config = serde_yaml::from_str(&s)?;
    Ok(cfg)
}

/// Shallow merge `src` into `dst`, Option-by-Option.
fn merge(dst: &mut Config, src: Config) {
    // top-level
    if src.log_level.is_some()       { dst.log_level = src.log_level; }
    if src.timezone_offset.is_some() { dst.timezone_offset = src.timezone_offset; }
    if src.max_cycles.is_some()      { dst.max_cycles = src.max_cycles; }
    if src.stop_button_pin.is_some() { dst.stop_button_pin = src.stop_button_pin; }

    match (&mut dst.api, src.api) {
        (None, Some(s)) => dst.api = Some(s),
        (Some(d), Some(s)) => merge_api(d, s),
        _ => {}
    }
    match (&mut dst.remote, src.remote) {
        (None, Some(s)) => dst.remote = Some(s),
        (Some(d), Some(s)) => merge_remote(d, s),
        _ => {}
    }
    match (&mut dst.files, src.files) {
        (None, Some(s)) => dst.files = Some(s),
        (Some(d), Some(s)) => merge_files(d, s),
        _ => {}
    }
    match (&mut dst.timing, src.timing) {
        (None, Some(s)) => dst.timing = Some(s),
        (Some(d), Some(s)) => merge_timing(d, s),
        _ => {}
    }
}

fn merge_api(dst: &mut ApiConfig, src: ApiConfig) {
    if src.accuweather_key.is_some()      { dst.accuweather_key = src.accuweather_key; }
    if src.accuweather_location.is_some() { dst.accuweather_location = src.accuweather_location; }
    if src.twelve_data_key.is_some()      { dst.twelve_data_key = src.twelve_data_key; }
    if src.cta_train_key.is_some()        { dst.cta_train_key = src.cta_train_key; }
    if src.cta_bus_key.is_some()          { dst.cta_bus_key = src.cta_bus_key; }
}

fn merge_remote(dst: &mut RemoteConfig, src: RemoteConfig) {
    if src.settings_url.is_some()  { dst.settings_url = src.settings_url; }
    if src.schedules_url.is_some() { dst.schedules_url = src.schedules_url; }
    if src.stocks_url.is_some()    { dst.stocks_url = src.stocks_url; }
    if src.transits_url.is_some()  { dst.transits_url = src.transits_url; }
    if src.events_url.is_some()    { dst.events_url = src.events_url; }
}

fn merge_files(dst: &mut FilesConfig, src: FilesConfig) {
    if src.data_dir.is_some()   { dst.data_dir = src.data_dir; }
    if src.image_dir.is_some()  { dst.image_dir = src.image_dir; }
    if src.stop_file.is_some()  { dst.stop_file = src.stop_file; }
    if src.frame_dump.is_some() { dst.frame_dump = src.frame_dump; }
}

fn merge_timing(dst: &mut TimingConfig, src: TimingConfig) {
    if src.weather_secs.is_some()              { dst.weather_secs = src.weather_secs; }
    if src.forecast_secs.is_some()             { dst.forecast_secs = src.forecast_secs; }
    if src.stocks_secs.is_some()               { dst.stocks_secs = src.stocks_secs; }
    if src.transit_secs.is_some()              { dst.transit_secs = src.transit_secs; }
    if src.events_secs.is_some()               { dst.events_secs = src.events_secs; }
    if src.event_min_secs.is_some()            { dst.event_min_secs = src.event_min_secs; }
    if src.clock_secs.is_some()                { dst.clock_secs = src.clock_secs; }
    if src.message_secs.is_some()              { dst.message_secs = src.message_secs; }
    if src.schedule_segment_secs.is_some()     { dst.schedule_segment_secs = src.schedule_segment_secs; }
    if src.stock_fetch_interval_secs.is_some() { dst.stock_fetch_interval_secs = src.stock_fetch_interval_secs; }
    if src.poll_ms.is_some()                   { dst.poll_ms = src.poll_ms; }
    if src.reload_every_cycles.is_some()       { dst.reload_every_cycles = src.reload_every_cycles; }
    if src.memory_check_interval.is_some()     { dst.memory_check_interval = src.memory_check_interval; }
    if src.reconnect_attempts.is_some()        { dst.reconnect_attempts = src.reconnect_attempts; }
}

/// Keys keep the names the board has always read from its environment.
fn apply_env<F: Fn(&str) -> Option<String>>(cfg: &mut Config, var: F) {
    let api = cfg.api.get_or_insert_with(ApiConfig::default);
    let fill = |slot: &mut Option<String>, key: &str| {
        if slot.is_none() {
            *slot = var(key).filter(|v| !v.is_empty());
        }
    };
    fill(&mut api.accuweather_key, "ACCUWEATHER_API_KEY_TYPE1");
    fill(&mut api.accuweather_location, "ACCUWEATHER_LOCATION_KEY");
    fill(&mut api.twelve_data_key, "TWELVE_DATA_API_KEY");
    fill(&mut api.cta_train_key, "CTA_API_KEY");
    fill(&mut api.cta_bus_key, "CTA_BUS_API_KEY");
}

fn apply_cli_overrides(cfg: &mut Config, cli: &Cli) {
    if cli.log_level.is_some()  { cfg.log_level = cli.log_level.clone(); }
    if cli.debug                { cfg.log_level = Some("debug".into()); }
    if cli.tz_offset.is_some()  { cfg.timezone_offset = cli.tz_offset; }
    if cli.max_cycles.is_some() { cfg.max_cycles = cli.max_cycles; }

    if cli.data_dir.is_some() || cli.image_dir.is_some() || cli.frame_dump.is_some() {
        let files = cfg.files.get_or_insert_with(FilesConfig::default);
        if cli.data_dir.is_some()   { files.data_dir = cli.data_dir.clone(); }
        if cli.image_dir.is_some()  { files.image_dir = cli.image_dir.clone(); }
        if cli.frame_dump.is_some() { files.frame_dump = cli.frame_dump.clone(); }
    }
}

/// Put any invariants here (required fields, ranges, etc.)
fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if let Some(tz) = cfg.timezone_offset {
        if !(-12..=14).contains(&tz) {
            return Err(ConfigError::Validation("timezone_offset must be -12..=14".into()));
        }
    }
    if let Some(t) = cfg.timing.as_ref() {
        if t.poll_ms == Some(0) {
            return Err(ConfigError::Validation("timing.poll_ms must be > 0".into()));
        }
        if t.reload_every_cycles == Some(0) || t.memory_check_interval == Some(0) {
            return Err(ConfigError::Validation("cycle intervals must be >= 1".into()));
        }
        if t.reconnect_attempts == Some(0) {
            return Err(ConfigError::Validation("timing.reconnect_attempts must be >= 1".into()));
        }
    }
    if let Some(level) = cfg.log_level.as_deref() {
        match level {
            "error" | "warn" | "info" | "debug" | "trace" => {}
            other => return Err(ConfigError::Validation(format!("unknown log_level {:?}", other))),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const YAML: &str = "
timezone_offset: -6
remote:
  settings_url: https://example.org/tablero/config.csv
files:
  data_dir: /opt/tablero
timing:
  weather_secs: 120
  reload_every_cycles: 20
";

    #[test]
    fn test_yaml_then_cli() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tablero.yaml");
        fs::write(&path, YAML).unwrap();

        let cli = Cli {
            config: Some(path),
            debug: true,
            tz_offset: Some(-5),
            image_dir: Some(PathBuf::from("/srv/img")),
            ..Default::default()
        };
        let cfg = load_with(&cli).unwrap();
        assert_eq!(cfg.timezone_offset, Some(-5));
        assert_eq!(cfg.log_level.as_deref(), Some("debug"));

        let paths = cfg.paths();
        assert_eq!(paths.settings, PathBuf::from("/opt/tablero/config.csv"));
        assert_eq!(paths.images, PathBuf::from("/srv/img"));

        let timing = cfg.timing();
        assert_eq!(timing.weather, Duration::from_secs(120));
        assert_eq!(timing.reload_every_cycles, 20);
        assert_eq!(timing.forecast, Timing::default().forecast);
        assert_eq!(
            cfg.remote().settings_url.as_deref(),
            Some("https://example.org/tablero/config.csv")
        );
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let cli = Cli { config: Some(PathBuf::from("/nonexistent/tablero.yaml")), ..Default::default() };
        assert!(matches!(load_with(&cli), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_env_fills_only_missing_keys() {
        let mut cfg = Config {
            api: Some(ApiConfig { twelve_data_key: Some("from-yaml".into()), ..Default::default() }),
            ..Default::default()
        };
        apply_env(&mut cfg, |k| match k {
            "TWELVE_DATA_API_KEY" => Some("from-env".into()),
            "CTA_API_KEY" => Some("train".into()),
            "CTA_BUS_API_KEY" => Some(String::new()),
            _ => None,
        });
        let api = cfg.api();
        assert_eq!(api.twelve_data_key.as_deref(), Some("from-yaml"));
        assert_eq!(api.cta_train_key.as_deref(), Some("train"));
        assert_eq!(api.cta_bus_key, None);
    }

    #[test]
    fn test_validation() {
        let bad_tz = Config { timezone_offset: Some(20), ..Default::default() };
        assert!(validate(&bad_tz).is_err());

        let bad_poll = Config {
            timing: Some(TimingConfig { poll_ms: Some(0), ..Default::default() }),
            ..Default::default()
        };
        assert!(validate(&bad_poll).is_err());
        assert!(validate(&Config::default()).is_ok());
    }

    #[test]
    fn test_defaults_without_file_sections() {
        let cfg = Config::default();
        assert_eq!(cfg.timing(), Timing::default());
        assert_eq!(cfg.paths().images, PathBuf::from("./img"));
        assert_eq!(cfg.paths().stop_file, PathBuf::from("/run/tablero.stop"));
    }

    #[test]
    fn test_merge_nested_groups() {
        let mut base = Config {
            timing: Some(TimingConfig { clock_secs: Some(5), ..Default::default() }),
            ..Default::default()
        };
        let over = Config {
            timing: Some(TimingConfig { weather_secs: Some(30), ..Default::default() }),
            ..Default::default()
        };
        merge(&mut base, over);
        let t = base.timing();
        assert_eq!(t.clock, Duration::from_secs(5));
        assert_eq!(t.weather, Duration::from_secs(30));
    }

    #[test]
    fn test_merge_keeps_unset_fields_in_every_section() {
        let mut base = Config {
            timezone_offset: Some(-6),
            api: Some(ApiConfig { twelve_data_key: Some("td".into()), ..Default::default() }),
            remote: Some(RemoteConfig { stocks_url: Some("http://a/stocks.csv".into()), ..Default::default() }),
            files: Some(FilesConfig { data_dir: Some(PathBuf::from("/data")), ..Default::default() }),
            ..Default::default()
        };
        let over = Config {
            max_cycles: Some(7),
            api: Some(ApiConfig { cta_bus_key: Some("bus".into()), ..Default::default() }),
            remote: Some(RemoteConfig { stocks_url: Some("http://b/stocks.csv".into()), ..Default::default() }),
            files: Some(FilesConfig { stop_file: Some(PathBuf::from("/tmp/stop")), ..Default::default() }),
            ..Default::default()
        };
        merge(&mut base, over);

        assert_eq!(base.timezone_offset, Some(-6));
        assert_eq!(base.max_cycles, Some(7));
        let api = base.api();
        assert_eq!(api.twelve_data_key.as_deref(), Some("td"));
        assert_eq!(api.cta_bus_key.as_deref(), Some("bus"));
        assert_eq!(base.remote().stocks_url.as_deref(), Some("http://b/stocks.csv"));
        let paths = base.paths();
        assert_eq!(paths.settings, PathBuf::from("/data/config.csv"));
        assert_eq!(paths.stop_file, PathBuf::from("/tmp/stop"));
    }
}
