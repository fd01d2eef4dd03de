//! Server settings, resolved in layers: built-in defaults, an optional TOML
//! file, `CONTINENTAL_*` environment variables, then command-line overrides.
use crate::logging::LogFormat;
use continental_engine::meld::MeldStrategy;
use continental_engine::rules::{DrawPilePolicy, EngineConfig, MAX_PLAYERS};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const CONFIG_ENV: &str = "CONTINENTAL_CONFIG";

/// Where finished rounds are recorded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LedgerKind {
    /// Rows are kept in process memory only
    #[default]
    Memory,
    Jsonl,
    Sqlite,
}

impl LedgerKind {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "memory" | "none" => Some(Self::Memory),
            "jsonl" | "json" => Some(Self::Jsonl),
            "sqlite" | "db" => Some(Self::Sqlite),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppSettings {
    pub host: String,
    pub port: u16,
    pub ledger: LedgerKind,
    pub ledger_path: Option<PathBuf>,
    pub log_format: LogFormat,
    /// Defaults applied to tables created without overrides
    pub engine: EngineConfig,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            ledger: LedgerKind::Memory,
            ledger_path: None,
            log_format: LogFormat::Pretty,
            engine: EngineConfig::default(),
        }
    }
}

impl AppSettings {
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.host.trim().is_empty() {
            return Err(SettingsError::InvalidValue("host cannot be empty".into()));
        }
        if self.engine.capacity == 0 || self.engine.capacity > MAX_PLAYERS {
            return Err(SettingsError::InvalidValue(format!(
                "capacity must be between 1 and {MAX_PLAYERS}"
            )));
        }
        if self.ledger != LedgerKind::Memory && self.ledger_path.is_none() {
            return Err(SettingsError::InvalidValue(
                "ledger_path is required for file-backed ledgers".into(),
            ));
        }
        Ok(())
    }

    pub fn engine_config(&self) -> EngineConfig {
        self.engine.clone()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueSource {
    #[default]
    Default,
    File,
    Env,
    Cli,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SettingsSources {
    pub host: ValueSource,
    pub port: ValueSource,
    pub ledger: ValueSource,
    pub ledger_path: ValueSource,
    pub log_format: ValueSource,
    pub seed: ValueSource,
    pub draw_pile: ValueSource,
    pub strategy: ValueSource,
    pub capacity: ValueSource,
}

#[derive(Debug, Clone)]
pub struct ResolvedSettings {
    pub settings: AppSettings,
    pub sources: SettingsSources,
}

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid value for {key}: {value}")]
    InvalidEnv { key: &'static str, value: String },
    #[error("invalid settings: {0}")]
    InvalidValue(String),
}

/// Command-line values; `None` leaves the lower layers in charge.
#[derive(Debug, Clone, Default)]
pub struct SettingsOverrides {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub ledger: Option<LedgerKind>,
    pub ledger_path: Option<PathBuf>,
    pub log_format: Option<LogFormat>,
    pub seed: Option<u64>,
    pub draw_pile: Option<DrawPilePolicy>,
    pub strategy: Option<MeldStrategy>,
    pub capacity: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct FileSettings {
    #[serde(default)]
    host: Option<String>,
    #[serde(default)]
    port: Option<u16>,
    #[serde(default)]
    ledger: Option<String>,
    #[serde(default)]
    ledger_path: Option<PathBuf>,
    #[serde(default)]
    log_format: Option<String>,
    #[serde(default)]
    table: FileTableSettings,
}

#[derive(Debug, Default, Deserialize)]
struct FileTableSettings {
    #[serde(default)]
    seed: Option<u64>,
    #[serde(default)]
    draw_pile: Option<String>,
    #[serde(default)]
    strategy: Option<String>,
    #[serde(default)]
    capacity: Option<usize>,
}

/// Resolves settings from the process environment.
pub fn load(config: Option<&Path>, overrides: SettingsOverrides) -> Result<ResolvedSettings, SettingsError> {
    let env_path = std::env::var(CONFIG_ENV).ok().map(PathBuf::from);
    let path = config.map(Path::to_path_buf).or(env_path);
    resolve(path.as_deref(), |key| std::env::var(key).ok(), overrides)
}

/// Layered resolution with an injectable environment lookup.
pub fn resolve<E>(
    config: Option<&Path>,
    env: E,
    overrides: SettingsOverrides,
) -> Result<ResolvedSettings, SettingsError>
where
    E: Fn(&str) -> Option<String>,
{
    let mut settings = AppSettings::default();
    let mut sources = SettingsSources::default();

    if let Some(path) = config {
        let raw = fs::read_to_string(path).map_err(|source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let file: FileSettings = toml::from_str(&raw)?;
        apply_file(&mut settings, &mut sources, file)?;
    }

    apply_env(&mut settings, &mut sources, &env)?;
    apply_overrides(&mut settings, &mut sources, overrides);

    settings.validate()?;
    Ok(ResolvedSettings { settings, sources })
}

fn apply_file(
    settings: &mut AppSettings,
    sources: &mut SettingsSources,
    file: FileSettings,
) -> Result<(), SettingsError> {
    if let Some(v) = file.host {
        settings.host = v;
        sources.host = ValueSource::File;
    }
    if let Some(v) = file.port {
        settings.port = v;
        sources.port = ValueSource::File;
    }
    if let Some(v) = file.ledger {
        settings.ledger = LedgerKind::parse(&v)
            .ok_or_else(|| SettingsError::InvalidValue(format!("unknown ledger '{v}'")))?;
        sources.ledger = ValueSource::File;
    }
    if let Some(v) = file.ledger_path {
        settings.ledger_path = Some(v);
        sources.ledger_path = ValueSource::File;
    }
    if let Some(v) = file.log_format {
        settings.log_format = LogFormat::parse(&v)
            .ok_or_else(|| SettingsError::InvalidValue(format!("unknown log format '{v}'")))?;
        sources.log_format = ValueSource::File;
    }
    if let Some(v) = file.table.seed {
        settings.engine.seed = Some(v);
        sources.seed = ValueSource::File;
    }
    if let Some(v) = file.table.draw_pile {
        settings.engine.draw_pile = DrawPilePolicy::parse(v.trim())
            .ok_or_else(|| SettingsError::InvalidValue(format!("unknown draw pile policy '{v}'")))?;
        sources.draw_pile = ValueSource::File;
    }
    if let Some(v) = file.table.strategy {
        settings.engine.strategy = MeldStrategy::parse(v.trim())
            .ok_or_else(|| SettingsError::InvalidValue(format!("unknown meld strategy '{v}'")))?;
        sources.strategy = ValueSource::File;
    }
    if let Some(v) = file.table.capacity {
        settings.engine.capacity = v;
        sources.capacity = ValueSource::File;
    }
    Ok(())
}

fn apply_env<E>(
    settings: &mut AppSettings,
    sources: &mut SettingsSources,
    env: &E,
) -> Result<(), SettingsError>
where
    E: Fn(&str) -> Option<String>,
{
    let lookup = |key: &str| env(key).filter(|v| !v.trim().is_empty());

    if let Some(v) = lookup("CONTINENTAL_HOST") {
        settings.host = v;
        sources.host = ValueSource::Env;
    }
    if let Some(v) = lookup("CONTINENTAL_PORT") {
        settings.port = v.trim().parse().map_err(|_| SettingsError::InvalidEnv {
            key: "CONTINENTAL_PORT",
            value: v.clone(),
        })?;
        sources.port = ValueSource::Env;
    }
    if let Some(v) = lookup("CONTINENTAL_LEDGER") {
        // Either a kind, or a path whose extension picks the kind.
        match LedgerKind::parse(&v) {
            Some(kind) => settings.ledger = kind,
            None => {
                let path = PathBuf::from(&v);
                settings.ledger = match path.extension().and_then(|e| e.to_str()) {
                    Some("jsonl") | Some("json") => LedgerKind::Jsonl,
                    Some("db") | Some("sqlite") | Some("sqlite3") => LedgerKind::Sqlite,
                    _ => {
                        return Err(SettingsError::InvalidEnv {
                            key: "CONTINENTAL_LEDGER",
                            value: v,
                        })
                    }
                };
                settings.ledger_path = Some(path);
                sources.ledger_path = ValueSource::Env;
            }
        }
        sources.ledger = ValueSource::Env;
    }
    if let Some(v) = lookup("CONTINENTAL_SEED") {
        settings.engine.seed = Some(v.trim().parse().map_err(|_| SettingsError::InvalidEnv {
            key: "CONTINENTAL_SEED",
            value: v.clone(),
        })?);
        sources.seed = ValueSource::Env;
    }
    if let Some(v) = lookup("CONTINENTAL_DRAW_PILE") {
        settings.engine.draw_pile =
            DrawPilePolicy::parse(v.trim()).ok_or_else(|| SettingsError::InvalidEnv {
                key: "CONTINENTAL_DRAW_PILE",
                value: v.clone(),
            })?;
        sources.draw_pile = ValueSource::Env;
    }
    if let Some(v) = lookup("CONTINENTAL_STRATEGY") {
        settings.engine.strategy =
            MeldStrategy::parse(v.trim()).ok_or_else(|| SettingsError::InvalidEnv {
                key: "CONTINENTAL_STRATEGY",
                value: v.clone(),
            })?;
        sources.strategy = ValueSource::Env;
    }
    Ok(())
}

fn apply_overrides(settings: &mut AppSettings, sources: &mut SettingsSources, cli: SettingsOverrides) {
    if let Some(v) = cli.host {
        settings.host = v;
        sources.host = ValueSource::Cli;
    }
    if let Some(v) = cli.port {
        settings.port = v;
        sources.port = ValueSource::Cli;
    }
    if let Some(v) = cli.ledger {
        settings.ledger = v;
        sources.ledger = ValueSource::Cli;
    }
    if let Some(v) = cli.ledger_path {
        settings.ledger_path = Some(v);
        sources.ledger_path = ValueSource::Cli;
    }
    if let Some(v) = cli.log_format {
        settings.log_format = v;
        sources.log_format = ValueSource::Cli;
    }
    if let Some(v) = cli.seed {
        settings.engine.seed = Some(v);
        sources.seed = ValueSource::Cli;
    }
    if let Some(v) = cli.draw_pile {
        settings.engine.draw_pile = v;
        sources.draw_pile = ValueSource::Cli;
    }
    if let Some(v) = cli.strategy {
        settings.engine.strategy = v;
        sources.strategy = ValueSource::Cli;
    }
    if let Some(v) = cli.capacity {
        settings.engine.capacity = v;
        sources.capacity = ValueSource::Cli;
    }
}
