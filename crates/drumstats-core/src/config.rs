// Configuration loading and parsing (drumstats.toml).

use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("validation error for field `{field}`: {message}")]
    ValidationError { field: String, message: String },
}

// ---------------------------------------------------------------------------
// Top-level assembled Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Config {
    pub db_path: String,
    pub import: ImportConfig,
    pub thresholds: Thresholds,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            db_path: default_db_path(),
            import: ImportConfig::default(),
            thresholds: Thresholds::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// drumstats.toml structs
// ---------------------------------------------------------------------------

/// Raw deserialization target for the whole file. Every section is optional.
#[derive(Debug, Clone, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    database: DatabaseSection,
    #[serde(default)]
    import: ImportConfig,
    #[serde(default)]
    thresholds: Thresholds,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct DatabaseSection {
    path: Option<String>,
}

/// Settings that shape how sheets are interpreted.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ImportConfig {
    /// Name of the club whose workbook this is. Appears on the left of "vs".
    pub home_team: String,
    /// Competition used when a sheet names one we do not recognise.
    pub default_competition: String,
    /// Forces every match into this season instead of the match date's year.
    pub season_year: Option<i32>,
}

impl Default for ImportConfig {
    fn default() -> Self {
        ImportConfig {
            home_team: "Drum".into(),
            default_competition: "League".into(),
            season_year: None,
        }
    }
}

/// Empirical tolerances. None of these are protocol requirements.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    /// Allowed deviation of a period's two possession fractions from 1.0.
    pub possession_tolerance: f64,
    /// Allowed relative gap between half-time sums and the full-time score.
    pub score_tolerance: f64,
    /// Largest edit distance accepted as the same player.
    pub fuzzy_max_distance: usize,
    pub max_minutes: i64,
    pub min_roster_size: usize,
    pub max_roster_size: usize,
}

impl Default for Thresholds {
    fn default() -> Self {
        Thresholds {
            possession_tolerance: 0.05,
            score_tolerance: 0.10,
            fuzzy_max_distance: 3,
            max_minutes: 120,
            min_roster_size: 15,
            max_roster_size: 30,
        }
    }
}

// ---------------------------------------------------------------------------
// Loading logic
// ---------------------------------------------------------------------------

/// Relative location of the config file under a base directory.
pub const CONFIG_FILE: &str = "config/drumstats.toml";

/// Load config from an explicit file. The file must exist.
pub fn load_config_file(path: &Path) -> Result<Config, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
        path: path.to_path_buf(),
    })?;
    parse_config(&text, path)
}

/// Load `config/drumstats.toml` relative to `base_dir`. A missing file yields
/// the built-in defaults.
pub fn load_config_from(base_dir: &Path) -> Result<Config, ConfigError> {
    let path = base_dir.join(CONFIG_FILE);
    if !path.exists() {
        info!("no config at {}, using defaults", path.display());
        let config = Config::default();
        validate(&config)?;
        return Ok(config);
    }
    load_config_file(&path)
}

/// Convenience wrapper: loads config relative to the current working directory.
pub fn load_config() -> Result<Config, ConfigError> {
    let cwd = std::env::current_dir().map_err(|_| ConfigError::FileNotFound {
        path: PathBuf::from("."),
    })?;
    load_config_from(&cwd)
}

fn parse_config(text: &str, path: &Path) -> Result<Config, ConfigError> {
    let file: ConfigFile = toml::from_str(text).map_err(|e| ConfigError::ParseError {
        path: path.to_path_buf(),
        source: e,
    })?;

    let config = Config {
        db_path: file.database.path.unwrap_or_else(default_db_path),
        import: file.import,
        thresholds: file.thresholds,
    };

    validate(&config)?;
    Ok(config)
}

/// Platform data directory when one is available, else the working directory.
fn default_db_path() -> String {
    directories::ProjectDirs::from("", "", "drumstats")
        .map(|dirs| dirs.data_dir().join("drumstats.db"))
        .and_then(|p| p.to_str().map(|s| s.to_string()))
        .unwrap_or_else(|| "drumstats.db".to_string())
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn validate(config: &Config) -> Result<(), ConfigError> {
    if config.db_path.trim().is_empty() {
        return Err(ConfigError::ValidationError {
            field: "database.path".into(),
            message: "must not be empty".into(),
        });
    }

    if config.import.home_team.trim().is_empty() {
        return Err(ConfigError::ValidationError {
            field: "import.home_team".into(),
            message: "must not be empty".into(),
        });
    }

    if let Some(year) = config.import.season_year {
        if !(1884..=2100).contains(&year) {
            return Err(ConfigError::ValidationError {
                field: "import.season_year".into(),
                message: format!("must be a plausible year, got {year}"),
            });
        }
    }

    let t = &config.thresholds;
    let fractions: &[(&str, f64)] = &[
        ("thresholds.possession_tolerance", t.possession_tolerance),
        ("thresholds.score_tolerance", t.score_tolerance),
    ];
    for (name, val) in fractions {
        if !(0.0..=1.0).contains(val) {
            return Err(ConfigError::ValidationError {
                field: name.to_string(),
                message: format!("must be between 0.0 and 1.0 inclusive, got {val}"),
            });
        }
    }

    if t.max_minutes <= 0 {
        return Err(ConfigError::ValidationError {
            field: "thresholds.max_minutes".into(),
            message: format!("must be > 0, got {}", t.max_minutes),
        });
    }

    if t.min_roster_size > t.max_roster_size {
        return Err(ConfigError::ValidationError {
            field: "thresholds.min_roster_size".into(),
            message: format!(
                "must not exceed max_roster_size ({} > {})",
                t.min_roster_size, t.max_roster_size
            ),
        });
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn temp_base(name: &str) -> PathBuf {
        let tmp = std::env::temp_dir().join(format!("drumstats_{name}_{}", std::process::id()));
        let _ = fs::remove_dir_all(&tmp);
        fs::create_dir_all(tmp.join("config")).unwrap();
        tmp
    }

    #[test]
    fn missing_file_uses_defaults() {
        let tmp = std::env::temp_dir().join(format!("drumstats_empty_{}", std::process::id()));
        let _ = fs::remove_dir_all(&tmp);
        fs::create_dir_all(&tmp).unwrap();

        let config = load_config_from(&tmp).expect("defaults should load");
        assert_eq!(config.import.home_team, "Drum");
        assert_eq!(config.import.default_competition, "League");
        assert!((config.thresholds.possession_tolerance - 0.05).abs() < f64::EPSILON);
        assert!((config.thresholds.score_tolerance - 0.10).abs() < f64::EPSILON);
        assert_eq!(config.thresholds.fuzzy_max_distance, 3);

        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn partial_file_fills_remaining_defaults() {
        let tmp = temp_base("partial");
        fs::write(
            tmp.join(CONFIG_FILE),
            "[database]\npath = \"stats.db\"\n\n[thresholds]\npossession_tolerance = 0.08\n",
        )
        .unwrap();

        let config = load_config_from(&tmp).expect("partial config should load");
        assert_eq!(config.db_path, "stats.db");
        assert!((config.thresholds.possession_tolerance - 0.08).abs() < f64::EPSILON);
        assert_eq!(config.thresholds.max_minutes, 120);
        assert_eq!(config.import.home_team, "Drum");

        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn malformed_toml_is_parse_error() {
        let tmp = temp_base("malformed");
        fs::write(tmp.join(CONFIG_FILE), "[database\npath = ").unwrap();

        let err = load_config_from(&tmp).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }), "got {err:?}");

        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn rejects_tolerance_out_of_range() {
        let tmp = temp_base("tolerance");
        fs::write(
            tmp.join(CONFIG_FILE),
            "[thresholds]\nscore_tolerance = 1.5\n",
        )
        .unwrap();

        match load_config_from(&tmp) {
            Err(ConfigError::ValidationError { field, .. }) => {
                assert_eq!(field, "thresholds.score_tolerance");
            }
            other => panic!("expected ValidationError, got {other:?}"),
        }

        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn rejects_inverted_roster_bounds() {
        let tmp = temp_base("roster_bounds");
        fs::write(
            tmp.join(CONFIG_FILE),
            "[thresholds]\nmin_roster_size = 40\nmax_roster_size = 20\n",
        )
        .unwrap();

        assert!(matches!(
            load_config_from(&tmp),
            Err(ConfigError::ValidationError { .. })
        ));

        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn explicit_missing_file_is_not_found() {
        let err = load_config_file(Path::new("/definitely/not/here.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound { .. }));
    }

    #[test]
    fn season_override_parsed() {
        let tmp = temp_base("season");
        fs::write(
            tmp.join(CONFIG_FILE),
            "[import]\nhome_team = \"Drum\"\nseason_year = 2025\n",
        )
        .unwrap();

        let config = load_config_from(&tmp).unwrap();
        assert_eq!(config.import.season_year, Some(2025));

        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn shipped_sample_parses() {
        let text = include_str!("../../../config/drumstats.toml");
        let config = parse_config(text, Path::new(CONFIG_FILE)).unwrap();
        assert_eq!(config.import.home_team, "Drum");
        assert_eq!(config.thresholds.max_roster_size, 30);
        assert_eq!(config.import.season_year, None);
    }
}
