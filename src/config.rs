// Application configuration, loaded from environment variables and CLI flags.

use std::path::PathBuf;
use std::time::Duration;

use crate::engine::catalog::parse_habitats;
use crate::engine::server::ServerOptions;
use crate::error::{GameError, GameResult};

/// Application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Database URL (SQLite connection string).
    pub database_url: String,
    /// Port to bind the HTTP server to.
    pub port: u16,
    /// Species catalog JSON file.
    pub catalog_path: PathBuf,
    /// Folder for per-user export files.
    pub export_dir: PathBuf,
    /// Whether spawns are restricted to `map`.
    pub enable_maps: bool,
    /// Habitat allow-list, comma or semicolon separated.
    pub map: Option<String>,
    pub tame_duration: Duration,
    pub duel_timeout: Duration,
    pub arena_entry_window: Duration,
    pub arena_entry_cost: i64,
    /// Egg paste granted per purchase.
    pub egg_paste_amount: i64,
    pub readiness_interval: Duration,
    /// Delay between battle exchanges.
    pub pacing: Duration,
}

impl Config {
    /// Load configuration from environment variables and CLI arguments.
    ///
    /// Environment variables:
    /// - `DATABASE_URL` - SQLite connection string (default: `sqlite:dinotame.db?mode=rwc`)
    /// - `PORT` - HTTP server port (default: 3000)
    /// - `DINOS_FILE_PATH` - species catalog (default: `Dinos.json`)
    /// - `EXPORT_DIR` - export folder (default: `exports`)
    /// - `DINOTAME_ENABLE_MAPS` / `DINOTAME_MAP` - habitat filtering
    /// - `TAME_DURATION_SECS`, `DUEL_TIMEOUT_SECS`, `ARENA_ENTRY_SECS`,
    ///   `READINESS_INTERVAL_SECS`, `PACING_MS` - timers
    /// - `ARENA_ENTRY_COST`, `EGG_PASTE_AMOUNT_TO_ADD` - economy
    ///
    /// CLI flags:
    /// - `--port <PORT>` - Override the port
    /// - `--catalog <PATH>` - Override the catalog path
    /// - `--map <MAPS>` - Enable habitat filtering with this allow-list
    pub fn load() -> Self {
        let args: Vec<String> = std::env::args().collect();
        Self::from_sources(&args, |key| std::env::var(key).ok())
    }

    /// Build from explicit CLI args and an environment lookup.
    pub fn from_sources(args: &[String], env: impl Fn(&str) -> Option<String>) -> Self {
        let number = |key: &str, default: u64| -> u64 {
            env(key).and_then(|v| v.trim().parse().ok()).unwrap_or(default)
        };

        let database_url =
            env("DATABASE_URL").unwrap_or_else(|| "sqlite:dinotame.db?mode=rwc".to_string());

        // Port: CLI flag --port takes precedence, then env var, then default
        let port = Self::parse_cli_value(args, "--port")
            .and_then(|v| v.parse().ok())
            .or_else(|| env("PORT").and_then(|v| v.parse().ok()))
            .unwrap_or(3000);

        let catalog_path = Self::parse_cli_value(args, "--catalog")
            .or_else(|| env("DINOS_FILE_PATH"))
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("Dinos.json"));

        let export_dir = env("EXPORT_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("exports"));

        let cli_map = Self::parse_cli_value(args, "--map");
        let enable_maps = cli_map.is_some()
            || env("DINOTAME_ENABLE_MAPS")
                .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
                .unwrap_or(false);
        let map = cli_map.or_else(|| env("DINOTAME_MAP"));

        Config {
            database_url,
            port,
            catalog_path,
            export_dir,
            enable_maps,
            map,
            tame_duration: Duration::from_secs(number("TAME_DURATION_SECS", 120)),
            duel_timeout: Duration::from_secs(number("DUEL_TIMEOUT_SECS", 60)),
            arena_entry_window: Duration::from_secs(number("ARENA_ENTRY_SECS", 90)),
            arena_entry_cost: number("ARENA_ENTRY_COST", 0) as i64,
            egg_paste_amount: number("EGG_PASTE_AMOUNT_TO_ADD", 10) as i64,
            readiness_interval: Duration::from_secs(number("READINESS_INTERVAL_SECS", 600)),
            pacing: Duration::from_millis(number("PACING_MS", 750)),
        }
    }

    /// Habitat allow-list when filtering is enabled. A blank list is a configuration error.
    pub fn habitat_filter(&self) -> GameResult<Option<Vec<String>>> {
        if !self.enable_maps {
            return Ok(None);
        }
        let habitats = self.map.as_deref().map(parse_habitats).unwrap_or_default();
        if habitats.is_empty() {
            return Err(GameError::Configuration(
                "map filtering is enabled but no map was given".into(),
            ));
        }
        Ok(Some(habitats))
    }

    pub fn server_options(&self) -> ServerOptions {
        ServerOptions {
            tame_duration: self.tame_duration,
            duel_timeout: self.duel_timeout,
            arena_entry_window: self.arena_entry_window,
            arena_entry_cost: self.arena_entry_cost,
            egg_paste_amount: self.egg_paste_amount,
            pacing: self.pacing,
        }
    }

    /// Parse a CLI flag value like `--port 8080`.
    fn parse_cli_value(args: &[String], flag: &str) -> Option<String> {
        args.windows(2).find_map(|pair| {
            if pair[0] == flag {
                Some(pair[1].clone())
            } else {
                None
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(args: &[&str], vars: &[(&str, &str)]) -> Config {
        let args: Vec<String> = args.iter().map(|s| s.to_string()).collect();
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_sources(&args, |k| vars.get(k).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&["dinotame"], &[]);
        assert_eq!(config.port, 3000);
        assert_eq!(config.catalog_path, PathBuf::from("Dinos.json"));
        assert_eq!(config.tame_duration, Duration::from_secs(120));
        assert_eq!(config.egg_paste_amount, 10);
        assert_eq!(config.arena_entry_cost, 0);
        assert_eq!(config.pacing, Duration::from_millis(750));
        assert!(config.habitat_filter().unwrap().is_none());
    }

    #[test]
    fn test_cli_overrides_env() {
        let config = load(
            &["dinotame", "--port", "8080", "--catalog", "data/dinos.json"],
            &[("PORT", "9000"), ("DINOS_FILE_PATH", "other.json"), ("ARENA_ENTRY_COST", "5")],
        );
        assert_eq!(config.port, 8080);
        assert_eq!(config.catalog_path, PathBuf::from("data/dinos.json"));
        assert_eq!(config.arena_entry_cost, 5);
    }

    #[test]
    fn test_habitat_filter() {
        let config = load(&["dinotame", "--map", "The Island;Ragnarok"], &[]);
        assert_eq!(
            config.habitat_filter().unwrap(),
            Some(vec!["The Island".to_string(), "Ragnarok".to_string()])
        );

        let config = load(&["dinotame"], &[("DINOTAME_ENABLE_MAPS", "true"), ("DINOTAME_MAP", " ; ")]);
        assert!(matches!(
            config.habitat_filter(),
            Err(GameError::Configuration(_))
        ));
    }
}
