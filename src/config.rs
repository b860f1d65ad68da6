/// External configuration loader.
///
/// Reads `config.toml` from the executable's directory (or CWD).
/// Falls back to sensible defaults if the file is missing or
/// incomplete.

use serde::Deserialize;
use std::path::PathBuf;

use log::warn;

// ── Public Config Struct ──

#[derive(Clone, Debug)]
pub struct GameConfig {
    pub speed: SpeedConfig,
    pub audio: AudioConfig,
    pub gamepad: GamepadConfig,
    pub assets_dir: PathBuf,
    /// Advancing to this level number wraps back to level 1.
    pub terminal_level: u32,
}

#[derive(Clone, Debug)]
pub struct SpeedConfig {
    pub tick_rate_ms: u64,
}

#[derive(Clone, Debug)]
pub struct AudioConfig {
    pub music_volume: f32,
    pub glitch_volume: f32,
    pub resample_hz: u32,
}

#[derive(Clone, Debug)]
pub struct GamepadConfig {
    pub glitch: Vec<String>,
    pub restart: Vec<String>,
    pub quit: Vec<String>,
}

// ── TOML Schema (with serde defaults) ──

#[derive(Deserialize, Debug, Default)]
struct TomlConfig {
    #[serde(default)]
    speed: TomlSpeed,
    #[serde(default)]
    audio: TomlAudio,
    #[serde(default)]
    gamepad: TomlGamepad,
    #[serde(default)]
    general: TomlGeneral,
}

#[derive(Deserialize, Debug)]
struct TomlSpeed {
    #[serde(default = "default_tick_rate")]
    tick_rate_ms: u64,
}

#[derive(Deserialize, Debug)]
struct TomlAudio {
    #[serde(default = "default_music_volume")]
    music_volume: f32,
    #[serde(default = "default_glitch_volume")]
    glitch_volume: f32,
    #[serde(default = "default_resample_hz")]
    resample_hz: u32,
}

#[derive(Deserialize, Debug)]
struct TomlGamepad {
    #[serde(default = "default_glitch_buttons")]
    glitch: Vec<String>,
    #[serde(default = "default_restart_buttons")]
    restart: Vec<String>,
    #[serde(default = "default_quit_buttons")]
    quit: Vec<String>,
}

#[derive(Deserialize, Debug)]
struct TomlGeneral {
    #[serde(default = "default_assets_dir")]
    assets_dir: String,
    #[serde(default = "default_terminal_level")]
    terminal_level: u32,
}

// ── Defaults ──

fn default_tick_rate() -> u64 { 16 }
fn default_music_volume() -> f32 { 0.4 }
fn default_glitch_volume() -> f32 { 0.4 }
fn default_resample_hz() -> u32 { 48000 }
fn default_assets_dir() -> String { "assets".into() }
fn default_terminal_level() -> u32 { 5 }

fn default_glitch_buttons() -> Vec<String> { vec!["A".into(), "R1".into()] }
fn default_restart_buttons() -> Vec<String> { vec!["Start".into()] }
fn default_quit_buttons() -> Vec<String> { vec!["Select".into()] }

impl Default for TomlSpeed {
    fn default() -> Self {
        TomlSpeed {
            tick_rate_ms: default_tick_rate(),
        }
    }
}

impl Default for TomlAudio {
    fn default() -> Self {
        TomlAudio {
            music_volume: default_music_volume(),
            glitch_volume: default_glitch_volume(),
            resample_hz: default_resample_hz(),
        }
    }
}

impl Default for TomlGamepad {
    fn default() -> Self {
        TomlGamepad {
            glitch: default_glitch_buttons(),
            restart: default_restart_buttons(),
            quit: default_quit_buttons(),
        }
    }
}

impl Default for TomlGeneral {
    fn default() -> Self {
        TomlGeneral {
            assets_dir: default_assets_dir(),
            terminal_level: default_terminal_level(),
        }
    }
}

// ── Loading ──

impl GameConfig {
    /// Load config from `config.toml`.
    /// Search order: (1) exe directory, (2) current working directory.
    /// Missing file or missing keys gracefully fall back to defaults.
    pub fn load() -> Self {
        let search_dirs = candidate_dirs();
        let toml_cfg = load_toml(&search_dirs);

        // Resolve assets directory the same way: first candidate dir
        // that actually contains it wins.
        let assets_str = &toml_cfg.general.assets_dir;
        let assets_dir = if PathBuf::from(assets_str).is_absolute() {
            PathBuf::from(assets_str)
        } else {
            search_dirs
                .iter()
                .map(|d| d.join(assets_str))
                .find(|p| p.is_dir())
                .unwrap_or_else(|| PathBuf::from(assets_str))
        };

        GameConfig {
            speed: SpeedConfig {
                tick_rate_ms: toml_cfg.speed.tick_rate_ms,
            },
            audio: AudioConfig {
                music_volume: toml_cfg.audio.music_volume,
                glitch_volume: toml_cfg.audio.glitch_volume,
                resample_hz: toml_cfg.audio.resample_hz,
            },
            gamepad: GamepadConfig {
                glitch: toml_cfg.gamepad.glitch,
                restart: toml_cfg.gamepad.restart,
                quit: toml_cfg.gamepad.quit,
            },
            assets_dir,
            terminal_level: toml_cfg.general.terminal_level,
        }
    }
}

/// Candidate directories to search: exe dir + CWD (deduplicated).
fn candidate_dirs() -> Vec<PathBuf> {
    let mut dirs = vec![];

    // 1. Directory of the running executable (symlinks resolved).
    if let Ok(exe) = std::env::current_exe() {
        let resolved = exe.canonicalize().unwrap_or(exe);
        if let Some(parent) = resolved.parent() {
            dirs.push(parent.to_path_buf());
        }
    }

    // 2. Current working directory
    if let Ok(cwd) = std::env::current_dir() {
        if !dirs.iter().any(|d| d == &cwd) {
            dirs.push(cwd);
        }
    }

    if dirs.is_empty() {
        dirs.push(PathBuf::from("."));
    }

    dirs
}

/// Search for config.toml in candidate directories.
fn load_toml(search_dirs: &[PathBuf]) -> TomlConfig {
    for dir in search_dirs {
        let path = dir.join("config.toml");
        if path.exists() {
            match std::fs::read_to_string(&path) {
                Ok(text) => match toml::from_str::<TomlConfig>(&text) {
                    Ok(cfg) => return cfg,
                    Err(e) => {
                        warn!("config.toml parse error: {e}; using default settings");
                        return TomlConfig::default();
                    }
                },
                Err(e) => {
                    warn!("could not read {}: {e}", path.display());
                }
            }
        }
    }
    TomlConfig::default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_yields_defaults() {
        let cfg: TomlConfig = toml::from_str("").unwrap();
        assert_eq!(cfg.speed.tick_rate_ms, 16);
        assert_eq!(cfg.general.terminal_level, 5);
        assert_eq!(cfg.audio.resample_hz, 48000);
    }

    #[test]
    fn partial_toml_fills_the_rest() {
        let cfg: TomlConfig = toml::from_str(
            r#"
                [general]
                terminal_level = 17

                [audio]
                music_volume = 0.8
            "#,
        )
        .unwrap();
        assert_eq!(cfg.general.terminal_level, 17);
        assert_eq!(cfg.audio.music_volume, 0.8);
        assert_eq!(cfg.audio.glitch_volume, 0.4);
        assert_eq!(cfg.speed.tick_rate_ms, 16);
    }
}
