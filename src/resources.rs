/// Resource provider: level layouts, thing prototypes, sprites, and
/// the musical score.
///
/// ## Sources (priority order):
///   1. `<assets_dir>/{levels,things,sprites}/` on disk
///   2. Built-in embedded copies of the same files
///
/// Levels are plain text grids (one character per tile, newline per
/// row). Things and sprites are TOML records; a thing's sprite is
/// looked up by the thing's name, and must exist — its pixel size is
/// the thing's collision girth. The score is generated procedurally at
/// load time.
///
/// Any parse failure or missing sprite is fatal at startup. An
/// unrecognized tile symbol at level-parse time is NOT an error: the
/// grid may intentionally contain blank tiles.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{info, warn};
use serde::Deserialize;
use thiserror::Error;

use crate::domain::thing::ThingProto;

#[derive(Debug, Error)]
pub enum ResourceError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("malformed thing record {path}: {source}")]
    ThingRecord {
        path: String,
        source: toml::de::Error,
    },
    #[error("malformed sprite record {path}: {source}")]
    SpriteRecord {
        path: String,
        source: toml::de::Error,
    },
    #[error("thing '{thing}' has no sprite named '{thing}'")]
    MissingSprite { thing: String },
}

/// Sized image handle: pixel dimensions drive collision girth, the
/// glyph rows and color drive the terminal rendering.
#[derive(Clone, Debug, Deserialize)]
pub struct Sprite {
    pub width: u32,
    pub height: u32,
    #[serde(default)]
    pub rows: Vec<String>,
    #[serde(default = "default_color")]
    pub color: String,
}

fn default_color() -> String {
    "white".to_string()
}

/// Decoded audio stream: mono samples plus the nominal playback rate.
#[derive(Clone)]
pub struct Score {
    samples: Arc<Vec<f32>>,
    sample_rate: u32,
}

impl Score {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Score {
            samples: Arc::new(samples),
            sample_rate,
        }
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Glitched rendering: stretch the sample grid to `target_hz`
    /// spacing while keeping the nominal rate. Played back unchanged,
    /// the score comes out slowed and detuned.
    pub fn resampled(&self, target_hz: u32) -> Score {
        let ratio = target_hz as f64 / self.sample_rate as f64;
        let n = (self.samples.len() as f64 * ratio) as usize;
        let mut out = Vec::with_capacity(n);
        for i in 0..n {
            let t = i as f64 / ratio;
            let i0 = t.floor() as usize;
            let frac = (t - t.floor()) as f32;
            let a = self.samples.get(i0).copied().unwrap_or(0.0);
            let b = self.samples.get(i0 + 1).copied().unwrap_or(a);
            out.push(a + (b - a) * frac);
        }
        Score {
            samples: Arc::new(out),
            sample_rate: self.sample_rate,
        }
    }
}

pub struct Resources {
    levels: HashMap<u32, String>,
    things: HashMap<char, ThingProto>,
    sprites: HashMap<String, Sprite>,
    scores: HashMap<String, Score>,
}

// ── Embedded fallback assets ──

const EMBEDDED_LEVELS: &[(u32, &str)] = &[
    (1, include_str!("../assets/levels/1.txt")),
    (2, include_str!("../assets/levels/2.txt")),
    (3, include_str!("../assets/levels/3.txt")),
    (4, include_str!("../assets/levels/4.txt")),
];

const EMBEDDED_THINGS: &[(&str, &str)] = &[
    ("player", include_str!("../assets/things/player.toml")),
    ("wall", include_str!("../assets/things/wall.toml")),
    ("gate", include_str!("../assets/things/gate.toml")),
    ("drone", include_str!("../assets/things/drone.toml")),
    ("creeper", include_str!("../assets/things/creeper.toml")),
    ("dropper", include_str!("../assets/things/dropper.toml")),
    ("exit", include_str!("../assets/things/exit.toml")),
    ("pillar", include_str!("../assets/things/pillar.toml")),
];

const EMBEDDED_SPRITES: &[(&str, &str)] = &[
    ("player", include_str!("../assets/sprites/player.toml")),
    ("wall", include_str!("../assets/sprites/wall.toml")),
    ("gate", include_str!("../assets/sprites/gate.toml")),
    ("drone", include_str!("../assets/sprites/drone.toml")),
    ("creeper", include_str!("../assets/sprites/creeper.toml")),
    ("dropper", include_str!("../assets/sprites/dropper.toml")),
    ("exit", include_str!("../assets/sprites/exit.toml")),
    ("pillar", include_str!("../assets/sprites/pillar.toml")),
];

impl Resources {
    /// Load everything. Disk files under `assets_dir` override the
    /// embedded copies; the embedded set alone is a complete game.
    pub fn load(assets_dir: &Path) -> Result<Resources, ResourceError> {
        let mut res = Resources {
            levels: HashMap::new(),
            things: HashMap::new(),
            sprites: HashMap::new(),
            scores: HashMap::new(),
        };

        for &(n, text) in EMBEDDED_LEVELS {
            res.levels.insert(n, text.to_string());
        }
        for &(name, text) in EMBEDDED_SPRITES {
            let sprite = parse_sprite(name, text)?;
            res.sprites.insert(name.to_string(), sprite);
        }
        for &(name, text) in EMBEDDED_THINGS {
            let proto = parse_thing(name, text)?;
            res.things.insert(proto.symbol, proto);
        }

        if assets_dir.is_dir() {
            res.load_dir(assets_dir)?;
        } else {
            info!("assets dir {} not found, using embedded set", assets_dir.display());
        }

        // Every prototype must resolve a same-named sprite: its pixel
        // size is the collision girth.
        for proto in res.things.values() {
            if !res.sprites.contains_key(&proto.name) {
                return Err(ResourceError::MissingSprite {
                    thing: proto.name.clone(),
                });
            }
        }

        res.scores.insert("main".to_string(), gen_score());

        info!(
            "resources loaded: {} levels, {} things, {} sprites",
            res.levels.len(),
            res.things.len(),
            res.sprites.len()
        );
        Ok(res)
    }

    fn load_dir(&mut self, dir: &Path) -> Result<(), ResourceError> {
        for (name, text) in read_dir_texts(&dir.join("sprites"), "toml")? {
            let sprite = parse_sprite(&name, &text)?;
            info!("loaded sprite {name}");
            self.sprites.insert(name, sprite);
        }
        for (name, text) in read_dir_texts(&dir.join("things"), "toml")? {
            let proto = parse_thing(&name, &text)?;
            info!("loaded thing {}", proto.name);
            self.things.insert(proto.symbol, proto);
        }
        for (name, text) in read_dir_texts(&dir.join("levels"), "txt")? {
            match name.parse::<u32>() {
                Ok(n) => {
                    info!("loaded level {n}");
                    self.levels.insert(n, text);
                }
                Err(_) => warn!("ignoring level file with non-numeric name: {name}"),
            }
        }
        Ok(())
    }

    // ── Provider contract ──

    pub fn level(&self, n: u32) -> Option<&str> {
        self.levels.get(&n).map(|s| s.as_str())
    }

    pub fn thing(&self, symbol: char) -> Option<&ThingProto> {
        self.things.get(&symbol)
    }

    pub fn sprite(&self, name: &str) -> Option<&Sprite> {
        self.sprites.get(name)
    }

    pub fn music(&self, name: &str) -> Option<&Score> {
        self.scores.get(name)
    }
}

/// Read every `*.ext` file in a directory as (stem, contents).
/// A missing directory is fine (embedded copies cover it); an
/// unreadable file is not.
fn read_dir_texts(dir: &Path, ext: &str) -> Result<Vec<(String, String)>, ResourceError> {
    let mut out = vec![];
    let entries = match std::fs::read_dir(dir) {
        Ok(e) => e,
        Err(_) => return Ok(out),
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.extension().map_or(false, |e| e == ext) {
            let text = std::fs::read_to_string(&path).map_err(|source| ResourceError::Io {
                path: path.clone(),
                source,
            })?;
            let stem = path
                .file_stem()
                .unwrap_or_default()
                .to_string_lossy()
                .to_string();
            out.push((stem, text));
        }
    }
    Ok(out)
}

fn parse_thing(name: &str, text: &str) -> Result<ThingProto, ResourceError> {
    toml::from_str(text).map_err(|source| ResourceError::ThingRecord {
        path: name.to_string(),
        source,
    })
}

fn parse_sprite(name: &str, text: &str) -> Result<Sprite, ResourceError> {
    toml::from_str(text).map_err(|source| ResourceError::SpriteRecord {
        path: name.to_string(),
        source,
    })
}

// ════════════════════════════════════════════════════════════
//  Score generator — the main theme, built at load time
// ════════════════════════════════════════════════════════════

const SCORE_RATE: u32 = 44100;

/// Eight-bar A-minor loop at 120 BPM: square-ish lead over a sine
/// bass, two samples mixed per frame.
fn gen_score() -> Score {
    // Note frequencies (Hz); 0.0 = rest.
    const A2: f32 = 110.0;
    const E3: f32 = 164.81;
    const F3: f32 = 174.61;
    const G3: f32 = 196.0;
    const A4: f32 = 440.0;
    const C5: f32 = 523.25;
    const D5: f32 = 587.33;
    const E5: f32 = 659.25;
    const G5: f32 = 783.99;

    let lead: [f32; 32] = [
        A4, 0.0, C5, A4, E5, 0.0, D5, C5, A4, 0.0, C5, D5, E5, G5, E5, D5, //
        C5, 0.0, A4, C5, D5, 0.0, C5, A4, E5, D5, C5, A4, G3 * 2.0, 0.0, A4, 0.0,
    ];
    let bass: [f32; 8] = [A2, A2, F3, F3, G3, G3, E3, E3];

    let beat = 0.25; // seconds per sixteenth at 120 BPM
    let samples_per_step = (SCORE_RATE as f32 * beat) as usize;
    let mut samples = Vec::with_capacity(samples_per_step * lead.len());

    for (step, &freq) in lead.iter().enumerate() {
        let bass_freq = bass[(step / 4) % bass.len()];
        for i in 0..samples_per_step {
            let t = i as f32 / SCORE_RATE as f32;
            let env = 1.0 - (i as f32 / samples_per_step as f32) * 0.6;
            let mut s = 0.0;
            if freq > 0.0 {
                // Square-ish: fundamental + 3rd harmonic.
                s += ((t * freq * 2.0 * std::f32::consts::PI).sin() * 0.7
                    + (t * freq * 3.0 * 2.0 * std::f32::consts::PI).sin() * 0.3)
                    * env
                    * 0.22;
            }
            s += (t * bass_freq * 2.0 * std::f32::consts::PI).sin() * 0.14;
            samples.push(s);
        }
    }

    Score::new(samples, SCORE_RATE)
}
