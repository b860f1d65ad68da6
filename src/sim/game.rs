/// Top-level driver: owns the one active level, swaps it on
/// transition signals, and carries the shared clean transport across
/// the swap. The glitched track is rebuilt per level from a resampled
/// rendering of the score.

use log::info;
use thiserror::Error;

use crate::domain::action::FrameInput;
use crate::resources::Resources;

use super::audio::{AudioTransport, TransportError, TransportFactory};
use super::level::{Level, LevelError};

const MAIN_SCORE: &str = "main";
/// Volume of the clean track before the first warm-up drops it to the
/// configured level.
const INTRO_VOLUME: f32 = 0.5;

#[derive(Debug, Error)]
pub enum GameError {
    #[error(transparent)]
    Level(#[from] LevelError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("no score named '{0}'")]
    MissingScore(String),
}

/// Knobs the driver needs from the config.
#[derive(Clone, Copy, Debug)]
pub struct GameRules {
    /// Advancing to this level number wraps around to level 1.
    pub terminal_level: u32,
    pub music_volume: f32,
    pub glitch_volume: f32,
    /// Target rate of the glitched score rendering.
    pub resample_hz: u32,
}

pub struct Game {
    resources: Resources,
    factory: Box<dyn TransportFactory>,
    level: Level,
    rules: GameRules,
}

impl Game {
    pub fn new(
        resources: Resources,
        factory: Box<dyn TransportFactory>,
        rules: GameRules,
    ) -> Result<Game, GameError> {
        let score = resources
            .music(MAIN_SCORE)
            .ok_or_else(|| GameError::MissingScore(MAIN_SCORE.to_string()))?;
        let music = factory.open(score, INTRO_VOLUME)?;
        let level = build_level(1, &resources, &*factory, music, &rules)?;
        Ok(Game {
            resources,
            factory,
            level,
            rules,
        })
    }

    /// One frame: tick the level, act on its transition code.
    pub fn tick(&mut self, input: &FrameInput) -> Result<(), GameError> {
        let code = self.level.update(input);
        if code != 0 {
            self.transition(code)?;
        }
        Ok(())
    }

    /// Reload the current level (the restart key).
    pub fn restart(&mut self) -> Result<(), GameError> {
        let number = self.level.number();
        self.transition(number)
    }

    fn transition(&mut self, code: u32) -> Result<(), GameError> {
        let next = if code == self.rules.terminal_level {
            1
        } else {
            code
        };
        info!("level transition: {} -> {}", self.level.number(), next);
        let music = self.level.eject_music();
        self.level = build_level(next, &self.resources, &*self.factory, music, &self.rules)?;
        Ok(())
    }

    pub fn level(&self) -> &Level {
        &self.level
    }

    pub fn resources(&self) -> &Resources {
        &self.resources
    }
}

fn build_level(
    number: u32,
    resources: &Resources,
    factory: &dyn TransportFactory,
    music: Box<dyn AudioTransport>,
    rules: &GameRules,
) -> Result<Level, GameError> {
    let score = resources
        .music(MAIN_SCORE)
        .ok_or_else(|| GameError::MissingScore(MAIN_SCORE.to_string()))?;
    let glitched = score.resampled(rules.resample_hz);
    let glitch_music = factory.open(&glitched, rules.glitch_volume)?;
    Ok(Level::from_text(
        number,
        resources,
        music,
        glitch_music,
        rules.music_volume,
    )?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::audio::SilentMixer;
    use std::path::Path;

    fn rules() -> GameRules {
        GameRules {
            terminal_level: 5,
            music_volume: 0.4,
            glitch_volume: 0.4,
            resample_hz: 48000,
        }
    }

    fn game() -> Game {
        let resources = Resources::load(Path::new("/nonexistent")).unwrap();
        Game::new(resources, Box::new(SilentMixer), rules()).unwrap()
    }

    #[test]
    fn starts_on_level_one() {
        let g = game();
        assert_eq!(g.level().number(), 1);
        assert!(g.level().player().is_some());
    }

    #[test]
    fn advance_loads_the_next_level() {
        let mut g = game();
        g.transition(2).unwrap();
        assert_eq!(g.level().number(), 2);
    }

    #[test]
    fn terminal_level_wraps_to_one() {
        let mut g = game();
        g.transition(3).unwrap();
        g.transition(5).unwrap();
        assert_eq!(g.level().number(), 1);
    }

    #[test]
    fn restart_rebuilds_the_same_level() {
        let mut g = game();
        g.transition(2).unwrap();
        g.restart().unwrap();
        assert_eq!(g.level().number(), 2);
    }

    #[test]
    fn transition_to_unknown_level_is_fatal() {
        let mut g = game();
        assert!(g.transition(42).is_err());
    }

    #[test]
    fn warmup_runs_after_a_swap() {
        let mut g = game();
        g.transition(2).unwrap();
        assert!(g.level().warming_up());
    }
}
