/// The active play field and its per-tick state machine.
///
/// Tick order:
///   1. Warm-up gate (simulation and audio frozen for 120 ticks;
///      the clean track starts exactly at the threshold)
///   2. Audio idle-loop safety net
///   3. Action collection (consistent snapshot: every thing decides
///      before anything applies)
///   4. Level glitch flag = union of glitch requests
///   5. Collision + boundary pass, then apply each action
///   6. Audio desync cycle (clean vs. glitched track)
///   7. Transition code: 0 = keep running, N = load level N
///
/// Gameplay consequences (reload, advance, push) only fire for pairs
/// involving the player; other overlaps are inert. Collision order
/// follows entity-list order and is intentionally list-order-dependent.

use std::time::Duration;

use log::info;
use thiserror::Error;

use crate::domain::action::{Action, FrameInput, Move};
use crate::domain::physics;
use crate::domain::thing::Thing;
use crate::resources::Resources;

use super::audio::{AudioTransport, SilentTransport};

/// Pixels per grid cell.
pub const CELL_SCALE: u32 = 16;
/// Warm-up ticks before simulation and audio start.
pub const LOAD_TICKS: u32 = 120;
/// Ticks between glitched-track reseeks while desynced.
const DESYNC_TICKS: i32 = 15;
/// The reserved level-text symbol for the player spawn.
pub const PLAYER_SYMBOL: char = '@';

#[derive(Debug, Error)]
pub enum LevelError {
    #[error("no layout for level {0}")]
    MissingLayout(u32),
}

pub struct Level {
    number: u32,
    player: Option<usize>,
    things: Vec<Thing>,
    width: usize,
    height: usize,
    glitching: bool,
    load_tick: u32,
    pulse_tick: u32,
    desync_tick: i32,
    desync_anchor: Option<Duration>,
    music_volume: f32,
    music: Box<dyn AudioTransport>,
    glitch_music: Box<dyn AudioTransport>,
}

impl Level {
    /// Parse the level's text grid into entity instances.
    ///
    /// Newline ends a row and resets the column cursor. Each character
    /// maps through the prototype symbol table; unrecognized symbols
    /// are blank tiles. The player symbol spawns the input-controlled
    /// variant with energy preset to max. Pixel bounds derive from the
    /// widest row and the row count, plus one cell each.
    pub fn from_text(
        number: u32,
        res: &Resources,
        music: Box<dyn AudioTransport>,
        glitch_music: Box<dyn AudioTransport>,
        music_volume: f32,
    ) -> Result<Level, LevelError> {
        let layout = res
            .level(number)
            .ok_or(LevelError::MissingLayout(number))?;

        let mut things = Vec::new();
        let mut player = None;
        let (mut x, mut y) = (0usize, 0usize);
        let mut max_x = 0usize;

        for c in layout.chars() {
            if c == '\n' {
                max_x = max_x.max(x);
                x = 0;
                y += 1;
                continue;
            }
            if let Some(proto) = res.thing(c) {
                let girth = res
                    .sprite(&proto.name)
                    .map(|s| (s.width, s.height))
                    .unwrap_or((0, 0));
                let px = (x as u32 * CELL_SCALE) as f64;
                let py = (y as u32 * CELL_SCALE) as f64;
                if c == PLAYER_SYMBOL {
                    player = Some(things.len());
                    things.push(Thing::spawn_player(proto, girth, px, py));
                } else {
                    things.push(Thing::spawn(proto, girth, px, py));
                }
            }
            x += 1;
        }
        max_x = max_x.max(x);

        info!("level {number}: {} things, {}x{} cells", things.len(), max_x + 1, y + 1);

        Ok(Level {
            number,
            player,
            things,
            width: max_x + 1,
            height: y + 1,
            glitching: false,
            load_tick: 0,
            pulse_tick: 0,
            desync_tick: DESYNC_TICKS,
            desync_anchor: None,
            music_volume,
            music,
            glitch_music,
        })
    }

    /// One simulation tick. Returns the transition code: 0 to keep
    /// running, otherwise the number of the level to load next.
    pub fn update(&mut self, input: &FrameInput) -> u32 {
        if self.load_tick < LOAD_TICKS {
            self.load_tick += 1;
            return 0;
        } else if self.load_tick == LOAD_TICKS {
            self.music.set_volume(self.music_volume);
            self.music.play();
            self.load_tick += 1;
        }

        // Neither track advancing: park the clean one at the start.
        if !self.music.is_playing() && !self.glitch_music.is_playing() {
            self.music.set_position(Duration::ZERO);
        }

        let mut actions: Vec<Action> = Vec::new();
        for i in 0..self.things.len() {
            if let Some(mut a) = self.things[i].update(input) {
                a.actor = i;
                actions.push(a);
            }
        }

        self.glitching = actions.iter().any(|a| a.glitch);

        for mut a in actions {
            if let Some(code) = self.resolve(&mut a) {
                return code;
            }
            let glitching = self.glitching;
            self.things[a.actor].execute_action(&a, glitching);
        }

        self.drive_audio();

        if self.glitching {
            self.pulse_tick = self.pulse_tick.wrapping_add(1);
        } else {
            self.pulse_tick = 0;
        }

        0
    }

    /// Collision and boundary pass for one action. Returns the
    /// transition code if the action ended the level.
    fn resolve(&mut self, a: &mut Action) -> Option<u32> {
        let actor = a.actor;
        let mv = a.mv.as_mut()?;

        let mut collided = false;
        for i in 0..self.things.len() {
            if i == actor {
                continue;
            }
            // A glitching mover phases through anything that does not
            // block glitch.
            if self.things[actor].is_glitching() && !self.things[i].is_block_glitch() {
                continue;
            }
            let player_involved = self.player == Some(i) || self.player == Some(actor);
            if physics::has_collision(&self.things[actor], &self.things[i], mv) && player_involved
            {
                collided = true;
                let actor_is_player = self.player == Some(actor);

                if (self.things[i].is_enemy() && actor_is_player)
                    || (self.player == Some(i) && self.things[actor].is_enemy())
                {
                    self.music.close();
                    self.glitch_music.close();
                    return Some(self.number);
                }
                if self.things[i].is_exit() && actor_is_player {
                    self.music.close();
                    self.glitch_music.close();
                    return Some(self.number + 1);
                }
                if self.things[i].is_block() {
                    mv.vx = 0.0;
                    mv.vy = 0.0;
                } else if self.player == Some(i)
                    && (!self.things[i].is_glitching() || self.things[i].is_block_glitch())
                {
                    // Something pushed into the player: forward the
                    // shove onto the player directly.
                    let push = Action {
                        actor: i,
                        mv: Some(Move::with_velocity(mv.vx, mv.vy)),
                        glitch: false,
                    };
                    let glitching = self.glitching;
                    self.things[i].execute_action(&push, glitching);
                }
            }
        }

        if !collided {
            let (ax, ay) = self.things[actor].position();
            let max_x = (self.width as u32 * CELL_SCALE) as f64;
            let max_y = (self.height as u32 * CELL_SCALE) as f64;
            // Out-of-bounds prospects snap to the nearest edge instead
            // of letting velocity carry the thing out.
            if mv.vx + ax < 0.0 {
                mv.y = ay;
                mv.x = 0.0;
            } else if mv.vx + ax > max_x {
                mv.y = ay;
                mv.x = ((self.width as u32 - 1) * CELL_SCALE) as f64;
            }
            if mv.vy + ay < 0.0 {
                mv.x = ax;
                mv.y = 0.0;
            } else if mv.vy + ay > max_y {
                mv.x = ax;
                mv.y = ((self.height as u32 - 1) * CELL_SCALE) as f64;
            }
        }

        None
    }

    /// Dual-track desync cycle. Entering the glitch pauses the clean
    /// track and starts the glitched one at the latched clean
    /// position; every 15 ticks the glitched track reseeks to the
    /// latch, producing the stutter. Leaving the glitch resets the
    /// cycle and resumes the clean track.
    fn drive_audio(&mut self) {
        if self.glitching {
            if self.desync_anchor.map_or(true, |p| p.is_zero()) {
                self.desync_tick = DESYNC_TICKS;
                self.music.pause();
                self.glitch_music.play();
                let at = self.music.position();
                self.glitch_music.set_position(at);
                self.desync_anchor = Some(at);
            }
            self.desync_tick -= 1;
            if self.desync_tick <= 0 {
                self.desync_tick = DESYNC_TICKS;
                if let Some(anchor) = self.desync_anchor {
                    self.glitch_music.set_position(anchor);
                }
            }
        } else {
            self.desync_tick = DESYNC_TICKS;
            self.desync_anchor = None;
            self.glitch_music.pause();
            self.music.play();
        }
    }

    // ── Queries for the driver and renderer ──

    pub fn number(&self) -> u32 {
        self.number
    }

    pub fn things(&self) -> &[Thing] {
        &self.things
    }

    pub fn player(&self) -> Option<&Thing> {
        self.player.map(|i| &self.things[i])
    }

    pub fn is_glitching(&self) -> bool {
        self.glitching
    }

    pub fn warming_up(&self) -> bool {
        self.load_tick < LOAD_TICKS
    }

    pub fn pulse_tick(&self) -> u32 {
        self.pulse_tick
    }

    /// Grid size in cells.
    pub fn size(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    /// Hand the shared clean transport back to the driver; a silent
    /// placeholder takes its spot in this (about to be discarded)
    /// level.
    pub fn eject_music(&mut self) -> Box<dyn AudioTransport> {
        std::mem::replace(&mut self.music, Box::new(SilentTransport::new()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::thing::{Behavior, ThingProto};
    use std::path::Path;

    const IDLE: FrameInput = FrameInput {
        horizontal: 0.0,
        vertical: 0.0,
        glitch: false,
    };

    const HOLD_GLITCH: FrameInput = FrameInput {
        horizontal: 0.0,
        vertical: 0.0,
        glitch: true,
    };

    fn proto(name: &str, symbol: char) -> ThingProto {
        ThingProto {
            name: name.to_string(),
            symbol,
            enemy: false,
            block: false,
            block_glitch: false,
            speed: 1.0,
            energy: 0,
            exit: false,
            behavior: Behavior::None,
        }
    }

    fn player_at(x: f64, y: f64) -> Thing {
        let mut p = proto("player", '@');
        p.energy = 100;
        p.speed = 2.0;
        Thing::spawn_player(&p, (16, 16), x, y)
    }

    /// A level already past warm-up, clean track running, on a w×h
    /// cell grid. Number is 3 so reload/advance codes are visible.
    fn running_level(
        things: Vec<Thing>,
        player: Option<usize>,
        w: usize,
        h: usize,
    ) -> (Level, SilentTransport, SilentTransport) {
        let mut clean = SilentTransport::new();
        clean.play();
        let glitched = SilentTransport::new();
        let level = Level {
            number: 3,
            player,
            things,
            width: w,
            height: h,
            glitching: false,
            load_tick: LOAD_TICKS + 1,
            pulse_tick: 0,
            desync_tick: DESYNC_TICKS,
            desync_anchor: None,
            music_volume: 0.4,
            music: Box::new(clean.clone()),
            glitch_music: Box::new(glitched.clone()),
        };
        (level, clean, glitched)
    }

    // ── Loading ──

    #[test]
    fn loads_embedded_layout() {
        let res = Resources::load(Path::new("/nonexistent")).unwrap();
        let level = Level::from_text(
            1,
            &res,
            Box::new(SilentTransport::new()),
            Box::new(SilentTransport::new()),
            0.4,
        )
        .unwrap();
        assert!(level.player().is_some());
        let (w, h) = level.size();
        assert!(w > 1 && h > 1);
    }

    #[test]
    fn missing_layout_is_fatal() {
        let res = Resources::load(Path::new("/nonexistent")).unwrap();
        let err = Level::from_text(
            99,
            &res,
            Box::new(SilentTransport::new()),
            Box::new(SilentTransport::new()),
            0.4,
        );
        assert!(err.is_err());
    }

    // ── Warm-up gate ──

    #[test]
    fn warmup_freezes_simulation_then_starts_music() {
        let res = Resources::load(Path::new("/nonexistent")).unwrap();
        let clean = SilentTransport::new();
        let glitched = SilentTransport::new();
        let mut level = Level::from_text(
            1,
            &res,
            Box::new(clean.clone()),
            Box::new(glitched.clone()),
            0.4,
        )
        .unwrap();

        for _ in 0..LOAD_TICKS {
            assert_eq!(level.update(&IDLE), 0);
            assert!(!clean.is_playing());
        }
        assert!(!level.warming_up());
        level.update(&IDLE);
        assert!(clean.is_playing());
        assert_eq!(clean.volume(), 0.4);
        assert!(!glitched.is_playing());
    }

    // ── Collision consequences ──

    #[test]
    fn player_into_enemy_reloads_and_closes_audio() {
        let mut enemy = proto("drone", 'd');
        enemy.enemy = true;
        let things = vec![
            player_at(16.0, 16.0),
            Thing::spawn(&enemy, (16, 16), 24.0, 16.0),
        ];
        let (mut level, clean, glitched) = running_level(things, Some(0), 8, 8);

        let input = FrameInput {
            horizontal: 1.0,
            vertical: 0.0,
            glitch: false,
        };
        assert_eq!(level.update(&input), 3);
        assert!(clean.is_closed());
        assert!(glitched.is_closed());
    }

    #[test]
    fn enemy_into_player_reloads_too() {
        let mut enemy = proto("drone", 'd');
        enemy.enemy = true;
        enemy.behavior = Behavior::Left;
        let things = vec![
            Thing::spawn(&enemy, (16, 16), 24.0, 16.0),
            player_at(16.0, 16.0),
        ];
        let (mut level, _, _) = running_level(things, Some(1), 8, 8);
        assert_eq!(level.update(&IDLE), 3);
    }

    #[test]
    fn player_into_exit_advances() {
        let mut exit = proto("exit", 'E');
        exit.exit = true;
        let things = vec![
            player_at(16.0, 16.0),
            Thing::spawn(&exit, (16, 16), 24.0, 16.0),
        ];
        let (mut level, clean, glitched) = running_level(things, Some(0), 8, 8);

        let input = FrameInput {
            horizontal: 1.0,
            vertical: 0.0,
            glitch: false,
        };
        assert_eq!(level.update(&input), 4);
        assert!(clean.is_closed());
        assert!(glitched.is_closed());
    }

    #[test]
    fn block_zeroes_the_move() {
        let mut wall = proto("wall", '#');
        wall.block = true;
        wall.block_glitch = true;
        let things = vec![
            player_at(16.0, 16.0),
            Thing::spawn(&wall, (16, 16), 24.0, 16.0),
        ];
        let (mut level, _, _) = running_level(things, Some(0), 8, 8);

        let input = FrameInput {
            horizontal: 1.0,
            vertical: 0.0,
            glitch: false,
        };
        assert_eq!(level.update(&input), 0);
        assert_eq!(level.things()[0].position(), (16.0, 16.0));
    }

    #[test]
    fn glitching_player_phases_through_non_blockglitch() {
        let mut gate = proto("gate", '%');
        gate.block = true; // blocks normally, but block_glitch is false
        let things = vec![
            player_at(16.0, 16.0),
            Thing::spawn(&gate, (16, 16), 24.0, 16.0),
        ];
        let (mut level, _, _) = running_level(things, Some(0), 8, 8);

        // First glitch tick: the flag lands on the player at execute
        // time, after this tick's collision pass.
        level.update(&HOLD_GLITCH);
        assert!(level.things()[0].is_glitching());

        let push = FrameInput {
            horizontal: 1.0,
            vertical: 0.0,
            glitch: true,
        };
        assert_eq!(level.update(&push), 0);
        // The pair was skipped outright: the move went through.
        assert_eq!(level.things()[0].position(), (18.0, 16.0));
    }

    #[test]
    fn blockglitch_wall_stops_even_a_glitching_player() {
        let mut wall = proto("wall", '#');
        wall.block = true;
        wall.block_glitch = true;
        let things = vec![
            player_at(16.0, 16.0),
            Thing::spawn(&wall, (16, 16), 24.0, 16.0),
        ];
        let (mut level, _, _) = running_level(things, Some(0), 8, 8);

        level.update(&HOLD_GLITCH);
        let push = FrameInput {
            horizontal: 1.0,
            vertical: 0.0,
            glitch: true,
        };
        level.update(&push);
        assert_eq!(level.things()[0].position(), (16.0, 16.0));
    }

    #[test]
    fn non_player_overlaps_are_inert() {
        let mut enemy = proto("drone", 'd');
        enemy.enemy = true;
        enemy.behavior = Behavior::Left;
        let mut other = proto("creeper", 'c');
        other.enemy = true;
        other.behavior = Behavior::Right;
        let things = vec![
            Thing::spawn(&enemy, (16, 16), 32.0, 16.0),
            Thing::spawn(&other, (16, 16), 40.0, 16.0),
        ];
        let (mut level, clean, _) = running_level(things, None, 8, 8);

        for _ in 0..5 {
            assert_eq!(level.update(&IDLE), 0);
        }
        assert!(!clean.is_closed());
    }

    #[test]
    fn mover_pushes_into_player() {
        let mut crate_ = proto("crate", 'x');
        crate_.behavior = Behavior::Right;
        let things = vec![
            Thing::spawn(&crate_, (16, 16), 0.0, 16.0),
            player_at(8.0, 16.0),
        ];
        let (mut level, _, _) = running_level(things, Some(1), 8, 8);

        level.update(&IDLE);
        // The crate's shove was forwarded: the player moved by its own
        // speed (2), on top of its idle zero-move.
        let (px, _) = level.things()[1].position();
        assert_eq!(px, 10.0);
    }

    // ── Boundary clamping ──

    #[test]
    fn edges_clamp_by_snapping() {
        // 4×4 cells → pixel bounds [0, 64].
        let things = vec![player_at(0.0, 16.0)];
        let (mut level, _, _) = running_level(things, Some(0), 4, 4);
        let left = FrameInput {
            horizontal: -1.0,
            vertical: 0.0,
            glitch: false,
        };
        level.update(&left);
        assert_eq!(level.things()[0].position(), (0.0, 16.0));

        let things = vec![player_at(63.5, 16.0)];
        let (mut level, _, _) = running_level(things, Some(0), 4, 4);
        let right = FrameInput {
            horizontal: 1.0,
            vertical: 0.0,
            glitch: false,
        };
        level.update(&right);
        assert_eq!(level.things()[0].position(), (48.0, 16.0));

        let things = vec![player_at(16.0, 0.0)];
        let (mut level, _, _) = running_level(things, Some(0), 4, 4);
        let up = FrameInput {
            horizontal: 0.0,
            vertical: -1.0,
            glitch: false,
        };
        level.update(&up);
        assert_eq!(level.things()[0].position(), (16.0, 0.0));

        let things = vec![player_at(16.0, 63.5)];
        let (mut level, _, _) = running_level(things, Some(0), 4, 4);
        let down = FrameInput {
            horizontal: 0.0,
            vertical: 1.0,
            glitch: false,
        };
        level.update(&down);
        assert_eq!(level.things()[0].position(), (16.0, 48.0));
    }

    /// At the exact origin the clamp writes a (0, 0) snap, which the
    /// move applier reads as "no snap" and falls back to velocity —
    /// the one spot where a thing can slip past the edge for a tick.
    /// Downstream behavior depends on the snap encoding; documented
    /// here rather than corrected.
    #[test]
    fn origin_corner_zero_snap_quirk() {
        let things = vec![player_at(0.0, 0.0)];
        let (mut level, _, _) = running_level(things, Some(0), 4, 4);
        let left = FrameInput {
            horizontal: -1.0,
            vertical: 0.0,
            glitch: false,
        };
        level.update(&left);
        let (px, _) = level.things()[0].position();
        assert_eq!(px, -2.0);
    }

    // ── Glitch state and history replay at level scale ──

    #[test]
    fn glitch_flag_follows_requests() {
        let things = vec![player_at(32.0, 32.0)];
        let (mut level, _, _) = running_level(things, Some(0), 8, 8);
        level.update(&HOLD_GLITCH);
        assert!(level.is_glitching());
        assert!(level.pulse_tick() > 0);
        level.update(&IDLE);
        assert!(!level.is_glitching());
        assert_eq!(level.pulse_tick(), 0);
    }

    #[test]
    fn bystander_replays_history_while_level_glitches() {
        let mut drone = proto("drone", 'd');
        drone.behavior = Behavior::Left;
        let things = vec![
            player_at(32.0, 96.0),
            Thing::spawn(&drone, (16, 16), 96.0, 16.0),
        ];
        let (mut level, _, _) = running_level(things, Some(0), 16, 16);

        // Two live ticks record (96,16) and (95,16).
        level.update(&IDLE);
        level.update(&IDLE);
        assert_eq!(level.things()[1].position(), (94.0, 16.0));

        // Player glitches: the drone re-walks its record instead of
        // continuing left.
        level.update(&HOLD_GLITCH);
        assert_eq!(level.things()[1].position(), (96.0, 16.0));
        level.update(&HOLD_GLITCH);
        assert_eq!(level.things()[1].position(), (95.0, 16.0));
    }

    // ── Audio desync cycle ──

    #[test]
    fn desync_pauses_clean_and_latches_glitched() {
        let things = vec![player_at(32.0, 32.0)];
        let (mut level, clean, glitched) = running_level(things, Some(0), 8, 8);
        clean.clone().set_position(Duration::from_secs(2));

        level.update(&HOLD_GLITCH);
        assert!(!clean.is_playing());
        assert!(glitched.is_playing());
        assert_eq!(glitched.position(), Duration::from_secs(2));

        // Let the glitched track drift, then wait out the countdown:
        // it reseeks to the latched position.
        glitched.clone().set_position(Duration::from_secs(9));
        for _ in 0..DESYNC_TICKS {
            level.update(&HOLD_GLITCH);
        }
        assert_eq!(glitched.position(), Duration::from_secs(2));

        // Glitch ends: glitched pauses, clean resumes.
        level.update(&IDLE);
        assert!(clean.is_playing());
        assert!(!glitched.is_playing());
    }

    #[test]
    fn idle_loop_rewinds_clean_track() {
        let things = vec![player_at(32.0, 32.0)];
        let (mut level, clean, _) = running_level(things, Some(0), 8, 8);
        clean.clone().set_position(Duration::from_secs(7));
        clean.clone().pause();

        level.update(&IDLE);
        assert_eq!(clean.position(), Duration::ZERO);
    }
}
