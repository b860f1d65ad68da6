/// Things: every simulated entity on the grid — player, enemies,
/// blocks, exits, scenery — shares one data layout. The controller tag
/// picks who decides the per-tick action: scripted behaviors for level
/// furniture, the frame input snapshot for the player.

use serde::Deserialize;

use super::action::{Action, FrameInput, Move};
use super::history::History;

/// Fixed per-tick drift for scripted things.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Behavior {
    #[default]
    None,
    Left,
    Right,
    Down,
}

/// Who produces this thing's action each tick.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Controller {
    Script,
    Input,
}

/// Prototype record, one TOML file per thing kind (see assets/things/).
/// `energy` is the maximum; spawned instances start empty, the player
/// starts full.
#[derive(Clone, Debug, Deserialize)]
pub struct ThingProto {
    pub name: String,
    pub symbol: char,
    #[serde(default)]
    pub enemy: bool,
    #[serde(default)]
    pub block: bool,
    #[serde(default)]
    pub block_glitch: bool,
    #[serde(default = "default_speed")]
    pub speed: f64,
    #[serde(default)]
    pub energy: i32,
    #[serde(default)]
    pub exit: bool,
    #[serde(default)]
    pub behavior: Behavior,
}

fn default_speed() -> f64 {
    1.0
}

#[derive(Clone, Debug)]
pub struct Thing {
    name: String,
    enemy: bool,
    block: bool,
    block_glitch: bool,
    speed: f64,
    max_energy: i32,
    exit: bool,
    behavior: Behavior,
    controller: Controller,
    x: f64,
    y: f64,
    width: u32,
    height: u32,
    history: History,
    energy: i32,
    glitching: bool,
    cooldown: bool,
}

impl Thing {
    /// Independent instance from a prototype; girth comes from the
    /// prototype's sprite. History is always fresh, never shared.
    pub fn spawn(proto: &ThingProto, girth: (u32, u32), x: f64, y: f64) -> Self {
        Thing {
            name: proto.name.clone(),
            enemy: proto.enemy,
            block: proto.block,
            block_glitch: proto.block_glitch,
            speed: proto.speed,
            max_energy: proto.energy,
            exit: proto.exit,
            behavior: proto.behavior,
            controller: Controller::Script,
            x,
            y,
            width: girth.0,
            height: girth.1,
            history: History::new(),
            energy: 0,
            glitching: false,
            cooldown: false,
        }
    }

    /// The distinguished player instance: input-controlled, energy
    /// preset to max.
    pub fn spawn_player(proto: &ThingProto, girth: (u32, u32), x: f64, y: f64) -> Self {
        let mut t = Thing::spawn(proto, girth, x, y);
        t.controller = Controller::Input;
        t.energy = t.max_energy;
        t
    }

    // ── Capability queries ──

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn position(&self) -> (f64, f64) {
        (self.x, self.y)
    }

    pub fn girth(&self) -> (f64, f64) {
        (self.width as f64, self.height as f64)
    }

    pub fn is_glitching(&self) -> bool {
        self.glitching
    }

    pub fn is_block(&self) -> bool {
        self.block
    }

    pub fn is_block_glitch(&self) -> bool {
        self.block_glitch
    }

    pub fn is_enemy(&self) -> bool {
        self.enemy
    }

    pub fn is_exit(&self) -> bool {
        self.exit
    }

    pub fn energy(&self) -> i32 {
        self.energy
    }

    pub fn max_energy(&self) -> i32 {
        self.max_energy
    }

    pub fn on_cooldown(&self) -> bool {
        self.cooldown
    }

    /// Point-in-rect test, meaningful for block things only.
    #[allow(dead_code)]
    pub fn has_collision(&self, x: f64, y: f64) -> bool {
        if !self.block {
            return false;
        }
        x >= self.x
            && x <= self.x + self.width as f64
            && y >= self.y
            && y <= self.y + self.height as f64
    }

    // ── Per-tick decision ──

    /// Advance timers and produce this tick's action.
    ///
    /// Energy drains 1/tick while glitching and regenerates 1/tick
    /// otherwise; hitting empty while glitching ends the glitch and
    /// wipes the replay buffer. Cooldown releases only at full energy.
    pub fn update(&mut self, input: &FrameInput) -> Option<Action> {
        if self.cooldown && self.energy >= self.max_energy {
            self.cooldown = false;
        }
        if self.glitching && self.energy <= 0 {
            self.glitching = false;
            self.history.clear();
        } else if self.glitching {
            self.energy -= 1;
        } else if self.energy < self.max_energy {
            self.energy += 1;
        }
        match self.controller {
            Controller::Script => self.scripted_action(),
            Controller::Input => Some(self.input_action(input)),
        }
    }

    fn scripted_action(&self) -> Option<Action> {
        match self.behavior {
            Behavior::Left => Some(Action::moving(Move::with_velocity(-1.0, 0.0))),
            Behavior::Right => Some(Action::moving(Move::with_velocity(1.0, 0.0))),
            Behavior::Down => Some(Action::moving(Move::with_velocity(0.0, 1.0))),
            Behavior::None => None,
        }
    }

    fn input_action(&mut self, input: &FrameInput) -> Action {
        let mv = Move::with_velocity(input.horizontal, input.vertical);
        let mut glitch = false;
        if input.glitch && !self.cooldown {
            glitch = true;
            // Held past depletion: lock out until refilled.
            if self.energy <= 0 {
                self.cooldown = true;
            }
        } else if self.energy < self.max_energy {
            // Released early: same lockout.
            self.cooldown = true;
        }
        Action {
            actor: 0,
            mv: Some(mv),
            glitch,
        }
    }

    // ── Applying the tick ──

    /// Apply (or substitute) this tick's action.
    ///
    /// Substitution happens only when the level as a whole is glitching
    /// and this thing itself is not: the thing then re-walks its
    /// recorded history. Otherwise the current position is recorded
    /// first — that is what fills the replay buffer. Glitch requests
    /// themselves are never recorded, only where we stood.
    pub fn execute_action(&mut self, a: &Action, level_glitching: bool) {
        self.glitching = a.glitch;

        let replay = level_glitching && !self.glitching;
        let mut mv = a.mv;
        if replay {
            if let Some(recorded) = self.history.replay() {
                mv = Some(recorded);
            }
        } else {
            self.history.record(Move::snap(self.x, self.y));
        }

        if let Some(m) = mv {
            self.apply_move(&m);
        }
    }

    fn apply_move(&mut self, m: &Move) {
        if m.x != 0.0 || m.y != 0.0 {
            self.x = m.x;
            self.y = m.y;
            return;
        }
        self.x += m.vx * self.speed;
        self.y += m.vy * self.speed;
    }

    #[cfg(test)]
    pub fn history_len(&self) -> usize {
        self.history.len()
    }
}
