/// Entry point and game loop.

mod config;
mod domain;
mod resources;
mod sim;
mod ui;

use std::time::{Duration, Instant};

use crossterm::event::KeyCode;
use log::info;

use config::GameConfig;
use domain::action::FrameInput;
use resources::Resources;
use sim::audio::{SilentMixer, TransportFactory};
use sim::game::{Game, GameRules};
use ui::gamepad::GamepadState;
use ui::input::InputState;
use ui::renderer::Renderer;
use ui::sound::AudioEngine;

const FRAME_SLEEP: Duration = Duration::from_millis(2);

fn main() {
    env_logger::init();
    let config = GameConfig::load();

    let resources = match Resources::load(&config.assets_dir) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Asset load failed: {e}");
            std::process::exit(1);
        }
    };

    let factory: Box<dyn TransportFactory> = match AudioEngine::new() {
        Some(engine) => Box::new(engine),
        None => {
            info!("no audio output, running silent");
            Box::new(SilentMixer)
        }
    };

    let rules = GameRules {
        terminal_level: config.terminal_level,
        music_volume: config.audio.music_volume,
        glitch_volume: config.audio.glitch_volume,
        resample_hz: config.audio.resample_hz,
    };

    let mut game = match Game::new(resources, factory, rules) {
        Ok(g) => g,
        Err(e) => {
            eprintln!("Game init failed: {e}");
            std::process::exit(1);
        }
    };

    let mut renderer = Renderer::new();
    if let Err(e) = renderer.init() {
        eprintln!("Terminal init failed: {e}");
        return;
    }

    let result = game_loop(&mut game, &mut renderer, &config);

    if let Err(e) = renderer.cleanup() {
        eprintln!("Terminal cleanup failed: {e}");
    }

    if let Err(e) = result {
        eprintln!("Game error: {e}");
        std::process::exit(1);
    }

    println!();
    println!("Thanks for playing Glitchrun!");
}

// ── Key Constants ──

const KEYS_LEFT: &[KeyCode] = &[KeyCode::Left, KeyCode::Char('a'), KeyCode::Char('A')];
const KEYS_RIGHT: &[KeyCode] = &[KeyCode::Right, KeyCode::Char('d'), KeyCode::Char('D')];
const KEYS_UP: &[KeyCode] = &[KeyCode::Up, KeyCode::Char('w'), KeyCode::Char('W')];
const KEYS_DOWN: &[KeyCode] = &[KeyCode::Down, KeyCode::Char('s'), KeyCode::Char('S')];
const KEYS_GLITCH: &[KeyCode] = &[KeyCode::Char(' ')];
const KEYS_RESTART: &[KeyCode] = &[KeyCode::F(2)];
const KEYS_QUIT: &[KeyCode] = &[KeyCode::Esc, KeyCode::Char('q'), KeyCode::Char('Q')];

fn game_loop(
    game: &mut Game,
    renderer: &mut Renderer,
    config: &GameConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut kb = InputState::new();
    let mut gp = GamepadState::new();
    gp.load_button_config(&config.gamepad);
    if gp.connected {
        info!("gamepad connected");
    }
    let mut last_tick = Instant::now();
    let tick_rate = Duration::from_millis(config.speed.tick_rate_ms);

    loop {
        kb.drain_events();
        gp.update();

        if kb.ctrl_c_pressed() || kb.any_pressed(KEYS_QUIT) || gp.quit_pressed() {
            break;
        }
        if kb.any_pressed(KEYS_RESTART) || gp.restart_pressed() {
            game.restart()?;
        }

        if last_tick.elapsed() >= tick_rate {
            let input = assemble_input(&kb, &gp);
            game.tick(&input)?;
            last_tick = Instant::now();
        }

        renderer.render(game)?;
        std::thread::sleep(FRAME_SLEEP);
    }

    Ok(())
}

/// Collapse keyboard + gamepad into the per-tick input snapshot.
/// Axes are exclusive: up beats down, left beats right.
fn assemble_input(kb: &InputState, gp: &GamepadState) -> FrameInput {
    let vertical = if kb.any_held(KEYS_UP) || gp.up_held() {
        -1.0
    } else if kb.any_held(KEYS_DOWN) || gp.down_held() {
        1.0
    } else {
        0.0
    };
    let horizontal = if kb.any_held(KEYS_LEFT) || gp.left_held() {
        -1.0
    } else if kb.any_held(KEYS_RIGHT) || gp.right_held() {
        1.0
    } else {
        0.0
    };

    FrameInput {
        horizontal,
        vertical,
        glitch: kb.any_held(KEYS_GLITCH) || gp.glitch_held(),
    }
}
