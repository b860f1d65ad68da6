/// Presentation layer: double-buffered, diff-based terminal renderer.
///
/// How it works:
///   1. Build the next frame into `front` buffer (array of Cell)
///   2. Compare each cell with `back` buffer (previous frame)
///   3. Only emit terminal commands for cells that changed
///   4. All commands are batched with `queue!`, flushed once at the end
///   5. Swap front/back
///
/// This eliminates flicker caused by full-screen redraws.
///
/// During warm-up the frame stays black. While the level glitches the
/// whole scene tints green and jitters one column on even pulse ticks
/// — the terminal stand-in for the original's rotation flicker.

use std::io::{self, BufWriter, Write};

use crossterm::{
    cursor::{self, MoveTo},
    execute, queue,
    style::{Color, Print, ResetColor, SetBackgroundColor, SetForegroundColor},
    terminal::{self, Clear, ClearType},
};

use crate::sim::game::Game;
use crate::sim::level::CELL_SCALE;

// ── Cell: the unit of the back-buffer ──

#[derive(Clone, Copy, PartialEq, Eq)]
struct Cell {
    ch: char,
    fg: Color,
    bg: Color,
}

impl Cell {
    /// Explicit dark background for all "empty" terminal cells, so the
    /// inter-row gap color matches the cell color on VTE terminals.
    const BASE_BG: Color = Color::Rgb { r: 14, g: 16, b: 24 };

    const BLANK: Cell = Cell {
        ch: ' ',
        fg: Color::White,
        bg: Cell::BASE_BG,
    };

    /// Sentinel cell used to invalidate the back buffer.
    const INVALID: Cell = Cell {
        ch: '?',
        fg: Color::Magenta,
        bg: Color::Magenta,
    };

    fn from_char(ch: char, fg: Color) -> Self {
        Cell {
            ch,
            fg,
            bg: Cell::BASE_BG,
        }
    }
}

// ── FrameBuffer: a 2D grid of Cells ──

struct FrameBuffer {
    width: usize,
    height: usize,
    cells: Vec<Cell>,
}

impl FrameBuffer {
    fn new(w: usize, h: usize) -> Self {
        FrameBuffer {
            width: w,
            height: h,
            cells: vec![Cell::BLANK; w * h],
        }
    }

    fn resize(&mut self, w: usize, h: usize) {
        if self.width != w || self.height != h {
            self.width = w;
            self.height = h;
            self.cells = vec![Cell::BLANK; w * h];
        }
    }

    fn clear(&mut self) {
        self.cells.fill(Cell::BLANK);
    }

    fn set(&mut self, x: i32, y: i32, cell: Cell) {
        if x >= 0 && y >= 0 && (x as usize) < self.width && (y as usize) < self.height {
            self.cells[y as usize * self.width + x as usize] = cell;
        }
    }

    fn get(&self, x: usize, y: usize) -> Cell {
        if x < self.width && y < self.height {
            self.cells[y * self.width + x]
        } else {
            Cell::BLANK
        }
    }

    fn put_str(&mut self, x: i32, y: i32, s: &str, fg: Color) {
        let mut cx = x;
        for ch in s.chars() {
            self.set(cx, y, Cell::from_char(ch, fg));
            cx += 1;
        }
    }
}

// ── Renderer ──

/// Each game cell is 2 terminal columns wide.
const CELL_W: i32 = 2;
const HUD_ROW: i32 = 0;
const MAP_ROW: i32 = 2;

const GLITCH_TINT: Color = Color::Green;

pub struct Renderer {
    writer: BufWriter<io::Stdout>,
    front: FrameBuffer,
    back: FrameBuffer,
    term_w: usize,
    term_h: usize,
}

impl Renderer {
    pub fn new() -> Self {
        Renderer {
            writer: BufWriter::with_capacity(16384, io::stdout()),
            front: FrameBuffer::new(0, 0),
            back: FrameBuffer::new(0, 0),
            term_w: 0,
            term_h: 0,
        }
    }

    pub fn init(&mut self) -> io::Result<()> {
        terminal::enable_raw_mode()?;
        execute!(
            self.writer,
            terminal::EnterAlternateScreen,
            cursor::Hide,
            SetBackgroundColor(Cell::BASE_BG),
            Clear(ClearType::All)
        )?;

        let (tw, th) = terminal::size().unwrap_or((80, 24));
        self.term_w = tw as usize;
        self.term_h = th as usize;
        self.front.resize(self.term_w, self.term_h);
        self.back.resize(self.term_w, self.term_h);
        // Force full repaint on first frame: back ≠ front everywhere.
        self.back.cells.fill(Cell::INVALID);

        Ok(())
    }

    pub fn cleanup(&mut self) -> io::Result<()> {
        execute!(
            self.writer,
            ResetColor,
            cursor::Show,
            terminal::LeaveAlternateScreen
        )?;
        terminal::disable_raw_mode()
    }

    pub fn render(&mut self, game: &Game) -> io::Result<()> {
        // Detect terminal resize
        let (tw, th) = terminal::size().unwrap_or((80, 24));
        if tw as usize != self.term_w || th as usize != self.term_h {
            self.term_w = tw as usize;
            self.term_h = th as usize;
            self.front.resize(self.term_w, self.term_h);
            self.back.resize(self.term_w, self.term_h);
            self.back.cells.fill(Cell::INVALID);
            queue!(
                self.writer,
                SetBackgroundColor(Cell::BASE_BG),
                Clear(ClearType::All)
            )?;
        }

        self.front.clear();

        // Warm-up: black frame, nothing else.
        if !game.level().warming_up() {
            self.compose_level(game);
            self.compose_hud(game);
        }

        self.flush_diff()?;
        std::mem::swap(&mut self.front, &mut self.back);
        Ok(())
    }

    // ── Composition ──

    fn compose_level(&mut self, game: &Game) {
        let level = game.level();
        let (cells_w, cells_h) = level.size();
        let glitching = level.is_glitching();

        let mut off_x = (self.term_w as i32 - cells_w as i32 * CELL_W) / 2;
        let off_y = MAP_ROW
            + ((self.term_h as i32 - MAP_ROW - cells_h as i32) / 2).max(0);
        if glitching && level.pulse_tick() % 2 == 0 {
            off_x += 1;
        }

        for thing in level.things() {
            let sprite = match game.resources().sprite(thing.name()) {
                Some(s) => s,
                None => continue,
            };
            let (x, y) = thing.position();
            let cx = (x / CELL_SCALE as f64).round() as i32;
            let cy = (y / CELL_SCALE as f64).round() as i32;

            let fg = if glitching || thing.is_glitching() {
                GLITCH_TINT
            } else {
                color_from(&sprite.color)
            };

            for (ry, row) in sprite.rows.iter().enumerate() {
                for (rx, ch) in row.chars().enumerate() {
                    if ch == ' ' {
                        continue;
                    }
                    self.front.set(
                        off_x + (cx + rx as i32) * CELL_W,
                        off_y + cy + ry as i32,
                        Cell::from_char(ch, fg),
                    );
                }
            }

            self.compose_energy_bar(thing, off_x + cx * CELL_W, off_y + cy - 1);
        }
    }

    /// Four-column charge bar above a thing, shown only while the
    /// charge is partial. Green while glitching, red during cooldown.
    fn compose_energy_bar(&mut self, thing: &crate::domain::thing::Thing, x: i32, y: i32) {
        if thing.max_energy() == 0 || thing.energy() == thing.max_energy() {
            return;
        }
        let fg = if thing.is_glitching() {
            Color::Green
        } else if thing.on_cooldown() {
            Color::Red
        } else {
            Color::White
        };
        let filled =
            ((thing.energy() as f64 / thing.max_energy() as f64) * 4.0).round() as i32;
        for i in 0..4 {
            let ch = if i < filled { '▓' } else { '░' };
            self.front.set(x + i, y, Cell::from_char(ch, fg));
        }
    }

    fn compose_hud(&mut self, game: &Game) {
        let level = game.level();
        let fg = if level.is_glitching() {
            GLITCH_TINT
        } else {
            Color::DarkGrey
        };

        let energy = match level.player() {
            Some(p) => format!("CHARGE {}/{}", p.energy(), p.max_energy()),
            None => String::new(),
        };
        let status = if level.is_glitching() {
            "<<GLITCHING>>"
        } else {
            ""
        };
        let line = format!(
            " LEVEL {}   {}   {}  [SPACE] glitch  [F2] restart  [ESC] quit",
            level.number(),
            energy,
            status
        );
        self.front.put_str(0, HUD_ROW, &line, fg);
    }

    // ── Diff + emit ──

    fn flush_diff(&mut self) -> io::Result<()> {
        let mut last_fg = Color::White;
        let mut last_bg = Cell::BASE_BG;
        let mut need_move = true;
        let mut last_x: usize = 0;
        let mut last_y: usize = 0;

        // Set explicit base colors at start of frame. Not ResetColor:
        // the terminal's native default may differ from BASE_BG and
        // cause line artifacts.
        queue!(
            self.writer,
            SetForegroundColor(Color::White),
            SetBackgroundColor(Cell::BASE_BG),
        )?;

        for y in 0..self.front.height {
            for x in 0..self.front.width {
                let cell = self.front.get(x, y);
                let prev = self.back.get(x, y);

                if cell == prev {
                    need_move = true;
                    continue;
                }

                if need_move || x != last_x + 1 || y != last_y {
                    queue!(self.writer, MoveTo(x as u16, y as u16))?;
                    need_move = false;
                }

                if cell.fg != last_fg {
                    queue!(self.writer, SetForegroundColor(cell.fg))?;
                    last_fg = cell.fg;
                }
                if cell.bg != last_bg {
                    queue!(self.writer, SetBackgroundColor(cell.bg))?;
                    last_bg = cell.bg;
                }

                let mut buf = [0u8; 4];
                queue!(self.writer, Print(cell.ch.encode_utf8(&mut buf) as &str))?;

                last_x = x;
                last_y = y;
            }
        }

        self.writer.flush()
    }
}

fn color_from(name: &str) -> Color {
    match name {
        "red" => Color::Red,
        "green" => Color::Green,
        "yellow" => Color::Yellow,
        "blue" => Color::Blue,
        "magenta" => Color::Magenta,
        "cyan" => Color::Cyan,
        "grey" | "gray" => Color::Grey,
        "darkgrey" | "darkgray" => Color::DarkGrey,
        _ => Color::White,
    }
}
