/// Audio transport contract consumed by the level simulation.
///
/// A level owns both of its tracks (clean + glitched) exclusively;
/// no other component may call play/pause/seek on them. The concrete
/// rodio-backed transport lives in `ui::sound`; the silent transport
/// here is the no-device fallback and the simulation test double.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use thiserror::Error;

use crate::resources::Score;

/// Failure opening a playback stream. Fatal at level-load time.
#[derive(Debug, Error)]
#[error("cannot open audio stream: {0}")]
pub struct TransportError(pub String);

pub trait AudioTransport {
    fn play(&mut self);
    fn pause(&mut self);
    fn set_volume(&mut self, volume: f32);
    fn set_position(&mut self, pos: Duration);
    fn position(&self) -> Duration;
    fn is_playing(&self) -> bool;
    /// Release the stream. A later `play` reopens it from the start;
    /// the shared clean track survives level transitions this way.
    fn close(&mut self);
}

/// Mints a transport for a score. Implemented by the rodio engine and
/// by `SilentMixer`.
pub trait TransportFactory {
    fn open(&self, score: &Score, volume: f32)
        -> Result<Box<dyn AudioTransport>, TransportError>;
}

// ── Silent fallback ──

/// Pure-state transport: tracks play/pause/position/volume without a
/// device. Clones share state, so a caller can keep a handle to a
/// transport it has handed over.
#[derive(Clone, Default)]
pub struct SilentTransport {
    state: Arc<Mutex<SilentState>>,
}

#[derive(Default)]
struct SilentState {
    playing: bool,
    position: Duration,
    volume: f32,
    closed: bool,
}

impl SilentTransport {
    pub fn new() -> Self {
        SilentTransport::default()
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().unwrap().closed
    }

    pub fn volume(&self) -> f32 {
        self.state.lock().unwrap().volume
    }
}

impl AudioTransport for SilentTransport {
    fn play(&mut self) {
        let mut s = self.state.lock().unwrap();
        if s.closed {
            s.closed = false;
            s.position = Duration::ZERO;
        }
        s.playing = true;
    }

    fn pause(&mut self) {
        self.state.lock().unwrap().playing = false;
    }

    fn set_volume(&mut self, volume: f32) {
        self.state.lock().unwrap().volume = volume;
    }

    fn set_position(&mut self, pos: Duration) {
        self.state.lock().unwrap().position = pos;
    }

    fn position(&self) -> Duration {
        self.state.lock().unwrap().position
    }

    fn is_playing(&self) -> bool {
        let s = self.state.lock().unwrap();
        s.playing && !s.closed
    }

    fn close(&mut self) {
        let mut s = self.state.lock().unwrap();
        s.playing = false;
        s.closed = true;
    }
}

pub struct SilentMixer;

impl TransportFactory for SilentMixer {
    fn open(
        &self,
        _score: &Score,
        volume: f32,
    ) -> Result<Box<dyn AudioTransport>, TransportError> {
        let mut t = SilentTransport::new();
        t.set_volume(volume);
        Ok(Box::new(t))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_state() {
        let mut a = SilentTransport::new();
        let b = a.clone();
        a.play();
        a.set_position(Duration::from_secs(3));
        assert!(b.is_playing());
        assert_eq!(b.position(), Duration::from_secs(3));
    }

    #[test]
    fn close_silences_play_reopens_from_start() {
        let mut t = SilentTransport::new();
        t.play();
        t.set_position(Duration::from_secs(5));
        t.close();
        assert!(!t.is_playing());
        assert!(t.is_closed());
        t.play();
        assert!(t.is_playing());
        assert_eq!(t.position(), Duration::ZERO);
    }
}
