/// Music playback via rodio.
///
/// The engine owns one output stream; each transport is a sink fed
/// from an in-memory sample buffer. Seeking rebuilds the sink with a
/// skipped source, so position = base offset + sink playback time.
///
/// Compile without the "sound" feature to disable audio entirely —
/// `AudioEngine::new()` then reports no device and the game runs on
/// silent transports.

#[cfg(feature = "sound")]
mod inner {
    use std::sync::Arc;
    use std::time::Duration;

    use rodio::buffer::SamplesBuffer;
    use rodio::{OutputStream, OutputStreamHandle, Sink, Source};

    use crate::resources::Score;
    use crate::sim::audio::{AudioTransport, TransportError, TransportFactory};

    pub struct AudioEngine {
        _stream: OutputStream,
        handle: OutputStreamHandle,
    }

    impl AudioEngine {
        /// None when no output device is available; the caller falls
        /// back to silent transports.
        pub fn new() -> Option<Self> {
            let (stream, handle) = OutputStream::try_default().ok()?;
            Some(AudioEngine {
                _stream: stream,
                handle,
            })
        }
    }

    impl TransportFactory for AudioEngine {
        fn open(
            &self,
            score: &Score,
            volume: f32,
        ) -> Result<Box<dyn AudioTransport>, TransportError> {
            let player = MusicPlayer::new(self.handle.clone(), score, volume)?;
            Ok(Box::new(player))
        }
    }

    pub struct MusicPlayer {
        handle: OutputStreamHandle,
        samples: Arc<Vec<f32>>,
        sample_rate: u32,
        sink: Option<Sink>,
        /// Stream position where the current sink's source started.
        base: Duration,
        volume: f32,
        closed: bool,
    }

    impl MusicPlayer {
        fn new(
            handle: OutputStreamHandle,
            score: &Score,
            volume: f32,
        ) -> Result<Self, TransportError> {
            let mut player = MusicPlayer {
                handle,
                samples: Arc::new(score.samples().to_vec()),
                sample_rate: score.sample_rate(),
                sink: None,
                base: Duration::ZERO,
                volume,
                closed: false,
            };
            // Prime a paused sink so open failures surface at load
            // time, not mid-play.
            player.sink = Some(player.make_sink(Duration::ZERO)?);
            Ok(player)
        }

        fn make_sink(&self, from: Duration) -> Result<Sink, TransportError> {
            let sink =
                Sink::try_new(&self.handle).map_err(|e| TransportError(e.to_string()))?;
            sink.set_volume(self.volume);
            let src = SamplesBuffer::new(1, self.sample_rate, self.samples.as_ref().clone())
                .skip_duration(from);
            sink.append(src);
            sink.pause();
            Ok(sink)
        }

        fn rebuild(&mut self, from: Duration, playing: bool) {
            // Dropping the old sink stops it.
            self.sink = self.make_sink(from).ok();
            self.base = from;
            if playing {
                if let Some(s) = &self.sink {
                    s.play();
                }
            }
        }
    }

    impl AudioTransport for MusicPlayer {
        fn play(&mut self) {
            if self.closed {
                self.closed = false;
                self.rebuild(Duration::ZERO, false);
            }
            if self.sink.is_none() {
                self.rebuild(self.base, false);
            }
            if let Some(s) = &self.sink {
                s.play();
            }
        }

        fn pause(&mut self) {
            if let Some(s) = &self.sink {
                s.pause();
            }
        }

        fn set_volume(&mut self, volume: f32) {
            self.volume = volume;
            if let Some(s) = &self.sink {
                s.set_volume(volume);
            }
        }

        fn set_position(&mut self, pos: Duration) {
            let playing = self.is_playing();
            self.rebuild(pos, playing);
        }

        fn position(&self) -> Duration {
            match &self.sink {
                Some(s) => self.base + s.get_pos(),
                None => self.base,
            }
        }

        fn is_playing(&self) -> bool {
            if self.closed {
                return false;
            }
            self.sink
                .as_ref()
                .map(|s| !s.is_paused() && !s.empty())
                .unwrap_or(false)
        }

        fn close(&mut self) {
            if let Some(s) = self.sink.take() {
                s.stop();
            }
            self.base = Duration::ZERO;
            self.closed = true;
        }
    }
}

#[cfg(feature = "sound")]
pub use inner::AudioEngine;

#[cfg(not(feature = "sound"))]
pub struct AudioEngine;

#[cfg(not(feature = "sound"))]
impl AudioEngine {
    pub fn new() -> Option<Self> {
        None
    }
}

#[cfg(not(feature = "sound"))]
impl crate::sim::audio::TransportFactory for AudioEngine {
    fn open(
        &self,
        score: &crate::resources::Score,
        volume: f32,
    ) -> Result<Box<dyn crate::sim::audio::AudioTransport>, crate::sim::audio::TransportError>
    {
        crate::sim::audio::TransportFactory::open(&crate::sim::audio::SilentMixer, score, volume)
    }
}
