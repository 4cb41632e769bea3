//! Audio output backends.
//!
//! A backend hands out one [`OutputContext`] per playback. The context owns
//! whatever device resources the playback needs and releases them when it is
//! dropped.

use crate::audio::SampleBuffer;
use crate::playback::PlaybackError;
use async_trait::async_trait;
use tokio::sync::oneshot;
use tracing::debug;

/// Resolves once the scheduled buffer has finished playing.
pub type Completion = oneshot::Receiver<()>;

pub trait AudioOutput: Send + Sync {
    /// Whether contexts from this backend reach a device. `false` for
    /// backends that only consume the buffer.
    fn is_audible(&self) -> bool {
        true
    }

    /// Opens a fresh output context for one playback.
    fn open(
        &self,
        sample_rate: u32,
        channel_count: u16,
    ) -> Result<Box<dyn OutputContext>, PlaybackError>;
}

#[async_trait]
pub trait OutputContext: Send {
    /// Schedules `buffer` for immediate playback.
    ///
    /// Resolves once the device is ready and the buffer is queued. Returns a
    /// completion signal when the backend can report the end of playback,
    /// `None` when it cannot.
    async fn start(&mut self, buffer: &SampleBuffer) -> Result<Option<Completion>, PlaybackError>;
}

/// Accepts audio and plays nothing. Used when no speaker backend is built in.
#[derive(Debug, Default, Clone, Copy)]
pub struct DiscardOutput;

struct DiscardContext;

impl AudioOutput for DiscardOutput {
    fn is_audible(&self) -> bool {
        false
    }

    fn open(
        &self,
        _sample_rate: u32,
        _channel_count: u16,
    ) -> Result<Box<dyn OutputContext>, PlaybackError> {
        Ok(Box::new(DiscardContext))
    }
}

#[async_trait]
impl OutputContext for DiscardContext {
    async fn start(&mut self, buffer: &SampleBuffer) -> Result<Option<Completion>, PlaybackError> {
        debug!(
            frames = buffer.frames(),
            duration_ms = buffer.duration().as_millis() as u64,
            "Discarding audio buffer"
        );
        Ok(None)
    }
}

#[cfg(feature = "speaker")]
pub use speaker::SpeakerOutput;

#[cfg(feature = "speaker")]
mod speaker {
    use super::{AudioOutput, Completion, OutputContext};
    use crate::audio::SampleBuffer;
    use crate::playback::PlaybackError;
    use async_trait::async_trait;
    use rodio::{OutputStream, Sink, buffer::SamplesBuffer};
    use std::sync::Arc;
    use std::thread;
    use tokio::sync::oneshot;
    use tracing::info;

    /// Plays on the default output device through `rodio`.
    ///
    /// The device stream is not `Send`, so each context drives its own
    /// playback thread. Dropping the context stops the sink, which lets that
    /// thread finish and close the stream.
    #[derive(Debug, Default, Clone, Copy)]
    pub struct SpeakerOutput;

    struct SpeakerContext {
        sample_rate: u32,
        channel_count: u16,
        sink: Option<Arc<Sink>>,
    }

    impl AudioOutput for SpeakerOutput {
        fn open(
            &self,
            sample_rate: u32,
            channel_count: u16,
        ) -> Result<Box<dyn OutputContext>, PlaybackError> {
            Ok(Box::new(SpeakerContext {
                sample_rate,
                channel_count,
                sink: None,
            }))
        }
    }

    #[async_trait]
    impl OutputContext for SpeakerContext {
        async fn start(
            &mut self,
            buffer: &SampleBuffer,
        ) -> Result<Option<Completion>, PlaybackError> {
            let (done_tx, done_rx) = oneshot::channel();
            let (ready_tx, ready_rx) = oneshot::channel::<Result<Arc<Sink>, String>>();
            let samples = buffer.interleaved();
            let (sample_rate, channel_count) = (self.sample_rate, self.channel_count);

            thread::Builder::new()
                .name("engbuddy-playback".to_string())
                .spawn(move || {
                    let (stream, handle) = match OutputStream::try_default() {
                        Ok(pair) => pair,
                        Err(e) => {
                            let _ = ready_tx.send(Err(e.to_string()));
                            return;
                        }
                    };
                    let sink = match Sink::try_new(&handle) {
                        Ok(sink) => Arc::new(sink),
                        Err(e) => {
                            let _ = ready_tx.send(Err(e.to_string()));
                            return;
                        }
                    };
                    sink.append(SamplesBuffer::new(channel_count, sample_rate, samples));
                    if ready_tx.send(Ok(Arc::clone(&sink))).is_err() {
                        sink.stop();
                        return;
                    }

                    sink.sleep_until_end();
                    drop(stream);
                    let _ = done_tx.send(());
                })
                .map_err(|e| PlaybackError::Output(e.to_string()))?;

            match ready_rx.await {
                Ok(Ok(sink)) => {
                    info!(sample_rate, channel_count, "Speaker playback started");
                    self.sink = Some(sink);
                    Ok(Some(done_rx))
                }
                Ok(Err(e)) => Err(PlaybackError::Output(e)),
                Err(_) => Err(PlaybackError::Output(
                    "playback thread exited before starting".to_string(),
                )),
            }
        }
    }

    impl Drop for SpeakerContext {
        fn drop(&mut self) {
            if let Some(sink) = &self.sink {
                sink.stop();
            }
        }
    }
}
