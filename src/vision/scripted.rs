//! In-process vision model for tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;

use super::{ImageInput, VisionError, VisionModel};

type Script = Box<dyn Fn(&str, &ImageInput) -> Result<String, VisionError> + Send + Sync>;

/// Replies from a closure over the prompt and image, after an optional
/// delay.
pub(crate) struct ScriptedVision {
    script: Script,
    delay: Duration,
    calls: AtomicUsize,
}

impl std::fmt::Debug for ScriptedVision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptedVision")
            .field("delay", &self.delay)
            .field("calls", &self.calls.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl ScriptedVision {
    pub(crate) fn new(
        script: impl Fn(&str, &ImageInput) -> Result<String, VisionError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            script: Box::new(script),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    /// Always replies with `text`.
    pub(crate) fn replying(text: &str) -> Self {
        let text = text.to_string();
        Self::new(move |_, _| Ok(text.clone()))
    }

    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VisionModel for ScriptedVision {
    fn model_name(&self) -> &str {
        "scripted"
    }

    async fn extract(&self, prompt: &str, image: &ImageInput) -> Result<String, VisionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        (self.script)(prompt, image)
    }
}

/// A base64 PNG whose last byte is `tag`, so scripts can tell images apart.
pub(crate) fn png_base64(tag: u8) -> String {
    let mut bytes = vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0];
    bytes.push(tag);
    STANDARD.encode(bytes)
}

/// The tag written by [`png_base64`].
pub(crate) fn image_tag(image: &ImageInput) -> Option<u8> {
    image.bytes().last().copied()
}
