//! Per-runner output capture.
//!
//! Each runner owns one [`CaptureStack`]; test bodies write through the
//! [`TestCtx`] handed to them. While a frame is open, writes accumulate in
//! that frame instead of reaching stdout; frames nest, so output produced
//! during a nested capture lands in the innermost frame. When capture is
//! disabled (or no frame is open) writes pass straight through.

use std::io::Write;
use std::sync::Arc;

use parking_lot::Mutex;

/// Shared handle to a runner's capture stack.
pub type CaptureHandle = Arc<CaptureStack>;

/// Stack of capture frames. One per runner, never global.
pub struct CaptureStack {
    enabled: bool,
    frames: Mutex<Vec<String>>,
}

impl CaptureStack {
    pub fn new(enabled: bool) -> CaptureHandle {
        Arc::new(CaptureStack {
            enabled,
            frames: Mutex::new(Vec::new()),
        })
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Open a new frame. No-op when capture is disabled.
    pub fn start(&self) {
        if self.enabled {
            self.frames.lock().push(String::new());
        }
    }

    /// Close the innermost frame and return what it captured.
    pub fn end(&self) -> Option<String> {
        if !self.enabled {
            return None;
        }
        self.frames.lock().pop()
    }

    /// Number of open frames.
    pub fn depth(&self) -> usize {
        self.frames.lock().len()
    }

    /// Route text into the innermost frame, or to stdout when nothing
    /// is capturing.
    pub fn write(&self, text: &str) {
        if self.enabled {
            let mut frames = self.frames.lock();
            if let Some(top) = frames.last_mut() {
                top.push_str(text);
                return;
            }
        }
        let _ = std::io::stdout().write_all(text.as_bytes());
    }
}

/// What a test body sees while it runs: a write channel into the owning
/// runner's capture stack.
#[derive(Clone)]
pub struct TestCtx {
    capture: CaptureHandle,
}

impl TestCtx {
    pub fn new(capture: CaptureHandle) -> Self {
        TestCtx { capture }
    }

    pub fn write(&self, text: &str) {
        self.capture.write(text);
    }

    pub fn writeln(&self, text: &str) {
        self.capture.write(text);
        self.capture.write("\n");
    }

    pub fn capture(&self) -> &CaptureHandle {
        &self.capture
    }
}
