//! Exclusive access to the controlling terminal's input
//!
//! A blocking prompt (a password, or a mount helper attached to the terminal)
//! must not race the command loop that normally reads stdin. Components that
//! need the terminal take an [`InputGuard`] from the [`InteractiveContext`]
//! they were handed; the loop is paused on the first acquisition and resumed
//! when the last guard drops, including on error and unwind paths.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

/// Hook into whatever loop normally owns stdin
pub trait InputLoop: Send + Sync {
    fn pause(&self);
    fn resume(&self);
}

#[derive(Default)]
struct Inner {
    depth: usize,
}

/// Shared handle passed to every component that may prompt
#[derive(Clone, Default)]
pub struct InteractiveContext {
    input_loop: Option<Arc<dyn InputLoop>>,
    inner: Arc<Mutex<Inner>>,
}

impl InteractiveContext {
    /// Context with no loop to pause (one-shot commands)
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_loop(input_loop: Arc<dyn InputLoop>) -> Self {
        Self {
            input_loop: Some(input_loop),
            inner: Arc::default(),
        }
    }

    /// Take the input stream. Reentrant: nested guards only pause once.
    pub fn acquire(&self) -> InputGuard {
        let mut inner = self.inner.lock();
        inner.depth += 1;
        if inner.depth == 1 {
            debug!("Pausing input loop");
            if let Some(input_loop) = &self.input_loop {
                input_loop.pause();
            }
        }
        InputGuard { ctx: self.clone() }
    }

    /// Number of live guards
    pub fn depth(&self) -> usize {
        self.inner.lock().depth
    }

    /// Read a secret without echo while holding the input stream
    pub fn prompt_secret(&self, prompt: &str) -> std::io::Result<String> {
        let _guard = self.acquire();
        rpassword::prompt_password(prompt)
    }

    fn release(&self) {
        let mut inner = self.inner.lock();
        inner.depth = inner.depth.saturating_sub(1);
        if inner.depth == 0 {
            debug!("Resuming input loop");
            if let Some(input_loop) = &self.input_loop {
                input_loop.resume();
            }
        }
    }
}

/// Exclusive input access; releasing it may resume the loop
#[must_use = "the input stream is released as soon as the guard is dropped"]
pub struct InputGuard {
    ctx: InteractiveContext,
}

impl Drop for InputGuard {
    fn drop(&mut self) {
        self.ctx.release();
    }
}
