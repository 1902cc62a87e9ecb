//! Media element hooks used by the autoplay probe

use futures::future::BoxFuture;

/// A muted, hidden, minimal test element mounted by the host page.
pub trait ProbeElement: Send {
    /// Attempt to start playback. Settles with `Err` when the host refuses.
    fn play(&mut self) -> BoxFuture<'static, Result<(), String>>;

    /// Remove the element from the page. Called exactly once per element.
    fn detach(&mut self);
}

/// Creates probe elements on demand
pub trait MediaElementFactory: Send + Sync {
    fn create_muted_test_element(&self) -> Box<dyn ProbeElement>;
}

/// Factory for hosts without media playback: every element refuses to play.
pub struct NoopMediaElements;

impl NoopMediaElements {
    pub fn new() -> Self {
        NoopMediaElements
    }
}

impl Default for NoopMediaElements {
    fn default() -> Self {
        Self::new()
    }
}

impl MediaElementFactory for NoopMediaElements {
    fn create_muted_test_element(&self) -> Box<dyn ProbeElement> {
        Box::new(RefusingElement)
    }
}

struct RefusingElement;

impl ProbeElement for RefusingElement {
    fn play(&mut self) -> BoxFuture<'static, Result<(), String>> {
        Box::pin(async { Err("media playback not supported".to_string()) })
    }

    fn detach(&mut self) {}
}
