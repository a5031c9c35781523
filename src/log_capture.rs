//! Counts `error`-level records emitted by this crate on the current thread.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;

struct ErrorCounter(Arc<AtomicUsize>);

impl<S: Subscriber> Layer<S> for ErrorCounter {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let meta = event.metadata();
        if *meta.level() == Level::ERROR && meta.target().starts_with("onemin_relay") {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// Scoped capture; records stop being counted when this is dropped.
pub struct ErrorEvents {
    count: Arc<AtomicUsize>,
    _guard: tracing::dispatcher::DefaultGuard,
}

impl ErrorEvents {
    pub fn capture() -> Self {
        let count = Arc::new(AtomicUsize::new(0));
        let guard = tracing_subscriber::registry()
            .with(ErrorCounter(Arc::clone(&count)))
            .set_default();
        Self {
            count,
            _guard: guard,
        }
    }

    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }
}
