//! Scoped capture of `tracing` events for asserting on log output.

use std::fmt;
use std::sync::{Arc, Mutex};
use tracing::field::{Field, Visit};
use tracing::subscriber::DefaultGuard;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};
use tracing_subscriber::Registry;

#[derive(Clone, Default)]
pub struct CapturedEvents {
    events: Arc<Mutex<Vec<(Level, String)>>>,
}

impl CapturedEvents {
    pub fn at(&self, level: Level) -> Vec<String> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|(event_level, _)| *event_level == level)
            .map(|(_, message)| message.clone())
            .collect()
    }

    pub fn warnings(&self) -> Vec<String> {
        self.at(Level::WARN)
    }

    pub fn errors(&self) -> Vec<String> {
        self.at(Level::ERROR)
    }
}

struct CaptureLayer {
    events: CapturedEvents,
}

impl<S: Subscriber> Layer<S> for CaptureLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);
        self.events
            .events
            .lock()
            .unwrap()
            .push((*event.metadata().level(), visitor.message));
    }
}

#[derive(Default)]
struct MessageVisitor {
    message: String,
}

impl Visit for MessageVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{value:?}");
        }
    }
}

/// Captures events on the current thread until the guard is dropped.
pub fn capture_events() -> (CapturedEvents, DefaultGuard) {
    let events = CapturedEvents::default();
    let subscriber = Registry::default().with(CaptureLayer {
        events: events.clone(),
    });
    let guard = tracing::subscriber::set_default(subscriber);
    (events, guard)
}
