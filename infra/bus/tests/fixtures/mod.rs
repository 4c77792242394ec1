#![allow(dead_code)]

use canopy_bus::{Delivery, DeliveryError, ExceptionHandler, MessageBus, Operation, TopicId};
use parking_lot::Mutex;
use std::fmt::Debug;
use std::sync::Arc;

canopy_bus::capability! {
    /// Capability shared by the integration tests.
    pub trait EventListener {
        fn on_event(&self, message: &str) -> Delivery;
    }
}

/// Ordered record of `(subscriber label, message)` pairs across all listeners.
#[derive(Debug, Default, Clone)]
pub struct Journal {
    entries: Arc<Mutex<Vec<(&'static str, String)>>>,
}

impl Journal {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A listener that records its label and succeeds.
    #[must_use]
    pub fn listener(&self, label: &'static str) -> Arc<dyn EventListener> {
        Arc::new(Listener { label, journal: self.clone(), outcome: Outcome::Succeed })
    }

    /// A listener that records its label and then returns an error.
    #[must_use]
    pub fn failing(&self, label: &'static str) -> Arc<dyn EventListener> {
        Arc::new(Listener { label, journal: self.clone(), outcome: Outcome::Fail })
    }

    /// A listener that records its label and then panics.
    #[must_use]
    pub fn panicking(&self, label: &'static str) -> Arc<dyn EventListener> {
        Arc::new(Listener { label, journal: self.clone(), outcome: Outcome::Panic })
    }

    #[must_use]
    pub fn labels(&self) -> Vec<&'static str> {
        self.entries.lock().iter().map(|(label, _)| *label).collect()
    }

    #[must_use]
    pub fn entries(&self) -> Vec<(&'static str, String)> {
        self.entries.lock().clone()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    fn record(&self, label: &'static str, message: &str) {
        self.entries.lock().push((label, message.to_owned()));
    }
}

#[derive(Debug, Clone, Copy)]
enum Outcome {
    Succeed,
    Fail,
    Panic,
}

#[derive(Debug)]
struct Listener {
    label: &'static str,
    journal: Journal,
    outcome: Outcome,
}

impl EventListener for Listener {
    fn on_event(&self, message: &str) -> Delivery {
        self.journal.record(self.label, message);
        match self.outcome {
            Outcome::Succeed => Ok(()),
            Outcome::Fail => Err(format!("{} failed", self.label).into()),
            Outcome::Panic => panic!("{} panicked", self.label),
        }
    }
}

/// One exception handler invocation, flattened to strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    pub topic: String,
    pub operation: String,
    pub args: String,
    pub failures: Vec<String>,
    pub panics: usize,
}

/// Exception handler that keeps every report it receives.
#[derive(Debug, Default, Clone)]
pub struct RecordingHandler {
    reports: Arc<Mutex<Vec<Report>>>,
}

impl RecordingHandler {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn reports(&self) -> Vec<Report> {
        self.reports.lock().clone()
    }
}

impl ExceptionHandler for RecordingHandler {
    fn handle(
        &self,
        topic: &TopicId,
        operation: &Operation,
        args: &[&dyn Debug],
        failures: &[DeliveryError],
    ) {
        self.reports.lock().push(Report {
            topic: topic.name().to_owned(),
            operation: operation.to_string(),
            args: format!("{args:?}"),
            failures: failures.iter().map(ToString::to_string).collect(),
            panics: failures.iter().filter(|f| f.is_panic()).count(),
        });
    }
}

/// Builds a linear tree `depth0 → depth1 → … → depth{len-1}`, root first.
#[must_use]
pub fn chain(len: usize) -> Vec<MessageBus> {
    let mut buses: Vec<MessageBus> = Vec::with_capacity(len);
    for depth in 0..len {
        let name = format!("depth{depth}");
        let bus = match buses.last() {
            Some(parent) => parent.child_named(name),
            None => MessageBus::named(name),
        };
        buses.push(bus);
    }
    buses
}
