use crate::error::{BoxError, DeliveryError};
use crate::publisher::Operation;
use crate::topic::TopicId;
use std::any::Any;
use std::borrow::Cow;
use std::fmt::Debug;

/// Observer for subscriber failures, installed per bus node.
///
/// Called at most once per publish, after the whole fan-out completed, with every
/// failure in invocation order. Handlers are not inherited by child nodes: the
/// handler of the node the publish started on is the one that is consulted.
///
/// Any `Fn(&TopicId, &Operation, &[&dyn Debug], &[DeliveryError])` closure is a handler.
pub trait ExceptionHandler: Send + Sync {
    fn handle(
        &self,
        topic: &TopicId,
        operation: &Operation,
        args: &[&dyn Debug],
        failures: &[DeliveryError],
    );
}

impl<F> ExceptionHandler for F
where
    F: Fn(&TopicId, &Operation, &[&dyn Debug], &[DeliveryError]) + Send + Sync,
{
    fn handle(
        &self,
        topic: &TopicId,
        operation: &Operation,
        args: &[&dyn Debug],
        failures: &[DeliveryError],
    ) {
        self(topic, operation, args, failures);
    }
}

/// Failures collected during one fan-out pass, allocated on the first failure only.
#[derive(Debug, Default)]
pub(crate) struct Failures {
    collected: Option<Vec<DeliveryError>>,
}

impl Failures {
    pub(crate) fn record(&mut self, failure: DeliveryError) {
        self.collected.get_or_insert_with(Vec::new).push(failure);
    }

    pub(crate) fn rejected(&mut self, source: BoxError, bus: &str) {
        self.record(DeliveryError::Rejected { source, context: Some(bus.to_owned().into()) });
    }

    pub(crate) fn panicked(&mut self, payload: &(dyn Any + Send), bus: &str) {
        self.record(DeliveryError::Panicked {
            message: panic_message(payload),
            context: Some(bus.to_owned().into()),
        });
    }

    pub(crate) fn into_inner(self) -> Option<Vec<DeliveryError>> {
        self.collected
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> Cow<'static, str> {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        Cow::Borrowed(msg)
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        Cow::Owned(msg.clone())
    } else {
        Cow::Borrowed("unknown panic")
    }
}
