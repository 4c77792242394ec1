use crate::bus::{BusInner, MessageBus};
use crate::error::Delivery;
use crate::failure::Failures;
use crate::topic::{BroadcastDirection, Topic, TopicId};
use std::collections::VecDeque;
use std::fmt;
use std::fmt::Debug;
use std::hash::{Hash, Hasher};
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Weak};
use tracing::trace;

/// Describes the capability method a publish was made through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Operation {
    capability: &'static str,
    name: &'static str,
}

impl Operation {
    #[must_use]
    pub const fn new(capability: &'static str, name: &'static str) -> Self {
        Self { capability, name }
    }

    #[must_use]
    pub const fn capability(&self) -> &'static str {
        self.capability
    }

    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.capability, self.name)
    }
}

/// Fans calls out to the subscribers of one topic, starting at one bus node.
///
/// Obtained through [`MessageBus::publisher`]. For capabilities declared with
/// [`crate::capability!`], `Publisher<dyn Capability>` implements the capability
/// trait itself, so publishing looks like calling a subscriber.
///
/// Equality, hashing and formatting act on the publisher itself and never reach
/// subscribers. The publisher does not keep its bus alive; once the last handle into
/// the tree is dropped, publishing does nothing.
pub struct Publisher<T: ?Sized> {
    bus: Weak<BusInner>,
    topic: Topic<T>,
    id: TopicId,
}

impl<T> Publisher<T>
where
    T: ?Sized + Send + Sync + 'static,
{
    pub(crate) fn new(bus: Weak<BusInner>, topic: Topic<T>) -> Self {
        let id = topic.id();
        Self { bus, topic, id }
    }

    #[must_use]
    pub const fn topic(&self) -> &Topic<T> {
        &self.topic
    }

    /// The bus this publisher belongs to, if it is still alive.
    #[must_use]
    pub fn bus(&self) -> Option<MessageBus> {
        self.bus.upgrade().and_then(MessageBus::from_inner)
    }

    /// Invokes `invoke` on every subscriber reached by the topic's direction.
    ///
    /// Subscribers are called synchronously, node by node, in registration order.
    /// A subscriber that returns `Err` or panics is recorded and skipped; once every
    /// subscriber ran, the recorded failures are handed in one batch to the exception
    /// handler of the node this publisher belongs to. Nothing is returned to the
    /// caller.
    ///
    /// `args` are only used for failure reporting.
    pub fn publish<F>(&self, operation: Operation, args: &[&dyn Debug], invoke: F)
    where
        F: Fn(&T) -> Delivery,
    {
        let Some(origin) = self.bus.upgrade() else {
            trace!(topic = %self.id, %operation, "Publish skipped: bus tree released");
            return;
        };

        let mut failures = Failures::default();
        let mut delivered = 0usize;

        let visited = route(&origin, self.topic.direction(), &mut |bus| {
            let Some(subscribers) = bus.subscribers::<T>(&self.id) else {
                return;
            };
            for subscriber in subscribers.iter() {
                delivered += 1;
                match panic::catch_unwind(AssertUnwindSafe(|| invoke(subscriber.as_ref()))) {
                    Ok(Ok(())) => {},
                    Ok(Err(source)) => failures.rejected(source, &bus.label()),
                    Err(payload) => failures.panicked(payload.as_ref(), &bus.label()),
                }
            }
        });

        trace!(
            bus = %origin.label(),
            topic = %self.id,
            %operation,
            visited,
            delivered,
            "Message published"
        );

        origin.report(&self.id, &operation, args, failures.into_inner());
    }
}

/// Visits the nodes selected by `direction`, starting at `origin`, and returns how
/// many were visited.
fn route(
    origin: &Arc<BusInner>,
    direction: BroadcastDirection,
    visit: &mut dyn FnMut(&BusInner),
) -> usize {
    match direction {
        BroadcastDirection::None => {
            visit(origin);
            1
        },
        BroadcastDirection::ToChildren => {
            let mut visited = 0;
            let mut queue = VecDeque::from([Arc::clone(origin)]);
            while let Some(bus) = queue.pop_front() {
                queue.extend(bus.children());
                visit(&bus);
                visited += 1;
            }
            visited
        },
        BroadcastDirection::ToDirectChildren => {
            visit(origin);
            let children = origin.children();
            for child in &children {
                visit(child);
            }
            children.len() + 1
        },
        BroadcastDirection::ToParent => {
            let mut visited = 0;
            let mut current = Some(Arc::clone(origin));
            while let Some(bus) = current {
                visit(&bus);
                visited += 1;
                current = bus.parent();
            }
            visited
        },
    }
}

impl<T: ?Sized> PartialEq for Publisher<T> {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self, other)
    }
}

impl<T: ?Sized> Eq for Publisher<T> {}

impl<T: ?Sized> Hash for Publisher<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::ptr::hash(self, state);
    }
}

impl<T: ?Sized> fmt::Display for Publisher<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bus = self.bus.upgrade().map_or_else(|| "<dropped>".into(), |bus| bus.label());
        write!(f, "Publisher{{bus='{bus}', topic='{}'}}", self.topic)
    }
}

impl<T: ?Sized> fmt::Debug for Publisher<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Publisher")
            .field("bus", &self.bus.upgrade().map(|bus| bus.label()))
            .field("topic", &self.topic)
            .finish()
    }
}
