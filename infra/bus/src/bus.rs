use crate::error::DeliveryError;
use crate::failure::ExceptionHandler;
use crate::publisher::{Operation, Publisher};
use crate::topic::{Topic, TopicId};
use fxhash::FxHashMap;
use parking_lot::RwLock;
use std::any::Any;
use std::borrow::Cow;
use std::fmt;
use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, trace};

static NEXT_BUS_ID: AtomicU64 = AtomicU64::new(1);

/// Copy-on-write subscriber list: publishing clones the outer `Arc`, never the list.
type SubscriberList<T> = Arc<Vec<Arc<T>>>;

type Slot = Box<dyn Any + Send + Sync>;

/// One node of the bus tree.
///
/// `MessageBus` is a cheap handle around shared state; clones refer to the same
/// node. A parent owns its children and never drops them, so a child keeps
/// receiving broadcasts after its last handle is gone. A child only refers back to
/// its parent. Every handle pins the root of its tree, which keeps all of the tree
/// alive until the last handle into it is dropped.
#[derive(Clone)]
pub struct MessageBus {
    inner: Arc<BusInner>,
    root: Arc<BusInner>,
}

pub(crate) struct BusInner {
    id: u64,
    name: Option<Cow<'static, str>>,
    parent: Option<Weak<BusInner>>,
    root: Weak<BusInner>,
    children: RwLock<Vec<Arc<BusInner>>>,
    subscribers: RwLock<FxHashMap<TopicId, Slot>>,
    publishers: RwLock<FxHashMap<TopicId, Arc<dyn Any + Send + Sync>>>,
    exception_handler: RwLock<Option<Arc<dyn ExceptionHandler>>>,
}

/// Configures a [`MessageBus`] node before it is attached to the tree.
///
/// # Examples
/// ```rust
/// use canopy_bus::MessageBus;
///
/// let app = MessageBus::builder().name("app").build();
/// let module = MessageBus::builder().name("module:auth").parent(&app).build();
///
/// assert_eq!(module.parent().as_ref(), Some(&app));
/// assert_eq!(app.children(), vec![module]);
/// ```
#[derive(Default)]
pub struct BusBuilder {
    name: Option<Cow<'static, str>>,
    parent: Option<MessageBus>,
    exception_handler: Option<Arc<dyn ExceptionHandler>>,
}

impl BusBuilder {
    /// Sets a display name used in logs and failure contexts.
    #[must_use]
    pub fn name(mut self, name: impl Into<Cow<'static, str>>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Attaches the new node under `parent`.
    #[must_use]
    pub fn parent(mut self, parent: &MessageBus) -> Self {
        self.parent = Some(parent.clone());
        self
    }

    /// Installs an exception handler on the new node.
    #[must_use]
    pub fn exception_handler(mut self, handler: impl ExceptionHandler + 'static) -> Self {
        self.exception_handler = Some(Arc::new(handler));
        self
    }

    /// Creates the node and registers it with its parent.
    #[must_use]
    pub fn build(self) -> MessageBus {
        let parent = self.parent;
        let inner = Arc::new_cyclic(|this| BusInner {
            id: NEXT_BUS_ID.fetch_add(1, Ordering::Relaxed),
            name: self.name,
            parent: parent.as_ref().map(|p| Arc::downgrade(&p.inner)),
            root: parent.as_ref().map_or_else(|| this.clone(), |p| Arc::downgrade(&p.root)),
            children: RwLock::new(Vec::new()),
            subscribers: RwLock::new(FxHashMap::default()),
            publishers: RwLock::new(FxHashMap::default()),
            exception_handler: RwLock::new(self.exception_handler),
        });

        let root = match &parent {
            Some(parent) => {
                parent.inner.children.write().push(Arc::clone(&inner));
                Arc::clone(&parent.root)
            },
            None => Arc::clone(&inner),
        };

        debug!(
            bus = %inner.label(),
            parent = parent.as_ref().map(|p| p.inner.label()).as_deref(),
            "Message bus created"
        );

        MessageBus { inner, root }
    }
}

impl fmt::Debug for BusBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BusBuilder")
            .field("name", &self.name)
            .field("parent", &self.parent)
            .field("exception_handler", &self.exception_handler.is_some())
            .finish()
    }
}

impl MessageBus {
    /// Creates a root node.
    #[must_use]
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Creates a named root node.
    #[must_use]
    pub fn named(name: impl Into<Cow<'static, str>>) -> Self {
        Self::builder().name(name).build()
    }

    /// Creates a node attached under `parent`.
    #[must_use]
    pub fn with_parent(parent: &Self) -> Self {
        Self::builder().parent(parent).build()
    }

    #[must_use]
    pub fn builder() -> BusBuilder {
        BusBuilder::default()
    }

    /// Creates a node attached under this one.
    #[must_use]
    pub fn child(&self) -> Self {
        Self::with_parent(self)
    }

    /// Creates a named node attached under this one.
    #[must_use]
    pub fn child_named(&self, name: impl Into<Cow<'static, str>>) -> Self {
        Self::builder().name(name).parent(self).build()
    }

    /// The parent fixed at construction, `None` for a root.
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        self.inner.parent().map(|inner| self.sibling_handle(inner))
    }

    /// Children in attachment order.
    #[must_use]
    pub fn children(&self) -> Vec<Self> {
        self.inner.children().into_iter().map(|inner| self.sibling_handle(inner)).collect()
    }

    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.inner.name.as_deref()
    }

    #[must_use]
    pub fn is_root(&self) -> bool {
        self.inner.parent.is_none()
    }

    /// Handle for `inner`, or `None` once its tree has been released.
    pub(crate) fn from_inner(inner: Arc<BusInner>) -> Option<Self> {
        let root = inner.root.upgrade()?;
        Some(Self { inner, root })
    }

    /// Handle for another node of the same tree.
    fn sibling_handle(&self, inner: Arc<BusInner>) -> Self {
        Self { inner, root: Arc::clone(&self.root) }
    }

    pub(crate) const fn inner(&self) -> &Arc<BusInner> {
        &self.inner
    }

    /// Returns the publisher of `topic` on this node.
    ///
    /// The publisher is created on first request and cached; every later call for
    /// the same topic returns the same instance, also under concurrent first use.
    pub fn publisher<T>(&self, topic: &Topic<T>) -> Arc<Publisher<T>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let id = topic.id();

        let cached = self.inner.publishers.read().get(&id).cloned();
        if let Some(publisher) = cached.and_then(downcast_publisher) {
            return publisher;
        }

        let entry = {
            let mut publishers = self.inner.publishers.write();
            let entry = publishers
                .entry(id)
                .or_insert_with(|| {
                    trace!(bus = %self.inner.label(), %topic, "Creating publisher");
                    Arc::new(Publisher::new(Arc::downgrade(&self.inner), topic.clone()))
                        as Arc<dyn Any + Send + Sync>
                })
                .clone();
            drop(publishers);
            entry
        };

        downcast_publisher(entry)
            .unwrap_or_else(|| unreachable!("publisher cache is keyed by the capability TypeId"))
    }

    /// Registers `subscriber` for `topic` on this node.
    ///
    /// The same subscriber may be registered several times; it is then invoked once
    /// per registration.
    pub fn subscribe<T>(&self, topic: &Topic<T>, subscriber: Arc<T>)
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let mut subscribers = self.inner.subscribers.write();
        let slot = subscribers
            .entry(topic.id())
            .or_insert_with(|| Box::new(SubscriberList::<T>::default()) as Slot);

        let Some(list) = slot.downcast_mut::<SubscriberList<T>>() else {
            unreachable!("subscriber registry is keyed by the capability TypeId");
        };
        Arc::make_mut(list).push(subscriber);
        trace!(bus = %self.inner.label(), %topic, count = list.len(), "Subscriber registered");
    }

    /// Removes the first registration of `subscriber` (same `Arc` allocation) for `topic`.
    ///
    /// Returns `false` without side effects when nothing matched.
    pub fn unsubscribe<T>(&self, topic: &Topic<T>, subscriber: &Arc<T>) -> bool
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let mut subscribers = self.inner.subscribers.write();
        let Some(list) = subscribers
            .get_mut(&topic.id())
            .and_then(|slot| slot.downcast_mut::<SubscriberList<T>>())
        else {
            return false;
        };

        let Some(index) = list.iter().position(|s| Arc::ptr_eq(s, subscriber)) else {
            return false;
        };
        Arc::make_mut(list).remove(index);
        trace!(bus = %self.inner.label(), %topic, count = list.len(), "Subscriber removed");
        true
    }

    /// Installs the handler receiving batched subscriber failures for publishes
    /// started on this node. Replaces any previous handler.
    pub fn set_exception_handler(&self, handler: impl ExceptionHandler + 'static) {
        *self.inner.exception_handler.write() = Some(Arc::new(handler));
    }

    /// Removes the handler; later failures on this node are dropped.
    pub fn clear_exception_handler(&self) {
        self.inner.exception_handler.write().take();
    }

    #[must_use]
    pub fn exception_handler(&self) -> Option<Arc<dyn ExceptionHandler>> {
        self.inner.exception_handler.read().clone()
    }
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for MessageBus {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for MessageBus {}

impl fmt::Debug for MessageBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.inner.fmt(f)
    }
}

impl fmt::Display for MessageBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.inner.label())
    }
}

impl BusInner {
    /// Display name, falling back to the process-unique node id.
    pub(crate) fn label(&self) -> Cow<'static, str> {
        self.name.clone().unwrap_or_else(|| Cow::Owned(format!("MessageBus#{}", self.id)))
    }

    pub(crate) fn parent(&self) -> Option<Arc<Self>> {
        self.parent.as_ref().and_then(Weak::upgrade)
    }

    pub(crate) fn children(&self) -> Vec<Arc<Self>> {
        self.children.read().clone()
    }

    /// Snapshot of the subscribers for `topic`; later registrations do not affect it.
    pub(crate) fn subscribers<T>(&self, topic: &TopicId) -> Option<SubscriberList<T>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.subscribers
            .read()
            .get(topic)
            .and_then(|slot| slot.downcast_ref::<SubscriberList<T>>())
            .cloned()
    }

    /// Hands the failures of one publish to this node's handler, if both exist.
    pub(crate) fn report(
        &self,
        topic: &TopicId,
        operation: &Operation,
        args: &[&dyn Debug],
        failures: Option<Vec<DeliveryError>>,
    ) {
        let Some(failures) = failures else {
            return;
        };

        let handler = self.exception_handler.read().clone();
        match handler {
            Some(handler) => handler.handle(topic, operation, args, &failures),
            None => debug!(
                bus = %self.label(),
                %topic,
                %operation,
                failures = failures.len(),
                "Subscriber failures dropped: no exception handler installed"
            ),
        }
    }
}

impl fmt::Debug for BusInner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageBus")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("parent", &self.parent().map(|p| p.label()))
            .field("children", &self.children.read().len())
            .field("topics", &self.subscribers.read().len())
            .field("exception_handler", &self.exception_handler.read().is_some())
            .finish()
    }
}

// Releases the subtree one node at a time; recursive drops would grow the stack with
// the depth of the tree.
impl Drop for BusInner {
    fn drop(&mut self) {
        let mut pending = std::mem::take(self.children.get_mut());
        while let Some(child) = pending.pop() {
            if let Some(mut child) = Arc::into_inner(child) {
                pending.append(child.children.get_mut());
            }
        }
    }
}

fn downcast_publisher<T>(entry: Arc<dyn Any + Send + Sync>) -> Option<Arc<Publisher<T>>>
where
    T: ?Sized + Send + Sync + 'static,
{
    entry.downcast::<Publisher<T>>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Delivery;
    use crate::topic::BroadcastDirection;

    trait Ping: Send + Sync {
        fn ping(&self) -> Delivery;
    }

    struct Noop;

    impl Ping for Noop {
        fn ping(&self) -> Delivery {
            Ok(())
        }
    }

    static PING: Topic<dyn Ping> = Topic::new("ping");

    #[test]
    fn test_child_registers_with_parent() {
        let root = MessageBus::named("root");
        let a = root.child_named("a");
        let b = root.child();

        assert!(root.is_root());
        assert!(!a.is_root());
        assert_eq!(a.parent(), Some(root.clone()));
        assert_eq!(root.children(), vec![a, b]);
    }

    #[test]
    fn test_child_stays_attached_after_handle_dropped() {
        let root = MessageBus::new();
        let first = root.child_named("first");
        drop(root.child_named("second"));
        drop(first);

        let names: Vec<_> =
            root.children().iter().map(|c| c.name().map(str::to_owned)).collect();
        assert_eq!(names, vec![Some("first".to_owned()), Some("second".to_owned())]);
        assert_eq!(root.children()[1].parent(), Some(root.clone()));
    }

    #[test]
    fn test_descendant_handle_keeps_ancestors_alive() {
        let leaf = MessageBus::named("app").child_named("module").child_named("session");

        let module = leaf.parent().unwrap();
        let app = module.parent().unwrap();
        assert_eq!(module.name(), Some("module"));
        assert_eq!(app.name(), Some("app"));
        assert!(app.is_root());
        assert_eq!(app.children(), vec![module.clone()]);
        assert_eq!(module.children(), vec![leaf]);
    }

    #[test]
    fn test_releasing_deep_tree_does_not_grow_stack() {
        const DEPTH: usize = 200_000;

        let released = std::thread::Builder::new()
            .stack_size(256 * 1024)
            .spawn(|| {
                let root = MessageBus::new();
                let mut leaf = root.child();
                for _ in 1..DEPTH {
                    leaf = leaf.child();
                }
                let deepest = Arc::downgrade(&leaf.inner);
                drop(root);
                drop(leaf);
                deepest.upgrade().is_none()
            })
            .unwrap()
            .join()
            .unwrap();

        assert!(released, "the whole chain should be freed with the last handle");
    }

    #[test]
    fn test_same_name_different_capability_keeps_separate_lists() {
        trait Pong: Send + Sync {
            fn pong(&self) -> Delivery;
        }

        impl Pong for Noop {
            fn pong(&self) -> Delivery {
                Ok(())
            }
        }

        let pong = Topic::<dyn Pong>::new("ping");
        let bus = MessageBus::new();
        bus.subscribe(&PING, Arc::new(Noop));
        bus.subscribe(&pong, Arc::new(Noop));
        bus.subscribe(&pong, Arc::new(Noop));

        assert_eq!(bus.inner.subscribers::<dyn Ping>(&PING.id()).unwrap().len(), 1);
        assert_eq!(bus.inner.subscribers::<dyn Pong>(&pong.id()).unwrap().len(), 2);
        assert!(Arc::ptr_eq(&bus.publisher(&PING), &bus.publisher(&PING)));
        assert!(Arc::ptr_eq(&bus.publisher(&pong), &bus.publisher(&pong)));
    }

    #[test]
    fn test_subscriber_snapshot_is_isolated() {
        let bus = MessageBus::new();
        let first: Arc<dyn Ping> = Arc::new(Noop);
        bus.subscribe(&PING, first.clone());

        let snapshot = bus.inner.subscribers::<dyn Ping>(&PING.id()).unwrap();
        bus.subscribe(&PING, Arc::new(Noop));
        assert!(bus.unsubscribe(&PING, &first));

        assert_eq!(snapshot.len(), 1);
        assert!(Arc::ptr_eq(&snapshot[0], &first));
        assert_eq!(bus.inner.subscribers::<dyn Ping>(&PING.id()).unwrap().len(), 1);
    }

    #[test]
    fn test_unsubscribe_unknown_topic_is_noop() {
        let bus = MessageBus::new();
        let subscriber: Arc<dyn Ping> = Arc::new(Noop);
        let other = Topic::<dyn Ping>::with_direction("ping", BroadcastDirection::None);

        bus.subscribe(&PING, subscriber.clone());
        assert!(!bus.unsubscribe(&other, &subscriber));
        assert!(bus.unsubscribe(&PING, &subscriber));
        assert!(!bus.unsubscribe(&PING, &subscriber));
    }

    #[test]
    fn test_exception_handler_is_node_local() {
        let root = MessageBus::new();
        let child = root.child();

        root.set_exception_handler(
            |_: &TopicId, _: &Operation, _: &[&dyn Debug], _: &[DeliveryError]| {},
        );
        assert!(root.exception_handler().is_some());
        assert!(child.exception_handler().is_none());

        root.clear_exception_handler();
        assert!(root.exception_handler().is_none());
    }

    #[test]
    fn test_unnamed_bus_label_uses_id() {
        let bus = MessageBus::new();
        assert!(bus.to_string().starts_with("MessageBus#"));
        assert_eq!(MessageBus::named("app").to_string(), "app");
    }
}
