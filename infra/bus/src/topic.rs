use std::any::{TypeId, type_name};
use std::borrow::Cow;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

/// The subset of the bus tree a publish reaches, starting at the publishing node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BroadcastDirection {
    /// The publishing node only.
    None,
    /// The publishing node and every descendant, breadth-first.
    #[default]
    ToChildren,
    /// The publishing node and every ancestor up to the root.
    ToParent,
    /// The publishing node and its immediate children.
    ToDirectChildren,
}

impl fmt::Display for BroadcastDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::None => "NONE",
            Self::ToChildren => "TO_CHILDREN",
            Self::ToParent => "TO_PARENT",
            Self::ToDirectChildren => "TO_DIRECT_CHILDREN",
        })
    }
}

/// A typed identifier for a category of notifications.
///
/// `T` is the capability subscribers implement, usually a trait object such as
/// `dyn SessionListener`. Topics are meant to be declared once as `static` items so
/// that producers and consumers refer to the same value.
///
/// # Examples
/// ```rust
/// use canopy_bus::{capability, BroadcastDirection, Delivery, Topic};
///
/// capability! {
///     pub trait Shutdown {
///         fn requested(&self, reason: &str) -> Delivery;
///     }
/// }
///
/// static SHUTDOWN: Topic<dyn Shutdown> =
///     Topic::with_direction("shutdown", BroadcastDirection::ToChildren);
///
/// assert_eq!(SHUTDOWN.name(), "shutdown");
/// assert_eq!(Topic::<dyn Shutdown>::of().name(), "Shutdown");
/// ```
pub struct Topic<T: ?Sized> {
    name: Cow<'static, str>,
    direction: BroadcastDirection,
    capability: PhantomData<fn() -> *const T>,
}

impl<T: ?Sized + 'static> Topic<T> {
    /// Creates a topic broadcasting [`BroadcastDirection::ToChildren`].
    #[must_use]
    pub const fn new(name: &'static str) -> Self {
        Self::with_direction(name, BroadcastDirection::ToChildren)
    }

    /// Creates a topic with an explicit broadcast direction.
    #[must_use]
    pub const fn with_direction(name: &'static str, direction: BroadcastDirection) -> Self {
        Self { name: Cow::Borrowed(name), direction, capability: PhantomData }
    }

    /// Creates a topic from a runtime name.
    #[must_use]
    pub fn named(name: impl Into<Cow<'static, str>>, direction: BroadcastDirection) -> Self {
        Self { name: name.into(), direction, capability: PhantomData }
    }

    /// Creates a [`BroadcastDirection::ToChildren`] topic named after the capability type.
    #[must_use]
    pub fn of() -> Self {
        Self::named(simple_name(type_name::<T>()), BroadcastDirection::ToChildren)
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn direction(&self) -> BroadcastDirection {
        self.direction
    }

    /// Full type name of the capability, e.g. `dyn app::SessionListener`.
    #[must_use]
    pub fn capability(&self) -> &'static str {
        type_name::<T>()
    }

    /// The type-erased identity of this topic, used as a registry key.
    #[must_use]
    pub fn id(&self) -> TopicId {
        TopicId {
            name: self.name.clone(),
            capability: TypeId::of::<T>(),
            capability_name: type_name::<T>(),
            direction: self.direction,
        }
    }
}

impl<T: ?Sized> Clone for Topic<T> {
    fn clone(&self) -> Self {
        Self { name: self.name.clone(), direction: self.direction, capability: PhantomData }
    }
}

// The capability is part of the type, so only name and direction can differ.
impl<T: ?Sized> PartialEq for Topic<T> {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.direction == other.direction
    }
}

impl<T: ?Sized> Eq for Topic<T> {}

impl<T: ?Sized + 'static> Hash for Topic<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
        TypeId::of::<T>().hash(state);
        self.direction.hash(state);
    }
}

impl<T: ?Sized> fmt::Debug for Topic<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Topic")
            .field("name", &self.name)
            .field("capability", &type_name::<T>())
            .field("direction", &self.direction)
            .finish()
    }
}

impl<T: ?Sized> fmt::Display for Topic<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Topic{{name='{}', capability={}, direction={}}}",
            self.name,
            type_name::<T>(),
            self.direction
        )
    }
}

/// Type-erased topic identity: name, capability and direction.
///
/// Two ids are equal only if all three parts are equal, so topics sharing a name
/// but differing in capability or direction never share subscribers.
#[derive(Debug, Clone)]
pub struct TopicId {
    name: Cow<'static, str>,
    capability: TypeId,
    capability_name: &'static str,
    direction: BroadcastDirection,
}

impl TopicId {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn capability(&self) -> &'static str {
        self.capability_name
    }

    #[must_use]
    pub const fn direction(&self) -> BroadcastDirection {
        self.direction
    }
}

impl PartialEq for TopicId {
    fn eq(&self, other: &Self) -> bool {
        self.capability == other.capability
            && self.direction == other.direction
            && self.name == other.name
    }
}

impl Eq for TopicId {}

impl Hash for TopicId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
        self.capability.hash(state);
        self.direction.hash(state);
    }
}

impl fmt::Display for TopicId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Topic{{name='{}', capability={}, direction={}}}",
            self.name, self.capability_name, self.direction
        )
    }
}

/// `dyn app::events::SessionListener` → `SessionListener`.
fn simple_name(full: &'static str) -> &'static str {
    let base = full.strip_prefix("dyn ").unwrap_or(full);
    let base = base.split(['<', ' ']).next().unwrap_or(base);
    base.rsplit("::").next().unwrap_or(base)
}
