/// Declares a capability trait and makes its publisher implement it.
///
/// Every method must take `&self` and return [`crate::Delivery`]; arguments must
/// implement `Clone` (each subscriber receives its own copy) and `Debug` (they are
/// handed to the exception handler). The generated trait has `Send + Sync` as
/// supertraits.
///
/// Alongside the trait, the macro implements it for `Publisher<dyn Trait>`: each
/// method fans the call out through [`crate::Publisher::publish`] and returns
/// `Ok(())`, whatever the subscribers returned.
///
/// # Examples
/// ```rust
/// use canopy_bus::{capability, Delivery, MessageBus, Topic};
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicU32, Ordering};
///
/// capability! {
///     /// Notified when the module configuration changes.
///     pub trait ConfigListener {
///         fn reloaded(&self, revision: u32) -> Delivery;
///         fn key_changed(&self, key: String, value: String) -> Delivery;
///     }
/// }
///
/// static CONFIG: Topic<dyn ConfigListener> = Topic::new("config");
///
/// #[derive(Default)]
/// struct LastRevision(AtomicU32);
///
/// impl ConfigListener for LastRevision {
///     fn reloaded(&self, revision: u32) -> Delivery {
///         self.0.store(revision, Ordering::Relaxed);
///         Ok(())
///     }
///
///     fn key_changed(&self, _key: String, _value: String) -> Delivery {
///         Err("read-only".into())
///     }
/// }
///
/// let bus = MessageBus::new();
/// let last = Arc::new(LastRevision::default());
/// bus.subscribe(&CONFIG, last.clone());
///
/// let publisher = bus.publisher(&CONFIG);
/// publisher.reloaded(3).unwrap();
/// // Subscriber errors never reach the caller.
/// assert!(publisher.key_changed("mode".into(), "fast".into()).is_ok());
/// assert_eq!(last.0.load(Ordering::Relaxed), 3);
/// ```
#[macro_export]
macro_rules! capability {
    (
        $(#[$attr:meta])*
        $vis:vis trait $name:ident {
            $(
                $(#[$method_attr:meta])*
                fn $method:ident(&self $(, $arg:ident : $arg_ty:ty)* $(,)?) -> $ret:ty;
            )*
        }
    ) => {
        $(#[$attr])*
        $vis trait $name: ::core::marker::Send + ::core::marker::Sync {
            $(
                $(#[$method_attr])*
                fn $method(&self $(, $arg: $arg_ty)*) -> $ret;
            )*
        }

        #[automatically_derived]
        impl $name for $crate::Publisher<dyn $name> {
            $(
                fn $method(&self $(, $arg: $arg_ty)*) -> $ret {
                    self.publish(
                        $crate::Operation::new(::core::stringify!($name), ::core::stringify!($method)),
                        &[$(&$arg as &dyn ::core::fmt::Debug),*],
                        |subscriber| subscriber.$method($(::core::clone::Clone::clone(&$arg)),*),
                    );
                    ::core::result::Result::Ok(())
                }
            )*
        }
    };
}
