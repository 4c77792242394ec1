use crate::args::DemoArgs;
use canopy_bus::{
    BroadcastDirection, Delivery, DeliveryError, MessageBus, Operation, Topic, TopicId, capability,
};
use parking_lot::Mutex;
use std::fmt::Debug;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, info, warn};

capability! {
    /// Notified when a user session is opened somewhere in the tree.
    pub(crate) trait SessionListener {
        fn session_opened(&self, session: String, user: u32) -> Delivery;
    }
}

/// Outcome of one demo run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub(crate) struct Summary {
    pub nodes: usize,
    pub delivered: usize,
    pub failures: Vec<String>,
}

/// Subscriber registered on every node; counts deliveries and optionally refuses them.
#[derive(Debug)]
struct Audit {
    node: String,
    refuse: bool,
    delivered: Arc<AtomicUsize>,
}

impl SessionListener for Audit {
    fn session_opened(&self, session: String, user: u32) -> Delivery {
        self.delivered.fetch_add(1, Ordering::Relaxed);
        if self.refuse {
            return Err(format!("{} refused session {session} for user {user}", self.node).into());
        }
        debug!(node = %self.node, %session, user, "Session event received");
        Ok(())
    }
}

/// Builds the tree described by `args`, publishes one event and reports what happened.
pub(crate) fn run(args: &DemoArgs) -> Summary {
    let direction = BroadcastDirection::from(args.direction);
    let topic = Topic::<dyn SessionListener>::named("sessions", direction);

    let failures = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&failures);
    let app = MessageBus::builder()
        .name("app")
        .exception_handler(
            move |topic: &TopicId,
                  operation: &Operation,
                  args: &[&dyn Debug],
                  errors: &[DeliveryError]| {
                for error in errors {
                    warn!(%topic, %operation, ?args, %error, "Subscriber failed");
                }
                sink.lock().extend(errors.iter().map(ToString::to_string));
            },
        )
        .build();

    let delivered = Arc::new(AtomicUsize::new(0));
    let mut registered = 0usize;
    let mut subscribe = |bus: &MessageBus| {
        registered += 1;
        let audit = Audit {
            node: bus.to_string(),
            refuse: args.fail_every != 0 && registered % args.fail_every == 0,
            delivered: Arc::clone(&delivered),
        };
        bus.subscribe(&topic, Arc::new(audit) as Arc<dyn SessionListener>);
    };

    subscribe(&app);
    let mut nodes = 1;
    for m in 0..args.modules {
        let module = app.child_named(format!("module:{m}"));
        subscribe(&module);
        nodes += 1;
        for s in 0..args.sessions {
            let session = module.child_named(format!("module:{m}/session:{s}"));
            subscribe(&session);
            nodes += 1;
        }
    }
    info!(nodes, %topic, "Bus tree ready");

    // Upward broadcasts start at the deepest node. Handlers are node-local, so it gets one too.
    let mut origin = app.clone();
    if matches!(direction, BroadcastDirection::ToParent) {
        while let Some(last) = origin.children().pop() {
            origin = last;
        }
    }
    if origin != app {
        let sink = Arc::clone(&failures);
        origin.set_exception_handler(
            move |_: &TopicId, _: &Operation, _: &[&dyn Debug], errors: &[DeliveryError]| {
                sink.lock().extend(errors.iter().map(ToString::to_string));
            },
        );
    }

    let publisher = origin.publisher(&topic);
    if let Err(error) = publisher.session_opened("demo-session".to_owned(), 42) {
        warn!(%error, "Publish reported an error");
    }

    let summary = Summary {
        nodes,
        delivered: delivered.load(Ordering::Relaxed),
        failures: failures.lock().clone(),
    };
    info!(
        origin = %origin,
        nodes = summary.nodes,
        delivered = summary.delivered,
        failures = summary.failures.len(),
        "Session event published"
    );
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn args(flags: &[&str]) -> DemoArgs {
        DemoArgs::try_parse_from(std::iter::once("canopy").chain(flags.iter().copied())).unwrap()
    }

    #[test]
    fn test_to_children_reaches_whole_tree() {
        let summary = run(&args(&["--modules", "3", "--sessions", "2"]));
        assert_eq!(summary.nodes, 1 + 3 + 3 * 2);
        assert_eq!(summary.delivered, 10);
        assert!(summary.failures.is_empty());
    }

    #[test]
    fn test_direct_children_and_none() {
        let summary = run(&args(&["--direction", "to-direct-children"]));
        assert_eq!(summary.delivered, 4);

        let summary = run(&args(&["--direction", "none"]));
        assert_eq!(summary.delivered, 1);
    }

    #[test]
    fn test_to_parent_walks_from_deepest_session() {
        let summary = run(&args(&["--modules", "2", "--sessions", "3", "--direction", "to-parent"]));
        assert_eq!(summary.delivered, 3, "session, module and app");
    }

    #[test]
    fn test_failures_are_reported_without_stopping_delivery() {
        let summary = run(&args(&["--modules", "2", "--sessions", "1", "--fail-every", "2"]));

        assert_eq!(summary.delivered, 5);
        assert_eq!(summary.failures.len(), 2);
        assert!(summary.failures.iter().all(|f| f.starts_with("Subscriber rejected delivery (")));
        assert!(summary.failures[0].contains("refused session demo-session for user 42"));
    }
}
