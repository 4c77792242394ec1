mod fixtures;

use canopy_bus::{BroadcastDirection, MessageBus, Topic};
use fixtures::{EventListener, Journal, chain};

/// Subscribes one listener per depth on a five-level chain and publishes at depth 2.
fn publish_mid_chain(direction: BroadcastDirection) -> Vec<&'static str> {
    const LABELS: [&str; 5] = ["depth0", "depth1", "depth2", "depth3", "depth4"];

    let topic = Topic::<dyn EventListener>::with_direction("Event", direction);
    let journal = Journal::new();
    let buses = chain(LABELS.len());

    for (bus, label) in buses.iter().zip(LABELS) {
        bus.subscribe(&topic, journal.listener(label));
    }

    buses[2].publisher(&topic).on_event("Test").unwrap();
    journal.labels()
}

#[test]
fn test_broadcast_none() {
    assert_eq!(publish_mid_chain(BroadcastDirection::None), vec!["depth2"]);
}

#[test]
fn test_broadcast_to_children() {
    assert_eq!(
        publish_mid_chain(BroadcastDirection::ToChildren),
        vec!["depth2", "depth3", "depth4"]
    );
}

#[test]
fn test_broadcast_to_direct_children() {
    assert_eq!(publish_mid_chain(BroadcastDirection::ToDirectChildren), vec!["depth2", "depth3"]);
}

#[test]
fn test_broadcast_to_parent() {
    assert_eq!(
        publish_mid_chain(BroadcastDirection::ToParent),
        vec!["depth2", "depth1", "depth0"]
    );
}

#[test]
fn test_to_parent_skips_nodes_without_subscribers() {
    let topic = Topic::<dyn EventListener>::with_direction("Event", BroadcastDirection::ToParent);
    let journal = Journal::new();
    let buses = chain(4);

    buses[0].subscribe(&topic, journal.listener("root"));
    buses[3].subscribe(&topic, journal.listener("leaf"));

    buses[3].publisher(&topic).on_event("up").unwrap();

    assert_eq!(journal.labels(), vec!["leaf", "root"]);
}

#[test]
fn test_to_direct_children_reaches_every_sibling_once() {
    let topic =
        Topic::<dyn EventListener>::with_direction("Event", BroadcastDirection::ToDirectChildren);
    let journal = Journal::new();

    let app = MessageBus::named("app");
    let auth = app.child_named("auth");
    let billing = app.child_named("billing");
    let session = auth.child_named("session");

    app.subscribe(&topic, journal.listener("app"));
    auth.subscribe(&topic, journal.listener("auth"));
    billing.subscribe(&topic, journal.listener("billing"));
    session.subscribe(&topic, journal.listener("session"));

    app.publisher(&topic).on_event("reload").unwrap();

    assert_eq!(journal.labels(), vec!["app", "auth", "billing"]);
}

#[test]
fn test_to_children_covers_wide_tree_breadth_first() {
    let topic = Topic::<dyn EventListener>::new("Event");
    let journal = Journal::new();

    let app = MessageBus::named("app");
    let left = app.child();
    let right = app.child();
    let left_session = left.child();
    let right_session = right.child();

    right_session.subscribe(&topic, journal.listener("right_session"));
    left_session.subscribe(&topic, journal.listener("left_session"));
    right.subscribe(&topic, journal.listener("right"));
    left.subscribe(&topic, journal.listener("left"));
    app.subscribe(&topic, journal.listener("app"));

    app.publisher(&topic).on_event("broadcast").unwrap();

    assert_eq!(journal.labels(), vec!["app", "left", "right", "left_session", "right_session"]);
}

#[test]
fn test_topics_differing_only_in_direction_are_isolated() {
    let children = Topic::<dyn EventListener>::with_direction("Event", BroadcastDirection::ToChildren);
    let none = Topic::<dyn EventListener>::with_direction("Event", BroadcastDirection::None);
    let journal = Journal::new();

    let bus = MessageBus::new();
    bus.subscribe(&children, journal.listener("children"));
    bus.subscribe(&none, journal.listener("none"));

    bus.publisher(&none).on_event("only none").unwrap();

    assert_eq!(journal.entries(), vec![("none", "only none".to_owned())]);
}

/// Creates a session under `module` and keeps only its subscription.
fn register_session(module: &MessageBus, topic: &Topic<dyn EventListener>, journal: &Journal) {
    let session = module.child_named("session");
    session.subscribe(topic, journal.listener("session"));
}

#[test]
fn test_child_without_handle_is_still_visited() {
    for direction in [BroadcastDirection::ToChildren, BroadcastDirection::ToDirectChildren] {
        let topic = Topic::<dyn EventListener>::with_direction("Event", direction);
        let journal = Journal::new();
        let app = MessageBus::named("app");

        register_session(&app, &topic, &journal);
        app.publisher(&topic).on_event("x").unwrap();

        assert_eq!(journal.labels(), vec!["session"], "direction {direction}");
        assert_eq!(app.children().len(), 1);
    }
}

#[test]
fn test_to_parent_from_child_without_handle_reaches_root() {
    let topic = Topic::<dyn EventListener>::with_direction("Event", BroadcastDirection::ToParent);
    let journal = Journal::new();
    let app = MessageBus::named("app");
    app.subscribe(&topic, journal.listener("app"));

    register_session(&app, &topic, &journal);
    let session = app.children().remove(0);
    session.publisher(&topic).on_event("up").unwrap();

    assert_eq!(journal.labels(), vec!["session", "app"]);
}
