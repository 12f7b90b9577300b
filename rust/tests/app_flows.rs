mod support;

use std::time::Duration;

use chrono::{Duration as ChronoDuration, Utc};
use murmur_core::{
    AppAction, AppUpdate, AuthState, BackendError, Message, MessageId, PushDirection, PushError,
    SubscriptionState,
};
use murmur_memory_storage::BackendOp;
use support::{user, wait_until, TestListener, World, TIMEOUT};

fn seed(world: &World, id: &str, from: &str, to: &str, content: &str, minutes_ago: i64) -> MessageId {
    let id = MessageId::from(id);
    world.backend.seed_message(Message {
        id: id.clone(),
        sender: user(from),
        receiver: user(to),
        content: content.to_string(),
        read: false,
        created_at: Utc::now() - ChronoDuration::minutes(minutes_ago),
        sender_name: None,
        sender_avatar_url: None,
    });
    id
}

#[test]
fn inbound_without_open_conversation_bumps_unread_and_directory() {
    let world = World::new();
    let ana = world.signed_in("ana");
    let bob = world.signed_in("bob");

    ana.send("bob", "hola");

    wait_until("bob unread", TIMEOUT, || bob.state().unread_count == 1);
    wait_until("bob directory", TIMEOUT, || {
        bob.state().directory.iter().any(|s| s.peer == user("ana"))
    });
    assert!(bob.state().current_conversation.is_none());
    assert!(world.backend.marked_read().is_empty());
}

#[test]
fn inbound_for_open_conversation_is_shown_and_read() {
    let world = World::new();
    let ana = world.signed_in("ana");
    let bob = world.signed_in("bob");
    bob.open("ana");

    let (listener, updates) = TestListener::new();
    bob.app.listen_for_updates(Box::new(listener));
    let unread_calls = world.backend.calls(BackendOp::UnreadCount);

    ana.send("bob", "are you there?");

    wait_until("message shown", TIMEOUT, || {
        bob.contents() == vec!["are you there?".to_string()]
    });
    wait_until("marked read locally", TIMEOUT, || {
        bob.state()
            .current_conversation
            .map(|c| c.messages[0].read)
            .unwrap_or(false)
    });
    assert_eq!(world.backend.marked_read().len(), 1);
    wait_until("sender metadata", TIMEOUT, || {
        bob.state()
            .current_conversation
            .map(|c| c.messages[0].sender_name.as_deref() == Some("Ana"))
            .unwrap_or(false)
    });
    wait_until("unread refreshed", TIMEOUT, || {
        world.backend.calls(BackendOp::UnreadCount) > unread_calls
    });
    std::thread::sleep(Duration::from_millis(100));

    let updates = updates.lock().unwrap();
    assert!(!updates.is_empty());
    assert!(updates.iter().all(|u| match u {
        AppUpdate::FullState(s) => s.unread_count == 0,
    }));
    let revs: Vec<u64> = updates.iter().map(AppUpdate::rev).collect();
    assert!(revs.windows(2).all(|w| w[0] < w[1]));
}

#[test]
fn local_echo_and_outbound_push_stay_one_entry() {
    let world = World::new();
    let ana = world.signed_in("ana");
    let _bob = world.signed_in("bob");
    ana.open("bob");

    ana.dispatch(AppAction::SetDraft {
        text: "hey".into(),
    });
    ana.send("bob", "  hey  ");

    wait_until("echo shown", TIMEOUT, || ana.contents() == vec!["hey".to_string()]);
    wait_until("composer cleared", TIMEOUT, || {
        let c = ana.state().composer;
        c.draft.is_empty() && !c.sending && c.error.is_none()
    });
    // Give the outbound push time to arrive and be absorbed.
    std::thread::sleep(Duration::from_millis(200));
    assert_eq!(ana.contents(), vec!["hey".to_string()]);
    assert_eq!(ana.state().directory[0].peer, user("bob"));
}

#[test]
fn outbound_from_other_session_appears_in_open_conversation() {
    let world = World::new();
    let _bob = world.signed_in("bob");
    let laptop = world.signed_in("ana");
    let phone = world.signed_in("ana");
    phone.open("bob");

    laptop.send("bob", "sent from the laptop");

    wait_until("observed on phone", TIMEOUT, || {
        phone.contents() == vec!["sent from the laptop".to_string()]
    });
    // Own messages are never marked read by the sender.
    assert!(world.backend.marked_read().is_empty());
}

#[test]
fn hydration_marks_remaining_messages_when_one_is_gone() {
    let world = World::new();
    let m1 = seed(&world, "m1", "ana", "bob", "one", 30);
    let m2 = seed(&world, "m2", "ana", "bob", "two", 20);
    let m3 = seed(&world, "m3", "ana", "bob", "three", 10);
    world
        .backend
        .fail_mark_read(m2.clone(), BackendError::NotFound("gone".into()));

    let bob = world.signed_in("bob");
    wait_until("initial unread", TIMEOUT, || bob.state().unread_count == 3);

    bob.open("ana");
    assert_eq!(bob.contents(), vec!["one", "two", "three"]);

    wait_until("marked", TIMEOUT, || world.backend.marked_read().len() == 2);
    assert_eq!(world.backend.marked_read(), vec![m1.clone(), m3.clone()]);
    wait_until("unread refreshed", TIMEOUT, || bob.state().unread_count == 1);

    let messages = bob.state().current_conversation.unwrap().messages;
    let read: Vec<(String, bool)> = messages
        .iter()
        .map(|m| (m.id.to_string(), m.read))
        .collect();
    assert_eq!(
        read,
        vec![
            ("m1".to_string(), true),
            ("m2".to_string(), false),
            ("m3".to_string(), true),
        ]
    );
}

#[test]
fn failed_mark_is_retried_on_next_hydration() {
    let world = World::new();
    let m1 = seed(&world, "m1", "ana", "bob", "one", 5);
    world
        .backend
        .fail_mark_read(m1.clone(), BackendError::Transient("flaky".into()));

    let bob = world.signed_in("bob");
    wait_until("initial unread", TIMEOUT, || bob.state().unread_count == 1);
    let unread_calls = world.backend.calls(BackendOp::UnreadCount);

    bob.open("ana");
    // The batch's closing unread refresh is queued after the failure report.
    wait_until("batch finished", TIMEOUT, || {
        world.backend.calls(BackendOp::UnreadCount) > unread_calls
    });
    assert_eq!(world.backend.calls(BackendOp::MarkRead), 1);
    assert!(world.backend.marked_read().is_empty());

    world.backend.clear_mark_read_failure(&m1);
    bob.dispatch(AppAction::CloseConversation);
    bob.open("ana");

    wait_until("marked on retry", TIMEOUT, || {
        world.backend.marked_read() == vec![m1.clone()]
    });
    wait_until("unread cleared", TIMEOUT, || bob.state().unread_count == 0);
    assert_eq!(world.backend.calls(BackendOp::MarkRead), 2);
}

#[test]
fn marked_message_is_not_resubmitted_on_reopen() {
    let world = World::new();
    let m1 = seed(&world, "m1", "ana", "bob", "one", 5);

    let bob = world.signed_in("bob");
    bob.open("ana");
    wait_until("marked", TIMEOUT, || world.backend.marked_read() == vec![m1.clone()]);

    bob.dispatch(AppAction::CloseConversation);
    bob.open("ana");
    std::thread::sleep(Duration::from_millis(200));
    assert_eq!(world.backend.calls(BackendOp::MarkRead), 1);
}

#[test]
fn live_read_flag_survives_older_history_snapshot() {
    let world = World::new();
    let m1 = seed(&world, "m1", "ana", "bob", "one", 5);
    // The history response is captured before the delay, so it still says
    // unread when it lands.
    world
        .backend
        .set_history_delay(user("ana"), Duration::from_millis(500));

    let bob = world.signed_in("bob");
    bob.dispatch(AppAction::OpenConversation { peer: user("ana") });
    wait_until("loading", TIMEOUT, || bob.state().busy.loading_history);

    let record = serde_json::to_value(world.backend.message(&m1).unwrap()).unwrap();
    world
        .hub
        .inject_raw(&user("bob"), PushDirection::ToSubscriber, record);

    let read_flags = |bob: &support::Client| -> Vec<(String, bool)> {
        bob.state()
            .current_conversation
            .map(|c| c.messages.iter().map(|m| (m.id.to_string(), m.read)).collect())
            .unwrap_or_default()
    };
    wait_until("read before history", TIMEOUT, || {
        read_flags(&bob) == vec![("m1".to_string(), true)]
    });
    wait_until("history applied", TIMEOUT, || !bob.state().busy.loading_history);

    assert_eq!(read_flags(&bob), vec![("m1".to_string(), true)]);
    assert_eq!(world.backend.message(&m1).map(|m| m.read), Some(true));
    assert_eq!(world.backend.calls(BackendOp::MarkRead), 1);
    wait_until("unread", TIMEOUT, || bob.state().unread_count == 0);
}

#[test]
fn late_history_for_previous_peer_is_discarded() {
    let world = World::new();
    let from_carol = seed(&world, "c1", "carol", "bob", "from carol", 10);
    seed(&world, "a1", "ana", "bob", "from ana", 5);
    world
        .backend
        .set_history_delay(user("carol"), Duration::from_millis(400));

    let bob = world.signed_in("bob");
    bob.dispatch(AppAction::OpenConversation { peer: user("carol") });
    bob.dispatch(AppAction::OpenConversation { peer: user("ana") });

    wait_until("ana loaded", TIMEOUT, || {
        bob.contents() == vec!["from ana".to_string()]
    });
    std::thread::sleep(Duration::from_millis(600));

    let state = bob.state();
    assert_eq!(state.open_peer(), Some(&user("ana")));
    assert_eq!(bob.contents(), vec!["from ana".to_string()]);
    assert!(!world.backend.marked_read().contains(&from_carol));
}

#[test]
fn inbound_from_other_peer_leaves_open_conversation_alone() {
    let world = World::new();
    let carol = world.signed_in("carol");
    let bob = world.signed_in("bob");
    bob.open("ana");

    carol.send("bob", "psst");

    wait_until("unread", TIMEOUT, || bob.state().unread_count == 1);
    wait_until("directory", TIMEOUT, || {
        bob.state().directory.iter().any(|s| s.peer == user("carol"))
    });
    assert!(bob.contents().is_empty());
    assert_eq!(bob.state().open_peer(), Some(&user("ana")));
    // The synthesized entry for the open peer survives the refresh.
    assert!(bob.state().directory.iter().any(|s| s.peer == user("ana")));
}

#[test]
fn one_live_subscription_per_identity() {
    let world = World::new();
    let app = world.signed_in("ana");
    app.sign_in("carol");
    app.sign_in("ana");

    wait_until("stale subscriptions released", TIMEOUT, || {
        world.hub.active_subscriptions(&user("ana")) == 1
            && world.hub.active_subscriptions(&user("carol")) == 0
    });

    // Re-signing in as the same user is a no-op.
    app.dispatch(AppAction::SignIn { user: user("ana") });
    std::thread::sleep(Duration::from_millis(100));
    assert_eq!(world.hub.active_subscriptions(&user("ana")), 1);
}

#[test]
fn malformed_push_payloads_are_dropped() {
    let world = World::new();
    let ana = world.signed_in("ana");
    let bob = world.signed_in("bob");
    bob.open("ana");

    world.hub.inject_raw(
        &user("bob"),
        PushDirection::ToSubscriber,
        serde_json::json!({"id": 7, "garbage": true}),
    );
    world.hub.inject_raw(
        &user("bob"),
        PushDirection::ToSubscriber,
        serde_json::json!({
            "id": "x1",
            "sender_email": user("ana").as_str(),
            "receiver_email": user("bob").as_str(),
            "content": "no timestamp",
        }),
    );
    ana.send("bob", "real");

    wait_until("real message shown", TIMEOUT, || {
        bob.contents() == vec!["real".to_string()]
    });
    let state = bob.state();
    assert!(state.subscription.is_live());
    assert!(state.toast.is_none());
}

#[test]
fn channel_error_stops_delivery_until_reconnect() {
    let world = World::new();
    let ana = world.signed_in("ana");
    let bob = world.signed_in("bob");
    bob.open("ana");

    world.hub.fail_channels(&user("bob"), "network down");
    wait_until("error state", TIMEOUT, || {
        matches!(bob.state().subscription, SubscriptionState::Error { .. })
    });

    ana.send("bob", "while offline");
    std::thread::sleep(Duration::from_millis(200));
    assert!(bob.contents().is_empty());

    bob.dispatch(AppAction::Reconnect);
    wait_until("resubscribed", TIMEOUT, || bob.state().subscription.is_live());
    assert_eq!(world.hub.active_subscriptions(&user("bob")), 1);
    wait_until("missed message counted", TIMEOUT, || {
        bob.state().unread_count == 1
    });

    ana.send("bob", "back online");
    wait_until("live again", TIMEOUT, || {
        bob.contents() == vec!["back online".to_string()]
    });
}

#[test]
fn server_close_and_refused_subscription() {
    let world = World::new();
    let bob = world.signed_in("bob");

    world.hub.close_channels(&user("bob"));
    wait_until("closed", TIMEOUT, || {
        bob.state().subscription == SubscriptionState::Closed
    });

    world
        .hub
        .refuse_subscriptions(Some(PushError::Rejected("quota".into())));
    bob.dispatch(AppAction::Reconnect);
    wait_until("refused", TIMEOUT, || {
        matches!(bob.state().subscription, SubscriptionState::Error { .. })
    });

    world.hub.refuse_subscriptions(None);
    bob.dispatch(AppAction::Reconnect);
    wait_until("subscribed", TIMEOUT, || bob.state().subscription.is_live());
}

#[test]
fn subscribing_state_until_ack() {
    let world = World::new();
    world.hub.hold_acks(true);
    let bob = world.app();
    bob.dispatch(AppAction::SignIn { user: user("bob") });
    wait_until("subscribing", TIMEOUT, || {
        bob.state().subscription == SubscriptionState::Subscribing
            && world.hub.active_subscriptions(&user("bob")) == 1
    });
    world.hub.ack(&user("bob"));
    wait_until("subscribed", TIMEOUT, || bob.state().subscription.is_live());
}

#[test]
fn failed_send_keeps_draft() {
    let world = World::new();
    let ana = world.signed_in("ana");
    ana.open("bob");
    world.backend.fail(
        BackendOp::CreateMessage,
        BackendError::Transient("backend down".into()),
    );

    ana.dispatch(AppAction::SetDraft {
        text: "hello".into(),
    });
    ana.send("bob", "hello");

    wait_until("error surfaced", TIMEOUT, || {
        ana.state().composer.error.is_some()
    });
    let state = ana.state();
    assert_eq!(state.composer.draft, "hello");
    assert!(!state.composer.sending);
    assert!(state.toast.is_some());
    assert!(ana.contents().is_empty());

    ana.dispatch(AppAction::ClearToast);
    world.backend.clear_failure(BackendOp::CreateMessage);
    ana.send("bob", "hello");
    wait_until("sent on retry", TIMEOUT, || {
        ana.contents() == vec!["hello".to_string()] && ana.state().composer.draft.is_empty()
    });
    assert!(ana.state().toast.is_none());
}

#[test]
fn send_while_previous_in_flight_is_rejected_visibly() {
    let world = World::new();
    let ana = world.signed_in("ana");
    ana.open("bob");
    world.backend.set_send_delay(Duration::from_millis(300));

    ana.send("bob", "first");
    wait_until("sending", TIMEOUT, || ana.state().composer.sending);
    ana.send("bob", "second");

    wait_until("second rejected", TIMEOUT, || {
        ana.state().composer.error.as_deref() == Some("Previous message is still sending")
    });
    wait_until("first delivered", TIMEOUT, || {
        ana.contents() == vec!["first".to_string()] && !ana.state().composer.sending
    });
    assert!(ana.state().composer.error.is_none());
    assert_eq!(world.backend.calls(BackendOp::CreateMessage), 1);
}

#[test]
fn invalid_sends_never_reach_the_backend() {
    let world = World::new();
    let ana = world.signed_in("ana");

    ana.send("bob", "   \n\t");
    wait_until("empty rejected", TIMEOUT, || {
        ana.state().composer.error.as_deref() == Some("Message is empty")
    });

    ana.send("ana", "note to self");
    wait_until("self rejected", TIMEOUT, || {
        ana.state().composer.error.as_deref() == Some("You cannot send a message to yourself")
    });

    let signed_out = world.app();
    signed_out.send("bob", "hi");
    wait_until("signed out rejected", TIMEOUT, || {
        signed_out.state().composer.error.is_some()
    });

    assert_eq!(world.backend.calls(BackendOp::CreateMessage), 0);
}

#[test]
fn contacts_exclude_signed_in_user() {
    let world = World::new();
    let bob = world.signed_in("bob");
    wait_until("contacts", TIMEOUT, || bob.state().contacts.len() == 2);
    let contacts = bob.state().contacts;
    assert!(contacts.iter().all(|c| c.user != user("bob")));
    assert!(contacts
        .iter()
        .any(|c| c.user == user("carol") && c.username.as_deref() == Some("Carol")));
}

#[test]
fn sign_out_clears_everything() {
    let world = World::new();
    seed(&world, "m1", "ana", "bob", "one", 5);
    let bob = world.signed_in("bob");
    bob.open("ana");
    bob.dispatch(AppAction::SetDraft {
        text: "unsent".into(),
    });
    wait_until("draft set", TIMEOUT, || bob.state().composer.draft == "unsent");

    bob.dispatch(AppAction::SignOut);
    wait_until("signed out", TIMEOUT, || bob.state().auth == AuthState::LoggedOut);

    let state = bob.state();
    assert_eq!(state.subscription, SubscriptionState::Unsubscribed);
    assert!(state.current_conversation.is_none());
    assert!(state.directory.is_empty());
    assert!(state.contacts.is_empty());
    assert_eq!(state.unread_count, 0);
    assert!(state.composer.draft.is_empty());
    wait_until("subscription released", TIMEOUT, || {
        world.hub.active_subscriptions(&user("bob")) == 0
    });
}
