//! End-to-end conversation scenarios against the public API.

use parley_core::{
    Broker, BrokerError, DeliveryError, Listener, Participant, Received, SYSTEM_SENDER,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock, Weak};
use std::thread;

fn entries(p: &Participant) -> Vec<(String, String)> {
    p.log()
        .into_iter()
        .map(|Received { sender, text, .. }| (sender, text))
        .collect()
}

fn pair(sender: &str, text: &str) -> (String, String) {
    (sender.to_string(), text.to_string())
}

#[test]
fn test_chat_room_conversation() {
    let room = Broker::new();
    let nasim = Participant::new("Nasim");
    let mehedi = Participant::new("Mehedi");

    // Two members: the earlier one is told about the later one.
    room.join(&nasim).unwrap();
    room.join(&mehedi).unwrap();
    assert_eq!(entries(&nasim), vec![pair(SYSTEM_SENDER, "Mehedi joins the chat")]);
    assert!(entries(&mehedi).is_empty());

    // A broadcast reaches everyone but the speaker.
    nasim.say("Hi").unwrap();
    assert_eq!(entries(&mehedi), vec![pair("Nasim", "Hi")]);
    assert_eq!(nasim.log_len(), 1);

    // A third member: both existing members get the notice.
    let shanto = Participant::new("Shanto");
    room.join(&shanto).unwrap();
    assert_eq!(
        nasim.last_received().unwrap(),
        nasim.log()[1],
        "notice appended after earlier entries"
    );
    assert!(nasim.log()[1].is(SYSTEM_SENDER, "Shanto joins the chat"));
    assert!(mehedi.log()[1].is(SYSTEM_SENDER, "Shanto joins the chat"));
    assert!(shanto.log().is_empty());

    // A private message reaches only its recipient.
    let mehedi_before = mehedi.log_len();
    nasim.private_message("Shanto", "Hei shanto").unwrap();
    assert_eq!(entries(&shanto), vec![pair("Nasim", "Hei shanto")]);
    assert_eq!(mehedi.log_len(), mehedi_before);
    assert_eq!(nasim.log_len(), 2);
}

/// Greets every newcomer privately as soon as its join notice arrives.
struct Greeter {
    me: OnceLock<Weak<Participant>>,
}

impl Listener for Greeter {
    fn on_message(&self, _owner: &str, record: &Received) -> Result<(), DeliveryError> {
        if record.sender != SYSTEM_SENDER {
            return Ok(());
        }
        let Some(newcomer) = record.text.strip_suffix(" joins the chat") else {
            return Ok(());
        };
        let me = self
            .me
            .get()
            .and_then(Weak::upgrade)
            .ok_or_else(|| DeliveryError::Internal("greeter detached".into()))?;
        me.private_message(newcomer, "welcome")
            .map(|_| ())
            .map_err(|e| DeliveryError::Internal(e.to_string()))
    }
}

#[test]
fn test_newcomer_not_reachable_during_its_own_join() {
    let room = Broker::new();
    let greeter = Arc::new(Greeter {
        me: OnceLock::new(),
    });
    let nasim = Participant::with_listener("Nasim", greeter.clone());
    greeter.me.set(Arc::downgrade(&nasim)).unwrap();
    room.join(&nasim).unwrap();

    let shanto = Participant::new("Shanto");
    let report = room.join(&shanto).unwrap();
    assert_eq!(report.delivered, 1);
    assert!(report.is_clean());

    // The greeting was routed before Shanto was appended.
    assert!(shanto.log().is_empty());
    assert_eq!(room.stats().messages_routed, 3);
    assert_eq!(room.stats().deliveries, 1);

    // Once the join returns, Shanto is reachable.
    nasim.private_message("Shanto", "welcome").unwrap();
    assert_eq!(entries(&shanto), vec![pair("Nasim", "welcome")]);
}

#[test]
fn test_concurrent_joins_with_one_name() {
    const THREADS: usize = 8;

    let room = Broker::new();
    let first = Participant::new("First");
    room.join(&first).unwrap();

    let twins: Vec<Arc<Participant>> = (0..THREADS).map(|_| Participant::new("Twin")).collect();
    let admitted = AtomicUsize::new(0);

    thread::scope(|s| {
        for twin in &twins {
            let (room, admitted) = (&room, &admitted);
            s.spawn(move || match room.join(twin) {
                Ok(_) => {
                    admitted.fetch_add(1, Ordering::SeqCst);
                }
                Err(BrokerError::DuplicateMember(_)) => {}
                Err(other) => panic!("unexpected join error: {other}"),
            });
        }
    });

    assert_eq!(admitted.load(Ordering::SeqCst), 1);
    assert_eq!(room.member_names(), vec!["First", "Twin"]);
    assert_eq!(twins.iter().filter(|t| t.is_joined()).count(), 1);
    assert_eq!(first.log_len(), 1);
}

#[test]
fn test_say_without_broker() {
    let loner = Participant::new("Loner");
    assert!(matches!(loner.say("anyone?"), Err(BrokerError::NotJoined(_))));
    assert!(loner.log().is_empty());
}

#[test]
fn test_join_notice_reaches_only_earlier_members() {
    let room = Broker::new();
    let names = ["A", "B", "C", "D", "E"];
    let people: Vec<_> = names.iter().map(|n| Participant::new(*n)).collect();

    for (i, p) in people.iter().enumerate() {
        room.join(p).unwrap();
        for earlier in people.iter().take(i) {
            // Welcomes received on arrival plus every later join notice.
            assert_eq!(earlier.log_len(), i);
            assert!(earlier
                .last_received()
                .unwrap()
                .is(SYSTEM_SENDER, &format!("{} joins the chat", names[i])));
        }
        assert_eq!(p.log_len(), 0);

        // Every earlier member can reach the newcomer directly.
        for earlier in people.iter().take(i) {
            let report = earlier.private_message(names[i], "welcome").unwrap();
            assert_eq!(report.delivered, 1);
        }
    }
}

#[test]
fn test_broadcast_fan_out_counts() {
    let room = Broker::new();
    let people: Vec<_> = (0..6).map(|i| Participant::new(format!("p{i}"))).collect();
    for p in &people {
        room.join(p).unwrap();
    }

    for p in &people {
        assert_eq!(p.say("hello").unwrap().delivered, people.len() - 1);
    }
    // Non-member source reaches every member.
    assert_eq!(room.broadcast("outsider", "hi").unwrap().delivered, people.len());
}

#[test]
fn test_direct_message_counts() {
    let room = Broker::new();
    let nasim = Participant::new("Nasim");
    let mehedi = Participant::new("Mehedi");
    room.join(&nasim).unwrap();
    room.join(&mehedi).unwrap();

    assert_eq!(room.direct_message("Nasim", "Mehedi", "x").unwrap().delivered, 1);
    assert_eq!(room.direct_message("Nasim", "Nobody", "x").unwrap().delivered, 0);
    // Sending to yourself is allowed.
    assert_eq!(room.direct_message("Nasim", "Nasim", "note").unwrap().delivered, 1);
}

#[test]
fn test_delivery_order_is_deterministic() {
    fn run() -> Vec<Vec<(String, String)>> {
        let room = Broker::new();
        let people: Vec<_> = ["Nasim", "Mehedi", "Shanto"]
            .into_iter()
            .map(Participant::new)
            .collect();
        for p in &people {
            room.join(p).unwrap();
        }
        people[1].say("Hei, Nasim").unwrap();
        people[2].say("Hi, everyone").unwrap();
        people[0].private_message("Shanto", "Hei shanto").unwrap();
        people.iter().map(|p| entries(p)).collect()
    }

    assert_eq!(run(), run());
}

#[test]
fn test_concurrent_joins_and_broadcasts() {
    const THREADS: usize = 8;
    const MESSAGES: usize = 25;

    let room = Broker::new();
    let people: Vec<Arc<Participant>> = (0..THREADS)
        .map(|i| Participant::new(format!("member-{i}")))
        .collect();

    // Concurrent joiners may miss each other's notices.
    let notices = AtomicUsize::new(0);
    thread::scope(|s| {
        for p in &people {
            let (room, notices) = (&room, &notices);
            s.spawn(move || {
                let report = room.join(p).unwrap();
                notices.fetch_add(report.delivered, Ordering::SeqCst);
            });
        }
    });
    assert_eq!(room.member_count(), THREADS);
    let notices = notices.into_inner();
    assert!(notices <= THREADS * (THREADS - 1) / 2);
    let before: Vec<usize> = people.iter().map(|p| p.log_len()).collect();
    assert_eq!(before.iter().sum::<usize>(), notices);

    thread::scope(|s| {
        for p in &people {
            s.spawn(move || {
                for n in 0..MESSAGES {
                    p.say(format!("{} #{n}", p.name())).unwrap();
                }
            });
        }
    });

    for (p, &skip) in people.iter().zip(&before) {
        let log = p.log().split_off(skip);
        assert_eq!(log.len(), (THREADS - 1) * MESSAGES);
        assert!(log.iter().all(|r| r.sender != p.name()));

        // Per-sender order is preserved.
        for other in people.iter().filter(|o| o.name() != p.name()) {
            let seen: Vec<&str> = log
                .iter()
                .filter(|r| r.sender == other.name())
                .map(|r| r.text.as_str())
                .collect();
            let expected: Vec<String> = (0..MESSAGES)
                .map(|n| format!("{} #{n}", other.name()))
                .collect();
            assert_eq!(seen, expected);
        }
    }

    let stats = room.stats();
    let broadcasts = THREADS * (THREADS - 1) * MESSAGES;
    assert_eq!(stats.deliveries as usize, notices + broadcasts);
}
