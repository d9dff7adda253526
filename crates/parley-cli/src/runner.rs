//! Script execution.
//!
//! Drives a [`Hub`] through a [`Script`]. Participants are created on their
//! first `join` step and looked up by name afterwards.

use crate::config::Settings;
use crate::metrics;
use crate::script::{Script, Step};
use anyhow::{anyhow, Context, Result};
use parley_core::{
    BrokerError, DeliveryReport, Hub, Listener, Participant, ParticipantState, Received, Route,
};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A participant created by the script, and the room it joined.
struct Seat {
    room: String,
    participant: Arc<Participant>,
}

/// Totals for a completed run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Steps executed.
    pub steps: usize,
    /// Successful deliveries, join notices included.
    pub deliveries: usize,
    /// Failures collected under the best-effort policy.
    pub failures: usize,
}

/// One participant's final state.
#[derive(Debug, Clone, Serialize)]
pub struct TranscriptEntry {
    /// Participant name.
    pub name: String,
    /// Room the participant joined.
    pub room: String,
    /// Membership state at the end of the run.
    pub state: ParticipantState,
    /// Received messages, oldest first.
    pub log: Vec<Received>,
}

/// Executes scripts against a hub of rooms.
pub struct Runner {
    hub: Hub,
    default_room: String,
    listener: Option<Arc<dyn Listener>>,
    seats: Vec<Seat>,
    by_name: HashMap<String, usize>,
}

impl Runner {
    /// Create a runner. `listener` is attached to every participant.
    #[must_use]
    pub fn new(settings: &Settings, listener: Option<Arc<dyn Listener>>) -> Self {
        Self {
            hub: Hub::with_config(settings.broker.hub_config()),
            default_room: settings.broker.default_room.clone(),
            listener,
            seats: Vec::new(),
            by_name: HashMap::new(),
        }
    }

    /// Run every step in order, stopping at the first error.
    ///
    /// # Errors
    ///
    /// Returns the failing step's error with its position.
    pub fn run(&mut self, script: &Script) -> Result<RunSummary> {
        let mut summary = RunSummary::default();

        for (n, step) in script.steps.iter().enumerate() {
            let report = self
                .step(step)
                .with_context(|| format!("Step {} failed: {:?}", n + 1, step))?;

            summary.steps += 1;
            summary.deliveries += report.delivered;
            summary.failures += report.failures.len();
        }

        info!(
            steps = summary.steps,
            deliveries = summary.deliveries,
            failures = summary.failures,
            "Script finished"
        );
        Ok(summary)
    }

    fn step(&mut self, step: &Step) -> Result<DeliveryReport> {
        match step {
            Step::Join { who, room } => {
                let room = room.clone().unwrap_or_else(|| self.default_room.clone());
                self.join(who, &room)
            }
            Step::Say { who, text } => {
                let report = self
                    .participant(who)?
                    .say(text.as_str())
                    .map_err(note_abort)?;
                metrics::record_message(&Route::Broadcast, &report);
                Ok(report)
            }
            Step::Whisper { who, to, text } => {
                let report = self
                    .participant(who)?
                    .private_message(to, text.as_str())
                    .map_err(note_abort)?;
                metrics::record_message(&Route::Direct(to.clone()), &report);
                Ok(report)
            }
        }
    }

    fn join(&mut self, who: &str, room: &str) -> Result<DeliveryReport> {
        let broker = self.hub.room(room)?;
        let participant = match self.by_name.get(who) {
            Some(&slot) => Arc::clone(&self.seats[slot].participant),
            None => match &self.listener {
                Some(listener) => Participant::with_listener(who, Arc::clone(listener)),
                None => Participant::new(who),
            },
        };

        let report = broker.join(&participant).map_err(note_abort)?;

        // An ignored duplicate leaves the fresh participant unjoined.
        if participant.is_joined() && !self.by_name.contains_key(who) {
            debug!(member = %who, room = %room, "Seat created");
            self.by_name.insert(who.to_string(), self.seats.len());
            self.seats.push(Seat {
                room: room.to_string(),
                participant,
            });
            metrics::record_join(self.hub.stats().total_members);
        }

        metrics::record_report(&report);
        Ok(report)
    }

    fn participant(&self, who: &str) -> Result<&Arc<Participant>> {
        self.by_name
            .get(who)
            .map(|&slot| &self.seats[slot].participant)
            .ok_or_else(|| anyhow!("Unknown participant: {who} has not joined"))
    }

    /// Final logs of every participant, in join order.
    #[must_use]
    pub fn transcript(&self) -> Vec<TranscriptEntry> {
        self.seats
            .iter()
            .map(|seat| TranscriptEntry {
                name: seat.participant.name().to_string(),
                room: seat.room.clone(),
                state: seat.participant.state(),
                log: seat.participant.log(),
            })
            .collect()
    }

    /// Room names in use.
    #[must_use]
    pub fn rooms(&self) -> Vec<String> {
        self.hub.room_names()
    }
}

fn note_abort(error: BrokerError) -> BrokerError {
    if matches!(error, BrokerError::DeliveryFailed { .. }) {
        warn!(%error, "Routing aborted");
        metrics::record_aborted_delivery();
    }
    error
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::console::tests::SharedBuffer;
    use crate::console::ConsoleListener;
    use parley_core::{DeliveryError, DeliveryPolicy};

    struct Refusing;

    impl Listener for Refusing {
        fn on_message(&self, _owner: &str, _record: &Received) -> Result<(), DeliveryError> {
            Err(DeliveryError::Rejected("busy".into()))
        }
    }

    fn console_runner(settings: &Settings) -> (Runner, SharedBuffer) {
        let buffer = SharedBuffer::default();
        let listener: Arc<dyn Listener> = Arc::new(ConsoleListener::new(Box::new(buffer.clone())));
        (Runner::new(settings, Some(listener)), buffer)
    }

    #[test]
    fn test_demo_output() {
        let (mut runner, buffer) = console_runner(&Settings::default());
        let summary = runner.run(&Script::demo()).unwrap();

        let expected = [
            "[Nasim's chat session] room: 'Mehedi joins the chat'",
            "[Mehedi's chat session] Nasim: 'Hi'",
            "[Nasim's chat session] Mehedi: 'Hei, Nasim'",
            "[Nasim's chat session] room: 'Shanto joins the chat'",
            "[Mehedi's chat session] room: 'Shanto joins the chat'",
            "[Nasim's chat session] Shanto: 'Hi, everyone'",
            "[Mehedi's chat session] Shanto: 'Hi, everyone'",
            "[Shanto's chat session] Nasim: 'Hei shanto'",
        ];
        let output = buffer.contents();
        assert_eq!(output.lines().collect::<Vec<_>>(), expected);

        assert_eq!(
            summary,
            RunSummary {
                steps: 7,
                deliveries: 8,
                failures: 0
            }
        );
        assert_eq!(runner.rooms(), vec!["lobby"]);
    }

    #[test]
    fn test_transcript() {
        let mut runner = Runner::new(&Settings::default(), None);
        runner.run(&Script::demo()).unwrap();

        let transcript = runner.transcript();
        let names: Vec<_> = transcript.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["Nasim", "Mehedi", "Shanto"]);
        assert_eq!(transcript[2].log.len(), 1);
        assert!(transcript[2].log[0].is("Nasim", "Hei shanto"));

        let json = serde_json::to_value(&transcript).unwrap();
        assert_eq!(json[0]["state"], "joined");
        assert_eq!(json[0]["room"], "lobby");
    }

    #[test]
    fn test_unknown_participant() {
        let mut runner = Runner::new(&Settings::default(), None);
        let script = Script {
            steps: vec![Step::Say {
                who: "Ghost".into(),
                text: "boo".into(),
            }],
        };
        let err = runner.run(&script).unwrap_err();
        assert!(format!("{err:#}").contains("Ghost"));
    }

    #[test]
    fn test_separate_rooms() {
        let mut runner = Runner::new(&Settings::default(), None);
        let script = Script::parse(
            r#"
            [[step]]
            action = "join"
            who = "Nasim"
            [[step]]
            action = "join"
            who = "Mehedi"
            room = "kitchen"
            [[step]]
            action = "say"
            who = "Nasim"
            text = "anyone?"
            "#,
        )
        .unwrap();

        let summary = runner.run(&script).unwrap();
        assert_eq!(summary.deliveries, 0);
        assert_eq!(runner.rooms(), vec!["kitchen", "lobby"]);
    }

    #[test]
    fn test_duplicate_join_rejected() {
        let mut runner = Runner::new(&Settings::default(), None);
        let script = Script::parse(
            "[[step]]\naction = \"join\"\nwho = \"Nasim\"\n\
             [[step]]\naction = \"join\"\nwho = \"Nasim\"\n",
        )
        .unwrap();

        let err = runner.run(&script).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<BrokerError>(),
            Some(BrokerError::DuplicateMember(_))
        ));
    }

    #[test]
    fn test_fail_fast_aborts_script() {
        let mut settings = Settings::default();
        settings.broker.delivery = DeliveryPolicy::FailFast;
        let mut runner = Runner::new(&settings, Some(Arc::new(Refusing)));

        let err = runner.run(&Script::demo()).unwrap_err();
        assert!(format!("{err:#}").contains("Step 2"));
        // Nasim refused the notice, so Mehedi never joined.
        let transcript = runner.transcript();
        assert_eq!(transcript.len(), 1);
        assert_eq!(transcript[0].name, "Nasim");
        assert_eq!(runner.hub.stats().total_members, 1);
    }

    #[test]
    fn test_best_effort_counts_failures() {
        let mut runner = Runner::new(&Settings::default(), Some(Arc::new(Refusing)));
        let summary = runner.run(&Script::demo()).unwrap();
        assert_eq!(summary.deliveries, 0);
        assert_eq!(summary.failures, 8);
    }
}
