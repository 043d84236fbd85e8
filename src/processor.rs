//! Pure reduction over ordered inbound events.
//!
//! A [`Processor`] holds a rule table keyed by event-type string and an
//! initializer for fresh entities. [`Processor::process`] folds the
//! concatenation of past and new inbound events through the matching
//! rules, collecting published outbound events on the way. Outbounds
//! produced while replaying history are kept apart from outbounds produced
//! by new events: only the latter are ever persisted, which is what makes
//! replays idempotent with respect to downstream delivery.

use std::collections::HashMap;

use crate::event::{Event, OutboundEvent};

/// Everything a rule sees for one event application.
///
/// `state` is passed by value and the rule returns the next state;
/// returning the same value unchanged is legal. Call
/// [`publish`](ReducerInput::publish) *before* moving `state` out, since
/// publishing borrows the input.
pub struct ReducerInput<'a, S, E> {
    /// The current accumulator. The rule takes ownership and returns the
    /// next state.
    pub state: S,
    /// Payload of the event being applied.
    pub current: &'a E,
    /// Events already durable before this call, in sequence order.
    pub past_inbound: &'a [Event<E>],
    /// Events the caller is appending, in caller order.
    pub new_inbound: &'a [Event<E>],
    /// Index of the current event within past ++ new.
    pub current_index: usize,
    /// Boundary between past and new in past ++ new
    /// (equals `past_inbound.len()`).
    pub state_index: usize,
    outbox: &'a mut Vec<OutboundEvent>,
}

impl<'a, S, E> ReducerInput<'a, S, E> {
    /// Emit an outbound event from within the rule.
    ///
    /// The processor routes it to the past or new outbound list depending
    /// on whether the current event is replayed history.
    pub fn publish(&mut self, event_type: impl Into<String>, payload: serde_json::Value) {
        self.outbox.push(Event::new(event_type, payload));
    }

    /// All inbound events of this reduction, past then new.
    ///
    /// `current_index` indexes into this order.
    pub fn all(&self) -> impl Iterator<Item = &'a Event<E>> {
        self.past_inbound.iter().chain(self.new_inbound.iter())
    }

    /// Whether the current event is replayed history rather than a new
    /// append.
    pub fn is_replay(&self) -> bool {
        self.current_index < self.state_index
    }
}

/// A rule: pure function from (state, event context) to the next state.
pub type Reducer<S, E> = Box<dyn for<'a> Fn(ReducerInput<'a, S, E>) -> S + Send + Sync>;

/// Result of one reduction.
#[derive(Debug)]
pub struct Processed<S> {
    /// The state after every matching rule has been applied.
    pub state: S,
    /// Outbounds published while replaying past events. Never persisted.
    pub past_outbound: Vec<OutboundEvent>,
    /// Outbounds published while applying new events. Persisted by the
    /// commit.
    pub new_outbound: Vec<OutboundEvent>,
}

/// Rule table plus initializer.
///
/// Rules must be pure and fast: no I/O, no clocks. An event whose type has
/// no rule is skipped without error, so old inbound rows stay replayable
/// after the rule set evolves.
pub struct Processor<S, E> {
    rules: HashMap<String, Reducer<S, E>>,
    initializer: Box<dyn Fn() -> S + Send + Sync>,
}

impl<S, E> std::fmt::Debug for Processor<S, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&str> = self.rules.keys().map(String::as_str).collect();
        names.sort_unstable();
        f.debug_struct("Processor").field("rules", &names).finish()
    }
}

impl<S, E> Processor<S, E> {
    /// Start building a processor. The initializer defaults to
    /// `S::default()`.
    pub fn builder() -> ProcessorBuilder<S, E>
    where
        S: Default + 'static,
    {
        ProcessorBuilder {
            rules: HashMap::new(),
            initializer: Box::new(S::default),
        }
    }

    /// Names of the registered rules, sorted.
    pub fn rule_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.rules.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Fold past and new inbound events into the next state.
    ///
    /// `state` of `None` starts from the initializer. Events are applied
    /// in order over past ++ new; unknown types are skipped. Outbounds
    /// published at an index below the past/new boundary land in
    /// `past_outbound`, the rest in `new_outbound`.
    pub fn process(&self, state: Option<S>, past: &[Event<E>], new: &[Event<E>]) -> Processed<S> {
        let mut state = state.unwrap_or_else(|| (self.initializer)());
        let mut past_outbound = Vec::new();
        let mut new_outbound = Vec::new();
        let state_index = past.len();

        for current_index in 0..past.len() + new.len() {
            let event = if current_index < state_index {
                &past[current_index]
            } else {
                &new[current_index - state_index]
            };
            let Some(rule) = self.rules.get(&event.event_type) else {
                continue;
            };

            let mut outbox = Vec::new();
            state = rule(ReducerInput {
                state,
                current: &event.payload,
                past_inbound: past,
                new_inbound: new,
                current_index,
                state_index,
                outbox: &mut outbox,
            });
            if current_index < state_index {
                past_outbound.append(&mut outbox);
            } else {
                new_outbound.append(&mut outbox);
            }
        }

        Processed {
            state,
            past_outbound,
            new_outbound,
        }
    }
}

/// Builder for a [`Processor`].
pub struct ProcessorBuilder<S, E> {
    rules: HashMap<String, Reducer<S, E>>,
    initializer: Box<dyn Fn() -> S + Send + Sync>,
}

impl<S, E> ProcessorBuilder<S, E> {
    /// Register the rule for an event type. A later registration for the
    /// same type replaces the earlier one.
    pub fn rule<F>(mut self, event_type: impl Into<String>, reducer: F) -> Self
    where
        F: for<'a> Fn(ReducerInput<'a, S, E>) -> S + Send + Sync + 'static,
    {
        self.rules.insert(event_type.into(), Box::new(reducer));
        self
    }

    /// Replace the default initializer for fresh entities.
    pub fn initializer<F>(mut self, initializer: F) -> Self
    where
        F: Fn() -> S + Send + Sync + 'static,
    {
        self.initializer = Box::new(initializer);
        self
    }

    /// Finish building.
    pub fn build(self) -> Processor<S, E> {
        Processor {
            rules: self.rules,
            initializer: self.initializer,
        }
    }
}
