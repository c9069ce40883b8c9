//! In-process publish/subscribe for change order lifecycle events
//!
//! The bus is an ordinary value: whoever creates it owns it and drops or
//! [`EventBus::dispose`]s it. Delivery is synchronous and single-threaded.
//! A listener that fails (returns `Err` or panics) is logged and skipped;
//! the remaining listeners of the same publish still run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::rc::{Rc, Weak};

use crate::core::entity::{ChangeStatus, ChangeType};
use crate::core::identity::EntityId;
use crate::entities::change_order::RevisionAssignment;

/// Topic that receives every event, after the topic-specific listeners
pub const WILDCARD: &str = "*";

pub type ListenerError = Box<dyn std::error::Error>;
pub type ListenerResult = Result<(), ListenerError>;

type Listener<P> = Rc<dyn Fn(&P, &str) -> ListenerResult>;

struct Slot<P> {
    id: u64,
    once: bool,
    listener: Listener<P>,
}

struct Registry<P> {
    next_id: u64,
    topics: HashMap<String, Vec<Slot<P>>>,
}

impl<P> Registry<P> {
    fn remove(&mut self, topic: &str, id: u64) -> bool {
        let Some(slots) = self.topics.get_mut(topic) else {
            return false;
        };
        let before = slots.len();
        slots.retain(|s| s.id != id);
        let removed = slots.len() != before;
        if slots.is_empty() {
            self.topics.remove(topic);
        }
        removed
    }

    /// Listeners for one publish; one-shot listeners are taken out first so a
    /// re-entrant publish cannot deliver to them twice
    fn take_snapshot(&mut self, topic: &str) -> Vec<Listener<P>> {
        let Some(slots) = self.topics.get_mut(topic) else {
            return Vec::new();
        };
        let snapshot = slots.iter().map(|s| Rc::clone(&s.listener)).collect();
        slots.retain(|s| !s.once);
        if slots.is_empty() {
            self.topics.remove(topic);
        }
        snapshot
    }
}

/// Handle returned by [`EventBus::subscribe`]
pub struct Subscription<P> {
    registry: Weak<RefCell<Registry<P>>>,
    topic: String,
    id: u64,
}

impl<P> Subscription<P> {
    /// Stop future deliveries. Safe to call any number of times, and after
    /// the bus has been disposed.
    pub fn unsubscribe(&self) -> bool {
        match self.registry.upgrade() {
            Some(registry) => registry.borrow_mut().remove(&self.topic, self.id),
            None => false,
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }
}

/// Outcome of one publish
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishReport {
    pub delivered: usize,
    pub failed: usize,
}

pub struct EventBus<P> {
    registry: Rc<RefCell<Registry<P>>>,
}

impl<P> Default for EventBus<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P> Clone for EventBus<P> {
    /// Clones share the same listener registry
    fn clone(&self) -> Self {
        Self {
            registry: Rc::clone(&self.registry),
        }
    }
}

impl<P> EventBus<P> {
    pub fn new() -> Self {
        Self {
            registry: Rc::new(RefCell::new(Registry {
                next_id: 1,
                topics: HashMap::new(),
            })),
        }
    }

    pub fn subscribe<F>(&self, topic: &str, listener: F) -> Subscription<P>
    where
        F: Fn(&P, &str) -> ListenerResult + 'static,
    {
        self.insert(topic, false, Rc::new(listener))
    }

    /// Like [`subscribe`](Self::subscribe), removed after the first delivery
    pub fn once<F>(&self, topic: &str, listener: F) -> Subscription<P>
    where
        F: Fn(&P, &str) -> ListenerResult + 'static,
    {
        self.insert(topic, true, Rc::new(listener))
    }

    fn insert(&self, topic: &str, once: bool, listener: Listener<P>) -> Subscription<P> {
        let mut registry = self.registry.borrow_mut();
        let id = registry.next_id;
        registry.next_id += 1;
        registry
            .topics
            .entry(topic.to_string())
            .or_default()
            .push(Slot { id, once, listener });
        Subscription {
            registry: Rc::downgrade(&self.registry),
            topic: topic.to_string(),
            id,
        }
    }

    /// Deliver `payload` to the topic's listeners, then to wildcard listeners
    pub fn publish(&self, topic: &str, payload: &P) -> PublishReport {
        let listeners = {
            let mut registry = self.registry.borrow_mut();
            let mut listeners = registry.take_snapshot(topic);
            if topic != WILDCARD {
                listeners.extend(registry.take_snapshot(WILDCARD));
            }
            listeners
        };

        let mut report = PublishReport::default();
        for listener in listeners {
            let outcome = catch_unwind(AssertUnwindSafe(|| listener(payload, topic)));
            match outcome {
                Ok(Ok(())) => report.delivered += 1,
                Ok(Err(e)) => {
                    report.failed += 1;
                    tracing::warn!(topic, error = %e, "event listener failed");
                }
                Err(_) => {
                    report.failed += 1;
                    tracing::warn!(topic, "event listener panicked");
                }
            }
        }
        report
    }

    /// Remove listeners for one topic, or for every topic
    pub fn clear(&self, topic: Option<&str>) {
        let mut registry = self.registry.borrow_mut();
        match topic {
            Some(t) => {
                registry.topics.remove(t);
            }
            None => registry.topics.clear(),
        }
    }

    pub fn listener_count(&self, topic: &str) -> usize {
        self.registry
            .borrow()
            .topics
            .get(topic)
            .map_or(0, Vec::len)
    }

    /// Drop every listener; outstanding subscriptions become no-ops
    pub fn dispose(self) {
        self.clear(None);
    }
}

pub const CHANGE_ORDER_CREATED: &str = "CHANGE_ORDER_CREATED";
pub const CHANGE_ORDER_SUBMITTED: &str = "CHANGE_ORDER_SUBMITTED";
pub const CHANGE_ORDER_STATUS_CHANGED: &str = "CHANGE_ORDER_STATUS_CHANGED";
pub const CHANGE_ORDER_APPROVED: &str = "CHANGE_ORDER_APPROVED";
pub const CHANGE_ORDER_REJECTED: &str = "CHANGE_ORDER_REJECTED";
pub const CHANGE_ORDER_IMPLEMENTED: &str = "CHANGE_ORDER_IMPLEMENTED";

/// Events published after each committed lifecycle step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeOrderEvent {
    #[serde(rename = "CHANGE_ORDER_CREATED")]
    Created {
        change_order_id: EntityId,
        project_id: String,
        change_type: ChangeType,
        number: u32,
        title: String,
        requester_id: String,
        approver_ids: Vec<String>,
        affected_part_ids: Vec<String>,
    },
    #[serde(rename = "CHANGE_ORDER_SUBMITTED")]
    Submitted {
        change_order_id: EntityId,
        project_id: String,
        number: u32,
        title: String,
        submitted_by: String,
        submitted_at: DateTime<Utc>,
    },
    #[serde(rename = "CHANGE_ORDER_STATUS_CHANGED")]
    StatusChanged {
        change_order_id: EntityId,
        from_status: ChangeStatus,
        to_status: ChangeStatus,
        changed_by: String,
        comment: Option<String>,
    },
    #[serde(rename = "CHANGE_ORDER_APPROVED")]
    Approved {
        change_order_id: EntityId,
        project_id: String,
        number: u32,
        title: String,
        approver_id: String,
        approver_comment: Option<String>,
        approved_at: DateTime<Utc>,
    },
    #[serde(rename = "CHANGE_ORDER_REJECTED")]
    Rejected {
        change_order_id: EntityId,
        project_id: String,
        number: u32,
        title: String,
        rejecter_id: String,
        rejection_reason: String,
        rejected_at: DateTime<Utc>,
    },
    #[serde(rename = "CHANGE_ORDER_IMPLEMENTED")]
    Implemented {
        change_order_id: EntityId,
        project_id: String,
        number: u32,
        title: String,
        implemented_by: String,
        implemented_revision_id: EntityId,
        revisions: Vec<RevisionAssignment>,
        implemented_at: DateTime<Utc>,
    },
}

impl ChangeOrderEvent {
    /// Topic name the event is published under
    pub fn name(&self) -> &'static str {
        match self {
            ChangeOrderEvent::Created { .. } => CHANGE_ORDER_CREATED,
            ChangeOrderEvent::Submitted { .. } => CHANGE_ORDER_SUBMITTED,
            ChangeOrderEvent::StatusChanged { .. } => CHANGE_ORDER_STATUS_CHANGED,
            ChangeOrderEvent::Approved { .. } => CHANGE_ORDER_APPROVED,
            ChangeOrderEvent::Rejected { .. } => CHANGE_ORDER_REJECTED,
            ChangeOrderEvent::Implemented { .. } => CHANGE_ORDER_IMPLEMENTED,
        }
    }

    pub fn change_order_id(&self) -> &EntityId {
        match self {
            ChangeOrderEvent::Created { change_order_id, .. }
            | ChangeOrderEvent::Submitted { change_order_id, .. }
            | ChangeOrderEvent::StatusChanged { change_order_id, .. }
            | ChangeOrderEvent::Approved { change_order_id, .. }
            | ChangeOrderEvent::Rejected { change_order_id, .. }
            | ChangeOrderEvent::Implemented { change_order_id, .. } => change_order_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn recorder() -> (Rc<RefCell<Vec<String>>>, EventBus<u32>) {
        (Rc::new(RefCell::new(Vec::new())), EventBus::new())
    }

    #[test]
    fn test_publish_without_subscribers() {
        let bus: EventBus<u32> = EventBus::new();
        assert_eq!(bus.publish("nothing", &1), PublishReport::default());
    }

    #[test]
    fn test_wildcard_runs_after_specific_listeners() {
        let (log, bus) = recorder();

        let l = Rc::clone(&log);
        bus.subscribe(WILDCARD, move |p, name| {
            l.borrow_mut().push(format!("*:{name}:{p}"));
            Ok(())
        });
        let l = Rc::clone(&log);
        bus.subscribe("saved", move |p, _| {
            l.borrow_mut().push(format!("saved:{p}"));
            Ok(())
        });

        let report = bus.publish("saved", &7);
        assert_eq!(report.delivered, 2);
        assert_eq!(*log.borrow(), vec!["saved:7", "*:saved:7"]);
    }

    #[test]
    fn test_failing_listener_is_isolated() {
        let (log, bus) = recorder();

        bus.subscribe("evt", |_, _| Err("boom".into()));
        bus.subscribe("evt", |_, _| panic!("listener bug"));
        let l = Rc::clone(&log);
        bus.subscribe("evt", move |_, _| {
            l.borrow_mut().push("third".to_string());
            Ok(())
        });

        let report = bus.publish("evt", &0);
        assert_eq!(report, PublishReport { delivered: 1, failed: 2 });
        assert_eq!(*log.borrow(), vec!["third"]);
    }

    #[test]
    fn test_unsubscribe_is_idempotent() {
        let hits = Rc::new(Cell::new(0));
        let bus: EventBus<u32> = EventBus::new();
        let h = Rc::clone(&hits);
        let sub = bus.subscribe("evt", move |_, _| {
            h.set(h.get() + 1);
            Ok(())
        });

        bus.publish("evt", &0);
        assert!(sub.unsubscribe());
        assert!(!sub.unsubscribe());
        bus.publish("evt", &0);
        assert_eq!(hits.get(), 1);
        assert_eq!(bus.listener_count("evt"), 0);
    }

    #[test]
    fn test_once_delivers_a_single_time() {
        let hits = Rc::new(Cell::new(0));
        let bus: EventBus<u32> = EventBus::new();
        let h = Rc::clone(&hits);
        let sub = bus.once("evt", move |_, _| {
            h.set(h.get() + 1);
            Ok(())
        });

        bus.publish("evt", &0);
        bus.publish("evt", &0);
        assert_eq!(hits.get(), 1);
        assert!(!sub.unsubscribe());
    }

    #[test]
    fn test_clear_and_count() {
        let bus: EventBus<u32> = EventBus::new();
        bus.subscribe("a", |_, _| Ok(()));
        bus.subscribe("a", |_, _| Ok(()));
        bus.subscribe("b", |_, _| Ok(()));
        assert_eq!(bus.listener_count("a"), 2);

        bus.clear(Some("a"));
        assert_eq!(bus.listener_count("a"), 0);
        assert_eq!(bus.listener_count("b"), 1);

        bus.clear(None);
        assert_eq!(bus.listener_count("b"), 0);
    }

    #[test]
    fn test_dispose_makes_subscriptions_inert() {
        let bus: EventBus<u32> = EventBus::new();
        let sub = bus.subscribe("a", |_, _| Ok(()));
        bus.dispose();
        assert!(!sub.unsubscribe());
    }

    #[test]
    fn test_listener_may_publish_reentrantly() {
        let (log, bus) = recorder();
        let inner = bus.clone();
        let l = Rc::clone(&log);
        bus.subscribe("outer", move |p, _| {
            l.borrow_mut().push(format!("outer:{p}"));
            inner.publish("inner", &(p + 1));
            Ok(())
        });
        let l = Rc::clone(&log);
        bus.subscribe("inner", move |p, _| {
            l.borrow_mut().push(format!("inner:{p}"));
            Ok(())
        });

        bus.publish("outer", &1);
        assert_eq!(*log.borrow(), vec!["outer:1", "inner:2"]);
    }

    #[test]
    fn test_event_names_match_serialized_tag() {
        let event = ChangeOrderEvent::StatusChanged {
            change_order_id: EntityId::new(crate::core::identity::EntityPrefix::Ecr),
            from_status: ChangeStatus::Draft,
            to_status: ChangeStatus::Submitted,
            changed_by: "alice".to_string(),
            comment: None,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], event.name());
        assert_eq!(json["to_status"], "submitted");
    }
}
