//! Time events and the two scheduling queues.
//!
//! Events live in an arena and are addressed by [`EventId`]. Each event is
//! linked into at most one of the queues at a time; scheduling an event that
//! is already queued moves it. Destroyed slots go on a free list and are
//! handed out again by the next `create`, so an id must not be used after
//! its event was destroyed.

/// Cycle/virtual-time conversion.
pub mod clock;

use std::collections::VecDeque;
use std::fmt;

use crate::{CoreContext, UnitId};

/// Handle of an event in the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventId(u32);

impl EventId {
    const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Time base an event is scheduled in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum TimeDomain {
    /// CPU cycle count.
    Cycles,
    /// Virtual time ticks.
    VirtualTime,
}

/// Callback run when a closure event fires; receives the time the event
/// was scheduled for, in its own domain.
pub type EventCallback = Box<dyn FnMut(&mut CoreContext, u64)>;

/// What happens when an event fires.
pub enum EventAction {
    /// Calls [`crate::IoUnit::time_event`] on `unit` with `tag`.
    Unit {
        /// Receiving unit.
        unit: UnitId,
        /// Opaque value handed back to the unit.
        tag: u32,
    },
    /// Runs a closure.
    Callback(EventCallback),
}

impl fmt::Debug for EventAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unit { unit, tag } => f
                .debug_struct("Unit")
                .field("unit", unit)
                .field("tag", tag)
                .finish(),
            Self::Callback(_) => f.write_str("Callback(..)"),
        }
    }
}

/// Time-ordered queue; equal times keep insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventQueue {
    entries: VecDeque<(u64, EventId)>,
}

impl EventQueue {
    /// Inserts `id` after every entry with time `<= time`.
    pub fn insert(&mut self, time: u64, id: EventId) {
        let position = self.entries.partition_point(|(queued, _)| *queued <= time);
        self.entries.insert(position, (time, id));
    }

    /// Removes `id`; returns `false` when it was not queued.
    pub fn remove(&mut self, id: EventId) -> bool {
        self.entries
            .iter()
            .position(|(_, queued)| *queued == id)
            .and_then(|position| self.entries.remove(position))
            .is_some()
    }

    /// Earliest entry.
    #[must_use]
    pub fn first(&self) -> Option<(u64, EventId)> {
        self.entries.front().copied()
    }

    /// Removes the earliest entry when it is due at `now`.
    pub fn pop_due(&mut self, now: u64) -> Option<(u64, EventId)> {
        match self.entries.front() {
            Some((time, _)) if *time <= now => self.entries.pop_front(),
            _ => None,
        }
    }

    /// Number of entries due at `now`.
    #[must_use]
    pub fn due_count(&self, now: u64) -> usize {
        self.entries.partition_point(|(time, _)| *time <= now)
    }

    /// Number of queued entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` when nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drops every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[derive(Debug)]
struct EventSlot {
    name: String,
    link: Option<(TimeDomain, u64)>,
    action: Option<EventAction>,
    live: bool,
    one_shot: bool,
}

/// Event arena plus the cycle and virtual-time queues.
#[derive(Debug, Default)]
pub struct Scheduler {
    slots: Vec<EventSlot>,
    free: Vec<EventId>,
    cycle_queue: EventQueue,
    virtual_queue: EventQueue,
}

impl Scheduler {
    /// Adds an unscheduled event to the arena.
    pub fn create(&mut self, name: impl Into<String>, action: EventAction) -> EventId {
        self.insert(name.into(), action, false)
    }

    /// Adds an event whose slot is destroyed once it fired and was not
    /// scheduled again, or when the queues are cleared while it waits.
    pub fn create_one_shot(&mut self, name: impl Into<String>, action: EventAction) -> EventId {
        self.insert(name.into(), action, true)
    }

    #[allow(clippy::cast_possible_truncation)]
    fn insert(&mut self, name: String, action: EventAction, one_shot: bool) -> EventId {
        let slot = EventSlot {
            name,
            link: None,
            action: Some(action),
            live: true,
            one_shot,
        };
        if let Some(id) = self.free.pop() {
            self.slots[id.index()] = slot;
            return id;
        }
        let id = EventId(self.slots.len() as u32);
        self.slots.push(slot);
        id
    }

    /// Unlinks `id` and releases its slot; returns `false` for unknown or
    /// already destroyed events.
    pub fn destroy(&mut self, id: EventId) -> bool {
        if !self.is_live(id) {
            return false;
        }
        self.unlink(id);
        if let Some(slot) = self.slots.get_mut(id.index()) {
            slot.live = false;
            slot.one_shot = false;
            slot.action = None;
            slot.name.clear();
        }
        self.free.push(id);
        true
    }

    fn is_live(&self, id: EventId) -> bool {
        self.slots.get(id.index()).is_some_and(|slot| slot.live)
    }

    /// Number of events currently in the arena.
    #[must_use]
    pub fn live_events(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    /// Number of slots the arena has allocated, live or free.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Queues `id` at `time` in `domain`, unlinking it from any prior queue.
    pub fn schedule(&mut self, id: EventId, domain: TimeDomain, time: u64) {
        self.unlink(id);
        let Some(slot) = self.slots.get_mut(id.index()).filter(|slot| slot.live) else {
            tracing::warn!(?id, "schedule of unknown event ignored");
            return;
        };
        slot.link = Some((domain, time));
        self.queue_mut(domain).insert(time, id);
    }

    /// Removes `id` from its queue; returns `false` when it was not queued.
    pub fn unlink(&mut self, id: EventId) -> bool {
        let Some((domain, _)) = self
            .slots
            .get_mut(id.index())
            .and_then(|slot| slot.link.take())
        else {
            return false;
        };
        self.queue_mut(domain).remove(id)
    }

    /// Domain and time `id` is queued at.
    #[must_use]
    pub fn scheduled(&self, id: EventId) -> Option<(TimeDomain, u64)> {
        self.slots.get(id.index()).and_then(|slot| slot.link)
    }

    /// Name given at creation.
    #[must_use]
    pub fn name(&self, id: EventId) -> Option<&str> {
        self.slots
            .get(id.index())
            .filter(|slot| slot.live)
            .map(|slot| slot.name.as_str())
    }

    /// Queue for `domain`.
    #[must_use]
    pub const fn queue(&self, domain: TimeDomain) -> &EventQueue {
        match domain {
            TimeDomain::Cycles => &self.cycle_queue,
            TimeDomain::VirtualTime => &self.virtual_queue,
        }
    }

    const fn queue_mut(&mut self, domain: TimeDomain) -> &mut EventQueue {
        match domain {
            TimeDomain::Cycles => &mut self.cycle_queue,
            TimeDomain::VirtualTime => &mut self.virtual_queue,
        }
    }

    /// Number of events due at `now_cycles` / `now_time` across both queues.
    #[must_use]
    pub fn due_count(&self, now_cycles: u64, now_time: u64) -> usize {
        self.cycle_queue.due_count(now_cycles) + self.virtual_queue.due_count(now_time)
    }

    /// Unlinks the next due event, virtual-time queue first.
    ///
    /// Every due virtual-time event is returned before any due cycle event,
    /// whatever their times convert to, so a drain spanning both queues is
    /// not in strict global time order. Within one queue, order is by time
    /// and then by insertion.
    ///
    /// Returns the event, its queue and the time it was scheduled for.
    pub fn pop_due(
        &mut self,
        now_cycles: u64,
        now_time: u64,
    ) -> Option<(EventId, TimeDomain, u64)> {
        let (domain, (time, id)) = match self.virtual_queue.pop_due(now_time) {
            Some(entry) => (TimeDomain::VirtualTime, entry),
            None => (TimeDomain::Cycles, self.cycle_queue.pop_due(now_cycles)?),
        };
        if let Some(slot) = self.slots.get_mut(id.index()) {
            slot.link = None;
        }
        Some((id, domain, time))
    }

    /// Takes the action out of its slot so it can run with full context.
    pub(crate) fn take_action(&mut self, id: EventId) -> Option<EventAction> {
        self.slots
            .get_mut(id.index())
            .and_then(|slot| slot.action.take())
    }

    /// Puts an action back after it ran, unless the action destroyed its
    /// own event meanwhile.
    ///
    /// A one-shot event that did not reschedule itself is destroyed.
    pub(crate) fn restore_action(&mut self, id: EventId, action: EventAction) {
        let Some(slot) = self
            .slots
            .get_mut(id.index())
            .filter(|slot| slot.live && slot.action.is_none())
        else {
            return;
        };
        if slot.one_shot && slot.link.is_none() {
            self.destroy(id);
        } else {
            slot.action = Some(action);
        }
    }

    /// Empties both queues. Reusable events stay in the arena; one-shot
    /// events are destroyed.
    pub fn clear_queues(&mut self) {
        self.cycle_queue.clear();
        self.virtual_queue.clear();
        for slot in &mut self.slots {
            slot.link = None;
        }
        let expired: Vec<EventId> = self
            .slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.live && slot.one_shot)
            .filter_map(|(index, _)| u32::try_from(index).ok().map(EventId))
            .collect();
        for id in expired {
            self.destroy(id);
        }
    }
}
