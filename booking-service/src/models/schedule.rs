//! Schedule, location binding, and slot models.
//!
//! `LocationBinding` is the aggregate the capacity invariant lives on:
//! for every slot, `available == capacity - participants.len()`. All slot
//! mutations go through the methods on `LocationBinding` so the invariant
//! is enforced in one place; nothing else writes slot fields directly.

use crate::error::BookingError;
use mongodb::bson::DateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A bookable offering (class or course) owned by an organization.
/// Capacity is defined here, once per schedule, and applies to every
/// slot of every location the schedule is bound to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Schedule {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub org_id: String,
    pub product_id: Uuid,
    pub name: String,
    pub capacity: u32,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

/// Scheduling mode of the product behind a schedule.
///
/// Open-schedule slots exist only while occupied; fixed-schedule slots
/// belong to a recurring calendar and are reset instead of deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleMode {
    Open,
    Fixed,
}

impl ScheduleMode {
    pub fn from_open_flag(open: bool) -> Self {
        if open {
            ScheduleMode::Open
        } else {
            ScheduleMode::Fixed
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ScheduleMode::Open => "open",
            ScheduleMode::Fixed => "fixed",
        }
    }
}

/// Catalog product document. Only the scheduling mode matters to this
/// service; everything else about products is owned elsewhere.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub org_id: String,
    pub name: String,
    pub schedule_mode: ScheduleMode,
}

/// Status of one participant entry within a slot. Every entry occupies
/// capacity regardless of status; `pending-waiver` marks placeholder
/// entries created by a quantity increase before a named customer is
/// attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ParticipantStatus {
    Confirmed,
    CheckedIn,
    PendingWaiver,
}

impl ParticipantStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParticipantStatus::Confirmed => "confirmed",
            ParticipantStatus::CheckedIn => "checked-in",
            ParticipantStatus::PendingWaiver => "pending-waiver",
        }
    }
}

/// One booked seat in a slot, linked to the transaction that paid for it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParticipantEntry {
    pub id: Uuid,
    pub display_name: String,
    pub customer_id: Option<String>,
    /// Set instead of `customer_id` for group/company bookings.
    pub company_id: Option<String>,
    pub transaction_id: Uuid,
    /// Charged price per seat, in the currency's minor unit.
    pub price_minor: i64,
    pub status: ParticipantStatus,
}

impl ParticipantEntry {
    /// Placeholder entry appended by a quantity increase. A named
    /// customer is attached later, outside this subsystem.
    pub fn placeholder(transaction_id: Uuid, price_minor: i64) -> Self {
        Self {
            id: Uuid::new_v4(),
            display_name: "Additional participant".to_string(),
            customer_id: None,
            company_id: None,
            transaction_id,
            price_minor,
            status: ParticipantStatus::PendingWaiver,
        }
    }
}

/// One concrete bookable time instance ("class") of a schedule at a
/// location.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Slot {
    pub start: DateTime,
    pub duration_minutes: i64,
    /// Remaining seats. Kept equal to `capacity - participants.len()`.
    pub available: u32,
    pub label: Option<String>,
    pub participants: Vec<ParticipantEntry>,
}

impl Slot {
    pub fn occupied(&self) -> u32 {
        self.participants.len() as u32
    }
}

/// Per-(schedule, location) aggregate owning the ordered slot list.
///
/// Concurrent mutations are serialized through `version`: the store only
/// persists an aggregate whose version still matches the one read, so
/// two overlapping read-modify-write cycles cannot both win.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocationBinding {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub org_id: String,
    pub schedule_id: Uuid,
    pub location_id: String,
    pub version: i64,
    pub slots: Vec<Slot>,
    pub updated_at: DateTime,
}

/// Result of a participant move between two slots.
#[derive(Debug, Clone, Copy)]
pub struct SlotMove {
    pub moved: u32,
    pub target_created: bool,
    /// True when the emptied source slot was deleted or reset.
    pub source_freed: bool,
}

/// Result of a quantity resize against one slot.
#[derive(Debug, Clone)]
pub struct SlotResize {
    pub added: Vec<Uuid>,
    pub removed: Vec<Uuid>,
    /// True when the resize emptied the slot and it was deleted or reset.
    pub slot_freed: bool,
}

/// Participants evicted by `free_slot`, plus whether the slot itself was
/// deleted (open mode) or reset in place (fixed mode).
#[derive(Debug, Clone)]
pub struct FreedSlot {
    pub participants: Vec<ParticipantEntry>,
    pub deleted: bool,
}

impl LocationBinding {
    pub fn slot_at(&self, start: DateTime) -> Option<&Slot> {
        self.slots.iter().find(|s| s.start == start)
    }

    fn slot_index(&self, start: DateTime) -> Option<usize> {
        self.slots.iter().position(|s| s.start == start)
    }

    /// Keeps `slots` ordered by start datetime.
    fn insert_slot(&mut self, slot: Slot) {
        let at = self.slots.partition_point(|s| s.start < slot.start);
        self.slots.insert(at, slot);
    }

    /// Moves the named participants from the slot at `from` to the slot
    /// at `to`, creating the target on demand and applying the source
    /// slot's end-of-life rule for `mode`.
    ///
    /// Fails without mutating anything: the target capacity check runs
    /// before any participant leaves the source slot.
    pub fn move_participants(
        &mut self,
        from: DateTime,
        to: DateTime,
        participant_ids: &[Uuid],
        capacity: u32,
        new_duration: Option<i64>,
        mode: ScheduleMode,
    ) -> Result<SlotMove, BookingError> {
        if participant_ids.is_empty() {
            return Err(BookingError::NothingToReschedule);
        }

        let source_idx = self
            .slot_index(from)
            .ok_or_else(|| BookingError::NotFound(format!("slot at {}", from)))?;

        for id in participant_ids {
            if !self.slots[source_idx].participants.iter().any(|p| p.id == *id) {
                return Err(BookingError::NotFound(format!(
                    "participant {} in slot at {}",
                    id, from
                )));
            }
        }

        // Same datetime: nothing moves, but a duration change still lands.
        if from == to {
            if let Some(duration) = new_duration {
                self.slots[source_idx].duration_minutes = duration;
            }
            return Ok(SlotMove {
                moved: participant_ids.len() as u32,
                target_created: false,
                source_freed: false,
            });
        }

        let moving = participant_ids.len() as u32;
        let target_idx = self.slot_index(to);
        let target_available = match target_idx {
            Some(idx) => self.slots[idx].available,
            None => capacity,
        };
        if target_available < moving {
            return Err(BookingError::CapacityExceeded {
                available: target_available,
                requested: moving,
            });
        }

        let source = &mut self.slots[source_idx];
        let mut moved_entries = Vec::with_capacity(participant_ids.len());
        source.participants.retain(|p| {
            if participant_ids.contains(&p.id) {
                moved_entries.push(p.clone());
                false
            } else {
                true
            }
        });
        let source_duration = source.duration_minutes;
        let source_label = source.label.clone();
        let source_emptied = source.participants.is_empty();
        if !source_emptied {
            source.available += moving;
        }

        let target_created = match target_idx {
            Some(idx) => {
                let target = &mut self.slots[idx];
                target.available -= moving;
                target.participants.extend(moved_entries);
                if let Some(duration) = new_duration {
                    target.duration_minutes = duration;
                }
                false
            }
            None => {
                self.insert_slot(Slot {
                    start: to,
                    duration_minutes: new_duration.unwrap_or(source_duration),
                    available: capacity - moving,
                    label: source_label,
                    participants: moved_entries,
                });
                true
            }
        };

        let source_freed = if source_emptied {
            self.retire_slot(from, capacity, mode);
            true
        } else {
            false
        };

        Ok(SlotMove {
            moved: moving,
            target_created,
            source_freed,
        })
    }

    /// Grows or shrinks the participant list of the slot at `at`.
    ///
    /// A positive delta appends placeholder entries charged to
    /// `transaction_id`; a negative delta removes entries from the tail
    /// of the list. Tail-first removal is deliberate: callers that care
    /// which participants go must remove them individually first.
    pub fn resize(
        &mut self,
        at: DateTime,
        delta_qty: i64,
        transaction_id: Uuid,
        price_minor: i64,
        capacity: u32,
        mode: ScheduleMode,
    ) -> Result<SlotResize, BookingError> {
        let idx = self
            .slot_index(at)
            .ok_or_else(|| BookingError::NotFound(format!("slot at {}", at)))?;
        let slot = &mut self.slots[idx];

        if delta_qty > 0 {
            let adding = delta_qty as u32;
            if slot.available < adding {
                return Err(BookingError::CapacityExceeded {
                    available: slot.available,
                    requested: adding,
                });
            }
            let mut added = Vec::with_capacity(adding as usize);
            for _ in 0..adding {
                let entry = ParticipantEntry::placeholder(transaction_id, price_minor);
                added.push(entry.id);
                slot.participants.push(entry);
            }
            slot.available -= adding;
            return Ok(SlotResize {
                added,
                removed: Vec::new(),
                slot_freed: false,
            });
        }

        let dropping = (delta_qty.unsigned_abs() as usize).min(slot.participants.len());
        let keep = slot.participants.len() - dropping;
        let removed: Vec<Uuid> = slot.participants.split_off(keep).iter().map(|p| p.id).collect();
        slot.available += removed.len() as u32;

        let slot_freed = if slot.participants.is_empty() {
            self.retire_slot(at, capacity, mode);
            true
        } else {
            false
        };

        Ok(SlotResize {
            added: Vec::new(),
            removed,
            slot_freed,
        })
    }

    /// Updates the duration of an existing slot without touching capacity.
    pub fn set_duration(&mut self, at: DateTime, duration_minutes: i64) -> Result<(), BookingError> {
        let idx = self
            .slot_index(at)
            .ok_or_else(|| BookingError::NotFound(format!("slot at {}", at)))?;
        self.slots[idx].duration_minutes = duration_minutes;
        Ok(())
    }

    /// Empties the slot at `at` for a cancellation, returning the evicted
    /// participants. Missing or already-empty slots are reported as
    /// `NothingToCancel` so repeated cancels stay idempotent.
    pub fn free_slot(
        &mut self,
        at: DateTime,
        capacity: u32,
        mode: ScheduleMode,
    ) -> Result<FreedSlot, BookingError> {
        let idx = self
            .slot_index(at)
            .ok_or(BookingError::NothingToCancel)?;
        if self.slots[idx].participants.is_empty() {
            return Err(BookingError::NothingToCancel);
        }

        let participants = std::mem::take(&mut self.slots[idx].participants);
        let deleted = match mode {
            ScheduleMode::Open => {
                self.slots.remove(idx);
                true
            }
            ScheduleMode::Fixed => {
                self.slots[idx].available = capacity;
                false
            }
        };

        Ok(FreedSlot {
            participants,
            deleted,
        })
    }

    /// End-of-life for an emptied slot: delete it (open mode) or keep it
    /// as a bookable recurring instance at full availability (fixed mode).
    fn retire_slot(&mut self, at: DateTime, capacity: u32, mode: ScheduleMode) {
        let Some(idx) = self.slot_index(at) else {
            return;
        };
        match mode {
            ScheduleMode::Open => {
                self.slots.remove(idx);
            }
            ScheduleMode::Fixed => {
                let slot = &mut self.slots[idx];
                slot.participants.clear();
                slot.available = capacity;
            }
        }
    }

    /// True when every slot satisfies the capacity invariant.
    pub fn capacity_consistent(&self, capacity: u32) -> bool {
        self.slots
            .iter()
            .all(|s| s.available + s.occupied() == capacity)
    }
}

// =============================================================================
// Tests
// =============================================================================
