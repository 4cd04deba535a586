use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use tokio::sync::RwLock;
use ulid::Ulid;

use crate::grid::{Cell, Day, Slot};
use crate::limits::*;
use crate::model::*;
use crate::notify::Channel;

use super::conflict::*;
use super::{Engine, EngineError, apply_placement};

impl Engine {
    pub async fn add_room(&self, id: Ulid, name: String, capacity: u32) -> Result<(), EngineError> {
        validate_room_name(&name)?;
        if capacity == 0 {
            return Err(EngineError::InvalidArgument("room capacity must be positive"));
        }
        if self.rooms.len() >= MAX_ROOMS_PER_TERM {
            return Err(EngineError::LimitExceeded("too many rooms"));
        }
        if self.rooms.contains_key(&id) {
            return Err(EngineError::AlreadyExists(id));
        }

        // Reserve the name first — concurrent adds race on the map, not the WAL.
        match self.room_names.entry(name.clone()) {
            Entry::Occupied(_) => return Err(EngineError::DuplicateRoomName(name)),
            Entry::Vacant(v) => {
                v.insert(id);
            }
        }

        let event = Event::RoomAdded {
            id,
            name: name.clone(),
            capacity,
        };
        if let Err(e) = self.wal_append(&event).await {
            self.room_names.remove(&name);
            return Err(e);
        }
        self.rooms
            .insert(id, Arc::new(RwLock::new(RoomState::new(id, name, capacity))));
        self.notify_event(&event);
        Ok(())
    }

    /// Rename and/or resize a room. `None` keeps the current value.
    /// Shrinking below the enrolment of any section assigned here is refused.
    pub async fn update_room(
        &self,
        id: Ulid,
        name: Option<String>,
        capacity: Option<u32>,
    ) -> Result<(), EngineError> {
        let rs = self.get_room(&id).ok_or(EngineError::NotFound(id))?;
        let mut guard = rs.write().await;

        let new_name = name.unwrap_or_else(|| guard.name.clone());
        let new_capacity = capacity.unwrap_or(guard.capacity);
        validate_room_name(&new_name)?;
        if new_capacity == 0 {
            return Err(EngineError::InvalidArgument("room capacity must be positive"));
        }

        let max_students = self
            .sections
            .iter()
            .filter(|s| s.value().room_id == id)
            .map(|s| s.value().students)
            .max()
            .unwrap_or(0);
        if new_capacity < max_students {
            return Err(EngineError::CapacityExceeded {
                room: new_name,
                capacity: new_capacity,
                students: max_students,
            });
        }

        let renamed = new_name != guard.name;
        if renamed {
            match self.room_names.entry(new_name.clone()) {
                Entry::Occupied(_) => return Err(EngineError::DuplicateRoomName(new_name)),
                Entry::Vacant(v) => {
                    v.insert(id);
                }
            }
        }

        let event = Event::RoomUpdated {
            id,
            name: new_name.clone(),
            capacity: new_capacity,
        };
        if let Err(e) = self.wal_append(&event).await {
            if renamed {
                self.room_names.remove(&new_name);
            }
            return Err(e);
        }
        if renamed {
            self.room_names.remove(&guard.name);
            guard.name = new_name;
        }
        guard.capacity = new_capacity;
        self.notify_event(&event);
        Ok(())
    }

    pub async fn remove_room(&self, id: Ulid) -> Result<(), EngineError> {
        let rs = self.get_room(&id).ok_or(EngineError::NotFound(id))?;
        let guard = rs.write().await;

        // Sections keep their room binding for the life of the section, so
        // this also rules out live placements.
        if self.sections.iter().any(|s| s.value().room_id == id) {
            return Err(EngineError::RoomInUse(id));
        }

        let event = Event::RoomRemoved { id };
        self.wal_append(&event).await?;
        self.rooms.remove(&id);
        self.room_names.remove(&guard.name);
        drop(guard);
        self.notify_event(&event);
        self.notify.remove(&Channel::Room(id));
        Ok(())
    }

    /// Create a section of `course` for `trimester`, bound to `room_id`.
    /// Returns the assigned per-course section number.
    pub async fn create_section(
        &self,
        id: Ulid,
        course: String,
        trimester: Trimester,
        students: u32,
        room_id: Ulid,
    ) -> Result<u32, EngineError> {
        self.create_section_inner(id, course, trimester, students, room_id, None)
            .await
    }

    /// Restore path: recreate a section under its original number.
    pub(crate) async fn create_section_with_number(
        &self,
        id: Ulid,
        course: String,
        trimester: Trimester,
        students: u32,
        room_id: Ulid,
        number: u32,
    ) -> Result<u32, EngineError> {
        self.create_section_inner(id, course, trimester, students, room_id, Some(number))
            .await
    }

    async fn create_section_inner(
        &self,
        id: Ulid,
        course: String,
        trimester: Trimester,
        students: u32,
        room_id: Ulid,
        number: Option<u32>,
    ) -> Result<u32, EngineError> {
        validate_course(&course)?;
        validate_trimester(trimester)?;
        validate_students(students)?;
        if self.sections.len() >= MAX_SECTIONS_PER_TERM {
            return Err(EngineError::LimitExceeded("too many sections"));
        }
        if self.sections.contains_key(&id) {
            return Err(EngineError::AlreadyExists(id));
        }

        let rs = self.get_room(&room_id).ok_or(EngineError::NotFound(room_id))?;
        let guard = rs.read().await;
        // The room may have been deleted while we waited for the lock.
        if !self.rooms.contains_key(&room_id) {
            return Err(EngineError::NotFound(room_id));
        }
        check_capacity(&guard, students)?;

        let number = match number {
            Some(n) => {
                self.bump_counter(&course, n);
                n
            }
            None => self.take_number(&course),
        };

        let event = Event::SectionCreated {
            id,
            course: course.clone(),
            trimester,
            number,
            students,
            room_id,
        };
        self.wal_append(&event).await?;
        self.sections.insert(
            id,
            SectionState {
                id,
                course,
                trimester,
                number,
                students,
                room_id,
            },
        );
        self.notify_event(&event);
        Ok(number)
    }

    /// Delete a section and every placement of it, in that order on the WAL
    /// so replay never sees a placement of a missing section.
    pub async fn delete_section(&self, id: Ulid) -> Result<(), EngineError> {
        let section = self.get_section(&id).ok_or(EngineError::NotFound(id))?;

        let placed: Vec<Ulid> = self
            .placements
            .iter()
            .filter(|p| p.value().section_id == id)
            .map(|p| *p.key())
            .collect();
        for pid in placed {
            match self.unplace(pid).await {
                Ok(()) | Err(EngineError::NotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }

        let event = Event::SectionDeleted {
            id,
            trimester: section.trimester,
        };
        self.wal_append(&event).await?;
        self.sections.remove(&id);
        self.notify_event(&event);
        Ok(())
    }

    /// Put a section into one half-hour cell of its room.
    pub async fn place(
        &self,
        id: Ulid,
        section_id: Ulid,
        day: Day,
        slot: Slot,
    ) -> Result<(), EngineError> {
        if self.placements.contains_key(&id) {
            return Err(EngineError::AlreadyExists(id));
        }
        let section = self
            .get_section(&section_id)
            .ok_or(EngineError::NotFound(section_id))?;
        let cell = Cell::new(day, slot);
        let rs = self
            .get_room(&section.room_id)
            .ok_or(EngineError::NotFound(section.room_id))?;
        let mut guard = rs.write().await;

        check_room_free(&guard, cell)?;

        // Reserve the group cell before the WAL round-trip; the room lock
        // does not cover same-group placements in other rooms.
        match self.group_index.entry((section.trimester, cell)) {
            Entry::Occupied(e) => {
                return Err(EngineError::GroupOccupied {
                    trimester: section.trimester,
                    cell,
                    by: *e.get(),
                });
            }
            Entry::Vacant(v) => {
                v.insert(id);
            }
        }

        let event = Event::Placed {
            id,
            section_id,
            room_id: section.room_id,
            trimester: section.trimester,
            cell,
        };
        if let Err(e) = self.wal_append(&event).await {
            self.group_index.remove(&(section.trimester, cell));
            return Err(e);
        }
        apply_placement(&mut guard, &event, &self.placements, &self.group_index);
        self.notify_event(&event);
        Ok(())
    }

    /// Atomically place multiple cells (one class meeting spans consecutive
    /// half hours). All-or-nothing: if any cell conflicts, none are
    /// committed. Rows may target sections in different rooms.
    pub async fn batch_place(
        &self,
        items: Vec<(Ulid, Ulid, Day, Slot)>,
    ) -> Result<(), EngineError> {
        if items.is_empty() {
            return Ok(());
        }
        if items.len() > MAX_BATCH_SIZE {
            return Err(EngineError::LimitExceeded("batch too large"));
        }

        let mut resolved: Vec<(Ulid, SectionState, Cell)> = Vec::with_capacity(items.len());
        let mut seen_ids = HashSet::new();
        for (id, section_id, day, slot) in &items {
            if !seen_ids.insert(*id) || self.placements.contains_key(id) {
                return Err(EngineError::AlreadyExists(*id));
            }
            let section = self
                .get_section(section_id)
                .ok_or(EngineError::NotFound(*section_id))?;
            resolved.push((*id, section, Cell::new(*day, *slot)));
        }

        // Intra-batch conflicts: the same room cell or group cell twice.
        let mut room_cells = HashSet::new();
        let mut group_cells = HashSet::new();
        for (id, section, cell) in &resolved {
            if !room_cells.insert((section.room_id, *cell)) {
                return Err(EngineError::RoomOccupied {
                    cell: *cell,
                    by: *id,
                });
            }
            if !group_cells.insert((section.trimester, *cell)) {
                return Err(EngineError::GroupOccupied {
                    trimester: section.trimester,
                    cell: *cell,
                    by: *id,
                });
            }
        }

        // Acquire write locks in sorted order to prevent deadlocks.
        let mut room_ids: Vec<Ulid> = resolved.iter().map(|(_, s, _)| s.room_id).collect();
        room_ids.sort();
        room_ids.dedup();

        let mut guards = HashMap::new();
        for rid in &room_ids {
            let rs = self.get_room(rid).ok_or(EngineError::NotFound(*rid))?;
            guards.insert(*rid, rs.write_owned().await);
        }

        // Phase 1: validate every cell against current state.
        for (_, section, cell) in &resolved {
            check_room_free(&guards[&section.room_id], *cell)?;
        }

        // Reserve all group cells; roll back if any reservation loses a race.
        let mut reserved: Vec<(Trimester, Cell)> = Vec::with_capacity(resolved.len());
        for (id, section, cell) in &resolved {
            match self.group_index.entry((section.trimester, *cell)) {
                Entry::Occupied(e) => {
                    let by = *e.get();
                    drop(e);
                    for key in &reserved {
                        self.group_index.remove(key);
                    }
                    return Err(EngineError::GroupOccupied {
                        trimester: section.trimester,
                        cell: *cell,
                        by,
                    });
                }
                Entry::Vacant(v) => {
                    v.insert(*id);
                    reserved.push((section.trimester, *cell));
                }
            }
        }

        // Phase 2: all validated — commit.
        for (i, (id, section, cell)) in resolved.iter().enumerate() {
            let event = Event::Placed {
                id: *id,
                section_id: section.id,
                room_id: section.room_id,
                trimester: section.trimester,
                cell: *cell,
            };
            if let Err(e) = self.wal_append(&event).await {
                // The durable prefix stands; release the reservations that
                // never reached the WAL.
                for key in &reserved[i..] {
                    self.group_index.remove(key);
                }
                return Err(e);
            }
            let guard = guards.get_mut(&section.room_id).expect("room guard held");
            apply_placement(guard, &event, &self.placements, &self.group_index);
            self.notify_event(&event);
        }

        Ok(())
    }

    /// Take a section out of one cell, by placement id.
    pub async fn unplace(&self, id: Ulid) -> Result<(), EngineError> {
        let info = self.get_placement(&id).ok_or(EngineError::NotFound(id))?;
        let rs = self
            .get_room(&info.room_id)
            .ok_or(EngineError::NotFound(info.room_id))?;
        let mut guard = rs.write().await;
        // Re-check under the lock; a concurrent unplace may have won.
        if !self.placements.contains_key(&id) {
            return Err(EngineError::NotFound(id));
        }

        let event = Event::Unplaced {
            id,
            room_id: info.room_id,
            trimester: info.trimester,
            cell: info.cell,
        };
        self.persist_placement(&mut guard, &event).await
    }

    /// Empty the term: placements, then sections, then rooms. Used by
    /// backup restore before importing.
    pub async fn clear(&self) -> Result<(), EngineError> {
        let placement_ids: Vec<Ulid> = self.placements.iter().map(|p| *p.key()).collect();
        for id in placement_ids {
            match self.unplace(id).await {
                Ok(()) | Err(EngineError::NotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }
        let section_ids: Vec<Ulid> = self.sections.iter().map(|s| *s.key()).collect();
        for id in section_ids {
            match self.delete_section(id).await {
                Ok(()) | Err(EngineError::NotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }
        let room_ids: Vec<Ulid> = self.rooms.iter().map(|r| *r.key()).collect();
        for id in room_ids {
            match self.remove_room(id).await {
                Ok(()) | Err(EngineError::NotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }
        self.counters.clear();
        Ok(())
    }

    /// Hand out the next section number for a course title.
    fn take_number(&self, course: &str) -> u32 {
        let mut entry = self.counters.entry(course.to_string()).or_insert(1);
        let n = *entry;
        *entry += 1;
        n
    }
}
