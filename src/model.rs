use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::grid::Cell;

/// Trimester group number, 1..=12.
pub type Trimester = u8;

/// A concrete offering of a course: the unit the coordinator drags onto
/// the grid. Created from a catalog title (or a free-form one), bound to
/// a room at creation time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionState {
    pub id: Ulid,
    pub course: String,
    pub trimester: Trimester,
    /// Per-course running number ("Group N" in the display label).
    pub number: u32,
    pub students: u32,
    pub room_id: Ulid,
}

/// Occupant of one room cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlacedRef {
    pub placement_id: Ulid,
    pub section_id: Ulid,
}

/// A classroom and its weekly occupancy.
#[derive(Debug, Clone)]
pub struct RoomState {
    pub id: Ulid,
    pub name: String,
    pub capacity: u32,
    /// Cell → occupying placement. One section per cell; ordered so grid
    /// assembly and export walk the week deterministically.
    pub occupancy: BTreeMap<Cell, PlacedRef>,
}

impl RoomState {
    pub fn new(id: Ulid, name: String, capacity: u32) -> Self {
        Self {
            id,
            name,
            capacity,
            occupancy: BTreeMap::new(),
        }
    }

    pub fn is_free(&self, cell: Cell) -> bool {
        !self.occupancy.contains_key(&cell)
    }

    pub fn occupant(&self, cell: Cell) -> Option<PlacedRef> {
        self.occupancy.get(&cell).copied()
    }

    pub fn occupy(&mut self, cell: Cell, placed: PlacedRef) {
        self.occupancy.insert(cell, placed);
    }

    /// Remove a placement by id, returning its cell.
    pub fn vacate(&mut self, placement_id: Ulid) -> Option<Cell> {
        let cell = self
            .occupancy
            .iter()
            .find(|(_, p)| p.placement_id == placement_id)
            .map(|(c, _)| *c)?;
        self.occupancy.remove(&cell);
        Some(cell)
    }
}

/// The event types — flat, no nesting. This is the WAL record format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    RoomAdded {
        id: Ulid,
        name: String,
        capacity: u32,
    },
    RoomUpdated {
        id: Ulid,
        name: String,
        capacity: u32,
    },
    RoomRemoved {
        id: Ulid,
    },
    SectionCreated {
        id: Ulid,
        course: String,
        trimester: Trimester,
        number: u32,
        students: u32,
        room_id: Ulid,
    },
    SectionDeleted {
        id: Ulid,
        trimester: Trimester,
    },
    Placed {
        id: Ulid,
        section_id: Ulid,
        room_id: Ulid,
        trimester: Trimester,
        cell: Cell,
    },
    Unplaced {
        id: Ulid,
        room_id: Ulid,
        trimester: Trimester,
        cell: Cell,
    },
}

// ── Query result types ───────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomInfo {
    pub id: Ulid,
    pub name: String,
    pub capacity: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionInfo {
    pub id: Ulid,
    pub course: String,
    pub trimester: Trimester,
    pub number: u32,
    pub students: u32,
    pub room_id: Ulid,
    pub label: String,
}

/// One row of the normalized placements table; also the engine's
/// placement-index value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlacementInfo {
    pub id: Ulid,
    pub section_id: Ulid,
    pub room_id: Ulid,
    pub trimester: Trimester,
    pub cell: Cell,
}

/// One occupied cell as seen by the group-grid and room-grid views.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellView {
    pub cell: Cell,
    pub placement_id: Ulid,
    pub section_id: Ulid,
    pub course: String,
    pub room_name: String,
    pub label: String,
}

/// One entry of a trimester group's class pool: either a created section
/// (draggable) or a bare catalog title awaiting instantiation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolEntry {
    pub course: String,
    pub section_id: Option<Ulid>,
    pub label: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::{Day, Slot};

    fn cell(day: Day, idx: u8) -> Cell {
        Cell::new(day, Slot::new(idx).unwrap())
    }

    #[test]
    fn room_occupy_and_vacate() {
        let mut room = RoomState::new(Ulid::new(), "P310".into(), 25);
        let placed = PlacedRef {
            placement_id: Ulid::new(),
            section_id: Ulid::new(),
        };
        let c = cell(Day::Monday, 0);

        assert!(room.is_free(c));
        room.occupy(c, placed);
        assert!(!room.is_free(c));
        assert_eq!(room.occupant(c), Some(placed));

        assert_eq!(room.vacate(placed.placement_id), Some(c));
        assert!(room.is_free(c));
        assert_eq!(room.vacate(placed.placement_id), None);
    }

    #[test]
    fn room_occupancy_is_cell_ordered() {
        let mut room = RoomState::new(Ulid::new(), "B3".into(), 50);
        let mk = || PlacedRef {
            placement_id: Ulid::new(),
            section_id: Ulid::new(),
        };
        room.occupy(cell(Day::Friday, 3), mk());
        room.occupy(cell(Day::Monday, 5), mk());
        room.occupy(cell(Day::Monday, 1), mk());

        let cells: Vec<Cell> = room.occupancy.keys().copied().collect();
        assert_eq!(
            cells,
            vec![
                cell(Day::Monday, 1),
                cell(Day::Monday, 5),
                cell(Day::Friday, 3)
            ]
        );
    }

    #[test]
    fn event_serialization_roundtrip() {
        let event = Event::Placed {
            id: Ulid::new(),
            section_id: Ulid::new(),
            room_id: Ulid::new(),
            trimester: 3,
            cell: cell(Day::Wednesday, 7),
        };
        let bytes = bincode::serialize(&event).unwrap();
        let decoded: Event = bincode::deserialize(&bytes).unwrap();
        assert_eq!(event, decoded);
    }
}
