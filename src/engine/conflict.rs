use crate::grid::Cell;
use crate::limits::*;
use crate::model::{RoomState, Trimester};

use super::EngineError;

/// Room-side admission: the cell must be unoccupied.
pub(crate) fn check_room_free(room: &RoomState, cell: Cell) -> Result<(), EngineError> {
    if let Some(placed) = room.occupant(cell) {
        return Err(EngineError::RoomOccupied {
            cell,
            by: placed.placement_id,
        });
    }
    Ok(())
}

/// Seat check, applied when a section is bound to a room.
pub(crate) fn check_capacity(room: &RoomState, students: u32) -> Result<(), EngineError> {
    if students > room.capacity {
        return Err(EngineError::CapacityExceeded {
            room: room.name.clone(),
            capacity: room.capacity,
            students,
        });
    }
    Ok(())
}

pub(crate) fn validate_room_name(name: &str) -> Result<(), EngineError> {
    if name.trim().is_empty() {
        return Err(EngineError::InvalidArgument("empty room name"));
    }
    if name.len() > MAX_ROOM_NAME_LEN {
        return Err(EngineError::LimitExceeded("room name too long"));
    }
    // Room names are embedded in section labels where ',' delimits fields.
    if name.contains(',') || name.contains('(') || name.contains(')') {
        return Err(EngineError::InvalidArgument(
            "room name may not contain ',', '(' or ')'",
        ));
    }
    Ok(())
}

pub(crate) fn validate_course(course: &str) -> Result<(), EngineError> {
    if course.trim().is_empty() {
        return Err(EngineError::InvalidArgument("empty course title"));
    }
    if course.len() > MAX_COURSE_LEN {
        return Err(EngineError::LimitExceeded("course title too long"));
    }
    Ok(())
}

pub(crate) fn validate_students(students: u32) -> Result<(), EngineError> {
    if students == 0 {
        return Err(EngineError::InvalidArgument("student count must be positive"));
    }
    if students > MAX_STUDENTS {
        return Err(EngineError::LimitExceeded("student count too large"));
    }
    Ok(())
}

pub(crate) fn validate_trimester(trimester: Trimester) -> Result<(), EngineError> {
    if !crate::catalog::is_valid_trimester(trimester) {
        return Err(EngineError::InvalidTrimester(trimester));
    }
    Ok(())
}
