use ulid::Ulid;

use crate::grid::Cell;
use crate::model::Trimester;

#[derive(Debug)]
pub enum EngineError {
    NotFound(Ulid),
    AlreadyExists(Ulid),
    DuplicateRoomName(String),
    /// The room already holds a section at this cell.
    RoomOccupied { cell: Cell, by: Ulid },
    /// The trimester group already attends a class at this cell.
    GroupOccupied {
        trimester: Trimester,
        cell: Cell,
        by: Ulid,
    },
    /// Section enrolment exceeds room seats.
    CapacityExceeded {
        room: String,
        capacity: u32,
        students: u32,
    },
    /// Room still referenced by sections.
    RoomInUse(Ulid),
    InvalidTrimester(Trimester),
    InvalidArgument(&'static str),
    LimitExceeded(&'static str),
    WalError(String),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::NotFound(id) => write!(f, "not found: {id}"),
            EngineError::AlreadyExists(id) => write!(f, "already exists: {id}"),
            EngineError::DuplicateRoomName(name) => {
                write!(f, "room name already taken: {name}")
            }
            EngineError::RoomOccupied { cell, by } => {
                write!(f, "time slot {cell} is already booked (placement {by})")
            }
            EngineError::GroupOccupied {
                trimester,
                cell,
                by,
            } => {
                write!(
                    f,
                    "group {trimester} already has a class at {cell} (placement {by})"
                )
            }
            EngineError::CapacityExceeded {
                room,
                capacity,
                students,
            } => {
                write!(
                    f,
                    "room {room} seats {capacity}, cannot take {students} students"
                )
            }
            EngineError::RoomInUse(id) => {
                write!(f, "cannot delete room {id}: sections still assigned")
            }
            EngineError::InvalidTrimester(t) => write!(f, "invalid trimester group: {t}"),
            EngineError::InvalidArgument(msg) => write!(f, "invalid argument: {msg}"),
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::WalError(e) => write!(f, "WAL error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}
