//! JSON backup in the legacy coordinator-tool format: nested
//! day → slot-label → section-label maps, with the section labels doubling
//! as the record format. Restore re-derives rooms, sections and placements
//! by parsing those labels back into structured data.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;
use ulid::Ulid;

use crate::engine::{Engine, EngineError};
use crate::grid::{Day, Slot};
use crate::label;
use crate::model::Trimester;

/// day name → slot label → section label.
type ScheduleMap = BTreeMap<String, BTreeMap<String, String>>;

#[derive(Debug, Serialize, Deserialize)]
struct BackupRoom {
    name: String,
    capacity: u32,
    schedule: ScheduleMap,
}

#[derive(Debug, Serialize, Deserialize)]
struct BackupFile {
    classrooms: Vec<BackupRoom>,
    /// Keyed `"Group N"` for trimester groups and by room name for rooms.
    saved_schedule: BTreeMap<String, ScheduleMap>,
    /// Trimester group → labels of its created sections.
    class_pools: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestoreSummary {
    pub rooms: usize,
    pub sections: usize,
    pub placements: usize,
}

#[derive(Debug)]
pub enum SnapshotError {
    Io(std::io::Error),
    Json(serde_json::Error),
    /// A label references a room the backup does not declare.
    UnknownRoom(String),
    BadDay(String),
    BadSlot(String),
    Engine(EngineError),
}

impl fmt::Display for SnapshotError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SnapshotError::Io(e) => write!(f, "backup I/O error: {e}"),
            SnapshotError::Json(e) => write!(f, "backup JSON error: {e}"),
            SnapshotError::UnknownRoom(name) => write!(f, "label references unknown room: {name}"),
            SnapshotError::BadDay(d) => write!(f, "unknown day in backup: {d}"),
            SnapshotError::BadSlot(s) => write!(f, "unknown time slot in backup: {s}"),
            SnapshotError::Engine(e) => write!(f, "engine rejected backup entry: {e}"),
        }
    }
}

impl std::error::Error for SnapshotError {}

impl From<std::io::Error> for SnapshotError {
    fn from(e: std::io::Error) -> Self {
        SnapshotError::Io(e)
    }
}

impl From<serde_json::Error> for SnapshotError {
    fn from(e: serde_json::Error) -> Self {
        SnapshotError::Json(e)
    }
}

impl From<EngineError> for SnapshotError {
    fn from(e: EngineError) -> Self {
        SnapshotError::Engine(e)
    }
}

/// Write the whole term to `path` in the legacy JSON shape.
pub async fn backup(engine: &Engine, path: &Path) -> Result<(), SnapshotError> {
    let mut classrooms = Vec::new();
    let mut saved_schedule: BTreeMap<String, ScheduleMap> = BTreeMap::new();

    for room in engine.list_rooms(None).await {
        let mut schedule = ScheduleMap::new();
        for view in engine.room_grid(room.id).await? {
            schedule
                .entry(view.cell.day.as_str().to_string())
                .or_default()
                .insert(view.cell.slot.label(), view.label);
        }
        // The legacy format stores room schedules twice: inline on the
        // classroom and under the room's name in saved_schedule.
        saved_schedule.insert(room.name.clone(), schedule.clone());
        classrooms.push(BackupRoom {
            name: room.name,
            capacity: room.capacity,
            schedule,
        });
    }

    for trimester in engine.occupied_trimesters() {
        let mut schedule = ScheduleMap::new();
        for view in engine.group_grid(trimester).await? {
            schedule
                .entry(view.cell.day.as_str().to_string())
                .or_default()
                .insert(view.cell.slot.label(), view.label);
        }
        saved_schedule.insert(format!("Group {trimester}"), schedule);
    }

    let mut class_pools: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for section in engine.list_sections(None).await {
        class_pools
            .entry(section.trimester.to_string())
            .or_default()
            .push(section.label);
    }

    let file = BackupFile {
        classrooms,
        saved_schedule,
        class_pools,
    };
    std::fs::write(path, serde_json::to_string_pretty(&file)?)?;
    Ok(())
}

/// Replace the term's state with the backup at `path`.
///
/// Rooms come from the `classrooms` list; sections are re-derived by
/// parsing every label found in the group pools and group schedules
/// (deduplicated by identity); placements replay the `"Group N"`
/// schedules. Room-name schedule keys are projections of the same data
/// and are ignored. Malformed labels are skipped with a warning, as the
/// original tool did.
pub async fn restore(engine: &Engine, path: &Path) -> Result<RestoreSummary, SnapshotError> {
    let text = std::fs::read_to_string(path)?;
    let file: BackupFile = serde_json::from_str(&text)?;

    engine.clear().await?;

    let mut room_ids: HashMap<String, Ulid> = HashMap::new();
    for room in &file.classrooms {
        let id = Ulid::new();
        engine.add_room(id, room.name.clone(), room.capacity).await?;
        room_ids.insert(room.name.clone(), id);
    }

    // Collect every label in the backup: pools carry sections that may not
    // be placed anywhere, group schedules carry the placed ones.
    let mut labels: Vec<String> = Vec::new();
    for pool in file.class_pools.values() {
        labels.extend(pool.iter().cloned());
    }
    for (key, schedule) in &file.saved_schedule {
        if group_key_trimester(key).is_some() {
            for slots in schedule.values() {
                labels.extend(slots.values().cloned());
            }
        }
    }

    // Identity → section id, so each distinct label becomes one section.
    let mut sections: HashMap<(Trimester, String, u32, String, u32), Ulid> = HashMap::new();
    for text in &labels {
        let Some(parsed) = label::parse(text) else {
            warn!("skipping malformed backup label: {text:?}");
            continue;
        };
        let key = (
            parsed.trimester,
            parsed.course.clone(),
            parsed.number,
            parsed.room.clone(),
            parsed.students,
        );
        if sections.contains_key(&key) {
            continue;
        }
        let room_id = *room_ids
            .get(&parsed.room)
            .ok_or_else(|| SnapshotError::UnknownRoom(parsed.room.clone()))?;
        let id = Ulid::new();
        engine
            .create_section_with_number(
                id,
                parsed.course,
                parsed.trimester,
                parsed.students,
                room_id,
                parsed.number,
            )
            .await?;
        sections.insert(key, id);
    }

    let mut placements = 0usize;
    for (key, schedule) in &file.saved_schedule {
        if group_key_trimester(key).is_none() {
            continue;
        }
        for (day_name, slots) in schedule {
            let day = Day::parse(day_name)
                .ok_or_else(|| SnapshotError::BadDay(day_name.clone()))?;
            for (slot_label, text) in slots {
                let slot = Slot::parse(slot_label)
                    .ok_or_else(|| SnapshotError::BadSlot(slot_label.clone()))?;
                let Some(parsed) = label::parse(text) else {
                    warn!("skipping malformed backup label: {text:?}");
                    continue;
                };
                let key = (
                    parsed.trimester,
                    parsed.course,
                    parsed.number,
                    parsed.room,
                    parsed.students,
                );
                // Every parseable schedule label was turned into a section above.
                let section_id = sections[&key];
                engine.place(Ulid::new(), section_id, day, slot).await?;
                placements += 1;
            }
        }
    }

    Ok(RestoreSummary {
        rooms: room_ids.len(),
        sections: sections.len(),
        placements,
    })
}

fn group_key_trimester(key: &str) -> Option<Trimester> {
    key.strip_prefix("Group ")?.parse().ok()
}
