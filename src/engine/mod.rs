mod conflict;
mod error;
mod mutations;
mod queries;
#[cfg(test)]
mod tests;

pub use error::EngineError;

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{RwLock, mpsc, oneshot};
use ulid::Ulid;

use crate::grid::Cell;
use crate::model::*;
use crate::notify::{Channel, NotifyHub};
use crate::wal::Wal;

pub type SharedRoomState = Arc<RwLock<RoomState>>;

// ── Group-commit WAL channel ─────────────────────────────

pub(super) enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

/// Background task that owns the WAL and batches appends for group commit.
/// 1. Block until the first Append arrives.
/// 2. Buffer it (no fsync).
/// 3. Drain all immediately available Appends (the batch window).
/// 4. Single flush_sync for the whole batch.
/// 5. Respond Ok to all senders.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            WalCommand::Append { event, response } => {
                let mut batch = vec![(event, response)];

                // Drain all immediately available appends
                loop {
                    match rx.try_recv() {
                        Ok(WalCommand::Append { event, response }) => {
                            batch.push((event, response));
                        }
                        Ok(other) => {
                            // Flush current batch first, then handle the non-append command
                            metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE)
                                .record(batch.len() as f64);
                            let flush_start = std::time::Instant::now();
                            let result = flush_batch(&mut wal, &mut batch);
                            metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
                                .record(flush_start.elapsed().as_secs_f64());
                            respond_batch(&mut batch, &result);
                            handle_non_append(&mut wal, other);
                            break;
                        }
                        Err(_) => break, // channel empty — flush batch
                    }
                }

                if !batch.is_empty() {
                    metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE)
                        .record(batch.len() as f64);
                    let flush_start = std::time::Instant::now();
                    let result = flush_batch(&mut wal, &mut batch);
                    metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
                        .record(flush_start.elapsed().as_secs_f64());
                    respond_batch(&mut batch, &result);
                }
            }
            other => handle_non_append(&mut wal, other),
        }
    }
}

fn flush_batch(
    wal: &mut Wal,
    batch: &mut [(Event, oneshot::Sender<io::Result<()>>)],
) -> io::Result<()> {
    let mut append_err: Option<io::Error> = None;
    for (event, _) in batch.iter() {
        if let Err(e) = wal.append_buffered(event) {
            append_err = Some(e);
            break;
        }
    }
    // Always flush — even on append error — so partially buffered bytes
    // don't leak into the next batch (callers were told this batch failed).
    let flush_err = wal.flush_sync().err();
    if let Some(e) = append_err {
        return Err(e);
    }
    if let Some(e) = flush_err {
        return Err(e);
    }
    Ok(())
}

fn respond_batch(batch: &mut Vec<(Event, oneshot::Sender<io::Result<()>>)>, result: &io::Result<()>) {
    for (_, tx) in batch.drain(..) {
        let r = match result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result =
                Wal::write_compact_file(wal.path(), &events).and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { .. } => unreachable!(),
    }
}

/// One term's timetable: rooms, sections, and the normalized placement
/// set that both the group view and the room view project from.
pub struct Engine {
    /// Rooms by id; each behind its own lock so placements in different
    /// rooms commit independently.
    rooms: DashMap<Ulid, SharedRoomState>,
    /// Room name → id. Names are unique — they appear inside labels.
    room_names: DashMap<String, Ulid>,
    sections: DashMap<Ulid, SectionState>,
    /// Placement id → normalized record (the placements table).
    placements: DashMap<Ulid, PlacementInfo>,
    /// (trimester, cell) → placement id. One class per group per half hour.
    group_index: DashMap<(Trimester, Cell), Ulid>,
    /// Course title → next section number.
    counters: DashMap<String, u32>,
    wal_tx: mpsc::Sender<WalCommand>,
    pub notify: Arc<NotifyHub>,
}

/// Apply a placement event to a room (no locking — caller holds the lock)
/// and to the engine-level indexes.
fn apply_placement(
    room: &mut RoomState,
    event: &Event,
    placements: &DashMap<Ulid, PlacementInfo>,
    group_index: &DashMap<(Trimester, Cell), Ulid>,
) {
    match event {
        Event::Placed {
            id,
            section_id,
            room_id,
            trimester,
            cell,
        } => {
            room.occupy(
                *cell,
                PlacedRef {
                    placement_id: *id,
                    section_id: *section_id,
                },
            );
            placements.insert(
                *id,
                PlacementInfo {
                    id: *id,
                    section_id: *section_id,
                    room_id: *room_id,
                    trimester: *trimester,
                    cell: *cell,
                },
            );
            group_index.insert((*trimester, *cell), *id);
        }
        Event::Unplaced {
            id,
            trimester,
            cell,
            ..
        } => {
            room.vacate(*id);
            placements.remove(id);
            group_index.remove(&(*trimester, *cell));
        }
        _ => {}
    }
}

impl Engine {
    pub fn new(wal_path: PathBuf, notify: Arc<NotifyHub>) -> io::Result<Self> {
        let events = Wal::replay(&wal_path)?;
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let engine = Self {
            rooms: DashMap::new(),
            room_names: DashMap::new(),
            sections: DashMap::new(),
            placements: DashMap::new(),
            group_index: DashMap::new(),
            counters: DashMap::new(),
            wal_tx,
            notify,
        };

        // Replay events — we're the sole owner of these Arcs, so try_write
        // always succeeds instantly (no contention). Never use blocking_write
        // here because this may run inside an async context (e.g. lazy term
        // creation).
        for event in &events {
            match event {
                Event::RoomAdded { id, name, capacity } => {
                    engine.rooms.insert(
                        *id,
                        Arc::new(RwLock::new(RoomState::new(*id, name.clone(), *capacity))),
                    );
                    engine.room_names.insert(name.clone(), *id);
                }
                Event::RoomUpdated { id, name, capacity } => {
                    if let Some(entry) = engine.rooms.get(id) {
                        let rs = entry.value().clone();
                        drop(entry);
                        let mut guard = rs.try_write().expect("replay: uncontended write");
                        if guard.name != *name {
                            engine.room_names.remove(&guard.name);
                            engine.room_names.insert(name.clone(), *id);
                            guard.name = name.clone();
                        }
                        guard.capacity = *capacity;
                    }
                }
                Event::RoomRemoved { id } => {
                    if let Some((_, rs)) = engine.rooms.remove(id) {
                        let guard = rs.try_read().expect("replay: uncontended read");
                        engine.room_names.remove(&guard.name);
                    }
                }
                Event::SectionCreated {
                    id,
                    course,
                    trimester,
                    number,
                    students,
                    room_id,
                } => {
                    engine.sections.insert(
                        *id,
                        SectionState {
                            id: *id,
                            course: course.clone(),
                            trimester: *trimester,
                            number: *number,
                            students: *students,
                            room_id: *room_id,
                        },
                    );
                    engine.bump_counter(course, *number);
                }
                Event::SectionDeleted { id, .. } => {
                    engine.sections.remove(id);
                }
                Event::Placed { room_id, .. } | Event::Unplaced { room_id, .. } => {
                    if let Some(entry) = engine.rooms.get(room_id) {
                        let rs = entry.value().clone();
                        drop(entry);
                        let mut guard = rs.try_write().expect("replay: uncontended write");
                        apply_placement(&mut guard, event, &engine.placements, &engine.group_index);
                    }
                }
            }
        }

        Ok(engine)
    }

    /// Write event to WAL via the background group-commit writer.
    async fn wal_append(&self, event: &Event) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    pub fn get_room(&self, id: &Ulid) -> Option<SharedRoomState> {
        self.rooms.get(id).map(|e| e.value().clone())
    }

    pub fn get_room_by_name(&self, name: &str) -> Option<Ulid> {
        self.room_names.get(name).map(|e| *e.value())
    }

    pub fn get_section(&self, id: &Ulid) -> Option<SectionState> {
        self.sections.get(id).map(|e| e.value().clone())
    }

    pub fn get_placement(&self, id: &Ulid) -> Option<PlacementInfo> {
        self.placements.get(id).map(|e| *e.value())
    }

    /// Advance the per-course section counter past `taken`.
    fn bump_counter(&self, course: &str, taken: u32) {
        let mut entry = self.counters.entry(course.to_string()).or_insert(1);
        if *entry <= taken {
            *entry = taken + 1;
        }
    }

    /// Route an event to the room/group channels it affects.
    fn notify_event(&self, event: &Event) {
        match event {
            Event::RoomAdded { id, .. }
            | Event::RoomUpdated { id, .. }
            | Event::RoomRemoved { id } => {
                self.notify.send(Channel::Room(*id), event);
            }
            Event::SectionCreated {
                trimester, ..
            }
            | Event::SectionDeleted { trimester, .. } => {
                self.notify.send(Channel::Group(*trimester), event);
            }
            Event::Placed {
                room_id, trimester, ..
            }
            | Event::Unplaced {
                room_id, trimester, ..
            } => {
                self.notify.send(Channel::Room(*room_id), event);
                self.notify.send(Channel::Group(*trimester), event);
            }
        }
    }

    /// WAL-append + apply + notify for a placement event on a held room lock.
    async fn persist_placement(
        &self,
        room: &mut RoomState,
        event: &Event,
    ) -> Result<(), EngineError> {
        self.wal_append(event).await?;
        apply_placement(room, event, &self.placements, &self.group_index);
        self.notify_event(event);
        Ok(())
    }

    /// Compact the WAL by rewriting it with only the events needed to
    /// recreate the current state: rooms, then sections, then placements.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        let mut events = Vec::new();

        let room_arcs: Vec<SharedRoomState> =
            self.rooms.iter().map(|e| e.value().clone()).collect();
        for rs in room_arcs {
            let guard = rs.read().await;
            events.push(Event::RoomAdded {
                id: guard.id,
                name: guard.name.clone(),
                capacity: guard.capacity,
            });
        }

        for entry in self.sections.iter() {
            let s = entry.value();
            events.push(Event::SectionCreated {
                id: s.id,
                course: s.course.clone(),
                trimester: s.trimester,
                number: s.number,
                students: s.students,
                room_id: s.room_id,
            });
        }

        for entry in self.placements.iter() {
            let p = entry.value();
            events.push(Event::Placed {
                id: p.id,
                section_id: p.section_id,
                room_id: p.room_id,
                trimester: p.trimester,
                cell: p.cell,
            });
        }

        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact {
                events,
                response: tx,
            })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}
