use ulid::Ulid;

use crate::catalog;
use crate::grid::{self, Cell};
use crate::label;
use crate::model::*;

use super::{Engine, EngineError, SharedRoomState};

impl Engine {
    pub async fn list_rooms(&self, min_capacity: Option<u32>) -> Vec<RoomInfo> {
        let arcs: Vec<SharedRoomState> = self.rooms.iter().map(|e| e.value().clone()).collect();
        let mut out = Vec::with_capacity(arcs.len());
        for rs in arcs {
            let guard = rs.read().await;
            if min_capacity.is_none_or(|min| guard.capacity >= min) {
                out.push(RoomInfo {
                    id: guard.id,
                    name: guard.name.clone(),
                    capacity: guard.capacity,
                });
            }
        }
        out.sort_by(|a, b| a.name.cmp(&b.name));
        out
    }

    pub async fn list_sections(&self, trimester: Option<Trimester>) -> Vec<SectionInfo> {
        let states: Vec<SectionState> = self
            .sections
            .iter()
            .filter(|s| trimester.is_none_or(|t| s.value().trimester == t))
            .map(|s| s.value().clone())
            .collect();
        let mut out = Vec::with_capacity(states.len());
        for s in states {
            let room_name = self.room_name(&s.room_id).await.unwrap_or_default();
            out.push(SectionInfo {
                label: label::render(&s, &room_name),
                id: s.id,
                course: s.course,
                trimester: s.trimester,
                number: s.number,
                students: s.students,
                room_id: s.room_id,
            });
        }
        out.sort_by(|a, b| {
            (a.trimester, &a.course, a.number).cmp(&(b.trimester, &b.course, b.number))
        });
        out
    }

    /// The weekly grid of one trimester group: every placement of its
    /// sections, across all rooms. Cell-ordered.
    pub async fn group_grid(&self, trimester: Trimester) -> Result<Vec<CellView>, EngineError> {
        let placed: Vec<PlacementInfo> = self
            .placements
            .iter()
            .filter(|p| p.value().trimester == trimester)
            .map(|p| *p.value())
            .collect();
        self.views_for(placed).await
    }

    /// The weekly grid of one room: every placement in it, across all
    /// trimester groups. Cell-ordered.
    pub async fn room_grid(&self, room_id: Ulid) -> Result<Vec<CellView>, EngineError> {
        let placed: Vec<PlacementInfo> = self
            .placements
            .iter()
            .filter(|p| p.value().room_id == room_id)
            .map(|p| *p.value())
            .collect();
        self.views_for(placed).await
    }

    async fn views_for(
        &self,
        mut placed: Vec<PlacementInfo>,
    ) -> Result<Vec<CellView>, EngineError> {
        placed.sort_by_key(|p| p.cell);
        let mut out = Vec::with_capacity(placed.len());
        for p in placed {
            // A placement can only reference a live section and room;
            // deletion cascades keep it that way.
            let section = self
                .get_section(&p.section_id)
                .ok_or(EngineError::NotFound(p.section_id))?;
            let room_name = self
                .room_name(&p.room_id)
                .await
                .ok_or(EngineError::NotFound(p.room_id))?;
            out.push(CellView {
                cell: p.cell,
                placement_id: p.id,
                section_id: p.section_id,
                course: section.course.clone(),
                label: label::render(&section, &room_name),
                room_name,
            });
        }
        Ok(out)
    }

    /// The class pool of a trimester group: created sections first (the
    /// draggable blocks, labelled), then the group's full catalog titles.
    pub async fn pool(&self, trimester: Trimester) -> Vec<PoolEntry> {
        let sections = self.list_sections(Some(trimester)).await;
        let mut out: Vec<PoolEntry> = sections
            .into_iter()
            .map(|s| PoolEntry {
                course: s.course,
                section_id: Some(s.id),
                label: s.label,
            })
            .collect();
        for title in catalog::courses(trimester) {
            out.push(PoolEntry {
                course: (*title).to_string(),
                section_id: None,
                label: (*title).to_string(),
            });
        }
        out
    }

    /// Cells of a room with nothing in them.
    pub async fn free_cells(&self, room_id: Ulid) -> Result<Vec<Cell>, EngineError> {
        let rs = self
            .get_room(&room_id)
            .ok_or(EngineError::NotFound(room_id))?;
        let guard = rs.read().await;
        Ok(grid::cells().filter(|c| guard.is_free(*c)).collect())
    }

    /// Legal drop targets for a section: cells free in its room AND free
    /// for its trimester group. This is the double-booking rule as a query.
    pub async fn placeable_cells(&self, section_id: Ulid) -> Result<Vec<Cell>, EngineError> {
        let section = self
            .get_section(&section_id)
            .ok_or(EngineError::NotFound(section_id))?;
        let free = self.free_cells(section.room_id).await?;
        Ok(free
            .into_iter()
            .filter(|c| !self.group_index.contains_key(&(section.trimester, *c)))
            .collect())
    }

    /// All placements, cell-ordered. Snapshot/export walk this.
    pub fn placements_snapshot(&self) -> Vec<PlacementInfo> {
        let mut out: Vec<PlacementInfo> = self.placements.iter().map(|p| *p.value()).collect();
        out.sort_by_key(|p| (p.trimester, p.cell));
        out
    }

    /// Trimester groups that have at least one placement, ascending.
    pub fn occupied_trimesters(&self) -> Vec<Trimester> {
        let mut out: Vec<Trimester> = self
            .placements
            .iter()
            .map(|p| p.value().trimester)
            .collect();
        out.sort_unstable();
        out.dedup();
        out
    }

    pub async fn room_name(&self, id: &Ulid) -> Option<String> {
        let rs = self.get_room(id)?;
        let guard = rs.read().await;
        Some(guard.name.clone())
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    pub fn section_count(&self) -> usize {
        self.sections.len()
    }

    pub fn placement_count(&self) -> usize {
        self.placements.len()
    }
}
