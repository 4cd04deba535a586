//! Excel export: one workbook per view family, one sheet per trimester
//! group or room, 18 slot rows by 5 day columns, section labels in the
//! cells — the layout coordinators print and pin to the wall.

use std::fmt;
use std::path::Path;

use umya_spreadsheet::{Spreadsheet, Worksheet, XlsxError};

use crate::engine::{Engine, EngineError};
use crate::grid::{Day, Slot};
use crate::model::CellView;

#[derive(Debug)]
pub enum ExportError {
    /// Nothing to write: an xlsx workbook must contain at least one sheet.
    NothingToExport,
    Sheet(String),
    Xlsx(XlsxError),
    Engine(EngineError),
}

impl fmt::Display for ExportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExportError::NothingToExport => write!(f, "nothing to export"),
            ExportError::Sheet(e) => write!(f, "sheet error: {e}"),
            ExportError::Xlsx(e) => write!(f, "xlsx error: {e}"),
            ExportError::Engine(e) => write!(f, "engine error: {e}"),
        }
    }
}

impl std::error::Error for ExportError {}

impl From<XlsxError> for ExportError {
    fn from(e: XlsxError) -> Self {
        ExportError::Xlsx(e)
    }
}

impl From<EngineError> for ExportError {
    fn from(e: EngineError) -> Self {
        ExportError::Engine(e)
    }
}

/// Write one sheet per trimester group that has placements. Returns the
/// sheet count.
pub async fn export_groups(engine: &Engine, path: &Path) -> Result<usize, ExportError> {
    let trimesters = engine.occupied_trimesters();
    if trimesters.is_empty() {
        return Err(ExportError::NothingToExport);
    }

    let mut book = umya_spreadsheet::new_file_empty_worksheet();
    for trimester in &trimesters {
        let grid = engine.group_grid(*trimester).await?;
        let sheet = book
            .new_sheet(sheet_title(&format!("Group {trimester}")))
            .map_err(|e| ExportError::Sheet(e.to_string()))?;
        write_week(sheet, &grid);
    }
    write_book(&book, path)?;
    Ok(trimesters.len())
}

/// Write one sheet per room, occupied or not. Returns the sheet count.
pub async fn export_rooms(engine: &Engine, path: &Path) -> Result<usize, ExportError> {
    let rooms = engine.list_rooms(None).await;
    if rooms.is_empty() {
        return Err(ExportError::NothingToExport);
    }

    let mut book = umya_spreadsheet::new_file_empty_worksheet();
    for room in &rooms {
        let grid = engine.room_grid(room.id).await?;
        let sheet = book
            .new_sheet(sheet_title(&room.name))
            .map_err(|e| ExportError::Sheet(e.to_string()))?;
        write_week(sheet, &grid);
    }
    write_book(&book, path)?;
    Ok(rooms.len())
}

/// Day headers across row 1, slot labels down column A, labels at the
/// intersections.
fn write_week(sheet: &mut Worksheet, grid: &[CellView]) {
    for (i, day) in Day::ALL.iter().enumerate() {
        sheet
            .get_cell_mut(((i + 2) as u32, 1))
            .set_value(day.as_str());
    }
    for slot in Slot::all() {
        sheet
            .get_cell_mut((1, slot.index() as u32 + 2))
            .set_value(slot.label());
    }
    for view in grid {
        let col = Day::ALL
            .iter()
            .position(|d| *d == view.cell.day)
            .expect("day column") as u32
            + 2;
        let row = view.cell.slot.index() as u32 + 2;
        sheet.get_cell_mut((col, row)).set_value(view.label.clone());
    }
}

fn write_book(book: &Spreadsheet, path: &Path) -> Result<(), ExportError> {
    umya_spreadsheet::writer::xlsx::write(book, path)?;
    Ok(())
}

/// Excel limits sheet titles to 31 chars and a restricted alphabet.
fn sheet_title(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| match c {
            '\\' | '/' | '?' | '*' | '[' | ']' | ':' => '_',
            other => other,
        })
        .collect();
    cleaned.chars().take(31).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::NotifyHub;
    use std::path::PathBuf;
    use std::sync::Arc;
    use ulid::Ulid;

    fn test_paths(name: &str) -> (PathBuf, PathBuf) {
        let dir = std::env::temp_dir().join("aula_test_export");
        std::fs::create_dir_all(&dir).unwrap();
        let wal = dir.join(format!("{name}.wal"));
        let xlsx = dir.join(format!("{name}.xlsx"));
        let _ = std::fs::remove_file(&wal);
        let _ = std::fs::remove_file(&xlsx);
        (wal, xlsx)
    }

    async fn seeded_engine(wal: PathBuf) -> Engine {
        let engine = Engine::new(wal, Arc::new(NotifyHub::new())).unwrap();
        let p310 = Ulid::new();
        engine.add_room(p310, "P310".into(), 25).await.unwrap();
        let section = Ulid::new();
        engine
            .create_section(section, "Ecología".into(), 1, 20, p310)
            .await
            .unwrap();
        engine
            .place(
                Ulid::new(),
                section,
                Day::Wednesday,
                Slot::parse("09:00 AM").unwrap(),
            )
            .await
            .unwrap();
        engine
    }

    #[tokio::test]
    async fn group_export_layout() {
        let (wal, xlsx) = test_paths("groups");
        let engine = seeded_engine(wal).await;

        let sheets = export_groups(&engine, &xlsx).await.unwrap();
        assert_eq!(sheets, 1);

        let book = umya_spreadsheet::reader::xlsx::read(&xlsx).unwrap();
        let sheet = book.get_sheet_by_name("Group 1").unwrap();
        // Headers
        assert_eq!(sheet.get_value((2u32, 1u32)), "Monday");
        assert_eq!(sheet.get_value((6u32, 1u32)), "Friday");
        assert_eq!(sheet.get_value((1u32, 2u32)), "08:00 AM");
        assert_eq!(sheet.get_value((1u32, 19u32)), "04:30 PM");
        // Wednesday 09:00 AM is column D (Wednesday = 3rd day), row 4.
        assert_eq!(
            sheet.get_value((4u32, 4u32)),
            "1T: Ecología (Group 1, P310, 20 students)"
        );
    }

    #[tokio::test]
    async fn room_export_includes_empty_rooms() {
        let (wal, xlsx) = test_paths("rooms");
        let engine = seeded_engine(wal).await;
        engine
            .add_room(Ulid::new(), "B3".into(), 50)
            .await
            .unwrap();

        let sheets = export_rooms(&engine, &xlsx).await.unwrap();
        assert_eq!(sheets, 2);

        let book = umya_spreadsheet::reader::xlsx::read(&xlsx).unwrap();
        assert!(book.get_sheet_by_name("P310").is_some());
        let empty = book.get_sheet_by_name("B3").unwrap();
        assert_eq!(empty.get_value((2u32, 1u32)), "Monday");
        assert_eq!(empty.get_value((2u32, 2u32)), "");
    }

    #[tokio::test]
    async fn empty_term_refuses_group_export() {
        let (wal, xlsx) = test_paths("empty");
        let engine = Engine::new(wal, Arc::new(NotifyHub::new())).unwrap();
        let err = export_groups(&engine, &xlsx).await.unwrap_err();
        assert!(matches!(err, ExportError::NothingToExport));
    }

    #[test]
    fn sheet_titles_are_sanitized() {
        assert_eq!(sheet_title("P310"), "P310");
        assert_eq!(sheet_title("Lab/2"), "Lab_2");
        assert_eq!(sheet_title(&"x".repeat(40)).len(), 31);
    }
}
