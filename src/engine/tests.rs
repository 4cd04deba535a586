use super::*;
use crate::grid::{Day, Slot};
use crate::notify::Channel;

use std::path::PathBuf;

fn test_wal_path(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join("aula_test_engine");
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join(name);
    let _ = std::fs::remove_file(&path);
    path
}

fn new_engine(name: &str) -> Engine {
    Engine::new(test_wal_path(name), Arc::new(NotifyHub::new())).unwrap()
}

fn slot(label: &str) -> Slot {
    Slot::parse(label).unwrap()
}

async fn add_test_room(engine: &Engine, name: &str, capacity: u32) -> Ulid {
    let id = Ulid::new();
    engine.add_room(id, name.into(), capacity).await.unwrap();
    id
}

async fn add_test_section(
    engine: &Engine,
    course: &str,
    trimester: u8,
    students: u32,
    room: Ulid,
) -> Ulid {
    let id = Ulid::new();
    engine
        .create_section(id, course.into(), trimester, students, room)
        .await
        .unwrap();
    id
}

// ── Rooms ────────────────────────────────────────────────

#[tokio::test]
async fn room_create_and_query() {
    let engine = new_engine("room_create.wal");
    let id = add_test_room(&engine, "P310", 25).await;

    let rooms = engine.list_rooms(None).await;
    assert_eq!(rooms.len(), 1);
    assert_eq!(rooms[0].id, id);
    assert_eq!(rooms[0].name, "P310");
    assert_eq!(rooms[0].capacity, 25);
    assert_eq!(engine.get_room_by_name("P310"), Some(id));
}

#[tokio::test]
async fn room_duplicate_id_rejected() {
    let engine = new_engine("room_dup_id.wal");
    let id = Ulid::new();
    engine.add_room(id, "P310".into(), 25).await.unwrap();
    let result = engine.add_room(id, "B3".into(), 50).await;
    assert!(matches!(result, Err(EngineError::AlreadyExists(_))));
}

#[tokio::test]
async fn room_duplicate_name_rejected() {
    let engine = new_engine("room_dup_name.wal");
    add_test_room(&engine, "P310", 25).await;
    let result = engine.add_room(Ulid::new(), "P310".into(), 50).await;
    assert!(matches!(result, Err(EngineError::DuplicateRoomName(_))));
}

#[tokio::test]
async fn room_name_validation() {
    let engine = new_engine("room_name_valid.wal");
    assert!(matches!(
        engine.add_room(Ulid::new(), "  ".into(), 10).await,
        Err(EngineError::InvalidArgument(_))
    ));
    // Commas and parens would corrupt the label record format.
    assert!(matches!(
        engine.add_room(Ulid::new(), "A,B".into(), 10).await,
        Err(EngineError::InvalidArgument(_))
    ));
    assert!(matches!(
        engine.add_room(Ulid::new(), "Lab (2)".into(), 10).await,
        Err(EngineError::InvalidArgument(_))
    ));
}

#[tokio::test]
async fn room_zero_capacity_rejected() {
    let engine = new_engine("room_zero_cap.wal");
    let result = engine.add_room(Ulid::new(), "P310".into(), 0).await;
    assert!(matches!(result, Err(EngineError::InvalidArgument(_))));
}

#[tokio::test]
async fn room_capacity_filter() {
    let engine = new_engine("room_cap_filter.wal");
    add_test_room(&engine, "P310", 25).await;
    add_test_room(&engine, "B3", 50).await;

    let all = engine.list_rooms(None).await;
    assert_eq!(all.len(), 2);

    let big = engine.list_rooms(Some(30)).await;
    assert_eq!(big.len(), 1);
    assert_eq!(big[0].name, "B3");

    let none = engine.list_rooms(Some(100)).await;
    assert!(none.is_empty());
}

#[tokio::test]
async fn room_update_capacity_and_rename() {
    let engine = new_engine("room_update.wal");
    let id = add_test_room(&engine, "P310", 25).await;

    engine
        .update_room(id, Some("P311".into()), Some(30))
        .await
        .unwrap();

    let rooms = engine.list_rooms(None).await;
    assert_eq!(rooms[0].name, "P311");
    assert_eq!(rooms[0].capacity, 30);
    assert_eq!(engine.get_room_by_name("P310"), None);
    assert_eq!(engine.get_room_by_name("P311"), Some(id));
}

#[tokio::test]
async fn room_rename_to_taken_name_rejected() {
    let engine = new_engine("room_rename_taken.wal");
    let id = add_test_room(&engine, "P310", 25).await;
    add_test_room(&engine, "B3", 50).await;

    let result = engine.update_room(id, Some("B3".into()), None).await;
    assert!(matches!(result, Err(EngineError::DuplicateRoomName(_))));
}

#[tokio::test]
async fn room_shrink_below_enrolment_rejected() {
    let engine = new_engine("room_shrink.wal");
    let id = add_test_room(&engine, "B3", 50).await;
    add_test_section(&engine, "Álgebra Lineal", 2, 40, id).await;

    let result = engine.update_room(id, None, Some(30)).await;
    assert!(matches!(result, Err(EngineError::CapacityExceeded { .. })));

    // Shrinking to exactly the enrolment is fine.
    engine.update_room(id, None, Some(40)).await.unwrap();
}

#[tokio::test]
async fn room_delete() {
    let engine = new_engine("room_delete.wal");
    let id = add_test_room(&engine, "P310", 25).await;
    engine.remove_room(id).await.unwrap();
    assert!(engine.list_rooms(None).await.is_empty());
    assert_eq!(engine.get_room_by_name("P310"), None);
}

#[tokio::test]
async fn room_delete_with_sections_rejected() {
    let engine = new_engine("room_delete_used.wal");
    let id = add_test_room(&engine, "P310", 25).await;
    add_test_section(&engine, "Ecología", 1, 20, id).await;

    let result = engine.remove_room(id).await;
    assert!(matches!(result, Err(EngineError::RoomInUse(_))));
}

#[tokio::test]
async fn room_delete_nonexistent() {
    let engine = new_engine("room_delete_missing.wal");
    let result = engine.remove_room(Ulid::new()).await;
    assert!(matches!(result, Err(EngineError::NotFound(_))));
}

// ── Sections ─────────────────────────────────────────────

#[tokio::test]
async fn section_numbers_increment_per_course() {
    let engine = new_engine("section_numbers.wal");
    let room = add_test_room(&engine, "P310", 25).await;

    let n1 = engine
        .create_section(Ulid::new(), "Ecología".into(), 1, 20, room)
        .await
        .unwrap();
    let n2 = engine
        .create_section(Ulid::new(), "Ecología".into(), 1, 15, room)
        .await
        .unwrap();
    let other = engine
        .create_section(Ulid::new(), "Mecánica Clásica".into(), 1, 10, room)
        .await
        .unwrap();

    assert_eq!(n1, 1);
    assert_eq!(n2, 2);
    assert_eq!(other, 1); // counters are per course title
}

#[tokio::test]
async fn section_capacity_gate() {
    let engine = new_engine("section_capacity.wal");
    let room = add_test_room(&engine, "P310", 25).await;

    let result = engine
        .create_section(Ulid::new(), "Ecología".into(), 1, 30, room)
        .await;
    assert!(matches!(
        result,
        Err(EngineError::CapacityExceeded {
            capacity: 25,
            students: 30,
            ..
        })
    ));

    // Exactly at capacity is allowed.
    engine
        .create_section(Ulid::new(), "Ecología".into(), 1, 25, room)
        .await
        .unwrap();
}

#[tokio::test]
async fn section_invalid_trimester() {
    let engine = new_engine("section_bad_trimester.wal");
    let room = add_test_room(&engine, "P310", 25).await;

    for t in [0u8, 13] {
        let result = engine
            .create_section(Ulid::new(), "Ecología".into(), t, 10, room)
            .await;
        assert!(matches!(result, Err(EngineError::InvalidTrimester(_))));
    }
}

#[tokio::test]
async fn section_zero_students_rejected() {
    let engine = new_engine("section_zero_students.wal");
    let room = add_test_room(&engine, "P310", 25).await;
    let result = engine
        .create_section(Ulid::new(), "Ecología".into(), 1, 0, room)
        .await;
    assert!(matches!(result, Err(EngineError::InvalidArgument(_))));
}

#[tokio::test]
async fn section_unknown_room_rejected() {
    let engine = new_engine("section_no_room.wal");
    let result = engine
        .create_section(Ulid::new(), "Ecología".into(), 1, 10, Ulid::new())
        .await;
    assert!(matches!(result, Err(EngineError::NotFound(_))));
}

#[tokio::test]
async fn section_labels_in_listing() {
    let engine = new_engine("section_labels.wal");
    let room = add_test_room(&engine, "P310", 25).await;
    add_test_section(&engine, "Bases de Datos", 7, 20, room).await;

    let sections = engine.list_sections(Some(7)).await;
    assert_eq!(sections.len(), 1);
    assert_eq!(
        sections[0].label,
        "7T: Bases de Datos (Group 1, P310, 20 students)"
    );

    assert!(engine.list_sections(Some(6)).await.is_empty());
}

#[tokio::test]
async fn section_delete_cascades_placements() {
    let engine = new_engine("section_cascade.wal");
    let room = add_test_room(&engine, "P310", 25).await;
    let section = add_test_section(&engine, "Ecología", 1, 20, room).await;

    engine
        .place(Ulid::new(), section, Day::Monday, slot("08:00 AM"))
        .await
        .unwrap();
    engine
        .place(Ulid::new(), section, Day::Tuesday, slot("09:00 AM"))
        .await
        .unwrap();
    assert_eq!(engine.placement_count(), 2);

    engine.delete_section(section).await.unwrap();
    assert_eq!(engine.placement_count(), 0);
    assert_eq!(engine.section_count(), 0);
    assert!(engine.group_grid(1).await.unwrap().is_empty());
    assert!(engine.room_grid(room).await.unwrap().is_empty());
}

// ── Placements ───────────────────────────────────────────

#[tokio::test]
async fn place_appears_in_both_views() {
    let engine = new_engine("place_both_views.wal");
    let room = add_test_room(&engine, "P310", 25).await;
    let section = add_test_section(&engine, "Ecología", 1, 20, room).await;

    let pid = Ulid::new();
    engine
        .place(pid, section, Day::Wednesday, slot("10:30 AM"))
        .await
        .unwrap();

    let group_view = engine.group_grid(1).await.unwrap();
    let room_view = engine.room_grid(room).await.unwrap();

    // The two projections of the placement set cannot disagree.
    assert_eq!(group_view.len(), 1);
    assert_eq!(group_view, room_view);
    assert_eq!(group_view[0].placement_id, pid);
    assert_eq!(group_view[0].cell.day, Day::Wednesday);
    assert_eq!(group_view[0].cell.slot.label(), "10:30 AM");
    assert_eq!(
        group_view[0].label,
        "1T: Ecología (Group 1, P310, 20 students)"
    );
}

#[tokio::test]
async fn place_room_conflict() {
    let engine = new_engine("place_room_conflict.wal");
    let room = add_test_room(&engine, "P310", 25).await;
    let first = add_test_section(&engine, "Ecología", 1, 20, room).await;
    let second = add_test_section(&engine, "Bases de Datos", 7, 20, room).await;

    let pid = Ulid::new();
    engine
        .place(pid, first, Day::Monday, slot("08:00 AM"))
        .await
        .unwrap();

    // Different group, same room, same cell.
    let result = engine
        .place(Ulid::new(), second, Day::Monday, slot("08:00 AM"))
        .await;
    match result {
        Err(EngineError::RoomOccupied { by, .. }) => assert_eq!(by, pid),
        other => panic!("expected RoomOccupied, got {other:?}"),
    }
}

#[tokio::test]
async fn place_group_conflict_across_rooms() {
    let engine = new_engine("place_group_conflict.wal");
    let p310 = add_test_room(&engine, "P310", 25).await;
    let b3 = add_test_room(&engine, "B3", 50).await;
    let first = add_test_section(&engine, "Ecología", 1, 20, p310).await;
    let second = add_test_section(&engine, "Mecánica Clásica", 1, 30, b3).await;

    let pid = Ulid::new();
    engine
        .place(pid, first, Day::Monday, slot("08:00 AM"))
        .await
        .unwrap();

    // Same trimester group in a different room at the same time: the group
    // cannot be in two rooms at once.
    let result = engine
        .place(Ulid::new(), second, Day::Monday, slot("08:00 AM"))
        .await;
    match result {
        Err(EngineError::GroupOccupied { trimester, by, .. }) => {
            assert_eq!(trimester, 1);
            assert_eq!(by, pid);
        }
        other => panic!("expected GroupOccupied, got {other:?}"),
    }

    // Different groups may share a time across rooms.
    let third = add_test_section(&engine, "Bases de Datos", 7, 30, b3).await;
    engine
        .place(Ulid::new(), third, Day::Monday, slot("08:00 AM"))
        .await
        .unwrap();
}

#[tokio::test]
async fn place_same_section_twice_same_cell_rejected() {
    let engine = new_engine("place_twice.wal");
    let room = add_test_room(&engine, "P310", 25).await;
    let section = add_test_section(&engine, "Ecología", 1, 20, room).await;

    engine
        .place(Ulid::new(), section, Day::Monday, slot("08:00 AM"))
        .await
        .unwrap();
    let result = engine
        .place(Ulid::new(), section, Day::Monday, slot("08:00 AM"))
        .await;
    assert!(matches!(result, Err(EngineError::RoomOccupied { .. })));
}

#[tokio::test]
async fn place_unknown_section_rejected() {
    let engine = new_engine("place_no_section.wal");
    let result = engine
        .place(Ulid::new(), Ulid::new(), Day::Monday, slot("08:00 AM"))
        .await;
    assert!(matches!(result, Err(EngineError::NotFound(_))));
}

#[tokio::test]
async fn place_duplicate_placement_id_rejected() {
    let engine = new_engine("place_dup_id.wal");
    let room = add_test_room(&engine, "P310", 25).await;
    let section = add_test_section(&engine, "Ecología", 1, 20, room).await;

    let pid = Ulid::new();
    engine
        .place(pid, section, Day::Monday, slot("08:00 AM"))
        .await
        .unwrap();
    let result = engine
        .place(pid, section, Day::Monday, slot("08:30 AM"))
        .await;
    assert!(matches!(result, Err(EngineError::AlreadyExists(_))));
}

#[tokio::test]
async fn unplace_frees_both_views() {
    let engine = new_engine("unplace.wal");
    let room = add_test_room(&engine, "P310", 25).await;
    let section = add_test_section(&engine, "Ecología", 1, 20, room).await;

    let pid = Ulid::new();
    engine
        .place(pid, section, Day::Monday, slot("08:00 AM"))
        .await
        .unwrap();
    engine.unplace(pid).await.unwrap();

    assert!(engine.group_grid(1).await.unwrap().is_empty());
    assert!(engine.room_grid(room).await.unwrap().is_empty());

    // The cell is reusable — by another group even.
    let other = add_test_section(&engine, "Bases de Datos", 7, 20, room).await;
    engine
        .place(Ulid::new(), other, Day::Monday, slot("08:00 AM"))
        .await
        .unwrap();
}

#[tokio::test]
async fn unplace_nonexistent() {
    let engine = new_engine("unplace_missing.wal");
    let result = engine.unplace(Ulid::new()).await;
    assert!(matches!(result, Err(EngineError::NotFound(_))));
}

#[tokio::test]
async fn free_cells_shrink_as_room_fills() {
    let engine = new_engine("free_cells.wal");
    let room = add_test_room(&engine, "P310", 25).await;
    let section = add_test_section(&engine, "Ecología", 1, 20, room).await;

    assert_eq!(engine.free_cells(room).await.unwrap().len(), 90);

    engine
        .place(Ulid::new(), section, Day::Monday, slot("08:00 AM"))
        .await
        .unwrap();

    let free = engine.free_cells(room).await.unwrap();
    assert_eq!(free.len(), 89);
    assert!(!free.contains(&crate::grid::Cell::new(Day::Monday, slot("08:00 AM"))));
}

#[tokio::test]
async fn placeable_cells_respect_both_constraints() {
    let engine = new_engine("placeable.wal");
    let p310 = add_test_room(&engine, "P310", 25).await;
    let b3 = add_test_room(&engine, "B3", 50).await;
    let eco = add_test_section(&engine, "Ecología", 1, 20, p310).await;
    let mec = add_test_section(&engine, "Mecánica Clásica", 1, 30, b3).await;
    let db = add_test_section(&engine, "Bases de Datos", 7, 20, p310).await;

    // Fill P310 Monday 08:00 with group 7, and B3 Monday 08:30 with group 1.
    engine
        .place(Ulid::new(), db, Day::Monday, slot("08:00 AM"))
        .await
        .unwrap();
    engine
        .place(Ulid::new(), mec, Day::Monday, slot("08:30 AM"))
        .await
        .unwrap();

    let cells = engine.placeable_cells(eco).await.unwrap();
    // Monday 08:00 is busy in eco's room; Monday 08:30 is busy for group 1.
    assert!(!cells.contains(&crate::grid::Cell::new(Day::Monday, slot("08:00 AM"))));
    assert!(!cells.contains(&crate::grid::Cell::new(Day::Monday, slot("08:30 AM"))));
    assert_eq!(cells.len(), 88);
}

// ── Batch placement ──────────────────────────────────────

#[tokio::test]
async fn batch_place_block() {
    let engine = new_engine("batch_block.wal");
    let room = add_test_room(&engine, "P310", 25).await;
    let section = add_test_section(&engine, "Ecología", 1, 20, room).await;

    // A 90-minute class: three consecutive half hours.
    engine
        .batch_place(vec![
            (Ulid::new(), section, Day::Monday, slot("08:00 AM")),
            (Ulid::new(), section, Day::Monday, slot("08:30 AM")),
            (Ulid::new(), section, Day::Monday, slot("09:00 AM")),
        ])
        .await
        .unwrap();

    assert_eq!(engine.group_grid(1).await.unwrap().len(), 3);
}

#[tokio::test]
async fn batch_place_is_atomic_on_existing_conflict() {
    let engine = new_engine("batch_atomic.wal");
    let room = add_test_room(&engine, "P310", 25).await;
    let section = add_test_section(&engine, "Ecología", 1, 20, room).await;

    engine
        .place(Ulid::new(), section, Day::Monday, slot("08:30 AM"))
        .await
        .unwrap();

    // Second cell of the batch collides with the existing placement.
    let result = engine
        .batch_place(vec![
            (Ulid::new(), section, Day::Monday, slot("08:00 AM")),
            (Ulid::new(), section, Day::Monday, slot("08:30 AM")),
        ])
        .await;
    assert!(matches!(result, Err(EngineError::RoomOccupied { .. })));

    // Nothing from the batch was committed.
    assert_eq!(engine.placement_count(), 1);
    // And the batch's would-be group reservations were released.
    let free = engine.placeable_cells(section).await.unwrap();
    assert!(free.contains(&crate::grid::Cell::new(Day::Monday, slot("08:00 AM"))));
}

#[tokio::test]
async fn batch_place_rejects_intra_batch_duplicates() {
    let engine = new_engine("batch_dup.wal");
    let room = add_test_room(&engine, "P310", 25).await;
    let section = add_test_section(&engine, "Ecología", 1, 20, room).await;

    let result = engine
        .batch_place(vec![
            (Ulid::new(), section, Day::Monday, slot("08:00 AM")),
            (Ulid::new(), section, Day::Monday, slot("08:00 AM")),
        ])
        .await;
    assert!(matches!(result, Err(EngineError::RoomOccupied { .. })));
    assert_eq!(engine.placement_count(), 0);
}

#[tokio::test]
async fn batch_place_spans_rooms() {
    let engine = new_engine("batch_rooms.wal");
    let p310 = add_test_room(&engine, "P310", 25).await;
    let b3 = add_test_room(&engine, "B3", 50).await;
    let eco = add_test_section(&engine, "Ecología", 1, 20, p310).await;
    let db = add_test_section(&engine, "Bases de Datos", 7, 30, b3).await;

    engine
        .batch_place(vec![
            (Ulid::new(), eco, Day::Monday, slot("08:00 AM")),
            (Ulid::new(), db, Day::Monday, slot("08:00 AM")),
        ])
        .await
        .unwrap();

    assert_eq!(engine.room_grid(p310).await.unwrap().len(), 1);
    assert_eq!(engine.room_grid(b3).await.unwrap().len(), 1);
}

#[tokio::test]
async fn batch_place_too_large() {
    let engine = new_engine("batch_large.wal");
    let room = add_test_room(&engine, "P310", 25).await;
    let section = add_test_section(&engine, "Ecología", 1, 20, room).await;

    let items: Vec<_> = (0..crate::limits::MAX_BATCH_SIZE + 1)
        .map(|_| (Ulid::new(), section, Day::Monday, slot("08:00 AM")))
        .collect();
    let result = engine.batch_place(items).await;
    assert!(matches!(result, Err(EngineError::LimitExceeded(_))));
}

#[tokio::test]
async fn batch_place_empty_is_noop() {
    let engine = new_engine("batch_empty.wal");
    engine.batch_place(vec![]).await.unwrap();
}

// ── Pool ─────────────────────────────────────────────────

#[tokio::test]
async fn pool_lists_sections_then_catalog() {
    let engine = new_engine("pool.wal");
    let room = add_test_room(&engine, "P310", 25).await;
    let section = add_test_section(&engine, "Ecología", 1, 20, room).await;

    let pool = engine.pool(1).await;
    // One created block plus the four predefined titles of trimester 1.
    assert_eq!(pool.len(), 1 + crate::catalog::courses(1).len());
    assert_eq!(pool[0].section_id, Some(section));
    assert_eq!(pool[0].label, "1T: Ecología (Group 1, P310, 20 students)");
    assert!(pool[1..].iter().all(|p| p.section_id.is_none()));
}

#[tokio::test]
async fn pool_of_thesis_group_is_empty() {
    let engine = new_engine("pool_thesis.wal");
    assert!(engine.pool(12).await.is_empty());
}

// ── Persistence ──────────────────────────────────────────

#[tokio::test]
async fn state_survives_restart() {
    let path = test_wal_path("restart.wal");

    let room;
    let section;
    {
        let engine = Engine::new(path.clone(), Arc::new(NotifyHub::new())).unwrap();
        room = Ulid::new();
        engine.add_room(room, "P310".into(), 25).await.unwrap();
        section = Ulid::new();
        engine
            .create_section(section, "Ecología".into(), 1, 20, room)
            .await
            .unwrap();
        engine
            .place(Ulid::new(), section, Day::Monday, slot("08:00 AM"))
            .await
            .unwrap();
    }

    let revived = Engine::new(path, Arc::new(NotifyHub::new())).unwrap();
    assert_eq!(revived.room_count(), 1);
    assert_eq!(revived.section_count(), 1);
    assert_eq!(revived.placement_count(), 1);

    let grid = revived.group_grid(1).await.unwrap();
    assert_eq!(grid.len(), 1);
    assert_eq!(grid[0].label, "1T: Ecología (Group 1, P310, 20 students)");

    // Conflicts still enforced against replayed placements.
    let result = revived
        .place(Ulid::new(), section, Day::Monday, slot("08:00 AM"))
        .await;
    assert!(matches!(result, Err(EngineError::RoomOccupied { .. })));
}

#[tokio::test]
async fn section_numbering_survives_restart() {
    let path = test_wal_path("restart_numbers.wal");

    let room;
    {
        let engine = Engine::new(path.clone(), Arc::new(NotifyHub::new())).unwrap();
        room = Ulid::new();
        engine.add_room(room, "P310".into(), 25).await.unwrap();
        engine
            .create_section(Ulid::new(), "Ecología".into(), 1, 20, room)
            .await
            .unwrap();
        engine
            .create_section(Ulid::new(), "Ecología".into(), 1, 20, room)
            .await
            .unwrap();
    }

    let revived = Engine::new(path, Arc::new(NotifyHub::new())).unwrap();
    let n = revived
        .create_section(Ulid::new(), "Ecología".into(), 1, 10, room)
        .await
        .unwrap();
    assert_eq!(n, 3);
}

#[tokio::test]
async fn deletions_survive_restart() {
    let path = test_wal_path("restart_deletes.wal");

    {
        let engine = Engine::new(path.clone(), Arc::new(NotifyHub::new())).unwrap();
        let room = Ulid::new();
        engine.add_room(room, "P310".into(), 25).await.unwrap();
        let section = Ulid::new();
        engine
            .create_section(section, "Ecología".into(), 1, 20, room)
            .await
            .unwrap();
        let pid = Ulid::new();
        engine
            .place(pid, section, Day::Monday, slot("08:00 AM"))
            .await
            .unwrap();
        engine.unplace(pid).await.unwrap();
        engine.delete_section(section).await.unwrap();
    }

    let revived = Engine::new(path, Arc::new(NotifyHub::new())).unwrap();
    assert_eq!(revived.room_count(), 1);
    assert_eq!(revived.section_count(), 0);
    assert_eq!(revived.placement_count(), 0);
}

#[tokio::test]
async fn compaction_preserves_state() {
    let path = test_wal_path("compact_state.wal");
    let engine = Engine::new(path.clone(), Arc::new(NotifyHub::new())).unwrap();

    let room = Ulid::new();
    engine.add_room(room, "P310".into(), 25).await.unwrap();
    let section = Ulid::new();
    engine
        .create_section(section, "Ecología".into(), 1, 20, room)
        .await
        .unwrap();

    // Churn: place and remove repeatedly, keep the last one.
    for i in 0..10u8 {
        let pid = Ulid::new();
        engine
            .place(pid, section, Day::Monday, Slot::new(i).unwrap())
            .await
            .unwrap();
        if i != 9 {
            engine.unplace(pid).await.unwrap();
        }
    }

    let before = std::fs::metadata(&path).unwrap().len();
    engine.compact_wal().await.unwrap();
    let after = std::fs::metadata(&path).unwrap().len();
    assert!(after < before, "compacted WAL should shrink: {after} < {before}");

    let revived = Engine::new(path, Arc::new(NotifyHub::new())).unwrap();
    assert_eq!(revived.placement_count(), 1);
    let grid = revived.group_grid(1).await.unwrap();
    assert_eq!(grid[0].cell.slot, Slot::new(9).unwrap());
}

// ── Notifications ────────────────────────────────────────

#[tokio::test]
async fn placement_notifies_room_and_group_channels() {
    let engine = new_engine("notify_place.wal");
    let room = add_test_room(&engine, "P310", 25).await;
    let section = add_test_section(&engine, "Ecología", 1, 20, room).await;

    let mut room_rx = engine.notify.subscribe(Channel::Room(room));
    let mut group_rx = engine.notify.subscribe(Channel::Group(1));

    let pid = Ulid::new();
    engine
        .place(pid, section, Day::Monday, slot("08:00 AM"))
        .await
        .unwrap();

    let room_event = room_rx.recv().await.unwrap();
    let group_event = group_rx.recv().await.unwrap();
    assert_eq!(room_event, group_event);
    assert!(matches!(room_event, Event::Placed { id, .. } if id == pid));
}

#[tokio::test]
async fn clear_empties_everything() {
    let engine = new_engine("clear.wal");
    let room = add_test_room(&engine, "P310", 25).await;
    let section = add_test_section(&engine, "Ecología", 1, 20, room).await;
    engine
        .place(Ulid::new(), section, Day::Monday, slot("08:00 AM"))
        .await
        .unwrap();

    engine.clear().await.unwrap();
    assert_eq!(engine.room_count(), 0);
    assert_eq!(engine.section_count(), 0);
    assert_eq!(engine.placement_count(), 0);

    // Numbering starts over on a cleared term.
    let room2 = add_test_room(&engine, "P310", 25).await;
    let n = engine
        .create_section(Ulid::new(), "Ecología".into(), 1, 20, room2)
        .await
        .unwrap();
    assert_eq!(n, 1);
}
