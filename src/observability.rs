use std::net::SocketAddr;

use crate::sql::Command;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: total queries executed. Labels: command, status.
pub const QUERIES_TOTAL: &str = "aula_queries_total";

/// Histogram: query latency in seconds. Labels: command.
pub const QUERY_DURATION_SECONDS: &str = "aula_query_duration_seconds";

/// Counter: placements refused because a room or group cell was taken.
pub const PLACEMENT_CONFLICTS_TOTAL: &str = "aula_placement_conflicts_total";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: active TCP connections.
pub const CONNECTIONS_ACTIVE: &str = "aula_connections_active";

/// Counter: total connections accepted.
pub const CONNECTIONS_TOTAL: &str = "aula_connections_total";

/// Counter: connections rejected due to limit.
pub const CONNECTIONS_REJECTED_TOTAL: &str = "aula_connections_rejected_total";

/// Gauge: number of active terms (loaded engines).
pub const TERMS_ACTIVE: &str = "aula_terms_active";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "aula_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "aula_wal_flush_batch_size";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) {
    let Some(port) = port else { return };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .expect("failed to install Prometheus metrics exporter");
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
}

/// Map a Command variant to a short label for metrics.
pub fn command_label(cmd: &Command) -> &'static str {
    match cmd {
        Command::InsertRoom { .. } => "insert_room",
        Command::UpdateRoom { .. } => "update_room",
        Command::DeleteRoom { .. } => "delete_room",
        Command::InsertSection { .. } => "insert_section",
        Command::DeleteSection { .. } => "delete_section",
        Command::InsertPlacement { .. } => "insert_placement",
        Command::BatchInsertPlacements { .. } => "batch_insert_placements",
        Command::DeletePlacement { .. } => "delete_placement",
        Command::SelectRooms { .. } => "select_rooms",
        Command::SelectSections { .. } => "select_sections",
        Command::SelectGroupGrid { .. } => "select_group_grid",
        Command::SelectRoomGrid { .. } => "select_room_grid",
        Command::SelectPool { .. } => "select_pool",
        Command::SelectFreeSlots { .. } => "select_free_slots",
        Command::SelectPlaceable { .. } => "select_placeable",
        Command::SelectCatalog { .. } => "select_catalog",
        Command::Listen { .. } => "listen",
        Command::ExportGroups { .. } => "export_groups",
        Command::ExportRooms { .. } => "export_rooms",
        Command::Backup { .. } => "backup",
        Command::Restore { .. } => "restore",
    }
}
