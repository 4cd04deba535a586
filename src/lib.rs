pub mod auth;
pub mod catalog;
pub mod compactor;
pub mod engine;
pub mod export;
pub mod grid;
pub mod label;
pub mod limits;
pub mod model;
pub mod notify;
pub mod observability;
pub mod snapshot;
pub mod sql;
pub mod term;
pub mod tls;
pub mod wal;
pub mod wire;
