//! Hard caps on per-term state and request sizes.

pub const MAX_ROOMS_PER_TERM: usize = 1024;
pub const MAX_SECTIONS_PER_TERM: usize = 16_384;

/// Room names appear inside section labels; keep them short and
/// comma-free so labels stay parseable.
pub const MAX_ROOM_NAME_LEN: usize = 64;
pub const MAX_COURSE_LEN: usize = 128;

pub const MAX_STUDENTS: u32 = 10_000;

/// Upper bound on a multi-row placement INSERT. A whole teaching day is
/// 18 cells; 64 covers any realistic weekly block pattern.
pub const MAX_BATCH_SIZE: usize = 64;

pub const MAX_TERMS: usize = 256;
pub const MAX_TERM_NAME_LEN: usize = 256;
