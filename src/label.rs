//! The human-readable section label: `"3T: Laboratorio Física (Group 2,
//! P310, 25 students)"`. It is what grid cells display, what Excel
//! export writes, and the record format of legacy JSON backups — so it
//! must parse back into structured fields losslessly.

use std::sync::OnceLock;

use regex::Regex;

use crate::model::SectionState;

/// Render the label for a section placed in (or bound to) `room_name`.
pub fn render(section: &SectionState, room_name: &str) -> String {
    format!(
        "{}T: {} (Group {}, {}, {} students)",
        section.trimester, section.course, section.number, room_name, section.students
    )
}

/// Structured fields recovered from a label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedLabel {
    pub trimester: u8,
    pub course: String,
    pub number: u32,
    pub room: String,
    pub students: u32,
}

/// Identity key for deduplicating labels that describe the same section.
impl ParsedLabel {
    pub fn key(&self) -> (u8, &str, u32, &str, u32) {
        (
            self.trimester,
            self.course.as_str(),
            self.number,
            self.room.as_str(),
            self.students,
        )
    }
}

fn label_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        // Course is non-greedy up to the parenthesized suffix; room runs to
        // the next comma. Course titles containing " (Group " and room names
        // containing ',' are unrepresentable — room names are validated at
        // creation.
        Regex::new(r"^(\d+)T: (.+?) \(Group (\d+), ([^,]+), (\d+) students\)$")
            .expect("label regex")
    })
}

/// Parse a label back into structured fields. Returns `None` for text
/// that does not match the record format (malformed backup entries are
/// skipped upstream, as the original tool did).
pub fn parse(label: &str) -> Option<ParsedLabel> {
    let caps = label_re().captures(label.trim())?;
    Some(ParsedLabel {
        trimester: caps[1].parse().ok()?,
        course: caps[2].to_string(),
        number: caps[3].parse().ok()?,
        room: caps[4].to_string(),
        students: caps[5].parse().ok()?,
    })
}
