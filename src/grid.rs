use std::fmt;

use serde::{Deserialize, Serialize};

/// First teaching half-hour, minutes from midnight (08:00).
pub const FIRST_SLOT_MIN: u16 = 8 * 60;
/// Minutes per grid row.
pub const SLOT_MINUTES: u16 = 30;
/// Rows per day: 08:00 through 16:30 inclusive.
pub const SLOT_COUNT: u8 = 18;

/// Teaching weekday. The grid has no weekend columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Day {
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
}

impl Day {
    pub const ALL: [Day; 5] = [
        Day::Monday,
        Day::Tuesday,
        Day::Wednesday,
        Day::Thursday,
        Day::Friday,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Day::Monday => "Monday",
            Day::Tuesday => "Tuesday",
            Day::Wednesday => "Wednesday",
            Day::Thursday => "Thursday",
            Day::Friday => "Friday",
        }
    }

    pub fn parse(s: &str) -> Option<Day> {
        match s.trim().to_ascii_lowercase().as_str() {
            "monday" => Some(Day::Monday),
            "tuesday" => Some(Day::Tuesday),
            "wednesday" => Some(Day::Wednesday),
            "thursday" => Some(Day::Thursday),
            "friday" => Some(Day::Friday),
            _ => None,
        }
    }
}

impl fmt::Display for Day {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One half-hour row of the grid. Index 0 is 08:00 AM, index 17 is 04:30 PM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Slot(u8);

impl Slot {
    pub fn new(index: u8) -> Option<Slot> {
        (index < SLOT_COUNT).then_some(Slot(index))
    }

    pub fn index(self) -> u8 {
        self.0
    }

    /// Minutes from midnight at which this slot starts.
    pub fn minutes(self) -> u16 {
        FIRST_SLOT_MIN + self.0 as u16 * SLOT_MINUTES
    }

    pub fn all() -> impl Iterator<Item = Slot> {
        (0..SLOT_COUNT).map(Slot)
    }

    /// 12-hour clock label, e.g. `"08:00 AM"` or `"01:30 PM"`.
    pub fn label(self) -> String {
        let h24 = self.minutes() / 60;
        let m = self.minutes() % 60;
        let (h12, meridiem) = match h24 {
            0 => (12, "AM"),
            1..=11 => (h24, "AM"),
            12 => (12, "PM"),
            _ => (h24 - 12, "PM"),
        };
        format!("{h12:02}:{m:02} {meridiem}")
    }

    /// Parse `"08:00 AM"`, `"08:00"`, or `"13:30"`. Rejects times that are
    /// not a half-hour boundary within the teaching day.
    pub fn parse(s: &str) -> Option<Slot> {
        let token = s.trim().to_ascii_uppercase();
        let (time_part, meridiem) = match token.strip_suffix("AM") {
            Some(rest) => (rest.trim_end().to_string(), Some(false)),
            None => match token.strip_suffix("PM") {
                Some(rest) => (rest.trim_end().to_string(), Some(true)),
                None => (token, None),
            },
        };

        let (hh, mm) = time_part.split_once(':')?;
        let mut hour: u16 = hh.trim().parse().ok()?;
        let minute: u16 = mm.trim().parse().ok()?;
        if minute > 59 {
            return None;
        }
        match meridiem {
            Some(true) if hour != 12 => hour += 12,
            Some(false) if hour == 12 => hour = 0,
            _ => {}
        }
        if hour > 23 {
            return None;
        }

        let minutes = hour * 60 + minute;
        if minutes < FIRST_SLOT_MIN {
            return None;
        }
        let offset = minutes - FIRST_SLOT_MIN;
        if offset % SLOT_MINUTES != 0 {
            return None;
        }
        Slot::new((offset / SLOT_MINUTES) as u8)
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

/// A single grid cell: one weekday, one half-hour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Cell {
    pub day: Day,
    pub slot: Slot,
}

impl Cell {
    pub fn new(day: Day, slot: Slot) -> Cell {
        Cell { day, slot }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.day, self.slot)
    }
}

/// All 90 cells of the week, day-major.
pub fn cells() -> impl Iterator<Item = Cell> {
    Day::ALL
        .into_iter()
        .flat_map(|day| Slot::all().map(move |slot| Cell::new(day, slot)))
}
