//! Timetable overlap detection.

use serde::Serialize;

use crate::repo::schedules::ScheduleBlock;

/// Minutes since midnight for an `HH:MM` string.
pub fn parse_hhmm(s: &str) -> Option<u32> {
    let (h, m) = s.trim().split_once(':')?;
    if h.is_empty() || h.len() > 2 || m.len() != 2 {
        return None;
    }
    let h: u32 = h.parse().ok()?;
    let m: u32 = m.parse().ok()?;
    if h > 23 || m > 59 {
        return None;
    }
    Some(h * 60 + m)
}

/// Half-open `[start, end)` ranges overlap.
pub fn overlaps(s1: u32, e1: u32, s2: u32, e2: u32) -> bool {
    s1 < e2 && e1 > s2
}

/// What a new or edited block would occupy.
#[derive(Debug, Clone, Copy)]
pub struct Slot<'a> {
    pub day: &'a str,
    pub start: u32,
    pub end: u32,
    pub teacher_id: &'a str,
    pub class_id: &'a str,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Conflicts {
    pub teacher: Option<ScheduleBlock>,
    pub class: Option<ScheduleBlock>,
}

impl Conflicts {
    pub fn is_empty(&self) -> bool {
        self.teacher.is_none() && self.class.is_none()
    }
}

/// Scans `existing` for same-day blocks sharing the teacher or the class that
/// overlap `slot`. Blocks with unreadable times never conflict.
pub fn find_conflicts(slot: &Slot<'_>, existing: &[ScheduleBlock], exclude_id: Option<&str>) -> Conflicts {
    let mut out = Conflicts::default();
    for b in existing {
        if exclude_id == Some(b.id.as_str()) || b.day != slot.day {
            continue;
        }
        let same_teacher = b.teacher_id == slot.teacher_id;
        let same_class = b.class_id == slot.class_id;
        if !same_teacher && !same_class {
            continue;
        }
        let (Some(bs), Some(be)) = (parse_hhmm(&b.start_time), parse_hhmm(&b.end_time)) else {
            continue;
        };
        if !overlaps(slot.start, slot.end, bs, be) {
            continue;
        }
        if same_teacher && out.teacher.is_none() {
            out.teacher = Some(b.clone());
        }
        if same_class && out.class.is_none() {
            out.class = Some(b.clone());
        }
        if out.teacher.is_some() && out.class.is_some() {
            break;
        }
    }
    out
}
