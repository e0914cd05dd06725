use std::collections::{HashMap, HashSet};

use crate::slot::{self, day_index};
use crate::store::ScheduleRow;
use crate::week;

/// How an instance schedule relates to the template for the same slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Unchanged,
    Added,
    Modified,
}

impl Classification {
    pub fn as_str(&self) -> &'static str {
        match self {
            Classification::Unchanged => "unchanged",
            Classification::Added => "added",
            Classification::Modified => "modified",
        }
    }
}

#[derive(Debug)]
pub struct SlotDiff<'a> {
    pub schedule: &'a ScheduleRow,
    pub classification: Classification,
    /// The template record this slot was matched against, if any.
    pub template_id: Option<String>,
}

/// A template slot with no active record in the instance this week: either
/// hard-deleted there, or retained but on leave.
#[derive(Debug)]
pub struct CancelledSlot<'a> {
    pub template: &'a ScheduleRow,
    pub on_leave: bool,
}

#[derive(Debug, Default)]
pub struct DiffReport<'a> {
    pub active: Vec<SlotDiff<'a>>,
    pub on_leave: Vec<&'a ScheduleRow>,
    pub cancelled: Vec<CancelledSlot<'a>>,
}

struct TemplateEntry<'a> {
    row: &'a ScheduleRow,
    day: &'static str,
    start: u16,
    end: u16,
}

fn template_entry<'a>(row: &'a ScheduleRow) -> Option<TemplateEntry<'a>> {
    let day = slot::normalize_day(row.day_of_week.as_deref()?).ok()?;
    let start = slot::parse_time(&row.start_time).ok()?;
    let end = slot::parse_time(&row.end_time).ok()?;
    Some(TemplateEntry { row, day, start, end })
}

fn instance_slot(row: &ScheduleRow) -> Option<(&'static str, u16, u16)> {
    let date = week::parse_date(row.schedule_date.as_deref()?).ok()?;
    let start = slot::parse_time(&row.start_time).ok()?;
    let end = slot::parse_time(&row.end_time).ok()?;
    Some((week::day_token_for_date(date), start, end))
}

fn content_matches(a: &ScheduleRow, b: &ScheduleRow) -> bool {
    // Notes carry provenance ("manually added", "restored", ...) and are
    // deliberately not part of the comparison: a restored record must read
    // as unchanged.
    a.student_name == b.student_name
        && a.is_time_block == b.is_time_block
        && a.is_trial == b.is_trial
}

/// Classify every schedule of a weekly instance against its timetable's
/// template. Pure and deterministic: same snapshots in, same report out.
pub fn diff_week<'a>(
    template: &'a [ScheduleRow],
    instance: &'a [ScheduleRow],
) -> DiffReport<'a> {
    let entries: Vec<TemplateEntry<'a>> =
        template.iter().filter_map(template_entry).collect();

    let mut exact: HashMap<(&'static str, u16, u16), usize> = HashMap::new();
    for (i, e) in entries.iter().enumerate() {
        exact.insert((e.day, e.start, e.end), i);
    }

    // Index of the hour-long template entry fully spanning a half-hour slot.
    let containing_hour = |day: &'static str, start: u16, end: u16| -> Option<usize> {
        entries.iter().position(|e| {
            e.day == day
                && !slot::is_half_hour(e.start, e.end)
                && slot::contains(e.start, e.end, start, end)
        })
    };

    let mut report = DiffReport::default();
    let mut covered: HashSet<usize> = HashSet::new();
    let mut leave_slots: Vec<(&'static str, u16, u16)> = Vec::new();

    for row in instance {
        let Some((day, start, end)) = instance_slot(row) else {
            tracing::debug!(schedule_id = %row.id, "skipping malformed instance record in diff");
            continue;
        };
        if row.is_on_leave {
            leave_slots.push((day, start, end));
            report.on_leave.push(row);
            continue;
        }

        let diff = if let Some(&i) = exact.get(&(day, start, end)) {
            covered.insert(i);
            SlotDiff {
                schedule: row,
                classification: if content_matches(row, entries[i].row) {
                    Classification::Unchanged
                } else {
                    Classification::Modified
                },
                template_id: Some(entries[i].row.id.clone()),
            }
        } else if slot::is_half_hour(start, end) {
            // A half-hour carve-out of an hour-long template commitment.
            match containing_hour(day, start, end) {
                Some(i) => {
                    covered.insert(i);
                    SlotDiff {
                        schedule: row,
                        classification: if content_matches(row, entries[i].row) {
                            Classification::Unchanged
                        } else {
                            Classification::Modified
                        },
                        template_id: Some(entries[i].row.id.clone()),
                    }
                }
                None => SlotDiff {
                    schedule: row,
                    classification: Classification::Added,
                    template_id: None,
                },
            }
        } else {
            SlotDiff {
                schedule: row,
                classification: Classification::Added,
                template_id: None,
            }
        };
        report.active.push(diff);
    }

    let leave_matches = |e: &TemplateEntry| {
        leave_slots.iter().any(|&(day, start, end)| {
            e.day == day
                && ((e.start, e.end) == (start, end)
                    || (!slot::is_half_hour(e.start, e.end)
                        && slot::contains(e.start, e.end, start, end)))
        })
    };

    let mut cancelled: Vec<CancelledSlot<'a>> = entries
        .iter()
        .enumerate()
        .filter(|(i, _)| !covered.contains(i))
        .map(|(_, e)| CancelledSlot {
            template: e.row,
            on_leave: leave_matches(e),
        })
        .collect();
    cancelled.sort_by_key(|c| {
        (
            day_index(c.template.day_of_week.as_deref().unwrap_or("mon")),
            c.template.start_time.clone(),
        )
    });
    report.cancelled = cancelled;

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ScheduleRow;

    fn template_row(id: &str, day: &str, start: &str, end: &str, student: &str) -> ScheduleRow {
        ScheduleRow {
            id: id.to_string(),
            timetable_id: "tt".to_string(),
            instance_id: None,
            day_of_week: Some(day.to_string()),
            schedule_date: None,
            start_time: start.to_string(),
            end_time: end.to_string(),
            student_name: student.to_string(),
            is_time_block: false,
            is_trial: false,
            is_on_leave: false,
            leave_reason: None,
            note: String::new(),
            created_at: "0".to_string(),
            updated_at: None,
        }
    }

    fn instance_row(id: &str, date: &str, start: &str, end: &str, student: &str) -> ScheduleRow {
        ScheduleRow {
            instance_id: Some("inst".to_string()),
            day_of_week: None,
            schedule_date: Some(date.to_string()),
            ..template_row(id, "mon", start, end, student)
        }
    }

    // Week of 2026-08-03 (Monday) is used throughout; 2026-08-03 is a Monday.

    #[test]
    fn fresh_clone_classifies_everything_unchanged() {
        let template = vec![
            template_row("t1", "mon", "16:00", "17:00", "Alice"),
            template_row("t2", "wed", "10:00", "10:30", "Bob"),
        ];
        let instance = vec![
            instance_row("i1", "2026-08-03", "16:00", "17:00", "Alice"),
            instance_row("i2", "2026-08-05", "10:00", "10:30", "Bob"),
        ];
        let report = diff_week(&template, &instance);
        assert_eq!(report.active.len(), 2);
        assert!(report
            .active
            .iter()
            .all(|d| d.classification == Classification::Unchanged));
        assert!(report.cancelled.is_empty());
        assert!(report.on_leave.is_empty());
    }

    #[test]
    fn moved_slot_reads_as_added_plus_cancelled() {
        let template = vec![template_row("t1", "mon", "16:00", "17:00", "Alice")];
        let instance = vec![instance_row("i1", "2026-08-03", "17:00", "18:00", "Alice")];
        let report = diff_week(&template, &instance);
        assert_eq!(report.active.len(), 1);
        assert_eq!(report.active[0].classification, Classification::Added);
        assert_eq!(report.cancelled.len(), 1);
        assert_eq!(report.cancelled[0].template.id, "t1");
        assert!(!report.cancelled[0].on_leave);
    }

    #[test]
    fn different_student_at_same_slot_is_modified() {
        let template = vec![template_row("t1", "mon", "16:00", "17:00", "Alice")];
        let instance = vec![instance_row("i1", "2026-08-03", "16:00", "17:00", "Dana")];
        let report = diff_week(&template, &instance);
        assert_eq!(report.active[0].classification, Classification::Modified);
        assert_eq!(report.active[0].template_id.as_deref(), Some("t1"));
        assert!(report.cancelled.is_empty());
    }

    #[test]
    fn note_differences_do_not_count_as_modified() {
        let template = vec![template_row("t1", "mon", "16:00", "17:00", "Alice")];
        let mut restored = instance_row("i1", "2026-08-03", "16:00", "17:00", "Alice");
        restored.note = "restored".to_string();
        let instance = [restored];
        let report = diff_week(&template, &instance);
        assert_eq!(report.active[0].classification, Classification::Unchanged);
    }

    #[test]
    fn half_hour_prefers_exact_match_over_containment() {
        let template = vec![
            template_row("t-hour", "mon", "16:00", "17:00", "Alice"),
            template_row("t-half", "mon", "16:30", "17:00", "Bob"),
        ];
        let instance = vec![instance_row("i1", "2026-08-03", "16:30", "17:00", "Bob")];
        let report = diff_week(&template, &instance);
        assert_eq!(report.active[0].template_id.as_deref(), Some("t-half"));
        assert_eq!(report.active[0].classification, Classification::Unchanged);
        // The hour-long entry had no coverage and is cancelled.
        assert_eq!(report.cancelled.len(), 1);
        assert_eq!(report.cancelled[0].template.id, "t-hour");
    }

    #[test]
    fn half_hour_carve_out_of_hour_template_is_unchanged_when_student_matches() {
        let template = vec![template_row("t1", "mon", "16:00", "17:00", "Alice")];
        let instance = vec![
            instance_row("i1", "2026-08-03", "16:00", "16:30", "Alice"),
            instance_row("i2", "2026-08-03", "16:30", "17:00", "Carol"),
        ];
        let report = diff_week(&template, &instance);
        assert_eq!(report.active[0].classification, Classification::Unchanged);
        assert_eq!(report.active[0].template_id.as_deref(), Some("t1"));
        assert_eq!(report.active[1].classification, Classification::Modified);
        assert_eq!(report.active[1].template_id.as_deref(), Some("t1"));
        assert!(report.cancelled.is_empty());
    }

    #[test]
    fn hour_slot_does_not_match_half_hour_template() {
        let template = vec![template_row("t1", "mon", "16:00", "16:30", "Alice")];
        let instance = vec![instance_row("i1", "2026-08-03", "16:00", "17:00", "Alice")];
        let report = diff_week(&template, &instance);
        assert_eq!(report.active[0].classification, Classification::Added);
        assert_eq!(report.cancelled.len(), 1);
    }

    #[test]
    fn leave_shows_as_cancelled_with_leave_flag() {
        let template = vec![template_row("t1", "mon", "16:00", "17:00", "Alice")];
        let mut on_leave = instance_row("i1", "2026-08-03", "16:00", "17:00", "Alice");
        on_leave.is_on_leave = true;
        let instance = [on_leave];
        let report = diff_week(&template, &instance);
        assert!(report.active.is_empty());
        assert_eq!(report.on_leave.len(), 1);
        assert_eq!(report.cancelled.len(), 1);
        assert!(report.cancelled[0].on_leave);
    }

    #[test]
    fn half_hour_leave_flags_the_containing_hour_template() {
        let template = vec![template_row("t1", "mon", "16:00", "17:00", "Bob")];
        let mut first_half = instance_row("i1", "2026-08-03", "16:00", "16:30", "Bob");
        first_half.is_on_leave = true;
        let instance = [first_half];
        let report = diff_week(&template, &instance);
        assert_eq!(report.cancelled.len(), 1);
        assert!(report.cancelled[0].on_leave);
    }

    #[test]
    fn diff_is_deterministic_across_reruns() {
        let template = vec![
            template_row("t1", "fri", "09:00", "10:00", "Alice"),
            template_row("t2", "mon", "16:00", "17:00", "Bob"),
            template_row("t3", "wed", "11:00", "11:30", "Carol"),
        ];
        let instance = vec![instance_row("i1", "2026-08-04", "14:00", "15:00", "Eve")];
        let a = diff_week(&template, &instance);
        let b = diff_week(&template, &instance);
        let ids = |r: &DiffReport| {
            r.cancelled
                .iter()
                .map(|c| c.template.id.clone())
                .collect::<Vec<_>>()
        };
        assert_eq!(ids(&a), ids(&b));
        // Cancelled slots come out in day/time order.
        assert_eq!(ids(&a), vec!["t2", "t3", "t1"]);
    }
}
