use chrono::{Duration, NaiveDate};
use rusqlite::Connection;

use crate::error::{EngineError, Result};
use crate::genguard::GenerationGuard;
use crate::slot;
use crate::store::{self, InstanceRow, NewSchedule, Owner};
use crate::week;

#[derive(Debug)]
pub struct EnsureOutcome {
    pub instance: InstanceRow,
    pub generated: bool,
}

/// Instance for the week containing `date`, generating it from the template
/// if absent. Generation is guarded per timetable: concurrent callers wait
/// for the in-flight generation and receive the winner's instance.
pub fn ensure_week(
    conn: &Connection,
    guard: &GenerationGuard,
    timetable_id: &str,
    date: NaiveDate,
) -> Result<EnsureOutcome> {
    let start = week::week_start(date);
    let start_s = week::format_date(start);
    let end_s = week::format_date(week::week_end(start));

    if let Some(existing) = store::find_instance_by_week(conn, timetable_id, &start_s)? {
        return Ok(EnsureOutcome {
            instance: existing,
            generated: false,
        });
    }
    if !store::timetable_exists(conn, timetable_id)? {
        return Err(EngineError::NotFound("timetable"));
    }

    let _permit = guard.acquire(timetable_id)?;
    // Re-check: a concurrent caller may have generated while we waited.
    if let Some(existing) = store::find_instance_by_week(conn, timetable_id, &start_s)? {
        return Ok(EnsureOutcome {
            instance: existing,
            generated: false,
        });
    }

    let tx = conn.unchecked_transaction()?;
    let instance = match store::insert_instance(&tx, timetable_id, &start_s, &end_s) {
        Ok(i) => i,
        Err(EngineError::Database(rusqlite::Error::SqliteFailure(e, _)))
            if e.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            // Lost a race against another process sharing the workspace;
            // the UNIQUE(timetable_id, week_start) backstop caught it.
            drop(tx);
            tracing::warn!(%timetable_id, week_start = %start_s, "generation raced; using existing instance");
            let winner = store::find_instance_by_week(conn, timetable_id, &start_s)?
                .ok_or(EngineError::NotFound("weekly instance"))?;
            return Ok(EnsureOutcome {
                instance: winner,
                generated: false,
            });
        }
        Err(e) => return Err(e),
    };
    let cloned = clone_template_into(&tx, timetable_id, &instance, start)?;
    tx.commit()?;
    tracing::info!(%timetable_id, week_start = %start_s, cloned, "generated weekly instance");

    Ok(EnsureOutcome {
        instance,
        generated: true,
    })
}

pub fn ensure_current_week(
    conn: &Connection,
    guard: &GenerationGuard,
    timetable_id: &str,
    today: NaiveDate,
) -> Result<EnsureOutcome> {
    ensure_week(conn, guard, timetable_id, today)
}

/// Next week's instance. Never generated in isolation: the current week must
/// already exist.
pub fn ensure_next_week(
    conn: &Connection,
    guard: &GenerationGuard,
    timetable_id: &str,
    today: NaiveDate,
) -> Result<EnsureOutcome> {
    let current_start = week::format_date(week::week_start(today));
    if store::find_instance_by_week(conn, timetable_id, &current_start)?.is_none() {
        return Err(EngineError::PrecedingWeekMissing);
    }
    ensure_week(conn, guard, timetable_id, today + Duration::days(7))
}

/// Copy every template entry into the instance, translating day-of-week into
/// a concrete date within the instance's week.
fn clone_template_into(
    conn: &Connection,
    timetable_id: &str,
    instance: &InstanceRow,
    week_start: NaiveDate,
) -> Result<usize> {
    let mut cloned = 0;
    for t in store::list_template_schedules(conn, timetable_id)? {
        let Some(day) = t.day_of_week.as_deref().and_then(|d| slot::normalize_day(d).ok())
        else {
            tracing::debug!(schedule_id = %t.id, "skipping template record with no usable day");
            continue;
        };
        let date = week::date_for_day(week_start, day);
        store::insert_schedule(
            conn,
            &NewSchedule {
                timetable_id: timetable_id.to_string(),
                instance_id: Some(instance.id.clone()),
                day_of_week: None,
                schedule_date: Some(week::format_date(date)),
                start_time: t.start_time.clone(),
                end_time: t.end_time.clone(),
                student_name: t.student_name.clone(),
                is_time_block: t.is_time_block,
                is_trial: t.is_trial,
                note: t.note.clone(),
            },
        )?;
        cloned += 1;
    }
    Ok(cloned)
}

/// Delete all of an instance's schedules; the week itself stays (empty).
pub fn clear_instance(conn: &Connection, instance_id: &str) -> Result<usize> {
    if store::get_instance(conn, instance_id)?.is_none() {
        return Err(EngineError::InstanceNotFound(instance_id.to_string()));
    }
    let removed = store::delete_instance_schedules(conn, instance_id)?;
    tracing::info!(%instance_id, removed, "cleared weekly instance");
    Ok(removed)
}

/// Clear, then re-clone from the template: the week reads as freshly
/// generated afterwards.
pub fn restore_instance_to_template(conn: &Connection, instance_id: &str) -> Result<usize> {
    let instance = store::get_instance(conn, instance_id)?
        .ok_or_else(|| EngineError::InstanceNotFound(instance_id.to_string()))?;
    let start = week::parse_date(&instance.week_start)?;
    let tx = conn.unchecked_transaction()?;
    store::delete_instance_schedules(&tx, instance_id)?;
    let cloned = clone_template_into(&tx, &instance.timetable_id, &instance, start)?;
    tx.commit()?;
    tracing::info!(%instance_id, cloned, "restored weekly instance to template");
    Ok(cloned)
}

pub fn delete_instance(conn: &Connection, instance_id: &str) -> Result<()> {
    store::delete_instance(conn, instance_id)?;
    tracing::info!(%instance_id, "deleted weekly instance");
    Ok(())
}

#[derive(Debug, Default)]
pub struct SyncReport {
    pub instances_seen: usize,
    pub slots_added: usize,
}

/// Merge template entries into every existing instance, additively.
///
/// Only entries created after an instance was generated qualify: an older
/// entry absent from the instance was cancelled there on purpose, and
/// instance-local edits are never overwritten. An entry is skipped when any
/// record of the instance, active or on leave, overlaps its slot.
pub fn sync_template_to_instances(conn: &Connection, timetable_id: &str) -> Result<SyncReport> {
    let template = store::list_template_schedules(conn, timetable_id)?;
    let mut report = SyncReport::default();

    for instance in store::list_instances(conn, timetable_id)? {
        report.instances_seen += 1;
        let instance_born: i64 = instance.created_at.parse().unwrap_or(0);
        let start = week::parse_date(&instance.week_start)?;
        let owner = Owner::Instance {
            instance_id: instance.id.clone(),
        };

        for t in &template {
            let born: i64 = t.created_at.parse().unwrap_or(0);
            if born <= instance_born {
                continue;
            }
            let Some(day) = t.day_of_week.as_deref().and_then(|d| slot::normalize_day(d).ok())
            else {
                continue;
            };
            let (Ok(t_start), Ok(t_end)) =
                (slot::parse_time(&t.start_time), slot::parse_time(&t.end_time))
            else {
                continue;
            };
            let date = week::date_for_day(start, day);
            if any_record_overlaps(conn, &owner, date, t_start, t_end)? {
                continue;
            }
            store::insert_schedule(
                conn,
                &NewSchedule {
                    timetable_id: timetable_id.to_string(),
                    instance_id: Some(instance.id.clone()),
                    day_of_week: None,
                    schedule_date: Some(week::format_date(date)),
                    start_time: t.start_time.clone(),
                    end_time: t.end_time.clone(),
                    student_name: t.student_name.clone(),
                    is_time_block: t.is_time_block,
                    is_trial: t.is_trial,
                    note: t.note.clone(),
                },
            )?;
            report.slots_added += 1;
        }
    }

    tracing::info!(
        %timetable_id,
        instances = report.instances_seen,
        added = report.slots_added,
        "synced template into instances"
    );
    Ok(report)
}

/// Unlike the engine's exclusivity check, leave records count here: a slot
/// with an on-leave occupant is not template-only.
fn any_record_overlaps(
    conn: &Connection,
    owner: &Owner,
    date: NaiveDate,
    start: u16,
    end: u16,
) -> Result<bool> {
    let rows = store::list_schedules_on_day(conn, owner, &week::format_date(date))?;
    for row in rows {
        let (Ok(r_start), Ok(r_end)) =
            (slot::parse_time(&row.start_time), slot::parse_time(&row.end_time))
        else {
            continue;
        };
        if slot::overlaps(start, end, r_start, r_end) {
            return Ok(true);
        }
    }
    Ok(false)
}
