use chrono::NaiveDate;
use rusqlite::Connection;
use uuid::Uuid;

use crate::error::{EngineError, Result};
use crate::slot::{self, NOTE_RESTORED};
use crate::store::{self, InstanceRow, NewSchedule, Owner, ScheduleRow};
use crate::week;

/// A resolved slot destination. Template addressing carries a canonical day
/// token; instance addressing carries a concrete date.
#[derive(Debug, Clone)]
pub struct SlotTarget {
    pub day_of_week: Option<String>,
    pub schedule_date: Option<NaiveDate>,
    pub start: u16,
    pub end: u16,
}

impl SlotTarget {
    pub fn for_template(day: &str, start: u16, end: u16) -> Self {
        SlotTarget {
            day_of_week: Some(day.to_string()),
            schedule_date: None,
            start,
            end,
        }
    }

    pub fn for_instance(date: NaiveDate, start: u16, end: u16) -> Self {
        SlotTarget {
            day_of_week: None,
            schedule_date: Some(date),
            start,
            end,
        }
    }

    /// The store-level day key: the day token, or the formatted date.
    fn day_key(&self) -> String {
        match (&self.day_of_week, &self.schedule_date) {
            (Some(day), _) => day.clone(),
            (None, Some(date)) => week::format_date(*date),
            (None, None) => String::new(),
        }
    }

    pub fn describe(&self) -> String {
        format!(
            "{} {}-{}",
            self.day_key(),
            slot::format_time(self.start),
            slot::format_time(self.end)
        )
    }
}

/// Who is writing, for conflict-error selection: direct template edits fail
/// with `SlotConflict`, slot operations with `SlotOccupied`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteKind {
    TemplateEdit,
    Operation,
}

fn conflict_error(kind: WriteKind, target: &SlotTarget, other: &ScheduleRow) -> EngineError {
    let msg = format!(
        "{} already holds {:?} ({}-{})",
        target.describe(),
        other.student_name,
        other.start_time,
        other.end_time
    );
    match kind {
        WriteKind::TemplateEdit => EngineError::SlotConflict(msg),
        WriteKind::Operation => EngineError::SlotOccupied(msg),
    }
}

/// First active (not on-leave) record of `owner` overlapping the target span,
/// ignoring ids in `exclude`.
fn find_active_conflict(
    conn: &Connection,
    owner: &Owner,
    target: &SlotTarget,
    exclude: &[&str],
) -> Result<Option<ScheduleRow>> {
    let rows = store::list_schedules_on_day(conn, owner, &target.day_key())?;
    for row in rows {
        if row.is_on_leave || exclude.contains(&row.id.as_str()) {
            continue;
        }
        let (Ok(start), Ok(end)) = (slot::parse_time(&row.start_time), slot::parse_time(&row.end_time))
        else {
            continue;
        };
        if slot::overlaps(target.start, target.end, start, end) {
            return Ok(Some(row));
        }
    }
    Ok(None)
}

pub fn ensure_slot_free(
    conn: &Connection,
    owner: &Owner,
    target: &SlotTarget,
    exclude: &[&str],
    kind: WriteKind,
) -> Result<()> {
    match find_active_conflict(conn, owner, target, exclude)? {
        Some(other) => Err(conflict_error(kind, target, &other)),
        None => Ok(()),
    }
}

#[derive(Debug, Clone)]
pub struct AddInput {
    pub student_name: String,
    pub is_time_block: bool,
    pub is_trial: bool,
    pub note: String,
}

/// Create one schedule record after validating slot exclusivity.
pub fn add_schedule(
    conn: &Connection,
    timetable_id: &str,
    owner: &Owner,
    target: &SlotTarget,
    input: &AddInput,
    kind: WriteKind,
) -> Result<ScheduleRow> {
    ensure_slot_free(conn, owner, target, &[], kind)?;
    let new = NewSchedule {
        timetable_id: timetable_id.to_string(),
        instance_id: match owner {
            Owner::Instance { instance_id } => Some(instance_id.clone()),
            Owner::Template { .. } => None,
        },
        day_of_week: target.day_of_week.clone(),
        schedule_date: target.schedule_date.map(week::format_date),
        start_time: slot::format_time(target.start),
        end_time: slot::format_time(target.end),
        student_name: input.student_name.clone(),
        is_time_block: input.is_time_block,
        is_trial: input.is_trial,
        note: input.note.clone(),
    };
    store::insert_schedule(conn, &new)
}

/// Relocate a record's day/time. Identity is preserved.
pub fn move_schedule(
    conn: &Connection,
    row: &ScheduleRow,
    target: &SlotTarget,
) -> Result<ScheduleRow> {
    ensure_slot_free(conn, &row.owner(), target, &[&row.id], WriteKind::Operation)?;
    store::update_schedule_slot(
        conn,
        &row.id,
        target.day_of_week.as_deref(),
        target.schedule_date.map(week::format_date).as_deref(),
        &slot::format_time(target.start),
        &slot::format_time(target.end),
    )?;
    store::get_schedule(conn, &row.id)?.ok_or(EngineError::NotFound("schedule"))
}

#[derive(Debug)]
pub struct CopyFailure {
    pub target: SlotTarget,
    pub error: EngineError,
}

#[derive(Debug, Default)]
pub struct CopyOutcome {
    pub created: Vec<ScheduleRow>,
    pub failures: Vec<CopyFailure>,
}

/// Duplicate a record's content into each target slot. Targets validate
/// independently; conflicts are reported per target, not aborted on.
pub fn copy_schedule(
    conn: &Connection,
    row: &ScheduleRow,
    targets: &[SlotTarget],
) -> Result<CopyOutcome> {
    if targets.is_empty() {
        return Err(EngineError::EmptySelection);
    }
    let owner = row.owner();
    let input = AddInput {
        student_name: row.student_name.clone(),
        is_time_block: row.is_time_block,
        is_trial: row.is_trial,
        note: row.note.clone(),
    };
    let mut outcome = CopyOutcome::default();
    for target in targets {
        match add_schedule(conn, &row.timetable_id, &owner, target, &input, WriteKind::Operation) {
            Ok(created) => outcome.created.push(created),
            Err(e) => outcome.failures.push(CopyFailure {
                target: target.clone(),
                error: e,
            }),
        }
    }
    Ok(outcome)
}

/// Exchange the day/time addressing of two records in the same owner. Both
/// must be of the same duration class; identities stay put.
pub fn swap_schedules(conn: &Connection, a: &ScheduleRow, b: &ScheduleRow) -> Result<()> {
    if a.owner() != b.owner() {
        return Err(EngineError::SlotConflict(
            "swap requires two schedules of the same week view".to_string(),
        ));
    }
    let (a_start, a_end) = slot::check_span(&a.start_time, &a.end_time)?;
    let (b_start, b_end) = slot::check_span(&b.start_time, &b.end_time)?;
    if slot::is_half_hour(a_start, a_end) != slot::is_half_hour(b_start, b_end) {
        return Err(EngineError::DurationMismatch(format!(
            "cannot swap {}-{} with {}-{}",
            a.start_time, a.end_time, b.start_time, b.end_time
        )));
    }

    let tx = conn.unchecked_transaction()?;
    store::update_schedule_slot(
        &tx,
        &a.id,
        b.day_of_week.as_deref(),
        b.schedule_date.as_deref(),
        &b.start_time,
        &b.end_time,
    )?;
    store::update_schedule_slot(
        &tx,
        &b.id,
        a.day_of_week.as_deref(),
        a.schedule_date.as_deref(),
        &a.start_time,
        &a.end_time,
    )?;
    tx.commit()?;
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HalfPos {
    First,
    Second,
}

impl HalfPos {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "first" => Some(HalfPos::First),
            "second" => Some(HalfPos::Second),
            _ => None,
        }
    }
}

/// Convert a record between hour and half-hour form.
///
/// New times derive from the hour anchor of the record's current start, never
/// from the current (possibly already-halved) span, so repeated toggling
/// cannot drift.
pub fn toggle_half_hour(
    conn: &Connection,
    row: &ScheduleRow,
    enable: bool,
    position: Option<HalfPos>,
) -> Result<ScheduleRow> {
    let (start, _end) = slot::check_span(&row.start_time, &row.end_time)?;
    let anchor = slot::hour_anchor(start);

    let (new_start, new_end) = if enable {
        match position {
            Some(HalfPos::First) => (anchor, anchor + 30),
            Some(HalfPos::Second) => (anchor + 30, anchor + 60),
            None => {
                return Err(EngineError::InvalidTimeFormat(
                    "half-hour position (first/second) is required".to_string(),
                ))
            }
        }
    } else {
        (anchor, anchor + 60)
    };

    if (new_start, new_end) == (start, slot::parse_time(&row.end_time)?) {
        return Ok(row.clone());
    }

    let target = SlotTarget {
        day_of_week: row.day_of_week.clone(),
        schedule_date: row
            .schedule_date
            .as_deref()
            .map(week::parse_date)
            .transpose()?,
        start: new_start,
        end: new_end,
    };
    if let Some(other) = find_active_conflict(conn, &row.owner(), &target, &[&row.id])? {
        if !enable {
            return Err(EngineError::HalfHourPairConflict(format!(
                "cannot extend {}-{} back to the full hour: {:?} holds {}-{}",
                row.start_time, row.end_time, other.student_name, other.start_time, other.end_time
            )));
        }
        return Err(conflict_error(WriteKind::Operation, &target, &other));
    }

    store::update_schedule_slot(
        conn,
        &row.id,
        row.day_of_week.as_deref(),
        row.schedule_date.as_deref(),
        &slot::format_time(new_start),
        &slot::format_time(new_end),
    )?;
    store::get_schedule(conn, &row.id)?.ok_or(EngineError::NotFound("schedule"))
}

/// Mark an instance record on leave. Idempotent.
pub fn request_leave(
    conn: &Connection,
    row: &ScheduleRow,
    reason: Option<&str>,
) -> Result<ScheduleRow> {
    if !row.is_on_leave {
        store::set_schedule_leave(conn, &row.id, true, reason)?;
    }
    store::get_schedule(conn, &row.id)?.ok_or(EngineError::NotFound("schedule"))
}

/// Clear a record's leave flag, re-validating that its slot is still free.
pub fn cancel_leave(conn: &Connection, row: &ScheduleRow) -> Result<ScheduleRow> {
    if row.is_on_leave {
        let (start, end) = slot::check_span(&row.start_time, &row.end_time)?;
        let target = SlotTarget {
            day_of_week: row.day_of_week.clone(),
            schedule_date: row
                .schedule_date
                .as_deref()
                .map(week::parse_date)
                .transpose()?,
            start,
            end,
        };
        ensure_slot_free(conn, &row.owner(), &target, &[&row.id], WriteKind::Operation)?;
        store::set_schedule_leave(conn, &row.id, false, None)?;
    }
    store::get_schedule(conn, &row.id)?.ok_or(EngineError::NotFound("schedule"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreOutcome {
    /// A leave record existed at the slot key; its flag was cleared.
    Unleft,
    /// A matching record was already active; nothing to do.
    AlreadyPresent,
    /// The slot had been cancelled outright; a fresh clone of the template
    /// entry was created.
    Recreated,
}

impl RestoreOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            RestoreOutcome::Unleft => "unleft",
            RestoreOutcome::AlreadyPresent => "alreadyPresent",
            RestoreOutcome::Recreated => "recreated",
        }
    }
}

/// Restore a template slot into a weekly instance after a leave or a
/// cancellation. Idempotent: restoring an already-restored slot is a no-op.
pub fn restore_slot(
    conn: &Connection,
    instance: &InstanceRow,
    template: &[ScheduleRow],
    date: NaiveDate,
    start: u16,
    end: u16,
    expect_leave: bool,
) -> Result<(RestoreOutcome, ScheduleRow)> {
    let day = week::day_token_for_date(date);
    let entry = template
        .iter()
        .find(|t| {
            t.day_of_week.as_deref() == Some(day)
                && slot::parse_time(&t.start_time).ok() == Some(start)
                && slot::parse_time(&t.end_time).ok() == Some(end)
        })
        .ok_or(EngineError::NotFound("template schedule"))?;

    let owner = Owner::Instance {
        instance_id: instance.id.clone(),
    };
    let rows = store::list_schedules_on_day(conn, &owner, &week::format_date(date))?;

    // Leave case first: the record is still there, just flagged.
    if let Some(leave_row) = rows.iter().find(|r| {
        r.is_on_leave
            && slot::parse_time(&r.start_time).ok() == Some(start)
            && slot::parse_time(&r.end_time).ok() == Some(end)
    }) {
        let restored = cancel_leave(conn, leave_row)?;
        return Ok((RestoreOutcome::Unleft, restored));
    }

    // Already active at the key?
    if let Some(active) = rows.iter().find(|r| {
        !r.is_on_leave
            && slot::parse_time(&r.start_time).ok() == Some(start)
            && slot::parse_time(&r.end_time).ok() == Some(end)
    }) {
        if active.student_name == entry.student_name
            && active.is_time_block == entry.is_time_block
            && active.is_trial == entry.is_trial
        {
            return Ok((RestoreOutcome::AlreadyPresent, active.clone()));
        }
        return Err(EngineError::SlotOccupied(format!(
            "{} {}-{} already holds {:?}",
            week::format_date(date),
            slot::format_time(start),
            slot::format_time(end),
            active.student_name
        )));
    }

    // Cancelled outright: recreate from the template entry. When the caller
    // expected a leave record, its disappearance is a state mismatch we
    // recover from, not a silent fallback.
    if expect_leave {
        tracing::warn!(
            instance_id = %instance.id,
            slot = %slot::slot_key(day, start, end),
            "expected a leave record but found none; recreating from template"
        );
    } else {
        tracing::info!(
            instance_id = %instance.id,
            slot = %slot::slot_key(day, start, end),
            "restoring cancelled slot from template"
        );
    }
    let target = SlotTarget::for_instance(date, start, end);
    let input = AddInput {
        student_name: entry.student_name.clone(),
        is_time_block: entry.is_time_block,
        is_trial: entry.is_trial,
        note: NOTE_RESTORED.to_string(),
    };
    let created = add_schedule(
        conn,
        &instance.timetable_id,
        &owner,
        &target,
        &input,
        WriteKind::Operation,
    )?;
    Ok((RestoreOutcome::Recreated, created))
}

/// Interactive slot operations: pick a source, then one or more targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpKind {
    Move,
    Copy,
    Swap,
}

impl OpKind {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "move" => Some(OpKind::Move),
            "copy" => Some(OpKind::Copy),
            "swap" => Some(OpKind::Swap),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OpKind::Move => "move",
            OpKind::Copy => "copy",
            OpKind::Swap => "swap",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpState {
    Idle,
    AwaitingTarget,
    AwaitingConfirmation,
    Applied,
    Cancelled,
}

impl OpState {
    pub fn as_str(&self) -> &'static str {
        match self {
            OpState::Idle => "idle",
            OpState::AwaitingTarget => "awaitingTarget",
            OpState::AwaitingConfirmation => "awaitingConfirmation",
            OpState::Applied => "applied",
            OpState::Cancelled => "cancelled",
        }
    }
}

/// One in-flight interactive operation. Each starts awaiting its target and
/// terminates applied or cancelled; a failed apply drops the operation so the
/// slot is back to idle and ready for retry.
#[derive(Debug, Clone)]
pub struct PendingOp {
    pub id: String,
    pub kind: OpKind,
    pub schedule_id: String,
    pub state: OpState,
}

impl PendingOp {
    pub fn begin(kind: OpKind, schedule_id: &str) -> Self {
        PendingOp {
            id: Uuid::new_v4().to_string(),
            kind,
            schedule_id: schedule_id.to_string(),
            state: OpState::AwaitingTarget,
        }
    }

    /// Legal transitions only; terminal states reject everything.
    pub fn advance(&mut self, to: OpState) -> std::result::Result<(), &'static str> {
        let ok = matches!(
            (self.state, to),
            (OpState::AwaitingTarget, OpState::AwaitingConfirmation)
                | (OpState::AwaitingTarget, OpState::Applied)
                | (OpState::AwaitingTarget, OpState::Cancelled)
                | (OpState::AwaitingConfirmation, OpState::Applied)
                | (OpState::AwaitingConfirmation, OpState::Cancelled)
                | (OpState::AwaitingConfirmation, OpState::AwaitingTarget)
        );
        if !ok {
            return Err("illegal operation state transition");
        }
        self.state = to;
        Ok(())
    }
}
