use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::Connection;

use crate::store::{self, NewCourse, StoreError};

pub const MIN_WEEK: u8 = 1;
pub const MAX_WEEK: u8 = 18;

/// Day-of-week portion of a timetable slot. Wire labels are the short
/// English day names ("Mon".."Sun").
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Weekday {
    Mon,
    Tue,
    Wed,
    Thu,
    Fri,
    Sat,
    Sun,
}

impl Weekday {
    pub const ALL: [Weekday; 7] = [
        Weekday::Mon,
        Weekday::Tue,
        Weekday::Wed,
        Weekday::Thu,
        Weekday::Fri,
        Weekday::Sat,
        Weekday::Sun,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Weekday::Mon => "Mon",
            Weekday::Tue => "Tue",
            Weekday::Wed => "Wed",
            Weekday::Thu => "Thu",
            Weekday::Fri => "Fri",
            Weekday::Sat => "Sat",
            Weekday::Sun => "Sun",
        }
    }

    pub fn parse(s: &str) -> Option<Weekday> {
        match s.trim() {
            "Mon" => Some(Weekday::Mon),
            "Tue" => Some(Weekday::Tue),
            "Wed" => Some(Weekday::Wed),
            "Thu" => Some(Weekday::Thu),
            "Fri" => Some(Weekday::Fri),
            "Sat" => Some(Weekday::Sat),
            "Sun" => Some(Weekday::Sun),
            _ => None,
        }
    }
}

impl ToSql for Weekday {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for Weekday {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let s = value.as_str()?;
        Weekday::parse(s)
            .ok_or_else(|| FromSqlError::Other(format!("unknown weekday label: {s}").into()))
    }
}

/// One of the five fixed class-time blocks of a teaching day. These are
/// labeled ranges, not clock intervals; the wire label is e.g. "1-2".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PeriodSlot {
    P1_2,
    P3_4,
    P5_6,
    P7_8,
    P9_10,
}

impl PeriodSlot {
    pub const ALL: [PeriodSlot; 5] = [
        PeriodSlot::P1_2,
        PeriodSlot::P3_4,
        PeriodSlot::P5_6,
        PeriodSlot::P7_8,
        PeriodSlot::P9_10,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            PeriodSlot::P1_2 => "1-2",
            PeriodSlot::P3_4 => "3-4",
            PeriodSlot::P5_6 => "5-6",
            PeriodSlot::P7_8 => "7-8",
            PeriodSlot::P9_10 => "9-10",
        }
    }

    pub fn parse(s: &str) -> Option<PeriodSlot> {
        match s.trim() {
            "1-2" => Some(PeriodSlot::P1_2),
            "3-4" => Some(PeriodSlot::P3_4),
            "5-6" => Some(PeriodSlot::P5_6),
            "7-8" => Some(PeriodSlot::P7_8),
            "9-10" => Some(PeriodSlot::P9_10),
            _ => None,
        }
    }
}

impl ToSql for PeriodSlot {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for PeriodSlot {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let s = value.as_str()?;
        PeriodSlot::parse(s)
            .ok_or_else(|| FromSqlError::Other(format!("unknown period label: {s}").into()))
    }
}

/// User-entered course fields shared by every slot of a batch. Week and
/// period come from the multi-select, not the template.
#[derive(Debug, Clone)]
pub struct CourseTemplate {
    pub name: String,
    pub teacher: String,
    pub day: Weekday,
    pub location: String,
}

/// A (week, period) cell of the term calendar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct SlotRef {
    pub week: u8,
    pub period: PeriodSlot,
}

#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub success_count: usize,
    pub failures: Vec<SlotRef>,
}

#[derive(Debug)]
pub enum ScheduleError {
    /// Bad input shape: empty required field, empty selection, week out of
    /// range. Nothing was read or written.
    Validation(String),
    /// At least one requested slot is already occupied. Carries every
    /// conflicting (week, period) pair; nothing was written.
    Conflict(Vec<SlotRef>),
    /// The conflict-phase query itself failed; nothing was written.
    Store(rusqlite::Error),
}

impl From<rusqlite::Error> for ScheduleError {
    fn from(e: rusqlite::Error) -> Self {
        ScheduleError::Store(e)
    }
}

/// Expand the "apply range" shortcut into an inclusive week list.
pub fn expand_week_range(start: u8, end: u8) -> Result<Vec<u8>, ScheduleError> {
    if start < MIN_WEEK || end > MAX_WEEK || start > end {
        return Err(ScheduleError::Validation(format!(
            "week range must satisfy {MIN_WEEK} <= start <= end <= {MAX_WEEK}, got {start}..{end}"
        )));
    }
    Ok((start..=end).collect())
}

fn validate_template(template: &CourseTemplate) -> Result<(), ScheduleError> {
    if template.name.trim().is_empty() {
        return Err(ScheduleError::Validation("course name is required".into()));
    }
    if template.teacher.trim().is_empty() {
        return Err(ScheduleError::Validation("teacher is required".into()));
    }
    if template.location.trim().is_empty() {
        return Err(ScheduleError::Validation("location is required".into()));
    }
    Ok(())
}

/// Schedule one course template across the weeks x periods product.
///
/// Runs in two phases. The conflict phase reads every selected week and
/// collects all occupied (week, period) pairs; any hit aborts the whole
/// batch before a single row is written, so the caller never sees a
/// half-applied selection. The mutation phase inserts one row per pair;
/// slots are independent, so a store failure on one slot is recorded in
/// `failures` and the remaining slots are still attempted.
pub fn propose_schedule(
    conn: &Connection,
    owner_id: &str,
    template: &CourseTemplate,
    weeks: &[u8],
    periods: &[PeriodSlot],
) -> Result<BatchOutcome, ScheduleError> {
    validate_template(template)?;

    if weeks.is_empty() {
        return Err(ScheduleError::Validation(
            "select at least one teaching week".into(),
        ));
    }
    if periods.is_empty() {
        return Err(ScheduleError::Validation(
            "select at least one period".into(),
        ));
    }
    if let Some(bad) = weeks
        .iter()
        .find(|w| !(MIN_WEEK..=MAX_WEEK).contains(*w))
    {
        return Err(ScheduleError::Validation(format!(
            "week {bad} is outside {MIN_WEEK}..{MAX_WEEK}"
        )));
    }

    let mut weeks = weeks.to_vec();
    weeks.sort_unstable();
    weeks.dedup();
    let mut periods = periods.to_vec();
    periods.sort_unstable();
    periods.dedup();

    // Conflict phase: one query per week, matched against every selected
    // period. Must complete before any insert.
    let mut conflicts: Vec<SlotRef> = Vec::new();
    for &week in &weeks {
        let existing = store::courses_for_week(conn, owner_id, week)?;
        for &period in &periods {
            let taken = existing
                .iter()
                .any(|c| c.day_of_week == template.day && c.period_slot == period);
            if taken {
                conflicts.push(SlotRef { week, period });
            }
        }
    }
    if !conflicts.is_empty() {
        return Err(ScheduleError::Conflict(conflicts));
    }

    // Mutation phase: best effort per slot, tally the stragglers.
    let mut outcome = BatchOutcome::default();
    for &week in &weeks {
        for &period in &periods {
            let row = NewCourse {
                owner_id,
                name: template.name.trim(),
                teacher: template.teacher.trim(),
                day_of_week: template.day,
                period_slot: period,
                location: template.location.trim(),
                week,
            };
            match store::insert_course(conn, &row) {
                Ok(_) => outcome.success_count += 1,
                Err(StoreError::SlotTaken) | Err(StoreError::Db(_)) => {
                    outcome.failures.push(SlotRef { week, period });
                }
            }
        }
    }
    Ok(outcome)
}
