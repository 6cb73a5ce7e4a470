use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{param_str, param_week};
use crate::ipc::types::{AppState, Request};
use crate::schedule::{self, CourseTemplate, PeriodSlot, ScheduleError, SlotRef, Weekday};
use crate::store::{self, Course};
use rusqlite::Connection;
use serde_json::json;

pub fn course_json(course: &Course) -> serde_json::Value {
    json!({
        "id": course.id,
        "name": course.name,
        "teacher": course.teacher,
        "day": course.day_of_week.as_str(),
        "period": course.period_slot.as_str(),
        "location": course.location,
        "week": course.week,
    })
}

pub fn slots_json(slots: &[SlotRef]) -> serde_json::Value {
    json!(slots
        .iter()
        .map(|s| json!({ "week": s.week, "period": s.period.as_str() }))
        .collect::<Vec<_>>())
}

/// Course methods need both an open workspace and a logged-in user.
pub fn session_conn<'a>(
    state: &'a AppState,
    req: &Request,
) -> Result<(&'a store::User, &'a Connection), serde_json::Value> {
    let Some(conn) = state.db.as_ref() else {
        return Err(err(&req.id, "no_workspace", "select a workspace first", None));
    };
    let Some(user) = state.session.as_ref() else {
        return Err(err(&req.id, "not_logged_in", "log in first", None));
    };
    Ok((user, conn))
}

fn parse_day(req: &Request) -> Result<Weekday, serde_json::Value> {
    let Some(raw) = param_str(req, "day") else {
        return Err(err(&req.id, "bad_params", "missing day", None));
    };
    Weekday::parse(&raw)
        .ok_or_else(|| err(&req.id, "bad_params", format!("unknown day label: {raw}"), None))
}

fn parse_periods(req: &Request) -> Result<Vec<PeriodSlot>, serde_json::Value> {
    let Some(items) = req.params.get("periods").and_then(|v| v.as_array()) else {
        return Err(err(&req.id, "bad_params", "missing periods", None));
    };
    let mut periods = Vec::with_capacity(items.len());
    for item in items {
        let Some(label) = item.as_str() else {
            return Err(err(&req.id, "bad_params", "periods must be labels", None));
        };
        let Some(period) = PeriodSlot::parse(label) else {
            return Err(err(
                &req.id,
                "bad_params",
                format!("unknown period label: {label}"),
                None,
            ));
        };
        periods.push(period);
    }
    Ok(periods)
}

/// The week selection is either an explicit list or the start/end range
/// shortcut, not both.
fn parse_weeks(req: &Request) -> Result<Vec<u8>, serde_json::Value> {
    let explicit = req.params.get("weeks").and_then(|v| v.as_array());
    let range = req.params.get("weekRange").and_then(|v| v.as_object());

    match (explicit, range) {
        (Some(_), Some(_)) => Err(err(
            &req.id,
            "bad_params",
            "provide weeks or weekRange, not both",
            None,
        )),
        (Some(items), None) => {
            let mut weeks = Vec::with_capacity(items.len());
            for item in items {
                let week = item.as_i64().and_then(|w| u8::try_from(w).ok());
                let Some(week) = week else {
                    return Err(err(
                        &req.id,
                        "bad_params",
                        format!(
                            "weeks must be integers in {}..={}",
                            schedule::MIN_WEEK,
                            schedule::MAX_WEEK
                        ),
                        None,
                    ));
                };
                weeks.push(week);
            }
            Ok(weeks)
        }
        (None, Some(obj)) => {
            let start = obj.get("start").and_then(|v| v.as_i64());
            let end = obj.get("end").and_then(|v| v.as_i64());
            let (Some(start), Some(end)) = (start, end) else {
                return Err(err(
                    &req.id,
                    "bad_params",
                    "weekRange needs start and end",
                    None,
                ));
            };
            let bounds = u8::try_from(start).ok().zip(u8::try_from(end).ok());
            let Some((start, end)) = bounds else {
                return Err(err(
                    &req.id,
                    "bad_params",
                    format!(
                        "week range must satisfy {} <= start <= end <= {}",
                        schedule::MIN_WEEK,
                        schedule::MAX_WEEK
                    ),
                    None,
                ));
            };
            match schedule::expand_week_range(start, end) {
                Ok(weeks) => Ok(weeks),
                Err(e) => {
                    let msg = match e {
                        ScheduleError::Validation(m) => m,
                        _ => "invalid week range".to_string(),
                    };
                    Err(err(&req.id, "bad_params", msg, None))
                }
            }
        }
        (None, None) => Err(err(
            &req.id,
            "bad_params",
            "missing weeks or weekRange",
            None,
        )),
    }
}

fn handle_courses_add(state: &mut AppState, req: &Request) -> serde_json::Value {
    let (user, conn) = match session_conn(state, req) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let Some(name) = param_str(req, "name") else {
        return err(&req.id, "bad_params", "missing name", None);
    };
    let Some(teacher) = param_str(req, "teacher") else {
        return err(&req.id, "bad_params", "missing teacher", None);
    };
    let Some(location) = param_str(req, "location") else {
        return err(&req.id, "bad_params", "missing location", None);
    };
    let day = match parse_day(req) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let periods = match parse_periods(req) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let weeks = match parse_weeks(req) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let template = CourseTemplate {
        name,
        teacher,
        day,
        location,
    };
    match schedule::propose_schedule(conn, &user.id, &template, &weeks, &periods) {
        Ok(outcome) => ok(
            &req.id,
            json!({
                "added": outcome.success_count,
                "failures": slots_json(&outcome.failures),
            }),
        ),
        Err(ScheduleError::Validation(msg)) => err(&req.id, "bad_params", msg, None),
        Err(ScheduleError::Conflict(slots)) => err(
            &req.id,
            "conflict",
            "requested time slots are already occupied",
            Some(json!({ "conflicts": slots_json(&slots) })),
        ),
        Err(ScheduleError::Store(e)) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_courses_remove(state: &mut AppState, req: &Request) -> serde_json::Value {
    let (user, conn) = match session_conn(state, req) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let Some(name) = param_str(req, "name") else {
        return err(&req.id, "bad_params", "missing name", None);
    };
    let day = match parse_day(req) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let Some(period) = param_str(req, "period").as_deref().and_then(PeriodSlot::parse) else {
        return err(&req.id, "bad_params", "missing or unknown period", None);
    };
    // Deletion always names its week; there is no single-week default.
    let Some(week) = param_week(req, "week") else {
        return err(&req.id, "bad_params", "missing week", None);
    };

    match store::delete_course_exact(conn, &user.id, &name, day, period, week) {
        Ok(rows) => ok(&req.id, json!({ "removed": rows > 0 })),
        Err(e) => err(&req.id, "db_delete_failed", e.to_string(), None),
    }
}

fn handle_courses_list_week(state: &mut AppState, req: &Request) -> serde_json::Value {
    let (user, conn) = match session_conn(state, req) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let Some(week) = param_week(req, "week") else {
        return err(&req.id, "bad_params", "missing week", None);
    };

    match store::courses_for_week(conn, &user.id, week) {
        Ok(courses) => ok(
            &req.id,
            json!({
                "week": week,
                "courses": courses.iter().map(course_json).collect::<Vec<_>>(),
            }),
        ),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "courses.add" => Some(handle_courses_add(state, req)),
        "courses.remove" => Some(handle_courses_remove(state, req)),
        "courses.listWeek" => Some(handle_courses_list_week(state, req)),
        _ => None,
    }
}
