use crate::ipc::error::{err, ok};
use crate::ipc::handlers::courses::{course_json, session_conn};
use crate::ipc::helpers::param_week;
use crate::ipc::types::{AppState, Request};
use crate::schedule::{PeriodSlot, Weekday};
use crate::store;
use serde_json::json;

/// View-model for one week of the timetable: period rows by weekday
/// columns, each cell the course occupying that slot or null. The frontend
/// renders this directly and keeps no schedule state of its own.
fn handle_week_grid(state: &mut AppState, req: &Request) -> serde_json::Value {
    let (user, conn) = match session_conn(state, req) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let Some(week) = param_week(req, "week") else {
        return err(&req.id, "bad_params", "missing week", None);
    };

    let courses = match store::courses_for_week(conn, &user.id, week) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let mut cells: Vec<Vec<serde_json::Value>> =
        vec![vec![serde_json::Value::Null; Weekday::ALL.len()]; PeriodSlot::ALL.len()];
    for course in &courses {
        let row = PeriodSlot::ALL
            .iter()
            .position(|p| *p == course.period_slot)
            .unwrap_or(0);
        let col = Weekday::ALL
            .iter()
            .position(|d| *d == course.day_of_week)
            .unwrap_or(0);
        cells[row][col] = course_json(course);
    }

    ok(
        &req.id,
        json!({
            "week": week,
            "days": Weekday::ALL.iter().map(|d| d.as_str()).collect::<Vec<_>>(),
            "periods": PeriodSlot::ALL.iter().map(|p| p.as_str()).collect::<Vec<_>>(),
            "cells": cells,
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "schedule.weekGrid" => Some(handle_week_grid(state, req)),
        _ => None,
    }
}
