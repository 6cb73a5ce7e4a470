use crate::backup;
use crate::csvfile;
use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::handlers::courses::{session_conn, slots_json};
use crate::ipc::helpers::param_str;
use crate::ipc::types::{AppState, Request};
use crate::schedule::{self, CourseTemplate, ScheduleError};
use crate::store;
use serde_json::json;
use std::path::PathBuf;

fn handle_export_csv(state: &mut AppState, req: &Request) -> serde_json::Value {
    let (user, conn) = match session_conn(state, req) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let Some(path) = param_str(req, "path").map(PathBuf::from) else {
        return err(&req.id, "bad_params", "missing path", None);
    };

    let courses = match store::courses_for_owner(conn, &user.id) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    match csvfile::write_courses(&path, &courses) {
        Ok(exported) => ok(
            &req.id,
            json!({ "path": path.to_string_lossy(), "exported": exported }),
        ),
        Err(e) => err(&req.id, "export_failed", format!("{e:#}"), None),
    }
}

/// Import rows through the scheduling engine one slot at a time, so the
/// slot-uniqueness invariant holds for file data exactly as it does for
/// dialog input. Rows that collide with existing courses are reported and
/// skipped, never half-applied.
fn handle_import_csv(state: &mut AppState, req: &Request) -> serde_json::Value {
    let (user, conn) = match session_conn(state, req) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let Some(path) = param_str(req, "path").map(PathBuf::from) else {
        return err(&req.id, "bad_params", "missing path", None);
    };

    let (rows, skipped_malformed) = match csvfile::read_courses(&path) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "import_failed", format!("{e:#}"), None),
    };

    let mut imported = 0usize;
    let mut conflicts = Vec::new();
    let mut failures = Vec::new();
    for row in rows {
        let template = CourseTemplate {
            name: row.name,
            teacher: row.teacher,
            day: row.day,
            location: row.location,
        };
        match schedule::propose_schedule(conn, &user.id, &template, &[row.week], &[row.period]) {
            Ok(outcome) => {
                imported += outcome.success_count;
                failures.extend(outcome.failures);
            }
            Err(ScheduleError::Conflict(slots)) => conflicts.extend(slots),
            // Parsed rows are well-formed; a validation miss here means the
            // file slipped past the parser and the row is just dropped.
            Err(ScheduleError::Validation(_)) => {}
            Err(ScheduleError::Store(e)) => {
                return err(&req.id, "db_query_failed", e.to_string(), None)
            }
        }
    }

    ok(
        &req.id,
        json!({
            "imported": imported,
            "skippedMalformed": skipped_malformed,
            "conflicts": slots_json(&conflicts),
            "failures": slots_json(&failures),
        }),
    )
}

fn handle_export_bundle(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(workspace) = state.workspace.clone() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(out_path) = param_str(req, "outPath").map(PathBuf::from) else {
        return err(&req.id, "bad_params", "missing outPath", None);
    };

    match backup::export_workspace_bundle(&workspace, &out_path) {
        Ok(summary) => ok(
            &req.id,
            json!({
                "outPath": out_path.to_string_lossy(),
                "bundleFormat": summary.bundle_format,
                "dbSha256": summary.db_sha256,
            }),
        ),
        Err(e) => err(&req.id, "export_failed", format!("{e:#}"), None),
    }
}

/// Replacing the database file out from under an open connection is not an
/// option, so the import closes the workspace, swaps the file, and reopens.
/// The session is dropped with the old database; users log in again against
/// the restored one.
fn handle_import_bundle(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(workspace) = state.workspace.clone() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(bundle_path) = param_str(req, "bundlePath").map(PathBuf::from) else {
        return err(&req.id, "bad_params", "missing bundlePath", None);
    };

    state.db = None;
    state.session = None;

    let imported = backup::import_workspace_bundle(&bundle_path, &workspace);
    let reopened = db::open_db(&workspace);
    match reopened {
        Ok(conn) => state.db = Some(conn),
        Err(e) => return err(&req.id, "db_open_failed", format!("{e:?}"), None),
    }

    match imported {
        Ok(summary) => ok(
            &req.id,
            json!({
                "workspacePath": workspace.to_string_lossy(),
                "dbSha256": summary.db_sha256,
            }),
        ),
        Err(e) => err(&req.id, "import_failed", format!("{e:#}"), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "courses.exportCsv" => Some(handle_export_csv(state, req)),
        "courses.importCsv" => Some(handle_import_csv(state, req)),
        "workspace.exportBundle" => Some(handle_export_bundle(state, req)),
        "workspace.importBundle" => Some(handle_import_bundle(state, req)),
        _ => None,
    }
}
