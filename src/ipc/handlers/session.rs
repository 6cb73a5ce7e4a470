use crate::ipc::error::{err, ok};
use crate::ipc::helpers::param_str;
use crate::ipc::types::{AppState, Request};
use crate::password;
use crate::store::{self, RegisterOutcome, User};
use serde_json::json;

const MIN_PASSWORD_CHARS: usize = 6;

fn user_json(user: &User) -> serde_json::Value {
    // The password digest stays server-side.
    json!({
        "id": user.id,
        "username": user.username,
        "displayName": user.display_name,
        "createdAt": user.created_at,
    })
}

fn handle_register(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let Some(username) = param_str(req, "username").map(|s| s.trim().to_string()) else {
        return err(&req.id, "bad_params", "missing username", None);
    };
    let Some(password) = param_str(req, "password") else {
        return err(&req.id, "bad_params", "missing password", None);
    };
    let Some(display_name) = param_str(req, "displayName").map(|s| s.trim().to_string()) else {
        return err(&req.id, "bad_params", "missing displayName", None);
    };
    if username.is_empty() || display_name.is_empty() {
        return err(&req.id, "bad_params", "all fields are required", None);
    }
    if password.chars().count() < MIN_PASSWORD_CHARS {
        return err(
            &req.id,
            "bad_params",
            format!("password must be at least {MIN_PASSWORD_CHARS} characters"),
            None,
        );
    }

    let outcome = store::create_user(
        conn,
        &username,
        &password::hash_password(&password),
        &display_name,
    );
    match outcome {
        Ok(RegisterOutcome::Created(user)) => ok(&req.id, json!({ "user": user_json(&user) })),
        Ok(RegisterOutcome::UsernameTaken) => err(
            &req.id,
            "username_taken",
            format!("username already registered: {username}"),
            None,
        ),
        Err(e) => err(&req.id, "db_insert_failed", e.to_string(), None),
    }
}

fn handle_login(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(username) = param_str(req, "username").map(|s| s.trim().to_string()) else {
        return err(&req.id, "bad_params", "missing username", None);
    };
    let Some(password) = param_str(req, "password") else {
        return err(&req.id, "bad_params", "missing password", None);
    };

    let verified = {
        let Some(conn) = state.db.as_ref() else {
            return err(&req.id, "no_workspace", "select a workspace first", None);
        };
        match store::verify_user(conn, &username, &password) {
            Ok(v) => v,
            Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
        }
    };

    match verified {
        Some(user) => {
            let resp = ok(&req.id, json!({ "user": user_json(&user) }));
            state.session = Some(user);
            resp
        }
        None => err(
            &req.id,
            "invalid_credentials",
            "unknown username or wrong password",
            None,
        ),
    }
}

fn handle_logout(state: &mut AppState, req: &Request) -> serde_json::Value {
    state.session = None;
    ok(&req.id, json!({}))
}

fn handle_current(state: &mut AppState, req: &Request) -> serde_json::Value {
    let user = state.session.as_ref().map(user_json);
    ok(&req.id, json!({ "user": user }))
}

fn handle_change_password(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(user) = state.session.clone() else {
        return err(&req.id, "not_logged_in", "log in first", None);
    };
    let Some(old_password) = param_str(req, "oldPassword") else {
        return err(&req.id, "bad_params", "missing oldPassword", None);
    };
    let Some(new_password) = param_str(req, "newPassword") else {
        return err(&req.id, "bad_params", "missing newPassword", None);
    };
    if new_password.chars().count() < MIN_PASSWORD_CHARS {
        return err(
            &req.id,
            "bad_params",
            format!("password must be at least {MIN_PASSWORD_CHARS} characters"),
            None,
        );
    }

    let changed = {
        let Some(conn) = state.db.as_ref() else {
            return err(&req.id, "no_workspace", "select a workspace first", None);
        };
        match store::update_password(conn, &user.id, &old_password, &new_password) {
            Ok(v) => v,
            Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
        }
    };

    if !changed {
        return err(
            &req.id,
            "invalid_credentials",
            "old password does not match",
            None,
        );
    }
    if let Some(session) = state.session.as_mut() {
        session.password_hash = password::hash_password(&new_password);
    }
    ok(&req.id, json!({}))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "session.register" => Some(handle_register(state, req)),
        "session.login" => Some(handle_login(state, req)),
        "session.logout" => Some(handle_logout(state, req)),
        "session.current" => Some(handle_current(state, req)),
        "session.changePassword" => Some(handle_change_password(state, req)),
        _ => None,
    }
}
