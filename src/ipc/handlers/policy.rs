use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers;
use crate::ipc::types::{AppState, Request};
use serde_json::json;

fn handle_policy_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match helpers::require_db(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let class_id = match helpers::require_str(req, "classId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    if let Err(e) = helpers::require_class(conn, req, &class_id) {
        return e;
    }
    let policy = match db::load_policy(conn, &class_id) {
        Ok(p) => p.unwrap_or_default(),
        Err(e) => return err(&req.id, "db_query_failed", format!("{e:?}"), None),
    };
    match serde_json::to_value(policy) {
        Ok(v) => ok(&req.id, json!({ "policy": v })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

/// Patch and persist the class policy. Validation failures are fatal here,
/// at configuration time, so the engine never sees a bad policy.
fn handle_policy_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match helpers::require_db(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let class_id = match helpers::require_str(req, "classId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    if let Err(e) = helpers::require_class(conn, req, &class_id) {
        return e;
    }
    let Some(patch) = req.params.get("patch").and_then(|v| v.as_object()) else {
        return err(&req.id, "bad_params", "missing params.patch", None);
    };

    let mut policy = match db::load_policy(conn, &class_id) {
        Ok(p) => p.unwrap_or_default(),
        Err(e) => return err(&req.id, "db_query_failed", format!("{e:?}"), None),
    };
    for (key, value) in patch {
        let Some(n) = value.as_i64() else {
            return err(
                &req.id,
                "bad_params",
                format!("patch.{} must be an integer", key),
                None,
            );
        };
        match key.as_str() {
            "passThreshold" => policy.pass_threshold = n,
            "maxTotalDecisionPoints" => policy.max_total_decision_points = n,
            "maxSubjectsEligibleForDecision" => policy.max_subjects_eligible_for_decision = n,
            "pointsPerSubjectCap" => policy.points_per_subject_cap = n,
            _ => {
                return err(
                    &req.id,
                    "bad_params",
                    format!("unknown policy field: {}", key),
                    None,
                )
            }
        }
    }

    if let Err(msg) = policy.validate() {
        return err(&req.id, "bad_config", msg, None);
    }
    if let Err(e) = db::save_policy(conn, &class_id, &policy) {
        return err(&req.id, "db_insert_failed", format!("{e:?}"), None);
    }
    match serde_json::to_value(policy) {
        Ok(v) => ok(&req.id, json!({ "policy": v })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "policy.get" => Some(handle_policy_get(state, req)),
        "policy.update" => Some(handle_policy_update(state, req)),
        _ => None,
    }
}
