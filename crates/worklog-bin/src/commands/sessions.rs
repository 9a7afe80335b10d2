//! Work-session commands.

use super::Context;
use anyhow::Result;
use serde_json::json;
use worklog_sessions::{
    handle_get, handle_list, handle_start, handle_stop, ApiResponse, SqliteSessionStore, WorkLog,
};

fn open_worklog(ctx: &Context) -> Result<WorkLog<SqliteSessionStore>> {
    let store = SqliteSessionStore::open(&ctx.config.session_store_path)?;
    Ok(WorkLog::new(store))
}

pub fn start(
    ctx: &Context,
    person_name: &str,
    process_id: &str,
    process_name: Option<&str>,
) -> Result<ApiResponse> {
    let body = json!({
        "person_name": person_name,
        "process_id": process_id,
        "process_name": process_name,
    });
    Ok(handle_start(&open_worklog(ctx)?, &body.to_string()))
}

pub fn stop(ctx: &Context, id: &str) -> Result<ApiResponse> {
    let body = json!({ "id": id });
    Ok(handle_stop(&open_worklog(ctx)?, &body.to_string()))
}

pub fn get(ctx: &Context, id: &str) -> Result<ApiResponse> {
    Ok(handle_get(&open_worklog(ctx)?, id))
}

pub fn list(ctx: &Context, status: Option<&str>) -> Result<ApiResponse> {
    Ok(handle_list(&open_worklog(ctx)?, status))
}
