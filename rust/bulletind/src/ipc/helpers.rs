use rusqlite::Connection;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use std::str::FromStr;
use uuid::Uuid;

use crate::calc::CalcError;
use crate::ipc::error::err;
use crate::ipc::types::{AppState, Request};

pub fn db_conn<'a>(state: &'a AppState, req: &Request) -> Result<&'a Connection, Value> {
    state
        .conn()
        .ok_or_else(|| err(&req.id, "no_workspace", "select a workspace first", None))
}

pub fn required_str(req: &Request, key: &str) -> Result<String, Value> {
    let v = req
        .param(key)
        .and_then(|v| v.as_str())
        .map(|v| v.trim().to_string())
        .ok_or_else(|| err(&req.id, "bad_params", format!("missing {}", key), None))?;
    if v.is_empty() {
        return Err(err(
            &req.id,
            "bad_params",
            format!("{} must not be empty", key),
            None,
        ));
    }
    Ok(v)
}

pub fn optional_str(req: &Request, key: &str) -> Result<Option<String>, Value> {
    match req.param(key) {
        None => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.trim().to_string())),
        Some(_) => Err(err(
            &req.id,
            "bad_params",
            format!("{} must be a string", key),
            None,
        )),
    }
}

/// Explicit `id` from the request, or a fresh v4 uuid.
pub fn given_or_new_id(req: &Request) -> Result<String, Value> {
    Ok(optional_str(req, "id")?
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| Uuid::new_v4().to_string()))
}

/// Accepts JSON numbers and numeric strings. Numbers go through their
/// shortest textual form so `13.3` stays `13.3`.
pub fn decimal_from_value(v: &Value) -> Option<Decimal> {
    let text = match v {
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.trim().to_string(),
        _ => return None,
    };
    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .ok()
}

fn decimal_param(req: &Request, key: &str, v: &Value) -> Result<Decimal, Value> {
    decimal_from_value(v).ok_or_else(|| {
        err(
            &req.id,
            "bad_params",
            format!("{} must be a number", key),
            Some(json!({ key: v })),
        )
    })
}

pub fn required_decimal(req: &Request, key: &str) -> Result<Decimal, Value> {
    match req.param(key) {
        None => Err(err(&req.id, "bad_params", format!("missing {}", key), None)),
        Some(v) => decimal_param(req, key, v),
    }
}

pub fn optional_decimal(req: &Request, key: &str) -> Result<Option<Decimal>, Value> {
    match req.param(key) {
        None => Ok(None),
        Some(v) => decimal_param(req, key, v).map(Some),
    }
}

pub fn optional_i64(req: &Request, key: &str) -> Result<Option<i64>, Value> {
    match req.param(key) {
        None => Ok(None),
        Some(v) => v.as_i64().map(Some).ok_or_else(|| {
            err(
                &req.id,
                "bad_params",
                format!("{} must be an integer", key),
                None,
            )
        }),
    }
}

pub fn optional_bool(req: &Request, key: &str) -> Result<Option<bool>, Value> {
    match req.param(key) {
        None => Ok(None),
        Some(v) => v.as_bool().map(Some).ok_or_else(|| {
            err(
                &req.id,
                "bad_params",
                format!("{} must be boolean", key),
                None,
            )
        }),
    }
}

pub fn calc_err(req: &Request, e: CalcError) -> Value {
    err(&req.id, e.code(), e.to_string(), e.details())
}
