use crate::tables::TableManager;
use serde::Serialize;
use std::sync::Arc;
use warp::reply::Json;

#[derive(Serialize)]
struct HealthBody {
    status: &'static str,
    tables: usize,
}

pub fn health(tables: &Arc<TableManager>) -> Json {
    warp::reply::json(&HealthBody {
        status: "ok",
        tables: tables.active_tables().len(),
    })
}
