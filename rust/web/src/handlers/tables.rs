use crate::errors::IntoErrorResponse;
use crate::tables::{ActionReceipt, TableError, TableId, TableManager};
use continental_engine::engine::TableView;
use continental_engine::meld::MeldStrategy;
use continental_engine::player::{PlayerAction, PlayerId};
use continental_engine::rules::{DrawPilePolicy, EngineConfig, MAX_PLAYERS};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use warp::http::StatusCode;
use warp::reply::{self, Response};
use warp::Reply;

/// Per-table overrides of the server's engine defaults.
#[derive(Debug, Default, Deserialize)]
pub struct CreateTableRequest {
    pub seed: Option<u64>,
    pub draw_pile: Option<String>,
    pub strategy: Option<String>,
    pub capacity: Option<usize>,
}

impl CreateTableRequest {
    fn into_config(self, defaults: &EngineConfig) -> Result<EngineConfig, TableError> {
        let mut config = defaults.clone();
        if let Some(seed) = self.seed {
            config.seed = Some(seed);
        }
        if let Some(raw) = self.draw_pile {
            config.draw_pile = DrawPilePolicy::parse(raw.trim())
                .ok_or_else(|| TableError::InvalidConfig(format!("unknown draw pile policy '{raw}'")))?;
        }
        if let Some(raw) = self.strategy {
            config.strategy = MeldStrategy::parse(raw.trim())
                .ok_or_else(|| TableError::InvalidConfig(format!("unknown meld strategy '{raw}'")))?;
        }
        if let Some(capacity) = self.capacity {
            if capacity == 0 || capacity > MAX_PLAYERS {
                return Err(TableError::InvalidConfig(format!(
                    "capacity must be between 1 and {MAX_PLAYERS}"
                )));
            }
            config.capacity = capacity;
        }
        Ok(config)
    }
}

#[derive(Debug, Serialize)]
pub struct TableResponse {
    pub table_id: TableId,
    pub config: EngineConfig,
    pub state: TableView,
}

#[derive(Debug, Default, Deserialize)]
pub struct JoinRequest {
    pub player_id: Option<PlayerId>,
}

#[derive(Debug, Serialize)]
pub struct JoinResponse {
    pub table_id: TableId,
    pub player_id: PlayerId,
    pub state: TableView,
}

#[derive(Debug, Serialize)]
pub struct ActionResponse {
    #[serde(flatten)]
    pub receipt: ActionReceipt,
    pub state: TableView,
}

#[derive(Debug, Default, Deserialize)]
pub struct ViewQuery {
    /// Seated player whose hand should be included
    pub player_id: Option<PlayerId>,
}

/// `POST /api/tables`: opens a table and returns its id, effective config and
/// initial (lobby) view.
pub async fn create_table(tables: Arc<TableManager>, request: CreateTableRequest) -> Response {
    let result = request
        .into_config(tables.defaults())
        .and_then(|config| tables.create_table(config))
        .and_then(|table_id| assemble_table(&tables, table_id, None));
    match result {
        Ok(body) => success_response(StatusCode::CREATED, body),
        Err(err) => table_error(err),
    }
}

/// `GET /api/tables`
pub async fn list_tables(tables: Arc<TableManager>) -> Response {
    match tables.summaries() {
        Ok(summaries) => success_response(StatusCode::OK, summaries),
        Err(err) => table_error(err),
    }
}

/// `GET /api/tables/{id}`, optionally `?player_id=` to include that
/// player's hand.
pub async fn get_table(tables: Arc<TableManager>, table_id: TableId, query: ViewQuery) -> Response {
    match assemble_table(&tables, table_id, query.player_id.as_deref()) {
        Ok(body) => success_response(StatusCode::OK, body),
        Err(err) => table_error(err),
    }
}

pub async fn delete_table(tables: Arc<TableManager>, table_id: TableId) -> Response {
    match tables.delete_table(&table_id) {
        Ok(()) => no_content(),
        Err(err) => table_error(err),
    }
}

/// `POST /api/tables/{id}/players`: connects a player. 409 once the table is
/// full or the id is taken.
pub async fn join_table(tables: Arc<TableManager>, table_id: TableId, request: JoinRequest) -> Response {
    let result = tables.join(&table_id, request.player_id).and_then(|player_id| {
        let state = tables.view(&table_id, Some(player_id.as_str()))?;
        Ok(JoinResponse {
            table_id: table_id.clone(),
            player_id,
            state,
        })
    });
    match result {
        Ok(body) => success_response(StatusCode::CREATED, body),
        Err(err) => table_error(err),
    }
}

/// `DELETE /api/tables/{id}/players/{pid}`: disconnects a player.
pub async fn leave_table(tables: Arc<TableManager>, table_id: TableId, player_id: PlayerId) -> Response {
    match tables.leave(&table_id, &player_id) {
        Ok(()) => no_content(),
        Err(err) => table_error(err),
    }
}

/// `POST /api/tables/{id}/players/{pid}/actions` with a tagged action body,
/// e.g. `{"type":"discardCard","card":{"suit":"hearts","rank":"7"}}`.
pub async fn submit_action(
    tables: Arc<TableManager>,
    table_id: TableId,
    player_id: PlayerId,
    action: PlayerAction,
) -> Response {
    let result = tables.act(&table_id, &player_id, action).and_then(|receipt| {
        let state = tables.view(&table_id, Some(player_id.as_str()))?;
        Ok(ActionResponse { receipt, state })
    });
    match result {
        Ok(body) => success_response(StatusCode::OK, body),
        Err(err) => table_error(err),
    }
}

fn assemble_table(
    tables: &TableManager,
    table_id: TableId,
    viewer: Option<&str>,
) -> Result<TableResponse, TableError> {
    let table = tables.get_table(&table_id)?;
    Ok(TableResponse {
        config: table.config()?,
        state: table.view(viewer)?,
        table_id,
    })
}

fn success_response<T>(status: StatusCode, body: T) -> Response
where
    T: Serialize,
{
    reply::with_status(reply::json(&body), status).into_response()
}

fn no_content() -> Response {
    reply::with_status(reply::reply(), StatusCode::NO_CONTENT).into_response()
}

fn table_error(err: TableError) -> Response {
    err.into_http_response()
}
