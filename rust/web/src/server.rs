use crate::events::EventBus;
use crate::handlers;
use crate::ledger::open_ledger;
use crate::settings::{AppSettings, SettingsError};
use crate::tables::TableManager;
use continental_engine::ledger::{LedgerError, MemoryLedger, ScoreLedger};
use continental_engine::player::PlayerAction;
use continental_engine::rules::EngineConfig;
use std::convert::Infallible;
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use warp::filters::BoxedFilter;
use warp::reply::Reply;
use warp::Filter;

const MAX_BODY_BYTES: u64 = 16 * 1024;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    host: String,
    port: u16,
}

impl ServerConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn for_tests() -> Self {
        Self::new("127.0.0.1", 0)
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

impl From<&AppSettings> for ServerConfig {
    fn from(settings: &AppSettings) -> Self {
        Self::new(settings.host.clone(), settings.port)
    }
}

/// Shared components handed to every route.
#[derive(Clone)]
pub struct AppContext {
    config: ServerConfig,
    event_bus: Arc<EventBus>,
    tables: Arc<TableManager>,
    ledger: Arc<dyn ScoreLedger>,
}

impl std::fmt::Debug for AppContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppContext")
            .field("config", &self.config)
            .field("tables", &self.tables)
            .finish_non_exhaustive()
    }
}

impl AppContext {
    pub fn from_settings(settings: &AppSettings) -> Result<Self, ServerError> {
        let ledger = open_ledger(settings)?;
        Ok(Self::new_with_dependencies(
            ServerConfig::from(settings),
            ledger,
            settings.engine_config(),
        ))
    }

    pub fn new_with_dependencies(
        config: ServerConfig,
        ledger: Arc<dyn ScoreLedger>,
        defaults: EngineConfig,
    ) -> Self {
        let event_bus = Arc::new(EventBus::new());
        let tables = Arc::new(TableManager::with_ledger(
            Arc::clone(&event_bus),
            Arc::clone(&ledger),
            defaults,
        ));
        Self {
            config,
            event_bus,
            tables,
            ledger,
        }
    }

    /// Port 0, in-memory ledger, OS-seeded tables.
    pub fn new_for_tests() -> Self {
        Self::new_with_dependencies(
            ServerConfig::for_tests(),
            Arc::new(MemoryLedger::new()),
            EngineConfig::default(),
        )
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn event_bus(&self) -> Arc<EventBus> {
        Arc::clone(&self.event_bus)
    }

    pub fn tables(&self) -> Arc<TableManager> {
        Arc::clone(&self.tables)
    }

    pub fn ledger(&self) -> Arc<dyn ScoreLedger> {
        Arc::clone(&self.ledger)
    }
}

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Failed to bind to address: {0}")]
    BindError(#[from] std::io::Error),
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("Settings error: {0}")]
    Settings(#[from] SettingsError),
    #[error("Score ledger error: {0}")]
    Ledger(#[from] LedgerError),
}

#[derive(Debug, Clone)]
pub struct WebServer {
    context: AppContext,
}

impl WebServer {
    pub fn new(settings: &AppSettings) -> Result<Self, ServerError> {
        let context = AppContext::from_settings(settings)?;
        Ok(Self { context })
    }

    pub fn from_context(context: AppContext) -> Self {
        Self { context }
    }

    pub fn context(&self) -> &AppContext {
        &self.context
    }

    pub async fn start(self) -> Result<ServerHandle, ServerError> {
        let WebServer { context } = self;
        let config = context.config().clone();
        let bind_addr = Self::bind_addr(&config)?;

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let routes = Self::routes(&context);
        let shutdown_signal = async move {
            let _ = shutdown_rx.await;
        };

        let (addr, server_future) = warp::serve(routes)
            .try_bind_with_graceful_shutdown(bind_addr, shutdown_signal)
            .map_err(Self::map_warp_error)?;

        tracing::info!(%addr, "web server listening");

        let task = tokio::spawn(async move {
            server_future.await;
            Ok(())
        });

        Ok(ServerHandle::new(addr, shutdown_tx, task, context))
    }

    fn bind_addr(config: &ServerConfig) -> Result<SocketAddr, ServerError> {
        let host = config.host();

        if let Ok(addr) = host.parse::<SocketAddr>() {
            return Ok(addr);
        }

        if let Ok(ip) = host.parse::<std::net::IpAddr>() {
            return Ok(SocketAddr::new(ip, config.port()));
        }

        let candidate = format!("{}:{}", host, config.port());
        let mut addrs = candidate.to_socket_addrs().map_err(|err| {
            ServerError::ConfigError(format!("failed to resolve address `{candidate}`: {err}"))
        })?;

        addrs.next().ok_or_else(|| {
            ServerError::ConfigError(format!("failed to resolve address `{candidate}`"))
        })
    }

    fn map_warp_error(err: warp::Error) -> ServerError {
        use std::error::Error as StdError;

        if let Some(source) = err.source() {
            if let Some(io_err) = source.downcast_ref::<std::io::Error>() {
                let recreated = std::io::Error::new(io_err.kind(), io_err.to_string());
                return ServerError::BindError(recreated);
            }
        }

        ServerError::ConfigError(err.to_string())
    }

    fn routes(context: &AppContext) -> BoxedFilter<(warp::reply::Response,)> {
        let health = Self::health_route(context);
        let table_routes = Self::table_routes(context);
        let player_routes = Self::player_routes(context);
        let sse_routes = Self::sse_routes(context);

        health
            .or(table_routes)
            .unify()
            .or(player_routes)
            .unify()
            .or(sse_routes)
            .unify()
            .with(warp::log::custom(|info| {
                tracing::debug!(
                    method = %info.method(),
                    path = info.path(),
                    status = info.status().as_u16(),
                    elapsed_ms = info.elapsed().as_millis() as u64,
                    "request served"
                );
            }))
            .map(warp::Reply::into_response)
            .boxed()
    }

    fn health_route(context: &AppContext) -> BoxedFilter<(warp::reply::Response,)> {
        warp::path("health")
            .and(warp::get())
            .and(warp::path::end())
            .and(Self::with_tables(context.tables()))
            .map(|tables: Arc<TableManager>| handlers::health(&tables).into_response())
            .boxed()
    }

    fn table_routes(context: &AppContext) -> BoxedFilter<(warp::reply::Response,)> {
        let tables = context.tables();

        let list = warp::path!("api" / "tables")
            .and(warp::get())
            .and(Self::with_tables(tables.clone()))
            .and_then(|tables: Arc<TableManager>| async move {
                let response = handlers::list_tables(tables).await;
                Ok::<_, Infallible>(response)
            });

        let create = warp::path!("api" / "tables")
            .and(warp::post())
            .and(Self::with_tables(tables.clone()))
            .and(Self::json_body())
            .and_then(
                |tables: Arc<TableManager>, request: handlers::CreateTableRequest| async move {
                    let response = handlers::create_table(tables, request).await;
                    Ok::<_, Infallible>(response)
                },
            );

        let info = warp::path!("api" / "tables" / String)
            .and(warp::get())
            .and(warp::query::<handlers::ViewQuery>())
            .and(Self::with_tables(tables.clone()))
            .and_then(
                |table_id: String, query: handlers::ViewQuery, tables: Arc<TableManager>| async move {
                    let response = handlers::get_table(tables, table_id, query).await;
                    Ok::<_, Infallible>(response)
                },
            );

        let delete = warp::path!("api" / "tables" / String)
            .and(warp::delete())
            .and(Self::with_tables(tables))
            .and_then(|table_id: String, tables: Arc<TableManager>| async move {
                let response = handlers::delete_table(tables, table_id).await;
                Ok::<_, Infallible>(response)
            });

        list.or(create)
            .unify()
            .or(info)
            .unify()
            .or(delete)
            .unify()
            .boxed()
    }

    fn player_routes(context: &AppContext) -> BoxedFilter<(warp::reply::Response,)> {
        let tables = context.tables();

        let join = warp::path!("api" / "tables" / String / "players")
            .and(warp::post())
            .and(Self::with_tables(tables.clone()))
            .and(Self::json_body())
            .and_then(
                |table_id: String, tables: Arc<TableManager>, request: handlers::JoinRequest| async move {
                    let response = handlers::join_table(tables, table_id, request).await;
                    Ok::<_, Infallible>(response)
                },
            );

        let leave = warp::path!("api" / "tables" / String / "players" / String)
            .and(warp::delete())
            .and(Self::with_tables(tables.clone()))
            .and_then(
                |table_id: String, player_id: String, tables: Arc<TableManager>| async move {
                    let response = handlers::leave_table(tables, table_id, player_id).await;
                    Ok::<_, Infallible>(response)
                },
            );

        let actions = warp::path!("api" / "tables" / String / "players" / String / "actions")
            .and(warp::post())
            .and(Self::with_tables(tables))
            .and(Self::json_body())
            .and_then(
                |table_id: String,
                 player_id: String,
                 tables: Arc<TableManager>,
                 action: PlayerAction| async move {
                    let response =
                        handlers::submit_action(tables, table_id, player_id, action).await;
                    Ok::<_, Infallible>(response)
                },
            );

        join.or(leave)
            .unify()
            .or(actions)
            .unify()
            .boxed()
    }

    fn sse_routes(context: &AppContext) -> BoxedFilter<(warp::reply::Response,)> {
        let tables = context.tables();
        let event_bus = context.event_bus();

        warp::path!("api" / "tables" / String / "players" / String / "events")
            .and(warp::get())
            .and(Self::with_tables(tables))
            .and(Self::with_event_bus(event_bus))
            .and_then(
                |table_id: String,
                 player_id: String,
                 tables: Arc<TableManager>,
                 event_bus: Arc<EventBus>| async move {
                    let response =
                        handlers::stream_events(table_id, player_id, tables, event_bus).await;
                    Ok::<_, Infallible>(response)
                },
            )
            .boxed()
    }

    fn json_body<T>() -> impl Filter<Extract = (T,), Error = warp::Rejection> + Clone
    where
        T: serde::de::DeserializeOwned + Send,
    {
        warp::body::content_length_limit(MAX_BODY_BYTES).and(warp::body::json())
    }

    fn with_tables(
        tables: Arc<TableManager>,
    ) -> impl Filter<Extract = (Arc<TableManager>,), Error = Infallible> + Clone {
        warp::any().map(move || Arc::clone(&tables))
    }

    fn with_event_bus(
        event_bus: Arc<EventBus>,
    ) -> impl Filter<Extract = (Arc<EventBus>,), Error = Infallible> + Clone {
        warp::any().map(move || Arc::clone(&event_bus))
    }
}

#[derive(Debug)]
pub struct ServerHandle {
    addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<Result<(), ServerError>>>,
    context: AppContext,
}

impl ServerHandle {
    fn new(
        addr: SocketAddr,
        shutdown: oneshot::Sender<()>,
        task: JoinHandle<Result<(), ServerError>>,
        context: AppContext,
    ) -> Self {
        Self {
            addr,
            shutdown: Some(shutdown),
            task: Some(task),
            context,
        }
    }

    pub fn address(&self) -> SocketAddr {
        self.addr
    }

    pub fn context(&self) -> &AppContext {
        &self.context
    }

    pub async fn shutdown(mut self) -> Result<(), ServerError> {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }

        if let Some(task) = self.task.take() {
            match task.await {
                Ok(result) => result?,
                Err(err) => {
                    return Err(ServerError::ConfigError(format!(
                        "server task join error: {err}"
                    )))
                }
            }
        }

        self.context.tables().flush_ledger().await;
        tracing::info!(addr = %self.addr, "web server stopped");
        Ok(())
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }

        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
