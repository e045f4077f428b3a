//! HTTP server for the txpool-watch query API.

use crate::apis::{self, ApiError};
use axum::{
	extract::{Path, Query, State},
	response::Json,
	routing::get,
	Router,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use txwatch_config::ApiConfig;
use txwatch_core::MonitorEngine;
use txwatch_types::{ClientId, InclusionReport, StoredTransaction, TxDiff};

/// Shared application state for the API server.
#[derive(Clone)]
pub struct AppState {
	pub engine: Arc<MonitorEngine>,
}

pub fn router(engine: Arc<MonitorEngine>) -> Router {
	Router::new()
		.nest(
			"/api",
			Router::new()
				.route("/tx", get(handle_query_txs))
				.route("/tx/{hash}", get(handle_get_tx))
				.route("/tx/{hash}/clients", get(handle_get_tx_clients))
				.route("/tx/{hash}/clients/{client}", get(handle_get_tx_client))
				.route("/inclusion", get(handle_list_reports))
				.route("/inclusion/{slot}", get(handle_latest_report)),
		)
		.layer(ServiceBuilder::new().layer(CorsLayer::permissive()))
		.with_state(AppState { engine })
}

/// Serves the API until the listener fails.
pub async fn start_server(
	api_config: ApiConfig,
	engine: Arc<MonitorEngine>,
) -> Result<(), Box<dyn std::error::Error>> {
	let app = router(engine);

	let bind_address = format!("{}:{}", api_config.host, api_config.port);
	let listener = TcpListener::bind(&bind_address).await?;

	tracing::info!(address = %bind_address, "API server starting");

	axum::serve(listener, app).await?;

	Ok(())
}

async fn handle_get_tx(
	Path(hash): Path<String>,
	State(state): State<AppState>,
) -> Result<Json<TxDiff>, ApiError> {
	apis::tx::get_tx_diff(&hash, &state.engine)
		.await
		.map(Json)
		.inspect_err(|e| tracing::debug!(tx_hash = %hash, error = %e, "Diff request failed"))
}

async fn handle_get_tx_clients(
	Path(hash): Path<String>,
	State(state): State<AppState>,
) -> Result<Json<BTreeMap<ClientId, StoredTransaction>>, ApiError> {
	apis::tx::get_tx_clients(&hash, &state.engine)
		.await
		.map(Json)
		.inspect_err(|e| tracing::debug!(tx_hash = %hash, error = %e, "Record request failed"))
}

async fn handle_get_tx_client(
	Path((hash, client)): Path<(String, String)>,
	State(state): State<AppState>,
) -> Result<Json<StoredTransaction>, ApiError> {
	apis::tx::get_tx_client(&hash, &client, &state.engine)
		.await
		.map(Json)
		.inspect_err(|e| {
			tracing::debug!(tx_hash = %hash, client = %client, error = %e, "Record request failed")
		})
}

async fn handle_query_txs(
	Query(params): Query<apis::tx::TxQueryParams>,
	State(state): State<AppState>,
) -> Result<Json<apis::tx::TxQueryResponse>, ApiError> {
	apis::tx::query_txs(&params, &state.engine).await.map(Json)
}

async fn handle_list_reports(
	State(state): State<AppState>,
) -> Result<Json<Vec<InclusionReport>>, ApiError> {
	apis::inclusion::list_reports(&state.engine).await.map(Json)
}

async fn handle_latest_report(
	Path(slot): Path<String>,
	State(state): State<AppState>,
) -> Result<Json<InclusionReport>, ApiError> {
	apis::inclusion::latest_report(&slot, &state.engine)
		.await
		.map(Json)
		.inspect_err(|e| tracing::debug!(slot = %slot, error = %e, "Report request failed"))
}
