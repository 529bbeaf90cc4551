//! Here we expose prometheus metrics about tg-alert
use anyhow::{Context, Result};
use axum::{
	body::Body,
	http::{header::CONTENT_TYPE, Response, StatusCode},
	routing::get,
	Router,
};
use prometheus::{Encoder, TextEncoder};
use serde::Deserialize;
use tokio::net::TcpListener;

use crate::alertmanager_webhook_receiver::bind_address;

#[derive(Debug, Deserialize, Clone)]
pub struct TelemetryEndpointSettings {
	/// `host:port` or `:port`
	pub listen: String,
}

async fn metrics_handler() -> Response<Body> {
	let mut buffer = vec![];
	let encoder = TextEncoder::new();
	let metric_families = prometheus::gather();

	let response = match encoder.encode(&metric_families, &mut buffer) {
		Ok(()) => Response::builder()
			.status(StatusCode::OK)
			.header(CONTENT_TYPE, encoder.format_type())
			.body(Body::from(buffer)),
		Err(err) => {
			tracing::error!("failed to encode metrics: {err}");
			Response::builder().status(StatusCode::INTERNAL_SERVER_ERROR).body(Body::empty())
		}
	};

	response.unwrap_or_else(|_| Response::new(Body::empty()))
}

pub fn router() -> Router {
	Router::new().route("/metrics", get(metrics_handler))
}

pub async fn run_telemetry_endpoint(settings: TelemetryEndpointSettings) -> Result<()> {
	let addr = bind_address(&settings.listen);
	let listener = TcpListener::bind(&addr)
		.await
		.context(format!("failed to bind telemetry endpoint to {addr}"))?;

	tracing::info!("serving metrics on http://{addr}/metrics");

	axum::serve(listener, router()).await.context("telemetry endpoint crashed")?;

	Ok(())
}
