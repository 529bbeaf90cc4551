//! Receives alert notifications from the prometheus alertmanager webhook
//! receiver and forwards every alert as a message to the telegram chat.
use std::{future::Future, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use axum::{
	body::Bytes,
	extract::{DefaultBodyLimit, Json, State},
	http::{Request, StatusCode},
	response::{IntoResponse, Response},
	routing::post,
	Router,
};
use hyper::{body::Incoming, server::conn::http1, service::service_fn};
use hyper_util::rt::{TokioIo, TokioTimer};
use once_cell::sync::OnceCell;
use prometheus::IntCounter;
use serde::Deserialize;
use tokio::net::TcpListener;
use tower::ServiceExt;
use tower_http::timeout::TimeoutLayer;

use crate::{
	alert::{self, Alert},
	alert_renderer,
	telegram::MessageSender,
};

/// time a client gets to send the request headers
pub const READ_TIMEOUT: Duration = Duration::from_secs(10);
/// time until the response has to be written
pub const WRITE_TIMEOUT: Duration = Duration::from_secs(10);
/// maximum size of the request headers
pub const MAX_HEADER_BYTES: usize = 1 << 20;
/// pause after a failed `accept`, e.g. when running out of file descriptors
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

#[derive(Debug, Deserialize, Clone)]
pub struct AlertReceiverSettings {
	/// `host:port` or `:port`
	pub listen: String,
	/// url path alertmanager posts to
	pub web_path: String,
}

/// turns a listen address into something we can bind to. `:port` binds all
/// interfaces.
pub fn bind_address(listen: &str) -> String {
	let listen = listen.trim();
	if listen.starts_with(':') {
		format!("0.0.0.0{listen}")
	} else {
		listen.to_owned()
	}
}

static METRICS: OnceCell<ReceiverMetrics> = OnceCell::new();

#[derive(Debug)]
struct ReceiverMetrics {
	/// total number of deserialized alerts
	received_alerts: IntCounter,
	/// request bodies that weren't an alertmanager notification
	rejected_payloads: IntCounter,
}

impl ReceiverMetrics {
	fn global() -> Result<&'static Self, prometheus::Error> {
		use prometheus::{opts, register_int_counter};

		METRICS.get_or_try_init(|| {
			let received_alerts = register_int_counter!(opts!(
				"received_alerts_total",
				"total number of deserialized alerts"
			)
			.namespace("tg_alert")
			.subsystem("alertmanager_webhook"))?;

			let rejected_payloads = register_int_counter!(opts!(
				"rejected_payloads_total",
				"number of requests with an undecodable body"
			)
			.namespace("tg_alert")
			.subsystem("alertmanager_webhook"))?;

			Ok(Self { received_alerts, rejected_payloads })
		})
	}
}

/// outcome of forwarding the alerts of one notification
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchReport {
	pub sent: usize,
	pub failed: usize,
}

pub struct ReceiverState {
	sender: Arc<dyn MessageSender>,
	chat_id: i64,
	metrics: &'static ReceiverMetrics,
}

impl ReceiverState {
	pub fn new(sender: Arc<dyn MessageSender>, chat_id: i64) -> Result<Self> {
		let metrics = ReceiverMetrics::global().context("failed to register prometheus meters")?;

		Ok(Self { sender, chat_id, metrics })
	}

	/// Sends one message per alert, in order. A failed message is logged and
	/// doesn't stop the remaining ones.
	pub async fn dispatch(&self, alerts: &[Alert]) -> DispatchReport {
		let mut report = DispatchReport::default();

		for alert in alerts {
			self.metrics.received_alerts.inc();

			let message = alert_renderer::render(alert);

			match self.sender.send_message(self.chat_id, &message).await {
				Ok(()) => report.sent += 1,
				Err(err) => {
					tracing::warn!("unable to send message {message:?}: {err}");
					report.failed += 1;
				}
			}
		}

		report
	}
}

async fn prometheus_receiver(
	State(state): State<Arc<ReceiverState>>,
	body: Bytes,
) -> Response {
	// alertmanager always sends json, the content type isn't checked
	let data = match serde_json::from_slice::<alert::Data>(&body) {
		Ok(data) => data,
		Err(err) => {
			state.metrics.rejected_payloads.inc();
			tracing::debug!("failed to deserialize alert: {:?}", err);
			return (StatusCode::BAD_REQUEST, format!("invalid alertmanager notification: {err}"))
				.into_response();
		}
	};

	// detached so the server's write timeout can't cancel the remaining sends
	let task = tokio::spawn(async move {
		let report = state.dispatch(&data.alerts).await;
		(data, report)
	});

	match task.await {
		Ok((data, report)) => {
			tracing::info!(
				receiver = %data.receiver,
				status = %data.status,
				alerts = data.alerts.len(),
				sent = report.sent,
				failed = report.failed,
				"forwarded alertmanager notification"
			);
			tracing::debug!("{data:?}");

			(StatusCode::OK, Json(data)).into_response()
		}
		Err(err) => {
			tracing::error!("alert dispatch failed: {err}");
			StatusCode::INTERNAL_SERVER_ERROR.into_response()
		}
	}
}

/// the webhook route, mounted at `web_path`
#[allow(deprecated)]
pub fn router(web_path: &str, state: Arc<ReceiverState>) -> Router {
	Router::new()
		.route(web_path, post(prometheus_receiver))
		// alertmanager puts the whole group into one notification unless max_alerts is set
		.layer(DefaultBodyLimit::disable())
		.layer(TimeoutLayer::new(WRITE_TIMEOUT))
		.with_state(state)
}

/// Retries `accept` until it yields a connection, pausing after each error.
async fn next_connection<T, E, F>(mut accept: impl FnMut() -> F) -> T
where
	E: std::fmt::Display,
	F: Future<Output = Result<T, E>>,
{
	loop {
		match accept().await {
			Ok(connection) => return connection,
			Err(err) => {
				tracing::error!("failed to accept connection: {err}");
				tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
			}
		}
	}
}

/// Serves `app` on `listener`, one task per connection, with the header limits
/// of [READ_TIMEOUT] and [MAX_HEADER_BYTES].
pub async fn serve(listener: TcpListener, app: Router) -> Result<()> {
	loop {
		let (stream, peer) = next_connection(|| listener.accept()).await;

		let app = app.clone();
		tokio::spawn(async move {
			let io = TokioIo::new(stream);
			let service = service_fn(move |request: Request<Incoming>| app.clone().oneshot(request));

			let mut builder = http1::Builder::new();
			builder
				.timer(TokioTimer::new())
				.header_read_timeout(READ_TIMEOUT)
				.max_buf_size(MAX_HEADER_BYTES);

			if let Err(err) = builder.serve_connection(io, service).await {
				if !err.is_incomplete_message() {
					tracing::debug!(%peer, "connection error: {err}");
				}
			}
		});
	}
}

pub async fn run_prometheus_receiver(
	settings: &AlertReceiverSettings,
	state: ReceiverState,
) -> Result<()> {
	let addr = bind_address(&settings.listen);
	let app = router(&settings.web_path, Arc::new(state));

	let listener = TcpListener::bind(&addr)
		.await
		.context(format!("failed to bind alertmanager receiver to {addr}"))?;

	tracing::info!("waiting for prometheus alerts on '{addr}{}'", settings.web_path);

	serve(listener, app).await.context("prometheus endpoint crashed")
}
