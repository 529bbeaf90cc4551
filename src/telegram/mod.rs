//! telegram bot api client
//!
//! Only the two methods the bridge needs are implemented: `getMe` to check the
//! token on startup and `sendMessage` to deliver rendered alerts.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;
use url::Url;

pub use self::settings::BotSettings;
use self::metrics::BotMetrics;

pub mod settings;

mod metrics;

/// Error occuring when a bot api request fails
#[derive(Error, Debug)]
pub enum SendError {
	/// the request couldn't be sent or the response couldn't be read
	#[error("bot api request failed: {0}")]
	Http(#[from] reqwest::Error),
	/// the bot api refused the request
	#[error("bot api returned {status}: {description}")]
	Api {
		/// http status of the response
		status: StatusCode,
		/// error description returned by the bot api
		description: String,
	},
}

impl SendError {
	/// short label for metrics
	pub fn reason(&self) -> &'static str {
		match self {
			SendError::Http(err) if err.is_timeout() => "timeout",
			SendError::Http(_) => "http",
			SendError::Api { .. } => "api",
		}
	}
}

/// Something that can deliver a text message into a chat.
#[async_trait]
pub trait MessageSender: Send + Sync {
	/// Sends `text` to the chat `chat_id`.
	async fn send_message(&self, chat_id: i64, text: &str) -> Result<(), SendError>;
}

/// envelope of every bot api response
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
	ok: bool,
	#[serde(default)]
	description: Option<String>,
	result: Option<T>,
}

/// the bot's own account as returned by `getMe`
#[derive(Debug, Clone, Deserialize)]
pub struct User {
	pub id: i64,
	pub first_name: String,
	#[serde(default)]
	pub username: Option<String>,
}

/// the part of a sent message we care about
#[derive(Debug, Deserialize)]
struct Message {
	message_id: i64,
}

#[derive(Debug, Serialize)]
struct SendMessage<'a> {
	chat_id: i64,
	text: &'a str,
}

#[derive(Debug, Clone)]
/// telegram bot api client
pub struct Bot {
	/// http client
	client: reqwest::Client,
	/// `<api_url>/bot<token>`, method names are appended to it
	base: Url,
	/// prometheus meters for sent messages
	metrics: &'static BotMetrics,
}

impl Bot {
	/// construct bot api client. Doesn't talk to the api yet, use
	/// [Bot::get_me] to check the token.
	pub fn new(settings: &BotSettings) -> Result<Self> {
		let token = settings.bot_token.trim();
		if token.is_empty() {
			bail!("bot token is empty");
		}
		if token.contains('/') {
			bail!("bot token must not contain '/'");
		}

		let mut base = settings.api_url.clone();
		base.path_segments_mut()
			.map_err(|_| anyhow::anyhow!("api url {} can't be used as base url", settings.api_url))?
			.pop_if_empty()
			.push(&format!("bot{token}"));

		let client = reqwest::Client::builder()
			.timeout(settings.api_timeout)
			.build()
			.context("failed to build reqwest client")?;

		let metrics = BotMetrics::global().context("failed to register prometheus meters")?;

		Ok(Self { client, base, metrics })
	}

	/// url of the bot api method `method`
	fn method_url(&self, method: &str) -> Url {
		let mut url = self.base.clone();
		if let Ok(mut segments) = url.path_segments_mut() {
			segments.push(method);
		}
		url
	}

	/// calls bot api method `method` with a json body
	async fn call<T: DeserializeOwned>(
		&self,
		method: &str,
		body: &impl Serialize,
	) -> Result<T, SendError> {
		let response = self.client.post(self.method_url(method)).json(body).send().await?;

		let status = response.status();
		let bytes = response.bytes().await?;

		match serde_json::from_slice::<ApiResponse<T>>(&bytes) {
			Ok(ApiResponse { ok: true, result: Some(result), .. }) if status.is_success() => {
				Ok(result)
			}
			Ok(ApiResponse { description, .. }) => Err(SendError::Api {
				status,
				description: description.unwrap_or_else(|| status.to_string()),
			}),
			Err(_) => Err(SendError::Api {
				status,
				description: String::from_utf8_lossy(&bytes).into_owned(),
			}),
		}
	}

	/// returns the bot's account, fails if the token is invalid
	pub async fn get_me(&self) -> Result<User, SendError> {
		self.call("getMe", &serde_json::json!({})).await
	}
}

#[async_trait]
impl MessageSender for Bot {
	async fn send_message(&self, chat_id: i64, text: &str) -> Result<(), SendError> {
		match self.call::<Message>("sendMessage", &SendMessage { chat_id, text }).await {
			Ok(message) => {
				self.metrics.record_message_send();
				tracing::debug!(chat_id, message_id = message.message_id, "message sent");
				Ok(())
			}
			Err(err) => {
				self.metrics.record_message_send_error(err.reason());
				Err(err)
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use std::time::Duration;

	use httptest::{
		all_of,
		matchers::{eq, json_decoded, request},
		responders::{json_encoded, status_code},
		Expectation, Server,
	};
	use serde_json::json;

	use super::*;

	fn settings(server: &Server) -> BotSettings {
		BotSettings {
			bot_token: String::from("123456:ABC-DEF"),
			chat_id: -100200300,
			api_url: Url::parse(&server.url_str("/")).unwrap(),
			api_timeout: Duration::from_secs(5),
			negate_chat_id: false,
		}
	}

	#[tokio::test]
	async fn send_message_posts_chat_and_text() {
		let server = Server::run();
		server.expect(
			Expectation::matching(all_of![
				request::method_path("POST", "/bot123456:ABC-DEF/sendMessage"),
				request::body(json_decoded(eq(json!({
					"chat_id": -100200300,
					"text": "Status: firing\nStarted: 2023-05-04 10:11:12"
				})))),
			])
			.respond_with(json_encoded(json!({ "ok": true, "result": { "message_id": 7 } }))),
		);

		let bot = Bot::new(&settings(&server)).unwrap();
		bot.send_message(-100200300, "Status: firing\nStarted: 2023-05-04 10:11:12")
			.await
			.unwrap();
	}

	#[tokio::test]
	async fn api_error_carries_description() {
		let server = Server::run();
		server.expect(
			Expectation::matching(request::method_path("POST", "/bot123456:ABC-DEF/sendMessage"))
				.respond_with(status_code(400).body(
					r#"{"ok":false,"error_code":400,"description":"Bad Request: chat not found"}"#,
				)),
		);

		let bot = Bot::new(&settings(&server)).unwrap();
		let err = bot.send_message(42, "hello").await.unwrap_err();

		match err {
			SendError::Api { status, description } => {
				assert_eq!(status, StatusCode::BAD_REQUEST);
				assert_eq!(description, "Bad Request: chat not found");
			}
			other => panic!("unexpected error: {other:?}"),
		}
	}

	#[tokio::test]
	async fn non_json_error_body_is_kept() {
		let server = Server::run();
		server.expect(
			Expectation::matching(request::method_path("POST", "/bot123456:ABC-DEF/sendMessage"))
				.respond_with(status_code(502).body("bad gateway")),
		);

		let bot = Bot::new(&settings(&server)).unwrap();
		let err = bot.send_message(42, "hello").await.unwrap_err();

		assert_eq!(err.reason(), "api");
		assert!(err.to_string().contains("bad gateway"));
	}

	#[tokio::test]
	async fn get_me_returns_bot_account() {
		let server = Server::run();
		server.expect(
			Expectation::matching(request::method_path("POST", "/bot123456:ABC-DEF/getMe"))
				.respond_with(json_encoded(json!({
					"ok": true,
					"result": { "id": 123456, "is_bot": true, "first_name": "alerts", "username": "alerts_bot" }
				}))),
		);

		let bot = Bot::new(&settings(&server)).unwrap();
		let me = bot.get_me().await.unwrap();

		assert_eq!(me.id, 123456);
		assert_eq!(me.username.as_deref(), Some("alerts_bot"));
	}

	#[tokio::test]
	async fn unauthorized_token_fails_get_me() {
		let server = Server::run();
		server.expect(
			Expectation::matching(request::method_path("POST", "/bot123456:ABC-DEF/getMe"))
				.respond_with(status_code(401).body(
					r#"{"ok":false,"error_code":401,"description":"Unauthorized"}"#,
				)),
		);

		let bot = Bot::new(&settings(&server)).unwrap();
		assert!(bot.get_me().await.is_err());
	}

	#[test]
	fn empty_token_is_rejected() {
		let server = Server::run();
		let mut settings = settings(&server);
		settings.bot_token = String::from("  ");

		assert!(Bot::new(&settings).is_err());
	}

	#[test]
	fn api_url_path_prefix_is_kept() {
		let server = Server::run();
		let mut settings = settings(&server);
		settings.api_url = Url::parse("http://proxy.internal/telegram").unwrap();

		let bot = Bot::new(&settings).unwrap();
		assert_eq!(
			bot.method_url("sendMessage").as_str(),
			"http://proxy.internal/telegram/bot123456:ABC-DEF/sendMessage"
		);
	}
}
