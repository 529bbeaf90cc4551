//! config file options for the telegram bot

use std::time::Duration;

use serde::Deserialize;
use serde_with::{formats::Flexible, serde_as, DurationSeconds};
use url::Url;

#[serde_as]
#[derive(Debug, Deserialize, Clone)]
/// credentials and destination of the bot
pub struct BotSettings {
	/// token handed out by the BotFather
	pub bot_token: String,
	/// chat the alerts are sent to
	pub chat_id: i64,
	/// base url of the bot api
	#[serde(default = "default_api_url")]
	pub api_url: Url,
	/// timeout of a single bot api request
	#[serde_as(as = "DurationSeconds<f64, Flexible>")]
	#[serde(default = "default_api_timeout")]
	pub api_timeout: Duration,
	/// send to `-chat_id` instead of `chat_id`, for configs that store group
	/// ids without their sign
	#[serde(default)]
	pub negate_chat_id: bool,
}

impl BotSettings {
	/// the chat id as the bot api expects it
	pub fn destination(&self) -> i64 {
		if self.negate_chat_id {
			-self.chat_id
		} else {
			self.chat_id
		}
	}
}

#[allow(clippy::expect_used)]
fn default_api_url() -> Url {
	Url::parse("https://api.telegram.org").expect("default api url is valid")
}

fn default_api_timeout() -> Duration {
	Duration::from_secs(10)
}
