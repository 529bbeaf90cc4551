//! prometheus alertmanager receiver that forwards alerts into a telegram chat
//!
//! Features:
//! - one plain text message per alert, sent in the order alertmanager lists them
//! - a failing message doesn't keep the other alerts of a notification from being sent
//! - optional prometheus endpoint exposing sent and failed messages

use std::sync::Arc;

use anyhow::{Context, Result};
use settings::Settings;
use telegram::Bot;

use crate::alertmanager_webhook_receiver::ReceiverState;

mod alert;
mod alert_renderer;
mod alertmanager_webhook_receiver;
mod log;
mod settings;
mod telegram;
mod telemetry_endpoint;

/// exit the complete program if one thread panics
fn setup_panic_handler() {
	let default_panic = std::panic::take_hook();
	std::panic::set_hook(Box::new(move |info| {
		default_panic(info);
		std::process::exit(1);
	}));
}

/// the entry point of the program
#[tokio::main]
pub async fn main() -> Result<()> {
	setup_panic_handler();

	let settings = Settings::load().context("failed to load config and command line arguments")?;

	log::setup_logging(&settings.log).context("could not setup logging")?;

	let bot = Bot::new(&settings.bot).context("failed to construct telegram bot")?;

	let me = bot.get_me().await.context("bot api didn't accept the bot token")?;
	tracing::info!(
		"bot {} ({}) logged in",
		me.username.as_deref().unwrap_or(me.first_name.as_str()),
		me.id
	);

	if let Some(telemetry) = settings.telemetry_endpoint.clone() {
		tokio::spawn(async move {
			#[allow(clippy::expect_used)]
			telemetry_endpoint::run_telemetry_endpoint(telemetry)
				.await
				.expect("telemetry endpoint failed to start or crashed");
		});
	}

	let state = ReceiverState::new(Arc::new(bot), settings.bot.destination())
		.context("failed to construct alertmanager receiver")?;

	alertmanager_webhook_receiver::run_prometheus_receiver(&settings.alert_webhook_receiver, state)
		.await
}
