//! prometheus meters for bot

use once_cell::sync::OnceCell;
use prometheus::{opts, register_int_counter, register_int_counter_vec, IntCounter, IntCounterVec};

static METRICS: OnceCell<BotMetrics> = OnceCell::new();

#[derive(Debug)]
/// prometheus meters for the telegram bot
pub(crate) struct BotMetrics {
	/// total number of successfully sent messages
	messages_sent: IntCounter,
	/// number of messages the bot api didn't accept
	messages_failed: IntCounterVec,
}

impl BotMetrics {
	/// meters registered in the default registry, registered on first use
	pub(crate) fn global() -> Result<&'static Self, prometheus::Error> {
		METRICS.get_or_try_init(Self::new)
	}

	/// construct prometheus meters
	fn new() -> Result<Self, prometheus::Error> {
		let messages_sent = register_int_counter!(opts!(
			"messages_sent_total",
			"total number of messages accepted by the bot api"
		)
		.namespace("tg_alert")
		.subsystem("bot"))?;

		let messages_failed = register_int_counter_vec!(
			opts!("messages_failed_total", "messages the bot failed to send")
				.namespace("tg_alert")
				.subsystem("bot"),
			&["reason"]
		)?;

		Ok(Self { messages_sent, messages_failed })
	}

	/// counts sent messages
	pub(crate) fn record_message_send(&self) {
		self.messages_sent.inc();
	}

	/// counts failed messages
	pub(crate) fn record_message_send_error(&self, reason: &str) {
		self.messages_failed.with_label_values(&[reason]).inc();
	}
}
