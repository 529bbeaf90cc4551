use std::str::FromStr;

use anyhow::{bail, Context, Result};
use clap::{builder::PossibleValuesParser, Arg, ArgMatches, Command};
use config::Config;
use serde::Deserialize;
use thiserror::Error;

use crate::{
	alertmanager_webhook_receiver::AlertReceiverSettings, log::LogSettings,
	telegram::BotSettings, telemetry_endpoint::TelemetryEndpointSettings,
};

/// settings that are syntactically fine but can't be used
#[derive(Error, Debug, PartialEq, Eq)]
pub enum SettingsError {
	#[error("bot_token must not be empty")]
	EmptyBotToken,
	#[error("listen must not be empty")]
	EmptyListen,
	#[error("web_path must start with '/', got {0:?}")]
	InvalidWebPath(String),
	#[error("unknown log level {0:?}")]
	InvalidLogLevel(String),
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
	#[serde(flatten)]
	pub bot: BotSettings,
	#[serde(flatten)]
	pub alert_webhook_receiver: AlertReceiverSettings,
	#[serde(default)]
	pub log: LogSettings,
	#[serde(default)]
	pub telemetry_endpoint: Option<TelemetryEndpointSettings>,
}

/// command line interface
pub fn command() -> Command {
	Command::new(clap::crate_name!())
		.version(clap::crate_version!())
		.about(clap::crate_description!())
		.author(clap::crate_authors!())
		.args([
			Arg::new("config")
				.help("path of config file (yaml, toml or json)")
				.short('c')
				.long("config")
				.value_name("FILE")
				.required(true),
			Arg::new("level")
				.help("log level")
				.value_parser(PossibleValuesParser::new(["error", "warn", "info", "debug", "trace"]))
				.ignore_case(true)
				.long("log"),
		])
}

impl Settings {
	/// parses the command line and loads the config file it points to. Exits
	/// the process if the command line is invalid.
	pub fn load() -> Result<Self> {
		let opts = command().get_matches();
		Self::from_matches(&opts)
	}

	fn from_matches(opts: &ArgMatches) -> Result<Self> {
		let config_path = match opts.get_one::<String>("config") {
			Some(path) if !path.is_empty() => path,
			_ => bail!("arg '-c <config-file>' required"),
		};

		let conf = Config::builder()
			.add_source(config::File::with_name(config_path))
			.build()
			.context(format!("can't load config {config_path}"))?;

		let mut settings = Self::from_config(conf)?;

		if let Some(level) = opts.get_one::<String>("level") {
			settings.log.level = level.to_string();
		}

		settings.validate()?;

		Ok(settings)
	}

	/// deserializes settings, fails if a required key is missing
	pub fn from_config(conf: Config) -> Result<Self> {
		conf.try_deserialize().context("can't load config")
	}

	/// checks the values serde can't check for us
	pub fn validate(&self) -> Result<(), SettingsError> {
		if self.bot.bot_token.trim().is_empty() {
			return Err(SettingsError::EmptyBotToken);
		}

		let receiver = &self.alert_webhook_receiver;
		if receiver.listen.trim().is_empty() {
			return Err(SettingsError::EmptyListen);
		}
		if !receiver.web_path.starts_with('/') {
			return Err(SettingsError::InvalidWebPath(receiver.web_path.clone()));
		}

		if tracing::Level::from_str(&self.log.level).is_err() {
			return Err(SettingsError::InvalidLogLevel(self.log.level.clone()));
		}

		Ok(())
	}
}
