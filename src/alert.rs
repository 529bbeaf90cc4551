//! data structures for deserializing incoming alerts
use std::collections::HashMap;

use chrono::{DateTime, FixedOffset, NaiveDate};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use serde_with::{serde_as, DefaultOnNull};

#[serde_as]
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
/// data from prometheus received by the alertmanager webhook receiver
#[allow(clippy::missing_docs_in_private_items)]
pub struct Data {
	#[serde_as(as = "DefaultOnNull")]
	pub version: String,
	#[serde_as(as = "DefaultOnNull")]
	pub group_key: String,

	#[serde_as(as = "DefaultOnNull")]
	pub receiver: String,
	#[serde_as(as = "DefaultOnNull")]
	pub status: String,
	#[serde_as(as = "DefaultOnNull")]
	pub alerts: Vec<Alert>,
	#[serde_as(as = "DefaultOnNull")]
	pub group_labels: HashMap<String, String>,
	#[serde_as(as = "DefaultOnNull")]
	pub common_labels: HashMap<String, String>,
	#[serde_as(as = "DefaultOnNull")]
	pub common_annotations: HashMap<String, String>,
	#[serde_as(as = "DefaultOnNull")]
	#[serde(rename = "externalURL")]
	pub external_url: String,

	/// fields newer alertmanager versions send (e.g. `truncatedAlerts`), kept
	/// so they are echoed back unchanged
	#[serde(flatten)]
	pub extra: Map<String, Value>,
}

#[serde_as]
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
#[allow(clippy::missing_docs_in_private_items)]
pub struct Alert {
	#[serde_as(as = "DefaultOnNull")]
	pub status: String,
	#[serde_as(as = "DefaultOnNull")]
	pub labels: HashMap<String, String>,
	#[serde_as(as = "DefaultOnNull")]
	pub annotations: HashMap<String, String>,
	#[serde(with = "rfc3339")]
	pub starts_at: DateTime<FixedOffset>,
	#[serde(with = "rfc3339")]
	pub ends_at: DateTime<FixedOffset>,
	#[serde_as(as = "DefaultOnNull")]
	#[serde(rename = "generatorURL")]
	pub generator_url: String,
	#[serde_as(as = "DefaultOnNull")]
	pub fingerprint: String,

	#[serde(flatten)]
	pub extra: Map<String, Value>,
}

impl Alert {
	/// value of label `key`, empty if the alert doesn't carry it
	pub fn label(&self, key: &str) -> &str {
		self.labels.get(key).map_or("", String::as_str)
	}

	/// value of annotation `key`, empty if the alert doesn't carry it
	pub fn annotation(&self, key: &str) -> &str {
		self.annotations.get(key).map_or("", String::as_str)
	}
}

impl Default for Alert {
	fn default() -> Self {
		Self {
			status: String::new(),
			labels: HashMap::new(),
			annotations: HashMap::new(),
			starts_at: zero_time(),
			ends_at: zero_time(),
			generator_url: String::new(),
			fingerprint: String::new(),
			extra: Map::new(),
		}
	}
}

/// `0001-01-01T00:00:00Z`, what alertmanager sends as `endsAt` of alerts that
/// are still firing
pub fn zero_time() -> DateTime<FixedOffset> {
	NaiveDate::from_ymd_opt(1, 1, 1)
		.and_then(|date| date.and_hms_opt(0, 0, 0))
		.unwrap_or_default()
		.and_utc()
		.fixed_offset()
}

/// (de)serializes timestamps as RFC 3339 while keeping their offset. UTC is
/// written as `Z` like alertmanager does, `null` reads as [zero_time].
mod rfc3339 {
	use chrono::{DateTime, FixedOffset, SecondsFormat};
	use serde::{Deserialize, Deserializer, Serializer};

	pub fn serialize<S: Serializer>(
		timestamp: &DateTime<FixedOffset>,
		serializer: S,
	) -> Result<S::Ok, S::Error> {
		serializer.serialize_str(&timestamp.to_rfc3339_opts(SecondsFormat::AutoSi, true))
	}

	pub fn deserialize<'de, D: Deserializer<'de>>(
		deserializer: D,
	) -> Result<DateTime<FixedOffset>, D::Error> {
		let timestamp = Option::<DateTime<FixedOffset>>::deserialize(deserializer)?;
		Ok(timestamp.unwrap_or_else(super::zero_time))
	}
}
