//! Renders alerts into plain text telegram messages.
//!
//! Alerts are received from [alertmanager_webhook_receiver](crate::alertmanager_webhook_receiver),
//! one message is rendered per alert and handed to the [telegram](crate::telegram) sender.

use chrono::{DateTime, FixedOffset};

use crate::alert::Alert;

/// format of the `Started:`/`Resolved:` timestamps
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// formats `timestamp` in the offset it was sent with
pub fn format_timestamp(timestamp: &DateTime<FixedOffset>) -> String {
	timestamp.format(TIMESTAMP_FORMAT).to_string()
}

/// Renders a single alert.
///
/// Lines are only included if the field they show isn't empty, and always in
/// this order: status, instance, info, summary, description and finally the
/// point in time the alert started firing or got resolved. Alerts with any
/// other status get no timestamp line.
pub fn render(alert: &Alert) -> String {
	let mut lines = vec![format!("Status: {}", alert.status)];

	let name = alert.label("name");
	if !name.is_empty() {
		lines.push(format!("Instance: {}({name})", alert.label("instance")));
	}

	for (annotation, title) in [("info", "Info"), ("summary", "Summary"), ("description", "Description")]
	{
		let value = alert.annotation(annotation);
		if !value.is_empty() {
			lines.push(format!("{title}: {value}"));
		}
	}

	match alert.status.as_str() {
		"resolved" => lines.push(format!("Resolved: {}", format_timestamp(&alert.ends_at))),
		"firing" => lines.push(format!("Started: {}", format_timestamp(&alert.starts_at))),
		_ => {}
	}

	lines.join("\n")
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::*;

	fn alert(value: serde_json::Value) -> Alert {
		serde_json::from_value(value).unwrap()
	}

	#[test]
	fn firing_without_annotations() {
		let alert = alert(json!({
			"status": "firing",
			"startsAt": "2023-05-04T10:11:12Z",
			"endsAt": "0001-01-01T00:00:00Z"
		}));

		assert_eq!(render(&alert), "Status: firing\nStarted: 2023-05-04 10:11:12");
	}

	#[test]
	fn resolved_shows_end_time_only() {
		let alert = alert(json!({
			"status": "resolved",
			"annotations": { "summary": "disk full" },
			"startsAt": "2023-05-04T10:11:12Z",
			"endsAt": "2023-05-04T11:00:30Z"
		}));

		let message = render(&alert);
		assert!(message.ends_with("Resolved: 2023-05-04 11:00:30"));
		assert!(!message.contains("Started:"));
		assert_eq!(message, "Status: resolved\nSummary: disk full\nResolved: 2023-05-04 11:00:30");
	}

	#[test]
	fn instance_requires_name_label() {
		let alert = alert(json!({
			"status": "firing",
			"labels": { "instance": "10.0.0.1:9100", "name": "" },
			"startsAt": "2023-05-04T10:11:12Z"
		}));

		assert!(!render(&alert).contains("Instance:"));
	}

	#[test]
	fn all_fields_in_fixed_order() {
		let alert = alert(json!({
			"status": "firing",
			"labels": {
				"name": "node-exporter",
				"instance": "10.0.0.1:9100",
				"alertname": "HighLoad",
				"severity": "critical"
			},
			"annotations": {
				"description": "load is above 10 for 5 minutes",
				"summary": "high load",
				"info": "check the cron jobs"
			},
			"startsAt": "2023-05-04T10:11:12Z",
			"endsAt": "0001-01-01T00:00:00Z",
			"fingerprint": "c8f4e0b3a2d1e5f6"
		}));

		assert_eq!(
			render(&alert),
			"Status: firing\n\
			 Instance: 10.0.0.1:9100(node-exporter)\n\
			 Info: check the cron jobs\n\
			 Summary: high load\n\
			 Description: load is above 10 for 5 minutes\n\
			 Started: 2023-05-04 10:11:12"
		);
	}

	#[test]
	fn unknown_status_has_no_timestamp() {
		let alert = alert(json!({
			"status": "pending",
			"annotations": { "info": "warming up" },
			"startsAt": "2023-05-04T10:11:12Z"
		}));

		assert_eq!(render(&alert), "Status: pending\nInfo: warming up");
	}

	#[test]
	fn timestamp_uses_own_offset() {
		let alert = alert(json!({
			"status": "firing",
			"startsAt": "2023-05-04T10:11:12.345+02:00"
		}));

		assert_eq!(render(&alert), "Status: firing\nStarted: 2023-05-04 10:11:12");
	}

	#[test]
	fn missing_start_renders_zero_time() {
		let alert = alert(json!({ "status": "firing" }));

		assert_eq!(render(&alert), "Status: firing\nStarted: 0001-01-01 00:00:00");
	}
}
