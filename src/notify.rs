//! Best-effort webhook notifications for lifecycle events.
//!
//! One POST per event carrying a single embed. Delivery failures are logged
//! at warn and never reach the caller.

use reqwest::Client;
use serde::Serialize;
use tracing::{debug, instrument, warn};

use crate::platform::Candidate;

const COLOR_SUCCESS: u32 = 0x00ff00;
const COLOR_FAILURE: u32 = 0xff0000;

/// Display details of the program an event is about.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProgramSummary {
    /// Program title.
    pub title: String,
    /// Broadcaster display name.
    pub channel: String,
    /// Thumbnail image URL, empty when unknown.
    pub thumbnail_url: String,
}

impl ProgramSummary {
    /// Summarizes a search candidate.
    #[must_use]
    pub fn from_candidate(candidate: &Candidate) -> Self {
        Self {
            title: candidate.title.clone(),
            channel: candidate.provider.username.clone(),
            thumbnail_url: candidate.thumbnail_url.clone(),
        }
    }
}

/// Lifecycle events worth telling a human about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationEvent {
    /// A reservation was accepted.
    ReservationCreated(ProgramSummary),
    /// The platform rejected a reservation.
    ReservationFailed {
        /// Program that was rejected.
        program: ProgramSummary,
        /// Platform error code.
        error_code: String,
    },
    /// A replay was captured to disk.
    DownloadCompleted {
        /// Program that was recorded.
        program: ProgramSummary,
        /// Recorder relaunches before success.
        retry_count: u32,
        /// Size of the produced artifact.
        size_bytes: u64,
    },
    /// A run ended with an error nobody handled.
    UnhandledError {
        /// Error message chain.
        message: String,
    },
}

#[derive(Debug, Serialize)]
struct WebhookPayload {
    embed: Embed,
}

#[derive(Debug, Serialize)]
struct Embed {
    title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    fields: Vec<EmbedField>,
    #[serde(skip_serializing_if = "Option::is_none")]
    thumbnail: Option<Thumbnail>,
    color: u32,
}

#[derive(Debug, Serialize)]
struct EmbedField {
    name: &'static str,
    value: String,
}

#[derive(Debug, Serialize)]
struct Thumbnail {
    url: String,
}

fn program_embed(program: &ProgramSummary, title_prefix: &str, color: u32) -> Embed {
    Embed {
        title: format!("{title_prefix}: {}", program.title),
        description: None,
        fields: vec![EmbedField {
            name: "Channel",
            value: program.channel.clone(),
        }],
        thumbnail: (!program.thumbnail_url.is_empty()).then(|| Thumbnail {
            url: program.thumbnail_url.clone(),
        }),
        color,
    }
}

fn build_payload(event: &NotificationEvent) -> WebhookPayload {
    let embed = match event {
        NotificationEvent::ReservationCreated(program) => {
            program_embed(program, "Reservation created", COLOR_SUCCESS)
        }
        NotificationEvent::ReservationFailed {
            program,
            error_code,
        } => {
            let mut embed = program_embed(program, "Reservation failed", COLOR_FAILURE);
            embed.description = Some(error_code.clone());
            embed
        }
        NotificationEvent::DownloadCompleted {
            program,
            retry_count,
            size_bytes,
        } => {
            let mut embed = program_embed(program, "Download completed", COLOR_SUCCESS);
            embed.fields.push(EmbedField {
                name: "Retries",
                value: retry_count.to_string(),
            });
            embed.fields.push(EmbedField {
                name: "Size",
                value: format!("{size_bytes} bytes"),
            });
            embed
        }
        NotificationEvent::UnhandledError { message } => Embed {
            title: "Error".to_string(),
            description: Some(message.clone()),
            fields: Vec::new(),
            thumbnail: None,
            color: COLOR_FAILURE,
        },
    };
    WebhookPayload { embed }
}

/// Webhook notifier; a disabled notifier drops every event.
#[derive(Debug, Clone)]
pub struct Notifier {
    target: Option<(String, Client)>,
}

impl Notifier {
    /// Creates a notifier that sends nothing.
    #[must_use]
    pub fn disabled() -> Self {
        Self { target: None }
    }

    /// Creates a notifier posting to `url` with the shared client.
    #[must_use]
    pub fn webhook(url: impl Into<String>, client: Client) -> Self {
        Self {
            target: Some((url.into(), client)),
        }
    }

    /// Returns true when events are delivered somewhere.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.target.is_some()
    }

    /// Delivers `event`; failures are logged and swallowed.
    #[instrument(skip_all)]
    pub async fn send(&self, event: &NotificationEvent) {
        let Some((url, client)) = &self.target else {
            return;
        };
        let payload = build_payload(event);
        match client.post(url.as_str()).json(&payload).send().await {
            Ok(response) if response.status().is_success() => {
                debug!(title = %payload.embed.title, "Notification delivered");
            }
            Ok(response) => {
                warn!(
                    status = response.status().as_u16(),
                    title = %payload.embed.title,
                    "Notification webhook rejected event"
                );
            }
            Err(error) => {
                warn!(error = %error, title = %payload.embed.title, "Notification delivery failed");
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::{Value, json};

    use super::*;

    fn program() -> ProgramSummary {
        ProgramSummary {
            title: "Evening talk".to_string(),
            channel: "Channel One".to_string(),
            thumbnail_url: "https://img.example/t.jpg".to_string(),
        }
    }

    fn payload_json(event: &NotificationEvent) -> Value {
        serde_json::to_value(build_payload(event)).unwrap()
    }

    #[test]
    fn test_reservation_created_payload() {
        let json = payload_json(&NotificationEvent::ReservationCreated(program()));
        assert_eq!(
            json,
            json!({
                "embed": {
                    "title": "Reservation created: Evening talk",
                    "fields": [{"name": "Channel", "value": "Channel One"}],
                    "thumbnail": {"url": "https://img.example/t.jpg"},
                    "color": 0x00ff00
                }
            })
        );
    }

    #[test]
    fn test_reservation_failed_carries_error_code() {
        let json = payload_json(&NotificationEvent::ReservationFailed {
            program: program(),
            error_code: "RESERVATION_LIMIT".to_string(),
        });
        assert_eq!(json["embed"]["description"], "RESERVATION_LIMIT");
        assert_eq!(json["embed"]["color"], 0xff0000);
    }

    #[test]
    fn test_download_completed_reports_retries_and_size() {
        let json = payload_json(&NotificationEvent::DownloadCompleted {
            program: program(),
            retry_count: 2,
            size_bytes: 1024,
        });
        let fields = json["embed"]["fields"].as_array().unwrap();
        assert_eq!(fields.len(), 3);
        assert_eq!(fields[1]["value"], "2");
        assert_eq!(fields[2]["value"], "1024 bytes");
    }

    #[test]
    fn test_unhandled_error_has_no_fields_or_thumbnail() {
        let json = payload_json(&NotificationEvent::UnhandledError {
            message: "boom".to_string(),
        });
        assert_eq!(
            json,
            json!({"embed": {"title": "Error", "description": "boom", "color": 0xff0000}})
        );
    }

    #[test]
    fn test_missing_thumbnail_is_omitted() {
        let mut summary = program();
        summary.thumbnail_url.clear();
        let json = payload_json(&NotificationEvent::ReservationCreated(summary));
        assert!(json["embed"].get("thumbnail").is_none());
    }

    #[tokio::test]
    async fn test_disabled_notifier_sends_nothing() {
        let notifier = Notifier::disabled();
        assert!(!notifier.is_enabled());
        notifier
            .send(&NotificationEvent::UnhandledError {
                message: "ignored".to_string(),
            })
            .await;
    }
}
