//! Discord delivery of transition notifications.
//!
//! Candidates are the text channels of the service's guild in display
//! order; the notifier stops at the first channel that accepts the message.

use async_trait::async_trait;
use downdetector::monitoring::{Destination, NotificationTransport};
use downdetector::{NotifyError, Service};
use serde::{Deserialize, Serialize};

/// Discord channel type for guild text channels
const GUILD_TEXT: u8 = 0;

#[derive(Debug, Deserialize)]
struct Channel {
    id: String,
    #[serde(rename = "type")]
    kind: u8,
    #[serde(default)]
    position: i64,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Serialize)]
struct CreateMessage<'a> {
    content: &'a str,
}

/// Notification transport backed by the Discord REST API
pub struct DiscordTransport {
    client: reqwest::Client,
    api_base: String,
    token: String,
}

impl DiscordTransport {
    pub fn new(api_base: &str, token: &str) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("DiscordBot (downdetector, ", env!("CARGO_PKG_VERSION"), ")"))
            .timeout(std::time::Duration::from_secs(10))
            .build()?;

        Ok(Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            token: token.to_string(),
        })
    }

    fn authorization(&self) -> String {
        format!("Bot {}", self.token)
    }
}

#[async_trait]
impl NotificationTransport for DiscordTransport {
    async fn destinations(&self, service: &Service) -> Result<Vec<Destination>, NotifyError> {
        let Some(guild_id) = service.group() else {
            return Ok(Vec::new());
        };

        let response = self
            .client
            .get(format!("{}/guilds/{}/channels", self.api_base, guild_id))
            .header(reqwest::header::AUTHORIZATION, self.authorization())
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| NotifyError::Lookup(e.into()))?;

        let channels: Vec<Channel> = response.json().await.map_err(|e| NotifyError::Lookup(e.into()))?;
        Ok(text_channels_in_order(channels))
    }

    async fn deliver(&self, destination: &Destination, message: &str) -> Result<(), NotifyError> {
        self.client
            .post(format!("{}/channels/{}/messages", self.api_base, destination.id))
            .header(reqwest::header::AUTHORIZATION, self.authorization())
            .json(&CreateMessage { content: message })
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| NotifyError::Delivery(e.into()))?;
        Ok(())
    }
}

fn text_channels_in_order(channels: Vec<Channel>) -> Vec<Destination> {
    let mut text: Vec<Channel> = channels.into_iter().filter(|c| c.kind == GUILD_TEXT).collect();
    // Snowflake ids are numeric strings; compare numerically to break ties
    text.sort_by_key(|c| (c.position, c.id.parse::<u64>().unwrap_or(u64::MAX)));

    text.into_iter()
        .map(|c| Destination {
            label: c.name.map(|n| format!("#{}", n)).unwrap_or_else(|| c.id.clone()),
            id: c.id,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use downdetector::ServiceStatus;
    use downdetector::monitoring::{Notifier, TransitionEvent};
    use std::sync::Arc;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn service(guild_id: Option<u64>) -> Service {
        Service {
            id: 1,
            owner_id: "42".to_string(),
            guild_id,
            name: "api".to_string(),
            url: "https://api.test".to_string(),
            status: ServiceStatus::Online,
            created_at: Utc::now(),
        }
    }

    fn event(guild_id: Option<u64>) -> TransitionEvent {
        TransitionEvent {
            service: service(guild_id),
            previous: ServiceStatus::Online,
            current: ServiceStatus::Down,
            latency_ms: 5000,
            observed_at: Utc::now(),
        }
    }

    async fn mount_channels(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/guilds/77/channels"))
            .and(header("authorization", "Bot secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                { "id": "30", "type": 0, "position": 2, "name": "general" },
                { "id": "10", "type": 2, "position": 0, "name": "voice" },
                { "id": "20", "type": 0, "position": 1, "name": "rules" },
                { "id": "40", "type": 4, "position": 0, "name": "category" }
            ])))
            .mount(server)
            .await;
    }

    #[test]
    fn test_text_channels_sorted_by_position_then_id() {
        let channels = vec![
            Channel { id: "300".into(), kind: 0, position: 1, name: None },
            Channel { id: "20".into(), kind: 0, position: 1, name: Some("b".into()) },
            Channel { id: "5".into(), kind: 2, position: 0, name: None },
            Channel { id: "1".into(), kind: 0, position: 0, name: Some("a".into()) },
        ];
        let ids: Vec<String> = text_channels_in_order(channels).into_iter().map(|d| d.id).collect();
        assert_eq!(ids, vec!["1", "20", "300"]);
    }

    #[tokio::test]
    async fn test_ungrouped_service_has_no_destinations() {
        let transport = DiscordTransport::new("http://127.0.0.1:9", "secret").unwrap();
        assert!(transport.destinations(&service(None)).await.unwrap().is_empty());
        assert!(transport.destinations(&service(Some(0))).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_falls_through_to_first_accepting_channel() {
        let server = MockServer::start().await;
        mount_channels(&server).await;
        Mock::given(method("POST"))
            .and(path("/channels/20/messages"))
            .respond_with(ResponseTemplate::new(403))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/channels/30/messages"))
            .and(body_partial_json(serde_json::json!({
                "content": "🔴 **api** is now **DOWN** (online → down, 5000 ms)"
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let transport = Arc::new(DiscordTransport::new(&server.uri(), "secret").unwrap());
        let delivered = Notifier::new(transport).notify(&event(Some(77))).await.unwrap();
        assert_eq!(delivered.id, "30");
        assert_eq!(delivered.label, "#general");
    }

    #[tokio::test]
    async fn test_every_channel_refusing_is_reported() {
        let server = MockServer::start().await;
        mount_channels(&server).await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(403))
            .expect(2)
            .mount(&server)
            .await;

        let transport = Arc::new(DiscordTransport::new(&server.uri(), "secret").unwrap());
        let result = Notifier::new(transport).notify(&event(Some(77))).await;
        assert!(matches!(result, Err(NotifyError::AllDestinationsRejected { attempted: 2 })));
    }

    #[tokio::test]
    async fn test_unknown_guild_is_a_lookup_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET")).respond_with(ResponseTemplate::new(404)).mount(&server).await;

        let transport = DiscordTransport::new(&server.uri(), "secret").unwrap();
        let result = transport.destinations(&service(Some(5))).await;
        assert!(matches!(result, Err(NotifyError::Lookup(_))));
    }
}
