//! Google Calendar v3 adapter.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde_json::Value;
use tracing::debug;

use crate::integrations::oauth::{OAuthConfig, TokenProvider};
use crate::integrations::traits::CalendarAdapter;
use crate::storage::Config;
use crate::sync::types::{CalendarDescriptor, NewCalendarEvent, RemoteEvent, SyncError};

/// Largest page the events endpoint serves.
const PAGE_SIZE: &str = "2500";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Google Calendar API client authenticated with a refresh token.
pub struct GoogleCalendarClient {
    http: Client,
    base_url: String,
    auth: TokenProvider,
}

impl GoogleCalendarClient {
    pub fn new(http: Client, base_url: impl Into<String>, auth: TokenProvider) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            auth,
        }
    }

    /// Build a client from the configured credentials and endpoints.
    pub fn from_config(config: &Config) -> Result<Self, SyncError> {
        let http = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        let oauth = OAuthConfig {
            service_name: "google".to_string(),
            client_id: config.google.client_id.clone(),
            client_secret: config.google.client_secret.clone(),
            token_url: config.google_token_url.clone(),
        };
        let auth = TokenProvider::new(http.clone(), oauth, config.google.refresh_token.clone());
        Ok(Self::new(http, config.google_api_base_url.clone(), auth))
    }

    fn events_url(&self, calendar_id: &str) -> String {
        format!(
            "{}/calendars/{}/events",
            self.base_url,
            urlencoding::encode(calendar_id)
        )
    }

    async fn send(&self, request: RequestBuilder) -> Result<Value, SyncError> {
        let token = self.auth.access_token().await?;
        let response = request.bearer_auth(token).send().await?;
        let status = response.status();
        let text = response.text().await?;

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            self.auth.invalidate();
            return Err(SyncError::AuthenticationRequired);
        }

        let body: Value = match serde_json::from_str(&text) {
            Ok(body) => body,
            Err(_) if !status.is_success() => {
                return Err(SyncError::CalendarApi(format!("{status}: {text}")));
            }
            Err(e) => return Err(e.into()),
        };

        if let Some(error) = body.get("error") {
            let message = error["message"]
                .as_str()
                .map(str::to_string)
                .unwrap_or_else(|| error.to_string());
            return Err(SyncError::CalendarApi(format!("{status}: {message}")));
        }
        if !status.is_success() {
            return Err(SyncError::CalendarApi(format!("{status}: {text}")));
        }

        Ok(body)
    }
}

#[async_trait]
impl CalendarAdapter for GoogleCalendarClient {
    async fn primary_calendar(&self) -> Result<CalendarDescriptor, SyncError> {
        let url = format!("{}/users/me/calendarList/primary", self.base_url);
        let body = self.send(self.http.get(&url)).await?;
        Ok(serde_json::from_value(body)?)
    }

    async fn list_events(&self, calendar_id: &str) -> Result<Vec<RemoteEvent>, SyncError> {
        let url = self.events_url(calendar_id);
        let mut events = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut query = vec![("maxResults", PAGE_SIZE.to_string())];
            if let Some(token) = &page_token {
                query.push(("pageToken", token.clone()));
            }

            let mut page = self.send(self.http.get(&url).query(&query)).await?;
            let items = match page.get_mut("items").map(Value::take) {
                Some(Value::Array(items)) => items,
                Some(_) => {
                    return Err(SyncError::MalformedPayload(
                        "events page 'items' is not an array".into(),
                    ))
                }
                None => Vec::new(),
            };
            for item in items {
                events.push(RemoteEvent::from_json(item)?);
            }

            page_token = page["nextPageToken"].as_str().map(str::to_string);
            if page_token.is_none() {
                break;
            }
        }

        debug!(calendar_id, count = events.len(), "calendar events listed");
        Ok(events)
    }

    async fn create_event(
        &self,
        calendar_id: &str,
        event: &NewCalendarEvent,
    ) -> Result<String, SyncError> {
        let url = self.events_url(calendar_id);
        let body = self.send(self.http.post(&url).json(event)).await?;
        body["id"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| SyncError::MalformedPayload("created event has no id".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::types::{EventDateTime, EventSource};
    use mockito::Matcher;

    async fn client_for(server: &mut mockito::Server) -> GoogleCalendarClient {
        server
            .mock("POST", "/token")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"access_token":"at-1","expires_in":3599}"#)
            .create_async()
            .await;

        let http = Client::new();
        let auth = TokenProvider::new(
            http.clone(),
            OAuthConfig {
                service_name: "google".into(),
                client_id: "client".into(),
                client_secret: "secret".into(),
                token_url: format!("{}/token", server.url()),
            },
            "refresh",
        );
        GoogleCalendarClient::new(http, server.url(), auth)
    }

    fn shift_event() -> NewCalendarEvent {
        NewCalendarEvent {
            summary: "Barista shift".into(),
            description: "Shift for Jane Doe".into(),
            start: EventDateTime {
                date_time: "2024-01-10T09:00:00-05:00".into(),
                time_zone: Some("America/New_York".into()),
            },
            end: EventDateTime {
                date_time: "2024-01-10T17:00:00-05:00".into(),
                time_zone: Some("America/New_York".into()),
            },
            source: Some(EventSource {
                title: "homebaseShiftId-7".into(),
                url: "https://app.joinhomebase.com/".into(),
            }),
        }
    }

    #[tokio::test]
    async fn test_primary_calendar() {
        let mut server = mockito::Server::new_async().await;
        let client = client_for(&mut server).await;
        let mock = server
            .mock("GET", "/users/me/calendarList/primary")
            .match_header("authorization", "Bearer at-1")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"kind":"calendar#calendarListEntry","id":"jane@example.com","summary":"Jane"}"#)
            .create_async()
            .await;

        let calendar = client.primary_calendar().await.unwrap();
        mock.assert_async().await;
        assert_eq!(calendar.id, "jane@example.com");
        assert_eq!(calendar.summary.as_deref(), Some("Jane"));
    }

    #[tokio::test]
    async fn test_list_events_follows_pages() {
        let mut server = mockito::Server::new_async().await;
        let client = client_for(&mut server).await;
        server
            .mock("GET", "/calendars/jane%40example.com/events")
            .match_query(Matcher::Exact("maxResults=2500".into()))
            .with_status(200)
            .with_body(r#"{"items":[{"id":"a","source":{"title":"homebaseShiftId-1","url":"https://x/"}}],"nextPageToken":"p2"}"#)
            .create_async()
            .await;
        server
            .mock("GET", "/calendars/jane%40example.com/events")
            .match_query(Matcher::Exact("maxResults=2500&pageToken=p2".into()))
            .with_status(200)
            .with_body(r#"{"items":[{"id":"b","summary":"Dentist"}]}"#)
            .create_async()
            .await;

        let events = client.list_events("jane@example.com").await.unwrap();
        let ids: Vec<&str> = events.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(events[0].source_title.as_deref(), Some("homebaseShiftId-1"));
        assert!(events[1].source_title.is_none());
    }

    #[tokio::test]
    async fn test_list_events_rejects_event_without_id() {
        let mut server = mockito::Server::new_async().await;
        let client = client_for(&mut server).await;
        server
            .mock("GET", "/calendars/primary/events")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"items":[{"summary":"broken"}]}"#)
            .create_async()
            .await;

        assert!(matches!(
            client.list_events("primary").await,
            Err(SyncError::MalformedPayload(_))
        ));
    }

    #[tokio::test]
    async fn test_create_event_posts_marker() {
        let mut server = mockito::Server::new_async().await;
        let client = client_for(&mut server).await;
        let mock = server
            .mock("POST", "/calendars/primary/events")
            .match_body(Matcher::PartialJson(serde_json::json!({
                "summary": "Barista shift",
                "source": {"title": "homebaseShiftId-7"},
                "start": {"timeZone": "America/New_York"}
            })))
            .with_status(200)
            .with_body(r#"{"id":"new-event","status":"confirmed"}"#)
            .create_async()
            .await;

        let id = client.create_event("primary", &shift_event()).await.unwrap();
        mock.assert_async().await;
        assert_eq!(id, "new-event");
    }

    #[tokio::test]
    async fn test_unauthorized_is_authentication_required() {
        let mut server = mockito::Server::new_async().await;
        let client = client_for(&mut server).await;
        server
            .mock("GET", "/users/me/calendarList/primary")
            .with_status(401)
            .with_body(r#"{"error":{"code":401,"message":"Invalid Credentials"}}"#)
            .create_async()
            .await;

        assert!(matches!(
            client.primary_calendar().await,
            Err(SyncError::AuthenticationRequired)
        ));
    }

    #[tokio::test]
    async fn test_api_error_object() {
        let mut server = mockito::Server::new_async().await;
        let client = client_for(&mut server).await;
        server
            .mock("POST", "/calendars/primary/events")
            .with_status(400)
            .with_body(r#"{"error":{"code":400,"message":"Invalid source url"}}"#)
            .create_async()
            .await;

        match client.create_event("primary", &shift_event()).await {
            Err(SyncError::CalendarApi(msg)) => assert!(msg.contains("Invalid source url")),
            other => panic!("expected CalendarApi error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_token_refresh_failure_surfaces() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/token")
            .with_status(400)
            .with_body(r#"{"error":"invalid_grant"}"#)
            .create_async()
            .await;
        let http = Client::new();
        let auth = TokenProvider::new(
            http.clone(),
            OAuthConfig {
                service_name: "google".into(),
                client_id: "client".into(),
                client_secret: "secret".into(),
                token_url: format!("{}/token", server.url()),
            },
            "revoked",
        );
        let client = GoogleCalendarClient::new(http, server.url(), auth);

        assert!(matches!(
            client.primary_calendar().await,
            Err(SyncError::OAuth(_))
        ));
    }
}
