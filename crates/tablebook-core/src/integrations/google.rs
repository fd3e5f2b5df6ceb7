//! Google Calendar v3 events client.
//!
//! Mirrors reservations as events on one calendar (`primary` by default).
//! Every request carries the configured timeout; a timeout surfaces as
//! [`CalendarError::Timeout`].

use async_trait::async_trait;
use chrono_tz::Tz;
use reqwest::{Client, Response};
use serde::Deserialize;

use super::traits::CalendarApi;
use crate::reservation::Reservation;
use crate::storage::{GoogleConfig, SyncConfig};
use crate::sync::event_codec::reservation_to_event_body;
use crate::sync::types::{CalendarError, ExternalEvent};

const PAGE_SIZE: &str = "250";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventsPage {
    #[serde(default)]
    items: Vec<ExternalEvent>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CreatedEvent {
    id: String,
}

/// Google Calendar API client.
#[derive(Debug, Clone)]
pub struct GoogleCalendarClient {
    http: Client,
    api_base: String,
    calendar_id: String,
    tz: Tz,
    max_pages: u32,
}

impl GoogleCalendarClient {
    pub fn new(google: &GoogleConfig, sync: &SyncConfig, tz: Tz) -> Result<Self, CalendarError> {
        let http = Client::builder()
            .timeout(google.request_timeout())
            .build()
            .map_err(CalendarError::from)?;

        Ok(Self {
            http,
            api_base: google.api_base.trim_end_matches('/').to_string(),
            calendar_id: google.calendar_id.clone(),
            tz,
            max_pages: sync.max_list_pages.max(1),
        })
    }

    fn events_url(&self) -> String {
        format!(
            "{}/calendars/{}/events",
            self.api_base,
            urlencoding::encode(&self.calendar_id)
        )
    }

    fn event_url(&self, event_id: &str) -> String {
        format!("{}/{}", self.events_url(), urlencoding::encode(event_id))
    }
}

/// Turn a non-2xx response into [`CalendarError::Api`].
async fn check_status(resp: Response) -> Result<Response, CalendarError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(CalendarError::Api {
        status: status.as_u16(),
        body,
    })
}

#[async_trait]
impl CalendarApi for GoogleCalendarClient {
    async fn create_event(
        &self,
        access_token: &str,
        reservation: &Reservation,
    ) -> Result<String, CalendarError> {
        let body = reservation_to_event_body(reservation, self.tz);

        let resp = self
            .http
            .post(self.events_url())
            .bearer_auth(access_token)
            .json(&body)
            .send()
            .await?;

        let created: CreatedEvent = check_status(resp).await?.json().await?;
        tracing::debug!(reservation = %reservation.id, event = %created.id, "calendar event created");
        Ok(created.id)
    }

    async fn update_event(
        &self,
        access_token: &str,
        event_id: &str,
        reservation: &Reservation,
    ) -> Result<(), CalendarError> {
        let body = reservation_to_event_body(reservation, self.tz);

        let resp = self
            .http
            .patch(self.event_url(event_id))
            .bearer_auth(access_token)
            .json(&body)
            .send()
            .await?;

        check_status(resp).await?;
        Ok(())
    }

    async fn delete_event(&self, access_token: &str, event_id: &str) -> Result<(), CalendarError> {
        let resp = self
            .http
            .delete(self.event_url(event_id))
            .bearer_auth(access_token)
            .send()
            .await?;

        match check_status(resp).await {
            Ok(_) => Ok(()),
            Err(e) if e.is_gone() => {
                tracing::debug!(event = %event_id, "calendar event already gone");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn list_events(&self, access_token: &str) -> Result<Vec<ExternalEvent>, CalendarError> {
        let mut events = Vec::new();
        let mut page_token: Option<String> = None;

        for page in 0..self.max_pages {
            let mut query: Vec<(&str, &str)> = vec![("singleEvents", "true"), ("maxResults", PAGE_SIZE)];
            if let Some(token) = page_token.as_deref() {
                query.push(("pageToken", token));
            }

            let resp = self
                .http
                .get(self.events_url())
                .bearer_auth(access_token)
                .query(&query)
                .send()
                .await?;

            let body: EventsPage = check_status(resp).await?.json().await?;
            events.extend(body.items);

            match body.next_page_token {
                Some(next) => page_token = Some(next),
                None => return Ok(events),
            }

            if page + 1 == self.max_pages {
                tracing::warn!(pages = self.max_pages, "event listing truncated at page limit");
            }
        }

        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveTime, Utc};
    use mockito::Matcher;
    use serde_json::json;

    fn client_for(server: &mockito::Server, max_pages: u32) -> GoogleCalendarClient {
        let google = GoogleConfig {
            api_base: server.url(),
            ..Default::default()
        };
        let sync = SyncConfig {
            max_list_pages: max_pages,
            ..Default::default()
        };
        GoogleCalendarClient::new(&google, &sync, chrono_tz::Europe::Berlin).unwrap()
    }

    fn bob() -> Reservation {
        Reservation {
            id: "r-bob".to_string(),
            date: NaiveDate::from_ymd_opt(2024, 8, 10).unwrap(),
            time: NaiveTime::from_hms_opt(20, 0, 0).unwrap(),
            name: "Bob".to_string(),
            email: "bob@example.com".to_string(),
            phone: "555-0101".to_string(),
            guests: 4,
            notes: None,
            google_event_id: None,
            imported_from_google: false,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn create_event_posts_reservation_shape() {
        let mut server = mockito::Server::new_async().await;
        let m = server
            .mock("POST", "/calendars/primary/events")
            .match_header("authorization", "Bearer tok")
            .match_body(Matcher::PartialJson(json!({
                "summary": "Reservation: Bob",
                "start": {"dateTime": "2024-08-10T20:00:00", "timeZone": "Europe/Berlin"},
                "end": {"dateTime": "2024-08-10T22:00:00", "timeZone": "Europe/Berlin"}
            })))
            .with_status(200)
            .with_body(r#"{"id":"evt-bob","status":"confirmed"}"#)
            .create_async()
            .await;

        let id = client_for(&server, 10).create_event("tok", &bob()).await.unwrap();
        assert_eq!(id, "evt-bob");
        m.assert_async().await;
    }

    #[tokio::test]
    async fn api_errors_carry_status_and_body() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("POST", "/calendars/primary/events")
            .with_status(403)
            .with_body("rateLimitExceeded")
            .create_async()
            .await;

        let err = client_for(&server, 10).create_event("tok", &bob()).await.unwrap_err();
        assert_eq!(
            err,
            CalendarError::Api {
                status: 403,
                body: "rateLimitExceeded".to_string()
            }
        );
    }

    #[tokio::test]
    async fn delete_tolerates_missing_event() {
        let mut server = mockito::Server::new_async().await;
        let _gone = server
            .mock("DELETE", "/calendars/primary/events/evt-gone")
            .with_status(410)
            .create_async()
            .await;
        let _fail = server
            .mock("DELETE", "/calendars/primary/events/evt-err")
            .with_status(500)
            .create_async()
            .await;

        let client = client_for(&server, 10);
        client.delete_event("tok", "evt-gone").await.unwrap();
        assert!(client.delete_event("tok", "evt-err").await.is_err());
    }

    #[tokio::test]
    async fn update_uses_patch() {
        let mut server = mockito::Server::new_async().await;
        let m = server
            .mock("PATCH", "/calendars/primary/events/evt-bob")
            .match_body(Matcher::PartialJson(json!({"summary": "Reservation: Bob"})))
            .with_status(200)
            .with_body(r#"{"id":"evt-bob"}"#)
            .create_async()
            .await;

        client_for(&server, 10).update_event("tok", "evt-bob", &bob()).await.unwrap();
        m.assert_async().await;
    }

    #[tokio::test]
    async fn list_follows_page_tokens() {
        let mut server = mockito::Server::new_async().await;
        let _p2 = server
            .mock("GET", "/calendars/primary/events")
            .match_query(Matcher::UrlEncoded("pageToken".into(), "p2".into()))
            .with_status(200)
            .with_body(
                json!({"items": [{"id": "b", "summary": "Reservation: B", "start": {"dateTime": "2024-07-04T19:00:00+02:00"}}]})
                    .to_string(),
            )
            .create_async()
            .await;
        let _p1 = server
            .mock("GET", "/calendars/primary/events")
            .match_query(Matcher::Regex("^singleEvents=true&maxResults=250$".into()))
            .with_status(200)
            .with_body(
                json!({"items": [{"id": "a", "summary": "Lunch", "start": {"date": "2024-07-04"}}], "nextPageToken": "p2"})
                    .to_string(),
            )
            .create_async()
            .await;

        let events = client_for(&server, 10).list_events("tok").await.unwrap();
        let ids: Vec<_> = events.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn list_stops_at_page_limit() {
        let mut server = mockito::Server::new_async().await;
        let m = server
            .mock("GET", "/calendars/primary/events")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(json!({"items": [{"id": "x"}], "nextPageToken": "again"}).to_string())
            .expect(2)
            .create_async()
            .await;

        let events = client_for(&server, 2).list_events("tok").await.unwrap();
        assert_eq!(events.len(), 2);
        m.assert_async().await;
    }
}
