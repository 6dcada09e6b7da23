//! Homebase shift source.
//!
//! Homebase has no public API for employees. The client signs in through the
//! web form (carrying the Rails `authenticity_token` and the session cookie)
//! and reads the schedule builder's JSON:API document, which lists every
//! user, job and shift of the location for the requested dates.

use std::collections::HashSet;
use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};
use regex::Regex;
use reqwest::Client;
use serde::{Deserialize, Deserializer};
use tracing::{debug, info, warn};
use url::Url;

use super::traits::ShiftSource;
use crate::storage::{Config, HomebaseCredentials};
use crate::sync::types::{ShiftRecord, SyncError};
use crate::sync::window::ResolvedWindow;

const SIGN_IN_PATH: &str = "/accounts/sign-in";
const SCHEDULE_PATH: &str = "/api/fe/schedule_builder/schedule";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

// ============================================================================
// Schedule document
// ============================================================================

#[derive(Debug, Deserialize)]
struct ScheduleDocument {
    included: Vec<Included>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum Included {
    User {
        #[serde(deserialize_with = "resource_id")]
        id: String,
        attributes: UserAttributes,
    },
    Job {
        #[serde(deserialize_with = "resource_id")]
        id: String,
        relationships: JobRelationships,
    },
    Shift {
        #[serde(deserialize_with = "resource_id")]
        id: String,
        attributes: ShiftAttributes,
        relationships: ShiftRelationships,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserAttributes {
    first_name: String,
    last_name: String,
}

#[derive(Debug, Deserialize)]
struct JobRelationships {
    user: Relationship,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ShiftAttributes {
    start_at: DateTime<FixedOffset>,
    end_at: DateTime<FixedOffset>,
    role_name: String,
}

#[derive(Debug, Deserialize)]
struct ShiftRelationships {
    owner: Relationship,
}

#[derive(Debug, Deserialize)]
struct Relationship {
    data: Option<ResourceRef>,
}

#[derive(Debug, Deserialize)]
struct ResourceRef {
    #[serde(deserialize_with = "resource_id")]
    id: String,
}

/// JSON:API ids are strings, but older endpoints emit numbers.
fn resource_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Str(String),
        Num(i64),
    }

    Ok(match Id::deserialize(deserializer)? {
        Id::Str(s) => s,
        Id::Num(n) => n.to_string(),
    })
}

impl Relationship {
    fn id(&self) -> Option<&str> {
        self.data.as_ref().map(|r| r.id.as_str())
    }
}

/// Shifts of the person named `first_name last_name` (case-insensitive)
/// starting inside `window`, in document order.
fn select_shifts(
    document: &ScheduleDocument,
    first_name: &str,
    last_name: &str,
    window: &ResolvedWindow,
) -> Option<Vec<ShiftRecord>> {
    let same_name = |value: &str, wanted: &str| value.to_lowercase() == wanted.to_lowercase();

    let user_id = document.included.iter().find_map(|item| match item {
        Included::User { id, attributes }
            if same_name(&attributes.first_name, first_name)
                && same_name(&attributes.last_name, last_name) =>
        {
            Some(id.as_str())
        }
        _ => None,
    })?;

    let jobs: HashSet<&str> = document
        .included
        .iter()
        .filter_map(|item| match item {
            Included::Job { id, relationships } if relationships.user.id() == Some(user_id) => {
                Some(id.as_str())
            }
            _ => None,
        })
        .collect();

    let shifts = document
        .included
        .iter()
        .filter_map(|item| match item {
            Included::Shift {
                id,
                attributes,
                relationships,
            } if relationships.owner.id().is_some_and(|owner| jobs.contains(owner))
                && window.contains(&attributes.start_at) =>
            {
                Some(ShiftRecord {
                    shift_id: id.clone(),
                    role: attributes.role_name.clone(),
                    person_first_name: first_name.to_string(),
                    person_last_name: last_name.to_string(),
                    date: attributes.start_at.date_naive(),
                    start_time: attributes.start_at.time(),
                    end_time: attributes.end_at.time(),
                })
            }
            _ => None,
        })
        .collect();

    Some(shifts)
}

// ============================================================================
// Sign-in form
// ============================================================================

static POST_FORM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<form\b[^>]*\bmethod\s*=\s*["']?post["']?[^>]*>(.*?)</form>"#)
        .expect("valid form pattern")
});
static INPUT_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?is)<input\b[^>]*>"#).expect("valid input pattern"));
static TOKEN_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\bname\s*=\s*["']authenticity_token["']"#).expect("valid name pattern")
});
static VALUE_ATTR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\bvalue\s*=\s*["']([^"']*)["']"#).expect("valid value pattern")
});

/// Value of the hidden `authenticity_token` input of the page's POST form.
fn extract_authenticity_token(html: &str) -> Option<String> {
    let form = POST_FORM.captures(html)?.get(1)?;

    INPUT_TAG
        .find_iter(form.as_str())
        .map(|m| m.as_str())
        .find(|tag| TOKEN_NAME.is_match(tag))
        .and_then(|tag| VALUE_ATTR.captures(tag))
        .and_then(|c| c.get(1))
        .map(|v| v.as_str().to_string())
}

// ============================================================================
// Client
// ============================================================================

/// Scrapes one person's shifts from Homebase.
pub struct HomebaseClient {
    http: Client,
    base_url: Url,
    credentials: HomebaseCredentials,
}

impl HomebaseClient {
    pub fn new(base_url: &str, credentials: HomebaseCredentials) -> Result<Self, SyncError> {
        let http = Client::builder()
            .cookie_store(true)
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        let base_url = Url::parse(base_url)
            .map_err(|e| SyncError::ShiftSource(format!("invalid base url '{base_url}': {e}")))?;

        Ok(Self {
            http,
            base_url,
            credentials,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, SyncError> {
        Self::new(&config.homebase_base_url, config.homebase.clone())
    }

    fn endpoint(&self, path: &str) -> Result<Url, SyncError> {
        self.base_url
            .join(path)
            .map_err(|e| SyncError::ShiftSource(format!("invalid endpoint {path}: {e}")))
    }

    /// Fetch the sign-in form and submit the credentials.
    async fn sign_in(&self) -> Result<(), SyncError> {
        let url = self.endpoint(SIGN_IN_PATH)?;

        let page = self.http.get(url.clone()).send().await?;
        if !page.status().is_success() {
            return Err(SyncError::AuthenticationFailed(format!(
                "sign-in page returned {}",
                page.status()
            )));
        }
        let token = extract_authenticity_token(&page.text().await?).ok_or_else(|| {
            SyncError::AuthenticationFailed("sign-in page has no authenticity_token".into())
        })?;

        let form = [
            ("authenticity_token", token.as_str()),
            ("account[login]", self.credentials.username.as_str()),
            ("account[password]", self.credentials.password.as_str()),
            ("account[remember_me]", "0"),
        ];
        let response = self.http.post(url).form(&form).send().await?;
        if !response.status().is_success() {
            return Err(SyncError::AuthenticationFailed(format!(
                "Homebase login returned {}",
                response.status()
            )));
        }

        info!(user = %self.credentials.username, "Homebase login successful");
        Ok(())
    }

    async fn fetch_schedule(&self, window: &ResolvedWindow) -> Result<ScheduleDocument, SyncError> {
        let mut url = self.endpoint(SCHEDULE_PATH)?;
        url.query_pairs_mut()
            .append_pair("end_date", &window.end_date.format("%Y-%m-%d").to_string())
            .append_pair("start_date", &window.start_date.format("%Y-%m-%d").to_string());

        let response = self.http.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SyncError::ShiftSource(format!(
                "schedule request returned {status}"
            )));
        }

        let text = response.text().await?;
        serde_json::from_str(&text)
            .map_err(|e| SyncError::MalformedPayload(format!("schedule document: {e}")))
    }
}

#[async_trait]
impl ShiftSource for HomebaseClient {
    async fn fetch_shifts(&self, window: &ResolvedWindow) -> Result<Vec<ShiftRecord>, SyncError> {
        self.sign_in().await?;
        let document = self.fetch_schedule(window).await?;

        let first = &self.credentials.first_name;
        let last = &self.credentials.last_name;
        match select_shifts(&document, first, last, window) {
            Some(shifts) => {
                debug!(count = shifts.len(), "shifts selected");
                Ok(shifts)
            }
            None => {
                warn!(first_name = %first, last_name = %last, "employee not found in schedule");
                Ok(Vec::new())
            }
        }
    }
}
