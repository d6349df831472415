use crate::camera::{Camera, CameraSession, Frame};
use crate::gesture::{FeedEvent, FeedSender, Gesture, GestureSource};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::Url;
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};

pub const DEFAULT_ENDPOINT_PATH: &str = "/detectar-gesto/";
const CSRF_COOKIE_NAME: &str = "csrftoken";
const CSRF_HEADER: &str = "X-CSRFToken";

#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("invalid classifier url: {0}")]
    InvalidUrl(String),
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("classifier returned {status}: {message}")]
    Status { status: u16, message: String },
    #[error("malformed classifier response: {0}")]
    Malformed(String),
}

impl ClassifierError {
    pub fn status_line(&self) -> String {
        format!("Gesture detection failed: {self}")
    }
}

#[derive(Debug, Clone)]
pub struct ClassifierConfig {
    pub endpoint: String,
    pub csrf_cookie: Option<String>,
    pub timeout: Duration,
    pub cache_ttl: Duration,
}

impl ClassifierConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            csrf_cookie: None,
            timeout: Duration::from_secs(10),
            cache_ttl: Duration::from_secs(60),
        }
    }
}

#[derive(Serialize)]
struct ClassifyRequest<'a> {
    image: &'a str,
}

#[derive(Deserialize)]
struct ClassifyResponse {
    gesto: String,
}

pub fn csrf_token_from_cookie(cookie: &str) -> Option<&str> {
    cookie
        .split(';')
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == CSRF_COOKIE_NAME)
        .map(|(_, value)| value.trim())
        .filter(|value| !value.is_empty())
}

pub fn image_data_url(jpeg: &[u8]) -> String {
    format!("data:image/jpeg;base64,{}", STANDARD.encode(jpeg))
}

struct CachedLabel {
    label: String,
    stored_at: Instant,
}

struct ResponseCache {
    ttl: Duration,
    entries: HashMap<Vec<u8>, CachedLabel>,
}

impl ResponseCache {
    fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: HashMap::new(),
        }
    }

    fn key(jpeg: &[u8]) -> Vec<u8> {
        Sha256::digest(jpeg).to_vec()
    }

    fn get(&self, key: &[u8]) -> Option<&str> {
        self.entries
            .get(key)
            .filter(|entry| entry.stored_at.elapsed() < self.ttl)
            .map(|entry| entry.label.as_str())
    }

    fn insert(&mut self, key: Vec<u8>, label: String) {
        if self.ttl.is_zero() {
            return;
        }
        let ttl = self.ttl;
        self.entries
            .retain(|_, entry| entry.stored_at.elapsed() < ttl);
        self.entries.insert(
            key,
            CachedLabel {
                label,
                stored_at: Instant::now(),
            },
        );
    }
}

pub struct ClassifierClient {
    http: Client,
    endpoint: String,
    csrf_token: String,
    cache: ResponseCache,
}

impl ClassifierClient {
    pub fn new(config: ClassifierConfig) -> Result<Self, ClassifierError> {
        let raw = config.endpoint.trim();
        let mut url =
            Url::parse(raw).map_err(|_| ClassifierError::InvalidUrl(raw.to_string()))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ClassifierError::InvalidUrl(raw.to_string()));
        }
        if url.path() == "/" {
            url.set_path(DEFAULT_ENDPOINT_PATH);
        }
        let endpoint = url.to_string();

        let http = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.timeout)
            .user_agent(format!("gesture-player/{}", env!("CARGO_PKG_VERSION")))
            .build()?;
        let csrf_token = config
            .csrf_cookie
            .as_deref()
            .and_then(csrf_token_from_cookie)
            .unwrap_or_default()
            .to_string();

        Ok(Self {
            http,
            endpoint,
            csrf_token,
            cache: ResponseCache::new(config.cache_ttl),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    // No retry on failure.
    pub fn classify(&mut self, frame: &Frame) -> Result<String, ClassifierError> {
        let key = ResponseCache::key(&frame.jpeg);
        if let Some(label) = self.cache.get(&key) {
            debug!(label, "classifier cache hit");
            return Ok(label.to_string());
        }

        let image = image_data_url(&frame.jpeg);
        debug!(
            endpoint = %self.endpoint,
            width = frame.width,
            height = frame.height,
            bytes = frame.jpeg.len(),
            "classifying frame"
        );
        let response = self
            .http
            .post(&self.endpoint)
            .header(CSRF_HEADER, &self.csrf_token)
            .json(&ClassifyRequest { image: &image })
            .send()?;

        let status = response.status();
        let body = response.text()?;
        if !status.is_success() {
            return Err(ClassifierError::Status {
                status: status.as_u16(),
                message: body,
            });
        }

        let parsed: ClassifyResponse =
            serde_json::from_str(&body).map_err(|err| ClassifierError::Malformed(err.to_string()))?;
        info!(label = %parsed.gesto, "gesture classified");
        self.cache.insert(key, parsed.gesto.clone());
        Ok(parsed.gesto)
    }
}

pub struct RemoteGestureSource {
    camera: Box<dyn Camera>,
    client: ClassifierClient,
    interval: Duration,
}

impl RemoteGestureSource {
    pub fn new(camera: Box<dyn Camera>, client: ClassifierClient, interval: Duration) -> Self {
        Self {
            camera,
            client,
            interval,
        }
    }
}

impl GestureSource for RemoteGestureSource {
    fn name(&self) -> &'static str {
        "remote"
    }

    fn run(self: Box<Self>, feed: FeedSender) {
        let Self {
            mut camera,
            mut client,
            interval,
        } = *self;

        let mut session = match CameraSession::acquire(camera.as_mut()) {
            Ok(session) => session,
            Err(err) => {
                warn!(error = %err, "camera unavailable");
                let _ = feed.send(FeedEvent::CameraUnavailable(err));
                return;
            }
        };

        while feed.wait(interval) {
            let frame = match session.capture() {
                Ok(frame) => frame,
                Err(err) => {
                    warn!(error = %err, "frame capture failed");
                    if !feed.send(FeedEvent::Status(format!("Frame capture failed: {err}"))) {
                        break;
                    }
                    continue;
                }
            };

            let event = match client.classify(&frame) {
                Ok(label) => FeedEvent::Detected(Gesture::parse(&label)),
                Err(err) => {
                    warn!(error = %err, endpoint = client.endpoint(), "classification failed");
                    FeedEvent::Status(err.status_line())
                }
            };
            if !feed.send(event) {
                break;
            }
        }
    }
}
