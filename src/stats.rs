//! Request statistics, correlated with the operations declared in the API
//! document.
//!
//! Every declared `(method, path template)` gets a counter from the start, so
//! the snapshot lists routes that were never hit. Requests that match no
//! template are only counted in the totals.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use axum::extract::{Request, State};
use axum::http::{Method, StatusCode};
use axum::middleware::Next;
use axum::response::Response;
use axum::routing::get;
use axum::{Json, Router};
use dashmap::DashMap;
use serde::Serialize;

use crate::docs::ApiDocument;

pub const STATS_PATH: &str = "/api-stats";

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct RouteStats {
    pub requests: u64,
    pub success: u64,
    pub redirects: u64,
    pub client_errors: u64,
    pub server_errors: u64,
    pub total_time_ms: f64,
    pub max_time_ms: f64,
}

impl RouteStats {
    fn observe(&mut self, status: StatusCode, elapsed: Duration) {
        let elapsed_ms = elapsed.as_secs_f64() * 1000.0;

        self.requests += 1;
        match status.as_u16() {
            200..=299 => self.success += 1,
            300..=399 => self.redirects += 1,
            400..=499 => self.client_errors += 1,
            500..=599 => self.server_errors += 1,
            _ => {}
        }
        self.total_time_ms += elapsed_ms;
        self.max_time_ms = self.max_time_ms.max(elapsed_ms);
    }
}

#[derive(Debug, Serialize)]
pub struct StatsSnapshot {
    pub requests: u64,
    pub unmatched: u64,
    pub operations: BTreeMap<String, RouteStats>,
}

enum Segment {
    Literal(String),
    Param,
    CatchAll,
}

struct Template {
    key: String,
    method: Method,
    segments: Vec<Segment>,
}

impl Template {
    fn parse(method: Method, path: &str) -> Self {
        let segments = split(path)
            .map(|segment| {
                if segment.starts_with("{*") && segment.ends_with('}') {
                    Segment::CatchAll
                } else if segment.starts_with('{') && segment.ends_with('}') {
                    Segment::Param
                } else {
                    Segment::Literal(segment.to_string())
                }
            })
            .collect();

        Template {
            key: format!("{} {}", method, path),
            method,
            segments,
        }
    }

    /// Number of literal segments matched, or `None` when the path does not fit.
    fn score(&self, method: &Method, path: &[&str]) -> Option<usize> {
        // HEAD is answered by GET handlers.
        if *method != self.method && !(*method == Method::HEAD && self.method == Method::GET) {
            return None;
        }

        let mut literals = 0;
        for (i, segment) in self.segments.iter().enumerate() {
            match segment {
                Segment::CatchAll => return (path.len() > i).then_some(literals),
                Segment::Param => {
                    if path.get(i).is_none_or(|value| value.is_empty()) {
                        return None;
                    }
                }
                Segment::Literal(literal) => {
                    if path.get(i) != Some(&literal.as_str()) {
                        return None;
                    }
                    literals += 1;
                }
            }
        }

        (path.len() == self.segments.len()).then_some(literals)
    }
}

fn split(path: &str) -> impl Iterator<Item = &str> {
    path.trim_start_matches('/').split('/')
}

struct Inner {
    templates: Vec<Template>,
    operations: DashMap<String, RouteStats>,
    requests: AtomicU64,
    unmatched: AtomicU64,
}

#[derive(Clone)]
pub struct ApiStats {
    inner: Arc<Inner>,
}

impl ApiStats {
    pub fn new(document: &ApiDocument) -> Self {
        Self::from_operations(document.operations())
    }

    pub fn from_operations(operations: impl IntoIterator<Item = (Method, String)>) -> Self {
        let templates: Vec<Template> = operations
            .into_iter()
            .map(|(method, path)| Template::parse(method, &path))
            .collect();
        let operations = templates
            .iter()
            .map(|template| (template.key.clone(), RouteStats::default()))
            .collect();

        ApiStats {
            inner: Arc::new(Inner {
                templates,
                operations,
                requests: AtomicU64::new(0),
                unmatched: AtomicU64::new(0),
            }),
        }
    }

    /// The declared operation a request belongs to, as `"METHOD /template"`.
    /// The most specific template wins.
    pub fn correlate(&self, method: &Method, path: &str) -> Option<&str> {
        let path: Vec<&str> = split(path).collect();

        self.inner
            .templates
            .iter()
            .filter_map(|template| Some((template.score(method, &path)?, template)))
            .max_by_key(|(score, _)| *score)
            .map(|(_, template)| template.key.as_str())
    }

    pub fn observe(&self, method: &Method, path: &str, status: StatusCode, elapsed: Duration) {
        self.inner.requests.fetch_add(1, Ordering::Relaxed);

        match self.correlate(method, path) {
            Some(key) => {
                if let Some(mut stats) = self.inner.operations.get_mut(key) {
                    stats.observe(status, elapsed);
                }
            }
            None => {
                self.inner.unmatched.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            requests: self.inner.requests.load(Ordering::Relaxed),
            unmatched: self.inner.unmatched.load(Ordering::Relaxed),
            operations: self
                .inner
                .operations
                .iter()
                .map(|entry| (entry.key().clone(), entry.value().clone()))
                .collect(),
        }
    }
}

pub async fn record(State(stats): State<ApiStats>, request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_owned();
    let started = Instant::now();

    let response = next.run(request).await;

    stats.observe(&method, &path, response.status(), started.elapsed());
    response
}

async fn snapshot(State(stats): State<ApiStats>) -> Json<StatsSnapshot> {
    Json(stats.snapshot())
}

pub fn routes(stats: ApiStats) -> Router {
    Router::new()
        .route(STATS_PATH, get(snapshot))
        .with_state(stats)
}
