use futures::stream::{self, StreamExt};
use reqwest::{Client, Method, StatusCode};
use serde::Serialize;
use serde_json::{Value, json};

use crate::{args::SmokeSuite, error::Result};

/// Parameters the suites fill into request paths and bodies.
#[derive(Debug, Clone)]
pub struct SmokeParams {
    pub user_id: u64,
    pub dataset_path: String,
}

impl Default for SmokeParams {
    fn default() -> Self {
        SmokeParams {
            user_id: 1,
            dataset_path: String::from("data/transactions.csv"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SmokeStep {
    pub name: &'static str,
    pub method: Method,
    pub path: String,
    pub body: Option<Value>,
}

#[derive(Debug, Serialize)]
pub struct StepReport {
    pub name: &'static str,
    pub method: String,
    pub path: String,
    pub status: u16,
    pub body: Value,
}

impl StepReport {
    pub fn succeeded(&self) -> bool {
        StatusCode::from_u16(self.status)
            .map(|status| status.is_success())
            .unwrap_or(false)
    }
}

#[derive(Debug, Serialize)]
pub struct SuiteReport {
    pub suite: String,
    pub steps: Vec<StepReport>,
}

impl SuiteReport {
    pub fn all_succeeded(&self) -> bool {
        self.steps.iter().all(StepReport::succeeded)
    }
}

const SAMPLE_DESCRIPTIONS: &[&str] = &[
    "STARBUCKS COFFEE #1234",
    "SHELL OIL 5742",
    "WHOLE FOODS MARKET",
    "NETFLIX.COM",
    "PAYROLL DIRECT DEPOSIT",
];

pub fn suite_steps(suite: SmokeSuite, params: &SmokeParams) -> Vec<SmokeStep> {
    match suite {
        SmokeSuite::Server => vec![
            SmokeStep {
                name: "health",
                method: Method::GET,
                path: String::from("/api/health"),
                body: None,
            },
            SmokeStep {
                name: "dashboard",
                method: Method::GET,
                path: format!("/api/dashboard/{}", params.user_id),
                body: None,
            },
        ],
        SmokeSuite::Ml => vec![
            SmokeStep {
                name: "categorize",
                method: Method::POST,
                path: String::from("/api/ml/categorize"),
                body: Some(json!({ "descriptions": SAMPLE_DESCRIPTIONS })),
            },
            SmokeStep {
                name: "model info",
                method: Method::GET,
                path: String::from("/api/ml/info"),
                body: None,
            },
        ],
        SmokeSuite::Training => vec![
            SmokeStep {
                name: "train on sample data",
                method: Method::POST,
                path: String::from("/api/training/train-sample"),
                body: None,
            },
            SmokeStep {
                name: "train on dataset",
                method: Method::POST,
                path: String::from("/api/training/train-dataset"),
                body: Some(json!({
                    "filePath": params.dataset_path,
                    "options": {
                        "testRatio": 0.2,
                        "targetColumns": ["category"],
                        "algorithms": ["naive_bayes", "logistic_regression"],
                    },
                })),
            },
            SmokeStep {
                name: "training history",
                method: Method::GET,
                path: String::from("/api/training/history"),
                body: None,
            },
        ],
    }
}

async fn run_step(client: &Client, base_url: &str, step: SmokeStep) -> Result<StepReport> {
    let url = format!("{}{}", base_url.trim_end_matches('/'), &step.path);
    tracing::info!("Running step '{}': {} {}", step.name, &step.method, &url);

    let mut request = client.request(step.method.clone(), &url);
    if let Some(body) = &step.body {
        request = request.json(body);
    }

    let res = request.send().await.inspect_err(|err| {
        tracing::error!("Request {} {} failed: {:#?}", &step.method, &url, err);
    })?;

    let status = res.status();
    let text = res.text().await?;
    let body = serde_json::from_str::<Value>(&text).unwrap_or(Value::String(text));

    tracing::info!(
        "Step '{}' returned status={} body={}",
        step.name,
        status,
        serde_json::to_string_pretty(&body).unwrap_or(String::from("<invalid json>"))
    );

    Ok(StepReport {
        name: step.name,
        method: step.method.to_string(),
        path: step.path,
        status: status.as_u16(),
        body,
    })
}

/// Runs the suite's requests strictly one after another. A transport failure
/// stops the suite; non-2xx responses are recorded and the suite continues.
pub async fn run_suite(
    client: &Client,
    base_url: &str,
    suite: SmokeSuite,
    params: &SmokeParams,
) -> Result<SuiteReport> {
    let steps = suite_steps(suite, params);
    tracing::info!("Running {:?} suite with {} steps", suite, steps.len());

    let mut results = stream::iter(steps)
        .map(async |step| run_step(client, base_url, step).await)
        .buffered(1);

    let mut reports = vec![];
    while let Some(result) = results.next().await {
        reports.push(result?);
    }

    let report = SuiteReport {
        suite: format!("{:?}", suite).to_lowercase(),
        steps: reports,
    };

    tracing::info!(
        "Finished {} suite, all steps succeeded: {}",
        &report.suite,
        report.all_succeeded()
    );

    Ok(report)
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use axum::{
        Json, Router,
        body::Bytes,
        extract::{Path, State},
        http::{StatusCode as AxumStatus, Uri},
        routing::{get, post},
    };

    use super::*;

    type Hits = Arc<Mutex<Vec<(String, Option<Value>)>>>;

    async fn record(State(hits): State<Hits>, uri: Uri, body: Bytes) -> Json<Value> {
        hits.lock()
            .unwrap()
            .push((uri.path().to_string(), serde_json::from_slice(&body).ok()));
        Json(json!({ "success": true }))
    }

    async fn dashboard(State(hits): State<Hits>, Path(id): Path<u64>) -> Json<Value> {
        hits.lock()
            .unwrap()
            .push((format!("/api/dashboard/{}", id), None));
        Json(json!({ "userId": id, "accounts": [] }))
    }

    async fn spawn_backend() -> (String, Hits) {
        let hits: Hits = Arc::new(Mutex::new(vec![]));
        let app = Router::new()
            .route("/api/health", get(record))
            .route("/api/dashboard/{id}", get(dashboard))
            .route("/api/ml/categorize", post(record))
            .route("/api/ml/info", get(record))
            .route("/api/training/train-sample", post(record))
            .route(
                "/api/training/train-dataset",
                post(|| async { (AxumStatus::UNPROCESSABLE_ENTITY, "missing file") }),
            )
            .route("/api/training/history", get(record))
            .with_state(hits.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        (format!("http://{}", address), hits)
    }

    fn paths(hits: &Hits) -> Vec<String> {
        hits.lock()
            .unwrap()
            .iter()
            .map(|(path, _)| path.clone())
            .collect()
    }

    #[tokio::test]
    async fn server_suite_hits_health_then_dashboard() {
        let (base_url, hits) = spawn_backend().await;
        let params = SmokeParams {
            user_id: 42,
            ..SmokeParams::default()
        };

        let report = run_suite(&Client::new(), &base_url, SmokeSuite::Server, &params)
            .await
            .unwrap();

        assert!(report.all_succeeded());
        assert_eq!(report.suite, "server");
        assert_eq!(paths(&hits), vec!["/api/health", "/api/dashboard/42"]);
        assert_eq!(report.steps[1].body["userId"], 42);
    }

    #[tokio::test]
    async fn ml_suite_posts_descriptions() {
        let (base_url, hits) = spawn_backend().await;

        let report = run_suite(
            &Client::new(),
            &format!("{}/", base_url),
            SmokeSuite::Ml,
            &SmokeParams::default(),
        )
        .await
        .unwrap();

        assert!(report.all_succeeded());
        let recorded = hits.lock().unwrap();
        assert_eq!(recorded[0].0, "/api/ml/categorize");
        let body = recorded[0].1.as_ref().unwrap();
        assert_eq!(
            body["descriptions"].as_array().unwrap().len(),
            SAMPLE_DESCRIPTIONS.len()
        );
        assert_eq!(recorded[1].0, "/api/ml/info");
    }

    #[tokio::test]
    async fn training_suite_records_failed_step_and_continues() {
        let (base_url, hits) = spawn_backend().await;

        let report = run_suite(
            &Client::new(),
            &base_url,
            SmokeSuite::Training,
            &SmokeParams::default(),
        )
        .await
        .unwrap();

        assert!(!report.all_succeeded());
        assert_eq!(report.steps.len(), 3);
        assert_eq!(report.steps[1].status, 422);
        assert_eq!(report.steps[1].body, Value::String(String::from("missing file")));
        assert_eq!(
            paths(&hits),
            vec!["/api/training/train-sample", "/api/training/history"]
        );
    }

    #[test]
    fn train_dataset_body_shape() {
        let params = SmokeParams {
            user_id: 1,
            dataset_path: String::from("/tmp/data.csv"),
        };
        let steps = suite_steps(SmokeSuite::Training, &params);
        let body = steps[1].body.as_ref().unwrap();
        assert_eq!(body["filePath"], "/tmp/data.csv");
        assert_eq!(body["options"]["testRatio"], 0.2);
        assert_eq!(body["options"]["targetColumns"][0], "category");
        assert_eq!(body["options"]["algorithms"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn unreachable_backend_is_an_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let address = listener.local_addr().unwrap();
        drop(listener);

        let result = run_suite(
            &Client::new(),
            &format!("http://{}", address),
            SmokeSuite::Server,
            &SmokeParams::default(),
        )
        .await;
        assert!(result.is_err());
    }
}
