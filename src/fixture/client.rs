use super::EchoResponse;
use eyre::{ensure, eyre};
use reqwest::{Client, StatusCode};
use serde_json::json;
use std::time::Duration;
use tracing::info;

type Result<T> = color_eyre::eyre::Result<T>;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Result of one named check against the stub server
#[derive(Debug)]
pub struct CheckOutcome {
    pub name: &'static str,
    pub result: Result<()>,
}

impl CheckOutcome {
    pub fn passed(&self) -> bool {
        self.result.is_ok()
    }
}

/// Runs every check against the server at `base_url`
///
/// Checks run in order and a failing check does not stop the rest.
pub async fn run_checks(base_url: &str) -> Result<Vec<CheckOutcome>> {
    let client = Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .no_proxy()
        .build()?;
    let base_url = base_url.trim_end_matches('/');
    info!("HTTP Client: Running tests against: {}", base_url);

    Ok(vec![
        CheckOutcome {
            name: "test_get_request",
            result: check_get(&client, base_url).await,
        },
        CheckOutcome {
            name: "test_post_request",
            result: check_post(&client, base_url).await,
        },
        CheckOutcome {
            name: "test_not_found",
            result: check_not_found(&client, base_url).await,
        },
    ])
}

async fn check_get(client: &Client, base_url: &str) -> Result<()> {
    let response = client.get(format!("{base_url}/get")).send().await?;
    ensure!(
        response.status() == StatusCode::OK,
        "GET /get returned {}",
        response.status()
    );

    let body: EchoResponse = response.json().await?;
    ensure!(body.method == "GET", "unexpected method {:?}", body.method);
    ensure!(body.path == "/get", "unexpected path {:?}", body.path);
    info!("HTTP Client: GET response: {:?}", body);
    Ok(())
}

async fn check_post(client: &Client, base_url: &str) -> Result<()> {
    let payload = json!({ "test_key": "test_value", "number": 42 });
    let response = client
        .post(format!("{base_url}/post"))
        .json(&payload)
        .send()
        .await?;
    ensure!(
        response.status() == StatusCode::OK,
        "POST /post returned {}",
        response.status()
    );

    let body: EchoResponse = response.json().await?;
    ensure!(body.method == "POST", "unexpected method {:?}", body.method);
    ensure!(body.path == "/post", "unexpected path {:?}", body.path);
    let received = body
        .received_data
        .as_ref()
        .ok_or_else(|| eyre!("response is missing received_data"))?;
    ensure!(
        *received == payload,
        "server echoed {} instead of {}",
        received,
        payload
    );
    info!("HTTP Client: POST response: {:?}", body);
    Ok(())
}

async fn check_not_found(client: &Client, base_url: &str) -> Result<()> {
    let response = client.get(format!("{base_url}/unknown")).send().await?;
    ensure!(
        response.status() == StatusCode::NOT_FOUND,
        "GET /unknown returned {} instead of 404",
        response.status()
    );
    info!("HTTP Client: 404 response received as expected");
    Ok(())
}
