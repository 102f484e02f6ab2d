use reqwest::blocking::Client;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::from_str;
use std::time::Duration;
use tracing::debug;

pub fn post_json<T: DeserializeOwned, B: Serialize>(url: &str, body: &B) -> Result<T, String> {
    post_json_authed(url, None, body)
}

pub fn post_json_authed<T: DeserializeOwned, B: Serialize>(
    url: &str,
    bearer: Option<&str>,
    body: &B,
) -> Result<T, String> {
    let client = Client::builder()
        .timeout(Duration::from_secs(120))
        .build()
        .map_err(|e| e.to_string())?;
    let mut req = client.post(url).header(CONTENT_TYPE, "application/json");
    if let Some(token) = bearer {
        req = req.header(AUTHORIZATION, format!("Bearer {}", token));
    }
    debug!(url, "POST");
    let resp = req.json(body).send().map_err(|e| e.to_string())?;
    let status = resp.status();
    let text = resp.text().unwrap_or_default();
    if !status.is_success() {
        return Err(format!("POST {} failed: {} {}", url, status, text));
    }
    from_str::<T>(&text).map_err(|e| format!("POST {} decode failed: {} | {}", url, e, text))
}
