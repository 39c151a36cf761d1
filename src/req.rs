use std::{sync::OnceLock, time::Duration};

use reqwest::{header, Response};

use crate::api::Problem;

pub(crate) type ReqResult<T> = std::result::Result<T, Problem>;

static CLIENT: OnceLock<reqwest::Client> = OnceLock::new();

fn client() -> &'static reqwest::Client {
    CLIENT.get_or_init(|| {
        reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .timeout(Duration::from_secs(30))
            .user_agent(concat!("acme-autotls/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_default()
    })
}

pub(crate) async fn req_get(url: &str) -> ReqResult<Response> {
    log::trace!("GET {url}");
    client().get(url).send().await.map_err(transport_problem)
}

pub(crate) async fn req_head(url: &str) -> ReqResult<Response> {
    log::trace!("HEAD {url}");
    client().head(url).send().await.map_err(transport_problem)
}

pub(crate) async fn req_post(url: &str, body: String) -> ReqResult<Response> {
    log::trace!("POST {url} {body}");
    client()
        .post(url)
        .header(header::CONTENT_TYPE, "application/jose+json")
        .body(body)
        .send()
        .await
        .map_err(transport_problem)
}

pub(crate) async fn req_handle_error(res: ReqResult<Response>) -> ReqResult<Response> {
    let res = res?;

    // ok responses pass through
    if res.status().is_success() {
        return Ok(res);
    }

    let status = res.status();
    let is_problem = res
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|ct| ct.to_str().ok())
        .is_some_and(|ct| ct.starts_with("application/problem+json"));

    let body = req_safe_read_body(res).await;

    let problem = if is_problem {
        // if we were sent a problem+json, deserialize it
        serde_json::from_str(&body).unwrap_or_else(|err| {
            Problem::new(
                "problemJsonFail",
                Some(format!(
                    "Failed to deserialize application/problem+json ({err}) body: {body}"
                )),
            )
        })
    } else {
        // some other problem
        Problem {
            status: Some(status.as_u16()),
            ..Problem::new("httpReqError", Some(format!("{status} body: {body}")))
        }
    };

    Err(problem)
}

pub(crate) fn req_expect_header(res: &Response, name: &str) -> ReqResult<String> {
    res.headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(ToOwned::to_owned)
        .ok_or_else(|| Problem::new(format!("Missing header: {name}"), None))
}

pub(crate) async fn req_safe_read_body(res: Response) -> String {
    // letsencrypt sometimes closes the TLS abruptly causing io error
    // even though we did capture the body.
    res.text().await.unwrap_or_default()
}

fn transport_problem(err: reqwest::Error) -> Problem {
    Problem::new("httpTransportError", Some(err.to_string()))
}
