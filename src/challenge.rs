//! HTTP-01 challenge responder.
//!
//! Serves the current key authorization under `/.well-known/acme-challenge/<token>` while a
//! single authorization attempt is in flight.

use std::{convert::Infallible, future::ready, io, net::SocketAddr, sync::Arc};

use actix_http::{body::BoxBody, header, HttpService, Method, Request, Response, StatusCode};
use actix_server::{Server, ServerHandle};
use parking_lot::RwLock;

/// HTTP-01 challenge path prefix.
pub const ACME_CHALLENGE_PREFIX: &str = "/.well-known/acme-challenge/";

/// Holds the key authorization of the authorization attempt currently in flight.
///
/// Cloning shares the slot. Only one attempt installs a value at a time; once the authorization
/// settles the value is retired and every challenge path answers 404 again.
#[derive(Debug, Clone, Default)]
pub struct ChallengeResponder {
    key_authorization: Arc<RwLock<Option<String>>>,
}

impl ChallengeResponder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the key authorization to serve.
    pub fn install(&self, key_authorization: String) {
        log::debug!("installing HTTP-01 key authorization");
        *self.key_authorization.write() = Some(key_authorization);
    }

    /// Stop serving the current key authorization.
    pub fn retire(&self) {
        if self.key_authorization.write().take().is_some() {
            log::debug!("retired HTTP-01 key authorization");
        }
    }

    /// Returns the body to serve for `path`, if any.
    ///
    /// Any non-empty remainder after [`ACME_CHALLENGE_PREFIX`] is answered with the installed key
    /// authorization.
    pub fn respond(&self, path: &str) -> Option<String> {
        let token = path.strip_prefix(ACME_CHALLENGE_PREFIX)?;
        if token.is_empty() {
            return None;
        }

        self.key_authorization.read().clone()
    }

    fn handle(&self, req: &Request) -> Response<BoxBody> {
        let body = (*req.method() == Method::GET)
            .then(|| self.respond(req.path()))
            .flatten();

        match body {
            Some(body) => {
                log::debug!("answering HTTP-01 challenge at {}", req.path());
                Response::build(StatusCode::OK)
                    .insert_header((header::CONTENT_TYPE, "text/plain"))
                    .body(body)
                    .map_into_boxed_body()
            }
            None => Response::build(StatusCode::NOT_FOUND)
                .finish()
                .map_into_boxed_body(),
        }
    }
}

/// A running HTTP listener for a [`ChallengeResponder`].
pub struct ChallengeServer {
    handle: ServerHandle,
    local_addr: SocketAddr,
}

impl ChallengeServer {
    /// Bind `addr` and start answering challenges.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(addr: SocketAddr, responder: ChallengeResponder) -> io::Result<Self> {
        let lst = std::net::TcpListener::bind(addr)?;
        let local_addr = lst.local_addr()?;

        let server = Server::build()
            .listen("acme-challenge", lst, move || {
                let responder = responder.clone();

                HttpService::build()
                    .finish(move |req: Request| {
                        ready(Ok::<_, Infallible>(responder.handle(&req)))
                    })
                    .tcp()
            })?
            .workers(1)
            .disable_signals()
            .shutdown_timeout(0)
            .run();

        let handle = server.handle();

        tokio::spawn(async move {
            if let Err(err) = server.await {
                log::warn!("challenge server exited with error: {err}");
            }
        });

        log::debug!("challenge server listening on {local_addr}");

        Ok(ChallengeServer { handle, local_addr })
    }

    /// Address the server actually bound.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop the listener; connections in flight are dropped.
    pub async fn stop(self) {
        self.handle.stop(false).await;
        log::debug!("challenge server on {} stopped", self.local_addr);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_respond_under_prefix() {
        let responder = ChallengeResponder::new();
        assert_eq!(responder.respond("/.well-known/acme-challenge/abc"), None);

        responder.install("abc.thumb".to_owned());
        assert_eq!(
            responder.respond("/.well-known/acme-challenge/abc").as_deref(),
            Some("abc.thumb")
        );
        assert_eq!(responder.respond("/.well-known/acme-challenge/"), None);
        assert_eq!(responder.respond("/.well-known/acme-challenge"), None);
        assert_eq!(responder.respond("/index.html"), None);
    }

    #[test]
    fn test_retired_challenge_is_not_served() {
        let responder = ChallengeResponder::new();
        let shared = responder.clone();

        responder.install("abc.thumb".to_owned());
        assert!(shared.respond("/.well-known/acme-challenge/abc").is_some());

        shared.retire();
        assert_eq!(responder.respond("/.well-known/acme-challenge/abc"), None);
    }

    #[tokio::test]
    async fn test_challenge_server() {
        let responder = ChallengeResponder::new();
        responder.install("token.key-auth".to_owned());

        let server =
            ChallengeServer::start("127.0.0.1:0".parse().unwrap(), responder.clone()).unwrap();
        let base = format!("http://{}", server.local_addr());

        let res = reqwest::get(format!("{base}/.well-known/acme-challenge/token"))
            .await
            .unwrap();
        assert_eq!(res.status(), reqwest::StatusCode::OK);
        assert_eq!(
            res.headers()[reqwest::header::CONTENT_TYPE],
            "text/plain"
        );
        assert_eq!(res.text().await.unwrap(), "token.key-auth");

        let res = reqwest::get(format!("{base}/.well-known/acme-challenge/"))
            .await
            .unwrap();
        assert_eq!(res.status(), reqwest::StatusCode::NOT_FOUND);

        responder.retire();
        let res = reqwest::get(format!("{base}/.well-known/acme-challenge/token"))
            .await
            .unwrap();
        assert_eq!(res.status(), reqwest::StatusCode::NOT_FOUND);

        server.stop().await;
    }
}
