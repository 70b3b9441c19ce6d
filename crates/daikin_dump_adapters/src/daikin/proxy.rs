use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::Query;
use axum::http::StatusCode;
use axum::response::Html;
use axum::Router;
use daikin_dump_core::config::ProxySettings;
use daikin_dump_core::error::AuthError;
use daikin_dump_core::Error;
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio::sync::{oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Upper bound for draining open connections when stopping
const STOP_TIMEOUT: Duration = Duration::from_secs(5);

const SUCCESS_PAGE: &str =
    "<html><body><h1>Login successful</h1><p>Tokens received. You can close this window.</p></body></html>";

type CodeResult = Result<String, AuthError>;

#[derive(Debug, Deserialize)]
struct CallbackParams {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

/// Addresses the login server actually bound
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundAddrs {
    pub web: SocketAddr,
    pub callback: SocketAddr,
}

/// Local login server for interactive login.
///
/// The web interface (`web_port`) links the operator to the identity
/// provider; the provider redirects back to `/callback` on `port`, where
/// the authorization code is captured.
pub struct ProxyServer {
    settings: ProxySettings,
    running: Arc<AtomicBool>,
    shutdown_tx: Mutex<Option<watch::Sender<bool>>>,
    code_rx: Mutex<Option<oneshot::Receiver<CodeResult>>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    bound: std::sync::Mutex<Option<BoundAddrs>>,
}

impl ProxyServer {
    pub fn new(settings: ProxySettings) -> Self {
        Self {
            settings,
            running: Arc::new(AtomicBool::new(false)),
            shutdown_tx: Mutex::new(None),
            code_rx: Mutex::new(None),
            tasks: Mutex::new(Vec::new()),
            bound: std::sync::Mutex::new(None),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn bound_addrs(&self) -> Option<BoundAddrs> {
        *self.bound.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn socket_addr(&self, port: u16) -> Result<SocketAddr, Error> {
        let ip: IpAddr = self.settings.listen_bind.parse().map_err(|_| {
            Error::Configuration(format!(
                "proxy.listen_bind is not an IP address: {}",
                self.settings.listen_bind
            ))
        })?;
        Ok(SocketAddr::new(ip, port))
    }

    async fn bind(&self, port: u16) -> Result<TcpListener, Error> {
        let addr = self.socket_addr(port)?;
        TcpListener::bind(addr)
            .await
            .map_err(|e| Error::Proxy(format!("failed to bind {}: {}", addr, e)))
    }

    /// Bind both listeners and start serving.
    ///
    /// `authorize_url` is what the web interface links to; `state` is the
    /// value the callback must echo back.
    pub async fn start(&self, authorize_url: String, state: String) -> Result<(), Error> {
        if self.running.load(Ordering::SeqCst) {
            return Err(Error::Proxy("login server already running".to_string()));
        }

        // Bind before spawning so an occupied port fails the start.
        let web_listener = self.bind(self.settings.web_port).await?;
        let callback_listener = self.bind(self.settings.port).await?;
        let bound = BoundAddrs {
            web: web_listener.local_addr()?,
            callback: callback_listener.local_addr()?,
        };

        let (code_tx, code_rx) = oneshot::channel::<CodeResult>();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let web_app = web_router(authorize_url);
        let callback_app = callback_router(Arc::new(Mutex::new(Some(code_tx))), state);

        *self.code_rx.lock().await = Some(code_rx);
        *self.shutdown_tx.lock().await = Some(shutdown_tx);
        *self.bound.lock().unwrap_or_else(|e| e.into_inner()) = Some(bound);

        self.running.store(true, Ordering::SeqCst);
        info!(web = %bound.web, callback = %bound.callback, "starting login server");

        let mut tasks = self.tasks.lock().await;
        tasks.push(spawn_server(web_listener, web_app, shutdown_rx.clone(), self.running.clone()));
        tasks.push(spawn_server(callback_listener, callback_app, shutdown_rx, self.running.clone()));

        Ok(())
    }

    /// Wait for the authorization code captured by the callback endpoint
    pub async fn wait_for_code(&self) -> Result<String, Error> {
        let code_rx = self
            .code_rx
            .lock()
            .await
            .take()
            .ok_or_else(|| Error::Proxy("login server not started".to_string()))?;

        match code_rx.await {
            Ok(Ok(code)) => Ok(code),
            Ok(Err(auth_error)) => Err(Error::Authentication(auth_error)),
            Err(_) => Err(Error::Proxy(
                "login server stopped before a login completed".to_string(),
            )),
        }
    }

    /// Signal shutdown and wait for both listeners to close
    pub async fn stop(&self) -> Result<(), Error> {
        if let Some(tx) = self.shutdown_tx.lock().await.take() {
            let _ = tx.send(true);
        }

        let tasks: Vec<JoinHandle<()>> = self.tasks.lock().await.drain(..).collect();
        for mut task in tasks {
            if tokio::time::timeout(STOP_TIMEOUT, &mut task).await.is_err() {
                warn!("login server did not shut down in time, aborting");
                task.abort();
            }
        }

        self.code_rx.lock().await.take();
        self.running.store(false, Ordering::SeqCst);
        debug!("login server stopped");
        Ok(())
    }
}

fn spawn_server(
    listener: TcpListener,
    app: Router,
    mut shutdown_rx: watch::Receiver<bool>,
    running: Arc<AtomicBool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let result = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.wait_for(|stop| *stop).await;
                debug!("login server listener shutting down");
            })
            .await;

        if let Err(e) = result {
            warn!(error = %e, "login server listener failed");
        }
        running.store(false, Ordering::SeqCst);
    })
}

fn web_router(authorize_url: String) -> Router {
    let page = Html(format!(
        "<html><body><h1>Daikin Cloud login</h1>\
         <p><a href=\"{}\">Log in to Daikin Cloud</a></p></body></html>",
        html_escape_attr(&authorize_url)
    ));
    Router::new().route(
        "/",
        axum::routing::get(move || {
            let page = page.clone();
            async move { page }
        }),
    )
}

fn callback_router(code_tx: Arc<Mutex<Option<oneshot::Sender<CodeResult>>>>, state: String) -> Router {
    Router::new().route(
        "/callback",
        axum::routing::get(move |Query(params): Query<CallbackParams>| {
            let code_tx = code_tx.clone();
            let expected_state = state.clone();
            async move {
                let outcome = callback_outcome(params, &expected_state);

                let response = match &outcome {
                    Ok(_) => (StatusCode::OK, Html(SUCCESS_PAGE.to_string())),
                    Err(e) => (
                        StatusCode::BAD_REQUEST,
                        Html(format!(
                            "<html><body><h1>Login failed</h1><p>{}</p></body></html>",
                            html_escape_attr(&e.to_string())
                        )),
                    ),
                };

                // A stale or forged state must not end the login in progress.
                if outcome == Err(AuthError::StateMismatch) {
                    warn!("rejected login callback with unexpected state");
                    return response;
                }

                if let Some(tx) = code_tx.lock().await.take() {
                    info!(success = outcome.is_ok(), "received login callback");
                    let _ = tx.send(outcome);
                } else {
                    debug!("ignoring repeated login callback");
                }

                response
            }
        }),
    )
}

fn callback_outcome(params: CallbackParams, expected_state: &str) -> CodeResult {
    if let Some(error) = params.error {
        return Err(AuthError::from_oauth(
            &error,
            params.error_description.as_deref(),
        ));
    }
    if params.state.as_deref() != Some(expected_state) {
        return Err(AuthError::StateMismatch);
    }
    params
        .code
        .filter(|c| !c.is_empty())
        .ok_or_else(|| AuthError::Unknown("callback carried no authorization code".to_string()))
}

fn html_escape_attr(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('"', "&quot;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
