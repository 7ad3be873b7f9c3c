//! Test doubles: an internal API on a Unix socket and a storage backend
//! speaking the session framing.

#![allow(dead_code)]

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper::{Request, Response};
use hyper_util::rt::TokioIo;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tokio::net::UnixListener;

use git_shell_gateway::api::ApiClient;
use git_shell_gateway::cli::ExitCode;
use git_shell_gateway::command::{CommandArgs, Dispatcher, ReadWriter};
use git_shell_gateway::config::ResolvedConfig;
use git_shell_gateway::protocol::{Frame, FrameCodec, FrameKind, SessionRequest};

/// A request seen by the mock API
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    /// Path including query string
    pub path: String,
    pub secret: Option<String>,
    pub body: Value,
}

type Handler = dyn Fn(&RecordedRequest) -> (u16, String) + Send + Sync;

/// Internal API double served over HTTP/1 on a Unix socket
pub struct MockApi {
    _dir: TempDir,
    pub socket: PathBuf,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
    hits: Arc<AtomicUsize>,
}

impl MockApi {
    /// Serve every request with `handler`, which returns status and body
    pub async fn start<F>(handler: F) -> Self
    where
        F: Fn(&RecordedRequest) -> (u16, String) + Send + Sync + 'static,
    {
        let dir = tempfile::tempdir().unwrap();
        let socket = dir.path().join("gitlab.socket");
        let listener = UnixListener::bind(&socket).unwrap();

        let handler: Arc<Handler> = Arc::new(handler);
        let requests = Arc::new(Mutex::new(Vec::new()));
        let hits = Arc::new(AtomicUsize::new(0));

        let (h, r, c) = (handler.clone(), requests.clone(), hits.clone());
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let (handler, requests, hits) = (h.clone(), r.clone(), c.clone());
                tokio::spawn(async move {
                    let service = service_fn(move |req: Request<Incoming>| {
                        let (handler, requests, hits) =
                            (handler.clone(), requests.clone(), hits.clone());
                        async move {
                            hits.fetch_add(1, Ordering::SeqCst);
                            let method = req.method().to_string();
                            let path = req
                                .uri()
                                .path_and_query()
                                .map(|p| p.to_string())
                                .unwrap_or_default();
                            let secret = req
                                .headers()
                                .get("Gitlab-Shared-Secret")
                                .and_then(|v| v.to_str().ok())
                                .map(str::to_string);
                            let body = req.into_body().collect().await?.to_bytes();
                            let body = serde_json::from_slice(&body).unwrap_or(Value::Null);

                            let recorded = RecordedRequest {
                                method,
                                path,
                                secret,
                                body,
                            };
                            let (status, reply) = handler(&recorded);
                            requests.lock().unwrap().push(recorded);

                            Ok::<_, hyper::Error>(
                                Response::builder()
                                    .status(status)
                                    .header("content-type", "application/json")
                                    .body(Full::new(Bytes::from(reply)))
                                    .unwrap(),
                            )
                        }
                    });
                    let _ = hyper::server::conn::http1::Builder::new()
                        .serve_connection(TokioIo::new(stream), service)
                        .await;
                });
            }
        });

        Self {
            _dir: dir,
            socket,
            requests,
            hits,
        }
    }

    pub fn url(&self) -> String {
        format!("http+unix://{}", self.socket.display())
    }

    pub fn config(&self) -> ResolvedConfig {
        ResolvedConfig::for_url(self.url())
    }

    pub fn client(&self) -> ApiClient {
        ApiClient::new(&self.config()).unwrap()
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }
}

/// What the mock storage backend does with a session
#[derive(Debug, Clone)]
pub enum BackendBehavior {
    /// Accept, echo stdin to stdout, write a stderr line, exit with status
    Echo { status: i32 },
    /// Answer the request with Reject
    Reject(String),
    /// Accept, send some stdout, then drop the connection
    DropMidStream,
    /// Accept, send `stdout` and exit without waiting for stdin, then hold
    /// the connection until the gateway closes it
    ExitEarly { stdout: &'static [u8], status: i32 },
}

/// Storage backend double on a Unix socket
pub struct MockBackend {
    _dir: TempDir,
    pub address: String,
    sessions: Arc<Mutex<Vec<SessionRequest>>>,
}

impl MockBackend {
    pub async fn start(behavior: BackendBehavior) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("backend.socket");
        let listener = UnixListener::bind(&path).unwrap();
        let sessions = Arc::new(Mutex::new(Vec::new()));

        let recorded = sessions.clone();
        tokio::spawn(async move {
            while let Ok((mut stream, _)) = listener.accept().await {
                let behavior = behavior.clone();
                let recorded = recorded.clone();
                tokio::spawn(async move {
                    let Ok(Some(frame)) = FrameCodec::read(&mut stream).await else {
                        return;
                    };
                    let request = frame.parse_request().unwrap();
                    recorded.lock().unwrap().push(request);

                    match behavior {
                        BackendBehavior::Reject(reason) => {
                            let _ = FrameCodec::write(&mut stream, &Frame::reject(&reason)).await;
                        }
                        BackendBehavior::DropMidStream => {
                            let _ = FrameCodec::write(&mut stream, &Frame::accept()).await;
                            let _ = FrameCodec::write(
                                &mut stream,
                                &Frame::stdout(Bytes::from_static(b"partial")),
                            )
                            .await;
                        }
                        BackendBehavior::ExitEarly { stdout, status } => {
                            let _ = FrameCodec::write(&mut stream, &Frame::accept()).await;
                            let _ = FrameCodec::write(
                                &mut stream,
                                &Frame::stdout(Bytes::from_static(stdout)),
                            )
                            .await;
                            let _ = FrameCodec::write(&mut stream, &Frame::exit(status)).await;
                            while let Ok(Some(_)) = FrameCodec::read(&mut stream).await {}
                        }
                        BackendBehavior::Echo { status } => {
                            FrameCodec::write(&mut stream, &Frame::accept()).await.unwrap();
                            let mut received = Vec::new();
                            while let Ok(Some(frame)) = FrameCodec::read(&mut stream).await {
                                match frame.kind {
                                    FrameKind::Stdin => received.extend_from_slice(&frame.payload),
                                    FrameKind::StdinEof => break,
                                    _ => return,
                                }
                            }
                            let _ = FrameCodec::write(
                                &mut stream,
                                &Frame::stdout(Bytes::from(received)),
                            )
                            .await;
                            let _ = FrameCodec::write(
                                &mut stream,
                                &Frame::stderr(Bytes::from_static(b"remote: done\n")),
                            )
                            .await;
                            let _ = FrameCodec::write(&mut stream, &Frame::exit(status)).await;
                        }
                    }
                });
            }
        });

        Self {
            _dir: dir,
            address: format!("unix:{}", path.display()),
            sessions,
        }
    }

    pub fn sessions(&self) -> Vec<SessionRequest> {
        self.sessions.lock().unwrap().clone()
    }
}

/// Result of one dispatched command
pub struct Outcome {
    pub code: ExitCode,
    pub out: String,
    pub err: String,
}

/// Parse and dispatch one command the way `exec` does
pub async fn run(config: ResolvedConfig, who: &str, command: &str, input: &str) -> Outcome {
    let dispatcher = Dispatcher::new(config).unwrap();
    let mut out = Vec::new();
    let mut err = Vec::new();

    let code = {
        let mut rw = ReadWriter::new(input.as_bytes(), &mut out, &mut err);
        match CommandArgs::parse(who, Some(command)) {
            Ok(args) => dispatcher.dispatch(&args, &mut rw).await,
            Err(e) => dispatcher.reject(None, &e, &mut rw).await,
        }
    };

    Outcome {
        code,
        out: String::from_utf8(out).unwrap(),
        err: String::from_utf8(err).unwrap(),
    }
}

/// Access check reply delegating to a backend at `address`
pub fn allowed_with_backend(address: &str) -> String {
    serde_json::json!({
        "status": true,
        "gl_id": "1",
        "gl_username": "alice",
        "gitaly": {
            "repository": {
                "storage_name": "storage_name",
                "relative_path": "relative_path",
                "git_object_directory": "path/to/git_object_directory",
                "git_alternate_object_directories": ["path/to/git_alternate_object_directory"],
                "gl_repository": "group/repo",
                "gl_project_path": "group/project-path"
            },
            "address": address,
            "token": "token"
        }
    })
    .to_string()
}
