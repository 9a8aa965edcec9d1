//! HTTP server, request dispatch and graceful shutdown.
//!
//! # Request lifecycle
//!
//! 1. The body is read in full, bounded by `max_post_memory` and the read
//!    timeout.
//! 2. A [`Context`] is checked out of the pool and reset with the request.
//! 3. Methods outside [`Method::SUPPORTED`] get a single `405` stage. A
//!    lookup miss gets a single `404` stage. Otherwise the route's chain is
//!    installed.
//! 4. [`Context::next`] drives the chain; the response is taken from the
//!    context, the access record is written, and the context goes back to
//!    the pool when the guard drops.
//!
//! # Graceful shutdown
//!
//! SIGTERM, Ctrl-C or [`ServerHandle::stop`] all do the same thing:
//! 1. Stop `listener.accept()`. No new connections are taken.
//! 2. Ask every open connection to close once its in-flight request is done.
//! 3. Wait for every connection task, then return from `run`.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use http::StatusCode;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::Body;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo, TokioTimer};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::timeout;
use tokio_rustls::TlsAcceptor;
use tracing::{debug, error, info, warn};

use crate::access_log::{AccessLog, AccessRecord};
use crate::config::HttpConfig;
use crate::context::Context;
use crate::error::Error;
use crate::handler::{IntoStages, Stage, stage};
use crate::io::WriteTimeout;
use crate::method::Method;
use crate::options::Options;
use crate::pool::{ContextPool, DEFAULT_POOL_CAPACITY};
use crate::request::Request;
use crate::response::{Response, reason};
use crate::router::Router;
use crate::tls;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// The HTTP server.
///
/// Build it with [`Server::new`], register routes, then call
/// [`run`](Server::run) or [`run_tls`](Server::run_tls). Registration
/// consumes and returns `self`, so routes chain naturally:
///
/// ```rust,no_run
/// use tyrion::{Context, Options, Server, StatusCode};
///
/// # async fn start() -> Result<(), tyrion::Error> {
/// Server::new(Options::default())?
///     .get("/hello", |c: &mut Context| c.string(StatusCode::OK, "hi"))
///     .run()
///     .await
/// # }
/// ```
pub struct Server {
    options: Arc<Options>,
    addr: SocketAddr,
    router: Router,
    access_log: Option<AccessLog>,
    shutdown: Arc<watch::Sender<bool>>,
}

/// Stops a running [`Server`] from elsewhere.
#[derive(Clone)]
pub struct ServerHandle {
    shutdown: Arc<watch::Sender<bool>>,
}

impl ServerHandle {
    /// Starts a graceful shutdown. Calling it before the server runs makes
    /// `run` return right after binding.
    pub fn stop(&self) {
        self.shutdown.send_replace(true);
    }
}

impl Server {
    /// Resolves `opts` against the defaults and validates them.
    ///
    /// Fails on a partial TLS pair, an unparsable bind address, or an access
    /// log that cannot be opened.
    pub fn new(opts: Options) -> Result<Self, Error> {
        let options = opts.resolved();
        options.validate()?;
        let addr = options.socket_addr()?;
        let access_log = if options.access_log.enabled {
            Some(AccessLog::open(&options.access_log)?)
        } else {
            None
        };
        let (shutdown, _) = watch::channel(false);

        Ok(Self {
            router: Router::new(options.ignore_path_last_slash),
            options: Arc::new(options),
            addr,
            access_log,
            shutdown: Arc::new(shutdown),
        })
    }

    /// Like [`new`](Server::new), with options read from the `[http]` table
    /// of a TOML file.
    pub fn from_config(path: impl AsRef<Path>) -> Result<Self, Error> {
        let opts = Options::try_from(HttpConfig::from_file(path)?)?;
        Self::new(opts)
    }

    /// Replaces the access log chosen by the options.
    pub fn with_access_log(mut self, log: AccessLog) -> Self {
        self.access_log = Some(log);
        self
    }

    /// The resolved options.
    pub fn opts(&self) -> &Options { &self.options }
    pub fn addr(&self) -> SocketAddr { self.addr }

    pub fn handle(&self) -> ServerHandle {
        ServerHandle { shutdown: Arc::clone(&self.shutdown) }
    }

    pub fn stop(&self) {
        self.handle().stop();
    }

    // ── registration ─────────────────────────────────────────────────────────

    /// Registers `stages` for `method` and `pattern`. The path is matched
    /// exactly, ignoring case.
    pub fn route(mut self, method: Method, pattern: &str, stages: impl IntoStages) -> Self {
        self.router.register(method, pattern, stages.into_stages());
        self
    }

    /// Registers a declarative route list.
    pub fn routes<'a>(mut self, routes: impl IntoIterator<Item = (Method, &'a str, Vec<Stage>)>) -> Self {
        for (method, pattern, stages) in routes {
            self.router.register(method, pattern, stages);
        }
        self
    }

    pub fn get(self, pattern: &str, stages: impl IntoStages) -> Self {
        self.route(Method::Get, pattern, stages)
    }

    pub fn head(self, pattern: &str, stages: impl IntoStages) -> Self {
        self.route(Method::Head, pattern, stages)
    }

    pub fn post(self, pattern: &str, stages: impl IntoStages) -> Self {
        self.route(Method::Post, pattern, stages)
    }

    pub fn put(self, pattern: &str, stages: impl IntoStages) -> Self {
        self.route(Method::Put, pattern, stages)
    }

    pub fn patch(self, pattern: &str, stages: impl IntoStages) -> Self {
        self.route(Method::Patch, pattern, stages)
    }

    pub fn delete(self, pattern: &str, stages: impl IntoStages) -> Self {
        self.route(Method::Delete, pattern, stages)
    }

    pub fn options(self, pattern: &str, stages: impl IntoStages) -> Self {
        self.route(Method::Options, pattern, stages)
    }

    /// Registers the same chain for GET, POST, PUT and DELETE.
    pub fn any(mut self, pattern: &str, stages: impl IntoStages) -> Self {
        let stages = stages.into_stages();
        for method in Method::ANY {
            self.router.register(method, pattern, stages.clone());
        }
        self
    }

    // ── serving ──────────────────────────────────────────────────────────────

    /// Binds the configured address and serves plain HTTP until shutdown.
    pub async fn run(self) -> Result<(), Error> {
        let listener = TcpListener::bind(self.addr).await?;
        self.serve_with(listener, None).await
    }

    /// Binds the configured address and serves HTTPS until shutdown.
    ///
    /// Fails before binding unless both the certificate and the key are
    /// configured and load cleanly.
    pub async fn run_tls(self) -> Result<(), Error> {
        let Some((cert, key)) = self.options.tls_pair() else {
            return Err(Error::InvalidTls("run_tls needs both a certificate and a key file"));
        };
        let acceptor = tls::load_acceptor(cert, key)?;
        let listener = TcpListener::bind(self.addr).await?;
        self.serve_with(listener, Some(acceptor)).await
    }

    /// Serves plain HTTP on an already bound listener.
    pub async fn serve(self, listener: TcpListener) -> Result<(), Error> {
        self.serve_with(listener, None).await
    }

    async fn serve_with(self, listener: TcpListener, tls: Option<TlsAcceptor>) -> Result<(), Error> {
        let local_addr = listener.local_addr()?;
        let shutdown = Arc::clone(&self.shutdown);
        let dispatcher = Arc::new(self.into_dispatcher());

        info!(
            addr = %local_addr,
            routes = dispatcher.router.len(),
            tls = tls.is_some(),
            "tyrion listening"
        );

        let mut tasks = JoinSet::new();

        let signal = shutdown_signal();
        tokio::pin!(signal);
        let stop = stopped(shutdown.subscribe());
        tokio::pin!(stop);

        loop {
            tokio::select! {
                // Shutdown arms first: once stopping, queued connections are
                // left unaccepted.
                biased;

                () = &mut signal => {
                    info!(in_flight = tasks.len(), "shutdown signal received, draining connections");
                    break;
                }

                () = &mut stop => {
                    info!(in_flight = tasks.len(), "stop requested, draining connections");
                    break;
                }

                res = listener.accept() => {
                    let (stream, peer) = match res {
                        Ok(v) => v,
                        Err(e) => {
                            error!("accept error: {e}");
                            continue;
                        }
                    };

                    let dispatcher = Arc::clone(&dispatcher);
                    let stop = shutdown.subscribe();
                    let tls = tls.clone();

                    tasks.spawn(async move {
                        let Some(acceptor) = tls else {
                            serve_connection(stream, peer, dispatcher, stop).await;
                            return;
                        };
                        let handshake = timeout(dispatcher.options.read_timeout, acceptor.accept(stream));
                        match handshake.await {
                            Ok(Ok(stream)) => serve_connection(stream, peer, dispatcher, stop).await,
                            Ok(Err(e)) => debug!(%peer, "tls handshake failed: {e}"),
                            Err(_) => debug!(%peer, "tls handshake timed out"),
                        }
                    });
                }

                Some(res) = tasks.join_next(), if !tasks.is_empty() => {
                    if let Err(e) = res {
                        error!("connection task failed: {e}");
                    }
                }
            }
        }

        // Connections still open get a graceful close.
        shutdown.send_replace(true);
        while tasks.join_next().await.is_some() {}

        info!("tyrion stopped");
        Ok(())
    }

    fn into_dispatcher(self) -> Dispatcher {
        Dispatcher {
            pool: Arc::new(ContextPool::new(Arc::clone(&self.options), DEFAULT_POOL_CAPACITY)),
            router: self.router,
            access_log: self.access_log,
            options: self.options,
            not_found: fallback(StatusCode::NOT_FOUND),
            not_allowed: fallback(StatusCode::METHOD_NOT_ALLOWED),
        }
    }
}

// ── Connection handling ───────────────────────────────────────────────────────

async fn serve_connection<I>(
    io: I,
    peer: SocketAddr,
    dispatcher: Arc<Dispatcher>,
    stop: watch::Receiver<bool>,
) where
    I: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let read_timeout = dispatcher.options.read_timeout;
    let io = TokioIo::new(WriteTimeout::new(io, dispatcher.options.write_timeout));

    // Called once per request on the connection.
    let svc = service_fn(move |req| {
        let dispatcher = Arc::clone(&dispatcher);
        async move { Ok::<_, Infallible>(dispatcher.dispatch(req, Some(peer)).await) }
    });

    // HTTP/1.1 and HTTP/2, whichever the client speaks.
    let mut builder = ConnBuilder::new(TokioExecutor::new());
    builder.http1().timer(TokioTimer::new()).header_read_timeout(read_timeout);

    let conn = builder.serve_connection(io, svc);
    tokio::pin!(conn);

    let result = tokio::select! {
        res = conn.as_mut() => res,
        () = stopped(stop) => {
            conn.as_mut().graceful_shutdown();
            conn.await
        }
    };
    if let Err(e) = result {
        debug!(%peer, "connection error: {e}");
    }
}

// ── Request dispatch ──────────────────────────────────────────────────────────

/// State shared by every connection of a running server.
struct Dispatcher {
    options: Arc<Options>,
    router: Router,
    pool: Arc<ContextPool>,
    access_log: Option<AccessLog>,
    not_found: Arc<[Stage]>,
    not_allowed: Arc<[Stage]>,
}

impl Dispatcher {
    /// Routes one request and produces one response. Never fails: every
    /// problem ends up as a status code on this response.
    async fn dispatch<B>(
        &self,
        req: http::Request<B>,
        peer: Option<SocketAddr>,
    ) -> http::Response<Full<Bytes>>
    where
        B: Body,
        B::Error: Into<BoxError>,
    {
        let started = Instant::now();
        let (parts, body) = req.into_parts();
        let (body, failure) = match self.read_body(body).await {
            Ok(body) => (body, None),
            Err(status) => (Bytes::new(), Some(status)),
        };

        let mut ctx = self.pool.acquire();
        ctx.reset(Request::from_parts(parts, body, peer), Response::new());

        let stages = match failure {
            Some(status) => fallback(status),
            None => self.resolve(ctx.method(), ctx.path()),
        };
        ctx.set_stages(stages);
        ctx.next();

        let response = ctx.take_response();
        let status = response.status().as_u16();

        if let Some(log) = &self.access_log {
            let ip = ctx.ip();
            let record = AccessRecord::new(
                ctx.method().as_str(),
                status,
                ctx.path(),
                &ip,
                started.elapsed(),
            );
            log.record(&record);
        }
        debug!(method = %ctx.method(), path = ctx.path(), status, "request served");

        response.into_http()
    }

    fn resolve(&self, method: &http::Method, path: &str) -> Arc<[Stage]> {
        match Method::from_http(method) {
            Some(method) if method.is_supported() => self
                .router
                .lookup(method, path)
                .unwrap_or_else(|| Arc::clone(&self.not_found)),
            _ => Arc::clone(&self.not_allowed),
        }
    }

    async fn read_body<B>(&self, body: B) -> Result<Bytes, StatusCode>
    where
        B: Body,
        B::Error: Into<BoxError>,
    {
        let limit = usize::try_from(self.options.max_post_memory).unwrap_or(usize::MAX);
        match timeout(self.options.read_timeout, Limited::new(body, limit).collect()).await {
            Ok(Ok(collected)) => Ok(collected.to_bytes()),
            Ok(Err(e)) if e.is::<LengthLimitError>() => Err(StatusCode::PAYLOAD_TOO_LARGE),
            Ok(Err(e)) => {
                warn!("reading request body failed: {e}");
                Err(StatusCode::BAD_REQUEST)
            }
            Err(_) => Err(StatusCode::REQUEST_TIMEOUT),
        }
    }
}

/// A one-stage chain answering `status` with its reason phrase.
fn fallback(status: StatusCode) -> Arc<[Stage]> {
    Arc::from([stage(move |c: &mut Context| {
        c.string(status, reason(status));
        c.abort();
    })])
}

// ── Shutdown signals ──────────────────────────────────────────────────────────

/// Resolves once the shutdown flag is raised. Pends forever if the sender is
/// gone without raising it.
async fn stopped(mut rx: watch::Receiver<bool>) {
    while !*rx.borrow_and_update() {
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Resolves on the first SIGTERM or Ctrl-C. A handler that cannot be
/// installed is logged and never fires.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("cannot install Ctrl-C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let sigterm = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("cannot install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c  => {}
        () = sigterm => {}
    }
}

#[cfg(test)]
mod tests {
    use std::pin::Pin;
    use std::sync::{Arc, Mutex};
    use std::task::Poll;
    use std::time::Duration;

    use http::header::CONTENT_TYPE;
    use hyper::body::Frame;

    use super::*;

    type Trace = Arc<Mutex<Vec<&'static str>>>;

    fn server() -> Server {
        Server::new(Options { addr: "127.0.0.1:0".into(), ..Options::default() }).unwrap()
    }

    fn request(method: &str, uri: &str, body: &'static str) -> http::Request<Full<Bytes>> {
        http::Request::builder()
            .method(method)
            .uri(uri)
            .body(Full::new(Bytes::from_static(body.as_bytes())))
            .unwrap()
    }

    async fn send(dispatcher: &Dispatcher, req: http::Request<Full<Bytes>>) -> (StatusCode, String) {
        let resp = dispatcher.dispatch(req, None).await;
        let status = resp.status();
        let body = resp.into_body().collect().await.unwrap().to_bytes();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn chained_stages_run_in_order() {
        let trace = Trace::default();
        let a = {
            let trace = Arc::clone(&trace);
            move |_: &mut Context| trace.lock().unwrap().push("a")
        };
        let b = {
            let trace = Arc::clone(&trace);
            move |c: &mut Context| {
                trace.lock().unwrap().push("b");
                c.string(StatusCode::OK, "hi");
            }
        };
        let dispatcher = server().get("/hello", (a, b)).into_dispatcher();

        let (status, body) = send(&dispatcher, request("GET", "/hello", "")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "hi");
        assert_eq!(*trace.lock().unwrap(), ["a", "b"]);
    }

    #[tokio::test]
    async fn unknown_route_is_404() {
        let dispatcher = server().get("/hello", |_: &mut Context| {}).into_dispatcher();
        let (status, body) = send(&dispatcher, request("GET", "/missing", "")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, "Not Found");
    }

    #[tokio::test]
    async fn unsupported_methods_are_405_without_routing() {
        let dispatcher = server()
            .route(Method::Trace, "/echo", |c: &mut Context| c.string(StatusCode::OK, "traced"))
            .into_dispatcher();

        let (status, body) = send(&dispatcher, request("TRACE", "/echo", "")).await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(body, "Method Not Allowed");

        let (status, _) = send(&dispatcher, request("PURGE", "/echo", "")).await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn any_covers_the_four_verbs() {
        let dispatcher = server()
            .any("/thing", |c: &mut Context| c.string(StatusCode::OK, c.method().to_string()))
            .into_dispatcher();
        for method in ["GET", "POST", "PUT", "DELETE"] {
            let (status, body) = send(&dispatcher, request(method, "/thing", "")).await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(body, method);
        }
        let (status, _) = send(&dispatcher, request("PATCH", "/thing", "")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn paths_match_case_insensitively() {
        let dispatcher = server()
            .get("/Users", |c: &mut Context| c.string(StatusCode::OK, "users"))
            .into_dispatcher();
        let (status, _) = send(&dispatcher, request("GET", "/USERS?page=1", "")).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn trailing_slash_follows_options() {
        let opts = Options {
            addr: "127.0.0.1:0".into(),
            ignore_path_last_slash: true,
            ..Options::default()
        };
        let dispatcher = Server::new(opts)
            .unwrap()
            .get("/users", |c: &mut Context| c.string(StatusCode::OK, "users"))
            .into_dispatcher();
        let (status, _) = send(&dispatcher, request("GET", "/users/", "")).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn post_form_reaches_the_stage() {
        let dispatcher = server()
            .post("/login", |c: &mut Context| {
                let user = c.post("user").unwrap_or_default();
                c.string(StatusCode::OK, format!("hello {user}"));
            })
            .into_dispatcher();
        let req = http::Request::builder()
            .method("POST")
            .uri("/login")
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Full::new(Bytes::from_static(b"user=alice")))
            .unwrap();
        let (_, body) = send(&dispatcher, req).await;
        assert_eq!(body, "hello alice");
    }

    #[tokio::test]
    async fn oversized_body_is_413() {
        let opts = Options {
            addr: "127.0.0.1:0".into(),
            max_post_memory: 4,
            ..Options::default()
        };
        let dispatcher = Server::new(opts)
            .unwrap()
            .post("/upload", |c: &mut Context| c.string(StatusCode::OK, "stored"))
            .into_dispatcher();
        let (status, body) = send(&dispatcher, request("POST", "/upload", "0123456789")).await;
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(body, reason(StatusCode::PAYLOAD_TOO_LARGE));
    }

    /// A body that never yields a frame.
    struct StalledBody;

    impl Body for StalledBody {
        type Data = Bytes;
        type Error = std::io::Error;

        fn poll_frame(
            self: Pin<&mut Self>,
            _: &mut std::task::Context<'_>,
        ) -> Poll<Option<Result<Frame<Bytes>, Self::Error>>> {
            Poll::Pending
        }
    }

    /// A body whose transport fails on the first frame.
    struct BrokenBody;

    impl Body for BrokenBody {
        type Data = Bytes;
        type Error = std::io::Error;

        fn poll_frame(
            self: Pin<&mut Self>,
            _: &mut std::task::Context<'_>,
        ) -> Poll<Option<Result<Frame<Bytes>, Self::Error>>> {
            Poll::Ready(Some(Err(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset"))))
        }
    }

    fn upload_route(read_timeout: Duration) -> Dispatcher {
        let opts = Options { addr: "127.0.0.1:0".into(), read_timeout, ..Options::default() };
        Server::new(opts)
            .unwrap()
            .post("/upload", |c: &mut Context| c.string(StatusCode::OK, "stored"))
            .into_dispatcher()
    }

    async fn send_body<B>(dispatcher: &Dispatcher, body: B) -> (StatusCode, String)
    where
        B: Body,
        B::Error: Into<BoxError>,
    {
        let req = http::Request::builder().method("POST").uri("/upload").body(body).unwrap();
        let resp = dispatcher.dispatch(req, None).await;
        let status = resp.status();
        let body = resp.into_body().collect().await.unwrap().to_bytes();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn stalled_body_is_408() {
        let dispatcher = upload_route(Duration::from_millis(50));
        let (status, body) = send_body(&dispatcher, StalledBody).await;
        assert_eq!(status, StatusCode::REQUEST_TIMEOUT);
        assert_eq!(body, reason(StatusCode::REQUEST_TIMEOUT));
    }

    #[tokio::test]
    async fn broken_body_is_400() {
        let dispatcher = upload_route(Duration::from_secs(5));
        let (status, body) = send_body(&dispatcher, BrokenBody).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, reason(StatusCode::BAD_REQUEST));
    }

    #[tokio::test]
    async fn contexts_return_to_the_pool() {
        let dispatcher = server()
            .get("/a", |c: &mut Context| c.string(StatusCode::OK, "a"))
            .into_dispatcher();
        for _ in 0..3 {
            send(&dispatcher, request("GET", "/a", "")).await;
            send(&dispatcher, request("GET", "/nope", "")).await;
        }
        assert_eq!(dispatcher.pool.idle(), 1);
    }

    #[tokio::test]
    async fn access_log_records_each_request() {
        #[derive(Clone, Default)]
        struct Sink(Arc<Mutex<Vec<u8>>>);
        impl std::io::Write for Sink {
            fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
                self.0.lock().unwrap().extend_from_slice(buf);
                Ok(buf.len())
            }
            fn flush(&mut self) -> std::io::Result<()> { Ok(()) }
        }

        let sink = Sink::default();
        let dispatcher = server()
            .get("/hello", |c: &mut Context| c.string(StatusCode::OK, "hi"))
            .with_access_log(AccessLog::from_writer(sink.clone()))
            .into_dispatcher();
        let req = http::Request::builder()
            .uri("/hello")
            .header("x-forwarded-for", "203.0.113.7")
            .body(Full::new(Bytes::new()))
            .unwrap();
        send(&dispatcher, req).await;
        send(&dispatcher, request("GET", "/missing", "")).await;
        drop(dispatcher);

        let log = String::from_utf8(sink.0.lock().unwrap().clone()).unwrap();
        let lines: Vec<serde_json::Value> =
            log.lines().map(|l| serde_json::from_str(l).unwrap()).collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["method"], "GET");
        assert_eq!(lines[0]["status"], 200);
        assert_eq!(lines[0]["path"], "/hello");
        assert_eq!(lines[0]["ip"], "203.0.113.7");
        assert_eq!(lines[1]["status"], 404);
    }

    #[test]
    fn startup_rejects_bad_configuration() {
        let partial_tls = Options { tls_key_file: Some("key.pem".into()), ..Options::default() };
        assert!(matches!(Server::new(partial_tls), Err(Error::InvalidTls(_))));

        let bad_addr = Options { addr: "nowhere".into(), ..Options::default() };
        assert!(matches!(Server::new(bad_addr), Err(Error::InvalidAddr(_))));
    }

    #[tokio::test]
    async fn run_tls_without_certificates_fails_fast() {
        let err = server().run_tls().await.unwrap_err();
        assert!(matches!(err, Error::InvalidTls(_)));
    }

    #[tokio::test]
    async fn stop_before_serving_returns() {
        let server = server();
        server.stop();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let served = timeout(Duration::from_secs(5), server.serve(listener)).await;
        assert!(matches!(served, Ok(Ok(()))));
    }
}
