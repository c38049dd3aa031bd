use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[derive(Debug, Clone)]
enum Reply {
    Body {
        status: u16,
        content_type: &'static str,
        body: String,
    },
    Chunked {
        content_type: &'static str,
        body: Vec<u8>,
    },
    Redirect(String),
    Echo,
}

/// A path and what the server answers on it.
#[derive(Debug, Clone)]
pub struct Route {
    path: String,
    reply: Reply,
}

/// A `tiny_http` server on an ephemeral local port.
///
/// Routes match the request path with its query first, then without. Unknown
/// paths answer 404. The server stops when dropped.
pub struct FixtureServer {
    base_url: String,
    hits: Arc<Mutex<HashMap<String, usize>>>,
    shutdown: Option<mpsc::Sender<()>>,
    handle: Option<thread::JoinHandle<()>>,
}

impl FixtureServer {
    /// Starts serving `routes`.
    pub fn start(routes: Vec<Route>) -> Self {
        let server = tiny_http::Server::http("127.0.0.1:0").expect("start tiny_http server");
        let base_url = format!("http://{}", server.server_addr());
        let routes: HashMap<String, Reply> = routes.into_iter().map(|r| (r.path, r.reply)).collect();
        let hits = Arc::new(Mutex::new(HashMap::new()));

        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let served = Arc::clone(&hits);
        let handle = thread::spawn(move || loop {
            if shutdown_rx.try_recv().is_ok() {
                break;
            }

            let mut request = match server.recv_timeout(Duration::from_millis(50)) {
                Ok(Some(req)) => req,
                Ok(None) => continue,
                Err(_) => break,
            };

            let url = request.url().to_string();
            let path = url.split('?').next().unwrap_or(&url).to_string();
            *served.lock().entry(url.clone()).or_insert(0) += 1;

            let reply = routes.get(&url).or_else(|| routes.get(&path)).cloned();
            let response = match reply {
                Some(Reply::Body {
                    status,
                    content_type,
                    body,
                }) => tiny_http::Response::from_string(body)
                    .with_status_code(status)
                    .with_header(header("Content-Type", content_type)),
                Some(Reply::Chunked { content_type, body }) => tiny_http::Response::new(
                    tiny_http::StatusCode(200),
                    vec![header("Content-Type", content_type)],
                    std::io::Cursor::new(body),
                    None,
                    None,
                ),
                Some(Reply::Redirect(to)) => tiny_http::Response::from_string("")
                    .with_status_code(302)
                    .with_header(header("Location", &to)),
                Some(Reply::Echo) => {
                    let mut body = String::new();
                    let _ = request.as_reader().read_to_string(&mut body);
                    let mut echo = format!("{} {}\n", request.method(), url);
                    for h in request.headers() {
                        echo.push_str(&format!(
                            "{}: {}\n",
                            h.field.as_str().as_str().to_ascii_lowercase(),
                            h.value.as_str()
                        ));
                    }
                    echo.push('\n');
                    echo.push_str(&body);
                    tiny_http::Response::from_string(echo).with_header(header("Content-Type", "text/plain; charset=utf-8"))
                }
                None => tiny_http::Response::from_string("not found").with_status_code(404),
            };

            let _ = request.respond(response);
        });

        Self {
            base_url,
            hits,
            shutdown: Some(shutdown_tx),
            handle: Some(handle),
        }
    }

    /// An HTML page.
    pub fn html(path: &str, body: &str) -> Route {
        Self::body(path, 200, "text/html; charset=utf-8", body)
    }

    /// A JSON document.
    pub fn json(path: &str, body: &str) -> Route {
        Self::body(path, 200, "application/json", body)
    }

    /// A 200 sent with chunked transfer encoding, so without a Content-Length.
    pub fn chunked(path: &str, content_type: &'static str, body: Vec<u8>) -> Route {
        Route {
            path: path.to_string(),
            reply: Reply::Chunked { content_type, body },
        }
    }

    /// An empty response with `status`.
    pub fn status(path: &str, status: u16) -> Route {
        Self::body(path, status, "text/plain", "")
    }

    /// A 302 to `to`, which may be a path on this server.
    pub fn redirect(path: &str, to: &str) -> Route {
        Route {
            path: path.to_string(),
            reply: Reply::Redirect(to.to_string()),
        }
    }

    /// Answers with the request line, the lowercased headers and the body.
    pub fn echo(path: &str) -> Route {
        Route {
            path: path.to_string(),
            reply: Reply::Echo,
        }
    }

    fn body(path: &str, status: u16, content_type: &'static str, body: &str) -> Route {
        Route {
            path: path.to_string(),
            reply: Reply::Body {
                status,
                content_type,
                body: body.to_string(),
            },
        }
    }

    /// Base URL, `http://127.0.0.1:<port>`.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Absolute URL of `path`.
    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Requests served for `path_and_query`.
    pub fn hits(&self, path_and_query: &str) -> usize {
        self.hits.lock().get(path_and_query).copied().unwrap_or(0)
    }

    /// Requests served in total.
    pub fn total_hits(&self) -> usize {
        self.hits.lock().values().sum()
    }
}

impl Drop for FixtureServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn header(name: &str, value: &str) -> tiny_http::Header {
    tiny_http::Header::from_bytes(name.as_bytes(), value.as_bytes()).expect("build header")
}
