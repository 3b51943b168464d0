//! Diagnostic HTTP surface: routing, page rendering and request parsing.
//!
//! Platform independent.  `adapters::http` registers one catch-all handler
//! with the ESP-IDF server and forwards every request except the streamed
//! `POST /update` to [`WebFrontend::handle`].
//!
//! | Path            | Method | Result                                          |
//! |-----------------|--------|-------------------------------------------------|
//! | `/`             | any    | HTML status page, refreshes every 5 s           |
//! | `/status.json`  | GET    | same snapshot as JSON                           |
//! | `/config.html`  | any    | force-config signal, device restarts next tick  |
//! | `/update`       | POST   | signed firmware upload (handled by the adapter) |
//! | anything else   | any    | 404 with a plaintext dump of the request        |

use core::fmt::{self, Write as _};
use std::sync::Arc;

use crate::app::commands::ControlSignal;
use crate::control::{ControlInbox, StatusSnapshot};

pub const UPDATE_PATH: &str = "/update";
pub const SIGNATURE_HEADER: &str = "X-Ota-Signature";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
    Other,
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
            Self::Other => "OTHER",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Status,
    StatusJson,
    ForceConfig,
    Update,
    NotFound,
}

pub fn route(method: HttpMethod, path: &str) -> Route {
    match (method, path) {
        (_, "/") => Route::Status,
        (HttpMethod::Get, "/status.json") => Route::StatusJson,
        (_, "/config.html") => Route::ForceConfig,
        (HttpMethod::Post, UPDATE_PATH) => Route::Update,
        _ => Route::NotFound,
    }
}

/// A fully rendered response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub content_type: &'static str,
    pub body: String,
}

impl Response {
    pub fn html(body: String) -> Self {
        Self {
            status: 200,
            content_type: "text/html; charset=utf-8",
            body,
        }
    }

    pub fn text(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            content_type: "text/plain; charset=utf-8",
            body: body.into(),
        }
    }
}

/// Request dispatcher shared with the HTTP server task.
#[derive(Clone)]
pub struct WebFrontend {
    inbox: Arc<ControlInbox>,
}

impl WebFrontend {
    pub fn new(inbox: Arc<ControlInbox>) -> Self {
        Self { inbox }
    }

    /// Handle everything but the firmware upload.  Only enqueues signals
    /// and reads the last published snapshot; never blocks the tick.
    pub fn handle(&self, method: HttpMethod, uri: &str) -> Response {
        let (path, args) = split_uri(uri);
        match route(method, path) {
            Route::Status => Response::html(render_status_page(&self.inbox.status())),
            Route::StatusJson => match serde_json::to_string(&self.inbox.status()) {
                Ok(body) => Response {
                    status: 200,
                    content_type: "application/json",
                    body,
                },
                Err(e) => Response::text(500, e.to_string()),
            },
            Route::ForceConfig => {
                log::info!("web: force-config requested");
                self.inbox.push(ControlSignal::ForceConfig);
                Response::text(200, "Restarting into configuration portal\n")
            }
            Route::Update => Response::text(400, "firmware upload needs a request body\n"),
            Route::NotFound => Response::text(404, render_not_found(path, method, &args)),
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Rendering
// ───────────────────────────────────────────────────────────────

const STYLE: &str = "body { background-color: #FFFFFF; font-family: Arial, Helvetica, Sans-Serif; color: #000088; }\
table { border-collapse: collapse; }\
th, td { text-align: left; padding: 8px; }\
tr:nth-child(even) { background-color: #f2f2f2; }";

pub fn render_status_page(s: &StatusSnapshot) -> String {
    let (broker, port) = match s.broker {
        Some(b) => (b.address.to_string(), b.port.to_string()),
        None => ("-".to_owned(), "-".to_owned()),
    };

    let mut page = String::with_capacity(1600);
    let _ = write!(
        page,
        "<html><head><meta http-equiv='refresh' content='5'/><title>{name}</title>\
         <style>{STYLE}</style></head><body>\
         <h1 style='color: #5e9ca0;'>{name}</h1><h2>Status</h2><table><tbody>\
         <tr><td>MQTT server:</td><td>{broker}</td></tr>\
         <tr><td>MQTT port:</td><td>{port}</td></tr>\
         <tr><td>MQTT connected:</td><td>{connected}</td></tr>\
         <tr><td>Link:</td><td>{link}</td></tr>\
         <tr><td>Topic prefix:</td><td>{prefix}</td></tr>\
         </tbody></table><h2>Statistics</h2><table><tbody>\
         <tr><td>UpTime</td><td>{uptime}</td></tr>\
         <tr><td>Loops</td><td>{ticks}</td></tr>\
         <tr><td>Failed loops</td><td>{failures}</td></tr>\
         <tr><td>Pongs</td><td>{pongs}</td></tr>\
         </tbody></table><h2>Topics</h2><table><tbody>",
        name = Escaped(&s.name),
        connected = if s.connected { "Yes" } else { "No" },
        link = s.link,
        prefix = Escaped(&s.prefix),
        uptime = s.uptime,
        ticks = s.ticks,
        failures = s.failures,
        pongs = s.pongs,
    );
    for topic in &s.topics {
        let _ = write!(page, "<tr><td>{}</td></tr>", Escaped(topic));
    }
    page.push_str(
        "</tbody></table><hr /><p><a href='/config.html'>Change config</a></p></body></html>",
    );
    page
}

/// Plaintext dump of an unmatched request.
pub fn render_not_found(path: &str, method: HttpMethod, args: &[(String, String)]) -> String {
    let mut msg = format!(
        "File Not Found\n\nURI: {path}\nMethod: {method}\nArguments: {}\n",
        args.len()
    );
    for (name, value) in args {
        let _ = writeln!(msg, " {name}: {value}");
    }
    msg
}

/// HTML page of the provisioning portal.
pub fn render_portal_page(ap_name: &str, error: Option<&str>) -> String {
    let mut page = format!(
        "<html><head><title>{name} setup</title><style>{STYLE}</style></head><body>\
         <h1 style='color: #5e9ca0;'>{name}</h1><h2>Wi-Fi</h2>",
        name = Escaped(ap_name),
    );
    if let Some(e) = error {
        let _ = write!(page, "<p style='color: #aa0000;'>{}</p>", Escaped(e));
    }
    page.push_str(
        "<form method='POST' action='/wifi'>\
         <p>SSID <input name='ssid' maxlength='32'/></p>\
         <p>Password <input name='password' type='password' maxlength='64'/></p>\
         <p><input type='submit' value='Save'/></p></form></body></html>",
    );
    page
}

struct Escaped<'a>(&'a str);

impl fmt::Display for Escaped<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for c in self.0.chars() {
            match c {
                '<' => f.write_str("&lt;")?,
                '>' => f.write_str("&gt;")?,
                '&' => f.write_str("&amp;")?,
                '\'' => f.write_str("&#39;")?,
                '"' => f.write_str("&quot;")?,
                c => f.write_char(c)?,
            }
        }
        Ok(())
    }
}

// ───────────────────────────────────────────────────────────────
// Parsing
// ───────────────────────────────────────────────────────────────

/// Split `path?query` into the path and decoded query arguments.
pub fn split_uri(uri: &str) -> (&str, Vec<(String, String)>) {
    match uri.split_once('?') {
        Some((path, query)) => (path, parse_form(query)),
        None => (uri, Vec::new()),
    }
}

/// Decode an `application/x-www-form-urlencoded` body or query string.
pub fn parse_form(input: &str) -> Vec<(String, String)> {
    input
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (k, v) = pair.split_once('=').unwrap_or((pair, ""));
            (percent_decode(k), percent_decode(v))
        })
        .collect()
}

fn percent_decode(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => out.push(b' '),
            b'%' => match bytes.get(i + 1..i + 3).and_then(|p| hex_pair(p[0], p[1])) {
                Some(b) => {
                    out.push(b);
                    i += 2;
                }
                None => out.push(b'%'),
            },
            b => out.push(b),
        }
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn hex_pair(hi: u8, lo: u8) -> Option<u8> {
    let digit = |c: u8| (c as char).to_digit(16);
    Some((digit(hi)? * 16 + digit(lo)?) as u8)
}
