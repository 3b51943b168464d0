//! HTTP server adapter.
//!
//! Binds the platform-independent [`WebFrontend`] to `EspHttpServer`.
//! Two handlers are registered, in this order so the specific route wins:
//!
//! 1. `POST /update`: streams the body into [`OtaGate::receive`].
//! 2. `/*` for every method: forwarded to [`WebFrontend::handle`].
//!
//! Handlers run on the server task and never touch the device loop
//! directly; they go through the shared `ControlInbox` and `OtaGate`.
//!
//! ## cfg gating
//!
//! - **`target_os = "espidf"`**: `esp_idf_svc::http::server`.
//! - **all other targets**: simulation stub that only logs.

use std::sync::Arc;

use log::info;

use super::ota::OtaGate;
#[cfg(target_os = "espidf")]
use crate::web::HttpMethod;
use crate::web::WebFrontend;

/// Keeps the registered handlers alive; dropping it stops the server.
pub struct HttpServer {
    #[cfg(target_os = "espidf")]
    _server: esp_idf_svc::http::server::EspHttpServer<'static>,
}

impl HttpServer {
    #[cfg(target_os = "espidf")]
    pub fn start(
        port: u16,
        frontend: WebFrontend,
        ota: Arc<OtaGate>,
        ota_password: &str,
    ) -> anyhow::Result<Self> {
        use embedded_svc::http::{Headers, Method, Query};
        use embedded_svc::io::Read;
        use esp_idf_svc::http::server::{Configuration, EspHttpServer};

        use super::ota::OtaError;
        use crate::web::{Response, SIGNATURE_HEADER, UPDATE_PATH};

        let conf = Configuration {
            http_port: port,
            stack_size: 10 * 1024,
            uri_match_wildcard: true,
            ..Default::default()
        };
        let mut server = EspHttpServer::new(&conf)?;

        let password = ota_password.to_owned();
        server.fn_handler::<anyhow::Error, _>(UPDATE_PATH, Method::Post, move |mut req| {
            let size = req
                .content_len()
                .and_then(|n| u32::try_from(n).ok())
                .unwrap_or(0);
            let signature = req.header(SIGNATURE_HEADER).unwrap_or_default().to_owned();
            info!("HTTP: firmware upload, {} bytes", size);

            let result = ota.receive(&password, size, &signature, |buf| {
                req.read(buf).map_err(|_| OtaError::ReadFailed)
            });
            let response = match result {
                Ok(n) => Response::text(200, format!("OK, {n} bytes flashed. Rebooting\n")),
                Err(e) => Response::text(e.http_status(), format!("{e}\n")),
            };
            write_response(req, &response)
        })?;

        for method in [Method::Get, Method::Post, Method::Put, Method::Delete] {
            let frontend = frontend.clone();
            server.fn_handler::<anyhow::Error, _>("/*", method, move |req| {
                let response = frontend.handle(map_method(req.method()), req.uri());
                write_response(req, &response)
            })?;
        }

        info!("HTTP: listening on port {}", port);
        Ok(Self { _server: server })
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn start(
        port: u16,
        frontend: WebFrontend,
        ota: Arc<OtaGate>,
        ota_password: &str,
    ) -> anyhow::Result<Self> {
        let _ = (frontend, ota, ota_password);
        info!("HTTP(sim): would listen on port {}", port);
        Ok(Self {})
    }
}

#[cfg(target_os = "espidf")]
fn map_method(method: embedded_svc::http::Method) -> HttpMethod {
    use embedded_svc::http::Method;
    match method {
        Method::Get => HttpMethod::Get,
        Method::Post => HttpMethod::Post,
        Method::Put => HttpMethod::Put,
        Method::Delete => HttpMethod::Delete,
        _ => HttpMethod::Other,
    }
}

/// Write a rendered [`Response`](crate::web::Response) and finish the request.
#[cfg(target_os = "espidf")]
pub(crate) fn write_response(
    req: esp_idf_svc::http::server::Request<&mut esp_idf_svc::http::server::EspHttpConnection<'_>>,
    response: &crate::web::Response,
) -> anyhow::Result<()> {
    use embedded_svc::io::Write;
    req.into_response(response.status, None, &[("Content-Type", response.content_type)])?
        .write_all(response.body.as_bytes())?;
    Ok(())
}
