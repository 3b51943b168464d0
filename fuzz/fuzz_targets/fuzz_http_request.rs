//! Fuzz target: `WebFrontend::handle`
//!
//! Arbitrary URIs through the router, the query decoder and the 404
//! renderer.  Nothing may panic and every response carries a known status.
//!
//! cargo fuzz run fuzz_http_request

#![no_main]

use std::sync::Arc;

use libfuzzer_sys::fuzz_target;
use pinglink::control::ControlInbox;
use pinglink::web::{HttpMethod, WebFrontend, parse_form};

fuzz_target!(|data: &[u8]| {
    let Ok(uri) = core::str::from_utf8(data) else {
        return;
    };
    let web = WebFrontend::new(Arc::new(ControlInbox::new()));

    for method in [HttpMethod::Get, HttpMethod::Post, HttpMethod::Delete] {
        let response = web.handle(method, uri);
        assert!(matches!(response.status, 200 | 400 | 404));
    }

    // Form bodies share the decoder with query strings.
    let _ = parse_form(uri);
});
