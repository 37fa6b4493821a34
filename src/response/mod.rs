// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! JSON response writing.
//!
//! The forwarder never hand-assembles error payloads; it goes through a
//! [`ResponseWriter`] so the envelope format stays in one place and tests
//! can substitute a failing writer.

use std::fmt;

use bytes::Bytes;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};

use crate::core::{ProxyError, ProxyResponse};

/// Serializes a payload onto a response.
///
/// Contract: serialize the payload, set the status and content-type,
/// produce the response, and return the bytes actually written so they
/// can be handed to the response-body hook.
pub trait ResponseWriter: fmt::Debug + Send + Sync {
    /// Produce a JSON response with the given status code.
    fn write_json(
        &self,
        status: u16,
        payload: &serde_json::Value,
    ) -> Result<(ProxyResponse, Bytes), ProxyError>;
}

/// Default writer producing compact JSON with
/// `Content-Type: application/json`.
#[derive(Debug, Default)]
pub struct JsonResponseWriter;

impl ResponseWriter for JsonResponseWriter {
    fn write_json(
        &self,
        status: u16,
        payload: &serde_json::Value,
    ) -> Result<(ProxyResponse, Bytes), ProxyError> {
        let written = serde_json::to_vec(payload).map_err(|e| {
            ProxyError::ResponseError(format!("failed to serialize response payload: {e}"))
        })?;
        let written = Bytes::from(written);

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let response = ProxyResponse {
            status,
            headers,
            body: written.clone(),
        };

        Ok((response, written))
    }
}
