//! HTTP gateway.
//!
//! Every operation is a `POST` of a `multipart/form-data` body to
//! `<base_url>/api/<collection>/<action>/` with an
//! `Authorization: token <api_token>` header.

use crate::backend::{Gateway, GatewayConfig};
use crate::error::{Error, Result};
use crate::types::{Fields, Operation};
use serde::Deserialize;

const USER_AGENT: &str = concat!("roster/", env!("CARGO_PKG_VERSION"));

/// Gateway backed by a blocking `ureq` agent.
pub struct HttpGateway {
    agent: ureq::Agent,
    base_url: String,
    api_token: String,
}

impl HttpGateway {
    /// Create a gateway; fails fast on a missing token or bad URL.
    pub fn new(config: GatewayConfig) -> Result<Self> {
        config.validate()?;

        // Non-2xx responses are inspected here so their bodies survive.
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .timeout_global(Some(config.timeout))
            .build()
            .into();

        Ok(Self {
            agent,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_token: config.api_token,
        })
    }

    /// Get the base URL requests are sent to.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, operation: Operation) -> String {
        format!("{}{}", self.base_url, operation.path())
    }
}

impl Gateway for HttpGateway {
    fn execute(&self, operation: Operation, fields: &Fields) -> Result<Vec<u8>> {
        let url = self.url(operation);
        let form = MultipartForm::encode(fields);

        log::debug!("POST {url} ({operation}, {} fields)", fields.len());

        let transport = |e: ureq::Error| Error::Transport {
            operation,
            message: e.to_string(),
        };

        let mut response = self
            .agent
            .post(&url)
            .header("Content-Type", form.content_type())
            .header("Authorization", format!("token {}", self.api_token))
            .header("Accept", "application/json")
            .header("User-Agent", USER_AGENT)
            .send(form.body())
            .map_err(transport)?;

        let status = response.status().as_u16();
        let body = response.body_mut().read_to_vec().map_err(transport)?;

        log::trace!("{operation} -> HTTP {status} ({} bytes)", body.len());

        check_response(operation, status, body)
    }
}

/// Turn a raw response into the body or a rejection.
///
/// The API reports some failures as a 2xx with `"status": "error"` in the
/// body; those are rejections too.
fn check_response(operation: Operation, status: u16, body: Vec<u8>) -> Result<Vec<u8>> {
    #[derive(Deserialize)]
    struct Envelope {
        status: Option<String>,
    }

    let reported_error = serde_json::from_slice::<Envelope>(&body)
        .ok()
        .and_then(|e| e.status)
        .is_some_and(|s| s == "error");

    if !(200..300).contains(&status) || reported_error {
        return Err(Error::rejected(
            operation,
            status,
            String::from_utf8_lossy(&body).into_owned(),
        ));
    }

    Ok(body)
}

/// A `multipart/form-data` body.
#[derive(Debug)]
struct MultipartForm {
    boundary: String,
    body: Vec<u8>,
}

impl MultipartForm {
    fn encode(fields: &Fields) -> Self {
        let boundary = choose_boundary(fields);
        let mut body = Vec::new();

        for (name, value) in fields {
            body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
            body.extend_from_slice(
                format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes(),
            );
            body.extend_from_slice(value.as_bytes());
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());

        Self { boundary, body }
    }

    fn content_type(&self) -> String {
        format!("multipart/form-data; boundary={}", self.boundary)
    }

    fn body(&self) -> &[u8] {
        &self.body
    }
}

/// Pick a boundary that does not occur in any field.
fn choose_boundary(fields: &Fields) -> String {
    let mut attempt = 0u32;
    loop {
        let boundary = format!("roster-form-boundary-{attempt:04}");
        let collides = fields
            .iter()
            .any(|(k, v)| k.contains(&boundary) || v.contains(&boundary));
        if !collides {
            return boundary;
        }
        attempt += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_fields() -> Fields {
        let mut fields = Fields::new();
        fields.insert("alias".into(), "admins".into());
        fields.insert("description".into(), "line one\nline two".into());
        fields
    }

    #[test]
    fn test_gateway_requires_token() {
        let result = HttpGateway::new(GatewayConfig::new(""));
        assert!(matches!(result, Err(Error::MissingCredential)));
    }

    #[test]
    fn test_gateway_trims_base_url() {
        let gateway =
            HttpGateway::new(GatewayConfig::new("t").base_url("http://localhost:8001/")).unwrap();
        assert_eq!(gateway.base_url(), "http://localhost:8001");
        assert_eq!(
            gateway.url(Operation::GroupMembers),
            "http://localhost:8001/api/group/members/"
        );
    }

    #[test]
    fn test_multipart_encoding() {
        let form = MultipartForm::encode(&sample_fields());
        let body = String::from_utf8(form.body().to_vec()).unwrap();

        assert!(form.content_type().ends_with("roster-form-boundary-0000"));
        assert!(body.contains("name=\"alias\"\r\n\r\nadmins\r\n"));
        assert!(body.contains("line one\nline two"));
        assert!(body.ends_with("--roster-form-boundary-0000--\r\n"));
    }

    #[test]
    fn test_boundary_avoids_field_content() {
        let mut fields = sample_fields();
        fields.insert("note".into(), "roster-form-boundary-0000".into());
        assert_eq!(choose_boundary(&fields), "roster-form-boundary-0001");
    }

    #[test]
    fn test_check_response_success() {
        let body = check_response(Operation::GroupMembers, 200, b"{\"identities\":[]}".to_vec());
        assert!(body.is_ok());
    }

    #[test]
    fn test_check_response_status_error() {
        let err = check_response(Operation::GroupDetails, 404, b"groupNotFound".to_vec())
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_check_response_error_envelope() {
        let err = check_response(
            Operation::GroupCreate,
            200,
            br#"{"status":"error","errorname":"aliasInUse"}"#.to_vec(),
        )
        .unwrap_err();
        assert!(err.is_conflict());
    }
}
