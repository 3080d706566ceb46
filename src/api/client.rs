//! Typed client for the template backend.
//!
//! `ApiTransport` is the seam: the real transport is a blocking reqwest
//! client, tests plug in a scripted one. `ApiClient` owns the endpoint
//! paths and payload shapes and nothing else; it runs on the worker
//! thread, never on the event loop.

use log::debug;
use serde_json::json;

use crate::api::error::{self, ApiError};
use crate::api::types::{
    ConfigurationData, DimensionsRequest, ExtractTablesRequest, ExtractTablesResponse,
    ExtractTextResponse, ExtractedTable, FieldRecord, RegionRequest, SaveFieldRequest,
    SaveFieldResponse, SaveImageRequest, StatusResponse, TemplateImage,
};

/// What an auth-probe HEAD saw, before it is mapped to an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    Ok,
    /// 401, 403, or a redirect to the login page.
    AuthRequired,
    NotFound,
}

pub trait ApiTransport: Send {
    fn head(&self, path: &str) -> Result<ProbeOutcome, ApiError>;
    fn get_json(&self, path: &str) -> Result<serde_json::Value, ApiError>;
    fn post_json(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<serde_json::Value, ApiError>;
    fn post_form(
        &self,
        path: &str,
        form: &[(String, String)],
    ) -> Result<serde_json::Value, ApiError>;
    fn get_bytes(&self, path: &str) -> Result<Vec<u8>, ApiError>;
}

/// Blocking reqwest transport. Redirects are not followed: a 302 from
/// an endpoint means the session is gone and must surface as auth, not
/// as whatever the login page serves.
pub struct HttpTransport {
    base_url: String,
    csrf_token: Option<String>,
    session_cookie: Option<String>,
    client: reqwest::blocking::Client,
}

impl HttpTransport {
    pub fn new(
        base_url: impl Into<String>,
        csrf_token: Option<String>,
        session_cookie: Option<String>,
    ) -> Result<Self, ApiError> {
        let client = reqwest::blocking::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .cookie_store(true)
            .build()?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            csrf_token,
            session_cookie,
            client,
        })
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else {
            format!("{}{}", self.base_url, path)
        }
    }

    fn decorate(&self, mut req: reqwest::blocking::RequestBuilder, mutating: bool) -> reqwest::blocking::RequestBuilder {
        if let Some(cookie) = &self.session_cookie {
            req = req.header(reqwest::header::COOKIE, format!("sessionid={cookie}"));
        }
        if mutating {
            if let Some(token) = &self.csrf_token {
                req = req.header("X-CSRFToken", token.clone());
            }
        }
        req
    }

    fn check_status(
        path: &str,
        response: reqwest::blocking::Response,
    ) -> Result<reqwest::blocking::Response, ApiError> {
        let status = response.status();
        if status.is_redirection() || status == reqwest::StatusCode::UNAUTHORIZED
            || status == reqwest::StatusCode::FORBIDDEN
        {
            return Err(ApiError::AuthRequired);
        }
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(ApiError::NotFound(path.to_string()));
        }
        if !status.is_success() {
            return Err(ApiError::NetworkOrServer(format!("HTTP {status} for {path}")));
        }
        Ok(response)
    }

    fn json_of(path: &str, response: reqwest::blocking::Response) -> Result<serde_json::Value, ApiError> {
        let response = Self::check_status(path, response)?;
        let body = response.text()?;
        error::sniff_json(&body)
    }
}

impl ApiTransport for HttpTransport {
    fn head(&self, path: &str) -> Result<ProbeOutcome, ApiError> {
        let req = self.decorate(self.client.head(self.url(path)), false);
        let response = req.send()?;
        let status = response.status();
        if status.is_redirection()
            || status == reqwest::StatusCode::UNAUTHORIZED
            || status == reqwest::StatusCode::FORBIDDEN
        {
            Ok(ProbeOutcome::AuthRequired)
        } else if status == reqwest::StatusCode::NOT_FOUND {
            Ok(ProbeOutcome::NotFound)
        } else if status.is_success() {
            Ok(ProbeOutcome::Ok)
        } else {
            Err(ApiError::NetworkOrServer(format!("HTTP {status} for {path}")))
        }
    }

    fn get_json(&self, path: &str) -> Result<serde_json::Value, ApiError> {
        let req = self.decorate(self.client.get(self.url(path)), false);
        Self::json_of(path, req.send()?)
    }

    fn post_json(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<serde_json::Value, ApiError> {
        let req = self.decorate(self.client.post(self.url(path)), true).json(body);
        Self::json_of(path, req.send()?)
    }

    fn post_form(
        &self,
        path: &str,
        form: &[(String, String)],
    ) -> Result<serde_json::Value, ApiError> {
        let req = self.decorate(self.client.post(self.url(path)), true).form(form);
        Self::json_of(path, req.send()?)
    }

    fn get_bytes(&self, path: &str) -> Result<Vec<u8>, ApiError> {
        let req = self.decorate(self.client.get(self.url(path)), false);
        let response = Self::check_status(path, req.send()?)?;
        Ok(response.bytes()?.to_vec())
    }
}

pub struct ApiClient {
    template_id: i64,
    transport: Box<dyn ApiTransport>,
}

impl ApiClient {
    pub fn new(template_id: i64, transport: Box<dyn ApiTransport>) -> Self {
        Self {
            template_id,
            transport,
        }
    }

    #[must_use]
    pub fn template_id(&self) -> i64 {
        self.template_id
    }

    /// Auth probe before anything else touches the template.
    pub fn probe_template(&self) -> Result<(), ApiError> {
        let path = format!("/templates/{}/pdf/", self.template_id);
        debug!("probing template at {path}");
        match self.transport.head(&path)? {
            ProbeOutcome::Ok => Ok(()),
            ProbeOutcome::AuthRequired => Err(ApiError::AuthRequired),
            ProbeOutcome::NotFound => Err(ApiError::NotFound(format!(
                "template {}",
                self.template_id
            ))),
        }
    }

    /// The PDF binary for the external rendering engine.
    pub fn fetch_pdf(&self) -> Result<Vec<u8>, ApiError> {
        let path = format!("/templates/{}/pdf/", self.template_id);
        self.transport.get_bytes(&path)
    }

    /// Background page-dimension sync, result only logged by callers.
    pub fn sync_dimensions(&self, width: f64, height: f64) -> Result<(), ApiError> {
        let path = format!("/templates/{}/dimensions/", self.template_id);
        let body = serde_json::to_value(DimensionsRequest { width, height })?;
        let value = self.transport.post_json(&path, &body)?;
        Self::expect_success(value).map(|_| ())
    }

    pub fn configuration_data(&self) -> Result<ConfigurationData, ApiError> {
        let path = format!("/templates/{}/get-configuration-data/", self.template_id);
        let value = self.transport.get_json(&path)?;
        Ok(serde_json::from_value(value)?)
    }

    pub fn extract_text(&self, region: RegionRequest) -> Result<String, ApiError> {
        let path = format!("/templates/{}/extract-text/", self.template_id);
        let value = self.transport.post_json(&path, &serde_json::to_value(region)?)?;
        let response: ExtractTextResponse = serde_json::from_value(value)?;
        if response.status == "success" {
            Ok(response.text.unwrap_or_default())
        } else {
            Err(ApiError::NetworkOrServer(
                response.message.unwrap_or_else(|| "text extraction failed".to_string()),
            ))
        }
    }

    pub fn field(&self, field_id: i64) -> Result<FieldRecord, ApiError> {
        let path = format!("/templates/{}/fields/{}/", self.template_id, field_id);
        let value = self.transport.get_json(&path)?;
        Ok(serde_json::from_value(value)?)
    }

    /// Create; the new server-side id comes back in the response.
    pub fn create_field(&self, request: &SaveFieldRequest) -> Result<i64, ApiError> {
        let path = format!("/templates/{}/fields/create/", self.template_id);
        let form = request.to_form()?;
        let value = self.transport.post_form(&path, &form)?;
        let response: SaveFieldResponse = serde_json::from_value(value)?;
        if response.status == "success" {
            response.field_id.ok_or_else(|| {
                ApiError::Parse("create response missing field_id".to_string())
            })
        } else {
            Err(ApiError::NetworkOrServer(
                response.message.unwrap_or_else(|| "save failed".to_string()),
            ))
        }
    }

    pub fn update_field(&self, field_id: i64, request: &SaveFieldRequest) -> Result<(), ApiError> {
        let path = format!("/templates/fields/{field_id}/update/");
        let form = request.to_form()?;
        let value = self.transport.post_form(&path, &form)?;
        Self::expect_success(value).map(|_| ())
    }

    pub fn delete_field(&self, field_id: i64) -> Result<(), ApiError> {
        let path = format!("/templates/fields/{field_id}/delete/");
        let value = self.transport.post_form(&path, &[])?;
        Self::expect_success(value).map(|_| ())
    }

    pub fn extract_tables(
        &self,
        request: &ExtractTablesRequest,
    ) -> Result<Vec<ExtractedTable>, ApiError> {
        let path = format!("/api/templates/{}/extract_tables/", self.template_id);
        let value = self.transport.post_json(&path, &serde_json::to_value(request)?)?;
        let response: ExtractTablesResponse = serde_json::from_value(value)?;
        Ok(response.tables)
    }

    pub fn extract_images(&self, region: RegionRequest) -> Result<Vec<TemplateImage>, ApiError> {
        let path = format!("/templates/{}/extract-images/", self.template_id);
        let value = self.transport.post_json(&path, &serde_json::to_value(region)?)?;
        let images = value
            .get("images")
            .cloned()
            .unwrap_or_else(|| json!([]));
        Ok(serde_json::from_value(images)?)
    }

    pub fn save_image(&self, request: &SaveImageRequest) -> Result<(), ApiError> {
        let path = format!("/templates/{}/save-image/", self.template_id);
        let value = self.transport.post_json(&path, &serde_json::to_value(request)?)?;
        Self::expect_success(value).map(|_| ())
    }

    pub fn list_images(&self) -> Result<Vec<TemplateImage>, ApiError> {
        let path = format!("/templates/{}/images/", self.template_id);
        let value = self.transport.get_json(&path)?;
        let images = value
            .get("images")
            .cloned()
            .unwrap_or_else(|| json!([]));
        Ok(serde_json::from_value(images)?)
    }

    pub fn delete_image(&self, image_id: i64) -> Result<(), ApiError> {
        let path = format!("/templates/{}/images/{}/delete/", self.template_id, image_id);
        let value = self.transport.post_form(&path, &[])?;
        Self::expect_success(value).map(|_| ())
    }

    fn expect_success(value: serde_json::Value) -> Result<StatusResponse, ApiError> {
        let response: StatusResponse = serde_json::from_value(value)?;
        if response.status == "success" {
            Ok(response)
        } else {
            Err(ApiError::NetworkOrServer(response.message.unwrap_or_else(|| {
                format!("server answered status {:?}", response.status)
            })))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotations::TableSettings;
    use crate::geometry::PdfRect;
    use crate::test_utils::ScriptedTransport;

    fn client(transport: ScriptedTransport) -> ApiClient {
        ApiClient::new(42, Box::new(transport))
    }

    #[test]
    fn probe_maps_outcomes_to_errors() {
        let transport = ScriptedTransport::new();
        transport.script_head("/templates/42/pdf/", Ok(ProbeOutcome::Ok));
        assert!(client(transport).probe_template().is_ok());

        let transport = ScriptedTransport::new();
        transport.script_head("/templates/42/pdf/", Ok(ProbeOutcome::AuthRequired));
        assert!(matches!(
            client(transport).probe_template(),
            Err(ApiError::AuthRequired)
        ));

        let transport = ScriptedTransport::new();
        transport.script_head("/templates/42/pdf/", Ok(ProbeOutcome::NotFound));
        assert!(matches!(
            client(transport).probe_template(),
            Err(ApiError::NotFound(_))
        ));
    }

    #[test]
    fn create_field_returns_new_id() {
        let transport = ScriptedTransport::new();
        transport.script_json(
            "/templates/42/fields/create/",
            json!({"status": "success", "field_id": 17}),
        );
        let request = SaveFieldRequest {
            name: "total".to_string(),
            page: 1,
            rect: PdfRect::new(1.0, 2.0, 3.0, 4.0),
            is_table: false,
            python_function: None,
            table_settings: None,
            line_points: vec![],
        };
        let id = client(transport).create_field(&request).unwrap();
        assert_eq!(id, 17);
    }

    #[test]
    fn error_status_becomes_server_error_with_message() {
        let transport = ScriptedTransport::new();
        transport.script_json(
            "/templates/fields/9/update/",
            json!({"status": "error", "message": "name already taken"}),
        );
        let request = SaveFieldRequest {
            name: "dup".to_string(),
            page: 1,
            rect: PdfRect::default(),
            is_table: false,
            python_function: None,
            table_settings: None,
            line_points: vec![],
        };
        let err = client(transport).update_field(9, &request).unwrap_err();
        assert!(matches!(err, ApiError::NetworkOrServer(msg) if msg.contains("name already taken")));
    }

    #[test]
    fn extract_text_unwraps_payload() {
        let transport = ScriptedTransport::new();
        transport.script_json(
            "/templates/42/extract-text/",
            json!({"status": "success", "text": "Invoice #1001"}),
        );
        let region = RegionRequest::from_rect(PdfRect::new(10.0, 10.0, 50.0, 20.0), 1);
        let text = client(transport).extract_text(region).unwrap();
        assert_eq!(text, "Invoice #1001");
    }

    #[test]
    fn extract_tables_decodes_list() {
        let transport = ScriptedTransport::new();
        transport.script_json(
            "/api/templates/42/extract_tables/",
            json!({"tables": [{"row_count": 2, "col_count": 3,
                               "bbox": [0.0, 0.0, 100.0, 50.0]}]}),
        );
        let request = ExtractTablesRequest::new(
            PdfRect::new(0.0, 0.0, 100.0, 50.0),
            1,
            TableSettings::default(),
            vec![],
        );
        let tables = client(transport).extract_tables(&request).unwrap();
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].col_count, 3);
    }
}
