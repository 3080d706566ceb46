//! Worker-thread adapter between the event loop and the blocking client.
//!
//! The event loop submits `ApiRequest`s and polls `ApiResponse`s once
//! per tick; one worker thread owns the `ApiClient` and executes jobs in
//! submission order. Responses carry the `RequestId` they answer, so the
//! caller can drop answers to requests it no longer cares about.

use std::collections::HashMap;
use std::thread::JoinHandle;

use log::{debug, warn};

use crate::api::client::ApiClient;
use crate::api::error::ApiError;
use crate::api::types::{
    ConfigurationData, ExtractTablesRequest, ExtractedTable, FieldRecord, RegionRequest,
    SaveFieldRequest, SaveImageRequest, TemplateImage,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(pub u64);

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone)]
pub enum ApiRequest {
    ProbeTemplate,
    FetchPdf,
    SyncDimensions { width: f64, height: f64 },
    FetchConfiguration,
    ExtractText(RegionRequest),
    FetchField { field_id: i64 },
    CreateField(SaveFieldRequest),
    UpdateField { field_id: i64, request: SaveFieldRequest },
    DeleteField { field_id: i64 },
    ExtractTables(ExtractTablesRequest),
    ExtractImages(RegionRequest),
    SaveImage(SaveImageRequest),
    ListImages,
    DeleteImage { image_id: i64 },
}

impl ApiRequest {
    fn label(&self) -> &'static str {
        match self {
            ApiRequest::ProbeTemplate => "probe",
            ApiRequest::FetchPdf => "fetch-pdf",
            ApiRequest::SyncDimensions { .. } => "sync-dimensions",
            ApiRequest::FetchConfiguration => "fetch-configuration",
            ApiRequest::ExtractText(_) => "extract-text",
            ApiRequest::FetchField { .. } => "fetch-field",
            ApiRequest::CreateField(_) => "create-field",
            ApiRequest::UpdateField { .. } => "update-field",
            ApiRequest::DeleteField { .. } => "delete-field",
            ApiRequest::ExtractTables(_) => "extract-tables",
            ApiRequest::ExtractImages(_) => "extract-images",
            ApiRequest::SaveImage(_) => "save-image",
            ApiRequest::ListImages => "list-images",
            ApiRequest::DeleteImage { .. } => "delete-image",
        }
    }
}

#[derive(Debug)]
pub enum OutcomePayload {
    Probe(Result<(), ApiError>),
    Pdf(Result<Vec<u8>, ApiError>),
    DimensionsSynced(Result<(), ApiError>),
    Configuration(Result<ConfigurationData, ApiError>),
    Text(Result<String, ApiError>),
    Field(Result<FieldRecord, ApiError>),
    FieldCreated(Result<i64, ApiError>),
    FieldUpdated {
        field_id: i64,
        result: Result<(), ApiError>,
    },
    FieldDeleted {
        field_id: i64,
        result: Result<(), ApiError>,
    },
    Tables(Result<Vec<ExtractedTable>, ApiError>),
    Images(Result<Vec<TemplateImage>, ApiError>),
    ImageSaved(Result<(), ApiError>),
    ImageDeleted {
        image_id: i64,
        result: Result<(), ApiError>,
    },
}

#[derive(Debug)]
pub struct ApiResponse {
    pub id: RequestId,
    pub payload: OutcomePayload,
}

enum Envelope {
    Job(RequestId, ApiRequest),
    Shutdown,
}

pub struct ApiService {
    request_tx: flume::Sender<Envelope>,
    response_rx: flume::Receiver<ApiResponse>,
    worker: Option<JoinHandle<()>>,
    next_id: u64,
    pending: HashMap<RequestId, &'static str>,
}

impl ApiService {
    pub fn new(client: ApiClient) -> Self {
        let (request_tx, request_rx) = flume::unbounded::<Envelope>();
        let (response_tx, response_rx) = flume::unbounded::<ApiResponse>();

        let worker = std::thread::Builder::new()
            .name("api-worker".to_string())
            .spawn(move || worker_loop(&client, &request_rx, &response_tx))
            .ok();
        if worker.is_none() {
            warn!("failed to spawn api worker thread; requests will never complete");
        }

        Self {
            request_tx,
            response_rx,
            worker,
            next_id: 0,
            pending: HashMap::new(),
        }
    }

    /// Queue a request for the worker. Returns the id its response will
    /// carry.
    pub fn submit(&mut self, request: ApiRequest) -> RequestId {
        self.next_id += 1;
        let id = RequestId(self.next_id);
        debug!("api {} {} submitted", id, request.label());
        self.pending.insert(id, request.label());
        if self.request_tx.send(Envelope::Job(id, request)).is_err() {
            warn!("api worker is gone; request {id} dropped");
            self.pending.remove(&id);
        }
        id
    }

    /// Drain everything the worker finished since the last tick.
    pub fn poll_responses(&mut self) -> Vec<ApiResponse> {
        let mut responses = Vec::new();
        while let Ok(response) = self.response_rx.try_recv() {
            if let Some(label) = self.pending.remove(&response.id) {
                debug!("api {} {} completed", response.id, label);
            }
            responses.push(response);
        }
        responses
    }

    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.pending.len()
    }
}

impl Drop for ApiService {
    fn drop(&mut self) {
        let _ = self.request_tx.send(Envelope::Shutdown);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

fn worker_loop(
    client: &ApiClient,
    requests: &flume::Receiver<Envelope>,
    responses: &flume::Sender<ApiResponse>,
) {
    while let Ok(envelope) = requests.recv() {
        let (id, request) = match envelope {
            Envelope::Job(id, request) => (id, request),
            Envelope::Shutdown => break,
        };
        let payload = execute(client, request);
        if responses.send(ApiResponse { id, payload }).is_err() {
            break;
        }
    }
    debug!("api worker exiting");
}

fn execute(client: &ApiClient, request: ApiRequest) -> OutcomePayload {
    match request {
        ApiRequest::ProbeTemplate => OutcomePayload::Probe(client.probe_template()),
        ApiRequest::FetchPdf => OutcomePayload::Pdf(client.fetch_pdf()),
        ApiRequest::SyncDimensions { width, height } => {
            OutcomePayload::DimensionsSynced(client.sync_dimensions(width, height))
        }
        ApiRequest::FetchConfiguration => {
            OutcomePayload::Configuration(client.configuration_data())
        }
        ApiRequest::ExtractText(region) => OutcomePayload::Text(client.extract_text(region)),
        ApiRequest::FetchField { field_id } => OutcomePayload::Field(client.field(field_id)),
        ApiRequest::CreateField(request) => {
            OutcomePayload::FieldCreated(client.create_field(&request))
        }
        ApiRequest::UpdateField { field_id, request } => OutcomePayload::FieldUpdated {
            field_id,
            result: client.update_field(field_id, &request),
        },
        ApiRequest::DeleteField { field_id } => OutcomePayload::FieldDeleted {
            field_id,
            result: client.delete_field(field_id),
        },
        ApiRequest::ExtractTables(request) => {
            OutcomePayload::Tables(client.extract_tables(&request))
        }
        ApiRequest::ExtractImages(region) => {
            OutcomePayload::Images(client.extract_images(region))
        }
        ApiRequest::SaveImage(request) => OutcomePayload::ImageSaved(client.save_image(&request)),
        ApiRequest::ListImages => OutcomePayload::Images(client.list_images()),
        ApiRequest::DeleteImage { image_id } => OutcomePayload::ImageDeleted {
            image_id,
            result: client.delete_image(image_id),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::ScriptedTransport;
    use serde_json::json;
    use std::time::{Duration, Instant};

    fn service_with(transport: ScriptedTransport) -> ApiService {
        ApiService::new(ApiClient::new(42, Box::new(transport)))
    }

    fn wait_for_responses(service: &mut ApiService, count: usize) -> Vec<ApiResponse> {
        let deadline = Instant::now() + Duration::from_secs(2);
        let mut all = Vec::new();
        while all.len() < count && Instant::now() < deadline {
            all.extend(service.poll_responses());
            std::thread::sleep(Duration::from_millis(5));
        }
        all
    }

    #[test]
    fn responses_carry_the_submitted_id() {
        let transport = ScriptedTransport::new();
        transport.script_json(
            "/templates/42/get-configuration-data/",
            json!({"fields": [], "tables": [], "python_functions": []}),
        );
        let mut service = service_with(transport);

        let id = service.submit(ApiRequest::FetchConfiguration);
        assert_eq!(service.in_flight(), 1);

        let responses = wait_for_responses(&mut service, 1);
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0].id, id);
        assert!(matches!(
            responses[0].payload,
            OutcomePayload::Configuration(Ok(_))
        ));
        assert_eq!(service.in_flight(), 0);
    }

    #[test]
    fn requests_complete_in_submission_order() {
        let transport = ScriptedTransport::new();
        transport.script_json(
            "/templates/42/get-configuration-data/",
            json!({"fields": [], "tables": [], "python_functions": []}),
        );
        transport.script_json("/templates/fields/5/delete/", json!({"status": "success"}));
        let mut service = service_with(transport);

        let first = service.submit(ApiRequest::FetchConfiguration);
        let second = service.submit(ApiRequest::DeleteField { field_id: 5 });

        let responses = wait_for_responses(&mut service, 2);
        let ids: Vec<RequestId> = responses.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![first, second]);
    }

    #[test]
    fn errors_come_back_as_payloads_not_panics() {
        let transport = ScriptedTransport::new();
        // Nothing scripted: the transport reports an unknown path.
        let mut service = service_with(transport);
        service.submit(ApiRequest::FetchConfiguration);

        let responses = wait_for_responses(&mut service, 1);
        assert!(matches!(
            responses[0].payload,
            OutcomePayload::Configuration(Err(_))
        ));
    }
}
