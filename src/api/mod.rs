//! Backend HTTP layer: typed client, wire types, and the worker-thread
//! service that keeps network traffic off the render loop.

pub mod client;
pub mod error;
pub mod service;
pub mod types;

pub use client::{ApiClient, ApiTransport, HttpTransport, ProbeOutcome};
pub use error::ApiError;
pub use service::{ApiRequest, ApiResponse, ApiService, OutcomePayload, RequestId};
pub use types::{
    ConfigurationData, ExtractTablesRequest, ExtractedTable, FieldRecord, PythonFunction,
    RegionRequest, SaveFieldRequest, SaveImageRequest, TemplateImage,
};
