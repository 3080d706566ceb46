//! Wire-contract tests for the backend API, run through the worker
//! service so requests cross the same thread boundary the app uses.

use std::time::{Duration, Instant};

use serde_json::json;

use templot::annotations::TableSettings;
use templot::api::{
    ApiClient, ApiRequest, ApiResponse, ApiService, ExtractTablesRequest, OutcomePayload,
    RegionRequest, SaveFieldRequest,
};
use templot::geometry::PdfRect;
use templot::test_utils::ScriptedTransport;

fn service_with(transport: &ScriptedTransport) -> ApiService {
    ApiService::new(ApiClient::new(42, Box::new(transport.clone())))
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

fn field_request() -> SaveFieldRequest {
    SaveFieldRequest {
        name: "total".to_string(),
        page: 2,
        rect: PdfRect::new(10.0, 20.0, 79.0, 18.0),
        is_table: false,
        python_function: Some("clean_total".to_string()),
        table_settings: None,
        line_points: vec![],
    }
}

#[test]
fn create_goes_form_encoded_with_width_height_in_x1_y1() {
    let transport = ScriptedTransport::new();
    transport.script_json(
        "/templates/42/fields/create/",
        json!({"status": "success", "field_id": 31}),
    );
    let mut service = service_with(&transport);

    service.submit(ApiRequest::CreateField(field_request()));
    let responses = wait_for_responses(&mut service, 1);
    assert!(matches!(
        responses[0].payload,
        OutcomePayload::FieldCreated(Ok(31))
    ));

    let calls = transport.calls_to("/templates/42/fields/create/");
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].method, "POST");
    let form = calls[0].form_body.as_ref().unwrap();
    let get = |key: &str| {
        form.iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
            .unwrap()
    };
    assert_eq!(get("x"), "10");
    assert_eq!(get("y"), "20");
    assert_eq!(get("x1"), "79");
    assert_eq!(get("y1"), "18");
    assert_eq!(get("python_function"), "clean_total");
}

#[test]
fn update_and_delete_use_the_flat_field_routes() {
    let transport = ScriptedTransport::new();
    transport.script_json("/templates/fields/9/update/", json!({"status": "success"}));
    transport.script_json("/templates/fields/9/delete/", json!({"status": "success"}));
    let mut service = service_with(&transport);

    service.submit(ApiRequest::UpdateField {
        field_id: 9,
        request: field_request(),
    });
    service.submit(ApiRequest::DeleteField { field_id: 9 });
    let responses = wait_for_responses(&mut service, 2);

    assert!(matches!(
        responses[0].payload,
        OutcomePayload::FieldUpdated { field_id: 9, result: Ok(()) }
    ));
    assert!(matches!(
        responses[1].payload,
        OutcomePayload::FieldDeleted { field_id: 9, result: Ok(()) }
    ));
    assert_eq!(transport.calls_to("/templates/fields/9/update/").len(), 1);
    assert_eq!(transport.calls_to("/templates/fields/9/delete/").len(), 1);
}

#[test]
fn extract_text_sends_absolute_edges_not_extents() {
    let transport = ScriptedTransport::new();
    transport.script_json(
        "/templates/42/extract-text/",
        json!({"status": "success", "text": "$1,234"}),
    );
    let mut service = service_with(&transport);

    let region = RegionRequest::from_rect(PdfRect::new(25.0, 25.0, 50.0, 35.0), 3);
    service.submit(ApiRequest::ExtractText(region));
    let responses = wait_for_responses(&mut service, 1);
    match &responses[0].payload {
        OutcomePayload::Text(Ok(text)) => assert_eq!(text, "$1,234"),
        other => panic!("unexpected payload: {other:?}"),
    }

    let body = transport.calls_to("/templates/42/extract-text/")[0]
        .json_body
        .clone()
        .unwrap();
    assert_eq!(body["x"], json!(25.0));
    assert_eq!(body["x1"], json!(75.0));
    assert_eq!(body["y1"], json!(60.0));
    assert_eq!(body["page"], json!(3));
}

#[test]
fn extract_tables_posts_settings_and_lines_to_the_api_route() {
    let transport = ScriptedTransport::new();
    transport.script_json(
        "/api/templates/42/extract_tables/",
        json!({"tables": [{
            "rows": [["a", "b"], ["c", "d"]],
            "row_count": 2,
            "col_count": 2,
            "has_header": true,
            "bbox": [100.0, 200.0, 300.0, 300.0]
        }]}),
    );
    let mut service = service_with(&transport);

    let request = ExtractTablesRequest::new(
        PdfRect::new(100.0, 200.0, 200.0, 100.0),
        1,
        TableSettings::default(),
        vec![[150.0, 200.0, 150.0, 300.0]],
    );
    service.submit(ApiRequest::ExtractTables(request));
    let responses = wait_for_responses(&mut service, 1);
    match &responses[0].payload {
        OutcomePayload::Tables(Ok(tables)) => {
            assert_eq!(tables.len(), 1);
            assert_eq!(tables[0].bbox_rect(), PdfRect::new(100.0, 200.0, 200.0, 100.0));
        }
        other => panic!("unexpected payload: {other:?}"),
    }

    let body = transport.calls_to("/api/templates/42/extract_tables/")[0]
        .json_body
        .clone()
        .unwrap();
    assert_eq!(body["x0"], json!(100.0));
    assert_eq!(body["x1"], json!(300.0));
    assert!(body["settings"].is_object());
    assert_eq!(body["line_points"], json!([[150.0, 200.0, 150.0, 300.0]]));
}

#[test]
fn failed_statuses_surface_the_server_message() {
    let transport = ScriptedTransport::new();
    transport.script_json(
        "/templates/42/fields/create/",
        json!({"status": "error", "message": "name already taken"}),
    );
    let mut service = service_with(&transport);

    service.submit(ApiRequest::CreateField(field_request()));
    let responses = wait_for_responses(&mut service, 1);
    match &responses[0].payload {
        OutcomePayload::FieldCreated(Err(err)) => {
            assert!(err.to_string().contains("name already taken"));
        }
        other => panic!("unexpected payload: {other:?}"),
    }
}
