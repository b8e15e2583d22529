//! Metadata client integration tests against a mock provider

use mood_gateway_catalog::{parse_detail, MetadataClient};
use mood_gateway_core::ContentType;
use serde_json::json;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn client_for(server: &MockServer) -> MetadataClient {
    MetadataClient::with_base_url("test-key".to_string(), server.uri(), None)
}

#[tokio::test]
async fn test_details_success_envelope() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/movie/550"))
        .and(query_param("api_key", "test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": 550,
            "title": "Fight Club",
            "overview": "An insomniac office worker.",
            "genres": [{"name": "Drama"}],
            "release_date": "1999-10-15",
            "vote_average": 8.4,
            "vote_count": 27000
        })))
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    let response = client.details(ContentType::Movie, 550).await;

    assert!(response.success);
    assert_eq!(response.status_code, 200);

    let item = parse_detail(ContentType::Movie, &response.data).unwrap();
    assert_eq!(item.title, "Fight Club");
    assert!((item.vote_average - 8.4).abs() < 1e-6);
}

#[tokio::test]
async fn test_not_found_yields_failure_with_empty_data() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/movie/999999"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "status_message": "The resource you requested could not be found."
        })))
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    let response = client.details(ContentType::Movie, 999_999).await;

    assert!(!response.success);
    assert_eq!(response.status_code, 404);
    assert_eq!(response.data, json!({}));
}

#[tokio::test]
async fn test_server_error_yields_failure() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/tv/popular"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    let response = client.popular(ContentType::Tv, 1).await;

    assert!(!response.success);
    assert_eq!(response.status_code, 500);
}

#[tokio::test]
async fn test_successful_responses_are_cached_in_process() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/movie/603"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": 603,
            "title": "The Matrix"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server).await;

    let first = client.details(ContentType::Movie, 603).await;
    let second = client.details(ContentType::Movie, 603).await;

    assert!(first.success);
    assert_eq!(first.data, second.data);
    // MockServer verifies on drop that the provider saw exactly one request
}

#[tokio::test]
async fn test_failures_are_not_cached() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/movie/42"))
        .respond_with(ResponseTemplate::new(503))
        .expect(2)
        .mount(&server)
        .await;

    let client = client_for(&server).await;

    assert!(!client.details(ContentType::Movie, 42).await.success);
    assert!(!client.details(ContentType::Movie, 42).await.success);
}

#[tokio::test]
async fn test_search_encodes_query() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/search/movie"))
        .and(query_param("query", "the good place"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "page": 1,
            "results": [{"id": 1, "title": "The Good Place", "vote_average": 7.9}],
            "total_pages": 1,
            "total_results": 1
        })))
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    let response = client.search(ContentType::Movie, "the good place", 1).await;

    assert!(response.success);
    assert_eq!(response.data["results"][0]["id"], 1);
}
