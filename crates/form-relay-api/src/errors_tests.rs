//! Tests for API error mapping

use super::*;
use axum::response::IntoResponse;
use form_relay_core::DestinationId;

fn status_of(error: ApiError) -> StatusCode {
    error.into_response().status()
}

#[test]
fn test_status_mapping() {
    assert_eq!(status_of(ApiError::Unauthorized), StatusCode::UNAUTHORIZED);
    assert_eq!(
        status_of(ApiError::NotFound { what: "webhook" }),
        StatusCode::NOT_FOUND
    );
    assert_eq!(
        status_of(ApiError::BadRequest {
            message: "bad".to_string()
        }),
        StatusCode::BAD_REQUEST
    );
    assert_eq!(
        status_of(ApiError::Internal {
            message: "boom".to_string()
        }),
        StatusCode::INTERNAL_SERVER_ERROR
    );
}

#[test]
fn test_subscription_error_mapping() {
    let not_found = SubscriptionError::NotFound {
        id: DestinationId::new(),
    };
    assert_eq!(status_of(not_found.into()), StatusCode::NOT_FOUND);

    let invalid = SubscriptionError::InvalidEvent {
        event: "x".to_string(),
        valid: "submission.created".to_string(),
    };
    assert_eq!(status_of(invalid.into()), StatusCode::BAD_REQUEST);

    let store = SubscriptionError::Store(StoreError::Unavailable {
        message: "db down".to_string(),
    });
    assert_eq!(status_of(store.into()), StatusCode::INTERNAL_SERVER_ERROR);
}

#[test]
fn test_provider_error_mapping() {
    let config = ProviderError::Configuration {
        provider: form_relay_core::ProviderKind::Twilio,
        message: "no recipients".to_string(),
    };
    assert_eq!(status_of(config.into()), StatusCode::BAD_REQUEST);

    let rejected = ProviderError::Rejected {
        provider: form_relay_core::ProviderKind::Notion,
        status: Some(500),
        message: "oops".to_string(),
    };
    assert_eq!(status_of(rejected.into()), StatusCode::INTERNAL_SERVER_ERROR);
}
