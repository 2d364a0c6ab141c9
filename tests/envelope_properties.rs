//! Envelope contract tests — exact wire shapes for the response types
//! and property checks for the derived math around them.

use chrono::{TimeZone, Utc};
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use serde_json::json;

use toolplane::response::{success_response, Pagination, ResponseBuilder};
use toolplane::types::{status_for_code, CorrelationId, ErrorCode, InvocationError, InvocationResult};

fn cid() -> CorrelationId {
    CorrelationId::from_string("req-1-2".to_string()).unwrap()
}

// =============================================================================
// Exact wire shapes
// =============================================================================

#[test]
fn test_success_result_wire_shape() {
    let result = InvocationResult::ok(cid(), json!({"content": "done"}), 42);
    assert_eq!(
        serde_json::to_value(&result).unwrap(),
        json!({
            "success": true,
            "correlationId": "req-1-2",
            "data": {"content": "done"},
            "duration": 42
        })
    );
}

#[test]
fn test_failure_result_wire_shape() {
    let error = InvocationError::new(ErrorCode::RateLimited, "slow down")
        .with_details(json!({"limit": 10, "remaining": 0}));
    let result = InvocationResult::fail(cid(), error, 3);
    assert_eq!(
        serde_json::to_value(&result).unwrap(),
        json!({
            "success": false,
            "correlationId": "req-1-2",
            "error": {
                "code": "RATE_LIMITED",
                "message": "slow down",
                "details": {"limit": 10, "remaining": 0}
            },
            "duration": 3
        })
    );
}

#[test]
fn test_bare_envelope_wire_shape() {
    let response = success_response(json!([1, 2]), Some(cid()), None);
    let mut wire = serde_json::to_value(&response).unwrap();
    assert!(wire.as_object_mut().unwrap().remove("timestamp").is_some());
    assert_eq!(
        wire,
        json!({
            "success": true,
            "data": [1, 2],
            "correlationId": "req-1-2"
        })
    );
}

#[test]
fn test_full_meta_wire_shape() {
    let reset = Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap();
    let response = ResponseBuilder::new()
        .data(json!([]))
        .pagination(2, 10, 25)
        .rate_limit(50, 12, reset)
        .duration(8)
        .meta("cache", json!("miss"))
        .correlation_id(cid())
        .build();

    let mut wire = serde_json::to_value(&response).unwrap();
    assert!(wire.as_object_mut().unwrap().remove("timestamp").is_some());
    assert_eq!(
        wire,
        json!({
            "success": true,
            "data": [],
            "correlationId": "req-1-2",
            "meta": {
                "duration": 8,
                "pagination": {
                    "page": 2,
                    "pageSize": 10,
                    "total": 25,
                    "totalPages": 3,
                    "hasNext": true,
                    "hasPrev": true
                },
                "rateLimit": {
                    "limit": 50,
                    "remaining": 12,
                    "resetAt": serde_json::to_value(reset).unwrap()
                },
                "cache": "miss"
            }
        })
    );
}

#[test]
fn test_plain_strings_are_not_correlation_ids() {
    assert!(!CorrelationId::is_valid("abc"));
    assert!(!CorrelationId::is_valid(""));
    assert!(!CorrelationId::is_valid("req--"));
    assert!(CorrelationId::is_valid("req-1-2"));
}

// =============================================================================
// Properties
// =============================================================================

proptest! {
    #[test]
    fn prop_native_id_form_validates(ts in any::<u64>(), suffix in "[0-9a-f]{8}") {
        // Decimal digits are a subset of the base36 alphabet.
        let id = format!("req-{ts}-{suffix}");
        prop_assert!(CorrelationId::is_valid(&id));
    }

    #[test]
    fn prop_uuid_forms_validate(bits in any::<u128>()) {
        let id = uuid::Uuid::from_u128(bits).to_string();
        prop_assert!(CorrelationId::is_valid(&id));
    }

    #[test]
    fn prop_pagination_grid_covers_total(
        page in 1u32..1000,
        page_size in 1u32..1000,
        total in 0u64..1_000_000,
    ) {
        let p = Pagination::compute(page, page_size, total);
        prop_assert_eq!(p.total_pages, total.div_ceil(u64::from(page_size)));
        prop_assert_eq!(p.has_prev, page > 1);
        prop_assert_eq!(p.has_next, u64::from(page) < p.total_pages);
        // The page grid covers the total exactly, with no spare page.
        prop_assert!(p.total_pages * u64::from(page_size) >= total);
        prop_assert!(
            total == 0 || p.total_pages.saturating_sub(1) * u64::from(page_size) < total
        );
    }

    #[test]
    fn prop_zero_page_size_never_divides(page in any::<u32>(), total in any::<u64>()) {
        let p = Pagination::compute(page, 0, total);
        prop_assert_eq!(p.total_pages, 0);
        prop_assert!(!p.has_next);
    }

    #[test]
    fn prop_status_mapping_is_total(code in "[A-Z_]{1,30}") {
        let status = status_for_code(&code);
        prop_assert!([400u16, 401, 403, 404, 409, 429, 500, 503].contains(&status));
    }
}
