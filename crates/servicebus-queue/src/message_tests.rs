//! Tests for message types.

use super::*;
use chrono::TimeZone;

// ============================================================================
// QueueName Tests
// ============================================================================

#[test]
fn test_queue_name_accepts_entity_paths() {
    assert!(QueueName::new("jobs".to_string()).is_ok());
    assert!(QueueName::new("orders.high-priority".to_string()).is_ok());
    assert!(QueueName::new("tenant-a/jobs_v2".to_string()).is_ok());
}

#[test]
fn test_queue_name_rejects_invalid_names() {
    assert!(matches!(
        QueueName::new(String::new()),
        Err(ValidationError::OutOfRange { .. })
    ));
    assert!(matches!(
        QueueName::new("a".repeat(261)),
        Err(ValidationError::OutOfRange { .. })
    ));
    assert!(matches!(
        QueueName::new("jobs queue".to_string()),
        Err(ValidationError::InvalidFormat { .. })
    ));
    assert!(matches!(
        QueueName::new("-jobs".to_string()),
        Err(ValidationError::InvalidFormat { .. })
    ));
    assert!(matches!(
        QueueName::new("jobs/".to_string()),
        Err(ValidationError::InvalidFormat { .. })
    ));
}

#[test]
fn test_message_id_requires_value() {
    assert!("".parse::<MessageId>().is_err());
    assert_eq!("m1".parse::<MessageId>().unwrap().as_str(), "m1");
}

// ============================================================================
// LockLocation Tests
// ============================================================================

#[test]
fn test_lock_location_release_url() {
    let location = LockLocation::new(
        "https://contoso.servicebus.windows.net/jobs/messages/m1/lockedfor1".to_string(),
    )
    .unwrap();

    assert_eq!(
        location.release_url(30),
        "https://contoso.servicebus.windows.net/jobs/messages/m1/lockedfor1?timeout=30"
    );
}

#[test]
fn test_lock_location_requires_absolute_url() {
    assert!(LockLocation::new("messages/m1/lock".to_string()).is_err());
    assert!(LockLocation::new("ftp://host/messages/m1".to_string()).is_err());
}

// ============================================================================
// BrokerProperties Tests
// ============================================================================

#[test]
fn test_broker_properties_minimal_header() {
    let props = BrokerProperties::from_header(r#"{"DeliveryCount":3,"MessageId":"m1"}"#).unwrap();

    assert_eq!(props.delivery_count, 3);
    assert_eq!(props.message_id, "m1");
    assert!(props.lock_token.is_none());
    assert!(props.sequence_number.is_none());
}

#[test]
fn test_broker_properties_full_header() {
    let header = r#"{
        "DeliveryCount": 1,
        "EnqueuedSequenceNumber": 0,
        "EnqueuedTimeUtc": "Mon, 13 Nov 2023 10:00:00 GMT",
        "LockToken": "9b3a6d5e-6b3e-4d2c-9a0b-000000000001",
        "LockedUntilUtc": "Mon, 13 Nov 2023 10:01:00 GMT",
        "MessageId": "abc",
        "SequenceNumber": 42,
        "State": "Active",
        "TimeToLive": 1209600
    }"#;

    let props = BrokerProperties::from_header(header).unwrap();

    assert_eq!(props.message_id, "abc");
    assert_eq!(props.sequence_number, Some(42));
    assert_eq!(props.state.as_deref(), Some("Active"));
    assert_eq!(
        props.lock_token.as_deref(),
        Some("9b3a6d5e-6b3e-4d2c-9a0b-000000000001")
    );
}

#[test]
fn test_broker_properties_missing_delivery_count_is_rejected() {
    assert!(BrokerProperties::from_header(r#"{"MessageId":"m1"}"#).is_err());
}

#[test]
fn test_schedule_properties_header() {
    let at = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
    let header = ScheduleProperties::at(at).to_header().unwrap();

    assert_eq!(
        header,
        r#"{"ScheduledEnqueueTimeUtc":"2024-01-02T03:04:05+00:00"}"#
    );
}

// ============================================================================
// Delay Tests
// ============================================================================

#[test]
fn test_delay_resolution() {
    let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();

    assert_eq!(Delay::from(90u64).seconds_from(now), 90);
    assert_eq!(Delay::from(Duration::minutes(2)).seconds_from(now), 120);
    assert_eq!(
        Delay::from(now + Duration::seconds(45)).seconds_from(now),
        45
    );
}

#[test]
fn test_delay_in_the_past_resolves_to_zero() {
    let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();

    assert_eq!(Delay::Until(now - Duration::hours(1)).seconds_from(now), 0);
    assert_eq!(Delay::Duration(Duration::seconds(-5)).seconds_from(now), 0);
    assert_eq!(Delay::Until(now - Duration::hours(1)).resolve(now), now);
}

#[test]
fn test_delay_resolve_instant() {
    let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();

    assert_eq!(
        Delay::Seconds(3600).resolve(now),
        Utc.with_ymd_and_hms(2024, 1, 1, 1, 0, 0).unwrap()
    );
}
