use serde_json::json;

use super::invocation::{ProcedureInvocation, HEARTBEAT_HANDLE, HEARTBEAT_PROCEDURE};
use super::response::{ClientResponse, ResponseStatus};
use super::table::{ColumnInfo, ColumnType, ColumnValue, ResultTable};

#[test]
fn test_invocation_round_trip() {
    let invocation = ProcedureInvocation::new(77, "AddVote").with_params(vec![json!(14), json!("NH")]);

    let encoded = serde_json::to_vec(&invocation).unwrap();
    let decoded: ProcedureInvocation = serde_json::from_slice(&encoded).unwrap();

    assert_eq!(invocation, decoded);
}

#[test]
fn test_heartbeat_invocation() {
    let hb = ProcedureInvocation::heartbeat();
    assert_eq!(hb.client_handle, HEARTBEAT_HANDLE);
    assert_eq!(hb.procedure, HEARTBEAT_PROCEDURE);
    assert!(hb.params.is_empty());
}

#[test]
fn test_response_round_trip() {
    let mut table = ResultTable::new(vec![ColumnInfo::new("TALLY", ColumnType::BigInt)]);
    table.add_row(vec![99i64.into()]).unwrap();
    let response = ClientResponse::success(77, vec![table], 4);

    let encoded = serde_json::to_vec(&response).unwrap();
    let decoded: ClientResponse = serde_json::from_slice(&encoded).unwrap();

    assert_eq!(response, decoded);
    assert!(decoded.is_success());
}

#[test]
fn test_client_roundtrip_defaults_to_zero() {
    // A server never sends the client-side round trip; missing field must
    // deserialize as zero so the client can stamp it later.
    let wire = serde_json::json!({
        "client_handle": 5,
        "status": "success",
        "status_string": null,
        "results": [],
        "cluster_roundtrip_ms": 2
    });
    let decoded: ClientResponse = serde_json::from_value(wire).unwrap();
    assert_eq!(decoded.client_roundtrip_ms, 0);
}

#[test]
fn test_status_codes_round_trip() {
    for status in [
        ResponseStatus::Success,
        ResponseStatus::UserAbort,
        ResponseStatus::GracefulFailure,
        ResponseStatus::UnexpectedFailure,
        ResponseStatus::ConnectionLost,
        ResponseStatus::ServerUnavailable,
        ResponseStatus::ConnectionTimeout,
    ] {
        assert_eq!(ResponseStatus::from_code(status.code()), Some(status));
    }
    assert_eq!(ResponseStatus::from_code(0), None);
}

#[test]
fn test_abort_classification() {
    assert!(ResponseStatus::UserAbort.is_abort());
    assert!(ResponseStatus::GracefulFailure.is_abort());
    assert!(!ResponseStatus::Success.is_abort());
    assert!(!ResponseStatus::ConnectionLost.is_abort());
}

#[test]
fn test_table_rejects_wrong_arity() {
    let mut table = ResultTable::new(vec![
        ColumnInfo::new("A", ColumnType::BigInt),
        ColumnInfo::new("B", ColumnType::String),
    ]);
    let err = table.add_row(vec![1i64.into()]).unwrap_err();
    assert!(err.to_string().contains("expected 2 columns"));
}

#[test]
fn test_table_rejects_wrong_type() {
    let mut table = ResultTable::new(vec![ColumnInfo::new("A", ColumnType::Integer)]);
    let err = table.add_row(vec![ColumnValue::String("nope".into())]).unwrap_err();
    assert!(err.to_string().contains("column A"));
}

#[test]
fn test_table_lookup() {
    let mut table = ResultTable::new(vec![
        ColumnInfo::new("NAME", ColumnType::String),
        ColumnInfo::new("COUNT", ColumnType::BigInt),
    ]);
    table.add_row(vec!["Vote".into(), 3i64.into()]).unwrap();
    table.add_row(vec!["Lookup".into(), 8i64.into()]).unwrap();

    assert_eq!(table.value(1, "COUNT").and_then(ColumnValue::as_i64), Some(8));
    assert_eq!(table.value(0, "NAME").and_then(ColumnValue::as_str), Some("Vote"));
    assert_eq!(table.value(0, "MISSING"), None);
    assert_eq!(table.value(5, "COUNT"), None);
}
