use crate::dispatch::CliError;
use crate::domain::schema::ConformanceError;
use crate::engine::EngineError;

use super::print_json;

#[test]
fn cli_errors_render_the_underlying_message() {
    let err: CliError = EngineError::InvalidArgument("bad input".to_string()).into();
    assert_eq!(err.to_string(), "invalid argument: bad input");

    let err: CliError = ConformanceError::Mismatch("field 'x' is missing".to_string()).into();
    assert!(matches!(
        err,
        CliError::Engine(EngineError::SchemaMismatch(_))
    ));
    assert_eq!(err.to_string(), "schema mismatch: field 'x' is missing");
}

#[test]
fn print_json_accepts_serializable_values() {
    print_json(&serde_json::json!({"ok": true})).expect("json output should succeed");
}
