use phlegon::error::PhlegonError;

#[test]
fn error_constructors_group_1() {
    assert!(matches!(
        PhlegonError::config("x"),
        PhlegonError::Config { .. }
    ));
    assert!(matches!(
        PhlegonError::modbus("x"),
        PhlegonError::Modbus { .. }
    ));
    assert!(matches!(
        PhlegonError::telemetry("x"),
        PhlegonError::Telemetry { .. }
    ));
}

#[test]
fn error_constructors_group_2() {
    let ser = PhlegonError::Serialization {
        message: "s".into(),
    };
    assert!(matches!(ser, PhlegonError::Serialization { .. }));
    assert!(matches!(PhlegonError::io("x"), PhlegonError::Io { .. }));
    assert!(matches!(
        PhlegonError::network("x"),
        PhlegonError::Network { .. }
    ));
}

#[test]
fn error_constructors_group_3() {
    assert!(matches!(
        PhlegonError::validation("f", "m"),
        PhlegonError::Validation { .. }
    ));
    assert!(matches!(
        PhlegonError::timeout("x"),
        PhlegonError::Timeout { .. }
    ));
    assert!(matches!(
        PhlegonError::generic("x"),
        PhlegonError::Generic { .. }
    ));
}

#[test]
fn display_messages() {
    let e = PhlegonError::validation("field", "bad");
    let s = format!("{}", e);
    assert!(s.contains("Validation error"));
}
