//! 订阅者只能安装一次

#[test]
fn test_try_init_once() {
    assert!(forager::observability::try_init().is_ok());
    tracing::info!("subscriber installed");
    assert!(forager::observability::try_init().is_err());
}
