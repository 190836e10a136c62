// End-to-end tests: a real HTTP feed client against a wiremock catalog,
// persistent stores on disk and the control surface driving the alert flag.

mod integration;

use restock_watcher::AppConfig;

#[test]
fn test_shipped_config_is_valid() -> anyhow::Result<()> {
    let dir = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("config");
    let config = AppConfig::load_unchecked(&dir)?;

    assert!(config.feed.max_pages > 0);
    assert!(config.scheduler.interval_secs > 0);
    assert!(!config.feed.user_agents.is_empty());
    assert_eq!(config.feed.products_pointer, "/info/products");
    Ok(())
}
