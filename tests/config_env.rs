use std::fs;

use questlog::config::{BackendKind, Config, CONFIG_FILE, ENV_REMOTE_KEY, ENV_REMOTE_URL};

// Only test in this binary: it mutates process-wide environment variables.
#[test]
fn env_overrides_remote_settings_before_validation() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    fs::write(
        dir.path().join(CONFIG_FILE),
        "[backend]\nkind = \"remote\"\n\n[remote]\napi_key = \"from-file\"\n",
    )?;

    std::env::set_var(ENV_REMOTE_URL, " https://env.example.co/rest/v1 ");
    std::env::set_var(ENV_REMOTE_KEY, "from-env");
    let loaded = Config::load_from_dir(dir.path());
    std::env::remove_var(ENV_REMOTE_URL);
    std::env::remove_var(ENV_REMOTE_KEY);

    let config = loaded?;
    assert_eq!(config.backend.kind, BackendKind::Remote);
    assert_eq!(config.remote.url, "https://env.example.co/rest/v1");
    assert_eq!(config.remote.api_key.as_deref(), Some("from-env"));

    // Without the override the same file is rejected: remote needs a url.
    assert!(Config::load_from_dir(dir.path()).is_err());
    Ok(())
}
