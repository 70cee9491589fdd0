//! Default TOML config template with inline documentation comments.

/// Generate the default TOML config content with comments.
pub(crate) fn default_config_toml() -> String {
    r##"# duihua configuration
# Schema version 1
# Only override what you want to change -- missing fields use defaults.

[presence]
# heartbeat_interval = 60        # seconds, 5-3600
# status_refresh_interval = 30   # seconds, 1-3600
# stale_after = 0                # seconds; 0 keeps "online" until an explicit offline write

[conversations]
# placeholder_display_name = "unknown user"
# placeholder_photo_url = "/images/default-avatar.png"
# profile_fetch_timeout_ms = 5000  # 100-60000
# retry_delay_ms = 500             # 10-60000
# max_retry_delay_ms = 30000

[messages]
# history_limit = 200            # 1-5000

[logging]
level = "INFO"                   # DEBUG, INFO, WARNING, ERROR
"##
    .to_string()
}
