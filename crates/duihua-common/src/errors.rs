use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("config parse error: {0}")]
    ParseError(String),

    #[error("config validation error: {0}")]
    ValidationError(String),
}

#[derive(Debug, thiserror::Error)]
pub enum DuihuaError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("store error: {0}")]
    Store(String),

    #[error("chat error: {0}")]
    Chat(String),

    #[error("{0}")]
    Other(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_display() {
        let err = ConfigError::FileNotFound(PathBuf::from("/tmp/missing.toml"));
        assert_eq!(err.to_string(), "config file not found: /tmp/missing.toml");

        let err = ConfigError::ParseError("unexpected token".into());
        assert_eq!(err.to_string(), "config parse error: unexpected token");

        let err = ConfigError::ValidationError("presence.heartbeat_interval = 1".into());
        assert_eq!(
            err.to_string(),
            "config validation error: presence.heartbeat_interval = 1"
        );
    }

    #[test]
    fn duihua_error_from_config() {
        let config_err = ConfigError::ParseError("bad toml".into());
        let err: DuihuaError = config_err.into();
        assert!(matches!(err, DuihuaError::Config(_)));
        assert!(err.to_string().contains("bad toml"));
    }

    #[test]
    fn duihua_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file missing");
        let err: DuihuaError = io_err.into();
        assert!(matches!(err, DuihuaError::Io(_)));
        assert!(err.to_string().contains("file missing"));
    }

    #[test]
    fn duihua_error_other_variants() {
        let err = DuihuaError::Store("connection refused".into());
        assert_eq!(err.to_string(), "store error: connection refused");

        let err = DuihuaError::Chat("not a member".into());
        assert_eq!(err.to_string(), "chat error: not a member");

        let err = DuihuaError::Other("something went wrong".into());
        assert_eq!(err.to_string(), "something went wrong");
    }
}
