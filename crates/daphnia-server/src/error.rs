//! Error types for the server binary.
//!
//! [`ServerError`] wraps every failure that can abort startup or end the
//! process, so `main` can propagate with `?`.

/// Top-level error for the server binary.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Configuration loading failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: daphnia_core::ConfigError,
    },

    /// Building, loading, or saving the universe failed.
    #[error("universe error: {source}")]
    Universe {
        /// The underlying grid error.
        #[from]
        source: daphnia_ether::EtherError,
    },

    /// The configured host is not an IP address.
    #[error("invalid host address {host}: {source}")]
    InvalidHost {
        /// The rejected value.
        host: String,
        /// The parse failure.
        source: std::net::AddrParseError,
    },

    /// Binding the client endpoints failed.
    #[error("session error: {source}")]
    Session {
        /// The underlying session error.
        #[from]
        source: daphnia_session::SessionError,
    },

    /// The tick loop failed.
    #[error("scheduler error: {source}")]
    Scheduler {
        /// The underlying scheduler error.
        #[from]
        source: daphnia_core::SchedulerError,
    },

    /// The admin API failed to start or crashed.
    #[error("admin error: {source}")]
    Admin {
        /// The underlying serve error.
        #[from]
        source: daphnia_admin::ServeError,
    },

    /// A background task was cancelled or panicked.
    #[error("task error: {source}")]
    Join {
        /// The underlying join error.
        #[from]
        source: tokio::task::JoinError,
    },
}
