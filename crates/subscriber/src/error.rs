use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("send failed: {0}")]
    SendFailed(String),
    #[error("stream closed")]
    StreamClosed,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LeaseError {
    #[error("lease add failed: {0}")]
    AddFailed(String),
    #[error("lease remove failed: {0}")]
    RemoveFailed(String),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid value for {name}: {value}")]
    Env { name: &'static str, value: String },
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("dispatcher is already running")]
    AlreadyRunning,
    #[error("request queue receiver was lost with a panicked worker")]
    QueueDetached,
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("lease error: {0}")]
    Lease(#[from] LeaseError),
    #[error("dispatch worker failed: {0}")]
    WorkerFailed(Box<DispatchError>),
    #[error("dispatch worker panicked: {0}")]
    WorkerPanicked(String),
}
