use thiserror::Error;

pub mod arp;
pub mod cache;
pub mod hostnet;
pub mod interfaces;
pub mod metrics;
pub mod mtu;
pub mod network;
pub mod runner;
pub mod server;
pub mod source;
pub mod state;

#[derive(Error, Debug)]
pub enum Error {
    #[error("command error: {0}")]
    Iproute(#[from] hvnet_iproute::Error),

    #[error("state source error: {0}")]
    Source(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid: {0}")]
    Invalid(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    /// Short lowercase name of the variant.
    pub fn metric_label(&self) -> &'static str {
        match self {
            Error::Iproute(hvnet_iproute::Error::Parse { .. }) => "parse",
            Error::Iproute(_) => "exec",
            Error::Source(_) => "source",
            Error::Io(_) => "io",
            Error::Yaml(_) | Error::Json(_) => "decode",
            Error::Invalid(_) => "invalid",
        }
    }
}
