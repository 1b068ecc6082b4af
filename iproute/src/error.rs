use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("failed to spawn '{cmd}': {source}")]
    Spawn {
        cmd: String,
        #[source]
        source: std::io::Error,
    },

    #[error("'{cmd}' timed out after {secs}s")]
    Timeout { cmd: String, secs: u64 },

    #[error("'{cmd}' failed: {output}")]
    Exec { cmd: String, output: String },

    #[error("failed to parse output of '{cmd}': {source}")]
    Parse {
        cmd: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("{0}")]
    Invalid(String),
}

impl Error {
    /// True when the kernel query itself worked but its output was unusable.
    pub fn is_parse(&self) -> bool {
        matches!(self, Error::Parse { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;
