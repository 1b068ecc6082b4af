use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::error::{Error, Result};

pub mod addr;
pub mod link;
pub mod nat;
pub mod neigh;
pub mod routing;

/// Parses `--json` output of an iproute2 listing.
///
/// Some listings (`ip netns list`) print nothing at all when empty instead
/// of `[]`, so blank output is an empty list.
pub fn parse_list<T: DeserializeOwned>(cmd: &str, output: &str) -> Result<Vec<T>> {
    if output.trim().is_empty() {
        return Ok(Vec::new());
    }

    serde_json::from_str(output).map_err(|source| Error::Parse {
        cmd: cmd.to_owned(),
        source,
    })
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct Netns {
    pub name: String,
    #[serde(default)]
    pub id: Option<i32>,
}
