pub mod core;
pub mod error;
pub mod handle;
pub mod iproute;
pub mod route;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use crate::core::exec::{Executor, RawOutput, SystemExecutor};
pub use crate::core::tolerate;
pub use crate::error::{Error, Result};
pub use crate::iproute::IpRoute;
pub use crate::route::nat::HostNatRule;

pub fn parse_mac(mac: &str) -> Result<Vec<u8>> {
    let bytes = mac
        .split(':')
        .map(|s| u8::from_str_radix(s, 16))
        .collect::<std::result::Result<Vec<u8>, _>>()
        .map_err(|e| Error::Invalid(format!("invalid MAC address '{}': {}", mac, e)))?;

    if bytes.len() != 6 {
        return Err(Error::Invalid(format!("invalid MAC address '{}'", mac)));
    }

    Ok(bytes)
}
