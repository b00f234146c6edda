use std::net::IpAddr;

/// Numeric last component of a node address.
///
/// IPv4 yields the last octet and IPv6 the last segment. Anything that is not
/// an IP address yields 0, so such hosts all prefer the first share.
pub fn host_number(node: &str) -> usize {
    match node.trim().parse::<IpAddr>() {
        Ok(IpAddr::V4(v4)) => v4.octets()[3] as usize,
        Ok(IpAddr::V6(v6)) => v6.segments()[7] as usize,
        Err(_) => 0,
    }
}
