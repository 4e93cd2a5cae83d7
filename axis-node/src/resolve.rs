//! Host name lookup for endpoint descriptors, on the tokio resolver.

use axis_core::{Descriptor, Endpoint, EndpointError, ToDescriptor};
use tracing::debug;

/// Turn a descriptor into an endpoint. Address literals need no lookup; host names
/// go through `tokio::net::lookup_host`, preferring an IPv4 answer.
pub async fn resolve<D: ToDescriptor + ?Sized>(descriptor: &D) -> Result<Endpoint, EndpointError> {
    lookup(descriptor.to_descriptor()?).await
}

/// Resolve a batch. Every descriptor is parsed before any lookup starts, so a malformed
/// one fails the batch without touching the network.
pub async fn resolve_all<I, D>(descriptors: I) -> Result<Vec<Endpoint>, EndpointError>
where
    I: IntoIterator<Item = D>,
    D: ToDescriptor,
{
    let parsed = descriptors
        .into_iter()
        .map(|d| d.to_descriptor())
        .collect::<Result<Vec<_>, _>>()?;
    let mut out = Vec::with_capacity(parsed.len());
    for d in parsed {
        out.push(lookup(d).await?);
    }
    Ok(out)
}

async fn lookup(descriptor: Descriptor) -> Result<Endpoint, EndpointError> {
    let (host, port) = match descriptor {
        Descriptor::Addr(ep) => return Ok(ep),
        Descriptor::Host { host, port } => (host, port),
    };
    let addrs: Vec<_> = tokio::net::lookup_host((host.as_str(), port))
        .await
        .map_err(|e| {
            debug!(%host, "lookup failed: {e}");
            EndpointError::Unresolvable(host.clone())
        })?
        .collect();
    let chosen = addrs
        .iter()
        .find(|a| a.is_ipv4())
        .or_else(|| addrs.first())
        .ok_or_else(|| EndpointError::Unresolvable(host.clone()))?;
    debug!(%host, addr = %chosen, "resolved");
    Ok(Endpoint::from(*chosen))
}
