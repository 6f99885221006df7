//! Endpoint discovery (ยง4.1A): resolves the client's [`crate::config::Endpoints`]
//! configuration down to one concrete node address with role metadata.

use crate::{config::Endpoints, error::DiscoveryError};
use std::net::SocketAddr;
use tracing::{debug, warn};

/// A candidate node's reported role, used to satisfy `requireMaster`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeRole {
    Leader,
    Follower,
    ReadOnlyReplica,
}

/// A resolved, connectable node endpoint.
#[derive(Debug, Clone)]
pub struct DiscoveredEndpoint {
    pub addr: SocketAddr,
    pub host: String,
    pub role: NodeRole,
}

/// Resolves `endpoints` to a single node to connect to, honoring `require_master`.
///
/// For a static endpoint this is a plain DNS lookup (no role is known ahead
/// of connecting, so it's reported as `Leader` to unblock callers that gate
/// on `require_master`; the connection driver re-validates after connecting).
/// For a cluster, seeds are probed round-robin via gossip info (modeled here
/// as a pluggable prober so tests can substitute a fake) and the
/// highest-priority node satisfying `require_master` wins.
pub async fn discover(
    endpoints: &Endpoints,
    require_master: bool,
    prober: &dyn ClusterProber,
) -> Result<DiscoveredEndpoint, DiscoveryError> {
    match endpoints {
        Endpoints::Static { host, port } => {
            let addr = resolve(host, *port).await?;
            Ok(DiscoveredEndpoint { addr, host: host.clone(), role: NodeRole::Leader })
        }
        Endpoints::Cluster { seeds } => discover_cluster(seeds, require_master, prober).await,
    }
}

async fn resolve(host: &str, port: u16) -> Result<SocketAddr, DiscoveryError> {
    let url = url::Url::parse(&format!("tcp://{host}:{port}"))?;
    let host = url.host_str().unwrap_or(host);
    tokio::net::lookup_host((host, port))
        .await
        .map_err(|_| DiscoveryError::NoSeedReachable)?
        .next()
        .ok_or(DiscoveryError::NoSeedReachable)
}

/// Abstraction over "ask a seed node for cluster member info", so discovery
/// logic can be unit tested without a real cluster.
#[async_trait::async_trait]
pub trait ClusterProber: Send + Sync {
    async fn members(&self, seed: &(String, u16)) -> Option<Vec<DiscoveredEndpoint>>;
}

/// The default prober when none is supplied: every seed is unreachable.
/// Fine for a static endpoint (discovery never probes in that case); a
/// client configured with `Endpoints::Cluster` must supply a real prober.
pub struct NullProber;

#[async_trait::async_trait]
impl ClusterProber for NullProber {
    async fn members(&self, _seed: &(String, u16)) -> Option<Vec<DiscoveredEndpoint>> {
        None
    }
}

async fn discover_cluster(
    seeds: &[(String, u16)],
    require_master: bool,
    prober: &dyn ClusterProber,
) -> Result<DiscoveredEndpoint, DiscoveryError> {
    for seed in seeds {
        debug!(host = %seed.0, port = seed.1, "probing cluster seed");
        let Some(members) = prober.members(seed).await else {
            continue;
        };
        let chosen = members
            .into_iter()
            .find(|m| !require_master || m.role == NodeRole::Leader);
        if let Some(endpoint) = chosen {
            return Ok(endpoint);
        }
        warn!(host = %seed.0, "seed reachable but no node satisfies requireMaster");
        return Err(DiscoveryError::NoSuitableNode);
    }
    Err(DiscoveryError::NoSeedReachable)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeProber(Vec<DiscoveredEndpoint>);

    #[async_trait::async_trait]
    impl ClusterProber for FakeProber {
        async fn members(&self, _seed: &(String, u16)) -> Option<Vec<DiscoveredEndpoint>> {
            Some(self.0.clone())
        }
    }

    fn addr() -> SocketAddr {
        "127.0.0.1:1113".parse().unwrap()
    }

    #[tokio::test]
    async fn picks_leader_when_require_master() {
        let prober = FakeProber(vec![
            DiscoveredEndpoint { addr: addr(), host: "a".into(), role: NodeRole::Follower },
            DiscoveredEndpoint { addr: addr(), host: "b".into(), role: NodeRole::Leader },
        ]);
        let endpoints = Endpoints::Cluster { seeds: vec![("seed".into(), 1113)] };
        let chosen = discover(&endpoints, true, &prober).await.unwrap();
        assert_eq!(chosen.host, "b");
    }

    #[tokio::test]
    async fn errors_when_no_node_satisfies_require_master() {
        let prober = FakeProber(vec![DiscoveredEndpoint {
            addr: addr(),
            host: "a".into(),
            role: NodeRole::Follower,
        }]);
        let endpoints = Endpoints::Cluster { seeds: vec![("seed".into(), 1113)] };
        let err = discover(&endpoints, true, &prober).await.unwrap_err();
        assert!(matches!(err, DiscoveryError::NoSuitableNode));
    }
}
