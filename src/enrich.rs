use crate::error::MeshProbeError;
use crate::types::EnrichedPeer;
use async_trait::async_trait;
use hyper::client::HttpConnector;
use hyper::{Client, Uri};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::time::Duration;
use tokio::time;
use tracing::{debug, info};

/// Response body of the ip-api.com json endpoint.
#[derive(Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(default)]
pub struct IpInfo {
    pub status: String,
    pub isp: String,
    pub country: String,
    #[serde(rename = "regionName")]
    pub region: String,
    pub city: String,
}

/// The label shown next to a peer's egress.
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct Organization {
    pub isp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
}

impl IpInfo {
    pub fn into_organization(self) -> Option<Organization> {
        if self.status != "success" || self.isp.trim().is_empty() {
            return None;
        }
        let non_empty = |s: String| Some(s).filter(|s| !s.is_empty());
        Some(Organization {
            isp: self.isp,
            country: non_empty(self.country),
            region: non_empty(self.region),
            city: non_empty(self.city),
        })
    }
}

#[async_trait]
pub trait OrgLookup: Send + Sync {
    async fn lookup(&self, ip: Ipv4Addr) -> Result<IpInfo, MeshProbeError>;
}

/// Plain http client for ip-api.com.
pub struct IpApiLookup {
    client: Client<HttpConnector>,
    endpoint: String,
    timeout: Duration,
}

impl IpApiLookup {
    /// `endpoint` carries an `{ip}` placeholder.
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: Client::new(),
            endpoint: endpoint.into(),
            timeout,
        }
    }

    pub fn url_for(&self, ip: Ipv4Addr) -> String {
        self.endpoint.replace("{ip}", &ip.to_string())
    }
}

#[async_trait]
impl OrgLookup for IpApiLookup {
    async fn lookup(&self, ip: Ipv4Addr) -> Result<IpInfo, MeshProbeError> {
        let failed = |reason: String| MeshProbeError::Enrichment { ip, reason };

        let uri = self
            .url_for(ip)
            .parse::<Uri>()
            .map_err(|e| failed(e.to_string()))?;

        // The deadline covers the body as well as the headers.
        let fetch = async {
            let resp = self
                .client
                .get(uri)
                .await
                .map_err(|e| failed(e.to_string()))?;
            if !resp.status().is_success() {
                return Err(failed(format!("HTTP {}", resp.status())));
            }
            let body = hyper::body::to_bytes(resp.into_body())
                .await
                .map_err(|e| failed(e.to_string()))?;
            let info = serde_json::from_slice::<IpInfo>(&body).map_err(|e| failed(e.to_string()))?;
            Ok::<IpInfo, MeshProbeError>(info)
        };

        time::timeout(self.timeout, fetch)
            .await
            .map_err(|_| failed("timed out".to_string()))?
    }
}

/// Serialized lookups with a per-run cache keyed by address.
pub struct Enricher<'a> {
    lookup: &'a dyn OrgLookup,
    delay: Duration,
    cache: HashMap<Ipv4Addr, Option<Organization>>,
    lookups: usize,
}

impl<'a> Enricher<'a> {
    pub fn new(lookup: &'a dyn OrgLookup, delay: Duration) -> Self {
        Self {
            lookup,
            delay,
            cache: HashMap::new(),
            lookups: 0,
        }
    }

    /// Network lookups performed so far. Cache hits are not counted.
    pub fn lookups(&self) -> usize {
        self.lookups
    }

    pub async fn resolve(&mut self, ip: Ipv4Addr) -> Option<Organization> {
        if let Some(cached) = self.cache.get(&ip) {
            return cached.clone();
        }

        // rate limit
        time::sleep(self.delay).await;
        self.lookups += 1;
        let organization = match self.lookup.lookup(ip).await {
            Ok(info) => info.into_organization(),
            Err(e) => {
                debug!("{}", e);
                None
            }
        };
        self.cache.insert(ip, organization.clone());
        organization
    }
}

/// Label every peer with a public egress. Returns the number of lookups made.
pub async fn enrich_peers(peers: &mut [EnrichedPeer], lookup: &dyn OrgLookup, delay: Duration) -> usize {
    let mut enricher = Enricher::new(lookup, delay);
    for peer in peers.iter_mut() {
        if let Some(ip) = peer.public_egress_ip() {
            peer.organization = enricher.resolve(ip).await;
        }
    }
    info!("Resolved isp for {} egress addresses", enricher.lookups());
    enricher.lookups()
}
