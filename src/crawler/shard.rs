//! Shard ownership for distributed crawls
//!
//! Every host key is owned by exactly one shard, chosen by consistent hashing
//! over a ring of virtual nodes. Only the owner enqueues URLs for a host, so
//! that shard's politeness state for the host is authoritative. URLs owned
//! elsewhere are forwarded as [`ShardMessage`]s through a [`ShardForwarder`].

use crate::config::ShardConfig;
use crate::crawler::Priority;
use crate::url::NormalizedUrl;
use crate::{ConfigError, CrawlError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tokio::sync::mpsc;
use xxhash_rust::xxh3::xxh3_64;

/// Consistent-hash ring of shard identifiers
#[derive(Debug, Clone)]
pub struct ShardRing {
    ring: BTreeMap<u64, usize>,
    peers: Vec<String>,
    local: usize,
}

impl ShardRing {
    /// Builds the ring from the peer list
    ///
    /// # Arguments
    ///
    /// * `config` - This shard's id plus every peer id
    ///
    /// # Returns
    ///
    /// The ring, or a [`ConfigError`] when the local id is not a peer
    pub fn new(config: &ShardConfig) -> Result<Self, ConfigError> {
        let local = config
            .peers
            .iter()
            .position(|peer| *peer == config.shard_id)
            .ok_or_else(|| {
                ConfigError::Validation(format!(
                    "shard_id '{}' is not listed in peers",
                    config.shard_id
                ))
            })?;

        let mut ring = BTreeMap::new();
        for (index, peer) in config.peers.iter().enumerate() {
            for vnode in 0..config.virtual_nodes.max(1) {
                ring.insert(xxh3_64(format!("{}#{}", peer, vnode).as_bytes()), index);
            }
        }

        Ok(Self {
            ring,
            peers: config.peers.clone(),
            local,
        })
    }

    /// Shard that owns `host_key`
    pub fn owner(&self, host_key: &str) -> &str {
        let point = xxh3_64(host_key.as_bytes());
        let index = self
            .ring
            .range(point..)
            .next()
            .or_else(|| self.ring.iter().next())
            .map(|(_, index)| *index)
            .unwrap_or(self.local);
        &self.peers[index]
    }

    pub fn is_local(&self, host_key: &str) -> bool {
        self.owner(host_key) == self.local_id()
    }

    pub fn local_id(&self) -> &str {
        &self.peers[self.local]
    }

    pub fn peers(&self) -> &[String] {
        &self.peers
    }
}

/// A URL handed to the shard that owns its host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShardMessage {
    pub host: String,
    pub url: NormalizedUrl,
    pub priority: Priority,
    pub depth: u32,
    /// Redirect hops that led to `url`
    #[serde(default)]
    pub redirects: u32,
}

/// Transport to peer shards' ingestion endpoints
#[async_trait]
pub trait ShardForwarder: Send + Sync {
    async fn forward(&self, peer: &str, message: ShardMessage) -> Result<(), CrawlError>;
}

/// In-process transport: one bounded tokio channel per shard
#[derive(Debug, Clone, Default)]
pub struct ChannelForwarder {
    peers: HashMap<String, mpsc::Sender<ShardMessage>>,
}

impl ChannelForwarder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, peer: impl Into<String>, sender: mpsc::Sender<ShardMessage>) {
        self.peers.insert(peer.into(), sender);
    }

    /// Wires a full mesh: one forwarder shared by all shards plus each
    /// shard's inbox
    pub fn mesh(
        peers: &[String],
        capacity: usize,
    ) -> (Self, HashMap<String, mpsc::Receiver<ShardMessage>>) {
        let mut forwarder = Self::new();
        let mut inboxes = HashMap::new();
        for peer in peers {
            let (tx, rx) = mpsc::channel(capacity.max(1));
            forwarder.register(peer.clone(), tx);
            inboxes.insert(peer.clone(), rx);
        }
        (forwarder, inboxes)
    }
}

#[async_trait]
impl ShardForwarder for ChannelForwarder {
    async fn forward(&self, peer: &str, message: ShardMessage) -> Result<(), CrawlError> {
        let sender = self
            .peers
            .get(peer)
            .ok_or_else(|| CrawlError::Shard(format!("unknown peer shard '{}'", peer)))?;
        sender
            .send(message)
            .await
            .map_err(|_| CrawlError::Shard(format!("peer shard '{}' is gone", peer)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::url::normalize_url;

    fn config(local: &str) -> ShardConfig {
        ShardConfig {
            shard_id: local.to_string(),
            peers: vec!["s0".into(), "s1".into(), "s2".into()],
            virtual_nodes: 150,
        }
    }

    fn hosts() -> Vec<String> {
        (0..300).map(|i| format!("host{}.test", i)).collect()
    }

    #[test]
    fn test_exactly_one_owner() {
        let rings: Vec<ShardRing> = ["s0", "s1", "s2"]
            .iter()
            .map(|id| ShardRing::new(&config(id)).unwrap())
            .collect();

        for host in hosts() {
            let owners: Vec<&str> = rings.iter().map(|ring| ring.owner(&host)).collect();
            assert!(owners.windows(2).all(|w| w[0] == w[1]));
            assert_eq!(rings.iter().filter(|ring| ring.is_local(&host)).count(), 1);
        }
    }

    #[test]
    fn test_spread_across_peers() {
        let ring = ShardRing::new(&config("s0")).unwrap();
        let mut counts: HashMap<&str, usize> = HashMap::new();
        for host in hosts() {
            *counts.entry(ring.owner(&host)).or_default() += 1;
        }
        assert_eq!(counts.len(), 3);
        assert!(counts.values().all(|count| *count > 30));
    }

    #[test]
    fn test_adding_peer_moves_few_hosts() {
        let before = ShardRing::new(&config("s0")).unwrap();
        let mut grown = config("s0");
        grown.peers.push("s3".into());
        let after = ShardRing::new(&grown).unwrap();

        let moved = hosts()
            .iter()
            .filter(|host| before.owner(host) != after.owner(host))
            .filter(|host| after.owner(host) != "s3")
            .count();
        assert_eq!(moved, 0);
    }

    #[test]
    fn test_local_must_be_peer() {
        assert!(ShardRing::new(&config("s9")).is_err());
    }

    #[test]
    fn test_message_serializes_url_as_string() {
        let message = ShardMessage {
            host: "a.test".into(),
            url: normalize_url("http://a.test/x").unwrap(),
            priority: Priority::Medium,
            depth: 2,
            redirects: 1,
        };
        let encoded = toml::to_string(&message).unwrap();
        assert!(encoded.contains("url = \"http://a.test/x\""));
        assert!(encoded.contains("priority = \"medium\""));
        let decoded: ShardMessage = toml::from_str(&encoded).unwrap();
        assert_eq!(decoded, message);

        // Messages without a hop count decode with zero
        let legacy = "host = \"a.test\"\nurl = \"http://a.test/x\"\npriority = \"low\"\ndepth = 1\n";
        let decoded: ShardMessage = toml::from_str(legacy).unwrap();
        assert_eq!(decoded.redirects, 0);
    }

    #[tokio::test]
    async fn test_channel_forwarder() {
        let peers = vec!["s0".to_string(), "s1".to_string()];
        let (forwarder, mut inboxes) = ChannelForwarder::mesh(&peers, 8);
        let message = ShardMessage {
            host: "a.test".into(),
            url: normalize_url("http://a.test/").unwrap(),
            priority: Priority::High,
            depth: 0,
            redirects: 0,
        };

        forwarder.forward("s1", message.clone()).await.unwrap();
        let received = inboxes.get_mut("s1").unwrap().recv().await.unwrap();
        assert_eq!(received, message);

        assert!(matches!(
            forwarder.forward("s7", message).await,
            Err(CrawlError::Shard(_))
        ));
    }
}
