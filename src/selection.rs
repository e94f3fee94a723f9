//! Strategies for picking the node that backs a new session.

use crate::node::NodeConnection;
use crate::protocol::NodeStats;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Picks a node for a new session
///
/// `nodes` is in pool insertion order and never empty.
pub trait NodeSelector: Send + Sync {
    fn select(&self, nodes: &[Arc<NodeConnection>]) -> Option<Arc<NodeConnection>>;
}

/// Always the first node added to the pool
#[derive(Debug, Clone, Copy, Default)]
pub struct FirstNode;

impl NodeSelector for FirstNode {
    fn select(&self, nodes: &[Arc<NodeConnection>]) -> Option<Arc<NodeConnection>> {
        nodes.first().cloned()
    }
}

/// Cycles through connected nodes
///
/// Falls back to every node when none is connected.
#[derive(Debug, Default)]
pub struct RoundRobin {
    next: AtomicUsize,
}

impl RoundRobin {
    pub fn new() -> Self {
        Self::default()
    }
}

impl NodeSelector for RoundRobin {
    fn select(&self, nodes: &[Arc<NodeConnection>]) -> Option<Arc<NodeConnection>> {
        let connected: Vec<&Arc<NodeConnection>> =
            nodes.iter().filter(|node| node.is_connected()).collect();
        let candidates = if connected.is_empty() {
            nodes.iter().collect()
        } else {
            connected
        };

        if candidates.is_empty() {
            return None;
        }
        let index = self.next.fetch_add(1, Ordering::Relaxed) % candidates.len();
        Some(candidates[index].clone())
    }
}

/// Connected node with the lowest load penalty
///
/// Nodes that have not reported stats yet score 0. Ties go to the node
/// added first; with no connected node the first node is used.
#[derive(Debug, Clone, Copy, Default)]
pub struct LeastLoaded;

impl NodeSelector for LeastLoaded {
    fn select(&self, nodes: &[Arc<NodeConnection>]) -> Option<Arc<NodeConnection>> {
        nodes
            .iter()
            .filter(|node| node.is_connected())
            .min_by_key(|node| node.stats().map_or(0, |stats| penalty(&stats)))
            .or_else(|| nodes.first())
            .cloned()
    }
}

/// Load penalty of a node, lower is better
///
/// Playing players count once each, CPU load grows exponentially, and a
/// frame deficit or nulled frames add heavily on top.
pub fn penalty(stats: &NodeStats) -> u64 {
    let cpu = (1.05f64.powf(100.0 * stats.cpu.system_load) * 10.0 - 10.0).round();

    let (deficit, nulled) = match stats.frame_stats {
        Some(frames) => (
            frame_penalty(frames.deficit, 600.0),
            frame_penalty(frames.nulled, 300.0) * 2.0,
        ),
        None => (0.0, 0.0),
    };

    // Float to int casts saturate, so an infinite sum pins at u64::MAX
    let load = (cpu.max(0.0) + deficit.max(0.0) + nulled.max(0.0)) as u64;
    stats.playing_players.saturating_add(load)
}

fn frame_penalty(frames: i64, scale: f64) -> f64 {
    (1.03f64.powf(500.0 * (frames as f64 / 3000.0)) * scale - scale).round()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::tests::test_context;
    use crate::protocol::{CpuStats, FrameStats, MemoryStats};
    use crate::types::NodeDescriptor;

    fn node(id: &str, connected: bool) -> Arc<NodeConnection> {
        let node = Arc::new(NodeConnection::new(
            NodeDescriptor::new(id, "localhost", 2333),
            test_context(),
        ));
        if connected {
            // Dropping the receiver keeps the node marked connected
            let _ = node.attach_detached();
        }
        node
    }

    fn stats_frame(playing: u64, system_load: f64) -> String {
        serde_json::json!({
            "op": "stats",
            "players": playing,
            "playingPlayers": playing,
            "uptime": 1,
            "memory": {"reservable": 0, "used": 0, "free": 0, "allocated": 0},
            "cpu": {"cores": 4, "systemLoad": system_load, "lavalinkLoad": 0.0}
        })
        .to_string()
    }

    fn stats(playing: u64, system_load: f64, frames: Option<FrameStats>) -> NodeStats {
        NodeStats {
            memory: MemoryStats {
                reservable: 0,
                used: 0,
                free: 0,
                allocated: 0,
            },
            cpu: CpuStats {
                cores: 4,
                system_load,
                node_load: 0.0,
            },
            uptime: 1,
            playing_players: playing,
            players: playing,
            frame_stats: frames,
        }
    }

    #[test]
    fn first_node_is_deterministic() {
        let nodes = vec![node("a", false), node("b", true)];
        for _ in 0..3 {
            assert_eq!(FirstNode.select(&nodes).unwrap().id(), "a");
        }
    }

    #[test]
    fn round_robin_cycles_connected_nodes() {
        let nodes = vec![node("a", true), node("b", false), node("c", true)];
        let selector = RoundRobin::new();

        let picks: Vec<String> = (0..4)
            .map(|_| selector.select(&nodes).unwrap().id().to_string())
            .collect();
        assert_eq!(picks, vec!["a", "c", "a", "c"]);
    }

    #[test]
    fn least_loaded_prefers_lower_penalty() {
        let nodes = vec![node("a", true), node("b", true)];
        nodes[0].handle_frame(&stats_frame(10, 0.5));
        nodes[1].handle_frame(&stats_frame(2, 0.1));

        assert_eq!(LeastLoaded.select(&nodes).unwrap().id(), "b");
    }

    #[test]
    fn least_loaded_falls_back_to_first() {
        let nodes = vec![node("a", false), node("b", false)];
        assert_eq!(LeastLoaded.select(&nodes).unwrap().id(), "a");
        assert!(LeastLoaded.select(&[]).is_none());
    }

    #[test]
    fn penalty_grows_with_load() {
        let idle = penalty(&stats(0, 0.0, None));
        let busy = penalty(&stats(5, 0.0, None));
        let hot = penalty(&stats(5, 0.8, None));
        let lossy = penalty(&stats(
            5,
            0.8,
            Some(FrameStats {
                sent: 3000,
                nulled: 300,
                deficit: 300,
            }),
        ));

        assert_eq!(idle, 0);
        assert_eq!(busy, 5);
        assert!(hot > busy);
        assert!(lossy > hot);
    }

    #[test]
    fn extreme_frame_counters_saturate() {
        let frames = FrameStats {
            sent: 0,
            nulled: i64::MAX,
            deficit: 1_000_000,
        };
        assert_eq!(penalty(&stats(3, 0.0, Some(frames))), u64::MAX);
        assert_eq!(penalty(&stats(u64::MAX, 1.0, None)), u64::MAX);
    }

    #[test]
    fn least_loaded_avoids_a_saturated_node() {
        let nodes = vec![node("a", true), node("b", true), node("c", true)];
        let lossy = serde_json::json!({
            "op": "stats",
            "players": 3,
            "playingPlayers": 3,
            "uptime": 1,
            "memory": {"reservable": 0, "used": 0, "free": 0, "allocated": 0},
            "cpu": {"cores": 4, "systemLoad": 0.0, "lavalinkLoad": 0.0},
            "frameStats": {"sent": 0, "nulled": 0, "deficit": 1_000_000}
        });
        nodes[0].handle_frame(&lossy.to_string());
        nodes[1].handle_frame(&lossy.to_string());
        nodes[2].handle_frame(&stats_frame(50, 0.9));

        assert_eq!(LeastLoaded.select(&nodes).unwrap().id(), "c");
        assert_eq!(LeastLoaded.select(&nodes[..2]).unwrap().id(), "a");
    }
}
