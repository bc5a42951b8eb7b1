//! Net service: registry of live agents.
//!
//! The net service is the only component that mutates the agent map. It
//! allocates session ids, creates agents, removes them on close, and runs
//! the heartbeat sweeper that closes agents which have gone silent for
//! more than twice the heartbeat interval.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::agent::{Agent, PacketSink};
use crate::message::RouteDictionary;

/// Registry of live agents, keyed by session id.
pub struct NetService {
    agents: Mutex<HashMap<u64, Arc<Agent>>>,
    next_id: AtomicU64,
    dict: Arc<RouteDictionary>,
    heartbeat: Duration,
}

impl NetService {
    /// Create a net service with the given heartbeat interval and route
    /// dictionary.
    pub fn new(heartbeat: Duration, dict: Arc<RouteDictionary>) -> Arc<Self> {
        Arc::new(Self {
            agents: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            dict,
            heartbeat,
        })
    }

    /// Create an agent for a new connection and install it in the
    /// registry under a freshly allocated session id.
    pub fn create_agent(&self, sink: Box<dyn PacketSink>) -> Arc<Agent> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let agent = Agent::new(id, sink, self.dict.clone());
        self.agents
            .lock()
            .expect("agent map lock poisoned")
            .insert(id, agent.clone());
        agent
    }

    /// Look up an agent by session id.
    pub fn agent_by_id(&self, id: u64) -> Option<Arc<Agent>> {
        self.agents
            .lock()
            .expect("agent map lock poisoned")
            .get(&id)
            .cloned()
    }

    /// Number of live agents.
    pub fn count(&self) -> usize {
        self.agents.lock().expect("agent map lock poisoned").len()
    }

    /// Close an agent and remove it from the registry. Safe to call more
    /// than once; the removal happens at most once.
    pub fn close_agent(&self, agent: &Arc<Agent>) {
        if agent.close() {
            tracing::debug!(session = agent.session().id(), "agent closed");
        }
        self.agents
            .lock()
            .expect("agent map lock poisoned")
            .remove(&agent.session().id());
    }

    /// Close every agent; called at shutdown.
    pub fn close_all(&self) {
        let drained: Vec<Arc<Agent>> = {
            let mut agents = self.agents.lock().expect("agent map lock poisoned");
            agents.drain().map(|(_, a)| a).collect()
        };
        for agent in drained {
            agent.close();
        }
    }

    /// Close agents that have been silent for more than twice the
    /// heartbeat interval.
    pub fn sweep(&self) {
        let deadline = self.heartbeat * 2;
        let stale: Vec<Arc<Agent>> = {
            let agents = self.agents.lock().expect("agent map lock poisoned");
            agents
                .values()
                .filter(|a| a.idle_for() > deadline)
                .cloned()
                .collect()
        };
        for agent in stale {
            tracing::info!(
                session = agent.session().id(),
                idle = ?agent.idle_for(),
                "heartbeat timeout"
            );
            self.close_agent(&agent);
        }
    }

    /// Spawn the periodic sweeper task. Runs until aborted.
    pub(crate) fn spawn_sweeper(self: &Arc<Self>) -> JoinHandle<()> {
        let service = self.clone();
        let period = self.heartbeat;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                service.sweep();
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::testing::CaptureSink;

    fn service(heartbeat: Duration) -> Arc<NetService> {
        NetService::new(heartbeat, Arc::new(RouteDictionary::new()))
    }

    fn sink() -> Box<dyn PacketSink> {
        Box::new(CaptureSink::new().0)
    }

    #[test]
    fn test_session_ids_are_monotonic() {
        let net = service(Duration::from_secs(30));

        let a = net.create_agent(sink());
        let b = net.create_agent(sink());
        let c = net.create_agent(sink());

        assert!(a.session().id() < b.session().id());
        assert!(b.session().id() < c.session().id());
        assert_eq!(net.count(), 3);
    }

    #[test]
    fn test_agent_by_id() {
        let net = service(Duration::from_secs(30));
        let agent = net.create_agent(sink());
        let id = agent.session().id();

        assert!(net.agent_by_id(id).is_some());
        assert!(net.agent_by_id(id + 100).is_none());
    }

    #[test]
    fn test_close_agent_removes_once() {
        let net = service(Duration::from_secs(30));
        let agent = net.create_agent(sink());
        let id = agent.session().id();

        net.close_agent(&agent);
        assert!(agent.is_closed());
        assert!(net.agent_by_id(id).is_none());
        assert_eq!(net.count(), 0);

        // Second close is a no-op.
        net.close_agent(&agent);
        assert_eq!(net.count(), 0);
    }

    #[test]
    fn test_close_all() {
        let net = service(Duration::from_secs(30));
        let a = net.create_agent(sink());
        let b = net.create_agent(sink());

        net.close_all();

        assert!(a.is_closed());
        assert!(b.is_closed());
        assert_eq!(net.count(), 0);
    }

    #[test]
    fn test_sweep_closes_only_stale_agents() {
        let net = service(Duration::from_millis(10));
        let stale = net.create_agent(sink());
        let fresh = net.create_agent(sink());

        std::thread::sleep(Duration::from_millis(30));
        fresh.touch();

        net.sweep();

        assert!(stale.is_closed());
        assert!(!fresh.is_closed());
        assert_eq!(net.count(), 1);
    }

    #[tokio::test]
    async fn test_sweeper_task_closes_idle_agent() {
        let net = service(Duration::from_millis(20));
        let agent = net.create_agent(sink());

        let sweeper = net.spawn_sweeper();
        tokio::time::sleep(Duration::from_millis(120)).await;
        sweeper.abort();

        assert!(agent.is_closed());
        assert_eq!(net.count(), 0);
    }
}
