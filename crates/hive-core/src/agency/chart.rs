//! Agency chart parsing.
//!
//! A chart is an ordered list of nodes. A single agent declares a
//! top-level, user-addressable participant (the first one is the root);
//! a list of agents declares a communication clique: every non-last
//! element gets a directed link to every other element of the same list,
//! while the last element is a link target only. The chart author pays
//! for this compactness with those two implicit rules, so both are pinned
//! by regression tests below.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::AgencyError;

use super::agent::Agent;

/// One element of an agency chart.
#[derive(Clone, Debug)]
pub enum ChartNode {
    /// A top-level agent, directly addressable by the external caller.
    Agent(Arc<Agent>),
    /// A communication clique.
    Clique(Vec<Arc<Agent>>),
}

/// Parsed communication topology: agents, root, main recipients, and the
/// directed (agent -> recipient) thread slots.
pub struct AgencyGraph {
    agents: Vec<Arc<Agent>>,
    root: Arc<Agent>,
    main_recipients: Vec<Arc<Agent>>,
    /// agent name -> recipient names, both in declaration order.
    slots: BTreeMap<String, Vec<String>>,
}

impl AgencyGraph {
    /// Parse and validate a chart. Fails fast on the first structural
    /// error; a failed parse leaves no partial graph behind.
    pub fn parse(chart: &[ChartNode]) -> Result<Self, AgencyError> {
        if chart.is_empty() {
            return Err(AgencyError::EmptyChart);
        }

        let mut agents: Vec<Arc<Agent>> = Vec::new();
        let mut root: Option<Arc<Agent>> = None;
        let mut main_recipients: Vec<Arc<Agent>> = Vec::new();
        let mut slots: BTreeMap<String, Vec<String>> = BTreeMap::new();

        for node in chart {
            match node {
                ChartNode::Agent(agent) => {
                    Self::register(&mut agents, agent)?;
                    if root.is_none() {
                        root = Some(agent.clone());
                    }
                    let already_main = main_recipients
                        .iter()
                        .any(|existing| existing.id() == agent.id());
                    if !already_main {
                        main_recipients.push(agent.clone());
                    }
                }
                ChartNode::Clique(list) => {
                    if list.is_empty() {
                        return Err(AgencyError::EmptyClique);
                    }
                    for (i, agent) in list.iter().enumerate() {
                        Self::register(&mut agents, agent)?;

                        // The last list element receives no outgoing links.
                        if i == list.len() - 1 {
                            continue;
                        }

                        let recipients = slots.entry(agent.name().to_string()).or_default();
                        for other in list {
                            if other.name() == agent.name() {
                                continue;
                            }
                            if !recipients.iter().any(|name| name == other.name()) {
                                recipients.push(other.name().to_string());
                            }
                        }
                    }
                }
            }
        }

        let root = root.ok_or(AgencyError::NoTopLevelAgent)?;

        tracing::debug!(
            agents = agents.len(),
            root = %root.name(),
            linked = slots.len(),
            "parsed agency chart"
        );

        Ok(Self {
            agents,
            root,
            main_recipients,
            slots,
        })
    }

    /// Register an agent: idempotent by id, an error on a name collision.
    fn register(agents: &mut Vec<Arc<Agent>>, agent: &Arc<Agent>) -> Result<(), AgencyError> {
        agent.assign_temp_id_if_missing();

        if agents.iter().any(|existing| existing.id() == agent.id()) {
            return Ok(());
        }
        if agents.iter().any(|existing| existing.name() == agent.name()) {
            return Err(AgencyError::DuplicateAgentName(agent.name().to_string()));
        }
        agents.push(agent.clone());
        Ok(())
    }

    pub fn agents(&self) -> &[Arc<Agent>] {
        &self.agents
    }

    pub fn root(&self) -> &Arc<Agent> {
        &self.root
    }

    pub fn main_recipients(&self) -> &[Arc<Agent>] {
        &self.main_recipients
    }

    pub fn is_main_recipient(&self, name: &str) -> bool {
        self.main_recipients.iter().any(|a| a.name() == name)
    }

    /// Directed thread slots: agent name -> recipient names.
    pub fn slots(&self) -> &BTreeMap<String, Vec<String>> {
        &self.slots
    }

    pub fn agent_by_name(&self, name: &str) -> Result<&Arc<Agent>, AgencyError> {
        self.agents
            .iter()
            .find(|agent| agent.name() == name)
            .ok_or_else(|| AgencyError::UnknownAgent(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn agent(name: &str) -> Arc<Agent> {
        Arc::new(Agent::new(name))
    }

    #[test]
    fn empty_chart_is_rejected() {
        assert!(matches!(
            AgencyGraph::parse(&[]),
            Err(AgencyError::EmptyChart)
        ));
    }

    #[test]
    fn chart_without_top_level_agent_is_rejected() {
        let chart = vec![ChartNode::Clique(vec![agent("A"), agent("B")])];
        assert!(matches!(
            AgencyGraph::parse(&chart),
            Err(AgencyError::NoTopLevelAgent)
        ));
    }

    #[test]
    fn empty_clique_is_rejected() {
        let chart = vec![ChartNode::Agent(agent("A")), ChartNode::Clique(vec![])];
        assert!(matches!(
            AgencyGraph::parse(&chart),
            Err(AgencyError::EmptyClique)
        ));
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let chart = vec![
            ChartNode::Agent(agent("Entry")),
            ChartNode::Clique(vec![agent("Entry"), agent("Worker")]),
        ];
        // Two distinct Agent objects sharing a name: error, even though a
        // reused object would have been fine.
        assert!(matches!(
            AgencyGraph::parse(&chart),
            Err(AgencyError::DuplicateAgentName(name)) if name == "Entry"
        ));
    }

    #[test]
    fn reused_agent_object_registers_once() {
        let entry = agent("Entry");
        let worker = agent("Worker");
        let chart = vec![
            ChartNode::Agent(entry.clone()),
            ChartNode::Clique(vec![entry.clone(), worker.clone()]),
        ];
        let graph = AgencyGraph::parse(&chart).unwrap();
        assert_eq!(graph.agents().len(), 2);
        assert_eq!(graph.root().name(), "Entry");
    }

    #[test]
    fn main_recipients_keep_top_level_order() {
        let a = agent("A");
        let b = agent("B");
        let chart = vec![
            ChartNode::Agent(a.clone()),
            ChartNode::Agent(b.clone()),
            ChartNode::Clique(vec![a.clone(), b.clone()]),
        ];
        let graph = AgencyGraph::parse(&chart).unwrap();
        let names: Vec<&str> = graph
            .main_recipients()
            .iter()
            .map(|agent| agent.name())
            .collect();
        assert_eq!(names, ["A", "B"]);

        // Stable across re-parses of the same chart.
        let again = AgencyGraph::parse(&chart).unwrap();
        let names_again: Vec<&str> = again
            .main_recipients()
            .iter()
            .map(|agent| agent.name())
            .collect();
        assert_eq!(names, names_again);
    }

    // A list declares a full pairwise clique (minus the last element's
    // outgoing side), not a chain.
    #[test]
    fn clique_links_all_pairs_except_last_outbound() {
        let a = agent("A");
        let b = agent("B");
        let c = agent("C");
        let chart = vec![
            ChartNode::Agent(a.clone()),
            ChartNode::Clique(vec![a.clone(), b.clone(), c.clone()]),
        ];
        let graph = AgencyGraph::parse(&chart).unwrap();

        // n-1 agents have outgoing slots, each with (n-1) recipients.
        assert_eq!(graph.slots().len(), 2);
        assert_eq!(graph.slots()["A"], ["B", "C"]);
        assert_eq!(graph.slots()["B"], ["A", "C"]);

        // The last element has zero outgoing slots but is a recipient.
        assert!(!graph.slots().contains_key("C"));
    }

    #[test]
    fn entry_worker_chart_has_single_slot() {
        let entry = agent("Entry");
        let worker = agent("Worker");
        let chart = vec![
            ChartNode::Agent(entry.clone()),
            ChartNode::Clique(vec![entry.clone(), worker.clone()]),
        ];
        let graph = AgencyGraph::parse(&chart).unwrap();

        let mains: Vec<&str> = graph.main_recipients().iter().map(|a| a.name()).collect();
        assert_eq!(mains, ["Entry"]);
        assert_eq!(graph.slots().len(), 1);
        assert_eq!(graph.slots()["Entry"], ["Worker"]);
    }
}
