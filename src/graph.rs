//! # Dependency Graph
//!
//! Explicit directed acyclic graph over the stack's resources. Edges come from
//! the references each descriptor carries; there is no implicit ordering.
//!
//! Creation follows [`DependencyGraph::apply_order`], teardown follows
//! [`DependencyGraph::destroy_order`] (its exact reverse).

use crate::topology::{Resource, ResourceId};
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("duplicate resource id '{0}'")]
    DuplicateId(ResourceId),

    #[error("resource '{resource}' references unknown resource '{missing}'")]
    DanglingReference {
        resource: ResourceId,
        missing: ResourceId,
    },

    #[error("dependency cycle between resources: {}", format_ids(.0))]
    Cycle(Vec<ResourceId>),
}

fn format_ids(ids: &[ResourceId]) -> String {
    ids.iter()
        .map(ResourceId::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Debug, Clone)]
pub struct DependencyGraph {
    /// Insertion order, used to break ties deterministically
    nodes: Vec<ResourceId>,
    index: HashMap<ResourceId, usize>,
    /// node -> nodes it depends on
    dependencies: Vec<Vec<usize>>,
    /// node -> nodes depending on it
    dependents: Vec<Vec<usize>>,
    order: Vec<usize>,
}

impl DependencyGraph {
    /// Build the graph, rejecting duplicates, dangling references and cycles
    pub fn from_resources(resources: &[Resource]) -> Result<Self, GraphError> {
        let mut index = HashMap::with_capacity(resources.len());
        let mut nodes = Vec::with_capacity(resources.len());
        for resource in resources {
            if index.insert(resource.id.clone(), nodes.len()).is_some() {
                return Err(GraphError::DuplicateId(resource.id.clone()));
            }
            nodes.push(resource.id.clone());
        }

        let mut dependencies = vec![Vec::new(); nodes.len()];
        let mut dependents = vec![Vec::new(); nodes.len()];
        for (node, resource) in resources.iter().enumerate() {
            for dep in resource.dependencies() {
                let &target = index.get(&dep).ok_or_else(|| GraphError::DanglingReference {
                    resource: resource.id.clone(),
                    missing: dep.clone(),
                })?;
                dependencies[node].push(target);
                dependents[target].push(node);
            }
        }

        let mut graph = Self {
            nodes,
            index,
            dependencies,
            dependents,
            order: Vec::new(),
        };
        graph.order = graph.topological_sort()?;
        Ok(graph)
    }

    /// Kahn's algorithm; among ready nodes the earliest inserted goes first
    fn topological_sort(&self) -> Result<Vec<usize>, GraphError> {
        let mut remaining: Vec<usize> = self.dependencies.iter().map(Vec::len).collect();
        let mut ready: BTreeSet<usize> = remaining
            .iter()
            .enumerate()
            .filter(|(_, &n)| n == 0)
            .map(|(i, _)| i)
            .collect();
        let mut order = Vec::with_capacity(self.nodes.len());

        while let Some(node) = ready.pop_first() {
            order.push(node);
            for &dependent in &self.dependents[node] {
                remaining[dependent] -= 1;
                if remaining[dependent] == 0 {
                    ready.insert(dependent);
                }
            }
        }

        if order.len() != self.nodes.len() {
            let cyclic = remaining
                .iter()
                .enumerate()
                .filter(|(_, &n)| n > 0)
                .map(|(i, _)| self.nodes[i].clone())
                .collect();
            return Err(GraphError::Cycle(cyclic));
        }
        Ok(order)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, id: &ResourceId) -> bool {
        self.index.contains_key(id)
    }

    /// Creation order: every resource after all of its dependencies
    pub fn apply_order(&self) -> Vec<ResourceId> {
        self.order.iter().map(|&i| self.nodes[i].clone()).collect()
    }

    /// Teardown order: every resource before all of its dependencies
    pub fn destroy_order(&self) -> Vec<ResourceId> {
        self.order.iter().rev().map(|&i| self.nodes[i].clone()).collect()
    }

    /// Direct dependencies of `id`
    pub fn dependencies_of(&self, id: &ResourceId) -> Vec<ResourceId> {
        self.neighbours(id, &self.dependencies)
    }

    /// Resources that directly reference `id`
    pub fn dependents_of(&self, id: &ResourceId) -> Vec<ResourceId> {
        self.neighbours(id, &self.dependents)
    }

    fn neighbours(&self, id: &ResourceId, edges: &[Vec<usize>]) -> Vec<ResourceId> {
        self.index
            .get(id)
            .map(|&i| edges[i].iter().map(|&j| self.nodes[j].clone()).collect())
            .unwrap_or_default()
    }

    /// Everything `id` depends on, directly or not
    pub fn transitive_dependencies(&self, id: &ResourceId) -> HashSet<ResourceId> {
        let mut seen = HashSet::new();
        let Some(&start) = self.index.get(id) else {
            return seen;
        };
        let mut queue = VecDeque::from([start]);
        while let Some(node) = queue.pop_front() {
            for &dep in &self.dependencies[node] {
                if seen.insert(self.nodes[dep].clone()) {
                    queue.push_back(dep);
                }
            }
        }
        seen
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::{
        InternetGateway, Peer, Port, ResourceKind, SecurityGroup, SecurityGroupRule, Vpc,
    };

    fn id(s: &'static str) -> ResourceId {
        ResourceId::fixed(s)
    }

    fn vpc() -> Resource {
        Resource::new(
            id("Vpc"),
            ResourceKind::Vpc(Vpc::new("10.0.0.0/16".parse().unwrap(), 2)),
        )
    }

    fn sg(name: &'static str) -> Resource {
        Resource::new(
            id(name),
            ResourceKind::SecurityGroup(SecurityGroup::new(id("Vpc"), name)),
        )
    }

    fn rule(name: &'static str, group: &'static str, peer: &'static str) -> Resource {
        Resource::new(
            id(name),
            ResourceKind::SecurityGroupRule(SecurityGroupRule::ingress(
                id(group),
                Peer::SecurityGroup(id(peer)),
                Port::tcp(3306),
                "test",
            )),
        )
    }

    #[test]
    fn test_apply_order_respects_dependencies() {
        let resources = vec![
            rule("ProxyIngress", "ProxySg", "AppSg"),
            sg("ProxySg"),
            sg("AppSg"),
            vpc(),
        ];
        let graph = DependencyGraph::from_resources(&resources).unwrap();
        let order = graph.apply_order();
        let pos = |n: &str| order.iter().position(|i| i.as_str() == n).unwrap();
        assert_eq!(pos("Vpc"), 0);
        assert!(pos("ProxySg") < pos("ProxyIngress"));
        assert!(pos("AppSg") < pos("ProxyIngress"));
        // insertion order breaks ties
        assert!(pos("ProxySg") < pos("AppSg"));
    }

    #[test]
    fn test_destroy_order_is_reverse() {
        let resources = vec![vpc(), sg("AppSg"), sg("ProxySg")];
        let graph = DependencyGraph::from_resources(&resources).unwrap();
        let mut reversed = graph.apply_order();
        reversed.reverse();
        assert_eq!(graph.destroy_order(), reversed);
        assert_eq!(graph.destroy_order().last().unwrap().as_str(), "Vpc");
    }

    #[test]
    fn test_dangling_reference() {
        let err = DependencyGraph::from_resources(&[sg("AppSg")]).unwrap_err();
        assert_eq!(
            err,
            GraphError::DanglingReference {
                resource: id("AppSg"),
                missing: id("Vpc"),
            }
        );
    }

    #[test]
    fn test_duplicate_id() {
        let err = DependencyGraph::from_resources(&[vpc(), vpc()]).unwrap_err();
        assert_eq!(err, GraphError::DuplicateId(id("Vpc")));
    }

    #[test]
    fn test_cycle_detected() {
        // two gateways attached to each other's "vpc"
        let a = Resource::new(
            id("GatewayA"),
            ResourceKind::InternetGateway(InternetGateway { vpc: id("GatewayB") }),
        );
        let b = Resource::new(
            id("GatewayB"),
            ResourceKind::InternetGateway(InternetGateway { vpc: id("GatewayA") }),
        );
        match DependencyGraph::from_resources(&[a, b]) {
            Err(GraphError::Cycle(ids)) => assert_eq!(ids.len(), 2),
            other => panic!("expected cycle, got {other:?}"),
        }
    }

    #[test]
    fn test_neighbour_queries() {
        let resources = vec![
            vpc(),
            sg("AppSg"),
            sg("ProxySg"),
            rule("ProxyIngress", "ProxySg", "AppSg"),
        ];
        let graph = DependencyGraph::from_resources(&resources).unwrap();
        assert_eq!(graph.dependents_of(&id("AppSg")), vec![id("ProxyIngress")]);
        assert_eq!(graph.dependencies_of(&id("AppSg")), vec![id("Vpc")]);
        let transitive = graph.transitive_dependencies(&id("ProxyIngress"));
        assert_eq!(transitive.len(), 3);
        assert!(transitive.contains(&id("Vpc")));
        assert!(graph.transitive_dependencies(&id("Unknown")).is_empty());
    }
}
