//! Render graph definition and compilation

use crate::render_graph::pass::*;
use crate::render_graph::resource::*;
use std::collections::{BTreeSet, HashMap};
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum GraphError {
    #[error("Render graph has a dependency cycle between passes: {}", .0.join(", "))]
    Cycle(Vec<String>),
}

/// The main render graph structure
pub struct RenderGraph {
    passes: Vec<Box<dyn RenderPass>>,
    pass_nodes: Vec<PassNode>,
    resources: Vec<VirtualResource>,
    next_pass_id: u32,
    next_resource_id: u32,
    names: HashMap<String, ResourceId>,
}

impl RenderGraph {
    pub fn new() -> Self {
        Self {
            passes: Vec::new(),
            pass_nodes: Vec::new(),
            resources: Vec::new(),
            next_pass_id: 0,
            next_resource_id: 0,
            names: HashMap::new(),
        }
    }

    fn allocate_resource(&mut self, name: &str, external: bool) -> ResourceId {
        if let Some(id) = self.names.get(name) {
            return *id;
        }
        let id = ResourceId(self.next_resource_id);
        self.next_resource_id += 1;
        let name = name.to_string();
        self.names.insert(name.clone(), id);
        self.resources.push(if external {
            VirtualResource::External { id, name }
        } else {
            VirtualResource::Imported { id, name }
        });
        id
    }

    /// Import a persistent target by name
    pub fn import(&mut self, name: &str) -> ResourceId {
        self.allocate_resource(name, false)
    }

    /// Register an external resource (like swapchain image)
    pub fn register_external(&mut self, name: &str) -> ResourceId {
        self.allocate_resource(name, true)
    }

    /// Get a resource by name
    pub fn resource(&self, name: &str) -> Option<ResourceId> {
        self.names.get(name).copied()
    }

    /// Add a render pass to the graph
    pub fn add_pass<P: RenderPass + 'static>(&mut self, mut pass: P) -> PassId {
        let id = PassId(self.next_pass_id);
        self.next_pass_id += 1;

        let mut inputs = Vec::new();
        let mut outputs = Vec::new();
        pass.setup(&mut PassSetupContext {
            inputs: &mut inputs,
            outputs: &mut outputs,
        });

        self.pass_nodes.push(PassNode {
            id,
            name: pass.name().to_string(),
            inputs,
            outputs,
        });
        self.passes.push(Box::new(pass));

        id
    }

    /// Compile the graph into an execution order.
    ///
    /// A pass runs after every pass that writes a resource it reads. Ties are
    /// broken by insertion order, so the result is deterministic.
    pub fn compile(&self) -> Result<CompiledGraph, GraphError> {
        let mut dependencies: HashMap<PassId, BTreeSet<PassId>> = HashMap::new();

        for reader in &self.pass_nodes {
            let deps = dependencies.entry(reader.id).or_default();
            for writer in &self.pass_nodes {
                if reader.id == writer.id {
                    continue;
                }
                if reader
                    .inputs
                    .iter()
                    .any(|input| writer.writes_resource(input.resource))
                {
                    deps.insert(writer.id);
                }
            }
        }

        // Kahn's algorithm, always taking the earliest ready pass
        let mut in_degree: HashMap<PassId, usize> = dependencies
            .iter()
            .map(|(id, deps)| (*id, deps.len()))
            .collect();
        let mut ready: BTreeSet<PassId> = in_degree
            .iter()
            .filter(|(_, &degree)| degree == 0)
            .map(|(&id, _)| id)
            .collect();

        let mut pass_order = Vec::with_capacity(self.pass_nodes.len());
        while let Some(pass_id) = ready.pop_first() {
            pass_order.push(pass_id);

            for node in &self.pass_nodes {
                if dependencies[&node.id].contains(&pass_id) {
                    if let Some(degree) = in_degree.get_mut(&node.id) {
                        *degree -= 1;
                        if *degree == 0 {
                            ready.insert(node.id);
                        }
                    }
                }
            }
        }

        if pass_order.len() != self.pass_nodes.len() {
            let stuck = self
                .pass_nodes
                .iter()
                .filter(|n| !pass_order.contains(&n.id))
                .map(|n| n.name.clone())
                .collect();
            return Err(GraphError::Cycle(stuck));
        }

        Ok(CompiledGraph { pass_order })
    }

    /// Get pass nodes (metadata)
    pub fn pass_nodes(&self) -> &[PassNode] {
        &self.pass_nodes
    }

    /// Get all resources
    pub fn resources(&self) -> &[VirtualResource] {
        &self.resources
    }

    /// Get pass by ID
    pub fn get_pass(&self, id: PassId) -> Option<&dyn RenderPass> {
        let index = self.pass_nodes.iter().position(|n| n.id == id)?;
        Some(self.passes[index].as_ref())
    }

    /// Get pass node by ID
    pub fn get_pass_node(&self, id: PassId) -> Option<&PassNode> {
        self.pass_nodes.iter().find(|n| n.id == id)
    }
}

impl Default for RenderGraph {
    fn default() -> Self {
        Self::new()
    }
}

/// Compiled render graph with execution order
#[derive(Debug, Clone)]
pub struct CompiledGraph {
    pub pass_order: Vec<PassId>,
}

impl CompiledGraph {
    /// Pass names in execution order
    pub fn pass_names<'g>(&self, graph: &'g RenderGraph) -> Vec<&'g str> {
        self.pass_order
            .iter()
            .filter_map(|id| graph.get_pass_node(*id))
            .map(|node| node.name.as_str())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::PipelineError;

    struct TestPass {
        name: &'static str,
        reads: Vec<ResourceId>,
        writes: Vec<ResourceId>,
    }

    impl RenderPass for TestPass {
        fn name(&self) -> &str {
            self.name
        }

        fn setup(&mut self, ctx: &mut PassSetupContext) {
            for r in &self.reads {
                ctx.read(*r, ResourceUsage::TextureRead);
            }
            for w in &self.writes {
                ctx.write(*w, ResourceUsage::RenderTarget);
            }
        }

        fn execute(&self, _ctx: &mut PassExecuteContext) -> Result<(), PipelineError> {
            Ok(())
        }
    }

    fn pass(name: &'static str, reads: &[ResourceId], writes: &[ResourceId]) -> TestPass {
        TestPass {
            name,
            reads: reads.to_vec(),
            writes: writes.to_vec(),
        }
    }

    #[test]
    fn test_readers_run_after_writers() {
        let mut graph = RenderGraph::new();
        let moments = graph.import("moments");
        let blur0 = graph.import("blur0");
        let blur1 = graph.import("blur1");
        let screen = graph.register_external("screen");

        // Added out of order on purpose
        graph.add_pass(pass("shading", &[blur1], &[screen]));
        graph.add_pass(pass("blur vertical", &[blur0], &[blur1]));
        graph.add_pass(pass("blur horizontal", &[moments], &[blur0]));
        graph.add_pass(pass("moments", &[], &[moments]));

        let compiled = graph.compile().unwrap();
        assert_eq!(
            compiled.pass_names(&graph),
            vec!["moments", "blur horizontal", "blur vertical", "shading"]
        );
    }

    #[test]
    fn test_independent_passes_keep_insertion_order() {
        let mut graph = RenderGraph::new();
        let a = graph.import("a");
        let b = graph.import("b");
        graph.add_pass(pass("first", &[], &[a]));
        graph.add_pass(pass("second", &[], &[b]));
        graph.add_pass(pass("third", &[], &[]));

        let compiled = graph.compile().unwrap();
        assert_eq!(compiled.pass_names(&graph), vec!["first", "second", "third"]);
    }

    #[test]
    fn test_cycle_is_reported() {
        let mut graph = RenderGraph::new();
        let a = graph.import("a");
        let b = graph.import("b");
        graph.add_pass(pass("ping", &[b], &[a]));
        graph.add_pass(pass("pong", &[a], &[b]));

        assert_eq!(
            graph.compile().unwrap_err(),
            GraphError::Cycle(vec!["ping".into(), "pong".into()])
        );
    }

    #[test]
    fn test_import_is_idempotent_by_name() {
        let mut graph = RenderGraph::new();
        let a = graph.import("depth");
        assert_eq!(graph.import("depth"), a);
        assert_eq!(graph.resource("depth"), Some(a));
        assert_eq!(graph.resources().len(), 1);
    }
}
