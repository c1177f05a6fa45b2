use std::slice::Iter;

/// Half of an undirected edge, stored in the adjacency list of its source node.
#[derive(Copy, Clone, Debug)]
pub(crate) struct DiEdge {
    pub(crate) target: u32,
    pub(crate) weight: f64,
}

/// A borrowed view of one undirected edge.
#[derive(Copy, Clone, Debug)]
pub struct Edge<'a> {
    source: u32,
    target: u32,
    weight: &'a f64,
}

impl<'a> Edge<'a> {
    pub fn source(&self) -> u32 {
        self.source
    }
    pub fn target(&self) -> u32 {
        self.target
    }
    pub fn weight(&self) -> &'a f64 {
        self.weight
    }
}

/// Edges incident to a single node.
pub struct Edges<'a> {
    source: u32,
    iter: Iter<'a, DiEdge>,
}

impl<'a> Iterator for Edges<'a> {
    type Item = Edge<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        self.iter.next().map(|DiEdge { target, weight }| Edge {
            source: self.source,
            target: *target,
            weight,
        })
    }
}

/// Every undirected edge of the graph exactly once, reported from its lower-numbered endpoint.
pub struct EdgeReferences<'a> {
    adjacency: &'a [Vec<DiEdge>],
    source: usize,
    iter: Option<Iter<'a, DiEdge>>,
}

impl<'a> Iterator for EdgeReferences<'a> {
    type Item = Edge<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(iter) = self.iter.as_mut() {
                for DiEdge { target, weight } in iter.by_ref() {
                    if *target as usize >= self.source {
                        return Some(Edge {
                            source: self.source as u32,
                            target: *target,
                            weight,
                        });
                    }
                }
                self.source += 1;
            }
            let edges = self.adjacency.get(self.source)?;
            self.iter = Some(edges.iter());
        }
    }
}

/// Adjacency-list graph with `f64` node and edge weights, indexed by `u32`.
#[derive(Clone, Debug, Default)]
pub struct UnGraph {
    pub(crate) edges: Vec<Vec<DiEdge>>,
    node_weights: Vec<f64>,
    total_edges: usize,
}

impl UnGraph {
    pub fn with_capacity(nodes: usize) -> Self {
        UnGraph {
            edges: Vec::with_capacity(nodes),
            node_weights: Vec::with_capacity(nodes),
            total_edges: 0,
        }
    }

    pub fn add_node(&mut self, weight: f64) -> u32 {
        let index = self.edges.len() as u32;
        self.edges.push(vec![]);
        self.node_weights.push(weight);
        index
    }

    /// Add an undirected edge. Self loops are not representable.
    pub fn add_edge(&mut self, source: u32, target: u32, weight: f64) {
        assert_ne!(source, target, "self loop on node {source}");
        self.edges[source as usize].push(DiEdge { target, weight });
        self.edges[target as usize].push(DiEdge { target: source, weight });
        self.total_edges += 1;
    }

    pub fn edge_count(&self) -> usize {
        self.total_edges
    }

    pub fn node_count(&self) -> usize {
        self.node_weights.len()
    }

    pub fn node_weight(&self, ix: u32) -> Option<&f64> {
        self.node_weights.get(ix as usize)
    }

    pub fn node_weight_mut(&mut self, ix: u32) -> Option<&mut f64> {
        self.node_weights.get_mut(ix as usize)
    }

    pub fn edges(&self, source: u32) -> Edges<'_> {
        Edges {
            source,
            iter: self.edges[source as usize].iter(),
        }
    }

    pub fn edge_references(&self) -> EdgeReferences<'_> {
        EdgeReferences {
            adjacency: &self.edges,
            source: 0,
            iter: None,
        }
    }
}
