//! Loopless K-shortest paths over a graph of (node, service chain stage) states.

use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet, BinaryHeap};

use ordered_float::OrderedFloat;

use crate::network::types::{NodeId, PathElement};

/// A state is a node together with the number of chain steps already traversed.
pub(crate) type State = (NodeId, usize);

#[derive(Debug, Clone, derive_new::new)]
pub(crate) struct Arc {
    pub(crate) from: usize,
    pub(crate) to: usize,
    pub(crate) elem: PathElement,
    pub(crate) cost: f64,
}

/// Links move between states of the same stage, resources advance the stage by one.
#[derive(Debug, Default, Clone)]
pub(crate) struct StateGraph {
    states: Vec<State>,
    index: BTreeMap<State, usize>,
    arcs: Vec<Arc>,
    out: Vec<Vec<usize>>,
}

impl StateGraph {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn state(&mut self, state: State) -> usize {
        if let Some(&i) = self.index.get(&state) {
            return i;
        }
        let i = self.states.len();
        self.states.push(state);
        self.out.push(Vec::new());
        self.index.insert(state, i);
        i
    }

    pub(crate) fn add_arc(&mut self, from: State, to: State, elem: PathElement, cost: f64) {
        let from = self.state(from);
        let to = self.state(to);
        self.out[from].push(self.arcs.len());
        self.arcs.push(Arc::new(from, to, elem, cost));
    }

    pub(crate) fn arc(&self, i: usize) -> &Arc {
        &self.arcs[i]
    }

    /// Paths from `source` to `target` by ascending cost. Yields nothing if either state
    /// has no arcs.
    pub(crate) fn paths(&self, source: State, target: State) -> Paths<'_> {
        let ends = self.index.get(&source).zip(self.index.get(&target));
        Paths {
            graph: self,
            ends: ends.map(|(&s, &t)| (s, t)),
            started: false,
            accepted: Vec::new(),
            pending: BinaryHeap::new(),
            seen: BTreeSet::new(),
        }
    }

    // Dijkstra avoiding the given arcs and states.
    fn shortest(
        &self,
        source: usize,
        target: usize,
        banned_arcs: &BTreeSet<usize>,
        banned_states: &BTreeSet<usize>,
    ) -> Option<Vec<usize>> {
        let mut dist = vec![f64::INFINITY; self.states.len()];
        let mut pred = vec![None::<usize>; self.states.len()];
        let mut heap = BinaryHeap::new();
        dist[source] = 0.0;
        heap.push(Reverse((OrderedFloat(0.0), source)));
        while let Some(Reverse((OrderedFloat(d), s))) = heap.pop() {
            if d > dist[s] {
                continue;
            }
            if s == target {
                break;
            }
            for &a in &self.out[s] {
                let arc = &self.arcs[a];
                if banned_arcs.contains(&a) || banned_states.contains(&arc.to) {
                    continue;
                }
                let next = d + arc.cost;
                if next < dist[arc.to] {
                    dist[arc.to] = next;
                    pred[arc.to] = Some(a);
                    heap.push(Reverse((OrderedFloat(next), arc.to)));
                }
            }
        }
        if dist[target].is_infinite() {
            return None;
        }
        let mut path = Vec::new();
        let mut cur = target;
        while cur != source {
            let a = pred[cur]?;
            path.push(a);
            cur = self.arcs[a].from;
        }
        path.reverse();
        Some(path)
    }

    fn cost(&self, path: &[usize]) -> f64 {
        path.iter().map(|&a| self.arcs[a].cost).sum()
    }
}

/// Yen's algorithm, one path per call to `next`.
#[derive(Debug)]
pub(crate) struct Paths<'a> {
    graph: &'a StateGraph,
    ends: Option<(usize, usize)>,
    started: bool,
    accepted: Vec<Vec<usize>>,
    pending: BinaryHeap<Reverse<(OrderedFloat<f64>, Vec<usize>)>>,
    seen: BTreeSet<Vec<usize>>,
}

impl Iterator for Paths<'_> {
    type Item = (Vec<usize>, f64);

    fn next(&mut self) -> Option<Self::Item> {
        let (source, target) = self.ends?;
        if !self.started {
            self.started = true;
            let path = self
                .graph
                .shortest(source, target, &BTreeSet::new(), &BTreeSet::new())?;
            self.seen.insert(path.clone());
            self.accepted.push(path.clone());
            let cost = self.graph.cost(&path);
            return Some((path, cost));
        }
        let last = self.accepted.last()?.clone();
        for i in 0..last.len() {
            let root = &last[..i];
            let spur = self.graph.arcs[last[i]].from;
            let banned_arcs: BTreeSet<usize> = self
                .accepted
                .iter()
                .filter(|p| p.len() > i && p[..i] == *root)
                .map(|p| p[i])
                .collect();
            let banned_states: BTreeSet<usize> = root.iter().map(|&a| self.graph.arcs[a].from).collect();
            if let Some(tail) = self
                .graph
                .shortest(spur, target, &banned_arcs, &banned_states)
            {
                let mut path = root.to_vec();
                path.extend(tail);
                if self.seen.insert(path.clone()) {
                    let cost = self.graph.cost(&path);
                    self.pending.push(Reverse((OrderedFloat(cost), path)));
                }
            }
        }
        let Reverse((OrderedFloat(cost), path)) = self.pending.pop()?;
        self.accepted.push(path.clone());
        Some((path, cost))
    }
}

#[cfg(test)]
mod tests {
    use crate::network::types::LinkId;

    use super::*;

    fn n(i: u64) -> State {
        (NodeId::new(i), 0)
    }

    // 0 -> 1 -> 3, 0 -> 2 -> 3, 1 -> 2, costs chosen so the order is unambiguous.
    fn diamond() -> StateGraph {
        let mut g = StateGraph::new();
        let arcs = [(0, 1, 1.0), (1, 3, 1.0), (0, 2, 2.0), (2, 3, 2.5), (1, 2, 0.2)];
        for (i, (a, b, c)) in arcs.into_iter().enumerate() {
            g.add_arc(n(a), n(b), PathElement::Link(LinkId::new(i as u64)), c);
        }
        g
    }

    #[test]
    fn enumerates_by_ascending_cost() {
        let g = diamond();
        let costs = g.paths(n(0), n(3)).map(|(_, c)| c).collect::<Vec<_>>();
        assert_eq!(costs.len(), 3);
        assert_eq!(costs[0], 2.0);
        assert!((costs[1] - 3.7).abs() < 1e-12);
        assert_eq!(costs[2], 4.5);
    }

    #[test]
    fn paths_are_loopless() {
        let mut g = diamond();
        g.add_arc(n(2), n(0), PathElement::Link(LinkId::new(9)), 0.0);
        for (path, _) in g.paths(n(0), n(3)) {
            let mut visited = BTreeSet::from([g.arc(path[0]).from]);
            for &a in &path {
                assert!(visited.insert(g.arc(a).to));
            }
        }
    }

    #[test]
    fn unknown_states_yield_nothing() {
        let g = diamond();
        assert_eq!(g.paths(n(0), n(7)).count(), 0);
        assert_eq!(StateGraph::new().paths(n(0), n(1)).count(), 0);
    }
}
