//! TaskGraph - dependency structure built from task specs
//!
//! Edges run dependency → dependent. The input node participates as an
//! implicit root so `depends_on: [input]` edges resolve like any other.
//!
//! Cycle detection uses the three-color DFS algorithm; the reported
//! error lists one offending cycle path.

use std::collections::VecDeque;
use std::sync::Arc;

use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;

use crate::ast::FlowSpec;
use crate::error::WeftError;

/// Stack-allocated edge lists: most tasks have 0-4 neighbors
pub type EdgeVec = SmallVec<[Arc<str>; 4]>;

/// Dependency graph over the runnable tasks of one workflow
pub struct TaskGraph {
    /// name → names that depend on it
    successors: FxHashMap<Arc<str>, EdgeVec>,
    /// name → names it depends on
    dependencies: FxHashMap<Arc<str>, EdgeVec>,
    /// Runnable task names in document order
    task_names: Vec<Arc<str>>,
    /// All node names including the input root
    node_set: FxHashSet<Arc<str>>,
}

impl TaskGraph {
    pub fn from_spec(spec: &FlowSpec) -> Self {
        let capacity = spec.tasks.len() + 1;
        let mut successors: FxHashMap<Arc<str>, EdgeVec> =
            FxHashMap::with_capacity_and_hasher(capacity, Default::default());
        let mut dependencies: FxHashMap<Arc<str>, EdgeVec> =
            FxHashMap::with_capacity_and_hasher(capacity, Default::default());
        let mut task_names: Vec<Arc<str>> = Vec::with_capacity(spec.tasks.len());
        let mut node_set: FxHashSet<Arc<str>> =
            FxHashSet::with_capacity_and_hasher(capacity, Default::default());

        let root: Arc<str> = Arc::from(spec.input.name.as_str());
        node_set.insert(Arc::clone(&root));
        successors.insert(Arc::clone(&root), EdgeVec::new());

        for task in spec.runnable_tasks() {
            let name: Arc<str> = Arc::from(task.name.as_str());
            task_names.push(Arc::clone(&name));
            node_set.insert(Arc::clone(&name));
            successors.entry(Arc::clone(&name)).or_default();
            dependencies.entry(name).or_default();
        }

        for task in spec.runnable_tasks() {
            let name = node_set
                .get(task.name.as_str())
                .cloned()
                .unwrap_or_else(|| Arc::from(task.name.as_str()));
            for dep in &task.depends_on {
                let dep_arc = node_set
                    .get(dep.as_str())
                    .cloned()
                    .unwrap_or_else(|| Arc::from(dep.as_str()));
                successors
                    .entry(Arc::clone(&dep_arc))
                    .or_default()
                    .push(Arc::clone(&name));
                dependencies.entry(Arc::clone(&name)).or_default().push(dep_arc);
            }
        }

        Self {
            successors,
            dependencies,
            task_names,
            node_set,
        }
    }

    #[inline]
    pub fn dependencies_of(&self, name: &str) -> &[Arc<str>] {
        static EMPTY: &[Arc<str>] = &[];
        self.dependencies.get(name).map_or(EMPTY, SmallVec::as_slice)
    }

    #[inline]
    pub fn successors_of(&self, name: &str) -> &[Arc<str>] {
        static EMPTY: &[Arc<str>] = &[];
        self.successors.get(name).map_or(EMPTY, SmallVec::as_slice)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.node_set.contains(name)
    }

    pub fn task_names(&self) -> &[Arc<str>] {
        &self.task_names
    }

    /// Every ancestor a task is allowed to observe: its declared
    /// dependencies, transitively (BFS over dependency edges)
    pub fn transitive_dependencies(&self, name: &str) -> FxHashSet<Arc<str>> {
        let mut visible: FxHashSet<Arc<str>> = FxHashSet::default();
        let mut queue: VecDeque<&str> = VecDeque::new();
        queue.push_back(name);

        while let Some(current) = queue.pop_front() {
            for dep in self.dependencies_of(current) {
                if visible.insert(Arc::clone(dep)) {
                    queue.push_back(dep.as_ref());
                }
            }
        }

        visible
    }

    /// BFS reachability along dependency → dependent edges
    pub fn has_path(&self, from: &str, to: &str) -> bool {
        if from == to {
            return true;
        }

        let mut visited: FxHashSet<&str> = FxHashSet::default();
        let mut queue: VecDeque<&str> = VecDeque::new();
        queue.push_back(from);
        visited.insert(from);

        while let Some(current) = queue.pop_front() {
            if let Some(neighbors) = self.successors.get(current) {
                for neighbor in neighbors {
                    if neighbor.as_ref() == to {
                        return true;
                    }
                    if visited.insert(neighbor.as_ref()) {
                        queue.push_back(neighbor.as_ref());
                    }
                }
            }
        }

        false
    }

    /// Detect cycles with three-color DFS
    ///
    /// White: unvisited, Gray: on the current DFS path, Black: done.
    /// Meeting a Gray node means the path from its stack position back
    /// to it is a cycle.
    pub fn detect_cycles(&self) -> Result<(), WeftError> {
        #[derive(Clone, Copy, PartialEq, Eq)]
        enum Color {
            White,
            Gray,
            Black,
        }

        let mut colors: FxHashMap<Arc<str>, Color> = self
            .task_names
            .iter()
            .map(|name| (Arc::clone(name), Color::White))
            .collect();
        let mut stack: Vec<Arc<str>> = Vec::new();

        fn dfs(
            node: Arc<str>,
            successors: &FxHashMap<Arc<str>, EdgeVec>,
            colors: &mut FxHashMap<Arc<str>, Color>,
            stack: &mut Vec<Arc<str>>,
        ) -> Result<(), String> {
            colors.insert(Arc::clone(&node), Color::Gray);
            stack.push(Arc::clone(&node));

            if let Some(neighbors) = successors.get(&node) {
                for neighbor in neighbors {
                    match colors.get(neighbor) {
                        Some(Color::Gray) => {
                            let cycle_start = stack
                                .iter()
                                .position(|x| x.as_ref() == neighbor.as_ref())
                                .unwrap_or(0);
                            let cycle: Vec<&str> =
                                stack[cycle_start..].iter().map(|s| s.as_ref()).collect();
                            return Err(format!("{} → {}", cycle.join(" → "), neighbor));
                        }
                        Some(Color::White) => {
                            dfs(Arc::clone(neighbor), successors, colors, stack)?;
                        }
                        // Input root and finished nodes need no visit
                        Some(Color::Black) | None => {}
                    }
                }
            }

            stack.pop();
            colors.insert(node, Color::Black);
            Ok(())
        }

        for name in &self.task_names {
            if colors.get(name) == Some(&Color::White) {
                if let Err(cycle) = dfs(Arc::clone(name), &self.successors, &mut colors, &mut stack)
                {
                    return Err(WeftError::CycleDetected { cycle });
                }
            }
        }

        Ok(())
    }
}
