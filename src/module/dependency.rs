//! 模块依赖管理
//!
//! 本模块提供模块依赖关系的图结构和解析器。
//!
//! # 主要组件
//!
//! - [`DependencyGraph`] - 依赖关系图，节点按发现顺序编号
//! - [`DependencyResolver`] - 依赖解析器，检测循环与缺失依赖并给出加载顺序
//!
//! # 示例
//!
//! ```rust
//! use std::sync::Arc;
//! use chips_plugin_host::module::{Descriptor, DependencyResolver};
//!
//! let descriptors = vec![
//!     Arc::new(Descriptor::new("c", "1.0.0").with_dependency("b")),
//!     Arc::new(Descriptor::new("b", "1.0.0").with_dependency("a")),
//!     Arc::new(Descriptor::new("a", "1.0.0")),
//! ];
//!
//! let resolution = DependencyResolver::new().resolve(&descriptors);
//! assert_eq!(resolution.names(), vec!["a", "b", "c"]);
//! assert!(resolution.rejected().is_empty());
//! ```

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::module::metadata::{module_key, Descriptor, FailureKind};
use crate::utils::PluginError;

/// 模块依赖关系图
///
/// 节点为模块描述，按输入（发现）顺序编号；边为存在于输入集合中的硬依赖。
/// 指向集合之外的依赖单独记录为缺失依赖。
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    /// 节点描述，下标即节点编号
    nodes: Vec<Arc<Descriptor>>,
    /// 模块键 -> 节点编号
    index: HashMap<String, usize>,
    /// 正向边：节点 -> 其依赖的节点（去重，保持声明顺序）
    edges: Vec<Vec<usize>>,
    /// 反向边：节点 -> 依赖它的节点
    reverse_edges: Vec<Vec<usize>>,
    /// 缺失依赖：节点 -> 不在集合中的依赖名
    missing: Vec<Vec<String>>,
    /// 被跳过的重名描述
    duplicates: Vec<String>,
}

impl DependencyGraph {
    /// 从描述集合构建依赖图
    ///
    /// 同名（大小写不敏感）描述只保留第一个。
    pub fn build(descriptors: &[Arc<Descriptor>]) -> Self {
        let mut graph = Self::default();

        for descriptor in descriptors {
            let key = descriptor.key();
            if graph.index.contains_key(&key) {
                debug!(module = %descriptor.name, "重名模块描述，跳过");
                graph.duplicates.push(descriptor.name.clone());
                continue;
            }
            graph.index.insert(key, graph.nodes.len());
            graph.nodes.push(descriptor.clone());
        }

        let n = graph.nodes.len();
        graph.edges = vec![Vec::new(); n];
        graph.reverse_edges = vec![Vec::new(); n];
        graph.missing = vec![Vec::new(); n];

        for (i, descriptor) in graph.nodes.iter().enumerate() {
            let mut seen = HashSet::new();
            for dep in &descriptor.dependencies {
                match graph.index.get(&module_key(dep)) {
                    Some(&j) => {
                        if seen.insert(j) {
                            graph.edges[i].push(j);
                            graph.reverse_edges[j].push(i);
                        }
                    }
                    None => graph.missing[i].push(dep.clone()),
                }
            }
        }

        graph
    }

    /// 节点数量
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// 是否包含模块
    pub fn contains_module(&self, name: &str) -> bool {
        self.index.contains_key(&module_key(name))
    }

    /// 获取模块在集合内的直接依赖
    pub fn get_dependencies(&self, name: &str) -> Vec<String> {
        self.index
            .get(&module_key(name))
            .map(|&i| self.edges[i].iter().map(|&j| self.nodes[j].name.clone()).collect())
            .unwrap_or_default()
    }

    /// 获取直接依赖该模块的模块
    pub fn get_dependents(&self, name: &str) -> Vec<String> {
        self.index
            .get(&module_key(name))
            .map(|&i| {
                self.reverse_edges[i]
                    .iter()
                    .map(|&j| self.nodes[j].name.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// 被跳过的重名描述
    pub fn duplicates(&self) -> &[String] {
        &self.duplicates
    }

    /// 是否存在循环依赖
    pub fn has_cycle(&self) -> bool {
        self.cycle_marks().iter().any(Option::is_some)
    }

    /// 标记每个节点是否处于或可达一个依赖环
    ///
    /// 迭代式三色 DFS，带记忆化：每个节点只展开一次，总代价 O(V + E)。
    /// 一次遍历中重新进入仍在展开中的节点即视为成环（包括 A→A 自依赖
    /// 和 A→B→A→A 形式的重入）；已证明无环的共享子图不会被重复遍历，
    /// 因此菱形依赖不会被误判为环。
    ///
    /// 返回值下标为节点编号，`Some(path)` 为该节点可达的环路径（首尾相同）。
    fn cycle_marks(&self) -> Vec<Option<Vec<usize>>> {
        #[derive(Clone, Copy, PartialEq, Eq)]
        enum Mark {
            Unvisited,
            InProgress,
            Done,
        }

        let n = self.nodes.len();
        let mut marks = vec![Mark::Unvisited; n];
        let mut cycles: Vec<Option<Vec<usize>>> = vec![None; n];
        let mut stack_pos: Vec<Option<usize>> = vec![None; n];

        for root in 0..n {
            if marks[root] != Mark::Unvisited {
                continue;
            }

            let mut stack: Vec<(usize, usize)> = vec![(root, 0)];
            marks[root] = Mark::InProgress;
            stack_pos[root] = Some(0);

            while let Some(&(node, next)) = stack.last() {
                if next < self.edges[node].len() {
                    if let Some(top) = stack.last_mut() {
                        top.1 += 1;
                    }
                    let dep = self.edges[node][next];
                    match marks[dep] {
                        Mark::Unvisited => {
                            marks[dep] = Mark::InProgress;
                            stack_pos[dep] = Some(stack.len());
                            stack.push((dep, 0));
                        }
                        Mark::InProgress => {
                            if cycles[node].is_none() {
                                let start = stack_pos[dep].unwrap_or(0);
                                let mut path: Vec<usize> =
                                    stack[start..].iter().map(|&(v, _)| v).collect();
                                path.push(dep);
                                cycles[node] = Some(path);
                            }
                        }
                        Mark::Done => {
                            if cycles[node].is_none() {
                                if let Some(path) = cycles[dep].clone() {
                                    cycles[node] = Some(path);
                                }
                            }
                        }
                    }
                } else {
                    stack.pop();
                    marks[node] = Mark::Done;
                    stack_pos[node] = None;
                    if let (Some(path), Some(&(parent, _))) = (cycles[node].clone(), stack.last()) {
                        if cycles[parent].is_none() {
                            cycles[parent] = Some(path);
                        }
                    }
                }
            }
        }

        cycles
    }

    /// 查找一个循环依赖路径
    ///
    /// 返回参与循环的模块名路径（首尾相同），无环时返回 `None`。
    pub fn find_cycle(&self) -> Option<Vec<String>> {
        self.cycle_marks()
            .into_iter()
            .flatten()
            .next()
            .map(|path| self.path_names(&path))
    }

    fn path_names(&self, path: &[usize]) -> Vec<String> {
        path.iter().map(|&i| self.nodes[i].name.clone()).collect()
    }
}

/// 被排除在加载顺序之外的模块
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    /// 模块名
    pub module: String,
    /// 失败分类
    pub kind: FailureKind,
    /// 上下文：环路径或相关依赖名
    pub context: String,
}

impl Rejection {
    /// 转换为错误值
    pub fn to_error(&self) -> PluginError {
        match self.kind {
            FailureKind::CyclicDependency => PluginError::CyclicDependency {
                module: self.module.clone(),
                path: self.context.clone(),
            },
            FailureKind::MissingDependency => PluginError::MissingDependency {
                module: self.module.clone(),
                dependency: self.context.clone(),
            },
            _ => PluginError::DependencyFailed {
                module: self.module.clone(),
                dependency: self.context.clone(),
            },
        }
    }
}

/// 依赖解析结果
#[derive(Debug, Clone, Default)]
pub struct Resolution {
    order: Vec<Arc<Descriptor>>,
    rejected: Vec<Rejection>,
    duplicates: Vec<String>,
}

impl Resolution {
    /// 安全的加载顺序
    pub fn order(&self) -> &[Arc<Descriptor>] {
        &self.order
    }

    /// 加载顺序中的模块名
    pub fn names(&self) -> Vec<&str> {
        self.order.iter().map(|d| d.name.as_str()).collect()
    }

    /// 被排除的模块（按发现顺序）
    pub fn rejected(&self) -> &[Rejection] {
        &self.rejected
    }

    /// 被跳过的重名描述
    pub fn duplicates(&self) -> &[String] {
        &self.duplicates
    }

    /// 被标记为循环依赖的模块
    pub fn cyclic(&self) -> Vec<&str> {
        self.rejected
            .iter()
            .filter(|r| r.kind == FailureKind::CyclicDependency)
            .map(|r| r.module.as_str())
            .collect()
    }

    /// 查找模块的排除原因
    pub fn rejection(&self, name: &str) -> Option<&Rejection> {
        self.rejected
            .iter()
            .find(|r| r.module.eq_ignore_ascii_case(name))
    }

    /// 模块在加载顺序中的位置
    pub fn position(&self, name: &str) -> Option<usize> {
        self.order.iter().position(|d| d.name.eq_ignore_ascii_case(name))
    }
}

/// 依赖解析器
///
/// 无状态：每次调用 [`resolve`](Self::resolve) 都基于传入的描述集合重新计算。
#[derive(Debug, Clone, Default)]
pub struct DependencyResolver;

impl DependencyResolver {
    /// 创建解析器
    pub fn new() -> Self {
        Self
    }

    /// 解析加载顺序
    ///
    /// # 规则
    ///
    /// 1. 处于或依赖于依赖环的模块被标记为 `CyclicDependency` 并排除
    /// 2. 依赖不在集合中的模块被标记为 `MissingDependency` 并排除
    /// 3. 依赖于被排除模块的模块被标记为 `DependencyFailed` 并排除
    /// 4. 剩余模块按拓扑序输出；无路径关系的模块保持发现顺序，
    ///    `load_before` 提示在不与硬依赖冲突时生效
    pub fn resolve(&self, descriptors: &[Arc<Descriptor>]) -> Resolution {
        let graph = DependencyGraph::build(descriptors);
        let n = graph.len();

        let mut rejected: Vec<Option<Rejection>> = vec![None; n];

        for (i, cycle) in graph.cycle_marks().into_iter().enumerate() {
            if let Some(path) = cycle {
                rejected[i] = Some(Rejection {
                    module: graph.nodes[i].name.clone(),
                    kind: FailureKind::CyclicDependency,
                    context: graph.path_names(&path).join(" -> "),
                });
            }
        }

        for i in 0..n {
            if rejected[i].is_none() {
                if let Some(dep) = graph.missing[i].first() {
                    rejected[i] = Some(Rejection {
                        module: graph.nodes[i].name.clone(),
                        kind: FailureKind::MissingDependency,
                        context: dep.clone(),
                    });
                }
            }
        }

        // 排除结果沿反向边传播
        let mut queue: VecDeque<usize> = (0..n).filter(|&i| rejected[i].is_some()).collect();
        while let Some(i) = queue.pop_front() {
            for &dependent in &graph.reverse_edges[i] {
                if rejected[dependent].is_none() {
                    rejected[dependent] = Some(Rejection {
                        module: graph.nodes[dependent].name.clone(),
                        kind: FailureKind::DependencyFailed,
                        context: graph.nodes[i].name.clone(),
                    });
                    queue.push_back(dependent);
                }
            }
        }

        let accepted: Vec<bool> = rejected.iter().map(Option::is_none).collect();
        let order = Self::ordered(&graph, &accepted);

        let rejected: Vec<Rejection> = rejected.into_iter().flatten().collect();
        for rejection in &rejected {
            debug!(
                module = %rejection.module,
                kind = %rejection.kind,
                context = %rejection.context,
                "模块被排除出加载顺序"
            );
        }

        Resolution {
            order,
            rejected,
            duplicates: graph.duplicates.clone(),
        }
    }

    /// 对已接受的节点做稳定拓扑排序（Kahn 算法，按发现编号取最小）
    fn ordered(graph: &DependencyGraph, accepted: &[bool]) -> Vec<Arc<Descriptor>> {
        let n = graph.len();
        let mut hard_pending = vec![0usize; n];
        let mut soft_pending = vec![0usize; n];
        let mut soft_successors: Vec<Vec<usize>> = vec![Vec::new(); n];

        for i in (0..n).filter(|&i| accepted[i]) {
            hard_pending[i] = graph.edges[i].len();

            let mut seen = HashSet::new();
            for target in &graph.nodes[i].load_before {
                if let Some(&j) = graph.index.get(&module_key(target)) {
                    if j != i && accepted[j] && seen.insert(j) {
                        soft_successors[i].push(j);
                        soft_pending[j] += 1;
                    }
                }
            }
        }

        let mut hard_ready: BTreeSet<usize> = BTreeSet::new();
        let mut ready: BTreeSet<usize> = BTreeSet::new();
        for i in (0..n).filter(|&i| accepted[i]) {
            if hard_pending[i] == 0 {
                hard_ready.insert(i);
                if soft_pending[i] == 0 {
                    ready.insert(i);
                }
            }
        }

        let total = accepted.iter().filter(|&&a| a).count();
        let mut order = Vec::with_capacity(total);
        let mut emitted = vec![false; n];

        while order.len() < total {
            let next = match ready.pop_first() {
                Some(i) => i,
                None => match hard_ready.first().copied() {
                    Some(i) => {
                        debug!(module = %graph.nodes[i].name, "load_before 提示相互矛盾，忽略");
                        i
                    }
                    None => {
                        warn!("依赖图在排除环之后仍无法排序");
                        break;
                    }
                },
            };
            hard_ready.remove(&next);
            ready.remove(&next);
            emitted[next] = true;
            order.push(graph.nodes[next].clone());

            for &dependent in &graph.reverse_edges[next] {
                if !accepted[dependent] {
                    continue;
                }
                hard_pending[dependent] -= 1;
                if hard_pending[dependent] == 0 {
                    hard_ready.insert(dependent);
                    if soft_pending[dependent] == 0 {
                        ready.insert(dependent);
                    }
                }
            }
            for &later in &soft_successors[next] {
                soft_pending[later] = soft_pending[later].saturating_sub(1);
                if !emitted[later] && soft_pending[later] == 0 && hard_pending[later] == 0 {
                    ready.insert(later);
                }
            }
        }

        order
    }
}
