use super::notify::{Notification, TraceContext, TraceEntry};
use super::ObjectError;
use std::collections::HashMap;

/// 节点句柄：下标加代数，节点释放后代数递增，旧句柄失效
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId {
    index: u32,
    generation: u32,
}

#[derive(Debug, Default)]
struct Node {
    name: String,
    parent: Option<NodeId>,
    value: Vec<String>,
    properties: Vec<(String, NodeId)>,
    lookup: HashMap<String, NodeId>,
    indexed: Vec<Option<NodeId>>,
    read_only: bool,
    is_type: bool,
    subscriptions: Vec<String>,
    watchers: Vec<String>,
    trace: Vec<TraceEntry>,
}

#[derive(Debug)]
struct Slot {
    generation: u32,
    node: Option<Node>,
}

/// 变量树
#[derive(Debug)]
pub struct ObjectTree {
    slots: Vec<Slot>,
    free: Vec<u32>,
    root: NodeId,
    pending: Vec<Notification>,
    tracing: bool,
}

fn index_of(part: &str) -> Option<usize> {
    part.strip_prefix('~')?.parse().ok()
}

impl ObjectTree {
    pub fn new(root_name: impl Into<String>) -> Self {
        let mut tree = Self {
            slots: Vec::new(),
            free: Vec::new(),
            root: NodeId {
                index: 0,
                generation: 0,
            },
            pending: Vec::new(),
            tracing: false,
        };
        tree.root = tree.alloc(Node {
            name: root_name.into(),
            ..Node::default()
        });
        tree
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    /// 打开修改记录
    pub fn set_tracing(&mut self, tracing: bool) {
        self.tracing = tracing;
    }

    pub fn is_tracing(&self) -> bool {
        self.tracing
    }

    fn alloc(&mut self, node: Node) -> NodeId {
        match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                slot.node = Some(node);
                NodeId {
                    index,
                    generation: slot.generation,
                }
            }
            None => {
                self.slots.push(Slot {
                    generation: 0,
                    node: Some(node),
                });
                NodeId {
                    index: (self.slots.len() - 1) as u32,
                    generation: 0,
                }
            }
        }
    }

    fn release(&mut self, id: NodeId) {
        let Some(node) = self.node_mut(id).map(std::mem::take) else {
            return;
        };
        for (_, child) in node.properties {
            self.release(child);
        }
        for child in node.indexed.into_iter().flatten() {
            self.release(child);
        }
        let slot = &mut self.slots[id.index as usize];
        slot.node = None;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index);
    }

    fn node(&self, id: NodeId) -> Option<&Node> {
        let slot = self.slots.get(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.node.as_ref()
    }

    fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.node.as_mut()
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.node(id).is_some()
    }

    // ---- 寻址 ----

    /// 按点分路径取子节点，不存在时创建
    ///
    /// 路径上遇到只读节点且子节点不存在时返回 `None`；`~N` 只能寻址已有的值。
    pub fn property(&mut self, id: NodeId, path: &str) -> Option<NodeId> {
        let mut current = id;
        for part in path.split('.').filter(|p| !p.is_empty()) {
            current = self.child(current, part, true)?;
        }
        Some(current)
    }

    /// 按点分路径查找，不创建节点
    pub fn lookup(&self, id: NodeId, path: &str) -> Option<NodeId> {
        let mut current = id;
        for part in path.split('.').filter(|p| !p.is_empty()) {
            let node = self.node(current)?;
            current = match index_of(part) {
                Some(index) => node.indexed.get(index).copied().flatten()?,
                None => node.lookup.get(part).copied()?,
            };
        }
        Some(current)
    }

    fn child(&mut self, id: NodeId, part: &str, create: bool) -> Option<NodeId> {
        let root = self.root;
        let node = self.node(id)?;
        let read_only = node.read_only;
        if let Some(index) = index_of(part) {
            if let Some(existing) = node.indexed.get(index).copied().flatten() {
                return Some(existing);
            }
            if !create || read_only || index >= node.value.len() {
                return None;
            }
            let child = self.alloc(Node {
                name: part.to_string(),
                parent: Some(id),
                ..Node::default()
            });
            let node = self.node_mut(id)?;
            if node.indexed.len() <= index {
                node.indexed.resize(index + 1, None);
            }
            node.indexed[index] = Some(child);
            return Some(child);
        }

        if let Some(existing) = node.lookup.get(part).copied() {
            return Some(existing);
        }
        if !create || read_only {
            return None;
        }
        let child = self.alloc(Node {
            name: part.to_string(),
            parent: Some(id),
            is_type: id == root && part == "TYPE",
            ..Node::default()
        });
        let node = self.node_mut(id)?;
        node.properties.push((part.to_string(), child));
        node.lookup.insert(part.to_string(), child);
        Some(child)
    }

    pub fn is_property(&self, id: NodeId, path: &str) -> bool {
        self.lookup(id, path).is_some()
    }

    /// 命名属性，按插入顺序
    pub fn properties(&self, id: NodeId) -> Vec<String> {
        self.node(id)
            .map(|node| node.properties.iter().map(|(name, _)| name.clone()).collect())
            .unwrap_or_default()
    }

    pub fn children(&self, id: NodeId) -> Vec<(String, NodeId)> {
        self.node(id)
            .map(|node| node.properties.clone())
            .unwrap_or_default()
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id)?.parent
    }

    pub fn name(&self, id: NodeId) -> &str {
        self.node(id).map_or("", |node| node.name.as_str())
    }

    pub fn value(&self, id: NodeId) -> &[String] {
        self.node(id).map_or(&[], |node| node.value.as_slice())
    }

    pub fn is_read_only(&self, id: NodeId) -> bool {
        self.node(id).is_some_and(|node| node.read_only)
    }

    pub fn is_type(&self, id: NodeId) -> bool {
        self.node(id).is_some_and(|node| node.is_type)
    }

    pub fn trace(&self, id: NodeId) -> &[TraceEntry] {
        self.node(id).map_or(&[], |node| node.trace.as_slice())
    }

    /// 完整名称：根名（以 `/` 结尾）加点分属性路径
    pub fn absolute_name(&self, id: NodeId) -> String {
        let mut parts = Vec::new();
        let mut current = Some(id);
        let mut root_name = String::new();
        while let Some(node_id) = current {
            let Some(node) = self.node(node_id) else {
                break;
            };
            match node.parent {
                Some(parent) => {
                    parts.push(node.name.as_str());
                    current = Some(parent);
                }
                None => {
                    root_name = node.name.clone();
                    current = None;
                }
            }
        }
        parts.reverse();
        if !root_name.ends_with('/') {
            root_name.push('/');
        }
        root_name + &parts.join(".")
    }

    // ---- 修改 ----

    fn writable(&self, id: NodeId, operation: &'static str) -> Result<(), ObjectError> {
        match self.node(id) {
            None => Err(ObjectError::Stale),
            Some(node) if node.read_only => Err(ObjectError::ReadOnly {
                path: self.absolute_name(id),
                operation,
            }),
            Some(_) => Ok(()),
        }
    }

    fn record(&mut self, id: NodeId, operation: &'static str, values: &[String], trace: Option<&TraceContext>) {
        if !self.tracing {
            return;
        }
        let Some(context) = trace else {
            return;
        };
        if let Some(node) = self.node_mut(id) {
            node.trace.push(TraceEntry {
                operation,
                values: values.to_vec(),
                context: context.clone(),
            });
        }
    }

    fn reset_indexed(&mut self, id: NodeId) {
        let indexed = self
            .node_mut(id)
            .map(|node| std::mem::take(&mut node.indexed))
            .unwrap_or_default();
        for child in indexed.into_iter().flatten() {
            self.release(child);
        }
    }

    /// 值变化后的通知
    fn notify(&mut self, id: NodeId, added: Vec<String>, removed: Vec<String>) {
        if added.is_empty() && removed.is_empty() {
            return;
        }
        let path = self.absolute_name(id);
        let Some(node) = self.node(id) else {
            return;
        };
        let subscriptions = node.subscriptions.clone();
        let is_type = node.is_type;
        let watchers = node.watchers.clone();

        for subscription in subscriptions {
            self.pending.push(Notification::Changed {
                node: id,
                subscription,
                added: added.clone(),
                removed: removed.clone(),
            });
        }
        if is_type {
            for type_name in removed {
                self.pending.push(Notification::DelType {
                    path: path.clone(),
                    type_name,
                });
            }
            for type_name in added {
                self.pending.push(Notification::NewType {
                    path: path.clone(),
                    type_name,
                });
            }
        }
        if !watchers.is_empty() {
            self.pending.push(Notification::Watch {
                node: id,
                functions: watchers,
            });
        }
    }

    /// `=`：整体替换
    pub fn set_value(&mut self, id: NodeId, values: Vec<String>, trace: Option<&TraceContext>) -> Result<(), ObjectError> {
        self.writable(id, "assign")?;
        self.record(id, "set", &values, trace);
        let old = self.value(id).to_vec();
        let removed: Vec<String> = old.iter().filter(|v| !values.contains(v)).cloned().collect();
        let added: Vec<String> = values.iter().filter(|v| !old.contains(v)).cloned().collect();
        self.reset_indexed(id);
        if let Some(node) = self.node_mut(id) {
            node.value = values;
        }
        self.notify(id, added, removed);
        Ok(())
    }

    /// `+=`：追加
    pub fn add_value(&mut self, id: NodeId, values: Vec<String>, trace: Option<&TraceContext>) -> Result<(), ObjectError> {
        self.writable(id, "append to")?;
        self.record(id, "add", &values, trace);
        let old = self.value(id);
        let mut added: Vec<String> = Vec::new();
        for value in &values {
            if !old.contains(value) && !added.contains(value) {
                added.push(value.clone());
            }
        }
        if let Some(node) = self.node_mut(id) {
            node.value.extend(values);
        }
        self.notify(id, added, Vec::new());
        Ok(())
    }

    /// `-=`：去掉所有匹配的值
    pub fn subtract_value(&mut self, id: NodeId, values: &[String], trace: Option<&TraceContext>) -> Result<(), ObjectError> {
        self.writable(id, "remove from")?;
        self.record(id, "subtract", values, trace);
        let old = self.value(id).to_vec();
        let removed: Vec<String> = values.iter().filter(|v| old.contains(v)).cloned().collect();
        if removed.is_empty() {
            return Ok(());
        }
        // 被删掉的值连同它的 `~N` 子节点一起释放，留下的按原顺序前移
        let mut dropped = Vec::new();
        if let Some(node) = self.node_mut(id) {
            let old_value = std::mem::take(&mut node.value);
            let mut old_indexed = std::mem::take(&mut node.indexed).into_iter();
            for item in old_value {
                let child = old_indexed.next().flatten();
                if values.contains(&item) {
                    dropped.extend(child);
                } else {
                    node.value.push(item);
                    node.indexed.push(child);
                }
            }
            while node.indexed.last() == Some(&None) {
                node.indexed.pop();
            }
        }
        let shifted: Vec<(usize, NodeId)> = self
            .node(id)
            .map(|node| {
                node.indexed
                    .iter()
                    .enumerate()
                    .filter_map(|(index, child)| child.map(|child| (index, child)))
                    .collect()
            })
            .unwrap_or_default();
        for (index, child) in shifted {
            if let Some(node) = self.node_mut(child) {
                node.name = format!("~{index}");
            }
        }
        for child in dropped {
            self.release(child);
        }
        self.notify(id, Vec::new(), removed);
        Ok(())
    }

    /// `*=`：只追加尚不存在的值
    pub fn unite_value(&mut self, id: NodeId, values: Vec<String>, trace: Option<&TraceContext>) -> Result<(), ObjectError> {
        self.writable(id, "unite with")?;
        self.record(id, "unite", &values, trace);
        let mut added = Vec::new();
        if let Some(node) = self.node_mut(id) {
            for value in values {
                if !node.value.contains(&value) {
                    node.value.push(value.clone());
                    added.push(value);
                }
            }
        }
        self.notify(id, added, Vec::new());
        Ok(())
    }

    /// 重命名节点；根下名为 `TYPE` 的节点成为类型节点
    pub fn set_name(&mut self, id: NodeId, name: &str) -> Result<(), ObjectError> {
        self.writable(id, "rename")?;
        let root = self.root;
        let parent = self.parent(id);
        let old = self.name(id).to_string();
        if let Some(parent) = parent {
            if let Some(parent_node) = self.node_mut(parent) {
                parent_node.lookup.remove(&old);
                parent_node.lookup.insert(name.to_string(), id);
                for entry in parent_node.properties.iter_mut() {
                    if entry.1 == id {
                        entry.0 = name.to_string();
                    }
                }
            }
        }
        if let Some(node) = self.node_mut(id) {
            node.name = name.to_string();
            node.is_type = parent == Some(root) && name == "TYPE";
        }
        Ok(())
    }

    /// 删除所有子节点并清空值
    pub fn clear(&mut self, id: NodeId, trace: Option<&TraceContext>) -> Result<(), ObjectError> {
        self.writable(id, "clear")?;
        let children = self
            .node_mut(id)
            .map(|node| {
                node.lookup.clear();
                std::mem::take(&mut node.properties)
            })
            .unwrap_or_default();
        for (_, child) in children {
            self.release(child);
        }
        self.set_value(id, Vec::new(), trace)
    }

    /// 递归设为只读
    pub fn set_read_only(&mut self, id: NodeId) {
        let Some(node) = self.node_mut(id) else {
            return;
        };
        node.read_only = true;
        let children: Vec<NodeId> = node
            .properties
            .iter()
            .map(|(_, child)| *child)
            .chain(node.indexed.iter().flatten().copied())
            .collect();
        for child in children {
            self.set_read_only(child);
        }
    }

    /// 订阅值变化，`name` 原样带回 [`Notification::Changed`]
    pub fn subscribe(&mut self, id: NodeId, name: &str) {
        if let Some(node) = self.node_mut(id) {
            if !node.subscriptions.iter().any(|s| s == name) {
                node.subscriptions.push(name.to_string());
            }
        }
    }

    /// 值变化后运行 `function`
    pub fn watch(&mut self, id: NodeId, function: &str) {
        if let Some(node) = self.node_mut(id) {
            if !node.watchers.iter().any(|w| w == function) {
                node.watchers.push(function.to_string());
            }
        }
    }

    /// 取出积累的通知
    pub fn take_notifications(&mut self) -> Vec<Notification> {
        std::mem::take(&mut self.pending)
    }

    /// 找出属性 `variable` 的值包含 `value` 的所有节点
    pub fn find(&self, id: NodeId, variable: &str, value: &str) -> Vec<NodeId> {
        let mut found = Vec::new();
        self.find_into(id, variable, value, &mut found);
        found
    }

    fn find_into(&self, id: NodeId, variable: &str, value: &str, found: &mut Vec<NodeId>) {
        let Some(node) = self.node(id) else {
            return;
        };
        if let Some(target) = node.lookup.get(variable) {
            if self.value(*target).iter().any(|v| v == value) {
                found.push(id);
            }
        }
        for child in node.indexed.iter().flatten() {
            self.find_into(*child, variable, value, found);
        }
        for (_, child) in &node.properties {
            self.find_into(*child, variable, value, found);
        }
    }

    // ---- 输出 ----

    /// 输出整棵子树：`*"名称"`，`~N = 值`，`+属性 = 值`
    pub fn dump(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.dump_into(id, &mut out);
        out
    }

    fn dump_into(&self, id: NodeId, out: &mut String) {
        let Some(node) = self.node(id) else {
            return;
        };
        out.push_str(&format!("*{:?}\n", self.absolute_name(id)));
        for (index, child) in node.indexed.iter().enumerate() {
            if let Some(child) = child {
                out.push_str(&format!("~{} = {}\n", index, self.value(*child).join(" ")));
                self.dump_trace(*child, out);
            }
        }
        for (name, child) in &node.properties {
            out.push_str(&format!("+{} = {}\n", name, self.value(*child).join(" ")));
            self.dump_trace(*child, out);
        }
        let nested = node
            .indexed
            .iter()
            .flatten()
            .chain(node.properties.iter().map(|(_, child)| child));
        for child in nested {
            let has_children = self
                .node(*child)
                .is_some_and(|n| !n.properties.is_empty() || n.indexed.iter().any(Option::is_some));
            if has_children {
                self.dump_into(*child, out);
            }
        }
    }

    fn dump_trace(&self, id: NodeId, out: &mut String) {
        for entry in self.trace(id) {
            out.push_str(&format!("    {entry}\n"));
        }
    }
}
