use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tempfile::TempDir;

use crate::errors::ExportError;
use crate::page::{Download, ElementState, WebPage};
use crate::selector::Selector;

pub type NodeId = usize;

type ClickHook = Arc<dyn Fn(&mut FakeDom) + Send + Sync>;
type FillHook = Arc<dyn Fn(&mut FakeDom, &str) + Send + Sync>;

/// One element of the in-memory document.
#[derive(Debug, Clone)]
pub struct FakeNode {
    tag: String,
    role: Option<String>,
    name: Option<String>,
    text: String,
    css_id: Option<String>,
    visible: bool,
    enabled: bool,
    checked: bool,
    value: String,
    label: Option<String>,
    download: Option<(String, Vec<u8>)>,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

impl FakeNode {
    pub fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_string(),
            role: None,
            name: None,
            text: String::new(),
            css_id: None,
            visible: true,
            enabled: true,
            checked: false,
            value: String::new(),
            label: None,
            download: None,
            parent: None,
            children: Vec::new(),
        }
    }

    pub fn role(mut self, role: &str) -> Self {
        self.role = Some(role.to_string());
        self
    }

    /// Accessible name; defaults to the text content.
    pub fn name(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    pub fn text(mut self, text: &str) -> Self {
        self.text = text.to_string();
        self
    }

    pub fn id(mut self, id: &str) -> Self {
        self.css_id = Some(id.to_string());
        self
    }

    pub fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Test-only label reported by [`FakePage::clicked_tags`].
    pub fn tag_as(mut self, label: &str) -> Self {
        self.label = Some(label.to_string());
        self
    }

    /// Clicking the node starts a download of `bytes`.
    pub fn download(mut self, file_name: &str, bytes: &[u8]) -> Self {
        self.download = Some((file_name.to_string(), bytes.to_vec()));
        self
    }

    pub fn value(&self) -> &str {
        &self.value
    }
}

fn norm(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn text_matches(actual: &str, wanted: &str, exact: bool) -> bool {
    let wanted = norm(wanted);
    if exact {
        actual == wanted
    } else {
        actual.to_lowercase().contains(&wanted.to_lowercase())
    }
}

/// A tiny document tree that interprets [`Selector`]s the way the browser
/// query script does.
pub struct FakeDom {
    nodes: Vec<FakeNode>,
    click_hooks: HashMap<NodeId, Vec<ClickHook>>,
    fill_hooks: HashMap<NodeId, Vec<FillHook>>,
}

impl FakeDom {
    fn new() -> Self {
        Self {
            nodes: vec![FakeNode::new("body")],
            click_hooks: HashMap::new(),
            fill_hooks: HashMap::new(),
        }
    }

    pub fn root(&self) -> NodeId {
        0
    }

    pub fn add(&mut self, parent: NodeId, mut node: FakeNode) -> NodeId {
        let id = self.nodes.len();
        node.parent = Some(parent);
        self.nodes.push(node);
        self.nodes[parent].children.push(id);
        id
    }

    pub fn node(&self, id: NodeId) -> &FakeNode {
        &self.nodes[id]
    }

    pub fn set_visible(&mut self, id: NodeId, visible: bool) {
        self.nodes[id].visible = visible;
    }

    pub fn set_enabled(&mut self, id: NodeId, enabled: bool) {
        self.nodes[id].enabled = enabled;
    }

    pub fn set_checked(&mut self, id: NodeId, checked: bool) {
        self.nodes[id].checked = checked;
    }

    pub fn set_name(&mut self, id: NodeId, name: &str) {
        self.nodes[id].name = Some(name.to_string());
    }

    pub fn on_click(&mut self, id: NodeId, hook: impl Fn(&mut FakeDom) + Send + Sync + 'static) {
        self.click_hooks.entry(id).or_default().push(Arc::new(hook));
    }

    pub fn on_fill(
        &mut self,
        id: NodeId,
        hook: impl Fn(&mut FakeDom, &str) + Send + Sync + 'static,
    ) {
        self.fill_hooks.entry(id).or_default().push(Arc::new(hook));
    }

    fn full_text(&self, id: NodeId) -> String {
        let node = &self.nodes[id];
        let mut parts = vec![node.text.clone()];
        parts.extend(node.children.iter().map(|c| self.full_text(*c)));
        norm(&parts.join(" "))
    }

    fn accessible_name(&self, id: NodeId) -> String {
        match &self.nodes[id].name {
            Some(name) => norm(name),
            None => self.full_text(id),
        }
    }

    fn is_visible(&self, id: NodeId) -> bool {
        let mut current = Some(id);
        while let Some(node) = current {
            if !self.nodes[node].visible {
                return false;
            }
            current = self.nodes[node].parent;
        }
        true
    }

    fn descendants(&self, id: NodeId, out: &mut Vec<NodeId>) {
        for child in &self.nodes[id].children {
            out.push(*child);
            self.descendants(*child, out);
        }
    }

    fn document_order(&self) -> Vec<NodeId> {
        let mut order = Vec::new();
        self.descendants(self.root(), &mut order);
        order
    }

    fn scope(&self, current: &Option<Vec<NodeId>>) -> Vec<NodeId> {
        match current {
            None => self.document_order(),
            Some(roots) => {
                let mut inside = Vec::new();
                for root in roots {
                    self.descendants(*root, &mut inside);
                }
                let order = self.document_order();
                order.into_iter().filter(|n| inside.contains(n)).collect()
            }
        }
    }

    fn css_matches(&self, id: NodeId, query: &str) -> bool {
        let node = &self.nodes[id];
        let query = query.trim();
        if let Some(rest) = query.strip_prefix("[id^=") {
            let prefix = rest.trim_end_matches(']').trim_matches(|c| c == '\'' || c == '"');
            return node.css_id.as_deref().is_some_and(|id| id.starts_with(prefix));
        }
        if let Some(id) = query.strip_prefix('#') {
            return node.css_id.as_deref() == Some(id);
        }
        node.tag == query
    }

    fn step(
        &self,
        current: Option<Vec<NodeId>>,
        selector: &Selector,
    ) -> Result<Vec<NodeId>, ExportError> {
        Ok(match selector {
            Selector::Role { role, name, exact } => self
                .scope(&current)
                .into_iter()
                .filter(|n| self.nodes[*n].role.as_deref() == Some(role.as_str()))
                .filter(|n| {
                    name.as_ref()
                        .map_or(true, |wanted| text_matches(&self.accessible_name(*n), wanted, *exact))
                })
                .collect(),
            Selector::Text { text, exact } => {
                let hits: Vec<NodeId> = self
                    .scope(&current)
                    .into_iter()
                    .filter(|n| text_matches(&self.full_text(*n), text, *exact))
                    .collect();
                hits.iter()
                    .copied()
                    .filter(|n| !self.nodes[*n].children.iter().any(|c| hits.contains(c)))
                    .collect()
            }
            Selector::Css(query) => self
                .scope(&current)
                .into_iter()
                .filter(|n| self.css_matches(*n, query))
                .collect(),
            Selector::HasText(text) => current
                .unwrap_or_else(|| self.document_order())
                .into_iter()
                .filter(|n| text_matches(&self.full_text(*n), text, false))
                .collect(),
            Selector::Nth(index) => {
                let base = current.unwrap_or_default();
                let index = if *index < 0 {
                    base.len() as i32 + index
                } else {
                    *index
                };
                base.get(index as usize)
                    .filter(|_| index >= 0)
                    .map(|n| vec![*n])
                    .unwrap_or_default()
            }
            Selector::Visible(visible) => current
                .unwrap_or_else(|| self.document_order())
                .into_iter()
                .filter(|n| self.is_visible(*n) == *visible)
                .collect(),
            Selector::Chain(parts) => {
                let mut current = current;
                for part in parts {
                    current = Some(self.step(current, part)?);
                }
                current.unwrap_or_default()
            }
            Selector::Invalid(reason) => return Err(ExportError::InvalidSelector(reason.clone())),
        })
    }

    pub fn resolve(&self, selector: &Selector) -> Result<Vec<NodeId>, ExportError> {
        self.step(None, selector)
    }

    fn state(&self, id: NodeId) -> ElementState {
        let node = &self.nodes[id];
        ElementState {
            visible: self.is_visible(id),
            enabled: node.enabled,
            checked: node.checked,
            text: self.full_text(id),
        }
    }

    fn first(&self, selector: &Selector) -> Result<NodeId, ExportError> {
        self.resolve(selector)?
            .into_iter()
            .next()
            .ok_or_else(|| ExportError::ElementNotFound(selector.to_string()))
    }

    fn fire_click(&mut self, id: NodeId) {
        let hooks = self.click_hooks.get(&id).cloned().unwrap_or_default();
        for hook in hooks {
            hook(self);
        }
    }

    fn fire_fill(&mut self, id: NodeId, value: &str) {
        let hooks = self.fill_hooks.get(&id).cloned().unwrap_or_default();
        for hook in hooks {
            hook(self, value);
        }
    }
}

/// In-memory [`WebPage`] that records every interaction.
pub struct FakePage {
    dom: Mutex<FakeDom>,
    downloads: TempDir,
    calls: Mutex<Vec<String>>,
    clicked_tags: Mutex<Vec<String>>,
    fills: Mutex<Vec<(String, String)>>,
    closed: AtomicBool,
}

impl FakePage {
    pub fn new() -> Self {
        Self {
            dom: Mutex::new(FakeDom::new()),
            downloads: TempDir::new().expect("download dir"),
            calls: Mutex::new(Vec::new()),
            clicked_tags: Mutex::new(Vec::new()),
            fills: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        }
    }

    pub fn with_dom<R>(&self, f: impl FnOnce(&mut FakeDom) -> R) -> R {
        f(&mut self.dom.lock().unwrap())
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Labels (see [`FakeNode::tag_as`]) of clicked nodes, in order.
    pub fn clicked_tags(&self) -> Vec<String> {
        self.clicked_tags.lock().unwrap().clone()
    }

    /// `(accessible name, value)` of every fill, in order.
    pub fn fills(&self) -> Vec<(String, String)> {
        self.fills.lock().unwrap().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn click_node(&self, dom: &mut FakeDom, id: NodeId) {
        if let Some(label) = &dom.node(id).label {
            self.clicked_tags.lock().unwrap().push(label.clone());
        }
        self.record(format!("click {}", dom.accessible_name(id)));
        dom.fire_click(id);
    }
}

#[async_trait::async_trait]
impl WebPage for FakePage {
    async fn goto(&self, url: &str) -> Result<(), ExportError> {
        self.record(format!("goto {url}"));
        Ok(())
    }

    async fn query(&self, selector: &Selector) -> Result<Vec<ElementState>, ExportError> {
        let dom = self.dom.lock().unwrap();
        Ok(dom
            .resolve(selector)?
            .into_iter()
            .map(|id| dom.state(id))
            .collect())
    }

    async fn click(&self, selector: &Selector) -> Result<(), ExportError> {
        let mut dom = self.dom.lock().unwrap();
        let id = dom.first(selector)?;
        self.click_node(&mut dom, id);
        Ok(())
    }

    async fn fill(&self, selector: &Selector, value: &str) -> Result<(), ExportError> {
        let mut dom = self.dom.lock().unwrap();
        let id = dom.first(selector)?;
        let name = dom.accessible_name(id);
        dom.nodes[id].value = value.to_string();
        self.fills.lock().unwrap().push((name.clone(), value.to_string()));
        self.record(format!("fill {name}={value}"));
        dom.fire_fill(id, value);
        Ok(())
    }

    async fn press(&self, selector: &Selector, key: &str) -> Result<(), ExportError> {
        let dom = self.dom.lock().unwrap();
        let id = dom.first(selector)?;
        self.record(format!("press {} {key}", dom.accessible_name(id)));
        Ok(())
    }

    async fn check(&self, selector: &Selector) -> Result<(), ExportError> {
        let mut dom = self.dom.lock().unwrap();
        let id = dom.first(selector)?;
        dom.set_checked(id, true);
        self.record(format!("check {}", dom.accessible_name(id)));
        Ok(())
    }

    async fn click_for_download(
        &self,
        selector: &Selector,
        _timeout: Duration,
    ) -> Result<Download, ExportError> {
        let mut dom = self.dom.lock().unwrap();
        let id = dom.first(selector)?;
        let download = dom.node(id).download.clone();
        self.click_node(&mut dom, id);
        let (file_name, bytes) = download
            .ok_or_else(|| ExportError::Download(format!("{selector} started no download")))?;
        let path = self.downloads.path().join(uuid::Uuid::new_v4().to_string());
        std::fs::write(&path, bytes)?;
        Ok(Download {
            suggested_filename: file_name,
            path,
        })
    }

    async fn screenshot(&self, path: &Path) -> Result<(), ExportError> {
        std::fs::write(path, b"page screenshot")?;
        self.record(format!("screenshot {}", path.display()));
        Ok(())
    }

    async fn close(&self) -> Result<(), ExportError> {
        self.closed.store(true, Ordering::SeqCst);
        self.record("close".to_string());
        Ok(())
    }
}
