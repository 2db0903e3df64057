//! Read-only configuration trees for units of work.
//!
//! A [`ConfigTree`] is an arena of nodes addressed by [`NodeId`]. Each node
//! has a tag name, an optional scalar value, and ordered children. Trees are
//! built programmatically, copied from any [`TreeSource`], or parsed from
//! markup.
//!
//! XML attributes are represented as leading children whose tag is
//! `@name`; [`ConfigTree::to_markup`] folds them back into attributes.
//!
//! Written markup reads back into the same tree. Names starting with `ffwd:`
//! are reserved for that: a tag that is not a markup name is written as a
//! `ffwd:node` element carrying a `ffwd:tag` attribute, and a value that text
//! content cannot hold (empty, or next to child elements) is written as a
//! `ffwd:value` attribute.

use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

use crate::error::CacheError;

/// Prefix marking a child node that represents a markup attribute.
pub const ATTRIBUTE_PREFIX: char = '@';

const RESERVED_PREFIX: &str = "ffwd:";
const NODE_ELEMENT: &str = "ffwd:node";
const TAG_ATTRIBUTE: &str = "ffwd:tag";
const VALUE_ATTRIBUTE: &str = "ffwd:value";

/// Index of a node inside its [`ConfigTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

impl NodeId {
    /// The root node of every tree.
    pub const ROOT: NodeId = NodeId(0);
}

#[derive(Debug, Clone)]
struct NodeData {
    tag: String,
    value: Option<String>,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    index: usize,
}

/// Any structured value tree that can be copied into a [`ConfigTree`].
///
/// Implementations exist for [`ConfigNode`] itself; host adapters implement it
/// for their own configuration representation.
pub trait TreeSource: Sized {
    /// The node's tag name.
    fn tag_name(&self) -> &str;
    /// The node's scalar value, if any.
    fn value(&self) -> Option<&str>;
    /// The node's children in document order.
    fn children(&self) -> Vec<Self>;
}

/// An ordered configuration tree with a single root.
#[derive(Debug, Clone)]
pub struct ConfigTree {
    nodes: Vec<NodeData>,
}

impl ConfigTree {
    /// Creates a tree holding only a root node.
    pub fn new(root_tag: impl Into<String>) -> Self {
        Self {
            nodes: vec![NodeData {
                tag: root_tag.into(),
                value: None,
                parent: None,
                children: Vec::new(),
                index: 0,
            }],
        }
    }

    /// Creates a root-only tree whose root carries a value.
    pub fn leaf(root_tag: impl Into<String>, value: impl Into<String>) -> Self {
        let mut tree = Self::new(root_tag);
        tree.nodes[0].value = Some(value.into());
        tree
    }

    /// Appends a child under `parent` and returns its id.
    ///
    /// # Panics
    ///
    /// Panics if `parent` does not belong to this tree.
    pub fn push_child(
        &mut self,
        parent: NodeId,
        tag: impl Into<String>,
        value: Option<&str>,
    ) -> NodeId {
        let id = NodeId(self.nodes.len());
        let index = self.nodes[parent.0].children.len();
        self.nodes.push(NodeData {
            tag: tag.into(),
            value: value.map(str::to_string),
            parent: Some(parent),
            children: Vec::new(),
            index,
        });
        self.nodes[parent.0].children.push(id);
        id
    }

    /// Sets or clears the value of an existing node.
    pub fn set_value(&mut self, node: NodeId, value: Option<&str>) {
        self.nodes[node.0].value = value.map(str::to_string);
    }

    /// Returns the root node.
    pub fn root(&self) -> ConfigNode<'_> {
        self.node(NodeId::ROOT)
    }

    /// Returns a handle for `id`.
    pub fn node(&self, id: NodeId) -> ConfigNode<'_> {
        ConfigNode { tree: self, id }
    }

    /// Number of nodes in the tree, root included.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Always `false`; a tree has at least its root.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Iterates all nodes in document (depth-first, pre-order) order.
    pub fn walk(&self) -> impl Iterator<Item = ConfigNode<'_>> {
        let mut stack = vec![NodeId::ROOT];
        std::iter::from_fn(move || {
            let id = stack.pop()?;
            stack.extend(self.nodes[id.0].children.iter().rev().copied());
            Some(self.node(id))
        })
    }

    /// Copies an arbitrary structured tree.
    pub fn from_source<S: TreeSource>(source: &S) -> Self {
        let mut tree = Self::new(source.tag_name());
        tree.set_value(NodeId::ROOT, source.value());
        tree.copy_children(NodeId::ROOT, source);
        tree
    }

    fn copy_children<S: TreeSource>(&mut self, parent: NodeId, source: &S) {
        for child in source.children() {
            let id = self.push_child(parent, child.tag_name(), child.value());
            self.copy_children(id, &child);
        }
    }

    /// Parses a markup document into a tree.
    ///
    /// Leaf text is kept verbatim. Text inside elements that also have element
    /// children is trimmed and dropped when only whitespace. Comments,
    /// declarations and processing instructions are ignored.
    pub fn from_markup(markup: &str) -> Result<Self, CacheError> {
        let mut reader = Reader::from_str(markup);
        let mut tree: Option<ConfigTree> = None;
        let mut open: Vec<OpenElement> = Vec::new();

        loop {
            match reader.read_event() {
                Ok(Event::Start(e)) => {
                    let element = open_element(&mut tree, &mut open, &e)?;
                    open.push(element);
                }
                Ok(Event::Empty(e)) => {
                    open_element(&mut tree, &mut open, &e)?;
                }
                Ok(Event::End(_)) => {
                    let element = open.pop().ok_or_else(|| markup_error("unbalanced end tag"))?;
                    if let Some(tree) = tree.as_mut() {
                        tree.finish_text(element)?;
                    }
                }
                Ok(Event::Text(t)) => {
                    let text = t.unescape().map_err(|e| markup_error(e))?;
                    match open.last_mut() {
                        Some(element) => element.text.push_str(&text),
                        None if text.trim().is_empty() => {}
                        None => return Err(markup_error("text outside the root element")),
                    }
                }
                Ok(Event::CData(c)) => {
                    let raw = c.into_inner();
                    let text = std::str::from_utf8(&raw).map_err(|e| markup_error(e))?;
                    match open.last_mut() {
                        Some(element) => element.text.push_str(text),
                        None => return Err(markup_error("CDATA outside the root element")),
                    }
                }
                Ok(Event::Eof) => break,
                Ok(_) => {}
                Err(e) => return Err(markup_error(e)),
            }
        }

        if !open.is_empty() {
            return Err(markup_error("unclosed element at end of input"));
        }
        tree.ok_or_else(|| markup_error("document has no root element"))
    }

    fn finish_text(&mut self, element: OpenElement) -> Result<(), CacheError> {
        let OpenElement {
            id,
            text,
            explicit,
            has_elements,
        } = element;
        if explicit {
            if !text.trim().is_empty() {
                return Err(markup_error(format!(
                    "<{}> has both {VALUE_ATTRIBUTE} and text",
                    self.nodes[id.0].tag
                )));
            }
            return Ok(());
        }
        let value = if has_elements {
            let trimmed = text.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        } else {
            (!text.is_empty()).then_some(text)
        };
        self.nodes[id.0].value = value;
        Ok(())
    }

    /// Serializes the tree to compact markup.
    ///
    /// [`ConfigTree::from_markup`] reads the result back into an identical
    /// tree.
    pub fn to_markup(&self) -> Result<String, CacheError> {
        let mut writer = Writer::new(Vec::new());
        self.write_node(&mut writer, NodeId::ROOT)?;
        String::from_utf8(writer.into_inner()).map_err(|e| markup_error(e))
    }

    fn write_node(&self, writer: &mut Writer<Vec<u8>>, id: NodeId) -> Result<(), CacheError> {
        let data = &self.nodes[id.0];
        let name = if is_markup_name(&data.tag) {
            data.tag.as_str()
        } else {
            NODE_ELEMENT
        };
        let mut start = BytesStart::new(name);
        if name == NODE_ELEMENT {
            start.push_attribute((TAG_ATTRIBUTE, data.tag.as_str()));
        }

        let attributes = self.attribute_run(id);
        let elements = &data.children[attributes.len()..];
        let text = match data.value.as_deref() {
            Some(value) if value.is_empty() || !elements.is_empty() => {
                start.push_attribute((VALUE_ATTRIBUTE, value));
                None
            }
            value => value,
        };
        for (attribute, value) in attributes {
            start.push_attribute((attribute, value));
        }

        if elements.is_empty() && text.is_none() {
            return writer
                .write_event(Event::Empty(start))
                .map_err(|e| markup_error(e));
        }

        writer
            .write_event(Event::Start(start))
            .map_err(|e| markup_error(e))?;
        if let Some(text) = text {
            writer
                .write_event(Event::Text(BytesText::new(text)))
                .map_err(|e| markup_error(e))?;
        }
        for child in elements {
            self.write_node(writer, *child)?;
        }
        writer
            .write_event(Event::End(BytesEnd::new(name)))
            .map_err(|e| markup_error(e))
    }

    /// Leading `@name` children that can be written as attributes.
    ///
    /// The run stops at the first child that is not a valued leaf with a
    /// fresh markup name; that child and the rest are written as elements.
    fn attribute_run(&self, id: NodeId) -> Vec<(&str, &str)> {
        let mut run: Vec<(&str, &str)> = Vec::new();
        for child in &self.nodes[id.0].children {
            let c = &self.nodes[child.0];
            let attribute = c
                .tag
                .strip_prefix(ATTRIBUTE_PREFIX)
                .filter(|name| is_markup_name(name))
                .filter(|name| run.iter().all(|(seen, _)| seen != name))
                .filter(|_| c.children.is_empty());
            match (attribute, c.value.as_deref()) {
                (Some(name), Some(value)) => run.push((name, value)),
                _ => break,
            }
        }
        run
    }
}

/// An element whose end tag has not been read yet.
struct OpenElement {
    id: NodeId,
    text: String,
    /// The value came from a `ffwd:value` attribute.
    explicit: bool,
    has_elements: bool,
}

/// `true` if `name` can be written verbatim as an element or attribute name.
fn is_markup_name(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    (first.is_alphabetic() || first == '_')
        && chars.all(|c| c.is_alphanumeric() || matches!(c, '-' | '_' | '.' | ':'))
        && !name.starts_with(RESERVED_PREFIX)
}

fn open_element(
    tree: &mut Option<ConfigTree>,
    open: &mut [OpenElement],
    start: &BytesStart<'_>,
) -> Result<OpenElement, CacheError> {
    let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
    let mut tag = None;
    let mut value = None;
    let mut attributes = Vec::new();
    for attr in start.attributes() {
        let attr = attr.map_err(|e| markup_error(e))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let text = attr.unescape_value().map_err(|e| markup_error(e))?.into_owned();
        match key.as_str() {
            TAG_ATTRIBUTE if name == NODE_ELEMENT => tag = Some(text),
            VALUE_ATTRIBUTE => value = Some(text),
            _ => attributes.push((key, text)),
        }
    }
    let tag = if name == NODE_ELEMENT {
        tag.ok_or_else(|| markup_error(format!("<{NODE_ELEMENT}> without {TAG_ATTRIBUTE}")))?
    } else {
        name
    };

    let id = match (tree.as_mut(), open.last_mut()) {
        (None, _) => {
            *tree = Some(ConfigTree::new(tag));
            NodeId::ROOT
        }
        (Some(t), Some(parent)) => {
            parent.has_elements = true;
            t.push_child(parent.id, tag, None)
        }
        (Some(_), None) => return Err(markup_error("more than one root element")),
    };

    let Some(t) = tree.as_mut() else {
        return Err(markup_error("document has no root element"));
    };
    let explicit = value.is_some();
    t.set_value(id, value.as_deref());
    for (key, text) in attributes {
        t.push_child(id, format!("{ATTRIBUTE_PREFIX}{key}"), Some(&text));
    }
    Ok(OpenElement {
        id,
        text: String::new(),
        explicit,
        has_elements: false,
    })
}

fn markup_error(reason: impl std::fmt::Display) -> CacheError {
    CacheError::Markup {
        reason: reason.to_string(),
    }
}

/// A borrowed handle to one node of a [`ConfigTree`].
#[derive(Clone, Copy)]
pub struct ConfigNode<'a> {
    tree: &'a ConfigTree,
    id: NodeId,
}

impl<'a> ConfigNode<'a> {
    fn data(&self) -> &'a NodeData {
        &self.tree.nodes[self.id.0]
    }

    /// The node's id within its tree.
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// The node's tag name.
    pub fn tag_name(&self) -> &'a str {
        &self.data().tag
    }

    /// The node's scalar value.
    pub fn value(&self) -> Option<&'a str> {
        self.data().value.as_deref()
    }

    /// Ordinal among all siblings; 0 for the root.
    pub fn index(&self) -> usize {
        self.data().index
    }

    /// The parent node, or `None` for the root.
    pub fn parent(&self) -> Option<ConfigNode<'a>> {
        self.data().parent.map(|p| self.tree.node(p))
    }

    /// Children in document order.
    pub fn children(&self) -> impl Iterator<Item = ConfigNode<'a>> + 'a {
        let tree = self.tree;
        self.data().children.iter().map(move |c| tree.node(*c))
    }

    /// Number of direct children.
    pub fn child_count(&self) -> usize {
        self.data().children.len()
    }

    /// `true` if the node has no children.
    pub fn is_leaf(&self) -> bool {
        self.data().children.is_empty()
    }

    /// First child with the given tag.
    pub fn child(&self, tag: &str) -> Option<ConfigNode<'a>> {
        self.children().find(|c| c.tag_name() == tag)
    }

    /// Position-anchored path of this node.
    ///
    /// The root is `/`. Every other node contributes, from the top down, one
    /// segment `/<parent tag>{<own index>}`, so `c` in `<a><b><c/></b></a>`
    /// has the path `/a{0}/b{0}`.
    pub fn path(&self) -> String {
        let mut segments = Vec::new();
        let mut current = *self;
        while let Some(parent) = current.parent() {
            segments.push(format!("/{}{{{}}}", parent.tag_name(), current.index()));
            current = parent;
        }
        if segments.is_empty() {
            return "/".to_string();
        }
        segments.reverse();
        segments.concat()
    }

    /// Copies this node and its subtree into a standalone tree.
    pub fn to_tree(&self) -> ConfigTree {
        ConfigTree::from_source(self)
    }
}

impl std::fmt::Debug for ConfigNode<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigNode")
            .field("tag", &self.tag_name())
            .field("value", &self.value())
            .field("path", &self.path())
            .finish()
    }
}

impl<'a> TreeSource for ConfigNode<'a> {
    fn tag_name(&self) -> &str {
        ConfigNode::tag_name(self)
    }

    fn value(&self) -> Option<&str> {
        ConfigNode::value(self)
    }

    fn children(&self) -> Vec<Self> {
        ConfigNode::children(self).collect()
    }
}
