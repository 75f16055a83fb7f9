//! Virtual node data model.
//!
//! A `VNode` is either a primitive text value or a structured element whose
//! tag names a host element or a component function. Nodes are never
//! mutated after construction: the reconciler always compares two whole
//! trees.

use std::fmt;
use std::sync::Arc;

use crate::vdom::event::EventHandler;

/// Component render function: props and children in, replacement tree out.
type RenderFn = dyn Fn(&Props, &[VNode]) -> VNode + Send + Sync;

/// A named reference to a component render function.
///
/// Two components are the same tag only if they share the same function
/// allocation, so clone a `Component` rather than re-wrapping the closure.
#[derive(Clone)]
pub struct Component {
    name: &'static str,
    render: Arc<RenderFn>,
}

impl Component {
    pub fn new<F>(name: &'static str, render: F) -> Self
    where
        F: Fn(&Props, &[VNode]) -> VNode + Send + Sync + 'static,
    {
        Self {
            name,
            render: Arc::new(render),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub(crate) fn call(&self, props: &Props, children: &[VNode]) -> VNode {
        (self.render)(props, children)
    }
}

impl PartialEq for Component {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::addr_eq(Arc::as_ptr(&self.render), Arc::as_ptr(&other.render))
    }
}

impl fmt::Debug for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Component({})", self.name)
    }
}

/// Element tag: a host element name or a component.
#[derive(Debug, Clone, PartialEq)]
pub enum Tag {
    Host(String),
    Component(Component),
}

impl From<&str> for Tag {
    fn from(name: &str) -> Self {
        Tag::Host(name.to_string())
    }
}

impl From<String> for Tag {
    fn from(name: String) -> Self {
        Tag::Host(name)
    }
}

impl From<Component> for Tag {
    fn from(component: Component) -> Self {
        Tag::Component(component)
    }
}

impl From<&Component> for Tag {
    fn from(component: &Component) -> Self {
        Tag::Component(component.clone())
    }
}

/// A single property value.
#[derive(Debug, Clone, PartialEq)]
pub enum PropValue {
    Text(String),
    /// `true` renders as a valueless attribute, `false` as no attribute.
    Bool(bool),
    Handler(EventHandler),
}

impl PropValue {
    /// The attribute string this value renders as, if any.
    pub fn attribute_value(&self) -> Option<String> {
        match self {
            PropValue::Text(text) => Some(text.clone()),
            PropValue::Bool(true) => Some(String::new()),
            PropValue::Bool(false) | PropValue::Handler(_) => None,
        }
    }

    pub fn as_handler(&self) -> Option<&EventHandler> {
        match self {
            PropValue::Handler(handler) => Some(handler),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            PropValue::Text(text) => Some(text),
            _ => None,
        }
    }
}

impl From<&str> for PropValue {
    fn from(value: &str) -> Self {
        PropValue::Text(value.to_string())
    }
}

impl From<String> for PropValue {
    fn from(value: String) -> Self {
        PropValue::Text(value)
    }
}

impl From<bool> for PropValue {
    fn from(value: bool) -> Self {
        PropValue::Bool(value)
    }
}

macro_rules! numeric_from {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for PropValue {
                fn from(value: $ty) -> Self {
                    PropValue::Text(value.to_string())
                }
            }

            impl From<$ty> for Child {
                fn from(value: $ty) -> Self {
                    Child::Node(VNode::Text(value.to_string()))
                }
            }
        )*
    };
}

numeric_from!(i32, i64, u32, u64, usize, f64);

impl From<EventHandler> for PropValue {
    fn from(handler: EventHandler) -> Self {
        PropValue::Handler(handler)
    }
}

/// Ordered property map with a reserved identity `key`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Props {
    key: Option<String>,
    entries: Vec<(String, PropValue)>,
}

impl Props {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the identity key used to decide whether two nodes are the same.
    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Set a property. Re-setting keeps the original position.
    pub fn with(mut self, name: &str, value: impl Into<PropValue>) -> Self {
        self.insert(name, value.into());
        self
    }

    /// Attach an event handler under `on<Event>`, e.g. `on("click", h)` → `onClick`.
    pub fn on(self, event: &str, handler: EventHandler) -> Self {
        let name = handler_prop_name(event);
        self.with(&name, PropValue::Handler(handler))
    }

    pub fn insert(&mut self, name: &str, value: PropValue) {
        if name == "key" {
            self.key = value.as_text().map(str::to_string);
            return;
        }
        match self.entries.iter_mut().find(|(n, _)| n == name) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name.to_string(), value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&PropValue> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn text(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(PropValue::as_text)
    }

    pub fn identity(&self) -> Option<&str> {
        self.key.as_deref()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &PropValue)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Overlay `other` on top of `self` (later wins, key included if set).
    pub fn merged(mut self, other: &Props) -> Self {
        for (name, value) in other.iter() {
            self.insert(name, value.clone());
        }
        if other.key.is_some() {
            self.key = other.key.clone();
        }
        self
    }
}

/// Whether a property name has the event-handler shape `onXxx`.
pub fn is_handler_name(name: &str) -> bool {
    name.len() > 2
        && name.starts_with("on")
        && name[2..].chars().next().is_some_and(|c| c.is_ascii_uppercase())
}

/// `onClick` → `click`. Names without the `on` shape are used as-is.
pub fn event_name(prop: &str) -> String {
    if is_handler_name(prop) {
        prop[2..].to_ascii_lowercase()
    } else {
        prop.to_string()
    }
}

fn handler_prop_name(event: &str) -> String {
    let mut chars = event.chars();
    match chars.next() {
        Some(first) => format!("on{}{}", first.to_ascii_uppercase(), chars.as_str()),
        None => "on".to_string(),
    }
}

/// Structured node.
#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    tag: Tag,
    props: Props,
    children: Vec<VNode>,
}

impl Element {
    pub fn tag(&self) -> &Tag {
        &self.tag
    }

    pub fn key(&self) -> Option<&str> {
        self.props.identity()
    }

    pub fn props(&self) -> &Props {
        &self.props
    }

    pub fn children(&self) -> &[VNode] {
        &self.children
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum VNode {
    Text(String),
    Element(Element),
}

impl VNode {
    pub fn text(value: impl Into<String>) -> Self {
        VNode::Text(value.into())
    }

    pub fn as_element(&self) -> Option<&Element> {
        match self {
            VNode::Element(element) => Some(element),
            VNode::Text(_) => None,
        }
    }

    pub fn key(&self) -> Option<&str> {
        self.as_element().and_then(Element::key)
    }

    /// Whether the reconciler must rebuild rather than update in place.
    pub fn changed(&self, other: &VNode) -> bool {
        match (self, other) {
            (VNode::Text(a), VNode::Text(b)) => a != b,
            (VNode::Element(a), VNode::Element(b)) => a.tag != b.tag || a.key() != b.key(),
            _ => true,
        }
    }
}

/// Child input accepted by [`create_node`].
///
/// Nested lists are flattened to any depth; `Empty` (from `None`, `bool`
/// or `()`) renders as nothing.
#[derive(Debug, Clone)]
pub enum Child {
    Node(VNode),
    List(Vec<Child>),
    Empty,
}

impl From<VNode> for Child {
    fn from(node: VNode) -> Self {
        Child::Node(node)
    }
}

impl From<&str> for Child {
    fn from(text: &str) -> Self {
        Child::Node(VNode::text(text))
    }
}

impl From<String> for Child {
    fn from(text: String) -> Self {
        Child::Node(VNode::Text(text))
    }
}

impl From<bool> for Child {
    fn from(_: bool) -> Self {
        Child::Empty
    }
}

impl From<()> for Child {
    fn from(_: ()) -> Self {
        Child::Empty
    }
}

impl<T: Into<Child>> From<Option<T>> for Child {
    fn from(value: Option<T>) -> Self {
        value.map_or(Child::Empty, Into::into)
    }
}

impl<T: Into<Child>> From<Vec<T>> for Child {
    fn from(values: Vec<T>) -> Self {
        Child::List(values.into_iter().map(Into::into).collect())
    }
}

fn flatten_into(child: Child, out: &mut Vec<VNode>) {
    match child {
        Child::Node(node) => out.push(node),
        Child::List(items) => {
            for item in items {
                flatten_into(item, out);
            }
        }
        Child::Empty => {}
    }
}

/// Build a virtual node. Children are flattened and empty entries dropped.
pub fn create_node<I>(tag: impl Into<Tag>, props: Props, children: I) -> VNode
where
    I: IntoIterator,
    I::Item: Into<Child>,
{
    let mut flat = Vec::new();
    for child in children {
        flatten_into(child.into(), &mut flat);
    }
    VNode::Element(Element {
        tag: tag.into(),
        props,
        children: flat,
    })
}

/// Collect heterogeneous children for [`create_node`].
///
/// ```ignore
/// create_node("ul", Props::new(), nodes![title, items, footer.then(|| footer_node())])
/// ```
#[macro_export]
macro_rules! nodes {
    ($($child:expr),* $(,)?) => {
        ::std::vec![$($crate::vdom::Child::from($child)),*]
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_children_flatten_and_drop_empty() {
        let node = create_node(
            "ul",
            Props::new(),
            nodes![
                "a",
                None::<VNode>,
                true,
                vec![Child::from("b"), Child::List(vec![Child::from("c"), Child::Empty])],
                Some(VNode::text("d")),
            ],
        );

        let element = node.as_element().unwrap();
        let texts: Vec<_> = element
            .children()
            .iter()
            .map(|c| match c {
                VNode::Text(t) => t.as_str(),
                VNode::Element(_) => "<element>",
            })
            .collect();
        assert_eq!(texts, vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn test_key_is_reserved() {
        let props = Props::new().with("key", "row-1").with("class", "row");
        assert_eq!(props.identity(), Some("row-1"));
        assert!(props.get("key").is_none());
        assert_eq!(props.len(), 1);
    }

    #[test]
    fn test_props_keep_insertion_order() {
        let props = Props::new().with("b", "1").with("a", "2").with("b", "3");
        let names: Vec<_> = props.iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["b", "a"]);
        assert_eq!(props.text("b"), Some("3"));
    }

    #[test]
    fn test_changed_rules() {
        let a = create_node("div", Props::new().key("1"), Vec::<Child>::new());
        let b = create_node("div", Props::new().key("2"), Vec::<Child>::new());
        let c = create_node("span", Props::new().key("1"), Vec::<Child>::new());

        assert!(!a.changed(&a.clone()));
        assert!(a.changed(&b));
        assert!(a.changed(&c));
        assert!(VNode::text("x").changed(&VNode::text("y")));
        assert!(!VNode::text("x").changed(&VNode::text("x")));
        assert!(VNode::text("x").changed(&a));
    }

    #[test]
    fn test_component_identity() {
        let comp = Component::new("Badge", |_, _| VNode::text("badge"));
        let same = comp.clone();
        let other = Component::new("Badge", |_, _| VNode::text("badge"));

        assert_eq!(Tag::from(&comp), Tag::from(same));
        assert_ne!(Tag::from(&comp), Tag::from(other));
    }

    #[test]
    fn test_handler_names() {
        assert!(is_handler_name("onClick"));
        assert!(!is_handler_name("one"));
        assert!(!is_handler_name("on"));
        assert_eq!(event_name("onInput"), "input");
        assert_eq!(handler_prop_name("click"), "onClick");
    }
}
