//! Element tree description.
//!
//! An [`Element`] describes one node of the tree a render pass walks:
//! a component (a body closure re-executed every pass), a context provider
//! (scoped binding over its children), or a text leaf (the committed,
//! host-observable output).
//!
//! Instance identity is positional: a component element is matched to its
//! instance by parent path + sibling index, never by the body's identity.
//! Props are plain captures - a parent's body rebuilds its children's
//! closures each render with the current values baked in.

use std::any::Any;
use std::rc::Rc;

use crate::hooks::context::ScopeId;

/// Body of a component: re-executed top-down on every render pass,
/// returning the child elements for this position.
pub type Body = Rc<dyn Fn() -> Vec<Element>>;

#[derive(Clone)]
pub struct Element {
    pub(crate) kind: ElementKind,
}

#[derive(Clone)]
pub(crate) enum ElementKind {
    Component(Body),
    Provider {
        scope: ScopeId,
        value: Rc<dyn Any>,
        children: Vec<Element>,
    },
    Text(String),
}

/// Wrap a body closure as a component element.
pub fn component(body: impl Fn() -> Vec<Element> + 'static) -> Element {
    Element {
        kind: ElementKind::Component(Rc::new(body)),
    }
}

/// A text leaf. Collected in traversal order into the committed output
/// handed to the host.
pub fn text(content: impl Into<String>) -> Element {
    Element {
        kind: ElementKind::Text(content.into()),
    }
}

impl Element {
    pub(crate) fn provider(
        scope: ScopeId,
        value: Rc<dyn Any>,
        children: Vec<Element>,
    ) -> Element {
        Element {
            kind: ElementKind::Provider {
                scope,
                value,
                children,
            },
        }
    }
}

impl std::fmt::Debug for Element {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.kind {
            ElementKind::Component(_) => f.write_str("Component(..)"),
            ElementKind::Provider { scope, children, .. } => f
                .debug_struct("Provider")
                .field("scope", scope)
                .field("children", &children.len())
                .finish(),
            ElementKind::Text(s) => f.debug_tuple("Text").field(s).finish(),
        }
    }
}
