use anyhow::{anyhow, Context};

use super::xml::{local_name, XmlEvent, XmlPart};

/// Element tree over an [`XmlPart`]'s events. Nodes only carry event indices, so the tree can
/// be built from one part and used to address (and later edit) that same part.
#[derive(Clone, Debug)]
pub struct Element {
    pub name: String,
    pub event_index: usize,
    pub children: Vec<Node>,
}

#[derive(Clone, Debug)]
pub enum Node {
    Element(Element),
    Text(usize),
}

impl Element {
    pub fn local(&self) -> &str {
        local_name(&self.name)
    }

    pub fn is(&self, local: &str) -> bool {
        self.local() == local
    }

    pub fn elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|n| match n {
            Node::Element(e) => Some(e),
            Node::Text(_) => None,
        })
    }

    pub fn children_named<'a>(&'a self, local: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
        self.elements().filter(move |e| e.is(local))
    }

    pub fn child(&self, local: &str) -> Option<&Element> {
        self.elements().find(|e| e.is(local))
    }

    /// Follow a chain of child names, e.g. `["cSld", "spTree"]`.
    pub fn path(&self, locals: &[&str]) -> Option<&Element> {
        locals.iter().try_fold(self, |cur, l| cur.child(l))
    }

    /// Indices of the text events directly inside this element.
    pub fn text_events(&self) -> impl Iterator<Item = usize> + '_ {
        self.children.iter().filter_map(|n| match n {
            Node::Text(idx) => Some(*idx),
            Node::Element(_) => None,
        })
    }
}

pub fn build_tree(part: &XmlPart) -> anyhow::Result<Element> {
    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    let mut attach = |stack: &mut Vec<Element>, el: Element| -> anyhow::Result<()> {
        match stack.last_mut() {
            Some(parent) => parent.children.push(Node::Element(el)),
            None if root.is_none() => root = Some(el),
            None => return Err(anyhow!("multiple root elements")),
        }
        Ok(())
    };

    for (idx, ev) in part.events.iter().enumerate() {
        match ev {
            XmlEvent::Start { name, .. } => stack.push(Element {
                name: name.clone(),
                event_index: idx,
                children: Vec::new(),
            }),
            XmlEvent::End { name } => {
                let el = stack
                    .pop()
                    .with_context(|| format!("unbalanced </{name}> at {idx} in {}", part.name))?;
                if &el.name != name {
                    return Err(anyhow!(
                        "mismatched </{name}> (open <{}>) at {idx} in {}",
                        el.name,
                        part.name
                    ));
                }
                attach(&mut stack, el)?;
            }
            XmlEvent::Empty { name, .. } => attach(
                &mut stack,
                Element {
                    name: name.clone(),
                    event_index: idx,
                    children: Vec::new(),
                },
            )?,
            XmlEvent::Text { .. } => {
                if let Some(parent) = stack.last_mut() {
                    parent.children.push(Node::Text(idx));
                }
            }
            _ => {}
        }
    }

    if let Some(open) = stack.last() {
        return Err(anyhow!("unclosed <{}> in {}", open.name, part.name));
    }
    root.with_context(|| format!("no root element in {}", part.name))
}
