//! Exclusive XML canonicalization (`xml-exc-c14n#`, comments omitted).
//!
//! Operates on a parsed `roxmltree` subtree. A namespace declaration is
//! emitted on an element only when the element or one of its attributes
//! uses the prefix (or the prefix is in the inclusive list) and the
//! nearest output ancestor has not already rendered the same binding.

use roxmltree::{Node, NodeId, NodeType};
use std::collections::{BTreeMap, BTreeSet};

const XML_NS_URI: &str = "http://www.w3.org/XML/1998/namespace";

/// prefix ("" for the default namespace) -> URI, as rendered so far.
type RenderedNamespaces = BTreeMap<String, String>;

struct Canonicalizer<'p> {
    exclude: Option<NodeId>,
    inclusive_prefixes: &'p [String],
}

/// Canonicalize the subtree rooted at `apex`.
///
/// `exclude` drops one descendant element (the enveloped signature).
/// `inclusive_prefixes` comes from `InclusiveNamespaces/@PrefixList`,
/// with `#default` already mapped to `""`.
pub(crate) fn canonicalize(
    apex: Node<'_, '_>,
    exclude: Option<Node<'_, '_>>,
    inclusive_prefixes: &[String],
) -> String {
    let c14n = Canonicalizer {
        exclude: exclude.map(|n| n.id()),
        inclusive_prefixes,
    };

    let mut rendered = RenderedNamespaces::new();
    rendered.insert(String::new(), String::new());

    let mut out = String::new();
    c14n.write_node(apex, &rendered, &mut out);
    out
}

impl Canonicalizer<'_> {
    fn write_node(&self, node: Node<'_, '_>, rendered: &RenderedNamespaces, out: &mut String) {
        if self.exclude == Some(node.id()) {
            return;
        }

        match node.node_type() {
            NodeType::Element => self.write_element(node, rendered, out),
            NodeType::Text => escape_text(node.text().unwrap_or_default(), out),
            NodeType::PI => {
                if let Some(pi) = node.pi() {
                    out.push_str("<?");
                    out.push_str(pi.target);
                    if let Some(value) = pi.value.filter(|v| !v.is_empty()) {
                        out.push(' ');
                        out.push_str(value);
                    }
                    out.push_str("?>");
                }
            }
            NodeType::Comment | NodeType::Root => {}
        }
    }

    fn write_element(&self, node: Node<'_, '_>, rendered: &RenderedNamespaces, out: &mut String) {
        let prefix = element_prefix(node);

        let mut utilized = BTreeSet::new();
        utilized.insert(prefix.clone());

        let mut attributes = Vec::new();
        for attr in node.attributes() {
            let uri = attr.namespace().unwrap_or_default();
            let qname = match attr.namespace() {
                Some(ns_uri) => {
                    let attr_prefix = attribute_prefix(node, ns_uri);
                    let qname = qualified(&attr_prefix, attr.name());
                    utilized.insert(attr_prefix);
                    qname
                }
                None => attr.name().to_string(),
            };
            attributes.push((uri, attr.name(), qname, attr.value()));
        }
        attributes.sort_by(|a, b| (a.0, a.1).cmp(&(b.0, b.1)));

        for inclusive in self.inclusive_prefixes {
            if in_scope_uri(node, inclusive).is_some() {
                utilized.insert(inclusive.clone());
            }
        }

        // BTreeSet order puts the default namespace ("") first, then
        // prefixes lexicographically.
        let mut scope = rendered.clone();
        let mut declarations = Vec::new();
        for ns_prefix in utilized {
            if ns_prefix == "xml" {
                continue;
            }
            let uri = match in_scope_uri(node, &ns_prefix) {
                Some(uri) => uri,
                None if ns_prefix.is_empty() => String::new(),
                None => continue,
            };
            if scope.get(&ns_prefix) != Some(&uri) {
                declarations.push((ns_prefix.clone(), uri.clone()));
                scope.insert(ns_prefix, uri);
            }
        }

        let name = qualified(&prefix, node.tag_name().name());
        out.push('<');
        out.push_str(&name);

        for (ns_prefix, uri) in &declarations {
            if ns_prefix.is_empty() {
                out.push_str(" xmlns=\"");
            } else {
                out.push_str(" xmlns:");
                out.push_str(ns_prefix);
                out.push_str("=\"");
            }
            escape_attribute(uri, out);
            out.push('"');
        }

        for (_, _, qname, value) in &attributes {
            out.push(' ');
            out.push_str(qname);
            out.push_str("=\"");
            escape_attribute(value, out);
            out.push('"');
        }
        out.push('>');

        for child in node.children() {
            self.write_node(child, &scope, out);
        }

        out.push_str("</");
        out.push_str(&name);
        out.push('>');
    }
}

fn qualified(prefix: &str, local: &str) -> String {
    if prefix.is_empty() {
        local.to_string()
    } else {
        format!("{}:{}", prefix, local)
    }
}

/// URI bound to `prefix` on `node`; `""` looks up the default namespace.
fn in_scope_uri(node: Node<'_, '_>, prefix: &str) -> Option<String> {
    node.namespaces()
        .find(|ns| ns.name().unwrap_or_default() == prefix)
        .map(|ns| ns.uri().to_string())
}

/// Prefix the element was written with in the source document.
///
/// Read from the raw start tag so that a URI bound to several prefixes
/// still canonicalizes to the prefix that was actually signed.
fn element_prefix(node: Node<'_, '_>) -> String {
    let Some(uri) = node.tag_name().namespace() else {
        return String::new();
    };

    let start = node.range().start + 1;
    let source_prefix = node
        .document()
        .input_text()
        .get(start..)
        .and_then(|rest| {
            rest.split(|c: char| c.is_whitespace() || c == '>' || c == '/')
                .next()
        })
        .and_then(|qname| qname.split_once(':'))
        .map(|(p, _)| p)
        .unwrap_or_default();

    if in_scope_uri(node, source_prefix).as_deref() == Some(uri) {
        return source_prefix.to_string();
    }

    node.namespaces()
        .find(|ns| ns.uri() == uri)
        .and_then(|ns| ns.name())
        .unwrap_or_default()
        .to_string()
}

/// Namespaced attributes always carry a non-empty prefix.
fn attribute_prefix(node: Node<'_, '_>, uri: &str) -> String {
    if uri == XML_NS_URI {
        return "xml".to_string();
    }
    node.namespaces()
        .find(|ns| ns.uri() == uri && ns.name().is_some())
        .and_then(|ns| ns.name())
        .unwrap_or_default()
        .to_string()
}

fn escape_text(text: &str, out: &mut String) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\r' => out.push_str("&#xD;"),
            _ => out.push(c),
        }
    }
}

fn escape_attribute(value: &str, out: &mut String) {
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '"' => out.push_str("&quot;"),
            '\t' => out.push_str("&#x9;"),
            '\n' => out.push_str("&#xA;"),
            '\r' => out.push_str("&#xD;"),
            _ => out.push(c),
        }
    }
}
