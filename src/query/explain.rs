//! Human-readable explain tree and deterministic hash for compiled queries.

use std::hash::Hasher;

use rustc_hash::FxHashMap;
use serde::Serialize;
use xxhash_rust::xxh64::Xxh64;

use super::expr::{BindingId, CmpOp, Condition, QueryDescriptor, Term};

/// Explain tree of a query descriptor.
#[derive(Clone, Debug, Serialize)]
pub struct QueryExplain {
    /// Root node of the explain tree.
    pub root: ExplainNode,
    /// Deterministic hash, invariant under binder renaming.
    pub query_hash: u64,
}

/// Explain node representing an operator with optional metadata.
#[derive(Clone, Debug, Serialize)]
pub struct ExplainNode {
    /// Operator name.
    pub op: String,
    /// Additional properties describing the operator.
    pub props: Vec<ExplainProp>,
    /// Child operators.
    pub inputs: Vec<ExplainNode>,
}

impl ExplainNode {
    /// Creates a new explain node with the given operator name.
    pub fn new(op: impl Into<String>) -> Self {
        Self {
            op: op.into(),
            props: Vec::new(),
            inputs: Vec::new(),
        }
    }

    /// Renders the tree as indented text, one operator per line.
    pub fn render(&self) -> String {
        let mut out = String::new();
        self.render_into(0, &mut out);
        out
    }

    fn render_into(&self, depth: usize, out: &mut String) {
        out.push_str(&"  ".repeat(depth));
        out.push_str(&self.op);
        for prop in &self.props {
            out.push(' ');
            out.push_str(&prop.key);
            out.push('=');
            out.push_str(&prop.value);
        }
        out.push('\n');
        for input in &self.inputs {
            input.render_into(depth + 1, out);
        }
    }
}

/// Single property associated with an [`ExplainNode`].
#[derive(Clone, Debug, Serialize)]
pub struct ExplainProp {
    /// Property key.
    pub key: String,
    /// Property value serialized for display.
    pub value: String,
    /// Whether this property contains literal data that may be redacted.
    pub redactable: bool,
}

impl ExplainProp {
    fn plain(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            redactable: false,
        }
    }

    fn term(key: impl Into<String>, term: &Term) -> Self {
        Self {
            key: key.into(),
            value: term.to_string(),
            redactable: matches!(term, Term::Literal(_)),
        }
    }
}

impl QueryDescriptor {
    /// Builds the explain tree of this descriptor.
    pub fn explain(&self) -> QueryExplain {
        let mut root = ExplainNode::new(match self {
            QueryDescriptor::Entity { .. } => "Entity",
            QueryDescriptor::SetOf { .. } => "SetOf",
        });
        for term in self.selected() {
            root.props.push(ExplainProp::term("select", term));
        }
        if let Some(cond) = self.condition() {
            root.inputs.push(build_explain_tree(cond));
        }
        QueryExplain {
            root,
            query_hash: self.query_hash(),
        }
    }

    /// Deterministic hash of the descriptor's structure. Descriptors that are
    /// [equivalent](QueryDescriptor::is_equivalent) hash equally.
    pub fn query_hash(&self) -> u64 {
        let mut hasher = CanonicalHasher::new();
        hasher.inner.write_u8(matches!(self, QueryDescriptor::SetOf { .. }) as u8);
        hasher.inner.write_u64(self.selected().len() as u64);
        for term in self.selected() {
            hasher.term(term);
        }
        match self.condition() {
            Some(cond) => hasher.condition(cond),
            None => hasher.inner.write_u8(0),
        }
        hasher.inner.finish()
    }
}

fn build_explain_tree(cond: &Condition) -> ExplainNode {
    let mut node = ExplainNode::new(op_name(cond));
    match cond {
        Condition::Comparator { left, op, right } => {
            node.props.push(ExplainProp::term("left", left));
            node.props.push(ExplainProp::plain("op", op.symbol()));
            node.props.push(ExplainProp::term("right", right));
        }
        Condition::And(children) | Condition::Or(children) => {
            node.inputs = children.iter().map(build_explain_tree).collect();
        }
        Condition::Not(child) => node.inputs.push(build_explain_tree(child)),
        Condition::Exists { over, condition } | Condition::ForAll { over, condition } => {
            node.props.push(ExplainProp::term("over", over));
            node.inputs.push(build_explain_tree(condition));
        }
        Condition::HasType { term, ty } => {
            node.props.push(ExplainProp::term("term", term));
            node.props.push(ExplainProp::plain("type", ty.clone()));
        }
        Condition::Truthy(term) => node.props.push(ExplainProp::term("term", term)),
    }
    node
}

fn op_name(cond: &Condition) -> &'static str {
    match cond {
        Condition::Comparator {
            op: CmpOp::Contains,
            ..
        } => "Contains",
        Condition::Comparator { .. } => "Compare",
        Condition::And(_) => "And",
        Condition::Or(_) => "Or",
        Condition::Not(_) => "Not",
        Condition::Exists { .. } => "Exists",
        Condition::ForAll { .. } => "ForAll",
        Condition::HasType { .. } => "HasType",
        Condition::Truthy(_) => "Truthy",
    }
}

/// Hashes binders by first-appearance position so renamed trees agree.
struct CanonicalHasher {
    inner: Xxh64,
    binders: FxHashMap<BindingId, u64>,
}

impl CanonicalHasher {
    fn new() -> Self {
        Self {
            inner: Xxh64::new(0),
            binders: FxHashMap::default(),
        }
    }

    fn binder(&mut self, id: BindingId) {
        let next = self.binders.len() as u64;
        let slot = *self.binders.entry(id).or_insert(next);
        self.inner.write_u64(slot);
    }

    fn term(&mut self, term: &Term) {
        match term {
            Term::Variable(var) => {
                self.inner.write(b"var");
                self.inner.write(var.ty().as_bytes());
                self.binder(var.id());
            }
            Term::Attribute { base, field } => {
                self.inner.write(b"attr");
                self.inner.write(field.declared_in().as_bytes());
                self.inner.write(field.name().as_bytes());
                self.term(base);
            }
            Term::Flatten { id, inner } => {
                self.inner.write(b"flatten");
                self.term(inner);
                self.binder(*id);
            }
            Term::Literal(value) => {
                self.inner.write(b"lit");
                self.inner.write(value.to_string().as_bytes());
            }
        }
    }

    fn condition(&mut self, cond: &Condition) {
        self.inner.write(op_name(cond).as_bytes());
        match cond {
            Condition::Comparator { left, op, right } => {
                self.inner.write(op.symbol().as_bytes());
                self.term(left);
                self.term(right);
            }
            Condition::And(children) | Condition::Or(children) => {
                self.inner.write_u64(children.len() as u64);
                for child in children {
                    self.condition(child);
                }
            }
            Condition::Not(child) => self.condition(child),
            Condition::Exists { over, condition } | Condition::ForAll { over, condition } => {
                self.term(over);
                self.condition(condition);
            }
            Condition::HasType { term, ty } => {
                self.term(term);
                self.inner.write(ty.as_bytes());
            }
            Condition::Truthy(term) => self.term(term),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::expr::{entity, eq, has_type, Variable};
    use crate::reflect::{RecordType, TypeCatalog, TypeExpr};
    use crate::Result;

    fn catalog() -> Result<TypeCatalog> {
        let mut catalog = TypeCatalog::new();
        catalog.register_record(RecordType::new("Body").field("name", TypeExpr::str()))?;
        catalog.register_record(RecordType::new("Handle").extends("Body"))?;
        Ok(catalog)
    }

    #[test]
    fn explain_lists_conjuncts() -> Result<()> {
        let catalog = catalog()?;
        let body = Variable::new("Body").named("b");
        let query = entity(
            &body,
            [
                has_type(&body, "Handle"),
                eq(body.attr(&catalog, "name")?, "H1"),
            ],
        );
        let explain = query.explain();
        assert_eq!(explain.root.op, "Entity");
        assert_eq!(explain.root.inputs[0].inputs.len(), 2);
        let compare = &explain.root.inputs[0].inputs[1];
        assert!(compare.props[2].redactable);
        let text = explain.root.render();
        assert!(text.contains("HasType term=b type=Handle"));
        assert!(text.contains("Compare left=b.name op=== right=\"H1\""));
        Ok(())
    }

    #[test]
    fn hash_is_invariant_under_renaming() -> Result<()> {
        let catalog = catalog()?;
        let build = |name: &str| -> Result<QueryDescriptor> {
            let body = Variable::new("Body").named(name);
            Ok(entity(&body, [eq(body.attr(&catalog, "name")?, "H1")]))
        };
        let a = build("a")?;
        let b = build("b")?;
        assert_eq!(a.query_hash(), b.query_hash());
        let body = Variable::new("Body");
        let other = entity(&body, [eq(body.attr(&catalog, "name")?, "H2")]);
        assert_ne!(a.query_hash(), other.query_hash());
        Ok(())
    }
}
