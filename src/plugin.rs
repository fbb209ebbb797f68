//! The plugin contract: descriptors, parameter schemes, and the typed
//! runtime parameter values.
//!
//! A plugin describes a family of nodes: its metadata, capability
//! flags, the keyed parameter scheme its `init` accepts, and the keyed
//! scheme of runtime parameters its instances respond to. Built-in
//! node families (noise, squaretone, gain, wavfile) register themselves
//! through the same contract that external families would use.

use std::fmt;
use std::rc::Rc;

use crate::error::{Error, Result};
use crate::node::NodeRef;
use crate::world::Env;

/// A typed parameter value.
#[derive(Clone)]
pub enum Param {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    /// A reference to another node, e.g. a control envelope.
    Node(NodeRef),
}

impl Param {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Param::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Param::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Param::Float(x) => Some(*x),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Param::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_node(&self) -> Option<NodeRef> {
        match self {
            Param::Node(n) => Some(Rc::clone(n)),
            _ => None,
        }
    }
}

impl fmt::Debug for Param {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Param::Bool(b) => write!(f, "Bool({b})"),
            Param::Int(i) => write!(f, "Int({i})"),
            Param::Float(x) => write!(f, "Float({x})"),
            Param::Str(s) => write!(f, "Str({s:?})"),
            Param::Node(_) => write!(f, "Node(..)"),
        }
    }
}

impl PartialEq for Param {
    fn eq(&self, other: &Param) -> bool {
        match (self, other) {
            (Param::Bool(a), Param::Bool(b)) => a == b,
            (Param::Int(a), Param::Int(b)) => a == b,
            (Param::Float(a), Param::Float(b)) => a == b,
            (Param::Str(a), Param::Str(b)) => a == b,
            (Param::Node(a), Param::Node(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

/// A keyed set of parameter values, as passed to plugin `init` and
/// `suggest`.
pub type ParamSet = std::collections::BTreeMap<usize, Param>;

/// The declared type of a scheme entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    Bool,
    Int,
    Float,
    Str,
    Node,
}

/// A named value offered by a list constraint.
#[derive(Debug, Clone)]
pub struct NamedParam {
    pub name: String,
    pub value: Param,
}

/// A range constraint. Absent bounds are unconstrained.
#[derive(Debug, Clone, Default)]
pub struct ParamRange {
    pub lower: Option<Param>,
    pub upper: Option<Param>,
    pub step: Option<Param>,
}

/// Constraint on the values a parameter accepts.
#[derive(Debug, Clone, Default)]
pub enum Constraint {
    #[default]
    None,
    /// One of a list of named values.
    List(Vec<NamedParam>),
    Range(ParamRange),
}

/// Presentation hints for a parameter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Hints {
    /// Best presented on a logarithmic scale.
    pub log: bool,
    /// Expresses a time quantity.
    pub time: bool,
    /// Names a file.
    pub filename: bool,
}

/// Descriptor for one keyed parameter.
#[derive(Debug, Clone)]
pub struct ParamScheme {
    pub name: &'static str,
    pub description: &'static str,
    pub kind: ParamKind,
    pub constraint: Constraint,
    pub hints: Hints,
}

impl ParamScheme {
    pub fn new(name: &'static str, description: &'static str, kind: ParamKind) -> ParamScheme {
        ParamScheme {
            name,
            description,
            kind,
            constraint: Constraint::None,
            hints: Hints::default(),
        }
    }
}

/// Capability flags a plugin declares for its instances.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PluginFlags {
    pub writeable: bool,
    pub seekable: bool,
    pub cacheable: bool,
    pub causal: bool,
}

/// Authorship record for plugin metadata.
#[derive(Debug, Clone)]
pub struct Author {
    pub name: &'static str,
    pub email: &'static str,
}

/// Human-readable plugin metadata.
#[derive(Debug, Clone)]
pub struct MetaText {
    pub identifier: &'static str,
    pub category: &'static str,
    pub description: &'static str,
    pub copyright: &'static str,
    pub url: &'static str,
    pub authors: Vec<Author>,
}

/// Instantiates a node from a keyed parameter set. On failure the
/// implementation must release anything it allocated and report why.
pub type InitFn = fn(&mut Env, &ParamSet) -> Result<NodeRef>;

/// Optionally proposes completions for a partial parameter set.
pub type SuggestFn = fn(&Env, &Plugin, ParamSet) -> ParamSet;

/// A plugin: everything the engine needs to instantiate and describe a
/// node family.
pub struct Plugin {
    pub metatext: MetaText,
    pub flags: PluginFlags,
    pub init_scheme: Vec<ParamScheme>,
    pub init: InitFn,
    pub process_scheme: Vec<ParamScheme>,
    pub suggest: Option<SuggestFn>,
}

impl fmt::Debug for Plugin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Plugin")
            .field("identifier", &self.metatext.identifier)
            .field("flags", &self.flags)
            .finish()
    }
}

fn scheme_key(schemes: &[ParamScheme], name: &str) -> Result<usize> {
    schemes
        .iter()
        .position(|s| s.name == name)
        .ok_or(Error::NoEntity)
}

impl Plugin {
    pub fn identifier(&self) -> &'static str {
        self.metatext.identifier
    }

    /// Resolve a named entry of the init scheme.
    pub fn init_key(&self, name: &str) -> Result<usize> {
        scheme_key(&self.init_scheme, name)
    }

    /// Resolve a named entry of the runtime parameter scheme.
    pub fn process_key(&self, name: &str) -> Result<usize> {
        scheme_key(&self.process_scheme, name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn param_accessors() {
        assert_eq!(Param::Int(3).as_int(), Some(3));
        assert_eq!(Param::Int(3).as_float(), None);
        assert_eq!(Param::Float(1.5).as_float(), Some(1.5));
        assert_eq!(Param::Str("hat".into()).as_str(), Some("hat"));
    }

    #[test]
    fn scheme_keys_resolve_by_name() {
        let schemes = vec![
            ParamScheme::new("frequency", "Oscillation frequency", ParamKind::Float),
            ParamScheme::new("seed", "PRNG seed", ParamKind::Int),
        ];
        assert_eq!(scheme_key(&schemes, "seed"), Ok(1));
        assert_eq!(scheme_key(&schemes, "frequency"), Ok(0));
        assert_eq!(scheme_key(&schemes, "cutoff"), Err(Error::NoEntity));
    }
}
