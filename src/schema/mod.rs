//! The schema: an immutable registry of protocols plus the derived dispatch
//! indices.
//!
//! A [`Schema`] maps each registered type to its [`Protocol`] and
//! precomputes two indices the hot paths rely on:
//!
//! - the *write sequence* per type: the ordered writers to invoke, nearest
//!   first, walking supertype links until a static writer or exhaustion;
//! - the *read resolution* per type: the type's own reader, or the nearest
//!   ancestor reader declared as a fallback.
//!
//! Once built, a schema is immutable and safe to share across threads.
//! Serializers and deserializers borrow it for the duration of a call.

mod builder;
mod encode;
mod protocol;

pub use builder::{SchemaBuilder, SchemaOptions, SharedSchemaBuilder, TypeDef};
pub use protocol::{BuiltinBase, Protocol, ReadOp, TypeKind, Upcast, WriteOp};

use std::any::TypeId;
use std::collections::HashMap;

use tracing::debug;

use crate::error::{Error, Result};

/// The deepest supertype chain a `superCount` byte can express.
const MAX_CHAIN_DEPTH: usize = 255;

/// One writer in a write sequence: the owning type's name, the op, and the
/// upcast chain that views the runtime value as the owning type.
#[derive(Debug, Clone)]
pub(crate) struct PlanStep {
    pub(crate) name: String,
    pub(crate) op: WriteOp,
    pub(crate) path: Vec<Upcast>,
}

#[derive(Debug, Clone)]
pub(crate) struct WritePlan {
    pub(crate) static_form: bool,
    /// Writers nearest-first; packets are emitted walking this tail in
    /// reverse, root-most ancestor first.
    pub(crate) seq: Vec<PlanStep>,
    pub(crate) builtin: Option<BuiltinBase>,
    pub(crate) super_count: u8,
}

#[derive(Debug, Clone)]
pub(crate) struct ResolvedRead {
    pub(crate) owner: String,
    pub(crate) op: ReadOp,
    pub(crate) via_fallback: bool,
}

/// An immutable registry mapping types to protocols, with precomputed
/// dispatch indices.
#[derive(Debug, Clone)]
pub struct Schema {
    protocols: Vec<Protocol>,
    by_name: HashMap<String, usize>,
    by_type: HashMap<TypeId, usize>,
    plans: HashMap<String, WritePlan>,
    readers: HashMap<String, ResolvedRead>,
}

impl Schema {
    /// Starts a builder with default options.
    #[must_use]
    pub fn builder() -> SchemaBuilder {
        SchemaBuilder::new()
    }

    /// The protocols in declaration order.
    pub fn protocols(&self) -> impl Iterator<Item = &Protocol> {
        self.protocols.iter()
    }

    /// Looks up a protocol by its registered name.
    #[must_use]
    pub fn protocol(&self, name: &str) -> Option<&Protocol> {
        self.by_name.get(name).map(|&index| &self.protocols[index])
    }

    /// The registered name for a runtime type, if any.
    #[must_use]
    pub fn name_of(&self, type_id: TypeId) -> Option<&str> {
        self.by_type.get(&type_id).map(|&index| self.protocols[index].name.as_str())
    }

    /// The number of registered protocols.
    #[must_use]
    pub fn len(&self) -> usize {
        self.protocols.len()
    }

    /// Whether the schema registers no protocols at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.protocols.is_empty()
    }

    pub(crate) fn write_plan(&self, name: &str) -> Option<&WritePlan> {
        self.plans.get(name)
    }

    pub(crate) fn resolve_reader(&self, name: &str) -> Option<&ResolvedRead> {
        self.readers.get(name)
    }

    /// Validates structure and derives the dispatch indices. Shared by the
    /// builder and by schema reload.
    pub(crate) fn finalize(mut protocols: Vec<Protocol>) -> Result<Self> {
        for protocol in &mut protocols {
            protocol.rebind_type_id();
        }

        let mut by_name = HashMap::with_capacity(protocols.len());
        for (index, protocol) in protocols.iter().enumerate() {
            if by_name.insert(protocol.name.clone(), index).is_some() {
                return Err(Error::malformed(format!(
                    "type name `{}` declared twice",
                    protocol.name
                )));
            }
        }
        let mut by_type = HashMap::new();
        for (index, protocol) in protocols.iter().enumerate() {
            if let Some(type_id) = protocol.type_id {
                if by_type.insert(type_id, index).is_some() {
                    return Err(Error::malformed(format!(
                        "`{}`: runtime type bound to two protocols",
                        protocol.name
                    )));
                }
            }
        }

        let chains = Self::validate(&protocols, &by_name)?;

        let mut plans = HashMap::new();
        let mut readers = HashMap::new();
        for (index, protocol) in protocols.iter().enumerate() {
            if let Some(plan) = Self::plan_for(&protocols, &chains[index]) {
                plans.insert(protocol.name.clone(), plan);
            }
            if let Some(resolved) = Self::reader_for(&protocols, &chains[index]) {
                readers.insert(protocol.name.clone(), resolved);
            }
        }

        debug!(
            target: "tagwire::schema",
            protocols = protocols.len(),
            writable = plans.len(),
            readable = readers.len(),
            "schema finalized"
        );
        Ok(Self { protocols, by_name, by_type, plans, readers })
    }

    /// Checks every cross-protocol invariant and returns, per protocol, its
    /// supertype chain as indices (self first).
    fn validate(
        protocols: &[Protocol],
        by_name: &HashMap<String, usize>,
    ) -> Result<Vec<Vec<usize>>> {
        let mut chains = Vec::with_capacity(protocols.len());
        for (index, protocol) in protocols.iter().enumerate() {
            let mut chain = vec![index];
            let mut current = protocol;
            while let Some(parent_name) = current.parent.as_deref() {
                let &parent_index = by_name.get(parent_name).ok_or_else(|| {
                    Error::malformed(format!(
                        "`{}`: supertype `{parent_name}` is not defined in this schema",
                        current.name
                    ))
                })?;
                if chain.contains(&parent_index) {
                    return Err(Error::malformed(format!(
                        "`{}`: cyclic supertype chain through `{parent_name}`",
                        protocol.name
                    )));
                }
                let parent = &protocols[parent_index];
                if parent.kind == TypeKind::Final {
                    return Err(Error::malformed(format!(
                        "`{}`: supertype `{parent_name}` is final",
                        current.name
                    )));
                }
                chain.push(parent_index);
                current = parent;
            }
            if chain.len() > MAX_CHAIN_DEPTH {
                return Err(Error::malformed(format!(
                    "`{}`: supertype chain deeper than {MAX_CHAIN_DEPTH}",
                    protocol.name
                )));
            }

            // A static ancestor forbids writers anywhere below it.
            if protocol.write.is_some() {
                for &ancestor_index in &chain[1..] {
                    let ancestor = &protocols[ancestor_index];
                    if ancestor.has_static {
                        return Err(Error::malformed(format!(
                            "`{}`: declares a write op below static supertype `{}`",
                            protocol.name, ancestor.name
                        )));
                    }
                }
            }
            if protocol.parent.is_some() != protocol.upcast.is_some() {
                return Err(Error::malformed(format!(
                    "`{}`: supertype link without its upcast projection",
                    protocol.name
                )));
            }
            if protocol.has_fallback && protocol.kind == TypeKind::Final {
                return Err(Error::malformed(format!(
                    "`{}`: fallback on a final type",
                    protocol.name
                )));
            }
            if protocol.read.is_some()
                && !protocol.has_fallback
                && protocol.kind == TypeKind::Abstract
            {
                return Err(Error::malformed(format!(
                    "`{}`: abstract types take only fallback readers",
                    protocol.name
                )));
            }
            chains.push(chain);
        }
        Ok(chains)
    }

    /// The write sequence and packet count for one type, or `None` when no
    /// writer is resolvable anywhere on the chain.
    fn plan_for(protocols: &[Protocol], chain: &[usize]) -> Option<WritePlan> {
        let own = &protocols[chain[0]];
        let mut seq = Vec::new();
        let mut static_form = false;
        let mut path: Vec<Upcast> = Vec::new();
        for (depth, &index) in chain.iter().enumerate() {
            let protocol = &protocols[index];
            if depth > 0 {
                // The upcast into this ancestor lives on its child.
                match &protocols[chain[depth - 1]].upcast {
                    Some(upcast) => path.push(upcast.clone()),
                    None => break,
                }
            }
            if let Some(write) = &protocol.write {
                seq.push(PlanStep {
                    name: protocol.name.clone(),
                    op: write.clone(),
                    path: path.clone(),
                });
                if protocol.has_static {
                    static_form = true;
                    break;
                }
            }
        }
        // The built-in base belongs to the type's own protocol and is
        // suppressed under a static writer.
        let builtin = if static_form { None } else { own.builtin_base.clone() };
        if seq.is_empty() && builtin.is_none() {
            return None;
        }
        let super_count = seq.len().saturating_sub(1) + usize::from(builtin.is_some());
        let super_count = u8::try_from(super_count).unwrap_or(u8::MAX);
        Some(WritePlan { static_form, seq, builtin, super_count })
    }

    /// The reader for one type: its own, or the nearest fallback ancestor.
    fn reader_for(protocols: &[Protocol], chain: &[usize]) -> Option<ResolvedRead> {
        let own = &protocols[chain[0]];
        if let Some(read) = &own.read {
            return Some(ResolvedRead {
                owner: own.name.clone(),
                op: read.clone(),
                via_fallback: false,
            });
        }
        for &index in &chain[1..] {
            let ancestor = &protocols[index];
            if ancestor.has_fallback {
                if let Some(read) = &ancestor.read {
                    return Some(ResolvedRead {
                        owner: ancestor.name.clone(),
                        op: read.clone(),
                        via_fallback: true,
                    });
                }
            }
        }
        None
    }
}
