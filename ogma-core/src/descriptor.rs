//! Per-type derived view: declared attributes, the linearized ancestor
//! chain and the effective attribute map.

use std::sync::Arc;

use indexmap::IndexMap;

use crate::attribute::AttributeSpec;
use crate::error::{Error, Result};
use crate::ext::ustr::UStr;
use crate::registry::TypeDef;

/// The registered record for one type.
///
/// Descriptors are immutable once registered and shared via `Arc`; the
/// ancestor chain and the effective attribute map are derived at
/// registration time, which requires all base types to be registered
/// first.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeDescriptor {
    type_id: UStr,
    bases: Vec<UStr>,
    declared: IndexMap<UStr, AttributeSpec>,
    lineage: Vec<UStr>,
    effective: IndexMap<UStr, AttributeSpec>,
}

impl TypeDescriptor {
    /// Derive a descriptor from a raw declaration, resolving base types
    /// through `resolve`.
    pub(crate) fn derive(
        def: TypeDef,
        resolve: &dyn Fn(&str) -> Result<Arc<TypeDescriptor>>,
    ) -> Result<TypeDescriptor> {
        let TypeDef { type_id, bases, attributes } = def;

        let declared: IndexMap<UStr, AttributeSpec> = attributes
            .into_iter()
            .map(|(name, attr)| {
                let spec = AttributeSpec::declare(name.clone(), attr, type_id.clone());
                (name, spec)
            })
            .collect();

        let lineage = linearize(&type_id, &bases, resolve)?;

        // Effective attributes: walk the chain leaf to root, new names in
        // declaration order. A nearer declaration shadows a further one,
        // except that the index-naming ancestor stays the furthest
        // declarer.
        let mut effective = declared.clone();
        for ancestor in lineage.iter().skip(1) {
            let ancestor = resolve(ancestor)?;
            for (name, spec) in &ancestor.declared {
                match effective.get_mut(name) {
                    None => {
                        effective.insert(name.clone(), spec.clone());
                    }
                    Some(shadowing) => {
                        shadowing.declared_on = spec.declared_on.clone();
                    }
                }
            }
        }

        Ok(TypeDescriptor { type_id, bases, declared, lineage, effective })
    }

    pub fn type_id(&self) -> &UStr {
        &self.type_id
    }

    /// Direct base types, in declaration order.
    pub fn bases(&self) -> &[UStr] {
        &self.bases
    }

    /// Attributes declared directly on this type, in declaration order.
    pub fn declared_attributes(&self) -> impl Iterator<Item = (&UStr, &AttributeSpec)> {
        self.declared.iter()
    }

    /// Effective attributes along the ancestor chain.
    pub fn attributes(&self) -> impl Iterator<Item = (&UStr, &AttributeSpec)> {
        self.effective.iter()
    }

    pub fn attribute(&self, name: &str) -> Option<&AttributeSpec> {
        self.effective.get(name)
    }

    /// The linearized ancestor chain, this type first.
    pub fn lineage(&self) -> &[UStr] {
        &self.lineage
    }

    /// Whether `ancestor` appears in the chain (a type is its own
    /// ancestor here).
    pub fn has_ancestor(&self, ancestor: &str) -> bool {
        self.lineage.iter().any(|id| id == ancestor)
    }

    /// The type id naming the unique index for `name`: the ancestor that
    /// declared it.
    pub fn index_name_for_attribute(&self, name: &str) -> Option<&UStr> {
        self.effective.get(name).map(|spec| &spec.declared_on)
    }

    /// Effective attributes that participate in a unique index.
    pub fn unique_attributes(&self) -> impl Iterator<Item = &AttributeSpec> {
        self.effective
            .values()
            .filter(|spec| spec.unique && spec.kind.is_stored())
    }

    pub fn is_indexable(&self) -> bool {
        self.unique_attributes().next().is_some()
    }
}

/// C3 linearization: `L(C) = C + merge(L(B1) … L(Bn), [B1 … Bn])`.
fn linearize(
    type_id: &UStr,
    bases: &[UStr],
    resolve: &dyn Fn(&str) -> Result<Arc<TypeDescriptor>>,
) -> Result<Vec<UStr>> {
    let mut sequences: Vec<Vec<UStr>> = Vec::with_capacity(bases.len() + 1);
    for base in bases {
        sequences.push(resolve(base)?.lineage.clone());
    }
    sequences.push(bases.to_vec());

    let mut chain = vec![type_id.clone()];
    loop {
        sequences.retain(|seq| !seq.is_empty());
        if sequences.is_empty() {
            return Ok(chain);
        }

        let head = sequences
            .iter()
            .map(|seq| &seq[0])
            .find(|head| !sequences.iter().any(|seq| seq[1..].contains(head)))
            .cloned()
            .ok_or_else(|| {
                Error::Configuration(format!(
                    "cannot linearize the base types of {type_id:?}"
                ))
            })?;

        chain.push(head.clone());
        for seq in &mut sequences {
            if seq[0] == head {
                seq.remove(0);
            }
        }
    }
}
