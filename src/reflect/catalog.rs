//! Name-keyed registry of record and enum types.
//!
//! The catalog is the only namespace forward references are resolved in.
//! Classification results are memoised per `(type, field)` pair behind a
//! mutex so a shared catalog can serve several evaluation runs.

use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tracing::{debug, trace};

use super::field::FieldDescriptor;
use super::types::{EnumType, FieldDef, RecordType, ResolvedType, ScalarKind, TypeDef, TypeExpr};
use crate::error::{QueryError, Result};
use crate::value::Value;

/// Registry of every type that participates in queries.
#[derive(Debug, Default)]
pub struct TypeCatalog {
    types: FxHashMap<String, TypeDef>,
    order: Vec<String>,
    descriptors: Mutex<FxHashMap<(String, String), Arc<FieldDescriptor>>>,
}

impl TypeCatalog {
    /// Creates an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a record type. The supertype, if any, may be registered later.
    pub fn register_record(&mut self, def: RecordType) -> Result<()> {
        self.insert(TypeDef::Record(def))
    }

    /// Registers an enum type.
    pub fn register_enum(&mut self, def: EnumType) -> Result<()> {
        self.insert(TypeDef::Enum(def))
    }

    /// Registers any type definition.
    pub fn register(&mut self, def: TypeDef) -> Result<()> {
        self.insert(def)
    }

    fn insert(&mut self, def: TypeDef) -> Result<()> {
        let name = def.name().to_owned();
        if self.types.contains_key(&name) || ScalarKind::from_name(&name).is_some() {
            return Err(QueryError::DuplicateType { name });
        }
        debug!(ty = %name, "registering type");
        self.types.insert(name.clone(), def);
        self.order.push(name);
        self.descriptors.get_mut().clear();
        Ok(())
    }

    /// Whether `name` is a registered record or enum type.
    pub fn contains(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }

    /// Registered definitions in registration order.
    pub fn definitions(&self) -> impl Iterator<Item = &TypeDef> {
        self.order.iter().filter_map(|name| self.types.get(name))
    }

    /// Looks up a record type by name.
    pub fn record_type(&self, name: &str) -> Result<&RecordType> {
        match self.types.get(name) {
            Some(TypeDef::Record(def)) => Ok(def),
            _ => Err(QueryError::TypeResolution {
                name: name.to_owned(),
            }),
        }
    }

    /// Looks up an enum type by name.
    pub fn enum_type(&self, name: &str) -> Result<&EnumType> {
        match self.types.get(name) {
            Some(TypeDef::Enum(def)) => Ok(def),
            _ => Err(QueryError::TypeResolution {
                name: name.to_owned(),
            }),
        }
    }

    /// Resolves a type annotation, checking every referenced name.
    pub fn resolve(&self, expr: &TypeExpr) -> Result<ResolvedType> {
        Ok(match expr {
            TypeExpr::Scalar(kind) => ResolvedType::Scalar(*kind),
            TypeExpr::Named(name) => self.resolve_name(name)?,
            TypeExpr::List(inner) => ResolvedType::List(Box::new(self.resolve(inner)?)),
            TypeExpr::Set(inner) => ResolvedType::Set(Box::new(self.resolve(inner)?)),
            TypeExpr::Tuple(items) => ResolvedType::Tuple(
                items
                    .iter()
                    .map(|item| self.resolve(item))
                    .collect::<Result<Vec<_>>>()?,
            ),
            TypeExpr::TypeRef(inner) => ResolvedType::TypeRef(Box::new(self.resolve(inner)?)),
            TypeExpr::Optional(inner) => match self.resolve(inner)? {
                already @ ResolvedType::Optional(_) => already,
                inner => ResolvedType::Optional(Box::new(inner)),
            },
        })
    }

    /// Resolves a bare type name: a scalar kind or a registered type.
    pub fn resolve_name(&self, name: &str) -> Result<ResolvedType> {
        if let Some(kind) = ScalarKind::from_name(name) {
            return Ok(ResolvedType::Scalar(kind));
        }
        match self.types.get(name) {
            Some(TypeDef::Record(_)) => Ok(ResolvedType::Record(name.to_owned())),
            Some(TypeDef::Enum(_)) => Ok(ResolvedType::Enum(name.to_owned())),
            None => Err(QueryError::TypeResolution {
                name: name.to_owned(),
            }),
        }
    }

    /// Supertype chain of a record type, starting with the type itself.
    pub fn lineage(&self, name: &str) -> Result<Vec<&RecordType>> {
        let mut chain: Vec<&RecordType> = Vec::new();
        let mut current = Some(name.to_owned());
        while let Some(ty) = current {
            let def = match self.types.get(&ty) {
                Some(TypeDef::Record(def)) => def,
                Some(TypeDef::Enum(_)) => {
                    return Err(match chain.last() {
                        Some(sub) => QueryError::UnknownSupertype {
                            ty: sub.name.clone(),
                            supertype: ty,
                        },
                        None => QueryError::TypeResolution { name: ty },
                    });
                }
                None => return Err(QueryError::TypeResolution { name: ty }),
            };
            if chain.iter().any(|seen| seen.name == def.name) {
                return Err(QueryError::Internal("cyclic supertype chain"));
            }
            chain.push(def);
            current = def.extends.clone();
        }
        Ok(chain)
    }

    /// Whether `sub` is `sup` or transitively extends it. Scalar kinds are
    /// only subtypes of themselves.
    pub fn is_subtype(&self, sub: &str, sup: &str) -> bool {
        if sub == sup {
            return true;
        }
        let mut current = match self.types.get(sub) {
            Some(TypeDef::Record(def)) => def.extends.as_deref(),
            _ => None,
        };
        let mut hops = 0;
        while let Some(name) = current {
            if name == sup {
                return true;
            }
            hops += 1;
            if hops > self.types.len() {
                return false;
            }
            current = match self.types.get(name) {
                Some(TypeDef::Record(def)) => def.extends.as_deref(),
                _ => None,
            };
        }
        false
    }

    /// Own and inherited fields of a record type, supertype fields first,
    /// each paired with the name of its declaring type.
    pub fn fields_of(&self, name: &str) -> Result<Vec<(&str, &FieldDef)>> {
        let lineage = self.lineage(name)?;
        let mut fields: Vec<(&str, &FieldDef)> = Vec::new();
        for def in lineage.into_iter().rev() {
            for field in &def.fields {
                if let Some(slot) = fields.iter_mut().find(|(_, f)| f.name == field.name) {
                    *slot = (def.name.as_str(), field);
                } else {
                    fields.push((def.name.as_str(), field));
                }
            }
        }
        Ok(fields)
    }

    /// Classifies `field` of `record_type`.
    ///
    /// Fails with [`QueryError::UnresolvedField`] when neither the type nor a
    /// supertype declares the field, and with [`QueryError::TypeResolution`]
    /// when a referenced name is not registered. Results are memoised, so
    /// repeated calls return the same shared descriptor.
    pub fn classify(&self, record_type: &str, field: &str) -> Result<Arc<FieldDescriptor>> {
        let key = (record_type.to_owned(), field.to_owned());
        if let Some(hit) = self.descriptors.lock().get(&key) {
            return Ok(Arc::clone(hit));
        }
        trace!(ty = record_type, field, "field descriptor cache miss");
        let fields = self.fields_of(record_type)?;
        let (declared_in, def) = fields
            .into_iter()
            .find(|(_, def)| def.name == field)
            .ok_or_else(|| QueryError::UnresolvedField {
                ty: record_type.to_owned(),
                field: field.to_owned(),
            })?;
        let resolved = self.resolve(&def.ty)?;
        let descriptor = Arc::new(FieldDescriptor::from_resolved(
            record_type,
            declared_in,
            field,
            resolved,
            def.has_default,
        ));
        let mut cache = self.descriptors.lock();
        let entry = cache.entry(key).or_insert(descriptor);
        Ok(Arc::clone(entry))
    }

    /// Whether `value` is an instance of the named type. Records match their
    /// type and every supertype; `Null` matches nothing but `none`.
    pub fn value_is_instance(&self, value: &Value, ty: &str) -> bool {
        if let Some(kind) = ScalarKind::from_name(ty) {
            return kind.admits(value);
        }
        match value {
            Value::Record(record) => self.is_subtype(record.type_name(), ty),
            Value::Enum { ty: enum_ty, .. } => enum_ty == ty,
            _ => false,
        }
    }

    /// Whether the named record type is tracked by the instance registry.
    pub fn is_queryable(&self, name: &str) -> bool {
        self.lineage(name)
            .map(|chain| chain.iter().any(|def| def.queryable))
            .unwrap_or(false)
    }

    /// Number of memoised descriptors.
    pub fn cached_descriptors(&self) -> usize {
        self.descriptors.lock().len()
    }
}
