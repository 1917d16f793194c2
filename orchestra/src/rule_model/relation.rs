//! This module defines [Relation] and [RelationContext].

use std::{fmt::Display, hash::Hash, sync::Arc};

use orchestra_physical::datavalues::{DataValue, ValueDomain};
use strum_macros::{Display as StrumDisplay, EnumString};

/// Suffix of the relation holding the local contributions of a peer relation
pub const LOCAL: &str = "_L";
/// Suffix of the relation holding the rejections of a peer relation
pub const REJECT: &str = "_R";
/// Prefix of the mapping (provenance) relation of a mapping
pub const PROVENANCE_PREFIX: &str = "P_";

/// Identifier of a relation within one [Catalog][crate::system::catalog::Catalog]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RelationId(pub u32);

impl Display for RelationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Type of a field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, StrumDisplay, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum FieldType {
    /// 64-bit integers
    Integer,
    /// Strings
    String,
    /// Booleans
    Boolean,
}

impl FieldType {
    /// Return whether the given value may be stored in a field of this type.
    ///
    /// Skolem terms stand for unknown values and fit every type.
    pub fn admits(&self, value: &DataValue) -> bool {
        matches!(
            (self, value.domain()),
            (FieldType::Integer, ValueDomain::Integer)
                | (FieldType::String, ValueDomain::String)
                | (FieldType::Boolean, ValueDomain::Boolean)
                | (_, ValueDomain::Skolem)
                | (_, ValueDomain::Null)
        )
    }
}

/// Field of a [Relation]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RelationField {
    name: String,
    field_type: FieldType,
    nullable: bool,
}

impl RelationField {
    /// Create a new non-nullable [RelationField].
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            nullable: false,
        }
    }

    /// Create a new [RelationField] that may hold nulls.
    pub fn nullable(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            nullable: true,
            ..Self::new(name, field_type)
        }
    }

    /// Return the name of the field.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Return the [FieldType].
    pub fn field_type(&self) -> FieldType {
        self.field_type
    }

    /// Return whether the field may hold nulls.
    pub fn is_nullable(&self) -> bool {
        self.nullable
    }
}

/// Role of a relation in the exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelationKind {
    /// Relation of a peer schema (IDB)
    Peer,
    /// Local contributions of a peer relation (EDB)
    Local,
    /// Rejected tuples of a peer relation
    Reject,
    /// Mapping relation recording which source tuples justify target tuples
    Provenance,
    /// Incrementally maintainable join relation
    Join,
    /// Outer union relation
    OuterUnion,
    /// Skolem function; never stored
    Skolem,
}

impl RelationKind {
    /// Return whether relations of this kind need all-strata delta evaluation.
    pub fn is_combined(&self) -> bool {
        matches!(self, RelationKind::Join | RelationKind::OuterUnion)
    }

    /// Return whether relations of this kind are stored in tables.
    pub fn is_stored(&self) -> bool {
        !matches!(self, RelationKind::Skolem)
    }
}

/// Relation with typed fields
#[derive(Debug, Clone)]
pub struct Relation {
    id: RelationId,
    name: String,
    fields: Vec<RelationField>,
    kind: RelationKind,
    /// Peer relation this relation belongs to, for local and reject relations
    base: Option<String>,
}

impl Relation {
    /// Create a new [Relation].
    pub fn new(
        id: RelationId,
        name: impl Into<String>,
        fields: Vec<RelationField>,
        kind: RelationKind,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            fields,
            kind,
            base: None,
        }
    }

    /// Derive the local or reject relation of a peer relation.
    pub(crate) fn auxiliary(&self, id: RelationId, kind: RelationKind) -> Self {
        let suffix = match kind {
            RelationKind::Local => LOCAL,
            RelationKind::Reject => REJECT,
            _ => "",
        };

        Self {
            id,
            name: format!("{}{suffix}", self.name),
            fields: self.fields.clone(),
            kind,
            base: Some(self.name.clone()),
        }
    }

    /// Return the [RelationId].
    pub fn id(&self) -> RelationId {
        self.id
    }

    /// Return the name of the relation.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Return the fields.
    pub fn fields(&self) -> &[RelationField] {
        &self.fields
    }

    /// Return the number of fields.
    pub fn arity(&self) -> usize {
        self.fields.len()
    }

    /// Return the [RelationKind].
    pub fn kind(&self) -> RelationKind {
        self.kind
    }

    /// Return the name of the peer relation a local or reject relation belongs to.
    pub fn base(&self) -> Option<&str> {
        self.base.as_deref()
    }
}

impl PartialEq for Relation {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for Relation {}

impl Hash for Relation {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

impl Display for Relation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}(", self.name)?;
        for (index, field) in self.fields.iter().enumerate() {
            if index > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}: {}", field.name, field.field_type)?;
            if field.nullable {
                f.write_str("?")?;
            }
        }
        f.write_str(")")
    }
}

/// Which relation an atom refers to, together with its peer and schema
#[derive(Debug, Clone)]
pub struct RelationContext {
    relation: Arc<Relation>,
    peer: String,
    schema: String,
    mapping: bool,
}

impl RelationContext {
    /// Create a new [RelationContext].
    pub fn new(
        relation: Arc<Relation>,
        peer: impl Into<String>,
        schema: impl Into<String>,
        mapping: bool,
    ) -> Self {
        Self {
            relation,
            peer: peer.into(),
            schema: schema.into(),
            mapping,
        }
    }

    /// Return the [Relation].
    pub fn relation(&self) -> &Arc<Relation> {
        &self.relation
    }

    /// Return the name of the peer.
    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// Return the name of the schema.
    pub fn schema(&self) -> &str {
        &self.schema
    }

    /// Return whether the relation is a mapping relation rather than a base relation.
    pub fn is_mapping(&self) -> bool {
        self.mapping
    }
}

impl PartialEq for RelationContext {
    fn eq(&self, other: &Self) -> bool {
        self.relation == other.relation
    }
}

impl Eq for RelationContext {}

impl Hash for RelationContext {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.relation.hash(state);
    }
}
