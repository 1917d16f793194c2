//! This module defines [Catalog] and [RelationIdAllocator].

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU32, Ordering},
        Arc,
    },
};

use crate::{
    error::Error,
    rule_model::relation::{
        Relation, RelationContext, RelationField, RelationId, RelationKind, LOCAL,
        PROVENANCE_PREFIX, REJECT,
    },
};

/// Hands out fresh [RelationId]s
///
/// Scoped to one [Catalog]; safe to share between threads.
#[derive(Debug, Default)]
pub struct RelationIdAllocator {
    next: AtomicU32,
}

impl RelationIdAllocator {
    /// Create a new [RelationIdAllocator] starting at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Return a fresh id.
    pub fn next_id(&self) -> RelationId {
        RelationId(self.next.fetch_add(1, Ordering::Relaxed))
    }

    /// Return the number of ids handed out so far.
    pub fn allocated(&self) -> u32 {
        self.next.load(Ordering::Relaxed)
    }
}

/// Peer together with the schema it publishes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Peer {
    name: String,
    schema: String,
}

impl Peer {
    /// Return the name of the peer.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Return the name of the schema of the peer.
    pub fn schema(&self) -> &str {
        &self.schema
    }
}

/// Registry of all peers and relations of an exchange system
#[derive(Debug, Default)]
pub struct Catalog {
    allocator: RelationIdAllocator,
    peers: Vec<Peer>,
    /// Relations in registration order
    relations: Vec<RelationContext>,
    by_name: HashMap<String, usize>,
}

impl Catalog {
    /// Create a new empty [Catalog].
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a peer with its schema.
    ///
    /// Declaring an existing peer again replaces its schema name.
    pub fn add_peer(&mut self, name: &str, schema: &str) {
        match self.peers.iter_mut().find(|peer| peer.name == name) {
            Some(peer) => peer.schema = schema.to_string(),
            None => self.peers.push(Peer {
                name: name.to_string(),
                schema: schema.to_string(),
            }),
        }
    }

    /// Return the declared peers.
    pub fn peers(&self) -> &[Peer] {
        &self.peers
    }

    fn peer(&self, name: &str) -> Result<&Peer, Error> {
        self.peers
            .iter()
            .find(|peer| peer.name == name)
            .ok_or_else(|| Error::UnknownPeer(name.to_string()))
    }

    fn register(&mut self, context: RelationContext) -> Result<RelationContext, Error> {
        let name = context.relation().name().to_string();
        if self.by_name.contains_key(&name) {
            return Err(Error::DuplicateRelation(name));
        }

        log::debug!("registering relation {}", context.relation());

        self.by_name.insert(name, self.relations.len());
        self.relations.push(context.clone());
        Ok(context)
    }

    /// Register a relation owned by `peer`.
    ///
    /// For a [RelationKind::Peer] relation `R` the local relation `R_L`
    /// and the reject relation `R_R` are registered as well.
    pub fn add_relation(
        &mut self,
        peer: &str,
        name: &str,
        fields: Vec<RelationField>,
        kind: RelationKind,
    ) -> Result<RelationContext, Error> {
        let schema = self.peer(peer)?.schema.clone();

        for suffix in ["", LOCAL, REJECT] {
            let name = format!("{name}{suffix}");
            if self.by_name.contains_key(&name) {
                return Err(Error::DuplicateRelation(name));
            }
        }

        let relation = Relation::new(self.allocator.next_id(), name, fields, kind);

        if kind == RelationKind::Peer {
            for auxiliary in [RelationKind::Local, RelationKind::Reject] {
                let derived = relation.auxiliary(self.allocator.next_id(), auxiliary);
                self.register(RelationContext::new(Arc::new(derived), peer, &schema, false))?;
            }
        }

        self.register(RelationContext::new(Arc::new(relation), peer, &schema, false))
    }

    /// Register the mapping relation of the given mapping.
    pub fn add_provenance_relation(
        &mut self,
        peer: &str,
        mapping: &str,
        fields: Vec<RelationField>,
    ) -> Result<RelationContext, Error> {
        let schema = self.peer(peer)?.schema.clone();
        let relation = Relation::new(
            self.allocator.next_id(),
            format!("{PROVENANCE_PREFIX}{mapping}"),
            fields,
            RelationKind::Provenance,
        );

        self.register(RelationContext::new(Arc::new(relation), peer, schema, true))
    }

    /// Create the context of a skolem function.
    ///
    /// Skolem functions are not stored and therefore not registered.
    pub fn skolem_context(&self, function: &str, output: RelationField) -> RelationContext {
        let relation = Relation::new(
            self.allocator.next_id(),
            function,
            vec![output],
            RelationKind::Skolem,
        );

        RelationContext::new(Arc::new(relation), "", "", true)
    }

    /// Return the relation with the given name.
    pub fn relation(&self, name: &str) -> Result<&RelationContext, Error> {
        self.by_name
            .get(name)
            .map(|&index| &self.relations[index])
            .ok_or_else(|| Error::UnknownRelation(name.to_string()))
    }

    /// Return the local relation of the given peer relation.
    pub fn local(&self, name: &str) -> Result<&RelationContext, Error> {
        self.relation(&format!("{name}{LOCAL}"))
    }

    /// Return the reject relation of the given peer relation.
    pub fn reject(&self, name: &str) -> Result<&RelationContext, Error> {
        self.relation(&format!("{name}{REJECT}"))
    }

    /// Iterate over all relations in registration order.
    pub fn relations(&self) -> impl Iterator<Item = &RelationContext> {
        self.relations.iter()
    }

    /// Iterate over all relations of the given kind.
    pub fn relations_of_kind(&self, kind: RelationKind) -> impl Iterator<Item = &RelationContext> {
        self.relations
            .iter()
            .filter(move |context| context.relation().kind() == kind)
    }

    /// Return the number of registered relations.
    pub fn num_relations(&self) -> usize {
        self.relations.len()
    }
}

#[cfg(test)]
mod test {
    use crate::{
        error::Error,
        rule_model::relation::{FieldType, RelationField, RelationKind},
    };

    use super::{Catalog, RelationIdAllocator};

    fn fields() -> Vec<RelationField> {
        vec![
            RelationField::new("id", FieldType::Integer),
            RelationField::new("name", FieldType::String),
        ]
    }

    #[test]
    fn peer_relations_come_with_local_and_reject() {
        let mut catalog = Catalog::new();
        catalog.add_peer("P1", "S1");
        catalog
            .add_relation("P1", "Emp", fields(), RelationKind::Peer)
            .unwrap();

        assert_eq!(catalog.num_relations(), 3);
        assert_eq!(
            catalog.local("Emp").unwrap().relation().kind(),
            RelationKind::Local
        );
        assert_eq!(
            catalog.reject("Emp").unwrap().relation().base(),
            Some("Emp")
        );
        assert_eq!(catalog.relation("Emp").unwrap().schema(), "S1");
        assert_ne!(
            catalog.relation("Emp").unwrap().relation().id(),
            catalog.local("Emp").unwrap().relation().id()
        );
    }

    #[test]
    fn duplicates_and_unknown_names() {
        let mut catalog = Catalog::new();
        catalog.add_peer("P1", "S1");
        catalog
            .add_relation("P1", "Emp", fields(), RelationKind::Peer)
            .unwrap();

        assert!(matches!(
            catalog.add_relation("P1", "Emp", fields(), RelationKind::Join),
            Err(Error::DuplicateRelation(_))
        ));
        assert!(matches!(
            catalog.add_relation("P2", "Dept", fields(), RelationKind::Peer),
            Err(Error::UnknownPeer(_))
        ));
        assert!(matches!(
            catalog.relation("Dept"),
            Err(Error::UnknownRelation(_))
        ));
    }

    #[test]
    fn ids_are_unique() {
        let allocator = RelationIdAllocator::new();
        let first = allocator.next_id();
        let second = allocator.next_id();

        assert_ne!(first, second);
        assert_eq!(allocator.allocated(), 2);
    }
}
