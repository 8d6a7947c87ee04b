//! Entity resolver.
//!
//! Walks raw entity declarations, classifies fields (scalar vs.
//! foreign-key-by-convention), infers many-to-many junction entities, and
//! builds the relationship graph with back-references. The resolved
//! [`Schema`] is immutable for the rest of the pipeline.

mod name;
pub use name::Name;

use crate::model::{EntityDecl, FieldDecl};
use crate::{Error, Result};

use indexmap::IndexMap;
use std::fmt;

#[derive(Debug)]
pub struct Schema {
    pub entities: IndexMap<EntityId, Entity>,
}

/// Uniquely identifies an entity within the schema, in declaration order.
#[derive(Copy, Clone, Eq, PartialEq, Hash)]
pub struct EntityId(pub usize);

#[derive(Debug)]
pub struct Entity {
    pub id: EntityId,
    pub name: Name,
    pub kind: EntityKind,
    pub fields: Vec<Field>,
    /// Non-owning collection references back to junction entities that
    /// reference this entity.
    pub inverses: Vec<Inverse>,
}

#[derive(Debug)]
pub enum EntityKind {
    Plain,
    Junction(Junction),
}

/// A many-to-many association inferred from an entity whose relationship
/// fields are exactly two foreign keys. `left` and `right` follow field
/// declaration order.
#[derive(Debug, Clone, Copy)]
pub struct Junction {
    pub left: EntityId,
    pub right: EntityId,
}

#[derive(Debug, Clone, Copy)]
pub struct Inverse {
    pub junction: EntityId,
}

#[derive(Debug)]
pub struct Field {
    pub name: String,
    pub ty: FieldTy,
}

#[derive(Debug)]
pub enum FieldTy {
    Scalar(ScalarType),
    BelongsTo(BelongsTo),
}

#[derive(Debug)]
pub struct BelongsTo {
    pub target: EntityId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarType {
    Text,
    Integer,
    Decimal,
}

impl ScalarType {
    fn from_ident(ident: &str) -> Option<ScalarType> {
        match ident {
            "text" => Some(ScalarType::Text),
            "integer" => Some(ScalarType::Integer),
            "decimal" => Some(ScalarType::Decimal),
            _ => None,
        }
    }

    pub fn is_numeric(self) -> bool {
        matches!(self, ScalarType::Integer | ScalarType::Decimal)
    }
}

/// The foreign-key naming convention, isolated so explicit relationship
/// syntax could replace it without touching the renderer: a field named
/// `id_<entity>` references that entity.
fn foreign_key_target(field_name: &str) -> Option<&str> {
    field_name.strip_prefix("id_").filter(|rest| !rest.is_empty())
}

impl Schema {
    pub fn from_decls(decls: &[EntityDecl]) -> Result<Schema> {
        // Reserve identifiers first so forward references resolve.
        let mut lookup: IndexMap<String, EntityId> = IndexMap::new();
        for (index, decl) in decls.iter().enumerate() {
            if lookup
                .insert(decl.name.to_lowercase(), EntityId(index))
                .is_some()
            {
                return Err(Error::duplicate_entity(&decl.name));
            }
        }

        let mut entities = IndexMap::new();
        for (index, decl) in decls.iter().enumerate() {
            let id = EntityId(index);
            entities.insert(id, build_entity(id, decl, &lookup)?);
        }

        // Classify junctions and wire up the inverse references.
        let mut inverses: Vec<(EntityId, Inverse)> = vec![];
        for entity in entities.values_mut() {
            let targets: Vec<EntityId> = entity
                .fields
                .iter()
                .filter_map(|field| match &field.ty {
                    FieldTy::BelongsTo(belongs_to) => Some(belongs_to.target),
                    FieldTy::Scalar(_) => None,
                })
                .collect();

            match targets[..] {
                [] | [_] => {}
                [left, right] => {
                    if left == right {
                        return Err(Error::classification(
                            entity.name.as_str(),
                            "a junction entity must reference exactly two distinct entities",
                        ));
                    }

                    entity.kind = EntityKind::Junction(Junction { left, right });
                    inverses.push((left, Inverse { junction: entity.id }));
                    inverses.push((right, Inverse { junction: entity.id }));
                }
                _ => {
                    return Err(Error::classification(
                        entity.name.as_str(),
                        format!(
                            "declares {} foreign keys; a junction entity must reference \
                             exactly two distinct entities",
                            targets.len()
                        ),
                    ));
                }
            }
        }

        for (target, inverse) in inverses {
            entities
                .get_mut(&target)
                .expect("inverse target resolved above")
                .inverses
                .push(inverse);
        }

        Ok(Schema { entities })
    }

    pub fn entities(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }

    pub fn entity(&self, id: EntityId) -> &Entity {
        self.entities.get(&id).expect("invalid entity ID")
    }

    pub fn entity_by_name(&self, name: &str) -> Option<&Entity> {
        self.entities
            .values()
            .find(|entity| entity.name.as_str().eq_ignore_ascii_case(name))
    }

    /// Junction entities, in declaration order.
    pub fn junctions(&self) -> impl Iterator<Item = (&Entity, Junction)> {
        self.entities().filter_map(|entity| match entity.kind {
            EntityKind::Junction(junction) => Some((entity, junction)),
            EntityKind::Plain => None,
        })
    }

    /// The junction that references `side`, if any. When several junctions
    /// reference it, the first in declaration order wins.
    pub fn junction_for(&self, side: EntityId) -> Option<(&Entity, Junction)> {
        self.junctions()
            .find(|(_, junction)| junction.left == side || junction.right == side)
    }
}

fn build_entity(
    id: EntityId,
    decl: &EntityDecl,
    lookup: &IndexMap<String, EntityId>,
) -> Result<Entity> {
    check_attribute_collisions(decl)?;

    let mut fields = vec![];

    for field in &decl.fields {
        fields.push(Field {
            name: field.name.clone(),
            ty: field_ty(decl, field, lookup)?,
        });
    }

    Ok(Entity {
        id,
        name: Name::new(&decl.name),
        kind: EntityKind::Plain,
        fields,
        inverses: vec![],
    })
}

/// Generated attribute names must not collide with declared fields: every
/// entity gets an injected `id` primary key, and every foreign key adds a
/// relationship attribute named after its target.
fn check_attribute_collisions(decl: &EntityDecl) -> Result<()> {
    for field in &decl.fields {
        if field.name == "id" {
            return Err(Error::model_syntax(
                field.span,
                format!(
                    "field `id` of entity `{}` collides with the generated primary-key \
                     column",
                    decl.name
                ),
            ));
        }
    }

    for field in &decl.fields {
        let Some(target) = foreign_key_target(&field.name) else {
            continue;
        };
        let attr = target.to_lowercase();

        let clash = decl
            .fields
            .iter()
            .find(|other| other.name == attr && foreign_key_target(&other.name).is_none());

        if let Some(clash) = clash {
            return Err(Error::model_syntax(
                clash.span,
                format!(
                    "field `{}` of entity `{}` collides with the relationship attribute \
                     generated for `{}`",
                    clash.name, decl.name, field.name
                ),
            ));
        }
    }

    Ok(())
}

fn field_ty(
    decl: &EntityDecl,
    field: &FieldDecl,
    lookup: &IndexMap<String, EntityId>,
) -> Result<FieldTy> {
    // Declared types must come from the scalar set even for foreign keys,
    // which are conventionally declared as integers.
    let Some(scalar) = ScalarType::from_ident(&field.ty) else {
        return Err(Error::model_syntax(
            field.span,
            format!(
                "field `{}` of entity `{}` has unknown type `{}` (expected text, integer \
                 or decimal)",
                field.name, decl.name, field.ty
            ),
        ));
    };

    if let Some(target) = foreign_key_target(&field.name) {
        let Some(&target) = lookup.get(&target.to_lowercase()) else {
            return Err(Error::dangling_reference(format!(
                "entity `{}` field `{}` references undeclared entity `{target}`",
                decl.name, field.name
            )));
        };

        return Ok(FieldTy::BelongsTo(BelongsTo { target }));
    }

    Ok(FieldTy::Scalar(scalar))
}

impl Entity {
    pub fn is_junction(&self) -> bool {
        matches!(self.kind, EntityKind::Junction(_))
    }

    pub fn scalar_fields(&self) -> impl Iterator<Item = (&str, ScalarType)> {
        self.fields.iter().filter_map(|field| match &field.ty {
            FieldTy::Scalar(scalar) => Some((field.name.as_str(), *scalar)),
            FieldTy::BelongsTo(_) => None,
        })
    }

    pub fn foreign_keys(&self) -> impl Iterator<Item = (&str, &BelongsTo)> {
        self.fields.iter().filter_map(|field| match &field.ty {
            FieldTy::BelongsTo(belongs_to) => Some((field.name.as_str(), belongs_to)),
            FieldTy::Scalar(_) => None,
        })
    }

    /// The foreign-key field pointing at `target`, when there is one.
    pub fn foreign_key_to(&self, target: EntityId) -> Option<&str> {
        self.foreign_keys()
            .find(|(_, belongs_to)| belongs_to.target == target)
            .map(|(name, _)| name)
    }

    pub fn scalar_field(&self, name: &str) -> Option<ScalarType> {
        self.scalar_fields()
            .find(|(field, _)| *field == name)
            .map(|(_, scalar)| scalar)
    }

    pub fn numeric_fields(&self) -> impl Iterator<Item = &str> {
        self.scalar_fields()
            .filter(|(_, scalar)| scalar.is_numeric())
            .map(|(name, _)| name)
    }

    /// First text field in declaration order; the column filter parameters
    /// match against.
    pub fn text_field(&self) -> Option<&str> {
        self.scalar_fields()
            .find(|(_, scalar)| *scalar == ScalarType::Text)
            .map(|(name, _)| name)
    }
}

impl Junction {
    /// The other side of the association.
    pub fn opposite(&self, side: EntityId) -> Option<EntityId> {
        if side == self.left {
            Some(self.right)
        } else if side == self.right {
            Some(self.left)
        } else {
            None
        }
    }
}

impl fmt::Debug for EntityId {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(fmt, "EntityId({})", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Metamodel, RawModel};
    use pretty_assertions::assert_eq;

    const GRAMMAR: &str = r#"
        Model:  entities *= Entity  operations *= Operation ;

        Entity: "entity" name = ID "{" fields *= Field "}" ;
        Field:  name = ID ":" type = ID "," ;

        Operation: "report" name = ID "{" params *= Param "}" ;
        Param:     name = ID ":" value = VALUE "," ;
    "#;

    fn resolve(src: &str) -> Result<Schema> {
        let mm = Metamodel::from_source(GRAMMAR).unwrap();
        let model = RawModel::from_source(&mm, src).unwrap();
        Schema::from_decls(&model.entities)
    }

    const JUNCTION_MODEL: &str = r#"
        entity Producer {
            name: text,
            area: decimal,
        }

        entity Product {
            name: text,
        }

        entity ProducerProduct {
            id_producer: integer,
            id_product: integer,
            cost: decimal,
            quantity: decimal,
        }
    "#;

    #[test]
    fn classifies_junction_and_inverses() {
        let schema = resolve(JUNCTION_MODEL).unwrap();
        assert_eq!(schema.entities.len(), 3);

        let junction = schema.entity_by_name("ProducerProduct").unwrap();
        assert!(junction.is_junction());

        let EntityKind::Junction(assoc) = junction.kind else {
            unreachable!()
        };
        assert_eq!(schema.entity(assoc.left).name.as_str(), "Producer");
        assert_eq!(schema.entity(assoc.right).name.as_str(), "Product");

        // Both referenced entities gain an inverse collection reference.
        for side in ["Producer", "Product"] {
            let entity = schema.entity_by_name(side).unwrap();
            assert_eq!(entity.inverses.len(), 1);
            assert_eq!(entity.inverses[0].junction, junction.id);
        }

        // Payload fields stay scalar, foreign keys do not.
        let scalars: Vec<_> = junction.scalar_fields().map(|(name, _)| name).collect();
        assert_eq!(scalars, ["cost", "quantity"]);
        assert_eq!(junction.foreign_keys().count(), 2);
    }

    #[test]
    fn foreign_key_match_is_case_insensitive() {
        let schema = resolve(
            "entity Producer { name: text, }\n\
             entity Link { id_PRODUCER: integer, id_producer2: integer, }\n\
             entity Producer2 { name: text, }",
        )
        .unwrap();

        assert!(schema.entity_by_name("Link").unwrap().is_junction());
    }

    #[test]
    fn dangling_reference_is_rejected() {
        let err = resolve("entity Link { id_ghost: integer, }").unwrap_err();
        assert!(err.is_dangling_reference());
        assert!(err.to_string().contains("`Link`"));
        assert!(err.to_string().contains("`id_ghost`"));
    }

    #[test]
    fn duplicate_entity_is_rejected() {
        let err = resolve("entity A { x: text, }\nentity A { y: text, }").unwrap_err();
        assert!(err.is_duplicate_entity());
    }

    #[test]
    fn three_foreign_keys_are_rejected() {
        let err = resolve(
            "entity A { name: text, }\n\
             entity B { name: text, }\n\
             entity C { name: text, }\n\
             entity Link { id_a: integer, id_b: integer, id_c: integer, }",
        )
        .unwrap_err();

        assert!(err.is_classification());
        assert!(err.to_string().contains("3 foreign keys"));
    }

    #[test]
    fn twin_keys_to_one_entity_are_rejected() {
        let err = resolve(
            "entity A { name: text, }\n\
             entity Link { id_a: integer, id_A: integer, }",
        )
        .unwrap_err();

        assert!(err.is_classification());
    }

    #[test]
    fn single_foreign_key_stays_plain() {
        let schema = resolve(
            "entity A { name: text, }\n\
             entity B { id_a: integer, note: text, }",
        )
        .unwrap();

        let b = schema.entity_by_name("B").unwrap();
        assert!(!b.is_junction());
        assert_eq!(b.foreign_keys().count(), 1);
        // No inverse for non-junction references.
        assert!(schema.entity_by_name("A").unwrap().inverses.is_empty());
    }

    #[test]
    fn declared_id_field_is_rejected() {
        let err = resolve("entity Producer { id: integer, name: text, }").unwrap_err();
        assert!(err.is_model_syntax());
        assert!(err.to_string().contains("primary-key"));
    }

    #[test]
    fn field_shadowing_a_relationship_attribute_is_rejected() {
        let err = resolve(
            "entity Producer { name: text, }\n\
             entity Sale { id_producer: integer, producer: text, }",
        )
        .unwrap_err();

        assert!(err.is_model_syntax());
        assert!(err.to_string().contains("`producer`"));
        assert!(err.to_string().contains("relationship attribute"));
    }

    #[test]
    fn unknown_scalar_type_is_rejected() {
        let err = resolve("entity A { name: varchar, }").unwrap_err();
        assert!(err.is_model_syntax());
        assert!(err.to_string().contains("unknown type `varchar`"));
    }
}
