//! Data-model artifact: one SQLAlchemy declarative model per entity, in
//! declaration order. Foreign-key fields render as `ForeignKey` columns
//! plus `relationship` attributes, never as plain scalar columns.

use crate::Context;
use analitica_core::schema::{Entity, FieldTy, ScalarType, Schema};

use std::fmt::Write;

pub(crate) fn render(context: &Context<'_>) -> String {
    let schema = context.schema;

    let mut out = String::new();
    out.push_str(
        "from sqlalchemy import Column, Integer, String, Float, ForeignKey\n\
         from sqlalchemy.orm import relationship\n\
         from sqlalchemy.ext.declarative import declarative_base\n\
         \n\
         Base = declarative_base()\n",
    );

    for entity in schema.entities() {
        out.push('\n');
        render_entity(&mut out, schema, entity);
    }

    out
}

fn render_entity(out: &mut String, schema: &Schema, entity: &Entity) {
    let mut w = |line: &str| {
        out.push_str(line);
        out.push('\n');
    };

    w(&format!("class {}(Base):", entity.name.upper_camel()));
    w(&format!("    __tablename__ = \"{}\"", entity.name.storage()));
    w("");
    w("    id = Column(Integer, primary_key=True, index=True)");

    for field in &entity.fields {
        match &field.ty {
            FieldTy::Scalar(scalar) => w(&format!(
                "    {} = Column({}, nullable=True)",
                field.name,
                column_type(*scalar)
            )),
            FieldTy::BelongsTo(belongs_to) => {
                let target = schema.entity(belongs_to.target);
                w(&format!(
                    "    {} = Column(Integer, ForeignKey(\"{}.id\"), nullable=True)",
                    field.name,
                    target.name.storage()
                ));
            }
        }
    }

    let mut relationships = String::new();

    // Owning side: one attribute per foreign key, named after the target.
    // back_populates only when the target carries the inverse collection,
    // which resolution adds for junction references.
    for (_, belongs_to) in entity.foreign_keys() {
        let target = schema.entity(belongs_to.target);
        let paired = target
            .inverses
            .iter()
            .any(|inverse| inverse.junction == entity.id);

        if paired {
            let _ = writeln!(
                relationships,
                "    {} = relationship(\"{}\", back_populates=\"{}\")",
                target.name.lower(),
                target.name.upper_camel(),
                entity.name.storage()
            );
        } else {
            let _ = writeln!(
                relationships,
                "    {} = relationship(\"{}\")",
                target.name.lower(),
                target.name.upper_camel()
            );
        }
    }

    // Inverse side: a collection per junction that references this entity.
    for inverse in &entity.inverses {
        let junction = schema.entity(inverse.junction);
        let _ = writeln!(
            relationships,
            "    {} = relationship(\"{}\", back_populates=\"{}\")",
            junction.name.storage(),
            junction.name.upper_camel(),
            entity.name.lower()
        );
    }

    if !relationships.is_empty() {
        w("");
        out.push_str(&relationships);
    }
}

fn column_type(scalar: ScalarType) -> &'static str {
    match scalar {
        ScalarType::Text => "String",
        ScalarType::Integer => "Integer",
        ScalarType::Decimal => "Float",
    }
}
