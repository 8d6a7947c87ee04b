//! Operation registry.
//!
//! Classifies each operation declaration into the closed kind set and
//! validates the parameters the kind requires. The registry prepares all
//! metadata the renderer needs (route, join sides, aggregation fields,
//! media type) and never executes anything.

use crate::model::{OperationDecl, ParamValue};
use crate::schema::{EntityId, Name, Schema};
use crate::{Error, Result};

/// Ranking operations truncate to this many rows unless overridden.
pub const DEFAULT_TOP_LIMIT: i64 = 3;

/// Conventional junction fields mirroring the original reporting columns.
pub const DEFAULT_RANK_FIELD: &str = "quantity";
pub const DEFAULT_SUM_FIELD: &str = "cost";

pub const XLSX_MEDIA_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";
pub const PDF_MEDIA_TYPE: &str = "application/pdf";

#[derive(Debug)]
pub struct Registry {
    pub operations: Vec<Operation>,
}

#[derive(Debug)]
pub struct Operation {
    pub name: Name,
    pub kind: OperationKind,
}

#[derive(Debug)]
pub enum OperationKind {
    /// Flat join across the junction, projected to the declared fields,
    /// exported as a spreadsheet.
    Table(TableReport),

    /// Per-entity series extraction rendered as a paired bar chart inside a
    /// PDF document.
    Detail(DetailReport),

    /// Sort descending by a junction field, truncate, export as a
    /// spreadsheet.
    Top(TopReport),

    /// Sum of a junction field grouped by the opposite side, exported as a
    /// spreadsheet.
    Grouped(GroupedReport),
}

#[derive(Debug)]
pub struct TableReport {
    pub junction: EntityId,
    pub fields: Vec<String>,
}

#[derive(Debug)]
pub struct DetailReport {
    pub junction: EntityId,
    pub filter: EntityId,
}

#[derive(Debug)]
pub struct TopReport {
    pub junction: EntityId,
    pub filter: EntityId,
    pub by: String,
    pub limit: i64,
}

#[derive(Debug)]
pub struct GroupedReport {
    pub junction: EntityId,
    pub filter: EntityId,
    pub group: EntityId,
    pub sum: String,
}

impl Registry {
    pub fn build(decls: &[OperationDecl], schema: &Schema) -> Result<Registry> {
        let operations = decls
            .iter()
            .map(|decl| classify(decl, schema))
            .collect::<Result<_>>()?;

        Ok(Registry { operations })
    }
}

impl Operation {
    /// Route of the generated endpoint. The segment is the operation name
    /// lowercased; filter-based kinds get a kind-specific suffix.
    pub fn route(&self) -> String {
        let base = format!("/report/{}", self.name.lower());

        match self.kind {
            OperationKind::Table(_) => base,
            OperationKind::Detail(_) => format!("{base}/detail"),
            OperationKind::Top(_) => format!("{base}/topN"),
            OperationKind::Grouped(_) => format!("{base}/grouped"),
        }
    }

    pub fn media_type(&self) -> &'static str {
        match self.kind {
            OperationKind::Detail(_) => PDF_MEDIA_TYPE,
            _ => XLSX_MEDIA_TYPE,
        }
    }

    /// The entity whose rows the required query parameter selects, for
    /// filter-based kinds.
    pub fn filter(&self) -> Option<EntityId> {
        match &self.kind {
            OperationKind::Table(_) => None,
            OperationKind::Detail(detail) => Some(detail.filter),
            OperationKind::Top(top) => Some(top.filter),
            OperationKind::Grouped(grouped) => Some(grouped.filter),
        }
    }
}

fn classify(decl: &OperationDecl, schema: &Schema) -> Result<Operation> {
    let kind = match decl.param("kind") {
        Some(param) => match &param.value {
            ParamValue::Ident(kind) => kind.as_str(),
            _ => {
                return Err(Error::incomplete_operation(
                    &decl.name,
                    "`kind` must be an identifier",
                ));
            }
        },
        None => {
            return Err(Error::incomplete_operation(
                &decl.name,
                "missing required parameter `kind`",
            ));
        }
    };

    let kind = match kind {
        "table" => OperationKind::Table(classify_table(decl, schema)?),
        "detail" => OperationKind::Detail(classify_detail(decl, schema)?),
        "top" => OperationKind::Top(classify_top(decl, schema)?),
        "grouped" => OperationKind::Grouped(classify_grouped(decl, schema)?),
        other => return Err(Error::unknown_operation_kind(&decl.name, other)),
    };

    Ok(Operation {
        name: Name::new(&decl.name),
        kind,
    })
}

fn classify_table(decl: &OperationDecl, schema: &Schema) -> Result<TableReport> {
    let junction = require_junction(decl, schema)?;

    let fields = match decl.param("fields") {
        Some(param) => match &param.value {
            ParamValue::List(fields) if !fields.is_empty() => fields.clone(),
            ParamValue::List(_) => {
                return Err(Error::incomplete_operation(
                    &decl.name,
                    "`fields` must not be empty",
                ));
            }
            _ => {
                return Err(Error::incomplete_operation(
                    &decl.name,
                    "`fields` must be a list of field names",
                ));
            }
        },
        None => {
            return Err(Error::incomplete_operation(
                &decl.name,
                "missing required parameter `fields`",
            ));
        }
    };

    // Every projected field must exist on at least one joined entity.
    let link = schema.entity(junction);
    let sides = match link.kind {
        crate::schema::EntityKind::Junction(junction) => [junction.left, junction.right],
        _ => unreachable!("require_junction returns junction entities"),
    };

    for field in &fields {
        let found = link.scalar_field(field).is_some()
            || sides
                .iter()
                .any(|side| schema.entity(*side).scalar_field(field).is_some());

        if !found {
            return Err(Error::dangling_reference(format!(
                "operation `{}` projects field `{field}`, which none of the joined \
                 entities declare",
                decl.name
            )));
        }
    }

    Ok(TableReport { junction, fields })
}

fn classify_detail(decl: &OperationDecl, schema: &Schema) -> Result<DetailReport> {
    let (junction, filter) = require_filter(decl, schema)?;

    let link = schema.entity(junction);
    if link.numeric_fields().next().is_none() {
        return Err(Error::incomplete_operation(
            &decl.name,
            format!(
                "junction `{}` has no numeric fields to chart",
                link.name.as_str()
            ),
        ));
    }

    require_opposite_label(decl, schema, junction, filter)?;

    Ok(DetailReport { junction, filter })
}

fn classify_top(decl: &OperationDecl, schema: &Schema) -> Result<TopReport> {
    let (junction, filter) = require_filter(decl, schema)?;

    let limit = match decl.param("limit") {
        Some(param) => match param.value {
            ParamValue::Int(limit) if limit > 0 => limit,
            _ => {
                return Err(Error::incomplete_operation(
                    &decl.name,
                    "`limit` must be a positive integer",
                ));
            }
        },
        None => DEFAULT_TOP_LIMIT,
    };

    let by = junction_field(decl, schema, junction, "by", DEFAULT_RANK_FIELD)?;

    Ok(TopReport {
        junction,
        filter,
        by,
        limit,
    })
}

fn classify_grouped(decl: &OperationDecl, schema: &Schema) -> Result<GroupedReport> {
    let (junction, filter) = require_filter(decl, schema)?;
    let opposite = require_opposite_label(decl, schema, junction, filter)?;

    let group = match decl.param("group") {
        Some(param) => {
            let Some(name) = ident_value(&param.value) else {
                return Err(Error::incomplete_operation(
                    &decl.name,
                    "`group` must name an entity",
                ));
            };

            let Some(entity) = schema.entity_by_name(name) else {
                return Err(Error::dangling_reference(format!(
                    "operation `{}` groups by `{name}`, which is not a declared entity",
                    decl.name
                )));
            };

            if entity.id != opposite {
                return Err(Error::dangling_reference(format!(
                    "operation `{}` groups by `{name}`, which is not joined opposite \
                     the filter entity",
                    decl.name
                )));
            }

            entity.id
        }
        None => opposite,
    };

    let sum = junction_field(decl, schema, junction, "sum", DEFAULT_SUM_FIELD)?;

    Ok(GroupedReport {
        junction,
        filter,
        group,
        sum,
    })
}

/// Filter-based kinds join across the junction that references the filter
/// entity; the filter entity needs a text field to match the query
/// parameter against.
fn require_filter(decl: &OperationDecl, schema: &Schema) -> Result<(EntityId, EntityId)> {
    let filter = match decl.param("filter") {
        Some(param) => match ident_value(&param.value) {
            Some(filter) => filter,
            None => {
                return Err(Error::incomplete_operation(
                    &decl.name,
                    "`filter` must name an entity",
                ));
            }
        },
        None => {
            return Err(Error::incomplete_operation(
                &decl.name,
                "missing required parameter `filter`",
            ));
        }
    };

    let Some(entity) = schema.entity_by_name(filter) else {
        return Err(Error::dangling_reference(format!(
            "operation `{}` filters by `{filter}`, which is not a declared entity",
            decl.name
        )));
    };

    let Some((junction, _)) = schema.junction_for(entity.id) else {
        return Err(Error::incomplete_operation(
            &decl.name,
            format!(
                "no junction entity references `{}`; there is nothing to join across",
                entity.name.as_str()
            ),
        ));
    };

    if entity.text_field().is_none() {
        return Err(Error::incomplete_operation(
            &decl.name,
            format!(
                "filter entity `{}` has no text field to match the query parameter against",
                entity.name.as_str()
            ),
        ));
    }

    Ok((junction.id, entity.id))
}

/// Table reports join across the first junction in declaration order; a
/// model with several junctions always exports that one.
fn require_junction(decl: &OperationDecl, schema: &Schema) -> Result<EntityId> {
    match schema.junctions().next() {
        Some((junction, _)) => Ok(junction.id),
        None => Err(Error::incomplete_operation(
            &decl.name,
            "the model declares no junction entity to join across",
        )),
    }
}

/// Detail and grouped exports label their output with the text field of the
/// entity opposite the filter.
fn require_opposite_label(
    decl: &OperationDecl,
    schema: &Schema,
    junction: EntityId,
    filter: EntityId,
) -> Result<EntityId> {
    let link = schema.entity(junction);
    let assoc = match link.kind {
        crate::schema::EntityKind::Junction(assoc) => assoc,
        _ => unreachable!("require_filter returns junction entities"),
    };

    let opposite = assoc
        .opposite(filter)
        .expect("filter entity is a junction side");

    if schema.entity(opposite).text_field().is_none() {
        return Err(Error::incomplete_operation(
            &decl.name,
            format!(
                "entity `{}` has no text field to label the output with",
                schema.entity(opposite).name.as_str()
            ),
        ));
    }

    Ok(opposite)
}

fn junction_field(
    decl: &OperationDecl,
    schema: &Schema,
    junction: EntityId,
    param: &str,
    default: &str,
) -> Result<String> {
    let field = match decl.param(param) {
        Some(param_decl) => match ident_value(&param_decl.value) {
            Some(field) => field.to_string(),
            None => {
                return Err(Error::incomplete_operation(
                    &decl.name,
                    format!("`{param}` must name a junction field"),
                ));
            }
        },
        None => default.to_string(),
    };

    let link = schema.entity(junction);
    match link.scalar_field(&field) {
        Some(scalar) if scalar.is_numeric() => Ok(field),
        _ => Err(Error::dangling_reference(format!(
            "operation `{}` uses `{field}`, which is not a numeric field of junction `{}`",
            decl.name,
            link.name.as_str()
        ))),
    }
}

fn ident_value(value: &ParamValue) -> Option<&str> {
    match value {
        ParamValue::Ident(ident) => Some(ident),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Metamodel, RawModel, Schema};
    use pretty_assertions::assert_eq;

    const GRAMMAR: &str = r#"
        Model:  entities *= Entity  operations *= Operation ;

        Entity: "entity" name = ID "{" fields *= Field "}" ;
        Field:  name = ID ":" type = ID "," ;

        Operation: "report" name = ID "{" params *= Param "}" ;
        Param:     name = ID ":" value = VALUE "," ;
    "#;

    const ENTITIES: &str = r#"
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

    fn registry(ops: &str) -> Result<Registry> {
        let mm = Metamodel::from_source(GRAMMAR).unwrap();
        let src = format!("{ENTITIES}\n{ops}");
        let model = RawModel::from_source(&mm, &src).unwrap();
        let schema = Schema::from_decls(&model.entities).unwrap();
        Registry::build(&model.operations, &schema)
    }

    #[test]
    fn classifies_all_kinds() {
        let registry = registry(
            r#"
            report Global { kind: table, fields: [name, area, cost, quantity], }
            report History { kind: detail, filter: producer, }
            report Top3 { kind: top, filter: product, }
            report Costs { kind: grouped, filter: producer, sum: cost, }
            "#,
        )
        .unwrap();

        assert_eq!(registry.operations.len(), 4);
        assert!(matches!(
            registry.operations[0].kind,
            OperationKind::Table(_)
        ));
        assert_eq!(registry.operations[0].route(), "/report/global");
        assert_eq!(registry.operations[1].route(), "/report/history/detail");
        assert_eq!(registry.operations[2].route(), "/report/top3/topN");
        assert_eq!(registry.operations[3].route(), "/report/costs/grouped");
        assert_eq!(registry.operations[1].media_type(), PDF_MEDIA_TYPE);
        assert_eq!(registry.operations[2].media_type(), XLSX_MEDIA_TYPE);
    }

    #[test]
    fn top_defaults_limit_and_rank_field() {
        let registry = registry("report Top3 { kind: top, filter: product, }").unwrap();

        let OperationKind::Top(ref top) = registry.operations[0].kind else {
            panic!("expected top kind");
        };
        assert_eq!(top.limit, 3);
        assert_eq!(top.by, "quantity");
    }

    #[test]
    fn top_limit_can_be_overridden() {
        let registry =
            registry("report Top { kind: top, filter: product, limit: 5, by: cost, }").unwrap();

        let OperationKind::Top(ref top) = registry.operations[0].kind else {
            panic!("expected top kind");
        };
        assert_eq!(top.limit, 5);
        assert_eq!(top.by, "cost");
    }

    #[test]
    fn unknown_kind_is_rejected() {
        let err = registry("report X { kind: histogram, }").unwrap_err();
        assert!(err.is_unknown_operation_kind());
        assert!(err.to_string().contains("`X`"));
        assert!(err.to_string().contains("`histogram`"));
    }

    #[test]
    fn missing_kind_is_rejected() {
        let err = registry("report X { filter: producer, }").unwrap_err();
        assert!(err.is_incomplete_operation());
    }

    #[test]
    fn missing_filter_is_rejected() {
        let err = registry("report X { kind: detail, }").unwrap_err();
        assert!(err.is_incomplete_operation());
        assert!(err.to_string().contains("`filter`"));
    }

    #[test]
    fn filter_must_name_an_entity() {
        let err = registry("report X { kind: top, filter: warehouse, }").unwrap_err();
        assert!(err.is_dangling_reference());
    }

    #[test]
    fn rank_field_must_be_numeric() {
        let err = registry("report X { kind: top, filter: product, by: name, }").unwrap_err();
        assert!(err.is_dangling_reference());
    }

    #[test]
    fn table_projection_must_exist() {
        let err = registry("report X { kind: table, fields: [altitude], }").unwrap_err();
        assert!(err.is_dangling_reference());
        assert!(err.to_string().contains("`altitude`"));
    }

    #[test]
    fn multiple_junctions_pick_by_declaration_order() {
        let mm = Metamodel::from_source(GRAMMAR).unwrap();
        let src = r#"
            entity Producer { name: text, }
            entity Product { name: text, }
            entity ProducerProduct {
                id_producer: integer,
                id_product: integer,
                quantity: integer,
            }
            entity Warehouse { name: text, }
            entity ProductWarehouse {
                id_product: integer,
                id_warehouse: integer,
                stock: integer,
            }

            report Global { kind: table, fields: [name], }
            report Stock { kind: top, filter: warehouse, by: stock, }
        "#;
        let model = RawModel::from_source(&mm, src).unwrap();
        let schema = Schema::from_decls(&model.entities).unwrap();
        let registry = Registry::build(&model.operations, &schema).unwrap();

        // Table reports join across the first junction declared.
        let OperationKind::Table(ref table) = registry.operations[0].kind else {
            panic!("expected table kind");
        };
        assert_eq!(table.junction, EntityId(2));

        // Filter-based kinds pick the first junction touching the filter
        // entity.
        let OperationKind::Top(ref top) = registry.operations[1].kind else {
            panic!("expected top kind");
        };
        assert_eq!(top.junction, EntityId(4));
    }

    #[test]
    fn grouped_defaults_to_opposite_side() {
        let registry = registry("report X { kind: grouped, filter: producer, }").unwrap();

        let OperationKind::Grouped(ref grouped) = registry.operations[0].kind else {
            panic!("expected grouped kind");
        };
        assert_eq!(grouped.sum, "cost");
        // Filter is Producer, so the dimension defaults to Product.
        assert_eq!(grouped.group, EntityId(1));
    }
}
