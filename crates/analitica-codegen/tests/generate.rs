use analitica_codegen::{generate, ArtifactKind, Config};
use analitica_core::{Metamodel, RawModel, Registry, Schema};

use pretty_assertions::assert_eq;

const GRAMMAR: &str = r#"
    Model:  entities *= Entity  operations *= Operation ;

    Entity: "entity" name = ID "{" fields *= Field "}" ;
    Field:  name = ID ":" type = ID "," ;

    Operation: "report" name = ID "{" params *= Param "}" ;
    Param:     name = ID ":" value = VALUE "," ;
"#;

const MODEL: &str = r#"
    entity Producer {
        name: text,
        city: text,
        area: decimal,
    }

    entity Product {
        name: text,
        season: text,
    }

    entity ProducerProduct {
        id_producer: integer,
        id_product: integer,
        quantity: integer,
        cost: decimal,
    }

    report Global {
        kind: table,
        fields: [name, quantity, cost],
    }

    report History {
        kind: detail,
        filter: producer,
    }

    report Top3 {
        kind: top,
        filter: product,
    }

    report GroupedCosts {
        kind: grouped,
        filter: producer,
    }
"#;

fn artifacts(model: &str) -> Vec<(ArtifactKind, String)> {
    let mm = Metamodel::from_source(GRAMMAR).unwrap();
    let raw = RawModel::from_source(&mm, model).unwrap();
    let schema = Schema::from_decls(&raw.entities).unwrap();
    let registry = Registry::build(&raw.operations, &schema).unwrap();

    generate(&schema, &registry, &Config::default())
        .artifacts
        .into_iter()
        .map(|artifact| (artifact.kind, artifact.body))
        .collect()
}

fn body(model: &str, kind: ArtifactKind) -> String {
    artifacts(model)
        .into_iter()
        .find(|(k, _)| *k == kind)
        .map(|(_, body)| body)
        .unwrap()
}

#[test]
fn emits_the_three_artifacts_in_order() {
    let kinds: Vec<ArtifactKind> = artifacts(MODEL).into_iter().map(|(kind, _)| kind).collect();

    assert_eq!(
        kinds,
        [
            ArtifactKind::Models,
            ArtifactKind::Database,
            ArtifactKind::Service
        ]
    );
    assert_eq!(ArtifactKind::Models.file_name(), "models.py");
    assert_eq!(ArtifactKind::Database.file_name(), "database.py");
    assert_eq!(ArtifactKind::Service.file_name(), "main.py");
}

#[test]
fn models_declares_one_class_per_entity() {
    let models = body(MODEL, ArtifactKind::Models);

    assert!(models.contains("class Producer(Base):"));
    assert!(models.contains("class Product(Base):"));
    assert!(models.contains("class ProducerProduct(Base):"));
    assert!(models.contains("__tablename__ = \"producers\""));
    assert!(models.contains("__tablename__ = \"producerproducts\""));
}

#[test]
fn foreign_key_fields_never_become_plain_columns() {
    let models = body(MODEL, ArtifactKind::Models);

    assert!(models.contains("id_producer = Column(Integer, ForeignKey(\"producers.id\"), nullable=True)"));
    assert!(models.contains("id_product = Column(Integer, ForeignKey(\"products.id\"), nullable=True)"));
    assert!(!models.contains("id_producer = Column(Integer, nullable=True)"));
    assert!(!models.contains("id_product = Column(Integer, nullable=True)"));
}

#[test]
fn junction_sides_gain_inverse_collections() {
    let models = body(MODEL, ArtifactKind::Models);

    assert!(models
        .contains("producerproducts = relationship(\"ProducerProduct\", back_populates=\"producer\")"));
    assert!(models
        .contains("producerproducts = relationship(\"ProducerProduct\", back_populates=\"product\")"));
}

#[test]
fn table_report_joins_and_projects() {
    let service = body(MODEL, ArtifactKind::Service);

    assert!(service.contains("@app.get(\"/report/global\")"));
    assert!(service.contains("def report_global(db: Session = Depends(get_db)):"));
    assert!(service.contains("db.query(ProducerProduct, Producer, Product)"));
    assert!(service.contains(".join(Producer, ProducerProduct.id_producer == Producer.id)"));
    assert!(service.contains(".join(Product, ProducerProduct.id_product == Product.id)"));

    // `name` exists on both sides, so the projection carries both columns.
    assert!(service.contains("\"Producer name\": producer.name,"));
    assert!(service.contains("\"Product name\": product.name,"));
    assert!(service.contains("\"ProducerProduct quantity\": producerproduct.quantity,"));
    assert!(service.contains("\"ProducerProduct cost\": producerproduct.cost,"));
}

#[test]
fn top_report_sorts_desc_and_truncates() {
    let service = body(MODEL, ArtifactKind::Service);

    assert!(service.contains("@app.get(\"/report/top3/topN\")"));
    assert!(service.contains("def report_top3(product: str = Query(...)"));
    assert!(service.contains(".order_by(ProducerProduct.quantity.desc())"));
    assert!(service.contains(".limit(3)"));
}

#[test]
fn grouped_report_sums_per_opposite_side() {
    let service = body(MODEL, ArtifactKind::Service);

    assert!(service.contains("@app.get(\"/report/groupedcosts/grouped\")"));
    assert!(service
        .contains("db.query(Product.name, func.sum(ProducerProduct.cost).label(\"total_cost\"))"));
    assert!(service.contains(".group_by(Product.name)"));
    assert!(service.contains("\"Total cost\": total,"));
}

#[test]
fn detail_report_charts_junction_series() {
    let service = body(MODEL, ArtifactKind::Service);

    assert!(service.contains("@app.get(\"/report/history/detail\")"));
    assert!(service.contains("def report_history(producer: str = Query(...)"));
    assert!(service.contains("quantity_series = [producerproduct.quantity for producerproduct, _ in rows]"));
    assert!(service.contains("cost_series = [producerproduct.cost for producerproduct, _ in rows]"));
    assert!(service.contains("labels = [product.name for _, product in rows]"));
    assert!(service.contains("media_type=\"application/pdf\""));
    // Two series, so the bars are paired around each tick.
    assert!(service.contains("[i - 0.200 for i in x]"));
    assert!(service.contains("[i + 0.200 for i in x]"));
}

#[test]
fn imports_track_operation_kinds() {
    // A model with only a table report needs pandas but none of the
    // charting stack.
    let table_only = MODEL.split("report History").next().unwrap();
    let service = body(table_only, ArtifactKind::Service);

    assert!(service.contains("import pandas as pd"));
    assert!(!service.contains("matplotlib"));
    assert!(!service.contains("reportlab"));
    assert!(!service.contains("from sqlalchemy import func"));
}

#[test]
fn database_artifact_carries_the_connection_string() {
    let database = body(MODEL, ArtifactKind::Database);

    assert!(database.contains("DATABASE_URL = \"sqlite:///./analitica.db\""));
    assert!(database.contains("SessionLocal = sessionmaker("));
}

#[test]
fn generation_is_deterministic() {
    let first = artifacts(MODEL);
    let second = artifacts(MODEL);

    for ((kind, a), (_, b)) in first.iter().zip(second.iter()) {
        assert_eq!(a, b, "artifact {:?} differs between runs", kind);
    }
}
