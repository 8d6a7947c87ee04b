//! Service artifact: a FastAPI application exposing one GET endpoint per
//! registered operation, in declaration order. Imports and helpers are
//! emitted only for the operation kinds actually present, so the artifact
//! stays a pure function of the resolved model.

use crate::Context;
use analitica_core::ops::{
    DetailReport, GroupedReport, Operation, OperationKind, TableReport, TopReport,
    XLSX_MEDIA_TYPE,
};
use analitica_core::schema::{Entity, EntityId, EntityKind, Schema};

use std::fmt::Write;

/// The three entities a reporting endpoint joins across.
struct Join<'a> {
    link: &'a Entity,
    left: &'a Entity,
    right: &'a Entity,
}

impl<'a> Join<'a> {
    fn new(schema: &'a Schema, junction: EntityId) -> Join<'a> {
        let link = schema.entity(junction);
        let EntityKind::Junction(assoc) = &link.kind else {
            unreachable!("registry only hands out junction entities")
        };

        Join {
            link,
            left: schema.entity(assoc.left),
            right: schema.entity(assoc.right),
        }
    }

    fn side(&self, id: EntityId) -> &'a Entity {
        if self.left.id == id {
            self.left
        } else {
            self.right
        }
    }

    fn opposite(&self, id: EntityId) -> &'a Entity {
        if self.left.id == id {
            self.right
        } else {
            self.left
        }
    }

    /// `ProducerProduct.id_producer` for the key pointing at `side`.
    fn key(&self, side: &Entity) -> String {
        let field = self
            .link
            .foreign_key_to(side.id)
            .expect("junction references both sides");
        format!("{}.{}", self.link.name.upper_camel(), field)
    }
}

pub(crate) fn render(context: &Context<'_>) -> String {
    let schema = context.schema;
    let ops = &context.registry.operations;

    let any_op = !ops.is_empty();
    let any_filter = ops.iter().any(|op| op.filter().is_some());
    let any_tabular = ops.iter().any(|op| {
        matches!(
            op.kind,
            OperationKind::Table(_) | OperationKind::Top(_) | OperationKind::Grouped(_)
        )
    });
    let any_detail = ops
        .iter()
        .any(|op| matches!(op.kind, OperationKind::Detail(_)));
    let any_grouped = ops
        .iter()
        .any(|op| matches!(op.kind, OperationKind::Grouped(_)));

    let mut out = String::new();

    let mut fastapi = vec!["FastAPI"];
    if any_op {
        fastapi.push("Depends");
    }
    if any_filter {
        fastapi.push("Query");
    }
    let _ = writeln!(out, "from fastapi import {}", fastapi.join(", "));

    if any_op {
        out.push_str("from fastapi.responses import StreamingResponse\n");
        out.push_str("from sqlalchemy.orm import Session\n");
        if any_grouped {
            out.push_str("from sqlalchemy import func\n");
        }
        out.push_str("import io\n");
    }

    if any_tabular {
        out.push_str("\nimport pandas as pd\n");
    }

    if any_detail {
        out.push_str(
            "\nimport matplotlib\n\
             matplotlib.use(\"Agg\")\n\
             import matplotlib.pyplot as plt\n\
             from reportlab.pdfgen import canvas\n\
             from reportlab.lib.pagesizes import letter\n\
             from reportlab.lib.utils import ImageReader\n",
        );
    }

    out.push_str("\nfrom database import SessionLocal, engine\n");

    let classes: Vec<String> = schema
        .entities()
        .map(|entity| entity.name.upper_camel())
        .collect();
    if classes.is_empty() {
        out.push_str("from models import Base\n");
    } else {
        let _ = writeln!(out, "from models import Base, {}", classes.join(", "));
    }

    out.push_str(
        "\nBase.metadata.create_all(bind=engine)\n\
         \n\
         app = FastAPI()\n",
    );

    if any_tabular {
        let _ = writeln!(out, "\nXLSX_MEDIA_TYPE = \"{XLSX_MEDIA_TYPE}\"");
    }

    if any_op {
        out.push_str("\ndef get_db():\n");
        out.push_str("    db = SessionLocal()\n");
        out.push_str("    try:\n");
        out.push_str("        yield db\n");
        out.push_str("    finally:\n");
        out.push_str("        db.close()\n");
    }

    if any_tabular {
        out.push_str("\ndef xlsx_response(data, sheet_name, filename):\n");
        out.push_str("    df = pd.DataFrame(data)\n");
        out.push_str("    output = io.BytesIO()\n");
        out.push_str("    with pd.ExcelWriter(output, engine=\"openpyxl\") as writer:\n");
        out.push_str("        df.to_excel(writer, index=False, sheet_name=sheet_name)\n");
        out.push_str("    output.seek(0)\n");
        out.push_str("    return StreamingResponse(\n");
        out.push_str("        output,\n");
        out.push_str("        media_type=XLSX_MEDIA_TYPE,\n");
        out.push_str(
            "        headers={\"Content-Disposition\": f\"attachment; filename={filename}\"},\n",
        );
        out.push_str("    )\n");
    }

    for op in ops {
        out.push('\n');
        match &op.kind {
            OperationKind::Table(table) => render_table(&mut out, schema, op, table),
            OperationKind::Detail(detail) => render_detail(&mut out, schema, op, detail),
            OperationKind::Top(top) => render_top(&mut out, schema, op, top),
            OperationKind::Grouped(grouped) => render_grouped(&mut out, schema, op, grouped),
        }
    }

    out
}

fn render_table(out: &mut String, schema: &Schema, op: &Operation, table: &TableReport) {
    let join = Join::new(schema, table.junction);
    let (link, left, right) = (join.link, join.left, join.right);

    let link_var = link.name.lower();
    let left_var = left.name.lower();
    let right_var = right.name.lower();

    let _ = writeln!(out, "@app.get(\"{}\")", op.route());
    let _ = writeln!(
        out,
        "def report_{}(db: Session = Depends(get_db)):",
        op.name.lower()
    );
    let _ = writeln!(out, "    rows = (");
    let _ = writeln!(
        out,
        "        db.query({}, {}, {})",
        link.name.upper_camel(),
        left.name.upper_camel(),
        right.name.upper_camel()
    );
    for side in [left, right] {
        let _ = writeln!(
            out,
            "        .join({}, {} == {}.id)",
            side.name.upper_camel(),
            join.key(side),
            side.name.upper_camel()
        );
    }
    let _ = writeln!(out, "        .all()");
    let _ = writeln!(out, "    )");
    out.push('\n');
    let _ = writeln!(out, "    data = []");
    let _ = writeln!(out, "    for {link_var}, {left_var}, {right_var} in rows:");
    let _ = writeln!(out, "        data.append({{");

    // One column per (joined entity, projected field) pair that exists,
    // left then right then junction, in projection order.
    for field in &table.fields {
        for entity in [left, right, link] {
            if entity.scalar_field(field).is_some() {
                let _ = writeln!(
                    out,
                    "            \"{} {field}\": {}.{field},",
                    entity.name.as_str(),
                    entity.name.lower()
                );
            }
        }
    }

    let _ = writeln!(out, "        }})");
    out.push('\n');
    let _ = writeln!(
        out,
        "    return xlsx_response(data, \"{name}\", \"{name}.xlsx\")",
        name = op.name.as_str()
    );
}

fn render_detail(out: &mut String, schema: &Schema, op: &Operation, detail: &DetailReport) {
    let join = Join::new(schema, detail.junction);
    let link = join.link;
    let filter = join.side(detail.filter);
    let opposite = join.opposite(detail.filter);

    let param = filter.name.lower();
    let link_var = link.name.lower();
    let opposite_var = opposite.name.lower();
    let opposite_label = opposite
        .text_field()
        .expect("registry requires a text field on the opposite side");

    render_filter_preamble(out, op, filter);

    let _ = writeln!(out, "    rows = (");
    let _ = writeln!(
        out,
        "        db.query({}, {})",
        link.name.upper_camel(),
        opposite.name.upper_camel()
    );
    let _ = writeln!(
        out,
        "        .join({}, {} == {}.id)",
        opposite.name.upper_camel(),
        join.key(opposite),
        opposite.name.upper_camel()
    );
    let _ = writeln!(out, "        .filter({} == target.id)", join.key(filter));
    let _ = writeln!(out, "        .all()");
    let _ = writeln!(out, "    )");
    let _ = writeln!(out, "    if not rows:");
    let _ = writeln!(
        out,
        "        return {{\"error\": f\"no data recorded for {{{param}}}\"}}"
    );
    out.push('\n');
    let _ = writeln!(
        out,
        "    labels = [{opposite_var}.{opposite_label} for _, {opposite_var} in rows]"
    );

    let series: Vec<&str> = link.numeric_fields().collect();
    for field in &series {
        let _ = writeln!(
            out,
            "    {field}_series = [{link_var}.{field} for {link_var}, _ in rows]"
        );
    }

    out.push('\n');
    let _ = writeln!(out, "    x = range(len(labels))");
    let _ = writeln!(out, "    fig, ax = plt.subplots()");
    for (index, field) in series.iter().enumerate() {
        let _ = writeln!(
            out,
            "    ax.bar([{} for i in x], {field}_series, width={:.3}, label=\"{field}\")",
            bar_offset_expr(index, series.len()),
            0.8 / series.len() as f64
        );
    }
    let _ = writeln!(
        out,
        "    ax.set_title(f\"{} - {{{param}}}\")",
        op.name.as_str()
    );
    let _ = writeln!(out, "    ax.set_xticks(x)");
    let _ = writeln!(
        out,
        "    ax.set_xticklabels(labels, rotation=45, ha=\"right\")"
    );
    let _ = writeln!(out, "    ax.legend()");
    out.push('\n');
    let _ = writeln!(out, "    img_buf = io.BytesIO()");
    let _ = writeln!(
        out,
        "    plt.savefig(img_buf, format=\"png\", bbox_inches=\"tight\")"
    );
    let _ = writeln!(out, "    plt.close(fig)");
    let _ = writeln!(out, "    img_buf.seek(0)");
    out.push('\n');
    let _ = writeln!(out, "    pdf_buf = io.BytesIO()");
    let _ = writeln!(out, "    page = canvas.Canvas(pdf_buf, pagesize=letter)");
    let _ = writeln!(out, "    page.setFont(\"Helvetica-Bold\", 14)");
    let _ = writeln!(
        out,
        "    page.drawString(100, 750, f\"{} - {{{param}}}\")",
        op.name.as_str()
    );
    let _ = writeln!(
        out,
        "    page.drawImage(ImageReader(img_buf), 50, 350, width=500, height=350)"
    );
    let _ = writeln!(out, "    page.showPage()");
    let _ = writeln!(out, "    page.save()");
    let _ = writeln!(out, "    pdf_buf.seek(0)");
    out.push('\n');
    let _ = writeln!(out, "    return StreamingResponse(");
    let _ = writeln!(out, "        pdf_buf,");
    let _ = writeln!(out, "        media_type=\"{}\",", op.media_type());
    let _ = writeln!(
        out,
        "        headers={{\"Content-Disposition\": f\"attachment; \
         filename={}_{{{param}}}.pdf\"}},",
        op.name.as_str()
    );
    let _ = writeln!(out, "    )");
}

fn render_top(out: &mut String, schema: &Schema, op: &Operation, top: &TopReport) {
    let join = Join::new(schema, top.junction);
    let link = join.link;
    let filter = join.side(top.filter);
    let opposite = join.opposite(top.filter);

    let param = filter.name.lower();
    let link_var = link.name.lower();
    let opposite_var = opposite.name.lower();
    let filter_label = filter
        .text_field()
        .expect("registry requires a text field on the filter entity");

    render_filter_preamble(out, op, filter);

    let _ = writeln!(out, "    rows = (");
    let _ = writeln!(
        out,
        "        db.query({}, {})",
        link.name.upper_camel(),
        opposite.name.upper_camel()
    );
    let _ = writeln!(
        out,
        "        .join({}, {} == {}.id)",
        opposite.name.upper_camel(),
        join.key(opposite),
        opposite.name.upper_camel()
    );
    let _ = writeln!(out, "        .filter({} == target.id)", join.key(filter));
    let _ = writeln!(
        out,
        "        .order_by({}.{}.desc())",
        link.name.upper_camel(),
        top.by
    );
    let _ = writeln!(out, "        .limit({})", top.limit);
    let _ = writeln!(out, "        .all()");
    let _ = writeln!(out, "    )");
    let _ = writeln!(out, "    if not rows:");
    let _ = writeln!(
        out,
        "        return {{\"error\": f\"no data recorded for {{{param}}}\"}}"
    );
    out.push('\n');
    let _ = writeln!(out, "    data = []");
    let _ = writeln!(out, "    for {link_var}, {opposite_var} in rows:");
    let _ = writeln!(out, "        data.append({{");

    for (field, _) in opposite.scalar_fields() {
        let _ = writeln!(
            out,
            "            \"{} {field}\": {opposite_var}.{field},",
            opposite.name.as_str()
        );
    }
    let _ = writeln!(
        out,
        "            \"{} {filter_label}\": {param},",
        filter.name.as_str()
    );
    for (field, _) in link.scalar_fields() {
        let _ = writeln!(
            out,
            "            \"{} {field}\": {link_var}.{field},",
            link.name.as_str()
        );
    }

    let _ = writeln!(out, "        }})");
    out.push('\n');
    let _ = writeln!(
        out,
        "    return xlsx_response(data, \"{name}\", f\"{name}_{{{param}}}.xlsx\")",
        name = op.name.as_str()
    );
}

fn render_grouped(out: &mut String, schema: &Schema, op: &Operation, grouped: &GroupedReport) {
    let join = Join::new(schema, grouped.junction);
    let link = join.link;
    let filter = join.side(grouped.filter);
    let group = join.side(grouped.group);

    let param = filter.name.lower();
    let group_label = group
        .text_field()
        .expect("registry requires a text field on the dimension entity");

    render_filter_preamble(out, op, filter);

    let _ = writeln!(out, "    rows = (");
    let _ = writeln!(
        out,
        "        db.query({}.{group_label}, func.sum({}.{}).label(\"total_{}\"))",
        group.name.upper_camel(),
        link.name.upper_camel(),
        grouped.sum,
        grouped.sum
    );
    let _ = writeln!(
        out,
        "        .join({}, {}.id == {})",
        group.name.upper_camel(),
        group.name.upper_camel(),
        join.key(group)
    );
    let _ = writeln!(out, "        .filter({} == target.id)", join.key(filter));
    let _ = writeln!(
        out,
        "        .group_by({}.{group_label})",
        group.name.upper_camel()
    );
    let _ = writeln!(out, "        .all()");
    let _ = writeln!(out, "    )");
    let _ = writeln!(out, "    if not rows:");
    let _ = writeln!(
        out,
        "        return {{\"error\": f\"no data recorded for {{{param}}}\"}}"
    );
    out.push('\n');
    let _ = writeln!(out, "    data = []");
    let _ = writeln!(out, "    for group_value, total in rows:");
    let _ = writeln!(out, "        data.append({{");
    let _ = writeln!(
        out,
        "            \"{} {}\": {param},",
        filter.name.as_str(),
        filter
            .text_field()
            .expect("registry requires a text field on the filter entity")
    );
    let _ = writeln!(
        out,
        "            \"{} {group_label}\": group_value,",
        group.name.as_str()
    );
    let _ = writeln!(out, "            \"Total {}\": total,", grouped.sum);
    let _ = writeln!(out, "        }})");
    out.push('\n');
    let _ = writeln!(
        out,
        "    return xlsx_response(data, \"{name}\", f\"{name}_{{{param}}}.xlsx\")",
        name = op.name.as_str()
    );
}

/// Route decorator, signature with the required query parameter, and the
/// filter-entity lookup shared by all filter-based kinds.
fn render_filter_preamble(out: &mut String, op: &Operation, filter: &Entity) {
    let param = filter.name.lower();
    let label = filter
        .text_field()
        .expect("registry requires a text field on the filter entity");

    let _ = writeln!(out, "@app.get(\"{}\")", op.route());
    let _ = writeln!(
        out,
        "def report_{}({param}: str = Query(...), db: Session = Depends(get_db)):",
        op.name.lower()
    );
    let _ = writeln!(
        out,
        "    target = db.query({ty}).filter({ty}.{label} == {param}).first()",
        ty = filter.name.upper_camel()
    );
    let _ = writeln!(out, "    if target is None:");
    let _ = writeln!(
        out,
        "        return {{\"error\": f\"no {} named {{{param}}}\"}}",
        filter.name.as_str()
    );
    out.push('\n');
}

/// X-position expression for bar series `index` of `count`, centered on the
/// tick the way the paired layout in the original charts is.
fn bar_offset_expr(index: usize, count: usize) -> String {
    let width = 0.8 / count as f64;
    let offset = (index as f64 + 0.5) * width - 0.4;

    if offset.abs() < 1e-9 {
        "i".to_string()
    } else if offset < 0.0 {
        format!("i - {:.3}", -offset)
    } else {
        format!("i + {:.3}", offset)
    }
}
