//! Flat renderings of a [`StatementReport`] for quick inspection.

use crate::analysis::RatioSeries;
use crate::engine::PeriodSeries;
use crate::period::{Granularity, PeriodBucket};
use crate::report::{ReportNode, RowKind, StatementReport};

impl StatementReport {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// One row per line and classification, one column per bucket of `granularity`.
    pub fn to_csv(&self, granularity: Granularity) -> String {
        let buckets = self.periods.buckets(granularity);
        let mut output = String::new();

        let mut header = vec!["Linha".to_string(), "Tipo".to_string(), "Nivel".to_string()];
        for bucket in buckets {
            header.push(bucket.to_string());
            header.push(format!("{} Orcamento", bucket));
            header.push(format!("{} AH", bucket));
            header.push(format!("{} AV", bucket));
        }
        header.push("Total".to_string());
        header.push("Orcamento Total".to_string());
        output.push_str(&csv_line(&header));

        for (depth, row) in self.rows.iter().flat_map(|r| r.walk()) {
            let realized = row.series(granularity);
            let budget = row.budget_series(granularity);
            let horizontal = ratios(row, granularity, RatioColumn::Horizontal);
            let vertical = ratios(row, granularity, RatioColumn::Vertical);

            let mut fields = vec![
                format!("{}{}", "  ".repeat(depth), row.name),
                row.operation_type.symbol().to_string(),
                kind_label(row.kind).to_string(),
            ];
            for bucket in buckets {
                fields.push(amount_at(realized, bucket));
                fields.push(amount_at(budget, bucket));
                fields.push(ratio_at(horizontal, bucket));
                fields.push(ratio_at(vertical, bucket));
            }
            fields.push(row.total.to_string());
            fields.push(row.budget_total.to_string());
            output.push_str(&csv_line(&fields));
        }

        output
    }

    pub fn to_markdown(&self, granularity: Granularity) -> String {
        let buckets = self.periods.buckets(granularity);
        let mut output = String::new();

        output.push_str(&format!("# {}\n\n", self.title));

        if buckets.is_empty() {
            output.push_str("_Sem lançamentos no período._\n\n");
        }

        output.push_str("| Linha | Tipo |");
        for bucket in buckets {
            output.push_str(&format!(" {} | AV {} |", bucket, bucket));
        }
        output.push_str(" Total |\n");

        output.push_str("|---|:-:|");
        for _ in buckets {
            output.push_str("--:|--:|");
        }
        output.push_str("--:|\n");

        for (depth, row) in self.rows.iter().flat_map(|r| r.walk()) {
            let name = match row.kind {
                RowKind::Totalizer => format!("**{}**", row.name),
                RowKind::Classification => format!("{}_{}_", "&nbsp;&nbsp;".repeat(depth), row.name),
                _ => format!("{}{}", "&nbsp;&nbsp;".repeat(depth), row.name),
            };
            output.push_str(&format!("| {} | {} |", name, row.operation_type.symbol()));

            let realized = row.series(granularity);
            let vertical = ratios(row, granularity, RatioColumn::Vertical);
            for bucket in buckets {
                output.push_str(&format!(
                    " {} | {} |",
                    amount_at(realized, bucket),
                    ratio_at(vertical, bucket)
                ));
            }
            output.push_str(&format!(" {} |\n", row.total));
        }

        let diagnostics = &self.diagnostics;
        output.push_str("\n## Diagnóstico\n\n");
        output.push_str(&format!(
            "- Lançamentos: {} ({} realizados, {} orçados)\n",
            diagnostics.total_rows, diagnostics.realized_rows, diagnostics.budget_rows
        ));
        output.push_str(&format!(
            "- Conciliados: {}, sem correspondência: {}, inválidos: {}\n",
            diagnostics.matched, diagnostics.unmatched, diagnostics.malformed
        ));
        if let Some(base) = &diagnostics.base_line {
            output.push_str(&format!("- Base da análise vertical: {}\n", base));
        }
        for (label, count) in &diagnostics.unmatched_labels {
            output.push_str(&format!("  - `{}`: {}\n", label, count));
        }

        output
    }
}

#[derive(Clone, Copy)]
enum RatioColumn {
    Horizontal,
    Vertical,
}

fn ratios(row: &ReportNode, granularity: Granularity, column: RatioColumn) -> &RatioSeries {
    match (column, granularity) {
        (RatioColumn::Horizontal, Granularity::Monthly) => &row.horizontal_monthly,
        (RatioColumn::Horizontal, Granularity::Quarterly) => &row.horizontal_quarterly,
        (RatioColumn::Horizontal, Granularity::Annual) => &row.horizontal_annual,
        (RatioColumn::Vertical, Granularity::Monthly) => &row.vertical_monthly,
        (RatioColumn::Vertical, Granularity::Quarterly) => &row.vertical_quarterly,
        (RatioColumn::Vertical, Granularity::Annual) => &row.vertical_annual,
    }
}

fn ratio_at(series: &RatioSeries, bucket: &PeriodBucket) -> String {
    series.get(bucket).map(|r| r.display()).unwrap_or_default()
}

fn amount_at(series: &PeriodSeries, bucket: &PeriodBucket) -> String {
    series.get(bucket).map(|v| v.to_string()).unwrap_or_default()
}

fn kind_label(kind: RowKind) -> &'static str {
    match kind {
        RowKind::Totalizer => "totalizador",
        RowKind::Group => "grupo",
        RowKind::Leaf => "conta",
        RowKind::Classification => "classificacao",
    }
}

fn csv_line(fields: &[String]) -> String {
    let escaped: Vec<String> = fields.iter().map(|f| escape_csv(f)).collect();
    format!("{}\n", escaped.join(","))
}

fn escape_csv(field: &str) -> String {
    if field.contains([',', '"', '\n']) || field.starts_with(' ') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::OperationType::{Add, Subtract, Total};
    use crate::schema::{StatementDefinition, StatementKind, StructureNode, Transaction};
    use crate::StatementProcessor;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    fn report() -> StatementReport {
        let definition = StatementDefinition::new(
            "DRE, Gerencial",
            StatementKind::Dre,
            vec![
                StructureNode::new("fat", "Faturamento", Add, 1).with_classifications(),
                StructureNode::new("rb", "Receita Bruta", Total, 2),
                StructureNode::new("desp", "Despesas", Subtract, 3),
                StructureNode::new("res", "Resultado", Total, 4).with_dependencies(&["rb", "desp"]),
            ],
        );
        let date = |m| NaiveDate::from_ymd_opt(2025, m, 10).unwrap();
        let transactions = vec![
            Transaction::new(date(1), dec!(1000), "REAL")
                .with_level2("Faturamento")
                .with_classification("Loja \"Centro\""),
            Transaction::new(date(2), dec!(250), "REAL").with_level2("Despesas"),
            Transaction::new(date(2), dec!(90), "REAL").with_level2("Marketing"),
        ];
        StatementProcessor::process(&definition, &transactions).unwrap()
    }

    #[test]
    fn test_csv_layout() {
        let csv = report().to_csv(Granularity::Monthly);
        let lines: Vec<&str> = csv.lines().collect();

        assert!(lines[0].starts_with("Linha,Tipo,Nivel,2025-01,2025-01 Orcamento,2025-01 AH,2025-01 AV,2025-02"));
        assert!(lines[0].ends_with("Total,Orcamento Total"));
        assert_eq!(lines.len(), 1 + 5);
        assert!(lines[1].starts_with("Faturamento,+,conta,1000,0,–,100%,0,0,-100%,–"));
        assert!(lines[2].starts_with("\"  Loja \"\"Centro\"\"\",+,classificacao"));
        assert!(lines[4].starts_with("Despesas,-,conta,0,0,–,0%,-250,0,–,–"));
    }

    #[test]
    fn test_markdown_contains_rows_and_diagnostics() {
        let markdown = report().to_markdown(Granularity::Annual);
        assert!(markdown.starts_with("# DRE, Gerencial\n"));
        assert!(markdown.contains("| **Resultado** | = | 750 | 75% | 750 |"));
        assert!(markdown.contains("- Conciliados: 2, sem correspondência: 1, inválidos: 0"));
        assert!(markdown.contains("  - `Marketing`: 1"));
    }

    #[test]
    fn test_json_export_round_trips_as_value() {
        let json = report().to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["titulo"], "DRE, Gerencial");
        assert_eq!(value["periodos"]["meses"][1], "2025-02");
        assert_eq!(value["linhas"].as_array().unwrap().len(), 4);
        assert_eq!(value["diagnostico"]["unmatched"], 1);
    }
}
