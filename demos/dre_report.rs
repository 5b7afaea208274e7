use financial_statement_builder::{
    build_statement_from_raw, Granularity, OperationType, RawAmount, RawTransaction,
    ReportSettings, StatementDefinition, StatementKind, StructureNode,
};

fn row(date: &str, amount: &str, source: &str, level1: &str, level2: &str, store: &str) -> RawTransaction {
    RawTransaction {
        date: Some(date.to_string()),
        amount: Some(RawAmount::Text(amount.to_string())),
        source: Some(source.to_string()),
        classification: Some(store.to_string()),
        level1: Some(level1.to_string()),
        level2: Some(level2.to_string()),
    }
}

fn main() -> anyhow::Result<()> {
    let definition = StatementDefinition::new(
        "DRE Gerencial - Rede de Lojas",
        StatementKind::Dre,
        vec![
            StructureNode::new("fat", "Faturamento", OperationType::Add, 10)
                .with_aliases(&["Vendas de Mercadorias"])
                .with_classifications(),
            StructureNode::new("rb", "Receita Bruta", OperationType::Total, 20),
            StructureNode::new("ded", "Deduções", OperationType::Subtract, 30),
            StructureNode::new("rl", "Receita Líquida", OperationType::Total, 40)
                .with_dependencies(&["rb", "ded"]),
            StructureNode::new("cmv", "CMV", OperationType::Subtract, 50),
            StructureNode::new("lb", "Lucro Bruto", OperationType::Total, 60)
                .with_dependencies(&["rl", "cmv"]),
            StructureNode::new("desp", "Despesas Operacionais", OperationType::Subtract, 70),
            StructureNode::new("pessoal", "Pessoal", OperationType::Subtract, 71).with_parent("desp"),
            StructureNode::new("ocup", "Ocupação", OperationType::Subtract, 72).with_parent("desp"),
            StructureNode::new("fin", "Resultado Financeiro", OperationType::Signed, 80),
            StructureNode::new("ll", "Lucro Líquido", OperationType::Total, 90)
                .with_dependencies(&["lb", "desp", "fin"]),
        ],
    )
    .with_settings(ReportSettings {
        ratio_precision: 1,
        ..ReportSettings::default()
    });

    let rows = vec![
        row("05/01/2025", "R$ 48.000,00", "REAL", "Receitas", "Vendas de Mercadorias", "Centro"),
        row("05/01/2025", "31.500,00", "REAL", "Receitas", "Faturamento", "Shopping"),
        row("2025-01-01", "75.000,00", "ORC", "Receitas", "Faturamento", ""),
        row("20/01/2025", "(7.950,00)", "REAL", "Deduções", "ICMS", ""),
        row("25/01/2025", "-41.000,00", "REAL", "Custos", "CMV", ""),
        row("30/01/2025", "12.300,00", "REAL", "Despesas Operacionais", "Pessoal", ""),
        row("30/01/2025", "6.100,00", "REAL", "Despesas Operacionais", "Ocupação", ""),
        row("10/02/2025", "52.750,00", "REAL", "Receitas", "Faturamento", "Centro"),
        row("10/02/2025", "29.900,00", "REAL", "Receitas", "Faturamento", "Shopping"),
        row("2025-02-01", "80.000,00", "ORC", "Receitas", "Faturamento", ""),
        row("20/02/2025", "8.260,00", "REAL", "Deduções", "ICMS", ""),
        row("25/02/2025", "43.100,00", "REAL", "Custos", "CMV", ""),
        row("28/02/2025", "12.300,00", "REAL", "Despesas Operacionais", "Pessoal", ""),
        row("28/02/2025", "6.100,00", "REAL", "Despesas Operacionais", "Ocupação", ""),
        row("28/02/2025", "-480,35", "REAL", "Financeiro", "Resultado Financeiro", ""),
        row("31/02/2025", "999,99", "REAL", "Receitas", "Faturamento", "Centro"),
        row("15/02/2025", "1.200,00", "REAL", "Marketing", "Campanhas", ""),
    ];

    let report = build_statement_from_raw(&definition, &rows)?;

    println!("{}", report.to_markdown(Granularity::Monthly));

    let lucro = report
        .find("Lucro Líquido")
        .ok_or_else(|| anyhow::anyhow!("missing net income line"))?;
    println!("Lucro Líquido no período: {}", lucro.total);
    println!(
        "Linhas sem correspondência: {:?}",
        report.diagnostics.unmatched_labels
    );

    let json = report.to_json()?;
    println!("JSON: {} bytes", json.len());

    Ok(())
}
