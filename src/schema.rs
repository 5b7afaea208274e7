use chrono::NaiveDate;
use rust_decimal::Decimal;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, JsonSchema)]
pub enum OperationType {
    #[serde(rename = "+")]
    #[schemars(description = "Line always contributes a non-negative amount (revenues, inflows)")]
    Add,

    #[serde(rename = "-")]
    #[schemars(description = "Line always contributes a non-positive amount (costs, taxes, outflows)")]
    Subtract,

    #[serde(rename = "+/-")]
    #[schemars(description = "Sign of the ledger is kept as-is (non-operating results, adjustments)")]
    Signed,

    #[serde(rename = "=")]
    #[schemars(description = "Totalizer: computed from other lines, never from transactions")]
    Total,
}

impl OperationType {
    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Subtract => "-",
            Self::Signed => "+/-",
            Self::Total => "=",
        }
    }

    pub fn is_totalizer(&self) -> bool {
        matches!(self, Self::Total)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum NodeLevel {
    #[schemars(description = "N0: a '=' line resolved from other lines")]
    Totalizer,

    #[schemars(description = "N1: a top-level line that groups N2 lines")]
    Group,

    #[schemars(description = "N2 (or a childless N1): a line that receives transactions directly")]
    Leaf,

    /// Declared only. Resolves to a leaf whose transactions are also grouped
    /// by classification, same as setting `classifications`.
    #[schemars(
        description = "Placeholder line whose matched transactions are broken down by their free-text classification"
    )]
    Classification,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct StructureNode {
    #[schemars(description = "Stable identifier of the line, unique within the statement")]
    pub id: String,

    #[schemars(description = "Display name; also the primary label transactions are matched against")]
    pub name: String,

    #[schemars(description = "How raw sums are signed, or '=' for totalizers")]
    pub operation_type: OperationType,

    #[schemars(description = "Report position; also bounds positional totalizer scopes")]
    pub order_index: i32,

    #[serde(default)]
    #[schemars(description = "Id of the N1 line this N2 line is nested under")]
    pub parent_id: Option<String>,

    #[serde(default)]
    #[schemars(description = "Declared level. Inferred from operation type and nesting when omitted.")]
    pub level: Option<NodeLevel>,

    #[serde(default)]
    #[schemars(
        description = "Totalizers only: ids or names of the lines summed into this one. When omitted the scope is inferred positionally."
    )]
    pub depends_on: Option<Vec<String>>,

    #[serde(default)]
    #[schemars(description = "Extra labels that should match this line")]
    pub aliases: Vec<String>,

    #[serde(default)]
    #[schemars(description = "If true, matched transactions are also grouped by their free-text classification")]
    pub classifications: bool,
}

impl StructureNode {
    pub fn new(id: &str, name: &str, operation_type: OperationType, order_index: i32) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            operation_type,
            order_index,
            parent_id: None,
            level: None,
            depends_on: None,
            aliases: Vec::new(),
            classifications: false,
        }
    }

    pub fn with_parent(mut self, parent_id: &str) -> Self {
        self.parent_id = Some(parent_id.to_string());
        self
    }

    pub fn with_dependencies(mut self, dependencies: &[&str]) -> Self {
        self.depends_on = Some(dependencies.iter().map(|d| d.to_string()).collect());
        self
    }

    pub fn with_aliases(mut self, aliases: &[&str]) -> Self {
        self.aliases = aliases.iter().map(|a| a.to_string()).collect();
        self
    }

    pub fn with_classifications(mut self) -> Self {
        self.classifications = true;
        self
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "PascalCase")]
pub enum StatementKind {
    #[schemars(description = "Demonstração de Resultado do Exercício (income statement)")]
    Dre,

    #[schemars(description = "Demonstração de Fluxo de Caixa (cash-flow statement)")]
    Dfc,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum NestedBase {
    #[schemars(description = "Nested rows use the statement's reference line, like top-level rows")]
    BaseLine,

    #[schemars(description = "Nested rows use the totalizer governing their parent line")]
    GoverningTotalizer,

    #[schemars(description = "Nested rows use their parent line")]
    ParentLine,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
pub struct DateWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateWindow {
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ReportSettings {
    #[serde(default = "default_base_lines")]
    #[schemars(
        description = "Candidate ids or names of the vertical-analysis reference line, in preference order"
    )]
    pub base_lines: Vec<String>,

    #[serde(default = "default_nested_base")]
    #[schemars(description = "Vertical base for N2 lines and classification groups")]
    pub nested_base: NestedBase,

    #[serde(default = "default_budget_markers")]
    #[schemars(description = "Source markers identifying budget rows (case-insensitive)")]
    pub budget_markers: Vec<String>,

    #[serde(default)]
    #[schemars(
        description = "Match labels by substring containment when no exact match exists. Only for sources with inconsistent labeling."
    )]
    pub substring_fallback: bool,

    #[serde(default = "default_true")]
    #[schemars(description = "Infer totalizer scopes from line order when no dependency list is declared")]
    pub positional_fallback: bool,

    #[serde(default = "default_ratio_precision")]
    #[schemars(description = "Decimal places kept in horizontal, vertical and budget ratios")]
    pub ratio_precision: u32,

    #[serde(default)]
    #[schemars(description = "Only transactions dated inside this inclusive window are considered")]
    pub window: Option<DateWindow>,

    #[serde(default)]
    #[schemars(description = "Size of a dedicated worker pool. Uses the global pool when omitted.")]
    pub worker_threads: Option<usize>,
}

fn default_base_lines() -> Vec<String> {
    vec!["Faturamento".to_string(), "Receita Bruta".to_string()]
}

fn default_nested_base() -> NestedBase {
    NestedBase::BaseLine
}

fn default_budget_markers() -> Vec<String> {
    vec!["ORC".to_string()]
}

fn default_true() -> bool {
    true
}

fn default_ratio_precision() -> u32 {
    2
}

impl ReportSettings {
    pub fn for_kind(kind: StatementKind) -> Self {
        match kind {
            StatementKind::Dre => Self {
                base_lines: default_base_lines(),
                nested_base: NestedBase::BaseLine,
                budget_markers: default_budget_markers(),
                substring_fallback: false,
                positional_fallback: true,
                ratio_precision: default_ratio_precision(),
                window: None,
                worker_threads: None,
            },
            StatementKind::Dfc => Self {
                base_lines: Vec::new(),
                nested_base: NestedBase::GoverningTotalizer,
                budget_markers: default_budget_markers(),
                substring_fallback: false,
                positional_fallback: true,
                ratio_precision: default_ratio_precision(),
                window: None,
                worker_threads: None,
            },
        }
    }

    pub fn is_budget(&self, source: &str) -> bool {
        let source = source.trim();
        self.budget_markers
            .iter()
            .any(|marker| marker.trim().eq_ignore_ascii_case(source))
    }
}

impl Default for ReportSettings {
    fn default() -> Self {
        Self::for_kind(StatementKind::Dre)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct StatementDefinition {
    #[schemars(description = "Title shown on the report (e.g. 'DRE Gerencial')")]
    pub name: String,

    pub kind: StatementKind,

    #[schemars(description = "Every line of the statement. Report order follows order_index.")]
    pub nodes: Vec<StructureNode>,

    #[serde(default)]
    #[schemars(description = "Per-report settings. Omitted fields take the defaults of the statement kind.")]
    pub settings: Option<SettingsOverrides>,
}

/// Settings as declared on a definition. Every field is optional and is
/// laid over [`ReportSettings::for_kind`] of the definition's kind.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct SettingsOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_lines: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nested_base: Option<NestedBase>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub budget_markers: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub substring_fallback: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub positional_fallback: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ratio_precision: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window: Option<DateWindow>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worker_threads: Option<usize>,
}

impl SettingsOverrides {
    pub fn apply(&self, mut settings: ReportSettings) -> ReportSettings {
        if let Some(base_lines) = &self.base_lines {
            settings.base_lines = base_lines.clone();
        }
        if let Some(nested_base) = self.nested_base {
            settings.nested_base = nested_base;
        }
        if let Some(markers) = &self.budget_markers {
            settings.budget_markers = markers.clone();
        }
        if let Some(enabled) = self.substring_fallback {
            settings.substring_fallback = enabled;
        }
        if let Some(enabled) = self.positional_fallback {
            settings.positional_fallback = enabled;
        }
        if let Some(precision) = self.ratio_precision {
            settings.ratio_precision = precision;
        }
        if self.window.is_some() {
            settings.window = self.window;
        }
        if self.worker_threads.is_some() {
            settings.worker_threads = self.worker_threads;
        }
        settings
    }
}

impl From<ReportSettings> for SettingsOverrides {
    fn from(settings: ReportSettings) -> Self {
        Self {
            base_lines: Some(settings.base_lines),
            nested_base: Some(settings.nested_base),
            budget_markers: Some(settings.budget_markers),
            substring_fallback: Some(settings.substring_fallback),
            positional_fallback: Some(settings.positional_fallback),
            ratio_precision: Some(settings.ratio_precision),
            window: settings.window,
            worker_threads: settings.worker_threads,
        }
    }
}

impl StatementDefinition {
    pub fn new(name: &str, kind: StatementKind, nodes: Vec<StructureNode>) -> Self {
        Self {
            name: name.to_string(),
            kind,
            nodes,
            settings: None,
        }
    }

    pub fn with_settings(mut self, settings: ReportSettings) -> Self {
        self.settings = Some(settings.into());
        self
    }

    pub fn settings(&self) -> ReportSettings {
        let defaults = ReportSettings::for_kind(self.kind);
        match &self.settings {
            Some(overrides) => overrides.apply(defaults),
            None => defaults,
        }
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn generate_json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(StatementDefinition)
    }

    pub fn schema_as_json() -> Result<String, serde_json::Error> {
        let schema = Self::generate_json_schema();
        serde_json::to_string_pretty(&schema)
    }
}

/// One normalized ledger entry. The engine only ever borrows these.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// The period-relevant date (competence or cash date), not the due/issue date.
    pub date: NaiveDate,
    pub amount: Decimal,
    /// Realized or budget marker, e.g. "REAL" or "ORC".
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub classification: Option<String>,
    #[serde(default)]
    pub level1: Option<String>,
    #[serde(default)]
    pub level2: Option<String>,
}

impl Transaction {
    pub fn new(date: NaiveDate, amount: Decimal, source: &str) -> Self {
        Self {
            date,
            amount,
            source: source.to_string(),
            classification: None,
            level1: None,
            level2: None,
        }
    }

    pub fn with_level1(mut self, label: &str) -> Self {
        self.level1 = Some(label.to_string());
        self
    }

    pub fn with_level2(mut self, label: &str) -> Self {
        self.level2 = Some(label.to_string());
        self
    }

    pub fn with_classification(mut self, classification: &str) -> Self {
        self.classification = Some(classification.to_string());
        self
    }
}
