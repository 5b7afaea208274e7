//! In-memory statement hierarchy.
//!
//! Built once per report from a [`StatementDefinition`](crate::schema::StatementDefinition):
//! lines are ordered, nesting is resolved, the label index used by the matcher is
//! built, and every totalizer gets its dependency scope.

use crate::error::{Result, StatementError};
use crate::schema::{NodeLevel, OperationType, ReportSettings, StructureNode};
use log::{debug, warn};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TotalizerScope {
    /// Declared dependency list.
    Explicit(Vec<usize>),
    /// Inferred from line order. Kept for structures that predate dependency lists.
    Positional(Vec<usize>),
}

impl TotalizerScope {
    pub fn members(&self) -> &[usize] {
        match self {
            Self::Explicit(members) | Self::Positional(members) => members,
        }
    }

    pub fn is_positional(&self) -> bool {
        matches!(self, Self::Positional(_))
    }
}

#[derive(Debug, Clone)]
pub struct LineNode {
    pub id: String,
    pub name: String,
    pub operation_type: OperationType,
    pub order_index: i32,
    pub level: NodeLevel,
    pub parent: Option<usize>,
    pub children: Vec<usize>,
    pub classifications: bool,
    pub scope: Option<TotalizerScope>,
    pub governing_totalizer: Option<usize>,
}

impl LineNode {
    pub fn is_totalizer(&self) -> bool {
        self.operation_type.is_totalizer()
    }

    pub fn is_top_level(&self) -> bool {
        self.parent.is_none()
    }
}

#[derive(Debug, Clone)]
pub struct Structure {
    nodes: Vec<LineNode>,
    id_index: HashMap<String, usize>,
    name_index: HashMap<String, usize>,
    label_index: HashMap<String, usize>,
    labels: Vec<(String, usize)>,
}

/// Canonical form used for every label comparison.
pub fn normalize_label(label: &str) -> String {
    label
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

impl Structure {
    pub fn build(definition: &[StructureNode], settings: &ReportSettings) -> Result<Self> {
        let mut ordered: Vec<&StructureNode> = definition.iter().collect();
        ordered.sort_by_key(|n| n.order_index);

        let mut id_index = HashMap::new();
        for (idx, node) in ordered.iter().enumerate() {
            if id_index.insert(node.id.clone(), idx).is_some() {
                return Err(StatementError::DuplicateNode(node.id.clone()));
            }
        }

        let mut nodes = Vec::with_capacity(ordered.len());
        for node in &ordered {
            let parent = match &node.parent_id {
                Some(parent_id) => Some(resolve_parent(node, parent_id, &ordered, &id_index)?),
                None => None,
            };

            if node.depends_on.is_some() && !node.operation_type.is_totalizer() {
                return Err(StatementError::DependenciesOnNonTotalizer(node.id.clone()));
            }

            nodes.push(LineNode {
                id: node.id.clone(),
                name: node.name.clone(),
                operation_type: node.operation_type,
                order_index: node.order_index,
                level: NodeLevel::Leaf,
                parent,
                children: Vec::new(),
                classifications: node.classifications
                    || node.level == Some(NodeLevel::Classification),
                scope: None,
                governing_totalizer: None,
            });
        }

        for idx in 0..nodes.len() {
            if let Some(parent) = nodes[idx].parent {
                nodes[parent].children.push(idx);
            }
        }

        for (idx, node) in ordered.iter().enumerate() {
            nodes[idx].level = effective_level(node, !nodes[idx].children.is_empty())?;
        }

        let mut name_index = HashMap::new();
        for (idx, node) in nodes.iter().enumerate() {
            name_index.entry(normalize_label(&node.name)).or_insert(idx);
        }

        let mut label_index: HashMap<String, usize> = HashMap::new();
        let mut labels = Vec::new();
        for (idx, node) in ordered.iter().enumerate() {
            if node.operation_type.is_totalizer() {
                continue;
            }
            for label in std::iter::once(&node.name).chain(node.aliases.iter()) {
                let key = normalize_label(label);
                if key.is_empty() {
                    continue;
                }
                match label_index.get(&key) {
                    Some(&existing) if existing != idx => {
                        return Err(StatementError::DuplicateLabel {
                            label: label.clone(),
                            first: nodes[existing].id.clone(),
                            second: node.id.clone(),
                        });
                    }
                    Some(_) => {}
                    None => {
                        label_index.insert(key.clone(), idx);
                        labels.push((key, idx));
                    }
                }
            }
        }

        let mut structure = Self {
            nodes,
            id_index,
            name_index,
            label_index,
            labels,
        };
        structure.resolve_scopes(&ordered, settings)?;
        structure.assign_governing_totalizers();

        debug!(
            "Structure loaded: {} lines, {} totalizers, {} matchable labels",
            structure.nodes.len(),
            structure.totalizers().count(),
            structure.labels.len()
        );

        Ok(structure)
    }

    fn resolve_scopes(&mut self, ordered: &[&StructureNode], settings: &ReportSettings) -> Result<()> {
        let mut previous_totalizer: Option<usize> = None;

        for position in 0..self.nodes.len() {
            if !self.nodes[position].is_totalizer() {
                continue;
            }

            let scope = match &ordered[position].depends_on {
                Some(dependencies) => {
                    let mut members = Vec::with_capacity(dependencies.len());
                    for dependency in dependencies {
                        let member = self.find(dependency).ok_or_else(|| {
                            StatementError::MissingDependency {
                                totalizer: self.nodes[position].id.clone(),
                                dependency: dependency.clone(),
                            }
                        })?;
                        if member == position
                            || (self.nodes[member].is_totalizer() && member > position)
                        {
                            return Err(StatementError::ForwardDependency {
                                totalizer: self.nodes[position].id.clone(),
                                dependency: dependency.clone(),
                            });
                        }
                        members.push(member);
                    }
                    TotalizerScope::Explicit(members)
                }
                None if settings.positional_fallback => {
                    let start = previous_totalizer.map(|p| p + 1).unwrap_or(0);
                    let members: Vec<usize> = (start..position)
                        .filter(|&idx| self.nodes[idx].is_top_level())
                        .collect();
                    if members.is_empty() {
                        warn!(
                            "Totalizer '{}' has an empty positional scope",
                            self.nodes[position].name
                        );
                    }
                    TotalizerScope::Positional(members)
                }
                None => {
                    return Err(StatementError::MissingTotalizerScope(
                        self.nodes[position].id.clone(),
                    ))
                }
            };

            self.nodes[position].scope = Some(scope);
            previous_totalizer = Some(position);
        }

        Ok(())
    }

    fn assign_governing_totalizers(&mut self) {
        let totalizers: Vec<usize> = self.totalizers().collect();

        for &totalizer in &totalizers {
            let members = match &self.nodes[totalizer].scope {
                Some(scope) => scope.members().to_vec(),
                None => continue,
            };
            for member in members {
                let node = &mut self.nodes[member];
                if !node.is_totalizer() && node.governing_totalizer.is_none() {
                    node.governing_totalizer = Some(totalizer);
                }
            }
        }

        for idx in 0..self.nodes.len() {
            let node = &self.nodes[idx];
            if node.is_totalizer() || !node.is_top_level() || node.governing_totalizer.is_some() {
                continue;
            }
            self.nodes[idx].governing_totalizer = totalizers.iter().copied().find(|&t| t > idx);
        }

        for idx in 0..self.nodes.len() {
            if let Some(parent) = self.nodes[idx].parent {
                self.nodes[idx].governing_totalizer = self.nodes[parent].governing_totalizer;
            }
        }
    }

    pub fn nodes(&self) -> &[LineNode] {
        &self.nodes
    }

    pub fn node(&self, idx: usize) -> &LineNode {
        &self.nodes[idx]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Looks a line up by id, then by (normalized) name.
    pub fn find(&self, id_or_name: &str) -> Option<usize> {
        self.id_index
            .get(id_or_name)
            .or_else(|| self.name_index.get(&normalize_label(id_or_name)))
            .copied()
    }

    /// First candidate present in the structure.
    pub fn find_first(&self, candidates: &[String]) -> Option<usize> {
        candidates.iter().find_map(|candidate| self.find(candidate))
    }

    /// Exact lookup of an already-normalized label.
    pub fn lookup_label(&self, normalized: &str) -> Option<usize> {
        self.label_index.get(normalized).copied()
    }

    /// Matchable labels in report order.
    pub fn labels(&self) -> &[(String, usize)] {
        &self.labels
    }

    pub fn top_level(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.nodes.len()).filter(|&idx| self.nodes[idx].is_top_level())
    }

    pub fn totalizers(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.nodes.len()).filter(|&idx| self.nodes[idx].is_totalizer())
    }

    pub fn positional_totalizers(&self) -> Vec<String> {
        self.totalizers()
            .filter(|&idx| {
                self.nodes[idx]
                    .scope
                    .as_ref()
                    .is_some_and(TotalizerScope::is_positional)
            })
            .map(|idx| self.nodes[idx].name.clone())
            .collect()
    }
}

fn resolve_parent(
    node: &StructureNode,
    parent_id: &str,
    ordered: &[&StructureNode],
    id_index: &HashMap<String, usize>,
) -> Result<usize> {
    let parent = *id_index
        .get(parent_id)
        .ok_or_else(|| StatementError::UnknownParent {
            node: node.id.clone(),
            parent: parent_id.to_string(),
        })?;

    let invalid = |reason: &str| StatementError::InvalidParent {
        node: node.id.clone(),
        parent: parent_id.to_string(),
        reason: reason.to_string(),
    };

    if node.operation_type.is_totalizer() {
        return Err(invalid("totalizers cannot be nested"));
    }
    if ordered[parent].operation_type.is_totalizer() {
        return Err(invalid("parent is a totalizer"));
    }
    if ordered[parent].parent_id.is_some() {
        return Err(invalid("only two levels of nesting are supported"));
    }

    Ok(parent)
}

fn effective_level(node: &StructureNode, has_children: bool) -> Result<NodeLevel> {
    let inferred = if node.operation_type.is_totalizer() {
        NodeLevel::Totalizer
    } else if has_children {
        NodeLevel::Group
    } else {
        NodeLevel::Leaf
    };

    match node.level {
        None => Ok(inferred),
        Some(NodeLevel::Totalizer) if !node.operation_type.is_totalizer() => {
            Err(StatementError::InvalidSettings(format!(
                "line '{}' is declared as a totalizer but its operation type is '{}'",
                node.id,
                node.operation_type.symbol()
            )))
        }
        Some(declared) if declared != NodeLevel::Totalizer && node.operation_type.is_totalizer() => {
            Err(StatementError::InvalidSettings(format!(
                "line '{}' has operation type '=' but is declared as {:?}",
                node.id, declared
            )))
        }
        Some(NodeLevel::Classification) if has_children => Err(StatementError::InvalidSettings(format!(
            "classification line '{}' cannot have nested lines",
            node.id
        ))),
        Some(NodeLevel::Classification) => Ok(NodeLevel::Leaf),
        Some(declared) => Ok(declared),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::OperationType::{Add, Signed, Subtract, Total};

    fn dre_nodes() -> Vec<StructureNode> {
        vec![
            StructureNode::new("fat", "Faturamento", Add, 1),
            StructureNode::new("rb", "Receita Bruta", Total, 2),
            StructureNode::new("trib", "Tributos", Subtract, 3).with_aliases(&["Impostos"]),
            StructureNode::new("rl", "Receita Líquida", Total, 4).with_dependencies(&["rb", "trib"]),
            StructureNode::new("desp", "Despesas", Subtract, 5),
            StructureNode::new("pessoal", "Pessoal", Subtract, 6).with_parent("desp"),
            StructureNode::new("nop", "Não Operacional", Signed, 7),
            StructureNode::new("res", "Resultado", Total, 8).with_dependencies(&["Receita Líquida", "desp", "nop"]),
        ]
    }

    #[test]
    fn test_positional_and_explicit_scopes() {
        let structure = Structure::build(&dre_nodes(), &ReportSettings::default()).unwrap();

        let rb = structure.find("rb").unwrap();
        assert_eq!(
            structure.node(rb).scope,
            Some(TotalizerScope::Positional(vec![structure.find("fat").unwrap()]))
        );

        let res = structure.find("res").unwrap();
        let members = structure.node(res).scope.as_ref().unwrap().members().to_vec();
        assert_eq!(
            members,
            vec![
                structure.find("rl").unwrap(),
                structure.find("desp").unwrap(),
                structure.find("nop").unwrap()
            ]
        );

        assert_eq!(structure.positional_totalizers(), vec!["Receita Bruta".to_string()]);
    }

    #[test]
    fn test_levels_and_nesting() {
        let structure = Structure::build(&dre_nodes(), &ReportSettings::default()).unwrap();
        let desp = structure.find("desp").unwrap();
        let pessoal = structure.find("pessoal").unwrap();

        assert_eq!(structure.node(desp).level, NodeLevel::Group);
        assert_eq!(structure.node(desp).children, vec![pessoal]);
        assert_eq!(structure.node(pessoal).level, NodeLevel::Leaf);
        assert_eq!(structure.node(pessoal).parent, Some(desp));
        assert_eq!(structure.node(structure.find("rl").unwrap()).level, NodeLevel::Totalizer);
    }

    #[test]
    fn test_classification_level_becomes_classified_leaf() {
        let mut lojas = StructureNode::new("lojas", "Vendas por Loja", Add, 1);
        lojas.level = Some(NodeLevel::Classification);
        let nodes = vec![lojas, StructureNode::new("rb", "Receita Bruta", Total, 2)];

        let structure = Structure::build(&nodes, &ReportSettings::default()).unwrap();
        let node = structure.node(structure.find("lojas").unwrap());
        assert_eq!(node.level, NodeLevel::Leaf);
        assert!(node.classifications);

        let mut parent = StructureNode::new("desp", "Despesas", Subtract, 1);
        parent.level = Some(NodeLevel::Classification);
        let nested = vec![parent, StructureNode::new("alug", "Aluguel", Subtract, 2).with_parent("desp")];
        assert!(Structure::build(&nested, &ReportSettings::default()).is_err());
    }

    #[test]
    fn test_governing_totalizers() {
        let structure = Structure::build(&dre_nodes(), &ReportSettings::default()).unwrap();
        let governing = |id: &str| {
            structure
                .node(structure.find(id).unwrap())
                .governing_totalizer
                .map(|t| structure.node(t).id.clone())
        };

        assert_eq!(governing("fat"), Some("rb".to_string()));
        assert_eq!(governing("trib"), Some("rl".to_string()));
        assert_eq!(governing("desp"), Some("res".to_string()));
        assert_eq!(governing("pessoal"), Some("res".to_string()));
    }

    #[test]
    fn test_label_index_covers_names_and_aliases() {
        let structure = Structure::build(&dre_nodes(), &ReportSettings::default()).unwrap();
        let trib = structure.find("trib").unwrap();
        assert_eq!(structure.lookup_label("tributos"), Some(trib));
        assert_eq!(structure.lookup_label("impostos"), Some(trib));
        assert_eq!(structure.lookup_label("receita bruta"), None);
        assert_eq!(structure.find("  receita   LÍQUIDA "), structure.find("rl"));
    }

    #[test]
    fn test_missing_dependency_is_fatal() {
        let nodes = vec![
            StructureNode::new("a", "Vendas", Add, 1),
            StructureNode::new("t", "Total", Total, 2).with_dependencies(&["a", "Inexistente"]),
        ];
        let err = Structure::build(&nodes, &ReportSettings::default()).unwrap_err();
        assert!(matches!(
            err,
            StatementError::MissingDependency { ref dependency, .. } if dependency == "Inexistente"
        ));
    }

    #[test]
    fn test_forward_totalizer_dependency_is_rejected() {
        let nodes = vec![
            StructureNode::new("a", "Vendas", Add, 1),
            StructureNode::new("t1", "Primeiro", Total, 2).with_dependencies(&["t2"]),
            StructureNode::new("t2", "Segundo", Total, 3).with_dependencies(&["a"]),
        ];
        let err = Structure::build(&nodes, &ReportSettings::default()).unwrap_err();
        assert!(matches!(err, StatementError::ForwardDependency { .. }));
    }

    #[test]
    fn test_positional_fallback_can_be_disabled() {
        let settings = ReportSettings {
            positional_fallback: false,
            ..ReportSettings::default()
        };
        let err = Structure::build(&dre_nodes(), &settings).unwrap_err();
        assert!(matches!(err, StatementError::MissingTotalizerScope(ref id) if id == "rb"));
    }

    #[test]
    fn test_duplicate_labels_and_ids() {
        let nodes = vec![
            StructureNode::new("a", "Vendas", Add, 1),
            StructureNode::new("b", "Serviços", Add, 2).with_aliases(&["vendas"]),
        ];
        assert!(matches!(
            Structure::build(&nodes, &ReportSettings::default()),
            Err(StatementError::DuplicateLabel { .. })
        ));

        let nodes = vec![
            StructureNode::new("a", "Vendas", Add, 1),
            StructureNode::new("a", "Serviços", Add, 2),
        ];
        assert!(matches!(
            Structure::build(&nodes, &ReportSettings::default()),
            Err(StatementError::DuplicateNode(_))
        ));
    }

    #[test]
    fn test_invalid_nesting() {
        let nodes = vec![
            StructureNode::new("t", "Total", Total, 1),
            StructureNode::new("a", "Vendas", Add, 2).with_parent("t"),
        ];
        assert!(matches!(
            Structure::build(&nodes, &ReportSettings::default()),
            Err(StatementError::InvalidParent { .. })
        ));

        let nodes = vec![StructureNode::new("a", "Vendas", Add, 1).with_parent("nowhere")];
        assert!(matches!(
            Structure::build(&nodes, &ReportSettings::default()),
            Err(StatementError::UnknownParent { .. })
        ));
    }

    #[test]
    fn test_dependencies_on_plain_line_are_rejected() {
        let nodes = vec![
            StructureNode::new("a", "Vendas", Add, 1),
            StructureNode::new("b", "Custos", Subtract, 2).with_dependencies(&["a"]),
        ];
        assert!(matches!(
            Structure::build(&nodes, &ReportSettings::default()),
            Err(StatementError::DependenciesOnNonTotalizer(ref id)) if id == "b"
        ));
    }
}
