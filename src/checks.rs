//! Consistency checks run after a descriptor has been loaded
//!
//! `ModelChecker` looks only at the descriptor: cross references, ids, column
//! declarations and their types. `DataChecker` looks at the loaded CSV rows of
//! each table. Both collect every finding instead of stopping at the first.

use std::collections::{HashMap, HashSet};
use std::fmt;

use tracing::debug;

use crate::data::{DatePattern, TableData, parse_value};
use crate::model::{
    Column, Concept, ConceptRef, DataType, Dataset, Resolution, Slice, TIME_NAMESPACE, Table,
};

/// Findings listed per data check before they are summarized
const MAX_REPORTED_PER_CHECK: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueKind {
    Model,
    Data,
}

/// One consistency finding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Issue {
    pub kind: IssueKind,
    /// Element the issue concerns, e.g. `slice 'pop_slice'`
    pub location: String,
    pub message: String,
}

impl Issue {
    pub fn model(location: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: IssueKind::Model,
            location: location.into(),
            message: message.into(),
        }
    }

    pub fn data(location: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: IssueKind::Data,
            location: location.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.location, self.message)
    }
}

/// Ids occurring more than once, each reported once in order of appearance
fn duplicates<'b>(ids: impl IntoIterator<Item = &'b str>) -> Vec<&'b str> {
    let mut seen = HashSet::new();
    let mut reported = HashSet::new();
    ids.into_iter()
        .filter(|id| !seen.insert(*id) && reported.insert(*id))
        .collect()
}

/// Dimensions then metrics of a slice, tagged with their role
fn slice_concepts(slice: &Slice) -> Vec<(&'static str, &ConceptRef)> {
    slice
        .dimensions
        .iter()
        .map(|d| ("dimension", d))
        .chain(slice.metrics.iter().map(|m| ("metric", m)))
        .collect()
}

/// Structural checks over a loaded descriptor
pub struct ModelChecker<'a> {
    dataset: &'a Dataset,
    issues: Vec<Issue>,
}

impl<'a> ModelChecker<'a> {
    pub fn new(dataset: &'a Dataset) -> Self {
        Self {
            dataset,
            issues: Vec::new(),
        }
    }

    pub fn check(mut self) -> Vec<Issue> {
        let dataset = self.dataset;

        self.check_unique_ids();
        for attribute in &dataset.attributes {
            if let Some(concept) = &attribute.concept {
                self.resolve_concept("dataset", "attribute", concept);
            }
        }
        for concept in &dataset.concepts {
            self.check_concept(concept);
        }
        for slice in &dataset.slices {
            self.check_slice(slice);
        }
        for table in &dataset.tables {
            self.check_table(table);
        }

        debug!(issues = self.issues.len(), "model check finished");
        self.issues
    }

    fn push(&mut self, location: &str, message: String) {
        self.issues.push(Issue::model(location, message));
    }

    fn check_unique_ids(&mut self) {
        let dataset = self.dataset;
        let kinds: [(&str, Vec<&str>); 4] = [
            (
                "topic",
                dataset
                    .all_topics()
                    .into_iter()
                    .map(|t| t.id.as_str())
                    .collect(),
            ),
            (
                "concept",
                dataset.concepts.iter().map(|c| c.id.as_str()).collect(),
            ),
            (
                "slice",
                dataset.slices.iter().map(|s| s.id.as_str()).collect(),
            ),
            (
                "table",
                dataset.tables.iter().map(|t| t.id.as_str()).collect(),
            ),
        ];
        for (kind, ids) in kinds {
            for id in duplicates(ids) {
                self.push(
                    &format!("{} '{}'", kind, id),
                    "id is declared more than once".to_string(),
                );
            }
        }
    }

    /// Local id a reference points to; namespace problems are reported
    fn local_id<'r>(
        &mut self,
        location: &str,
        role: &str,
        reference: &'r ConceptRef,
    ) -> Option<&'r str> {
        let dataset = self.dataset;
        match dataset.resolve(reference) {
            Resolution::Local(_) => Some(reference.local.as_str()),
            Resolution::External { .. } => None,
            Resolution::UndeclaredPrefix(prefix) => {
                let message = format!(
                    "{} '{}' uses undeclared namespace prefix '{}'",
                    role, reference, prefix
                );
                self.push(location, message);
                None
            }
            Resolution::NotImported { namespace } => {
                let message = format!(
                    "{} '{}' uses namespace '{}' which is not imported",
                    role, reference, namespace
                );
                self.push(location, message);
                None
            }
        }
    }

    fn resolve_concept(
        &mut self,
        location: &str,
        role: &str,
        reference: &ConceptRef,
    ) -> Option<&'a Concept> {
        let dataset = self.dataset;
        let id = self.local_id(location, role, reference)?;
        let concept = dataset.concept(id);
        if concept.is_none() {
            self.push(
                location,
                format!("{} refers to unknown concept '{}'", role, reference),
            );
        }
        concept
    }

    fn check_concept(&mut self, concept: &'a Concept) {
        let dataset = self.dataset;
        let location = format!("concept '{}'", concept.id);

        if let Some(extends) = &concept.extends {
            self.resolve_concept(&location, "extends", extends);
        }
        for topic in &concept.topics {
            if let Some(id) = self.local_id(&location, "topic", topic)
                && dataset.topic(id).is_none()
            {
                self.push(&location, format!("refers to unknown topic '{}'", topic));
            }
        }
        for attribute in &concept.attributes {
            if let Some(reference) = &attribute.concept {
                self.resolve_concept(&location, "attribute", reference);
            }
        }
        for property in &concept.properties {
            if let Some(reference) = &property.concept {
                self.resolve_concept(&location, "property", reference);
            }
        }

        let Some(table_id) = concept.table.as_deref() else {
            return;
        };
        let Some(table) = dataset.table(table_id) else {
            self.push(&location, format!("refers to unknown table '{}'", table_id));
            return;
        };

        match table.column(&concept.id) {
            None => self.push(
                &location,
                format!("table '{}' has no column '{}'", table.id, concept.id),
            ),
            Some(column) => {
                if let Some(expected) = concept.data_type
                    && column.data_type != expected
                {
                    self.push(
                        &location,
                        format!(
                            "column '{}' of table '{}' is {} but the concept is {}",
                            column.id, table.id, column.data_type, expected
                        ),
                    );
                }
            }
        }
        for property in &concept.properties {
            if let Some(column) = property.column_id()
                && table.column(column).is_none()
            {
                self.push(
                    &location,
                    format!(
                        "table '{}' has no column '{}' for a property",
                        table.id, column
                    ),
                );
            }
        }
    }

    fn check_slice(&mut self, slice: &'a Slice) {
        let dataset = self.dataset;
        let location = format!("slice '{}'", slice.id);
        let concepts = slice_concepts(slice);

        for (role, reference) in &concepts {
            self.resolve_concept(&location, role, reference);
        }
        for (i, (role, reference)) in concepts.iter().enumerate() {
            if let Some((first_role, _)) = concepts[..i].iter().find(|(_, r)| r.same_as(reference)) {
                let message = if first_role == role {
                    format!("concept '{}' is listed more than once", reference)
                } else {
                    format!("concept '{}' is used as both dimension and metric", reference)
                };
                self.push(&location, message);
            }
        }

        for mapping in &slice.dimension_map {
            if !slice.dimensions.iter().any(|d| d.same_as(&mapping.concept)) {
                self.push(
                    &location,
                    format!(
                        "mapDimension refers to '{}' which is not a dimension of the slice",
                        mapping.concept
                    ),
                );
            }
        }
        for mapping in &slice.metric_map {
            if !slice.metrics.iter().any(|m| m.same_as(&mapping.concept)) {
                self.push(
                    &location,
                    format!(
                        "mapMetric refers to '{}' which is not a metric of the slice",
                        mapping.concept
                    ),
                );
            }
        }

        let Some(table) = dataset.table(&slice.table) else {
            self.push(&location, format!("refers to unknown table '{}'", slice.table));
            return;
        };
        for (role, reference) in &concepts {
            let column_id = slice.column_for(reference);
            match table.column(column_id) {
                None => self.push(
                    &location,
                    format!(
                        "table '{}' has no column '{}' for {} '{}'",
                        table.id, column_id, role, reference
                    ),
                ),
                Some(column) => self.check_column_type(table, column, reference),
            }
        }
    }

    fn check_column_type(&mut self, table: &Table, column: &Column, reference: &ConceptRef) {
        let location = format!("table '{}'", table.id);

        if reference.namespace.as_deref() == Some(TIME_NAMESPACE) {
            if column.data_type != DataType::Date {
                self.push(
                    &location,
                    format!(
                        "column '{}' holds time concept '{}' and must be a date, not {}",
                        column.id, reference, column.data_type
                    ),
                );
            }
            return;
        }

        let dataset = self.dataset;
        if !matches!(dataset.resolve(reference), Resolution::Local(_)) {
            return;
        }
        if let Some(expected) = dataset.concept(&reference.local).and_then(|c| c.data_type)
            && expected != column.data_type
        {
            self.push(
                &location,
                format!(
                    "column '{}' is {} but concept '{}' is {}",
                    column.id, column.data_type, reference, expected
                ),
            );
        }
    }

    fn check_table(&mut self, table: &Table) {
        let location = format!("table '{}'", table.id);

        for id in duplicates(table.columns.iter().map(|c| c.id.as_str())) {
            self.push(&location, format!("column '{}' is declared more than once", id));
        }

        for column in &table.columns {
            let pattern = if column.data_type == DataType::Date {
                match column.format.as_deref().map(DatePattern::compile) {
                    None => {
                        self.push(
                            &location,
                            format!("date column '{}' has no format", column.id),
                        );
                        continue;
                    }
                    Some(Err(e)) => {
                        self.push(&location, format!("column '{}': {}", column.id, e));
                        continue;
                    }
                    Some(Ok(pattern)) => Some(pattern),
                }
            } else {
                None
            };

            if let Some(value) = &column.value
                && let Err(e) = parse_value(column.data_type, pattern.as_ref(), value)
            {
                self.push(
                    &location,
                    format!("constant value of column '{}': {}", column.id, e),
                );
            }
        }
    }
}

/// Checks over the rows of every loaded table
pub struct DataChecker<'a> {
    dataset: &'a Dataset,
    issues: Vec<Issue>,
}

impl<'a> DataChecker<'a> {
    pub fn new(dataset: &'a Dataset) -> Self {
        Self {
            dataset,
            issues: Vec::new(),
        }
    }

    pub fn check(mut self) -> Vec<Issue> {
        let dataset = self.dataset;

        for table in &dataset.tables {
            if let Some(data) = &table.data {
                self.check_table(table, data);
            }
        }
        for slice in &dataset.slices {
            self.check_slice(slice);
        }

        debug!(issues = self.issues.len(), "data check finished");
        self.issues
    }

    /// Record findings of one check, summarizing past the first few
    fn report(&mut self, location: &str, problems: Vec<String>) {
        let extra = problems.len().saturating_sub(MAX_REPORTED_PER_CHECK);
        for problem in problems.into_iter().take(MAX_REPORTED_PER_CHECK) {
            self.issues.push(Issue::data(location, problem));
        }
        if extra > 0 {
            self.issues
                .push(Issue::data(location, format!("... and {} more like this", extra)));
        }
    }

    /// Columns that identify rows and may not be empty
    fn key_columns(&self, table: &Table) -> HashSet<&'a str> {
        let dataset = self.dataset;
        let concept_ids = dataset
            .concepts
            .iter()
            .filter(|c| c.table.as_deref() == Some(table.id.as_str()))
            .map(|c| c.id.as_str());
        let dimension_columns = dataset
            .slices
            .iter()
            .filter(|s| s.table == table.id)
            .flat_map(|s| s.dimensions.iter().map(move |d| s.column_for(d)));
        concept_ids.chain(dimension_columns).collect()
    }

    fn check_table(&mut self, table: &Table, data: &TableData) {
        let location = format!("table '{}'", table.id);

        let mut header_problems = Vec::new();
        for column in table.columns.iter().filter(|c| c.value.is_none()) {
            if data.column_index(&column.id).is_none() {
                header_problems.push(format!(
                    "data file '{}' has no column '{}'",
                    table.file.path, column.id
                ));
            }
        }
        for name in &data.header {
            if table.column(name).is_none() {
                header_problems.push(format!(
                    "data file '{}' has undeclared column '{}'",
                    table.file.path, name
                ));
            }
        }
        self.report(&location, header_problems);

        let keys = self.key_columns(table);
        for column in &table.columns {
            let Some(index) = data.column_index(&column.id) else {
                continue;
            };
            let pattern = match (column.data_type, column.format.as_deref()) {
                (DataType::Date, Some(format)) => match DatePattern::compile(format) {
                    Ok(pattern) => Some(pattern),
                    Err(_) => continue,
                },
                (DataType::Date, None) => continue,
                _ => None,
            };

            let mut problems = Vec::new();
            for (row, value) in data.column_values(index) {
                if value.is_empty() {
                    if keys.contains(column.id.as_str()) {
                        problems.push(format!("row {}: empty value in column '{}'", row, column.id));
                    }
                    continue;
                }
                if let Err(e) = parse_value(column.data_type, pattern.as_ref(), value) {
                    problems.push(format!("row {}, column '{}': {}", row, column.id, e));
                }
            }
            self.report(&location, problems);
        }

        let dataset = self.dataset;
        for concept in dataset
            .concepts
            .iter()
            .filter(|c| c.table.as_deref() == Some(table.id.as_str()))
        {
            let Some(index) = data.column_index(&concept.id) else {
                continue;
            };
            let mut first_seen: HashMap<&str, usize> = HashMap::new();
            let mut problems = Vec::new();
            for (row, value) in data.column_values(index).filter(|(_, v)| !v.is_empty()) {
                if let Some(first) = first_seen.get(value) {
                    problems.push(format!(
                        "row {}: duplicate concept id '{}' (first seen at row {})",
                        row, value, first
                    ));
                } else {
                    first_seen.insert(value, row);
                }
            }
            self.report(&location, problems);
        }
    }

    fn check_slice(&mut self, slice: &Slice) {
        let dataset = self.dataset;
        let Some(table) = dataset.table(&slice.table) else {
            return;
        };
        let Some(data) = &table.data else {
            return;
        };
        let location = format!("slice '{}'", slice.id);

        let Some(indices) = slice
            .dimensions
            .iter()
            .map(|d| data.column_index(slice.column_for(d)))
            .collect::<Option<Vec<usize>>>()
        else {
            return;
        };

        let mut first_seen: HashMap<Vec<&str>, usize> = HashMap::new();
        let mut problems = Vec::new();
        for (i, row) in data.rows.iter().enumerate() {
            let key: Vec<&str> = indices
                .iter()
                .map(|&ix| row.get(ix).map(String::as_str).unwrap_or(""))
                .collect();
            if let Some(first) = first_seen.get(&key) {
                problems.push(format!(
                    "row {}: duplicate dimension values ({}) (first seen at row {})",
                    i + 2,
                    key.join(", "),
                    first
                ));
            } else {
                first_seen.insert(key, i + 2);
            }
        }
        self.report(&location, problems);

        for (dimension, &index) in slice.dimensions.iter().zip(&indices) {
            let Some(known) = self.concept_values(dimension) else {
                continue;
            };
            let mut problems = Vec::new();
            for (row, value) in data.column_values(index) {
                if !value.is_empty() && !known.contains(value) {
                    problems.push(format!(
                        "row {}: '{}' is not a known value of concept '{}'",
                        row, value, dimension
                    ));
                }
            }
            self.report(&location, problems);
        }
    }

    /// Ids listed in the concept table of a local dimension, if it has one
    fn concept_values(&self, reference: &ConceptRef) -> Option<HashSet<&'a str>> {
        let dataset = self.dataset;
        if !matches!(dataset.resolve(reference), Resolution::Local(_)) {
            return None;
        }
        let concept = dataset.concept(&reference.local)?;
        let data = dataset.table(concept.table.as_deref()?)?.data.as_ref()?;
        let index = data.column_index(&concept.id)?;
        Some(data.column_values(index).map(|(_, v)| v).collect())
    }
}
