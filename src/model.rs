//! DSPL dataset model
//!
//! In-memory view of a descriptor, built from a parsed `roxmltree` document
//! once the descriptor is known to conform to the schema. Table data is only
//! attached when the loader is asked for it.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use roxmltree::{Document, Node};
use tracing::debug;

use crate::data::TableData;
use crate::error::{CheckError, Result};

/// Namespace of the canonical DSPL time concepts
pub const TIME_NAMESPACE: &str = "http://www.google.com/publicdata/dataset/google/time";

/// Value types a concept or column may declare
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    String,
    Float,
    Integer,
    Boolean,
    Date,
}

impl FromStr for DataType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "string" => Ok(DataType::String),
            "float" => Ok(DataType::Float),
            "integer" => Ok(DataType::Integer),
            "boolean" => Ok(DataType::Boolean),
            "date" => Ok(DataType::Date),
            other => Err(format!("unknown data type '{}'", other)),
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DataType::String => "string",
            DataType::Float => "float",
            DataType::Integer => "integer",
            DataType::Boolean => "boolean",
            DataType::Date => "date",
        };
        f.write_str(name)
    }
}

/// A QName reference to a concept or topic, e.g. `time:year` or `country`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConceptRef {
    pub prefix: Option<String>,
    pub local: String,
    /// Namespace the prefix is bound to where the reference appears
    pub namespace: Option<String>,
}

impl ConceptRef {
    fn from_node(node: Node<'_, '_>, raw: &str) -> Self {
        match raw.split_once(':') {
            Some((prefix, local)) => ConceptRef {
                prefix: Some(prefix.to_string()),
                local: local.to_string(),
                namespace: node.lookup_namespace_uri(Some(prefix)).map(str::to_string),
            },
            None => ConceptRef {
                prefix: None,
                local: raw.to_string(),
                namespace: None,
            },
        }
    }

    /// Whether both references name the same concept
    pub fn same_as(&self, other: &ConceptRef) -> bool {
        self.local == other.local
            && match (&self.namespace, &other.namespace) {
                (Some(a), Some(b)) => a == b,
                _ => self.prefix == other.prefix,
            }
    }
}

impl fmt::Display for ConceptRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.prefix {
            Some(prefix) => write!(f, "{}:{}", prefix, self.local),
            None => f.write_str(&self.local),
        }
    }
}

/// Where a reference points once namespaces are taken into account
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution<'a> {
    /// Declared in this dataset under the given id
    Local(&'a str),
    /// Declared in an imported dataset
    External { namespace: &'a str },
    UndeclaredPrefix(&'a str),
    NotImported { namespace: &'a str },
}

/// Name, description and URL, each as a list of localized values
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Info {
    pub name: Vec<String>,
    pub description: Vec<String>,
    pub url: Vec<String>,
}

impl Info {
    pub fn display_name(&self) -> Option<&str> {
        self.name.first().map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Import {
    pub namespace: String,
    pub location: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    pub id: Option<String>,
    pub concept: Option<ConceptRef>,
    pub data_type: Option<DataType>,
    pub values: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Property {
    pub id: Option<String>,
    pub concept: Option<ConceptRef>,
    pub is_parent: bool,
}

impl Property {
    /// Column holding this property in the concept table
    pub fn column_id(&self) -> Option<&str> {
        self.id
            .as_deref()
            .or_else(|| self.concept.as_ref().map(|c| c.local.as_str()))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Topic {
    pub id: String,
    pub info: Info,
    pub children: Vec<Topic>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Concept {
    pub id: String,
    pub extends: Option<ConceptRef>,
    pub info: Info,
    pub topics: Vec<ConceptRef>,
    pub data_type: Option<DataType>,
    pub attributes: Vec<Attribute>,
    pub properties: Vec<Property>,
    pub default_value: Option<String>,
    pub table: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnMapping {
    pub concept: ConceptRef,
    pub to_column: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Slice {
    pub id: String,
    pub info: Option<Info>,
    pub dimensions: Vec<ConceptRef>,
    pub metrics: Vec<ConceptRef>,
    pub table: String,
    pub dimension_map: Vec<ColumnMapping>,
    pub metric_map: Vec<ColumnMapping>,
}

impl Slice {
    /// Column of the slice table holding `concept`
    pub fn column_for<'a>(&'a self, concept: &'a ConceptRef) -> &'a str {
        self.dimension_map
            .iter()
            .chain(&self.metric_map)
            .find(|m| m.concept.same_as(concept))
            .map(|m| m.to_column.as_str())
            .unwrap_or(concept.local.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub id: String,
    pub data_type: DataType,
    pub format: Option<String>,
    /// Constant value; such columns need not appear in the data file
    pub value: Option<String>,
}

/// `<data><file>` reference of a table
#[derive(Debug, Clone, PartialEq)]
pub struct DataFile {
    /// Path as written in the descriptor
    pub path: String,
    pub format: String,
    pub encoding: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    pub id: String,
    pub columns: Vec<Column>,
    pub file: DataFile,
    pub data: Option<TableData>,
}

impl Table {
    pub fn column(&self, id: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.id == id)
    }
}

/// A whole DSPL dataset
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    pub target_namespace: Option<String>,
    pub imports: Vec<Import>,
    pub info: Info,
    pub provider: Info,
    pub attributes: Vec<Attribute>,
    pub topics: Vec<Topic>,
    pub concepts: Vec<Concept>,
    pub slices: Vec<Slice>,
    pub tables: Vec<Table>,
}

impl Dataset {
    pub fn concept(&self, id: &str) -> Option<&Concept> {
        self.concepts.iter().find(|c| c.id == id)
    }

    pub fn table(&self, id: &str) -> Option<&Table> {
        self.tables.iter().find(|t| t.id == id)
    }

    pub fn topic(&self, id: &str) -> Option<&Topic> {
        fn find<'a>(topics: &'a [Topic], id: &str) -> Option<&'a Topic> {
            topics
                .iter()
                .find_map(|t| if t.id == id { Some(t) } else { find(&t.children, id) })
        }
        find(&self.topics, id)
    }

    /// All topics, nested ones included, depth first
    pub fn all_topics(&self) -> Vec<&Topic> {
        fn walk<'a>(topics: &'a [Topic], out: &mut Vec<&'a Topic>) {
            for topic in topics {
                out.push(topic);
                walk(&topic.children, out);
            }
        }
        let mut out = Vec::new();
        walk(&self.topics, &mut out);
        out
    }

    pub fn is_imported(&self, namespace: &str) -> bool {
        self.imports.iter().any(|i| i.namespace == namespace)
    }

    pub fn resolve<'a>(&'a self, reference: &'a ConceptRef) -> Resolution<'a> {
        let Some(prefix) = reference.prefix.as_deref() else {
            return Resolution::Local(&reference.local);
        };
        match reference.namespace.as_deref() {
            None => Resolution::UndeclaredPrefix(prefix),
            Some(ns) if self.target_namespace.as_deref() == Some(ns) => {
                Resolution::Local(&reference.local)
            }
            Some(ns) if self.is_imported(ns) => Resolution::External { namespace: ns },
            Some(ns) => Resolution::NotImported { namespace: ns },
        }
    }

    pub fn row_count(&self) -> usize {
        self.tables
            .iter()
            .filter_map(|t| t.data.as_ref())
            .map(TableData::row_count)
            .sum()
    }
}

/// Builds a `Dataset` from a parsed descriptor
#[derive(Debug, Clone)]
pub struct DatasetLoader {
    base_dir: PathBuf,
    load_data: bool,
}

impl DatasetLoader {
    pub fn new(base_dir: &Path) -> Self {
        Self {
            base_dir: base_dir.to_path_buf(),
            load_data: false,
        }
    }

    /// Also read every table's data file
    pub fn with_data(mut self, load_data: bool) -> Self {
        self.load_data = load_data;
        self
    }

    pub fn load(&self, document: &Document<'_>) -> Result<Dataset> {
        let root = document.root_element();
        if root.tag_name().name() != "dspl" {
            return Err(CheckError::load(format!(
                "root element is <{}>, expected <dspl>",
                root.tag_name().name()
            )));
        }

        let mut dataset = Dataset {
            target_namespace: root.attribute("targetNamespace").map(str::to_string),
            ..Dataset::default()
        };

        for child in elements(root) {
            match child.tag_name().name() {
                "import" => dataset.imports.push(Import {
                    namespace: required(child, "namespace")?.to_string(),
                    location: child.attribute("location").map(str::to_string),
                }),
                "info" => dataset.info = parse_info(child),
                "provider" => dataset.provider = parse_info(child),
                "attribute" => dataset.attributes.push(parse_attribute(child)?),
                "topics" => {
                    for topic in children_named(child, "topic") {
                        dataset.topics.push(parse_topic(topic)?);
                    }
                }
                "concepts" => {
                    for concept in children_named(child, "concept") {
                        dataset.concepts.push(parse_concept(concept)?);
                    }
                }
                "slices" => {
                    for slice in children_named(child, "slice") {
                        dataset.slices.push(parse_slice(slice)?);
                    }
                }
                "tables" => {
                    for table in children_named(child, "table") {
                        dataset.tables.push(self.parse_table(table)?);
                    }
                }
                other => debug!(element = other, "ignoring unknown element"),
            }
        }

        if dataset.info.name.is_empty() {
            return Err(CheckError::load("dataset <info> has no name"));
        }

        debug!(
            concepts = dataset.concepts.len(),
            slices = dataset.slices.len(),
            tables = dataset.tables.len(),
            rows = dataset.row_count(),
            "dataset loaded"
        );
        Ok(dataset)
    }

    fn parse_table(&self, node: Node<'_, '_>) -> Result<Table> {
        let id = required(node, "id")?.to_string();

        let mut columns = Vec::new();
        for column in children_named(node, "column") {
            columns.push(Column {
                id: required(column, "id")?.to_string(),
                data_type: parse_data_type(required(column, "type")?)?,
                format: column.attribute("format").map(str::to_string),
                value: child_text(column, "value"),
            });
        }

        let file = children_named(node, "data")
            .flat_map(|data| children_named(data, "file"))
            .next()
            .ok_or_else(|| CheckError::load(format!("table '{}' has no data file", id)))?;
        let file = DataFile {
            path: text_of(file).ok_or_else(|| {
                CheckError::load(format!("table '{}' has an empty data file reference", id))
            })?,
            format: required(file, "format")?.to_string(),
            encoding: file.attribute("encoding").map(str::to_string),
        };

        let data = if self.load_data {
            let data = TableData::load(&self.base_dir, &file)
                .map_err(|e| CheckError::load(format!("table '{}': {}", id, e)))?;
            debug!(table = %id, rows = data.row_count(), "table data loaded");
            Some(data)
        } else {
            None
        };

        Ok(Table {
            id,
            columns,
            file,
            data,
        })
    }
}

fn elements<'a, 'input>(node: Node<'a, 'input>) -> impl Iterator<Item = Node<'a, 'input>> {
    node.children().filter(Node::is_element)
}

fn children_named<'a, 'input>(
    node: Node<'a, 'input>,
    name: &'static str,
) -> impl Iterator<Item = Node<'a, 'input>> {
    elements(node).filter(move |n| n.tag_name().name() == name)
}

fn required<'a>(node: Node<'a, '_>, attribute: &str) -> Result<&'a str> {
    node.attribute(attribute).ok_or_else(|| {
        CheckError::load(format!(
            "<{}> at line {} is missing attribute '{}'",
            node.tag_name().name(),
            node.document().text_pos_at(node.range().start).row,
            attribute
        ))
    })
}

fn text_of(node: Node<'_, '_>) -> Option<String> {
    node.text()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn child_text(node: Node<'_, '_>, name: &'static str) -> Option<String> {
    children_named(node, name).next().and_then(text_of)
}

fn values(node: Node<'_, '_>, name: &'static str) -> Vec<String> {
    children_named(node, name)
        .flat_map(|n| children_named(n, "value"))
        .filter_map(text_of)
        .collect()
}

fn parse_info(node: Node<'_, '_>) -> Info {
    Info {
        name: values(node, "name"),
        description: values(node, "description"),
        url: values(node, "url"),
    }
}

fn parse_data_type(raw: &str) -> Result<DataType> {
    raw.parse().map_err(CheckError::load)
}

fn type_ref(node: Node<'_, '_>) -> Result<Option<DataType>> {
    match children_named(node, "type").next() {
        Some(t) => Ok(Some(parse_data_type(required(t, "ref")?)?)),
        None => Ok(None),
    }
}

fn concept_attr(node: Node<'_, '_>, attribute: &str) -> Option<ConceptRef> {
    node.attribute(attribute)
        .map(|raw| ConceptRef::from_node(node, raw))
}

fn parse_attribute(node: Node<'_, '_>) -> Result<Attribute> {
    Ok(Attribute {
        id: node.attribute("id").map(str::to_string),
        concept: concept_attr(node, "concept"),
        data_type: type_ref(node)?,
        values: children_named(node, "value").filter_map(text_of).collect(),
    })
}

fn parse_topic(node: Node<'_, '_>) -> Result<Topic> {
    let mut children = Vec::new();
    for child in children_named(node, "topic") {
        children.push(parse_topic(child)?);
    }
    Ok(Topic {
        id: required(node, "id")?.to_string(),
        info: children_named(node, "info")
            .next()
            .map(parse_info)
            .unwrap_or_default(),
        children,
    })
}

fn parse_concept(node: Node<'_, '_>) -> Result<Concept> {
    let mut topics = Vec::new();
    for topic in children_named(node, "topic") {
        topics.push(ConceptRef::from_node(topic, required(topic, "ref")?));
    }

    let mut attributes = Vec::new();
    for attribute in children_named(node, "attribute") {
        attributes.push(parse_attribute(attribute)?);
    }

    let properties = children_named(node, "property")
        .map(|p| Property {
            id: p.attribute("id").map(str::to_string),
            concept: concept_attr(p, "concept"),
            is_parent: p.attribute("isParent").is_some_and(|v| v == "true" || v == "1"),
        })
        .collect();

    let table = match children_named(node, "table").next() {
        Some(t) => Some(required(t, "ref")?.to_string()),
        None => None,
    };

    Ok(Concept {
        id: required(node, "id")?.to_string(),
        extends: concept_attr(node, "extends"),
        info: children_named(node, "info")
            .next()
            .map(parse_info)
            .unwrap_or_default(),
        topics,
        data_type: type_ref(node)?,
        attributes,
        properties,
        default_value: child_text(node, "defaultValue"),
        table,
    })
}

fn parse_slice(node: Node<'_, '_>) -> Result<Slice> {
    let id = required(node, "id")?.to_string();

    let refs = |name: &'static str| -> Result<Vec<ConceptRef>> {
        children_named(node, name)
            .map(|n| -> Result<ConceptRef> {
                Ok(ConceptRef::from_node(n, required(n, "concept")?))
            })
            .collect()
    };
    let dimensions = refs("dimension")?;
    let metrics = refs("metric")?;

    let table_node = children_named(node, "table")
        .next()
        .ok_or_else(|| CheckError::load(format!("slice '{}' has no table", id)))?;
    let mappings = |name: &'static str| -> Result<Vec<ColumnMapping>> {
        children_named(table_node, name)
            .map(|n| -> Result<ColumnMapping> {
                Ok(ColumnMapping {
                    concept: ConceptRef::from_node(n, required(n, "concept")?),
                    to_column: required(n, "toColumn")?.to_string(),
                })
            })
            .collect()
    };

    Ok(Slice {
        info: children_named(node, "info").next().map(parse_info),
        dimensions,
        metrics,
        table: required(table_node, "ref")?.to_string(),
        dimension_map: mappings("mapDimension")?,
        metric_map: mappings("mapMetric")?,
        id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const DATASET: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<dspl xmlns="http://schemas.google.com/dspl/2010"
    xmlns:time="http://www.google.com/publicdata/dataset/google/time"
    xmlns:other="http://example.com/other">
  <import namespace="http://www.google.com/publicdata/dataset/google/time"/>
  <info><name><value>Dataset Name</value></name></info>
  <provider><name><value>Provider Name</value></name></provider>
  <topics>
    <topic id="people">
      <info><name><value>People</value></name></info>
      <topic id="population_topic">
        <info><name><value>Population</value></name></info>
      </topic>
    </topic>
  </topics>
  <concepts>
    <concept id="country">
      <info><name><value>Country</value></name></info>
      <type ref="string"/>
      <property id="name"/>
      <table ref="countries"/>
    </concept>
    <concept id="population">
      <info><name><value>Population</value></name></info>
      <topic ref="population_topic"/>
      <type ref="integer"/>
    </concept>
  </concepts>
  <slices>
    <slice id="pop_slice">
      <dimension concept="country"/>
      <dimension concept="time:year"/>
      <metric concept="population"/>
      <table ref="pop_table">
        <mapDimension concept="time:year" toColumn="when"/>
      </table>
    </slice>
  </slices>
  <tables>
    <table id="countries">
      <column id="country" type="string"/>
      <column id="name" type="string"/>
      <data><file format="csv" encoding="utf-8">countries.csv</file></data>
    </table>
    <table id="pop_table">
      <column id="country" type="string"/>
      <column id="when" type="date" format="yyyy"/>
      <column id="population" type="integer"/>
      <data><file format="csv">population.csv</file></data>
    </table>
  </tables>
</dspl>"#;

    fn load(xml: &str, base_dir: &Path, with_data: bool) -> Result<Dataset> {
        let doc = Document::parse(xml).unwrap();
        DatasetLoader::new(base_dir).with_data(with_data).load(&doc)
    }

    #[test]
    fn test_load_structure() {
        let dataset = load(DATASET, Path::new("."), false).unwrap();

        assert_eq!(dataset.info.display_name(), Some("Dataset Name"));
        assert_eq!(dataset.provider.display_name(), Some("Provider Name"));
        assert_eq!(dataset.imports.len(), 1);
        assert_eq!(dataset.concepts.len(), 2);
        assert_eq!(dataset.slices.len(), 1);
        assert_eq!(dataset.tables.len(), 2);
        assert!(dataset.tables.iter().all(|t| t.data.is_none()));

        let country = dataset.concept("country").unwrap();
        assert_eq!(country.data_type, Some(DataType::String));
        assert_eq!(country.table.as_deref(), Some("countries"));
        assert_eq!(country.properties[0].column_id(), Some("name"));

        let when = dataset.table("pop_table").unwrap().column("when").unwrap();
        assert_eq!(when.data_type, DataType::Date);
        assert_eq!(when.format.as_deref(), Some("yyyy"));
    }

    #[test]
    fn test_nested_topics() {
        let dataset = load(DATASET, Path::new("."), false).unwrap();
        assert_eq!(dataset.all_topics().len(), 2);
        assert!(dataset.topic("population_topic").is_some());
    }

    #[test]
    fn test_concept_ref_resolution() {
        let dataset = load(DATASET, Path::new("."), false).unwrap();
        let slice = &dataset.slices[0];

        assert_eq!(dataset.resolve(&slice.dimensions[0]), Resolution::Local("country"));
        assert_eq!(
            dataset.resolve(&slice.dimensions[1]),
            Resolution::External {
                namespace: TIME_NAMESPACE
            }
        );
        assert_eq!(slice.column_for(&slice.dimensions[1]), "when");
        assert_eq!(slice.column_for(&slice.dimensions[0]), "country");

        let doc = Document::parse(DATASET).unwrap();
        let other = ConceptRef::from_node(doc.root_element(), "other:thing");
        assert_eq!(
            dataset.resolve(&other),
            Resolution::NotImported {
                namespace: "http://example.com/other"
            }
        );
        let undeclared = ConceptRef::from_node(doc.root_element(), "nope:thing");
        assert_eq!(dataset.resolve(&undeclared), Resolution::UndeclaredPrefix("nope"));
    }

    #[test]
    fn test_load_with_data() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("countries.csv"), "country,name\nfr,France\n").unwrap();
        fs::write(
            dir.path().join("population.csv"),
            "country,when,population\nfr,2010,65000000\nfr,2011,65300000\n",
        )
        .unwrap();

        let dataset = load(DATASET, dir.path(), true).unwrap();
        assert_eq!(dataset.row_count(), 3);
    }

    #[test]
    fn test_missing_data_file_names_reference() {
        let dir = TempDir::new().unwrap();
        let err = load(DATASET, dir.path(), true).unwrap_err();
        let msg = err.to_string();
        assert!(msg.starts_with("Error while trying to parse"));
        assert!(msg.contains("table 'countries'"));
        assert!(msg.contains("countries.csv"));
        assert!(!msg.contains(&dir.path().display().to_string()));
    }

    #[test]
    fn test_wrong_root_element() {
        let err = load("<other/>", Path::new("."), false).unwrap_err();
        assert!(err.to_string().contains("expected <dspl>"));
    }

    #[test]
    fn test_unknown_column_type() {
        let xml = r#"<dspl xmlns="http://schemas.google.com/dspl/2010">
  <info><name><value>D</value></name></info>
  <provider><name><value>P</value></name></provider>
  <tables>
    <table id="t">
      <column id="c" type="decimal"/>
      <data><file format="csv">t.csv</file></data>
    </table>
  </tables>
</dspl>"#;
        let err = load(xml, Path::new("."), false).unwrap_err();
        assert!(err.to_string().contains("unknown data type 'decimal'"));
    }
}
