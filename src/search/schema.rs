//! Search schema: searchable fields, legal comparators, control defaults, and validation of
//! raw parameters into a `SearchRequest`.

use crate::error::{SchemaError, SearchError, ValidationErrors};
use crate::search::comparator::{ComparatorSet, ComparatorTable};
use crate::search::criterion::{Criterion, CriterionBuilder, PredicateSet};
use crate::search::field::{FieldDescriptor, FieldKind};
use crate::search::params::{RawParams, DEFAULT_COMPARATOR, SUBMIT_KEY};
use crate::search::value::FieldValue;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::str::FromStr;

pub const DEFAULT_LIMIT: u64 = 25;
pub const DEFAULT_MAX_LIMIT: u64 = 1000;
/// Largest start or limit the store accepts (PostgreSQL OFFSET/LIMIT are bigint).
pub const MAX_OFFSET: u64 = i64::MAX as u64;

const START: &str = "start";
const LIMIT: &str = "limit";
const ORDER_BY: &str = "order_by";
const DIRECTION: &str = "direction";
const INTERSECT: &str = "intersect";
const CONTROL_KEYS: [&str; 5] = [START, LIMIT, ORDER_BY, DIRECTION, INTERSECT];

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

impl Direction {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Direction::Asc => "ASC",
            Direction::Desc => "DESC",
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            Direction::Asc => "asc",
            Direction::Desc => "desc",
        }
    }
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "asc" => Ok(Direction::Asc),
            "desc" => Ok(Direction::Desc),
            _ => Err("must be one of: asc, desc".into()),
        }
    }
}

/// What to do with parameters the schema does not know.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnknownKeys {
    #[default]
    Raise,
    Ignore,
}

impl FromStr for UnknownKeys {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "raise" => Ok(UnknownKeys::Raise),
            "ignore" => Ok(UnknownKeys::Ignore),
            other => Err(format!("unknown-keys policy must be raise or ignore, got '{}'", other)),
        }
    }
}

/// A single ordering specification for the page query.
#[derive(Clone, Debug, PartialEq)]
pub struct OrderSpec {
    pub field: FieldDescriptor,
    pub direction: Direction,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SearchRequest {
    pub criteria: Vec<Criterion>,
    /// `None` leaves rows in the store's natural order.
    pub order_by: Option<FieldDescriptor>,
    pub direction: Direction,
    pub intersect: bool,
    pub start: u64,
    pub limit: u64,
}

impl SearchRequest {
    pub fn predicates(&self) -> PredicateSet {
        PredicateSet {
            criteria: self.criteria.clone(),
            intersect: self.intersect,
        }
    }

    pub fn order(&self) -> Option<OrderSpec> {
        self.order_by.as_ref().map(|field| OrderSpec {
            field: field.clone(),
            direction: self.direction,
        })
    }
}

/// A field as submitted: not mentioned at all, or one or more entries whose value may be empty.
#[derive(Clone, Debug, PartialEq)]
pub enum FieldInput {
    Unset,
    Entries(Vec<FieldEntry>),
}

#[derive(Clone, Debug, PartialEq)]
pub struct FieldEntry {
    pub comparator: Option<String>,
    pub value: Option<FieldValue>,
}

/// Parameters after decoding and range checks, before criteria are built.
#[derive(Clone, Debug, PartialEq)]
pub struct ValidatedParams {
    pub fields: BTreeMap<String, FieldInput>,
    pub start: u64,
    pub limit: u64,
    pub order_by: Option<String>,
    pub direction: Direction,
    pub intersect: bool,
}

impl ValidatedParams {
    pub fn field(&self, name: &str) -> Option<&FieldInput> {
        self.fields.get(name)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct SearchField {
    pub descriptor: FieldDescriptor,
    pub comparators: ComparatorSet,
    pub repeatable: bool,
    /// Allowed values for enum fields, when known.
    pub choices: Option<Vec<String>>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SearchDefaults {
    pub start: u64,
    pub limit: u64,
    pub max_limit: u64,
    pub order_by: Option<String>,
    pub direction: Direction,
    pub intersect: bool,
}

/// Immutable search description for one entity. Build with [`SearchSchema::builder`].
#[derive(Clone, Debug, PartialEq)]
pub struct SearchSchema {
    fields: Vec<SearchField>,
    comparators: ComparatorTable,
    defaults: SearchDefaults,
    unknown_keys: UnknownKeys,
    columns: Vec<String>,
}

impl SearchSchema {
    pub fn builder() -> SearchSchemaBuilder {
        SearchSchemaBuilder::new()
    }

    pub fn fields(&self) -> &[SearchField] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&SearchField> {
        self.fields.iter().find(|f| f.descriptor.name == name)
    }

    pub fn defaults(&self) -> &SearchDefaults {
        &self.defaults
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn comparators(&self) -> &ComparatorTable {
        &self.comparators
    }

    fn is_orderable(&self, name: &str) -> bool {
        self.field(name).is_some_and(|f| !f.descriptor.kind.is_collection())
    }

    /// Decode and range-check raw parameters. Fields that were not submitted stay `Unset`.
    pub fn validate_params(&self, raw: &RawParams) -> Result<ValidatedParams, ValidationErrors> {
        let raw = raw
            .clone()
            .expand_json_query()
            .map_err(|msg| ValidationErrors::single("query", msg))?;
        let mut errors = ValidationErrors::new();

        if self.unknown_keys == UnknownKeys::Raise {
            for key in raw.keys() {
                if !self.is_known_key(key) {
                    errors.insert(key, "unknown parameter");
                }
            }
        }

        let start = match non_blank(raw.get(START)) {
            None => self.defaults.start,
            Some(s) => match s.parse::<u64>() {
                Ok(n) if n > MAX_OFFSET => {
                    errors.insert(START, format!("must be at most {}", MAX_OFFSET));
                    self.defaults.start
                }
                Ok(n) => n,
                Err(_) => {
                    errors.insert(START, "must be a non-negative integer");
                    self.defaults.start
                }
            },
        };

        let limit = match non_blank(raw.get(LIMIT)) {
            None => self.defaults.limit,
            Some(s) => match s.parse::<u64>() {
                Ok(0) => {
                    errors.insert(LIMIT, "must be at least 1");
                    self.defaults.limit
                }
                Ok(n) if n > self.defaults.max_limit => {
                    errors.insert(LIMIT, format!("must be at most {}", self.defaults.max_limit));
                    self.defaults.limit
                }
                Ok(n) => n,
                Err(_) => {
                    errors.insert(LIMIT, "must be a positive integer");
                    self.defaults.limit
                }
            },
        };

        let order_by = match non_blank(raw.get(ORDER_BY)) {
            None => self.defaults.order_by.clone(),
            Some(name) if self.is_orderable(name) => Some(name.to_string()),
            Some(_) => {
                let names: Vec<&str> = self
                    .fields
                    .iter()
                    .filter(|f| !f.descriptor.kind.is_collection())
                    .map(|f| f.descriptor.name.as_str())
                    .collect();
                errors.insert(ORDER_BY, format!("must be one of: {}", names.join(", ")));
                None
            }
        };

        let direction = match non_blank(raw.get(DIRECTION)) {
            None => self.defaults.direction,
            Some(s) => s.parse().unwrap_or_else(|msg: String| {
                errors.insert(DIRECTION, msg);
                self.defaults.direction
            }),
        };

        let intersect = match non_blank(raw.get(INTERSECT)) {
            None => self.defaults.intersect,
            Some(s) => match FieldValue::decode(FieldKind::Boolean, s) {
                Ok(Some(FieldValue::Bool(b))) => b,
                _ => {
                    errors.insert(INTERSECT, "must be a boolean");
                    self.defaults.intersect
                }
            },
        };

        let mut fields = BTreeMap::new();
        for field in &self.fields {
            let input = self.field_input(field, &raw, &mut errors);
            fields.insert(field.descriptor.name.clone(), input);
        }

        errors.into_result()?;
        Ok(ValidatedParams {
            fields,
            start,
            limit,
            order_by,
            direction,
            intersect,
        })
    }

    /// Validate raw parameters and build the criteria they describe.
    pub fn validate(&self, raw: &RawParams) -> Result<SearchRequest, SearchError> {
        let params = self.validate_params(raw)?;
        let builder = CriterionBuilder::new(&self.comparators);
        let mut criteria = Vec::new();
        for field in &self.fields {
            if let Some(FieldInput::Entries(entries)) = params.field(&field.descriptor.name) {
                let group = builder.build_group(
                    &field.descriptor,
                    entries.iter().map(|e| (e.comparator.clone(), e.value.clone())),
                )?;
                criteria.extend(group.criteria);
            }
        }
        let order_by = params
            .order_by
            .as_deref()
            .and_then(|name| self.field(name))
            .map(|f| f.descriptor.clone());
        Ok(SearchRequest {
            criteria,
            order_by,
            direction: params.direction,
            intersect: params.intersect,
            start: params.start,
            limit: params.limit,
        })
    }

    fn is_known_key(&self, key: &str) -> bool {
        if CONTROL_KEYS.contains(&key) || key == SUBMIT_KEY {
            return true;
        }
        let (head, tail) = match key.split_once('.') {
            Some((head, tail)) => (head, Some(tail)),
            None => (key, None),
        };
        self.field(head).is_some() && matches!(tail, None | Some("value") | Some("comparator"))
    }

    fn field_input(&self, field: &SearchField, raw: &RawParams, errors: &mut ValidationErrors) -> FieldInput {
        let name = field.descriptor.name.as_str();
        let value_key = format!("{}.value", name);
        let comparator_key = format!("{}.comparator", name);
        // `name` and `name.value` are one stream of values, in submission order.
        let mut values = Vec::new();
        let mut comparators = Vec::new();
        for (key, v) in raw.pairs() {
            if key == name || key == value_key {
                values.push(v);
            } else if key == comparator_key {
                comparators.push(v);
            }
        }
        let n = values.len().max(comparators.len());
        if n == 0 {
            return FieldInput::Unset;
        }
        if n > 1 && !field.repeatable {
            errors.insert(name, "accepts a single criterion");
            return FieldInput::Unset;
        }
        let mut entries = Vec::with_capacity(n);
        for i in 0..n {
            let path = if n == 1 { name.to_string() } else { format!("{}.{}", name, i) };
            let value = match values.get(i) {
                None => None,
                Some(s) => match FieldValue::decode(field.descriptor.kind, s) {
                    Ok(v) => v,
                    Err(msg) => {
                        errors.insert(&path, msg);
                        None
                    }
                },
            };
            if let (Some(FieldValue::Text(s)), Some(choices)) = (&value, &field.choices) {
                if !choices.iter().any(|c| c == s) {
                    errors.insert(&path, format!("must be one of: {}", choices.join(", ")));
                }
            }
            let comparator = comparators
                .get(i)
                .filter(|c| c.trim() != DEFAULT_COMPARATOR)
                .map(|c| c.to_string());
            entries.push(FieldEntry { comparator, value });
        }
        FieldInput::Entries(entries)
    }

    /// JSON description for form renderers: fields, comparator choices, control defaults.
    pub fn describe(&self) -> Value {
        let fields: Vec<Value> = self
            .fields
            .iter()
            .map(|f| {
                json!({
                    "name": f.descriptor.name,
                    "kind": f.descriptor.kind,
                    "nullable": f.descriptor.nullable,
                    "repeatable": f.repeatable,
                    "default_comparator": f.comparators.default_operator(),
                    "comparators": f.comparators.choices(),
                    "choices": f.choices,
                })
            })
            .collect();
        let orderable: Vec<&str> = self
            .fields
            .iter()
            .filter(|f| !f.descriptor.kind.is_collection())
            .map(|f| f.descriptor.name.as_str())
            .collect();
        json!({
            "fields": fields,
            "controls": {
                START: { "default": self.defaults.start, "min": 0 },
                LIMIT: { "default": self.defaults.limit, "min": 1, "max": self.defaults.max_limit },
                ORDER_BY: { "default": self.defaults.order_by, "choices": orderable },
                DIRECTION: { "default": self.defaults.direction.as_str(), "choices": ["asc", "desc"] },
                INTERSECT: { "default": self.defaults.intersect },
            },
            "columns": self.columns,
        })
    }
}

fn non_blank(s: Option<&str>) -> Option<&str> {
    s.map(str::trim).filter(|s| !s.is_empty())
}

#[derive(Clone, Debug)]
enum OrderDefault {
    FirstField,
    Natural,
    Field(String),
}

pub struct SearchSchemaBuilder {
    fields: Vec<FieldDescriptor>,
    repeatable: HashSet<String>,
    choices: HashMap<String, Vec<String>>,
    comparators: ComparatorTable,
    default_limit: u64,
    max_limit: u64,
    order_by: OrderDefault,
    direction: Direction,
    intersect: bool,
    unknown_keys: UnknownKeys,
    columns: Option<Vec<String>>,
}

impl Default for SearchSchemaBuilder {
    fn default() -> Self {
        SearchSchemaBuilder::new()
    }
}

impl SearchSchemaBuilder {
    pub fn new() -> Self {
        SearchSchemaBuilder {
            fields: Vec::new(),
            repeatable: HashSet::new(),
            choices: HashMap::new(),
            comparators: ComparatorTable::standard(),
            default_limit: DEFAULT_LIMIT,
            max_limit: DEFAULT_MAX_LIMIT,
            order_by: OrderDefault::FirstField,
            direction: Direction::Asc,
            intersect: true,
            unknown_keys: UnknownKeys::Raise,
            columns: None,
        }
    }

    pub fn field(mut self, descriptor: FieldDescriptor) -> Self {
        self.fields.push(descriptor);
        self
    }

    pub fn repeatable(mut self, name: impl Into<String>) -> Self {
        self.repeatable.insert(name.into());
        self
    }

    pub fn choices(mut self, name: impl Into<String>, values: Vec<String>) -> Self {
        self.choices.insert(name.into(), values);
        self
    }

    pub fn comparators(mut self, table: ComparatorTable) -> Self {
        self.comparators = table;
        self
    }

    pub fn default_limit(mut self, limit: u64) -> Self {
        self.default_limit = limit;
        self
    }

    pub fn max_limit(mut self, limit: u64) -> Self {
        self.max_limit = limit;
        self
    }

    pub fn order_by(mut self, name: impl Into<String>) -> Self {
        self.order_by = OrderDefault::Field(name.into());
        self
    }

    /// Leave unordered searches in the store's natural order.
    pub fn natural_order(mut self) -> Self {
        self.order_by = OrderDefault::Natural;
        self
    }

    pub fn direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }

    pub fn intersect(mut self, intersect: bool) -> Self {
        self.intersect = intersect;
        self
    }

    pub fn unknown_keys(mut self, policy: UnknownKeys) -> Self {
        self.unknown_keys = policy;
        self
    }

    pub fn columns(mut self, columns: Vec<String>) -> Self {
        self.columns = Some(columns);
        self
    }

    pub fn build(self) -> Result<SearchSchema, SchemaError> {
        if self.fields.is_empty() {
            return Err(SchemaError::NoFields);
        }
        let mut seen = HashSet::new();
        let mut fields = Vec::with_capacity(self.fields.len());
        for descriptor in self.fields {
            if !seen.insert(descriptor.name.clone()) {
                return Err(SchemaError::InvalidDefault {
                    key: "fields",
                    message: format!("duplicate field '{}'", descriptor.name),
                });
            }
            let comparators = self
                .comparators
                .get(descriptor.kind)
                .cloned()
                .ok_or_else(|| SchemaError::UnsupportedFieldKind {
                    field: descriptor.name.clone(),
                    kind: descriptor.kind.key().to_string(),
                })?;
            fields.push(SearchField {
                repeatable: self.repeatable.contains(&descriptor.name),
                choices: self.choices.get(&descriptor.name).cloned(),
                descriptor,
                comparators,
            });
        }
        for name in self.repeatable.iter().chain(self.choices.keys()) {
            if !seen.contains(name) {
                return Err(SchemaError::UnknownField(name.clone()));
            }
        }
        if self.default_limit == 0 {
            return Err(SchemaError::InvalidDefault {
                key: LIMIT,
                message: "must be at least 1".into(),
            });
        }
        if self.max_limit > MAX_OFFSET {
            return Err(SchemaError::InvalidDefault {
                key: "max_limit",
                message: format!("must be at most {}", MAX_OFFSET),
            });
        }
        if self.max_limit < self.default_limit {
            return Err(SchemaError::InvalidDefault {
                key: "max_limit",
                message: format!("must be at least the default limit {}", self.default_limit),
            });
        }
        let orderable = |f: &&SearchField| !f.descriptor.kind.is_collection();
        let order_by = match self.order_by {
            OrderDefault::Natural => None,
            OrderDefault::FirstField => fields.iter().find(orderable).map(|f| f.descriptor.name.clone()),
            OrderDefault::Field(name) => {
                let field = fields
                    .iter()
                    .find(|f| f.descriptor.name == name)
                    .ok_or_else(|| SchemaError::UnknownField(name.clone()))?;
                if field.descriptor.kind.is_collection() {
                    return Err(SchemaError::InvalidDefault {
                        key: ORDER_BY,
                        message: format!("'{}' is a collection and cannot be ordered", name),
                    });
                }
                Some(name)
            }
        };
        let columns = self.columns.unwrap_or_else(|| {
            fields
                .iter()
                .filter(orderable)
                .map(|f| f.descriptor.name.clone())
                .collect()
        });
        Ok(SearchSchema {
            fields,
            comparators: self.comparators,
            defaults: SearchDefaults {
                start: 0,
                limit: self.default_limit,
                max_limit: self.max_limit,
                order_by,
                direction: self.direction,
                intersect: self.intersect,
            },
            unknown_keys: self.unknown_keys,
            columns,
        })
    }
}
