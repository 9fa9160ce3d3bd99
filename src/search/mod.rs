//! Search engine: schema, comparators, criteria, pagination, and the orchestrator that runs them
//! against a `RecordStore`.

pub mod comparator;
pub mod criterion;
pub mod field;
pub mod orchestrator;
pub mod paginator;
pub mod params;
pub mod schema;
pub mod value;

pub use comparator::{ComparatorSet, ComparatorTable, Operator};
pub use criterion::{Criterion, CriterionBuilder, CriterionGroup, PredicateSet};
pub use field::{Cardinality, FieldDescriptor, FieldKind};
pub use orchestrator::{execute, lookup, search, SearchResult};
pub use paginator::{Page, PaginationMeta, Paginator, WindowedPages};
pub use params::RawParams;
pub use schema::{
    Direction, FieldEntry, FieldInput, OrderSpec, SearchField, SearchRequest, SearchSchema, SearchSchemaBuilder,
    UnknownKeys, ValidatedParams,
};
pub use value::FieldValue;
