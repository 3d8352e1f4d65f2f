mod breath_table;
mod common;
pub(crate) mod schema;
mod sectioned;

pub use breath_table::BreathTableParser;
pub use common::{Quantity, TimeUnit};
pub use schema::CANONICAL_COLUMNS;
pub use sectioned::SectionedParser;

pub(crate) use common::{parse_metadata, read_table, SeriesBuilder};
