pub mod graphql;

pub use graphql::{create_schema, SaviSchema};
