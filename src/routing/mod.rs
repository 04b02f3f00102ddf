pub mod router;

pub use router::{normalize_path, PathPredicate, RouteDefinition, RouteTable, RouteTableBuilder};
