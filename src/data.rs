pub mod preprocess;
pub mod schema;
pub mod series;
pub mod table;
