pub mod display;
pub mod forecast;
pub mod history;
pub mod io;
pub mod polars_ext;
