pub mod postgres;
pub mod table_loader;
