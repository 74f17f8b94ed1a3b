pub mod db;
pub mod repository;
pub mod tables;

pub use db::Database;
pub use repository::Repository;
