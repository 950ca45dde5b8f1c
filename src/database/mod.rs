pub mod manager;
pub mod memory;
pub mod models;
pub mod postgres;
pub mod repository;

pub use manager::{DatabaseError, DatabaseManager};
pub use repository::{MovieRepository, PermissionRepository, Repositories, TokenRepository, UserRepository};
