pub mod db;
pub mod openrouter;

pub use db::DbAdapter;
pub use openrouter::OpenRouterAdapter;
