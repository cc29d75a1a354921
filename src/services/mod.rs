pub mod catalog;
pub mod game;

pub use catalog::CatalogService;
pub use game::GameService;
