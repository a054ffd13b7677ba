pub mod index;
pub mod sqlite;
pub mod store;

pub use index::NewsIndex;
pub use sqlite::SqliteArticleStore;
pub use store::{Article, ArticleRecord, ArticleStore, SearchHit};
