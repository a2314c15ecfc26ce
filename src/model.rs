use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Author {
    pub id: i32,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Book {
    pub id: i32,
    pub name: String,
    pub author_id: i32,
}

/// One listing entry: an author with their books resolved.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorWithBooks {
    #[serde(flatten)]
    pub author: Author,
    pub books: Vec<Book>,
}
