use thiserror::Error;

/// Everything a request can fail with. The display text is what the user
/// sees in the notice banner after the redirect; none of these are fatal to
/// the process.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("author name and book name are both required")]
    MissingFields,

    #[error("a book with that name already exists")]
    DuplicateBook,

    #[error("storage unavailable, try again shortly")]
    Storage(#[from] anyhow::Error),
}
