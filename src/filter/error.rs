use thiserror::Error;

#[derive(Error, Debug)]
pub enum FilterError {
    /// Raised when a sort key reaches column resolution without having passed
    /// safe-list validation first. This is a programming error, not user input.
    #[error("unsafe sort parameter: {0}")]
    UnsafeSortParameter(String),
}
