pub mod pagination;
pub mod validation;

pub use pagination::{Page, PageQuery, PageRequest, Paginated};
pub use validation::FieldErrors;
