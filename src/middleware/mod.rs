pub mod auth;
pub mod response;

pub use auth::{jwt_auth_middleware, Principal};
pub use response::{method_not_allowed_envelope, ApiResponse, ApiResult};
