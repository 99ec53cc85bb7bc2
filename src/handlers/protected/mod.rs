// handlers/protected/mod.rs - Protected handlers (JWT authentication required)
//
// Every route here sits behind `jwt_auth_middleware`, which injects the
// acting `Principal` into request extensions.

pub mod expenses;
