// handlers/mod.rs - Handlers split by security tier
//
// Public (no auth) → Protected (JWT bearer token)
pub mod protected;
pub mod public;
