// handlers/mod.rs - Hand-written routes, split by security tier:
// Public (no auth) and Protected (JWT auth)
pub mod protected;
pub mod public;
