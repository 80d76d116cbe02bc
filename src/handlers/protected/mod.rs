// handlers/protected/mod.rs - Protected handlers (bearer token required)
//
// Generated REST endpoints carry their own gate; the routes here are wrapped
// by `routes()` in each module.

pub mod upload;

pub use upload::UploadOptions;
