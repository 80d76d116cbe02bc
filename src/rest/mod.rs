//! Generated CRUD endpoints.
//!
//! A [`ModelDescriptor`] names a route path, a storage handle and the
//! ownership/auth rules of one resource; [`generate_rest_endpoint`] turns it
//! into a router with six routes:
//!
//! | Method | Path | Success |
//! |---|---|---|
//! | GET | `{path}` | 200, all records |
//! | GET | `{path}/paging` | 200, [`PagedResult`] |
//! | GET | `{path}/:id` | 200, record |
//! | POST | `{path}` | 201, `{ <primaryKey>: id }` |
//! | PUT | `{path}/:id` | 200, empty |
//! | DELETE | `{path}/:id` | 204 |

pub mod descriptor;
mod endpoint;
pub mod ownership;
pub mod paging;
pub mod registry;

pub use descriptor::{DescriptorError, ModelDescriptor};
pub use endpoint::generate_rest_endpoint;
pub use ownership::extract_parent_id;
pub use paging::{PagedResult, PagingDefaults, PagingParams};
pub use registry::RestRegistry;
