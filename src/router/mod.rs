//! Request routing: request type → handler → one reply.

mod dispatch;
mod policy;

pub use dispatch::{Reply, RequestRouter, RouteError, RouterSettings};
pub use policy::CommandPolicy;
