//! Follower lookup against the users service over gRPC.

pub mod clients;
pub mod user_service;

pub use clients::{FollowerResolver, GrpcFollowerResolver};
