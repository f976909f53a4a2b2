use super::user_service::{user_client::UserClient, GetFollowersReq};
use crate::error::ResolveError;
use crate::models::Follower;
use async_trait::async_trait;
use std::time::Duration;
use tonic::transport::{Channel, Endpoint};
use tracing::debug;

/// Looks up the current followers of an author.
///
/// `Ok(vec![])` means the author definitively has no followers; any failure
/// to find out is an `Err`.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FollowerResolver: Send + Sync {
    async fn resolve(&self, author_id: &str) -> Result<Vec<Follower>, ResolveError>;
}

/// gRPC client for the users service.
///
/// The channel is created once and shared by every call; it connects lazily
/// and reconnects on its own after failures.
#[derive(Clone)]
pub struct GrpcFollowerResolver {
    client: UserClient,
    timeout: Duration,
}

impl GrpcFollowerResolver {
    pub fn new(address: &str, timeout: Duration) -> Result<Self, ResolveError> {
        let channel: Channel = Endpoint::from_shared(address.to_string())?
            .connect_timeout(timeout)
            .timeout(timeout)
            .tcp_nodelay(true)
            .connect_lazy();

        Ok(Self {
            client: UserClient::new(channel),
            timeout,
        })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[async_trait]
impl FollowerResolver for GrpcFollowerResolver {
    async fn resolve(&self, author_id: &str) -> Result<Vec<Follower>, ResolveError> {
        let mut client = self.client.clone();
        let request = GetFollowersReq {
            user_id: author_id.to_string(),
        };

        let response = tokio::time::timeout(self.timeout, client.get_followers(request))
            .await
            .map_err(|_| ResolveError::Timeout(self.timeout))??
            .into_inner();

        let followers: Vec<Follower> = response
            .followers
            .into_iter()
            .filter(|f| !f.follower_id.is_empty())
            .map(|f| Follower::new(f.follower_id))
            .collect();

        debug!(
            author_id = %author_id,
            followers = followers.len(),
            "Resolved followers"
        );

        Ok(followers)
    }
}
