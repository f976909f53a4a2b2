//! Message and client definitions for the users service (`package user`).
//!
//! Only the `GetFollowers` call is mirrored here; the rest of the users
//! service surface is not consumed by this worker.

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetFollowersReq {
    #[prost(string, tag = "1")]
    pub user_id: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct FollowStruct {
    #[prost(string, tag = "1")]
    pub id: String,
    #[prost(string, tag = "2")]
    pub follower_id: String,
    #[prost(string, tag = "3")]
    pub following_id: String,
    #[prost(int64, tag = "4")]
    pub created_at: i64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetFollowersRes {
    #[prost(message, repeated, tag = "1")]
    pub followers: Vec<FollowStruct>,
}

pub mod user_client {
    use super::{GetFollowersReq, GetFollowersRes};
    use tonic::codegen::http;
    use tonic::transport::Channel;

    #[derive(Debug, Clone)]
    pub struct UserClient {
        inner: tonic::client::Grpc<Channel>,
    }

    impl UserClient {
        pub fn new(channel: Channel) -> Self {
            Self {
                inner: tonic::client::Grpc::new(channel),
            }
        }

        pub async fn get_followers(
            &mut self,
            request: impl tonic::IntoRequest<GetFollowersReq>,
        ) -> Result<tonic::Response<GetFollowersRes>, tonic::Status> {
            self.inner.ready().await.map_err(|e| {
                tonic::Status::new(
                    tonic::Code::Unavailable,
                    format!("Service was not ready: {}", e),
                )
            })?;
            let codec = tonic::codec::ProstCodec::default();
            let path = http::uri::PathAndQuery::from_static("/user.User/GetFollowers");
            self.inner.unary(request.into_request(), path, codec).await
        }
    }
}
