//! Wire messages for the Users and Posts services.
//!
//! These mirror `social.users.v1` and `social.posts.v1`; field tags must stay
//! in sync with the services' `.proto` files.

use serde::Serialize;

pub mod users {
    pub const GET_USER: &str = "/social.users.v1.Users/GetUser";
    pub const LOGIN: &str = "/social.users.v1.Users/Login";
    pub const REFRESH: &str = "/social.users.v1.Users/Refresh";
}

pub mod posts {
    pub const LIST_BY_AUTHOR: &str = "/social.posts.v1.Posts/ListByAuthor";
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetUserRequest {
    #[prost(uint64, tag = "1")]
    pub id: u64,
}

#[derive(Clone, PartialEq, Serialize, ::prost::Message)]
pub struct User {
    #[prost(uint64, tag = "1")]
    pub id: u64,
    #[prost(string, tag = "2")]
    pub username: String,
    /// Index into the avatar catalogue.
    #[prost(uint32, tag = "3")]
    pub avatar: u32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct LoginRequest {
    #[prost(string, tag = "1")]
    pub username: String,
    #[prost(string, tag = "2")]
    pub password: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RefreshRequest {
    #[prost(string, tag = "1")]
    pub refresh_token: String,
}

#[derive(Clone, PartialEq, Serialize, ::prost::Message)]
pub struct TokenReply {
    #[prost(string, tag = "1")]
    pub access_token: String,
    #[prost(string, tag = "2")]
    pub refresh_token: String,
    /// Access token lifetime in seconds.
    #[prost(uint64, tag = "3")]
    pub expires_in: u64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ListPostsRequest {
    #[prost(uint64, tag = "1")]
    pub author_id: u64,
    #[prost(uint32, tag = "2")]
    pub limit: u32,
}

#[derive(Clone, PartialEq, Serialize, ::prost::Message)]
pub struct Post {
    #[prost(uint64, tag = "1")]
    pub id: u64,
    #[prost(uint64, tag = "2")]
    pub author_id: u64,
    #[prost(string, tag = "3")]
    pub body: String,
    /// Seconds since the Unix epoch.
    #[prost(uint64, tag = "4")]
    pub created_at: u64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ListPostsReply {
    #[prost(message, repeated, tag = "1")]
    pub posts: Vec<Post>,
}
