mod feeds;
mod follows;
mod posts;
mod schema;
mod store;
mod types;
mod users;

pub use posts::MAX_POSTS;
pub use schema::Database;
pub use store::IngestStore;
pub use types::{
    DatabaseError, Feed, FeedFollow, FeedRef, FeedWithOwner, InsertError, NewPost, Post,
    PostWithFeed, User,
};
