pub mod auth;
pub mod comments;
pub mod favorites;
pub mod movies;
pub mod profiles;
pub mod votes;
