pub mod auth;
pub mod error;
pub mod feed;
pub mod follow;
pub mod forms;
pub mod operator;
pub mod pagination;
pub mod posts;
pub mod repos;
