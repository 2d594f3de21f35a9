pub mod assignment;
pub mod auth;
pub mod child;
pub mod client;
pub mod clinic;
pub mod taxonomy;
pub mod therapist;
pub mod user;
