pub mod assignments;
pub mod auth;
pub mod children;
pub mod clients;
pub mod clinics;
pub mod health;
pub mod metrics;
pub mod stats;
pub mod taxonomy;
pub mod therapists;
pub mod users;
pub mod wizard;
