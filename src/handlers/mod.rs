pub mod databases;
pub mod schema;
pub mod users;
