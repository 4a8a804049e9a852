mod handler;
mod hub;
pub mod protocol;

pub use handler::handle_connection;
pub use hub::ChangeHub;
