pub mod check_config;
pub mod sync;
pub mod test_connection;
