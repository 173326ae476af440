pub mod assistant;
pub mod model_client;
pub mod remote_store;
pub mod stats;
pub mod table_gateway;
pub mod views;
