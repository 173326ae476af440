pub mod record;
pub mod resource;
