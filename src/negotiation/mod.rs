pub mod machine;
pub mod model;
pub mod store;
